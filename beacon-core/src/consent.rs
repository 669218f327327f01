//! Consent state machine
//!
//! Consent is tracked per category (`analytics`, `marketing`, ...) and as one
//! overall flag. The overall flag is what gates enqueueing; category updates
//! derive it:
//!
//! ```text
//!   update(partial) ──► merge into preferences
//!                       │
//!                       ├─ any category Granted && !given ──► Grant
//!                       ├─ no category Granted  &&  given ──► Revoke
//!                       └─ otherwise                       ──► Unchanged
//! ```
//!
//! The derivation always looks at the full merged map, never just the delta.
//! Side effects of a transition (timer, persistence) belong to the facade.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Consent for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentStatus {
    Granted,
    Denied,
    Unknown,
}

impl ConsentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentStatus::Granted => "granted",
            ConsentStatus::Denied => "denied",
            ConsentStatus::Unknown => "unknown",
        }
    }
}

/// Category name → status.
pub type ConsentPreferences = BTreeMap<String, ConsentStatus>;

/// What the facade must do after a preference update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentTransition {
    /// Overall consent flips to granted
    Grant,
    /// Overall consent flips to revoked
    Revoke,
    /// Overall consent stays as it was
    Unchanged,
}

/// Overall consent flag plus per-category preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentState {
    given: bool,
    preferences: ConsentPreferences,
}

impl ConsentState {
    pub fn new(initial_consent: bool) -> Self {
        Self {
            given: initial_consent,
            preferences: ConsentPreferences::new(),
        }
    }

    pub fn is_given(&self) -> bool {
        self.given
    }

    pub fn preferences(&self) -> &ConsentPreferences {
        &self.preferences
    }

    pub fn grant(&mut self) {
        self.given = true;
    }

    pub fn revoke(&mut self) {
        self.given = false;
    }

    /// True if any category is currently granted.
    pub fn any_granted(&self) -> bool {
        self.preferences
            .values()
            .any(|status| *status == ConsentStatus::Granted)
    }

    /// Merge `partial` into the preferences and derive the overall transition.
    ///
    /// The overall flag itself is left untouched; the caller applies the
    /// transition so it can run the matching side effects.
    pub fn merge(&mut self, partial: ConsentPreferences) -> ConsentTransition {
        self.preferences.extend(partial);

        let any_granted = self.any_granted();
        if any_granted && !self.given {
            ConsentTransition::Grant
        } else if !any_granted && self.given {
            ConsentTransition::Revoke
        } else {
            ConsentTransition::Unchanged
        }
    }
}
