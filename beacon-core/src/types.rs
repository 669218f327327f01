//! Core domain types for beacon
//!
//! An [`AnalyticsEvent`] is built by the facade, queued, transformed by
//! middleware and finally handed to plugins. Field names serialize in
//! camelCase so the JSON form matches what analytics destinations expect.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form event properties (also used for traits and context).
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// User or group traits.
pub type Traits = Properties;

/// Destination name → enabled flag, passed through to plugins untouched.
pub type Integrations = BTreeMap<String, bool>;

/// Build a [`Properties`] map from a JSON value.
///
/// Objects convert directly; any other value yields an empty map.
///
/// ```
/// use beacon_core::props;
/// use serde_json::json;
///
/// let p = props(json!({"plan": "pro", "seats": 3}));
/// assert_eq!(p["plan"], "pro");
/// ```
pub fn props(value: serde_json::Value) -> Properties {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Properties::new(),
    }
}

/// Shallow merge: keys in `overrides` replace same-named keys in `base`.
pub fn merge_properties(base: &Properties, overrides: &Properties) -> Properties {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Keys whose value is JSON `null`.
pub fn null_property_keys(properties: &Properties) -> Vec<&str> {
    properties
        .iter()
        .filter(|(_, value)| value.is_null())
        .map(|(key, _)| key.as_str())
        .collect()
}

/// Log a warning for every property whose value is `null`.
///
/// Warnings never block the event.
pub(crate) fn warn_null_properties(properties: &Properties) {
    for key in null_property_keys(properties) {
        tracing::warn!(property = key, "Event property has a null value");
    }
}

/// Kind of analytics call that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Track,
    Page,
    Identify,
    Group,
    Alias,
}

impl EventType {
    /// All event types, in handler order.
    pub const ALL: [EventType; 5] = [
        EventType::Track,
        EventType::Page,
        EventType::Identify,
        EventType::Group,
        EventType::Alias,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Track => "track",
            EventType::Page => "page",
            EventType::Identify => "identify",
            EventType::Group => "group",
            EventType::Alias => "alias",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single analytics event.
///
/// `event_type`, `message_id` and `timestamp` are fixed at creation. The
/// context is a snapshot taken when the event was built; later calls to
/// `set_context` do not reach events already queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    /// Which call produced this event
    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Event name (track only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    /// Page name or path (page only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Known user id, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Per-installation id, always present
    pub anonymous_id: String,

    /// Call-site properties merged over global properties
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,

    /// Full user traits (identify) or group traits (group)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traits: Option<Traits>,

    /// Environment and app metadata at construction time
    #[serde(default)]
    pub context: Properties,

    /// Creation instant
    pub timestamp: DateTime<Utc>,

    /// Unique per event
    pub message_id: String,

    /// Destination toggles, passed through unmodified
    #[serde(default)]
    pub integrations: Integrations,
}

impl AnalyticsEvent {
    /// Short human-readable label: event name, page name, or user id.
    pub fn label(&self) -> &str {
        self.event
            .as_deref()
            .or(self.name.as_deref())
            .or(self.user_id.as_deref())
            .unwrap_or(&self.anonymous_id)
    }
}

/// Snapshot of the current identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub user_id: Option<String>,
    pub anonymous_id: String,
    pub traits: Traits,
}
