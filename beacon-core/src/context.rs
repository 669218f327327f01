//! Event context construction
//!
//! Host metadata (OS, locale, screen, ...) is supplied by a
//! [`ContextProvider`] so the core never reaches into the environment itself.

use crate::types::{merge_properties, Properties};
use serde_json::{json, Value};

/// Supplies environment metadata merged into the context of every event.
pub trait ContextProvider: Send + Sync {
    fn environment(&self) -> Properties;
}

/// Reports `os`, `arch`, `locale` and the `library` name/version.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvironmentContext;

impl ContextProvider for EnvironmentContext {
    fn environment(&self) -> Properties {
        let mut ctx = Properties::new();
        ctx.insert("os".into(), json!(std::env::consts::OS));
        ctx.insert("arch".into(), json!(std::env::consts::ARCH));
        if let Some(locale) = locale_from_env() {
            ctx.insert("locale".into(), json!(locale));
        }
        ctx.insert(
            "library".into(),
            json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            }),
        );
        ctx
    }
}

/// Fixed metadata, for tests and hosts that know their environment up front.
#[derive(Debug, Default, Clone)]
pub struct StaticContext(pub Properties);

impl ContextProvider for StaticContext {
    fn environment(&self) -> Properties {
        self.0.clone()
    }
}

/// `LC_ALL` then `LANG`, with any `.UTF-8` style suffix stripped and `_`
/// turned into `-` (`en_US.UTF-8` → `en-US`).
fn locale_from_env() -> Option<String> {
    ["LC_ALL", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty() && value != "C" && value != "POSIX")
        .map(|value| {
            value
                .split('.')
                .next()
                .unwrap_or_default()
                .replace('_', "-")
        })
}

/// Build the instance context: the existing context, then the app identity,
/// then whatever the provider reports.
pub fn build_context(
    existing: &Properties,
    app_name: &str,
    app_version: &str,
    provider: &dyn ContextProvider,
) -> Properties {
    let mut ctx = existing.clone();
    ctx.insert("appName".into(), Value::String(app_name.to_string()));
    ctx.insert("appVersion".into(), Value::String(app_version.to_string()));
    merge_properties(&ctx, &provider.environment())
}

/// Per-event context: the instance context plus the current user traits.
pub fn event_context(context: &Properties, user_traits: &Properties) -> Properties {
    let mut ctx = context.clone();
    ctx.insert("traits".into(), Value::Object(user_traits.clone()));
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::props;

    #[test]
    fn test_build_context_includes_app_and_environment() {
        let provider = StaticContext(props(json!({
            "userAgent": "Mozilla/5.0 (Test; OS)",
            "locale": "en-US",
            "screen": {"width": 1920, "height": 1080, "density": 2},
        })));

        let ctx = build_context(&Properties::new(), "test-app", "2.1.0", &provider);
        assert_eq!(ctx["appName"], "test-app");
        assert_eq!(ctx["appVersion"], "2.1.0");
        assert_eq!(ctx["locale"], "en-US");
        assert_eq!(ctx["screen"]["width"], 1920);
    }

    #[test]
    fn test_build_context_keeps_existing_keys() {
        let existing = props(json!({"campaign": "spring"}));
        let ctx = build_context(&existing, "app", "1.0.0", &StaticContext::default());
        assert_eq!(ctx["campaign"], "spring");
        assert_eq!(ctx["appName"], "app");
    }

    #[test]
    fn test_event_context_embeds_traits() {
        let ctx = props(json!({"appName": "app"}));
        let traits = props(json!({"plan": "pro"}));

        let event_ctx = event_context(&ctx, &traits);
        assert_eq!(event_ctx["traits"]["plan"], "pro");
        assert!(ctx.get("traits").is_none());
    }

    #[test]
    fn test_environment_context_reports_library() {
        let ctx = EnvironmentContext.environment();
        assert_eq!(ctx["library"]["name"], "beacon-core");
        assert_eq!(ctx["os"], std::env::consts::OS);
    }
}
