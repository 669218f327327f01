//! Console destination
//!
//! Logs each processed event at `info` level with its JSON payload. Handy
//! during development together with [`logging::init_stderr`](crate::logging::init_stderr).

use super::{Plugin, PluginKind};
use crate::types::EventType;

/// Plugin name.
pub const NAME: &str = "core.console";

/// Build the console destination.
pub fn destination() -> Plugin {
    Plugin::new(NAME)
        .with_kind(PluginKind::Destination)
        .with_version(env!("CARGO_PKG_VERSION"))
        .on_events(&EventType::ALL, |event| {
            let payload = serde_json::to_string(event)?;
            tracing::info!(
                plugin = NAME,
                event_type = %event.event_type,
                label = event.label(),
                payload = %payload,
                "Event delivered"
            );
            Ok(())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_handles_every_event_type() {
        let plugin = destination();
        assert_eq!(plugin.name(), NAME);
        for t in EventType::ALL {
            assert!(plugin.handles(t));
        }
    }
}
