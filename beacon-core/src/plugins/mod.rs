//! Plugins: consumers of processed events
//!
//! A [`Plugin`] is a capability record. Every handler is an optional field,
//! one per event type, plus an optional load hook. Dispatch checks which
//! fields are present; a plugin that only cares about `track` simply leaves
//! the others empty.
//!
//! ## Fault isolation
//!
//! Handlers are user code. A handler that returns an error or panics is
//! logged and counted, and the remaining plugins still receive the event.
//! The same applies to load hooks: a failing hook is logged and the plugin
//! stays registered.
//!
//! ## Built-in Plugins
//!
//! - [`console`]: logs every event through `tracing`
//! - [`jsonl`]: appends every event to a local JSON-lines file
//!
//! ## Writing a Plugin
//!
//! ```rust,ignore
//! use beacon_core::plugins::{Plugin, PluginKind};
//!
//! let plugin = Plugin::new("acme.warehouse")
//!     .with_kind(PluginKind::Destination)
//!     .on_track(|event| {
//!         println!("track {}", event.label());
//!         Ok(())
//!     });
//! analytics.add_plugin(plugin);
//! ```

pub mod console;
pub mod jsonl;

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::analytics::Analytics;
use crate::error::{Error, Result};
use crate::types::{AnalyticsEvent, EventType};

/// Handler for one event type.
pub type EventHandler = Arc<dyn Fn(&AnalyticsEvent) -> anyhow::Result<()> + Send + Sync>;

/// Called once when the plugin is added, with a handle to the SDK.
pub type LoadHook = Arc<dyn Fn(&Analytics) -> anyhow::Result<()> + Send + Sync>;

/// What role a plugin plays. Informational only; dispatch treats all kinds
/// the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PluginKind {
    /// Forwards events somewhere
    #[default]
    Destination,
    /// Adds data to the SDK (usually from its load hook)
    Enrichment,
    /// Anything else
    Utility,
}

impl PluginKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginKind::Destination => "destination",
            PluginKind::Enrichment => "enrichment",
            PluginKind::Utility => "utility",
        }
    }
}

/// A registered consumer of events.
#[derive(Clone)]
pub struct Plugin {
    name: String,
    version: String,
    kind: PluginKind,
    track: Option<EventHandler>,
    page: Option<EventHandler>,
    identify: Option<EventHandler>,
    group: Option<EventHandler>,
    alias: Option<EventHandler>,
    load: Option<LoadHook>,
}

impl Plugin {
    /// A plugin with no handlers.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "1.0.0".to_string(),
            kind: PluginKind::default(),
            track: None,
            page: None,
            identify: None,
            group: None,
            alias: None,
            load: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_kind(mut self, kind: PluginKind) -> Self {
        self.kind = kind;
        self
    }

    /// Install the same handler for several event types.
    pub fn on_events<F>(mut self, types: &[EventType], handler: F) -> Self
    where
        F: Fn(&AnalyticsEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        for event_type in types {
            *self.slot_mut(*event_type) = Some(Arc::clone(&handler));
        }
        self
    }

    pub fn on_track<F>(self, handler: F) -> Self
    where
        F: Fn(&AnalyticsEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_events(&[EventType::Track], handler)
    }

    pub fn on_page<F>(self, handler: F) -> Self
    where
        F: Fn(&AnalyticsEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_events(&[EventType::Page], handler)
    }

    pub fn on_identify<F>(self, handler: F) -> Self
    where
        F: Fn(&AnalyticsEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_events(&[EventType::Identify], handler)
    }

    pub fn on_group<F>(self, handler: F) -> Self
    where
        F: Fn(&AnalyticsEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_events(&[EventType::Group], handler)
    }

    pub fn on_alias<F>(self, handler: F) -> Self
    where
        F: Fn(&AnalyticsEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_events(&[EventType::Alias], handler)
    }

    pub fn on_load<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Analytics) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.load = Some(Arc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn kind(&self) -> PluginKind {
        self.kind
    }

    fn slot(&self, event_type: EventType) -> &Option<EventHandler> {
        match event_type {
            EventType::Track => &self.track,
            EventType::Page => &self.page,
            EventType::Identify => &self.identify,
            EventType::Group => &self.group,
            EventType::Alias => &self.alias,
        }
    }

    fn slot_mut(&mut self, event_type: EventType) -> &mut Option<EventHandler> {
        match event_type {
            EventType::Track => &mut self.track,
            EventType::Page => &mut self.page,
            EventType::Identify => &mut self.identify,
            EventType::Group => &mut self.group,
            EventType::Alias => &mut self.alias,
        }
    }

    /// Whether this plugin has a handler for `event_type`.
    pub fn handles(&self, event_type: EventType) -> bool {
        self.slot(event_type).is_some()
    }

    pub fn has_load_hook(&self) -> bool {
        self.load.is_some()
    }

    /// Run the handler for the event's type.
    ///
    /// `None` if the plugin has no such handler. Errors and panics both come
    /// back as `Error::Plugin`.
    pub fn deliver(&self, event: &AnalyticsEvent) -> Option<Result<()>> {
        let handler = self.slot(event.event_type).as_ref()?;
        Some(self.guard(|| handler(event)))
    }

    /// Run the load hook, if any.
    pub(crate) fn run_load(&self, analytics: &Analytics) -> Option<Result<()>> {
        let hook = self.load.as_ref()?;
        Some(self.guard(|| hook(analytics)))
    }

    fn guard<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() -> anyhow::Result<()>,
    {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Plugin {
                plugin: self.name.clone(),
                message: format!("{:#}", e),
            }),
            Err(payload) => Err(Error::Plugin {
                plugin: self.name.clone(),
                message: format!("panicked: {}", panic_message(payload.as_ref())),
            }),
        }
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers: Vec<&str> = EventType::ALL
            .iter()
            .filter(|t| self.handles(**t))
            .map(|t| t.as_str())
            .collect();
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("kind", &self.kind)
            .field("handlers", &handlers)
            .field("load", &self.load.is_some())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Outcome of dispatching one event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Plugins whose handler ran successfully
    pub delivered: usize,
    /// Plugins without a handler for this event type
    pub skipped: usize,
    /// Plugins whose handler failed or panicked
    pub failed: usize,
}

/// Ordered, append-only set of plugins.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin after all previously registered ones.
    pub fn register(&mut self, plugin: Arc<Plugin>) {
        self.plugins.push(plugin);
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p.name() == name)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Hand `event` to every plugin with a matching handler, in
    /// registration order. Failed plugins don't stop later plugins.
    pub fn dispatch(&self, event: &AnalyticsEvent) -> DispatchReport {
        let mut report = DispatchReport::default();

        for plugin in &self.plugins {
            match plugin.deliver(event) {
                None => report.skipped += 1,
                Some(Ok(())) => report.delivered += 1,
                Some(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(
                        plugin = plugin.name(),
                        event_type = %event.event_type,
                        message_id = %event.message_id,
                        error = %e,
                        "Plugin failed to process event"
                    );
                }
            }
        }

        report
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.plugins.iter()).finish()
    }
}
