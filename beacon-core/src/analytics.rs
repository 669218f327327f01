//! The SDK facade
//!
//! [`Analytics`] is a cheap, cloneable handle to one SDK instance. Every
//! clone talks to the same queue, identity and plugin set; separately built
//! instances share nothing (unless given the same storage backend).
//!
//! ## Flow
//!
//! ```text
//! track/page/identify/group/alias
//!     -> consent check -> event construction -> queue
//!     -> (batch size | timer tick | flush()) -> middleware -> plugins
//! ```
//!
//! No tracking operation returns an error or blocks on delivery. Storage and
//! plugin failures are logged and counted in [`PublishStats`].
//!
//! ## Locking
//!
//! Instance state sits behind one mutex that is never held while user code
//! runs. Middleware, plugin handlers and load hooks may therefore call back
//! into the same `Analytics` handle, e.g. to track their own events.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::collector::{deliver_batch, EventQueue, FlushTimer, PublishStats};
use crate::config::SdkOptions;
use crate::consent::{ConsentPreferences, ConsentState, ConsentTransition};
use crate::context::{build_context, event_context, ContextProvider, EnvironmentContext};
use crate::error::Result;
use crate::ids::{IdGenerator, UuidGenerator};
use crate::middleware::{Middleware, MiddlewareChain};
use crate::plugins::{Plugin, PluginRegistry};
use crate::storage::{MemoryStorage, PersistedState, Persistence, Storage};
use crate::types::{
    merge_properties, warn_null_properties, AnalyticsEvent, CurrentUser, EventType,
    Integrations, Properties, Traits,
};

/// Per-event `debug!` chatter, only when the `debug` option is on.
macro_rules! sdk_debug {
    ($inner:expr, $($arg:tt)+) => {
        if $inner.options.debug {
            tracing::debug!($($arg)+);
        }
    };
}

/// Builder for [`Analytics`].
///
/// Defaults: in-memory storage, [`EnvironmentContext`], UUID v4 ids.
pub struct AnalyticsBuilder {
    options: SdkOptions,
    storage: Option<Arc<dyn Storage>>,
    context_provider: Option<Arc<dyn ContextProvider>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl AnalyticsBuilder {
    /// Persist identity through `storage`.
    pub fn storage(self, storage: impl Storage + 'static) -> Self {
        self.shared_storage(Arc::new(storage))
    }

    /// Persist identity through an already shared backend.
    pub fn shared_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn context_provider(mut self, provider: impl ContextProvider + 'static) -> Self {
        self.context_provider = Some(Arc::new(provider));
        self
    }

    pub fn id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Some(Arc::new(ids));
        self
    }

    /// Validate the options, restore persisted identity and start the
    /// periodic flush.
    ///
    /// The flush timer needs a tokio runtime; outside one the instance works
    /// without periodic flushing.
    pub fn build(self) -> Result<Analytics> {
        let options = self.options;
        options.validate()?;

        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let provider = self
            .context_provider
            .unwrap_or_else(|| Arc::new(EnvironmentContext));
        let ids = self.ids.unwrap_or_else(|| Arc::new(UuidGenerator));
        let persistence = Persistence::new(
            storage,
            options.storage_key(),
            options.enable_persistence,
        );

        let mut state = State {
            user_id: None,
            anonymous_id: String::new(),
            user_traits: Traits::new(),
            group_traits: Traits::new(),
            global_properties: Properties::new(),
            context: Properties::new(),
            consent: ConsentState::new(options.initial_consent),
            tracking_enabled: true,
            queue: EventQueue::new(options.batch_size),
            middleware: MiddlewareChain::new(),
            plugins: PluginRegistry::new(),
            timer: FlushTimer::new(options.flush_interval()),
        };

        if let Some(saved) = persistence.load() {
            state.user_id = saved.user_id;
            state.anonymous_id = saved.anonymous_id;
            state.user_traits = saved.user_traits;
        }
        if state.anonymous_id.is_empty() {
            state.anonymous_id = ids.generate();
        }
        state.context = build_context(
            &state.context,
            &options.app_name,
            &options.version,
            provider.as_ref(),
        );

        let analytics = Analytics {
            inner: Arc::new(Inner {
                options,
                persistence,
                ids,
                state: Mutex::new(state),
                stats: Arc::new(Mutex::new(PublishStats::default())),
            }),
        };

        analytics.persist();
        analytics.start_timer();

        let options = &analytics.inner.options;
        tracing::info!(
            app = %options.app_name,
            version = %options.version,
            batch_size = options.batch_size,
            flush_interval_ms = options.flush_interval_ms,
            "Analytics SDK initialized"
        );
        Ok(analytics)
    }
}

/// Handle to one SDK instance.
#[derive(Clone)]
pub struct Analytics {
    inner: Arc<Inner>,
}

struct Inner {
    options: SdkOptions,
    persistence: Persistence,
    ids: Arc<dyn IdGenerator>,
    state: Mutex<State>,
    stats: Arc<Mutex<PublishStats>>,
}

struct State {
    user_id: Option<String>,
    anonymous_id: String,
    user_traits: Traits,
    group_traits: Traits,
    global_properties: Properties,
    context: Properties,
    consent: ConsentState,
    tracking_enabled: bool,
    queue: EventQueue,
    middleware: MiddlewareChain,
    plugins: PluginRegistry,
    timer: FlushTimer,
}

impl State {
    /// Event skeleton carrying the current identity and a context snapshot.
    fn event(
        &self,
        event_type: EventType,
        message_id: String,
        integrations: Integrations,
    ) -> AnalyticsEvent {
        AnalyticsEvent {
            event_type,
            event: None,
            name: None,
            user_id: self.user_id.clone(),
            anonymous_id: self.anonymous_id.clone(),
            properties: Properties::new(),
            traits: None,
            context: event_context(&self.context, &self.user_traits),
            timestamp: Utc::now(),
            message_id,
            integrations,
        }
    }

    fn persisted(&self) -> PersistedState {
        PersistedState {
            user_id: self.user_id.clone(),
            anonymous_id: self.anonymous_id.clone(),
            user_traits: self.user_traits.clone(),
        }
    }
}

impl Analytics {
    /// Build an instance with default collaborators.
    pub fn new(options: SdkOptions) -> Result<Self> {
        Self::builder(options).build()
    }

    pub fn builder(options: SdkOptions) -> AnalyticsBuilder {
        AnalyticsBuilder {
            options,
            storage: None,
            context_provider: None,
            ids: None,
        }
    }

    // ---- tracking ----

    /// Record a named action.
    pub fn track(&self, event: impl Into<String>, properties: Properties) {
        self.track_with(event, properties, Integrations::new());
    }

    pub fn track_with(
        &self,
        event: impl Into<String>,
        properties: Properties,
        integrations: Integrations,
    ) {
        warn_null_properties(&properties);
        let message_id = self.inner.ids.generate();
        let built = {
            let st = self.inner.state.lock();
            if !st.tracking_enabled {
                return;
            }
            let mut built = st.event(EventType::Track, message_id, integrations);
            built.event = Some(event.into());
            built.properties = merge_properties(&st.global_properties, &properties);
            built
        };
        self.enqueue(built);
    }

    /// Record a page view.
    pub fn page(&self, name: Option<&str>, properties: Properties) {
        self.page_with(name, properties, Integrations::new());
    }

    pub fn page_with(&self, name: Option<&str>, properties: Properties, integrations: Integrations) {
        warn_null_properties(&properties);
        let message_id = self.inner.ids.generate();
        let built = {
            let st = self.inner.state.lock();
            if !st.tracking_enabled {
                return;
            }
            let mut built = st.event(EventType::Page, message_id, integrations);
            built.name = name.map(str::to_string);
            built.properties = merge_properties(&st.global_properties, &properties);
            built
        };
        self.enqueue(built);
    }

    /// Set the user id and merge `traits` into the user traits.
    ///
    /// The emitted event carries the full merged trait set.
    pub fn identify(&self, user_id: impl Into<String>, traits: Traits) {
        self.identify_with(user_id, traits, Integrations::new());
    }

    pub fn identify_with(
        &self,
        user_id: impl Into<String>,
        traits: Traits,
        integrations: Integrations,
    ) {
        warn_null_properties(&traits);
        let message_id = self.inner.ids.generate();
        let built = {
            let mut st = self.inner.state.lock();
            if !st.tracking_enabled {
                return;
            }
            st.user_id = Some(user_id.into());
            st.user_traits = merge_properties(&st.user_traits, &traits);
            let mut built = st.event(EventType::Identify, message_id, integrations);
            built.traits = Some(st.user_traits.clone());
            built
        };
        self.persist();
        self.enqueue(built);
    }

    /// Associate the user with a group and merge `traits` into the group
    /// traits.
    pub fn group(&self, group_id: impl Into<String>, traits: Traits) {
        self.group_with(group_id, traits, Integrations::new());
    }

    pub fn group_with(
        &self,
        group_id: impl Into<String>,
        traits: Traits,
        integrations: Integrations,
    ) {
        warn_null_properties(&traits);
        let message_id = self.inner.ids.generate();
        let built = {
            let mut st = self.inner.state.lock();
            if !st.tracking_enabled {
                return;
            }
            st.group_traits = merge_properties(&st.group_traits, &traits);
            let mut built = st.event(EventType::Group, message_id, integrations);
            built
                .properties
                .insert("groupId".into(), Value::String(group_id.into()));
            built.traits = Some(st.group_traits.clone());
            built
        };
        self.enqueue(built);
    }

    /// Switch the user id to `new_id`.
    ///
    /// `properties.oldId` is `old_id` if given, else the user id before the
    /// call, else the anonymous id.
    pub fn alias(&self, new_id: impl Into<String>, old_id: Option<&str>) {
        self.alias_with(new_id, old_id, Integrations::new());
    }

    pub fn alias_with(
        &self,
        new_id: impl Into<String>,
        old_id: Option<&str>,
        integrations: Integrations,
    ) {
        let new_id = new_id.into();
        let message_id = self.inner.ids.generate();
        let built = {
            let mut st = self.inner.state.lock();
            if !st.tracking_enabled {
                return;
            }
            let previous = old_id
                .map(str::to_string)
                .or_else(|| st.user_id.clone())
                .unwrap_or_else(|| st.anonymous_id.clone());
            let mut built = st.event(EventType::Alias, message_id, integrations);
            built.user_id = Some(new_id.clone());
            built
                .properties
                .insert("oldId".into(), Value::String(previous));
            st.user_id = Some(new_id);
            built
        };
        self.persist();
        self.enqueue(built);
    }

    /// Track an `error` event describing `error` and its source chain.
    pub fn track_error<E>(&self, error: &E, properties: Properties)
    where
        E: std::error::Error + ?Sized,
    {
        let mut sources = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            sources.push(Value::String(cause.to_string()));
            source = cause.source();
        }

        let mut base = Properties::new();
        base.insert("message".into(), Value::String(error.to_string()));
        base.insert("sources".into(), Value::Array(sources));
        self.track("error", merge_properties(&base, &properties));
    }

    /// Track a `performance_metric` event.
    pub fn track_performance(&self, metric_name: &str, value: f64, properties: Properties) {
        let mut base = Properties::new();
        base.insert("metricName".into(), json!(metric_name));
        base.insert("value".into(), json!(value));
        self.track("performance_metric", merge_properties(&base, &properties));
    }

    fn enqueue(&self, event: AnalyticsEvent) {
        let (queue_len, full) = {
            let mut st = self.inner.state.lock();
            if !st.consent.is_given() {
                drop(st);
                sdk_debug!(
                    self.inner,
                    event_type = %event.event_type,
                    message_id = %event.message_id,
                    "Event not queued: consent not given"
                );
                self.inner.stats.lock().events_dropped_no_consent += 1;
                return;
            }
            let full = st.queue.push(event);
            (st.queue.len(), full)
        };

        self.inner.stats.lock().events_queued += 1;
        sdk_debug!(self.inner, queue_len, "Event queued");

        if full {
            self.flush();
        }
    }

    // ---- pipeline ----

    /// Append a middleware step. Applies from the next flush on.
    pub fn use_middleware(&self, middleware: impl Middleware + 'static) {
        let steps = {
            let mut st = self.inner.state.lock();
            st.middleware.push(Arc::new(middleware));
            st.middleware.len()
        };
        sdk_debug!(self.inner, steps, "Middleware added");
    }

    /// Register `plugin` and run its load hook.
    ///
    /// A failing load hook is logged; the plugin stays registered.
    pub fn add_plugin(&self, plugin: Plugin) {
        let plugin = Arc::new(plugin);
        self.inner
            .state
            .lock()
            .plugins
            .register(Arc::clone(&plugin));

        match plugin.run_load(self) {
            Some(Err(e)) => {
                tracing::warn!(plugin = plugin.name(), error = %e, "Plugin load hook failed");
                self.inner.stats.lock().load_failures += 1;
            }
            Some(Ok(())) | None => {
                sdk_debug!(
                    self.inner,
                    plugin = plugin.name(),
                    kind = plugin.kind().as_str(),
                    "Plugin added"
                );
            }
        }
    }

    /// Deliver everything queued now. Returns the number of events handed to
    /// plugins during this call.
    ///
    /// A no-op on an empty queue. The queue is swapped out before middleware
    /// runs, so events tracked while the batch is processed wait for the next
    /// flush.
    pub fn flush(&self) -> usize {
        let (events, chain, plugins) = {
            let mut st = self.inner.state.lock();
            if st.queue.is_empty() {
                return 0;
            }
            (st.queue.take(), st.middleware.clone(), st.plugins.clone())
        };

        let count = events.len();
        sdk_debug!(self.inner, count, "Flushing events");
        {
            let mut stats = self.inner.stats.lock();
            stats.flushes += 1;
            stats.events_flushed += count;
        }

        deliver_batch(events, &chain, plugins, &self.inner.stats)
    }

    /// Flush once more and stop the periodic flush.
    ///
    /// Re-enabling tracking afterwards restarts the timer.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down analytics SDK");
        let delivered = self.flush();
        self.inner.state.lock().timer.stop();
        tracing::info!(delivered, "Analytics SDK shut down");
    }

    // ---- properties and context ----

    /// Merge into the properties added to every track and page event.
    pub fn set_global_properties(&self, properties: Properties) {
        let mut st = self.inner.state.lock();
        st.global_properties = merge_properties(&st.global_properties, &properties);
    }

    /// Merge into the context of events built from now on.
    pub fn set_context(&self, context: Properties) {
        let mut st = self.inner.state.lock();
        st.context = merge_properties(&st.context, &context);
    }

    // ---- consent ----

    /// Grant overall consent, re-enable tracking and persist the identity.
    pub fn give_consent(&self) {
        self.inner.state.lock().consent.grant();
        tracing::info!("Consent given");
        self.enable_tracking();
        self.persist();
    }

    /// Revoke overall consent.
    ///
    /// Disables tracking, forgets the in-memory identity (a fresh anonymous
    /// id is generated) and clears persisted data.
    pub fn revoke_consent(&self) {
        let anonymous_id = self.inner.ids.generate();
        {
            let mut st = self.inner.state.lock();
            st.consent.revoke();
            st.user_id = None;
            st.user_traits.clear();
            st.group_traits.clear();
            st.anonymous_id = anonymous_id;
        }
        tracing::info!("Consent revoked");
        self.disable_tracking();
        self.inner.persistence.clear();
    }

    /// Merge per-category preferences, then derive overall consent from the
    /// full preference map.
    pub fn update_consent(&self, preferences: ConsentPreferences) {
        let transition = self.inner.state.lock().consent.merge(preferences);
        sdk_debug!(self.inner, ?transition, "Consent preferences updated");
        match transition {
            ConsentTransition::Grant => self.give_consent(),
            ConsentTransition::Revoke => self.revoke_consent(),
            ConsentTransition::Unchanged => {}
        }
    }

    pub fn has_consent(&self) -> bool {
        self.inner.state.lock().consent.is_given()
    }

    /// Copy of the per-category preferences.
    pub fn consent_status(&self) -> ConsentPreferences {
        self.inner.state.lock().consent.preferences().clone()
    }

    // ---- tracking switch ----

    /// Stop accepting events and stop the periodic flush. Queued events stay.
    pub fn disable_tracking(&self) {
        {
            let mut st = self.inner.state.lock();
            st.tracking_enabled = false;
            st.timer.stop();
        }
        tracing::info!("Tracking disabled");
    }

    /// Accept events again and restart the periodic flush. Ignored while
    /// consent is not given.
    pub fn enable_tracking(&self) {
        let restart_timer = {
            let mut st = self.inner.state.lock();
            if !st.consent.is_given() {
                drop(st);
                tracing::info!("Cannot enable tracking: consent not given");
                return;
            }
            st.tracking_enabled = true;
            !st.timer.is_running()
        };
        if restart_timer {
            self.start_timer();
        }
        sdk_debug!(self.inner, "Tracking enabled");
    }

    /// Tracking flag and consent both hold.
    pub fn is_tracking_enabled(&self) -> bool {
        let st = self.inner.state.lock();
        st.tracking_enabled && st.consent.is_given()
    }

    // ---- accessors ----

    pub fn current_user(&self) -> CurrentUser {
        let st = self.inner.state.lock();
        CurrentUser {
            user_id: st.user_id.clone(),
            anonymous_id: st.anonymous_id.clone(),
            traits: st.user_traits.clone(),
        }
    }

    pub fn global_properties(&self) -> Properties {
        self.inner.state.lock().global_properties.clone()
    }

    pub fn context(&self) -> Properties {
        self.inner.state.lock().context.clone()
    }

    /// Events waiting for the next flush.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn stats(&self) -> PublishStats {
        self.inner.stats.lock().clone()
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .plugins
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn middleware_count(&self) -> usize {
        self.inner.state.lock().middleware.len()
    }

    /// Whether the periodic flush task is running.
    pub fn is_flush_scheduled(&self) -> bool {
        self.inner.state.lock().timer.is_running()
    }

    pub fn storage_key(&self) -> &str {
        self.inner.persistence.key()
    }

    pub fn options(&self) -> &SdkOptions {
        &self.inner.options
    }

    // ---- internals ----

    /// Write the identity if consent is given. Failures are logged.
    fn persist(&self) {
        if !self.inner.persistence.is_enabled() {
            return;
        }
        let snapshot = {
            let st = self.inner.state.lock();
            if !st.consent.is_given() {
                return;
            }
            st.persisted()
        };
        if self.inner.persistence.save(&snapshot) {
            sdk_debug!(self.inner, key = self.inner.persistence.key(), "Identity persisted");
        }
    }

    fn start_timer(&self) {
        let weak = Arc::downgrade(&self.inner);
        let started = self.inner.state.lock().timer.start(move || match weak.upgrade() {
            Some(inner) => {
                Analytics { inner }.flush();
                true
            }
            None => false,
        });
        if started {
            sdk_debug!(
                self.inner,
                interval_ms = self.inner.options.flush_interval_ms,
                "Periodic flush started"
            );
        }
    }
}

impl fmt::Debug for Analytics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.inner.state.lock();
        f.debug_struct("Analytics")
            .field("app_name", &self.inner.options.app_name)
            .field("user_id", &st.user_id)
            .field("anonymous_id", &st.anonymous_id)
            .field("consent", &st.consent.is_given())
            .field("tracking_enabled", &st.tracking_enabled)
            .field("pending", &st.queue.len())
            .field("middleware", &st.middleware)
            .field("plugins", &st.plugins)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticContext;
    use crate::error::Error;
    use crate::ids::SequentialIds;
    use crate::types::props;

    fn sdk(options: SdkOptions) -> Analytics {
        Analytics::builder(options)
            .context_provider(StaticContext(props(json!({"os": "test-os"}))))
            .id_generator(SequentialIds::new("id"))
            .build()
            .unwrap()
    }

    fn recorder(analytics: &Analytics) -> Arc<Mutex<Vec<AnalyticsEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        analytics.add_plugin(Plugin::new("recorder").on_events(&EventType::ALL, move |e| {
            sink.lock().push(e.clone());
            Ok(())
        }));
        seen
    }

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("checkout failed")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_build_rejects_invalid_options() {
        let mut options = SdkOptions::new("App");
        options.batch_size = 0;
        assert!(matches!(Analytics::new(options), Err(Error::Config(_))));
        assert!(Analytics::new(SdkOptions::new("  ")).is_err());
    }

    #[test]
    fn test_new_instance_defaults() {
        let analytics = sdk(SdkOptions::new("My Test App"));
        let user = analytics.current_user();

        assert_eq!(user.user_id, None);
        assert_eq!(user.anonymous_id, "id-1");
        assert!(analytics.has_consent());
        assert!(analytics.is_tracking_enabled());
        assert_eq!(analytics.storage_key(), "analytics_sdk_my_test_app");
        assert_eq!(analytics.pending_count(), 0);
    }

    #[test]
    fn test_context_contains_app_and_provider_values() {
        let analytics = sdk(SdkOptions::new("Shop"));
        let ctx = analytics.context();
        assert_eq!(ctx["appName"], "Shop");
        assert_eq!(ctx["appVersion"], "1.0.0");
        assert_eq!(ctx["os"], "test-os");

        analytics.set_context(props(json!({"campaign": "spring"})));
        assert_eq!(analytics.context()["campaign"], "spring");
        assert_eq!(analytics.context()["appName"], "Shop");
    }

    #[test]
    fn test_event_fields() {
        let analytics = sdk(SdkOptions::new("Shop"));
        let seen = recorder(&analytics);

        analytics.identify("u1", props(json!({"plan": "pro"})));
        analytics.page(Some("/pricing"), Properties::new());
        analytics.group("g1", props(json!({"size": 5})));
        analytics.flush();

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);

        assert_eq!(seen[0].event_type, EventType::Identify);
        assert_eq!(seen[0].traits.as_ref().unwrap()["plan"], "pro");
        assert_eq!(seen[0].context["traits"]["plan"], "pro");

        assert_eq!(seen[1].name.as_deref(), Some("/pricing"));
        assert_eq!(seen[1].user_id.as_deref(), Some("u1"));

        assert_eq!(seen[2].properties["groupId"], "g1");
        assert_eq!(seen[2].traits.as_ref().unwrap()["size"], 5);
        assert_ne!(seen[0].message_id, seen[1].message_id);
    }

    #[test]
    fn test_group_traits_merge() {
        let analytics = sdk(SdkOptions::new("Shop"));
        let seen = recorder(&analytics);

        analytics.group("g1", props(json!({"size": 5, "tier": "free"})));
        analytics.group("g1", props(json!({"tier": "paid"})));
        analytics.flush();

        let traits = seen.lock()[1].traits.clone().unwrap();
        assert_eq!(traits, props(json!({"size": 5, "tier": "paid"})));
    }

    #[test]
    fn test_integrations_pass_through() {
        let analytics = sdk(SdkOptions::new("Shop"));
        let seen = recorder(&analytics);

        let integrations: Integrations = [("warehouse".to_string(), false)].into_iter().collect();
        analytics.track_with("Signup", Properties::new(), integrations.clone());
        analytics.flush();

        assert_eq!(seen.lock()[0].integrations, integrations);
    }

    #[test]
    fn test_track_error_lists_sources() {
        let analytics = sdk(SdkOptions::new("Shop"));
        let seen = recorder(&analytics);

        let error = Outer(std::io::Error::new(std::io::ErrorKind::Other, "card declined"));
        analytics.track_error(&error, props(json!({"step": "payment"})));
        analytics.flush();

        let seen = seen.lock();
        let event = &seen[0];
        assert_eq!(event.event.as_deref(), Some("error"));
        assert_eq!(event.properties["message"], "checkout failed");
        assert_eq!(event.properties["sources"], json!(["card declined"]));
        assert_eq!(event.properties["step"], "payment");
    }

    #[test]
    fn test_track_performance() {
        let analytics = sdk(SdkOptions::new("Shop"));
        let seen = recorder(&analytics);

        analytics.track_performance("page_load", 1250.5, props(json!({"route": "/"})));
        analytics.flush();

        let seen = seen.lock();
        let event = &seen[0];
        assert_eq!(event.event.as_deref(), Some("performance_metric"));
        assert_eq!(event.properties["metricName"], "page_load");
        assert_eq!(event.properties["value"], 1250.5);
        assert_eq!(event.properties["route"], "/");
    }

    #[test]
    fn test_enable_tracking_requires_consent() {
        let mut options = SdkOptions::new("Shop");
        options.initial_consent = false;
        let analytics = sdk(options);

        analytics.enable_tracking();
        assert!(!analytics.is_tracking_enabled());

        analytics.give_consent();
        assert!(analytics.is_tracking_enabled());
    }

    #[test]
    fn test_instances_are_independent() {
        let a = sdk(SdkOptions::new("A"));
        let b = sdk(SdkOptions::new("B"));

        a.track("only-a", Properties::new());
        a.identify("user-a", Traits::new());

        assert_eq!(a.pending_count(), 2);
        assert_eq!(b.pending_count(), 0);
        assert_eq!(b.current_user().user_id, None);
    }

    #[test]
    fn test_accessors() {
        let analytics = sdk(SdkOptions::new("Shop"));
        analytics.use_middleware(|e: AnalyticsEvent, next: crate::middleware::Next| next.run(e));
        analytics.add_plugin(Plugin::new("p1"));

        assert_eq!(analytics.middleware_count(), 1);
        assert_eq!(analytics.plugin_names(), vec!["p1".to_string()]);
        assert_eq!(analytics.options().batch_size, 10);

        let debug = format!("{:?}", analytics);
        assert!(debug.contains("Shop"));
    }

    #[test]
    fn test_no_runtime_means_no_periodic_flush() {
        let analytics = sdk(SdkOptions::new("Shop"));
        assert!(!analytics.is_flush_scheduled());

        // explicit flushes still work
        let seen = recorder(&analytics);
        analytics.track("e", Properties::new());
        assert_eq!(analytics.flush(), 1);
        assert_eq!(seen.lock().len(), 1);
    }
}
