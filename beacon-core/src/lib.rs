//! # beacon-core
//!
//! Core library for beacon - consent-aware product analytics.
//!
//! This library provides:
//! - The [`Analytics`] facade: track, page, identify, group and alias calls
//! - Batched delivery through a middleware chain to registered plugins
//! - A consent state machine gating collection and persistence
//! - Identity persistence through a pluggable storage backend
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Events flow through three stages:
//! - **Collection:** a facade call builds an event (global properties,
//!   identity and context merged in) and queues it if consent is given
//! - **Processing:** on flush the batch runs through the middleware chain,
//!   one independent walk per event
//! - **Delivery:** surviving events go to every plugin with a handler for
//!   their type, each plugin isolated from the others' failures
//!
//! ## Example
//!
//! ```rust,no_run
//! use beacon_core::plugins::console;
//! use beacon_core::{props, Analytics, SdkOptions};
//! use serde_json::json;
//!
//! let analytics = Analytics::new(SdkOptions::new("My App")).expect("invalid options");
//! analytics.add_plugin(console::destination());
//!
//! analytics.identify("user-42", props(json!({"plan": "pro"})));
//! analytics.track("Report Exported", props(json!({"format": "csv"})));
//! analytics.shutdown();
//! ```

// Re-export commonly used items at the crate root
pub use analytics::{Analytics, AnalyticsBuilder};
pub use collector::PublishStats;
pub use config::{Config, SdkOptions};
pub use consent::{ConsentPreferences, ConsentStatus};
pub use context::{ContextProvider, EnvironmentContext, StaticContext};
pub use error::{Error, Result};
pub use ids::{IdGenerator, SequentialIds, UuidGenerator};
pub use middleware::{Middleware, Next};
pub use plugins::{Plugin, PluginKind};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use types::*;

// Public modules
pub mod analytics;
pub mod collector;
pub mod config;
pub mod consent;
pub mod context;
pub mod error;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod plugins;
pub mod storage;
pub mod types;
