//! Event collection: queueing, periodic flush and delivery
//!
//! ## Architecture
//!
//! - Events are queued in memory only while consent is given
//! - A full batch is flushed synchronously from the call that filled it
//! - A tokio task flushes whatever is queued once per flush interval
//! - Flushing swaps the queue out, runs each event through the middleware
//!   chain and dispatches the survivors to every plugin
//! - A failing plugin never blocks the others or the queue

mod delivery;
mod queue;
mod timer;

pub use delivery::{deliver_batch, BatchDelivery};
pub use queue::{EventQueue, PublishStats};
pub use timer::FlushTimer;
