//! Volley pipeline runtime.
//!
//! Runs are submitted onto an intake queue, executed by [`RunExecutor`] consumers which publish
//! their results onto a results queue, and persisted by [`ResultSink`] consumers. Stages only
//! ever talk to each other through queue messages.
pub mod runtime;

mod error;
mod executor;
mod message;
mod pipeline;
pub mod queue;
mod retry;
mod server;
mod sink;
pub mod store;
mod submit;

pub use crate::error::RuntimeError;
pub use crate::executor::RunExecutor;
pub use crate::message::Message;
pub use crate::pipeline::{DeadLetter, Disposition, RunState, Stage};
pub use crate::queue::{ChannelQueue, LocalQueue, Queue, QueueError};
pub use crate::retry::RetryPolicy;
pub use crate::runtime::{RuntimeConfig, VolleyRuntime};
pub use crate::server::{router, ApiState};
pub use crate::sink::ResultSink;
pub use crate::store::{AnyStore, LocalRunStore, MemoryStore, RunStore, SqliteStore, StoreError};
pub use crate::submit::{Ack, SubmitError, Submitter};
