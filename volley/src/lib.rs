#![cfg_attr(docsrs, feature(doc_cfg))]
//! Bounded-concurrency HTTP load generation.
//!
//! A run issues exactly `numRequests` probes against a target using `concurrency` workers and
//! summarizes the outcomes into [`RunStats`](volley_core::RunStats).
//!
//! ```no_run
//! use volley::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), RunError> {
//!     let spec = RunSpec::new(RunId::generate(), "http://localhost:3000/", 100, 10);
//!     let result = Runner::new()?.run(&spec).await?;
//!     println!("{}", result.stats);
//!     Ok(())
//! }
//! ```

pub mod dispatcher;
mod error;
pub mod probe;
mod runner;

pub use dispatcher::{Dispatch, Dispatcher};
pub use error::RunError;
pub use probe::{HttpProbe, LocalProbe, Probe, ProbeOptions};
pub use runner::Runner;

pub mod prelude {
    pub use crate::{Dispatcher, HttpProbe, Probe, RunError, Runner};
    pub use volley_core::{
        Classification, ProbeOutcome, RunId, RunResult, RunSpec, RunStats, TimingSummary,
    };
}
