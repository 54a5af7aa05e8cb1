use crate::{queue::QueueError, server::ServerError, store::StoreError};
use thiserror::Error;
use volley::RunError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Metrics exporter error: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
