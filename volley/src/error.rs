use thiserror::Error;
use volley_core::SpecError;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Invalid run specification: {0}")]
    Spec(#[from] SpecError),

    #[error("Unable to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Dispatcher worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
