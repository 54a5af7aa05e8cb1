use serde::{Deserialize, Serialize};
use std::fmt;
use volley_core::RunId;

/// Lifecycle of a single run as it moves through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Submitted,
    Dispatched,
    Aggregated,
    Published,
    Persisted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Submitted => "SUBMITTED",
            Self::Dispatched => "DISPATCHED",
            Self::Aggregated => "AGGREGATED",
            Self::Published => "PUBLISHED",
            Self::Persisted => "PERSISTED",
        };
        f.write_str(name)
    }
}

/// Pipeline stage a message was abandoned at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Intake,
    Execute,
    Publish,
    Results,
    Persist,
}

/// A message that could not make it through its stage, kept for inspection or replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<RunId>,
    pub reason: String,
    pub payload: String,
}

impl DeadLetter {
    pub fn new(stage: Stage, test_id: Option<RunId>, reason: impl ToString, payload: &[u8]) -> Self {
        Self {
            stage,
            test_id,
            reason: reason.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
        }
    }
}

/// What a consumer did with one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Published(RunId),
    Persisted(RunId),
    Duplicate(RunId),
    DeadLettered(Stage),
}
