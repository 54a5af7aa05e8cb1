use crate::{RunId, RunStats, NO_RESPONSE_STATUS_CODE, TIMEOUT_STATUS_CODE};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Transport-level failure categories, kept for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NetworkErrorKind {
    Connect,
    Request,
    Body,
    Redirect,
    Decode,
    Other,
}

impl NetworkErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Body => "body",
            Self::Redirect => "redirect",
            Self::Decode => "decode",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a single probe ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Classification {
    /// 2xx response.
    Success(u16),
    /// Any other response the server actually sent.
    HttpError(u16),
    Timeout,
    NetworkError(NetworkErrorKind),
}

impl Classification {
    pub fn from_status(status: u16) -> Self {
        if (200..300).contains(&status) {
            Self::Success(status)
        } else {
            Self::HttpError(status)
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Success(code) | Self::HttpError(code) => *code,
            Self::Timeout => TIMEOUT_STATUS_CODE,
            Self::NetworkError(_) => NO_RESPONSE_STATUS_CODE,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::HttpError(_) => "httpError",
            Self::Timeout => "timeout",
            Self::NetworkError(_) => "networkError",
        }
    }
}

/// Result of one HTTP attempt within a run. Times are in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireOutcome", from = "WireOutcome")]
pub struct ProbeOutcome {
    pub sequence: u64,
    pub classification: Classification,
    pub elapsed_ms: f64,
    pub time_to_first_byte_ms: Option<f64>,
    pub time_to_last_byte_ms: Option<f64>,
}

impl ProbeOutcome {
    pub fn status_code(&self) -> u16 {
        self.classification.status_code()
    }

    pub fn is_success(&self) -> bool {
        self.classification.is_success()
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
enum WireStatus {
    Success,
    HttpError,
    Timeout,
    NetworkError,
}

/// Shape of a probe outcome inside the `result` array of a results message.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOutcome {
    n: u64,
    code_status: u16,
    response_time: f64,
    status: WireStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time_to_first_byte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time_to_last_byte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_kind: Option<NetworkErrorKind>,
}

impl From<ProbeOutcome> for WireOutcome {
    fn from(outcome: ProbeOutcome) -> Self {
        let (status, error_kind) = match outcome.classification {
            Classification::Success(_) => (WireStatus::Success, None),
            Classification::HttpError(_) => (WireStatus::HttpError, None),
            Classification::Timeout => (WireStatus::Timeout, None),
            Classification::NetworkError(kind) => (WireStatus::NetworkError, Some(kind)),
        };

        Self {
            n: outcome.sequence,
            code_status: outcome.status_code(),
            response_time: outcome.elapsed_ms,
            status,
            time_to_first_byte: outcome.time_to_first_byte_ms,
            time_to_last_byte: outcome.time_to_last_byte_ms,
            error_kind,
        }
    }
}

impl From<WireOutcome> for ProbeOutcome {
    fn from(wire: WireOutcome) -> Self {
        let classification = match wire.status {
            WireStatus::Success => Classification::Success(wire.code_status),
            WireStatus::HttpError => Classification::HttpError(wire.code_status),
            WireStatus::Timeout => Classification::Timeout,
            WireStatus::NetworkError => {
                Classification::NetworkError(wire.error_kind.unwrap_or(NetworkErrorKind::Other))
            }
        };

        Self {
            sequence: wire.n,
            classification,
            elapsed_ms: wire.response_time,
            time_to_first_byte_ms: wire.time_to_first_byte,
            time_to_last_byte_ms: wire.time_to_last_byte,
        }
    }
}

/// Everything a completed run produced, as carried on the results queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    #[serde(rename = "testId")]
    pub run_id: RunId,
    #[serde(rename = "url")]
    pub target_url: String,
    #[serde(rename = "requests")]
    pub num_requests: u64,
    pub concurrency: usize,
    #[serde(rename = "result")]
    pub outcomes: Vec<ProbeOutcome>,
    pub stats: RunStats,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}

/// A run result as stored, with the time the store first accepted it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    #[serde(flatten)]
    pub result: RunResult,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl RunRecord {
    pub fn run_id(&self) -> &RunId {
        &self.result.run_id
    }
}
