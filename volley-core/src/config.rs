use crate::{SpecError, DEFAULT_METHOD, DEFAULT_TIMEOUT_MS, MAX_CONCURRENCY};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Opaque identifier for a single run. Travels on the wire as `testId`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identifier (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One load-test request, as carried on the intake queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSpec {
    #[serde(rename = "testId")]
    pub run_id: RunId,
    pub target_url: String,
    pub num_requests: u64,
    pub concurrency: usize,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default = "default_timeout_ms", alias = "timeout")]
    pub timeout_ms: u64,
}

impl RunSpec {
    pub fn new(run_id: RunId, target_url: &str, num_requests: u64, concurrency: usize) -> Self {
        Self {
            run_id,
            target_url: target_url.to_string(),
            num_requests,
            concurrency,
            method: default_method(),
            payload: None,
            headers: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Checks everything that must hold before a run may be dispatched.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.num_requests == 0 {
            return Err(SpecError::ZeroRequests);
        }
        if self.concurrency == 0 {
            return Err(SpecError::ZeroConcurrency);
        }
        if self.concurrency > MAX_CONCURRENCY {
            return Err(SpecError::ConcurrencyTooHigh {
                requested: self.concurrency,
                max: MAX_CONCURRENCY,
            });
        }
        if self.timeout_ms == 0 {
            return Err(SpecError::ZeroTimeout);
        }

        self.url()?;

        http::Method::from_bytes(self.method.as_bytes())
            .map_err(|_| SpecError::InvalidMethod(self.method.clone()))?;

        for (name, value) in self.headers.iter().flatten() {
            if http::HeaderName::from_bytes(name.as_bytes()).is_err()
                || http::HeaderValue::from_str(value).is_err()
            {
                return Err(SpecError::InvalidHeader(name.clone()));
            }
        }

        Ok(())
    }

    /// Parsed target URL. Only `http` and `https` targets are accepted.
    pub fn url(&self) -> Result<Url, SpecError> {
        let invalid = |reason: String| SpecError::InvalidUrl {
            url: self.target_url.clone(),
            reason,
        };

        let url = Url::parse(&self.target_url).map_err(|err| invalid(err.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(invalid(format!("unsupported scheme `{other}`"))),
        }
    }
}

/// Body accepted by the submission boundary. Every field is optional on the wire so that missing
/// parameters can be reported as validation errors instead of decode failures.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub target_url: Option<String>,
    pub num_requests: Option<u64>,
    pub concurrency: Option<usize>,
    pub method: Option<String>,
    pub payload: Option<Value>,
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(alias = "timeout")]
    pub timeout_ms: Option<u64>,
}

impl SubmitRequest {
    pub fn new(target_url: &str, num_requests: u64, concurrency: usize) -> Self {
        Self {
            target_url: Some(target_url.to_string()),
            num_requests: Some(num_requests),
            concurrency: Some(concurrency),
            ..Default::default()
        }
    }

    /// Assigns `run_id` and produces a validated [`RunSpec`].
    pub fn into_spec(self, run_id: RunId) -> Result<RunSpec, SpecError> {
        let spec = RunSpec {
            run_id,
            target_url: self.target_url.ok_or(SpecError::Missing("targetUrl"))?,
            num_requests: self.num_requests.ok_or(SpecError::Missing("numRequests"))?,
            concurrency: self.concurrency.ok_or(SpecError::Missing("concurrency"))?,
            method: self.method.unwrap_or_else(default_method),
            payload: self.payload,
            headers: self.headers,
            timeout_ms: self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
        };
        spec.validate()?;
        Ok(spec)
    }
}

fn default_method() -> String {
    DEFAULT_METHOD.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}
