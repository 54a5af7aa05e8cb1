//! Single-request HTTP probe with timeout and outcome classification.
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Url};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
#[allow(unused)]
use tracing::{debug, error, trace, warn};
use volley_core::{Classification, NetworkErrorKind, ProbeOutcome, RunSpec, SpecError};

/// A unit of work the [`Dispatcher`](crate::Dispatcher) can issue.
///
/// Implementations never fail: every failure mode is encoded into the returned outcome.
#[trait_variant::make(Probe: Send)]
pub trait LocalProbe {
    async fn probe(&self, sequence: u64) -> ProbeOutcome;
}

/// Request template shared by every probe of a run.
#[derive(Clone, Debug)]
pub struct ProbeOptions {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub payload: Option<Value>,
    pub timeout: Duration,
}

impl TryFrom<&RunSpec> for ProbeOptions {
    type Error = SpecError;

    fn try_from(spec: &RunSpec) -> Result<Self, Self::Error> {
        let method = Method::from_bytes(spec.method.as_bytes())
            .map_err(|_| SpecError::InvalidMethod(spec.method.clone()))?;

        let mut headers = HeaderMap::new();
        for (name, value) in spec.headers.iter().flatten() {
            let header = HeaderName::from_bytes(name.as_bytes()).ok();
            let value = HeaderValue::from_str(value).ok();
            match (header, value) {
                (Some(header), Some(value)) => {
                    headers.insert(header, value);
                }
                _ => return Err(SpecError::InvalidHeader(name.clone())),
            }
        }

        Ok(Self {
            url: spec.url()?,
            method,
            headers,
            payload: spec.payload.clone(),
            timeout: spec.timeout(),
        })
    }
}

/// [`Probe`] that performs one real HTTP exchange.
#[derive(Clone)]
pub struct HttpProbe {
    client: Client,
    options: Arc<ProbeOptions>,
}

struct Exchange {
    status: u16,
    first_byte: Duration,
    last_byte: Duration,
}

impl HttpProbe {
    pub fn new(client: Client, options: ProbeOptions) -> Self {
        Self {
            client,
            options: Arc::new(options),
        }
    }

    async fn exchange(&self, start: Instant) -> Result<Exchange, NetworkErrorKind> {
        let mut response = self.request().send().await.map_err(|e| error_kind(&e))?;
        // NOTE: The response head is the first byte the server sends back.
        let first_byte = start.elapsed();
        let status = response.status().as_u16();

        while response.chunk().await.map_err(|e| error_kind(&e))?.is_some() {}

        Ok(Exchange {
            status,
            first_byte,
            last_byte: start.elapsed(),
        })
    }

    fn request(&self) -> reqwest::RequestBuilder {
        let options = &self.options;
        let builder = self
            .client
            .request(options.method.clone(), options.url.clone())
            .headers(options.headers.clone());

        match &options.payload {
            None => builder,
            Some(Value::String(body)) => builder.body(body.clone()),
            Some(payload) => builder.json(payload),
        }
    }
}

impl Probe for HttpProbe {
    async fn probe(&self, sequence: u64) -> ProbeOutcome {
        let start = Instant::now();

        // Dropping the exchange future on timeout aborts the in-flight request, so only one
        // terminal outcome can ever be produced.
        let outcome = match timeout(self.options.timeout, self.exchange(start)).await {
            Ok(Ok(exchange)) => ProbeOutcome {
                sequence,
                classification: Classification::from_status(exchange.status),
                elapsed_ms: millis(exchange.last_byte),
                time_to_first_byte_ms: Some(millis(exchange.first_byte)),
                time_to_last_byte_ms: Some(millis(exchange.last_byte - exchange.first_byte)),
            },
            Ok(Err(kind)) => ProbeOutcome {
                sequence,
                classification: Classification::NetworkError(kind),
                elapsed_ms: millis(start.elapsed()),
                time_to_first_byte_ms: None,
                time_to_last_byte_ms: None,
            },
            Err(_) => {
                trace!("Probe {sequence} timed out");
                ProbeOutcome {
                    sequence,
                    classification: Classification::Timeout,
                    elapsed_ms: millis(start.elapsed()),
                    time_to_first_byte_ms: None,
                    time_to_last_byte_ms: None,
                }
            }
        };

        #[cfg(feature = "metrics")]
        record_metrics(&outcome);

        outcome
    }
}

fn error_kind(err: &reqwest::Error) -> NetworkErrorKind {
    debug!("Probe transport error: {err}");
    if err.is_connect() {
        NetworkErrorKind::Connect
    } else if err.is_redirect() {
        NetworkErrorKind::Redirect
    } else if err.is_body() {
        NetworkErrorKind::Body
    } else if err.is_decode() {
        NetworkErrorKind::Decode
    } else if err.is_request() {
        NetworkErrorKind::Request
    } else {
        NetworkErrorKind::Other
    }
}

fn millis(dur: Duration) -> f64 {
    dur.as_secs_f64() * 1_000.
}

#[cfg(feature = "metrics")]
fn record_metrics(outcome: &ProbeOutcome) {
    metrics::histogram!("volley_probe_latency_seconds").record(outcome.elapsed_ms / 1_000.);
    metrics::counter!(
        "volley_probe_total",
        "classification" => outcome.classification.label()
    )
    .increment(1);
}
