/// HTTP method used when a run does not name one.
pub const DEFAULT_METHOD: &str = "GET";

/// Per-probe timeout used when a run does not provide one.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Upper bound on the number of concurrent workers a single run may ask for.
pub const MAX_CONCURRENCY: usize = 10_000;

/// Status code recorded for a probe that ran out of time.
pub const TIMEOUT_STATUS_CODE: u16 = 408;

/// Status code recorded when no response was ever received.
pub const NO_RESPONSE_STATUS_CODE: u16 = 0;
