use thiserror::Error;

/// Type alias for Result with ScanError
pub type Result<T> = std::result::Result<T, ScanError>;

/// Error types for the mailbox scan pipeline
#[derive(Error, Debug)]
pub enum ScanError {
    /// Invalid or missing configuration; raised before any network call
    #[error("Configuration error: {0}")]
    Config(String),

    /// Device flow could not start, or no access token was obtained
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Non-success HTTP status from the mailbox API (other than 429)
    #[error("Mailbox request failed (HTTP {status}): {message}")]
    Fetch { status: u16, message: String },

    /// Transport-level error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// IO error (token cache, CSV output)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

const DEFAULT_RETRY_AFTER: u64 = 5;

/// Parse the Retry-After header from a 429 response.
///
/// The header can be delay-seconds (e.g. "120") or an HTTP date
/// (e.g. "Wed, 21 Oct 2015 07:28:00 GMT"). Missing or invalid values
/// fall back to a default of 5 seconds.
pub fn retry_after_seconds(headers: &reqwest::header::HeaderMap) -> u64 {
    if let Some(value) = headers.get("retry-after") {
        if let Ok(raw) = value.to_str() {
            if let Ok(seconds) = raw.parse::<u64>() {
                return seconds;
            }

            if let Ok(http_date) = httpdate::parse_http_date(raw) {
                let now = std::time::SystemTime::now();
                if let Ok(duration) = http_date.duration_since(now) {
                    return duration.as_secs();
                }
            }
        }
    }

    DEFAULT_RETRY_AFTER
}

const REDACTED_BODY_MAX_LEN: usize = 200;

/// Truncate an error response body before it lands in logs or error messages.
pub fn redact_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= REDACTED_BODY_MAX_LEN {
        trimmed.to_string()
    } else {
        let cut = (1..=REDACTED_BODY_MAX_LEN)
            .rev()
            .find(|&i| trimmed.is_char_boundary(i))
            .unwrap_or(0);
        format!("{}...[truncated {} bytes]", &trimmed[..cut], trimmed.len())
    }
}
