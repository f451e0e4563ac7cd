//! Typed error hierarchy for the cbc-devices crate.
//!
//! `CbcError` covers every failure boundary a run can hit:
//! - Local input problems (`InvalidArgument`, `Credentials`, `Config`,
//!   `Input`) are detected before or between network calls.
//! - `Api` carries the HTTP status and the response body of a non-success
//!   reply from the Carbon Black Cloud API.
//! - `Network` and `Parse` wrap transport and deserialization failures.
//! - `Io` wraps failures reading input files or writing reports.
//!
//! Library functions return [`Result`]; only the binary's entry point
//! turns an error into a process exit status.

use reqwest::StatusCode;

/// Unified error type for all cbc-devices library operations.
#[derive(Debug, thiserror::Error)]
pub enum CbcError {
    /// A command-line value failed validation (bad date, negative
    /// threshold, start date after end date, etc.).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The credential file could not be read or does not hold the
    /// three expected values.
    #[error("invalid credentials file {path}: {message}")]
    Credentials {
        /// Path of the credential file that was read.
        path: String,
        /// What was wrong with it.
        message: String,
        /// The underlying IO error, if the file could not be read at all.
        #[source]
        source: Option<std::io::Error>,
    },

    /// The settings file could not be read or parsed, or a setting has an
    /// unusable value (e.g. a page size of zero).
    #[error("configuration error: {0}")]
    Config(String),

    /// A row in an input report (the inactive-device list) is malformed.
    #[error("line {line}: {message}")]
    Input {
        /// 1-based line number in the input file.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// The Carbon Black Cloud API returned a non-success HTTP status.
    ///
    /// The body is preserved because CBC error replies explain what was
    /// wrong with the query or the key.
    #[error("API error {status}: {body}")]
    Api {
        /// The HTTP status code returned by the API.
        status: StatusCode,
        /// The raw response body text, possibly empty.
        body: String,
    },

    /// JSON deserialization of a response body failed.
    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// A network-level failure occurred (DNS, TCP, TLS, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Reading an input file or writing a report failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CbcError {
    /// Returns the HTTP status for `Api` errors, `None` otherwise.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            CbcError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, CbcError>;

/// Maps an API status to the operator-facing explanation printed next to
/// the error. CBC uses 404 for an unknown org key, not only for a missing
/// resource.
pub fn describe_status(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "Invalid request. Check the query criteria.",
        401 => "Invalid API authentication key. Please validate the API key has the proper role.",
        404 => "Invalid org_key. Please validate the organization key.",
        500 => "CB internal server error. Please wait and retry.",
        _ => "Undefined error.",
    }
}
