//! Error types for report aggregation
//!
//! Three layers, from the outside in:
//!
//! - [`ReportError`]: what a caller of the engine can observe. Only
//!   `InvalidIdentifier`, `AllDimensionsFailed` and `InternalFault` are
//!   produced while serving a request.
//! - [`FetchError`]: a per-dimension failure. Never escapes the coordinator;
//!   it ends up as an "unavailable" marker inside a report.
//! - [`ProviderError`]: raw upstream-client failures, translated into
//!   [`FetchError`] by the dimension fetchers.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

use crate::dimension::Dimension;
use crate::identifier::Identifier;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, ReportError>;

/// Classification of a single dimension failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// The security does not exist upstream, or the provider has no data for it
    NotFound,
    /// Transient transport or provider failure
    UpstreamUnavailable,
    /// The fetch did not settle within its time budget
    Timeout,
    /// The provider answered with something that does not fit the schema
    MalformedData,
}

impl FetchErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::Timeout => "timeout",
            Self::MalformedData => "malformed_data",
        }
    }

    /// Whether asking again later may succeed
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::UpstreamUnavailable | Self::Timeout)
    }
}

impl Display for FetchErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure descriptor for one dimension fetch
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::NotFound, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::UpstreamUnavailable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Timeout, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::MalformedData, message)
    }
}

/// Errors surfaced by the report engine
#[derive(Debug, Clone, Error)]
pub enum ReportError {
    /// The caller supplied something that is not a six-digit code
    #[error("invalid identifier {input:?}: {reason}")]
    InvalidIdentifier { input: String, reason: String },

    /// Every dimension failed; nothing was cached
    #[error("all dimensions failed for {code}: {}", summarize(.failures))]
    AllDimensionsFailed {
        code: Identifier,
        failures: Vec<(Dimension, FetchError)>,
    },

    /// Broken engine invariant; indicates a bug
    #[error("internal fault: {0}")]
    InternalFault(String),

    /// Rejected configuration at construction time
    #[error("configuration error: {0}")]
    Config(String),
}

impl ReportError {
    pub fn invalid_identifier(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code for the shell layer
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier { .. } => "report.invalid_identifier",
            Self::AllDimensionsFailed { .. } => "report.all_dimensions_failed",
            Self::InternalFault(_) => "report.internal_fault",
            Self::Config(_) => "report.config",
        }
    }
}

impl From<quark_utils::ConfigError> for ReportError {
    fn from(err: quark_utils::ConfigError) -> Self {
        ReportError::Config(err.to_string())
    }
}

fn summarize(failures: &[(Dimension, FetchError)]) -> String {
    failures
        .iter()
        .map(|(dimension, err)| format!("{dimension}={}", err.kind))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Upstream client errors
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network or HTTP transport error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("HTTP {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    /// Response body was not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Provider answered but has no record for the security
    #[error("no data: {0}")]
    NotFound(String),

    /// Provider answered with an unexpected shape
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Fetch failure kind this error translates to
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Network(e) if e.is_timeout() => FetchErrorKind::Timeout,
            Self::Network(e) if e.is_decode() => FetchErrorKind::MalformedData,
            Self::Network(_) => FetchErrorKind::UpstreamUnavailable,
            Self::Status { status: 404, .. } | Self::NotFound(_) => FetchErrorKind::NotFound,
            Self::Status { .. } => FetchErrorKind::UpstreamUnavailable,
            Self::Json(_) | Self::Malformed(_) => FetchErrorKind::MalformedData,
        }
    }

    /// Whether the upstream client may repeat the request
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => !e.is_decode() && !e.is_builder(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Json(_) | Self::NotFound(_) | Self::Malformed(_) => false,
        }
    }
}

impl From<ProviderError> for FetchError {
    fn from(err: ProviderError) -> Self {
        FetchError::new(err.kind(), err.to_string())
    }
}
