//! Error types for the impact pipeline.
//!
//! The aggregation math itself never fails. Errors come from loading input
//! documents, from the adapters, and from selecting a region that is not in
//! the grid-intensity table.

use ecotrace_core::EcoError;
use thiserror::Error;

/// Impact pipeline errors.
#[derive(Error, Debug)]
pub enum ImpactError {
    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (file reading)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] EcoError),

    /// Region missing from the grid-intensity table
    #[error("unknown region: {0}")]
    UnknownRegion(String),

    /// An adapter call failed
    #[error("{adapter} request failed ({kind}): {message}")]
    Adapter {
        /// Adapter that failed (inventory, metrics, cost)
        adapter: String,
        /// Failure class
        kind: SourceErrorKind,
        /// Message from the adapter
        message: String,
    },

    /// Input row that cannot be interpreted
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Classification of adapter failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// Credentials rejected or expired
    Unauthorized,
    /// Authenticated but lacking the required role
    PermissionDenied,
    /// The request is not supported for this resource
    BadRequest,
    /// Anything else (transport, server error)
    Other,
}

impl std::fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceErrorKind::Unauthorized => "unauthorized",
            SourceErrorKind::PermissionDenied => "permission denied",
            SourceErrorKind::BadRequest => "bad request",
            SourceErrorKind::Other => "error",
        };
        f.write_str(s)
    }
}

impl ImpactError {
    /// Create an adapter error.
    pub fn adapter(
        adapter: impl Into<String>,
        kind: SourceErrorKind,
        message: impl Into<String>,
    ) -> Self {
        ImpactError::Adapter {
            adapter: adapter.into(),
            kind,
            message: message.into(),
        }
    }

    /// Bad requests come from deployments that do not support a metric
    /// filter; the pipeline skips them without reporting.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            ImpactError::Adapter {
                kind: SourceErrorKind::BadRequest,
                ..
            }
        )
    }

    /// Create a user-friendly message for this error.
    pub fn friendly_message(&self) -> String {
        match self {
            ImpactError::Adapter {
                adapter,
                kind: SourceErrorKind::PermissionDenied,
                ..
            } if adapter == "cost" => {
                "Permission denied: the account lacks 'Cost Management Reader' access.".to_string()
            }
            ImpactError::Adapter {
                kind: SourceErrorKind::Unauthorized,
                ..
            } => "Authentication failed. Refresh the session credentials and retry.".to_string(),
            ImpactError::UnknownRegion(region) => {
                format!("Unknown region '{}'. Run 'ecotrace regions' to list valid names.", region)
            }
            ImpactError::Config(e) => match e.guidance() {
                Some(hint) => format!("{}. {}", e, hint),
                None => e.to_string(),
            },
            _ => format!("Error: {}", self),
        }
    }
}

/// Result type for impact operations.
pub type Result<T> = std::result::Result<T, ImpactError>;
