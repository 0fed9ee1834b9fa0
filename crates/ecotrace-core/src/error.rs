//! Error types shared across ecotrace crates.
//!
//! [`EcoError`] covers the failures that can happen around the impact
//! pipeline: configuration, file access and parsing of input documents.
//! Classification fallbacks (unknown models, unknown currencies) are not
//! errors and never produce one.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`EcoError`].
pub type Result<T> = std::result::Result<T, EcoError>;

/// Error type for ecotrace operations outside the pure aggregation math.
#[derive(Debug, Error)]
pub enum EcoError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file not found
    #[error("Configuration not found at {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration file is invalid YAML
    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Parsing Errors
    // =========================================================================
    /// YAML parsing error
    #[error("YAML parse error in {context}: {message}")]
    YamlParse { context: String, message: String },

    // =========================================================================
    // Environment Errors
    // =========================================================================
    /// Home directory unknown, so default paths cannot be resolved
    #[error("HOME environment variable not set")]
    HomeNotSet,
}

impl EcoError {
    /// Create a ConfigNotFound error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create a ConfigValidation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create a YAML parse error
    pub fn yaml_parse(context: impl Into<String>, source: serde_yaml::Error) -> Self {
        Self::YamlParse {
            context: context.into(),
            message: source.to_string(),
        }
    }

    /// Returns true if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. } | Self::ConfigInvalid { .. } | Self::ConfigValidation { .. }
        )
    }

    /// Returns actionable guidance for the user
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound { .. } => {
                Some("Create ~/.ecotrace/config.yaml or pass --config with an explicit path")
            }
            Self::ConfigInvalid { .. } => Some("Check YAML syntax in the configuration file"),
            Self::ConfigValidation { .. } => {
                Some("Run 'ecotrace regions' to list valid region names")
            }
            Self::HomeNotSet => Some("Set HOME or pass --config and --log-dir explicitly"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_not_found_error() {
        let err = EcoError::config_not_found("/home/user/.ecotrace/config.yaml");
        assert!(err.to_string().contains("Configuration not found"));
        assert!(err.is_config_error());
        assert!(err.guidance().is_some());
    }

    #[test]
    fn test_yaml_parse_error_keeps_context() {
        let source = serde_yaml::from_str::<serde_yaml::Value>("a: [unclosed").unwrap_err();
        let err = EcoError::yaml_parse("config", source);
        assert!(err.to_string().contains("config"));
        assert!(!err.is_config_error());
    }

    #[test]
    fn test_error_classification() {
        assert!(EcoError::config_validation("bad region").is_config_error());
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!EcoError::io("reading config", "/etc/x", io).is_config_error());
        assert!(!EcoError::HomeNotSet.is_config_error());
    }

    #[test]
    fn test_error_guidance() {
        let err = EcoError::config_validation("unknown region 'Mars'");
        assert_eq!(
            err.guidance(),
            Some("Run 'ecotrace regions' to list valid region names")
        );
        assert!(EcoError::HomeNotSet.guidance().unwrap().contains("HOME"));
        let io = std::io::Error::other("x");
        assert_eq!(EcoError::io("reading", "/tmp/x", io).guidance(), None);
    }
}
