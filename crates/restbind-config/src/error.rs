//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why a configuration could not be loaded, overridden or applied.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required configuration file does not exist.
    #[error("no configuration file at {}", path.display())]
    FileNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The file exists but reading it failed.
    #[error("cannot read {}", path.display())]
    ReadError {
        /// Path that was read.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The source is neither TOML nor JSON.
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// The TOML source does not match the schema.
    #[error("invalid TOML configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    /// The JSON source does not match the schema.
    #[error("invalid JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// An environment override names a key the section does not have.
    #[error("section [{section}] has no field {field}")]
    UnknownField {
        /// Field as spelled in the variable name.
        field: String,
        /// Lowercase section name.
        section: String,
    },

    /// A value was parsed but is not acceptable.
    #[error("{field}: {reason}")]
    InvalidValue {
        /// Dotted path of the offending key, e.g. `server.http_addr`.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An environment override could not be parsed.
    #[error("environment override {var}: {reason}")]
    EnvParseError {
        /// Full variable name.
        var: String,
        /// What was expected.
        reason: String,
    },

    /// The `.env` file exists but is malformed.
    #[error("cannot load .env file: {0}")]
    DotenvError(#[from] dotenvy::Error),
}

impl ConfigError {
    pub(crate) fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub(crate) fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn unknown_field(field: impl Into<String>, section: impl Into<String>) -> Self {
        Self::UnknownField {
            field: field.into(),
            section: section.into(),
        }
    }

    /// Rejects the value stored under `field`.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_key() {
        let err = ConfigError::invalid_value("dispatch.blocking_threads", "must be at least 1");
        assert_eq!(err.to_string(), "dispatch.blocking_threads: must be at least 1");

        let err = ConfigError::unknown_field("WORKERS", "dispatch");
        assert_eq!(err.to_string(), "section [dispatch] has no field WORKERS");
    }

    #[test]
    fn test_missing_file_shows_path() {
        let err = ConfigError::file_not_found("/etc/restbind/restbind.toml");
        assert!(err.to_string().ends_with("/etc/restbind/restbind.toml"));
    }

    #[test]
    fn test_read_error_keeps_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ConfigError::read_error("restbind.toml", io);
        assert_eq!(err.source().map(ToString::to_string), Some("denied".to_string()));
    }
}
