//! Main configuration types.
//!
//! This module provides the top-level [`RestbindConfig`] struct, its builder
//! and the conversions into the transport, logging and router settings.

use std::time::Duration;

use restbind_server::{JsonExceptionHandler, RestRouter, ServerConfig};
use restbind_telemetry::{create_env_filter, LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, DispatchSection, LoggingSection, ServerSection};

/// Complete restbind service configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// ```
/// use restbind_config::RestbindConfig;
///
/// let config = RestbindConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert!(!config.dispatch.json_errors);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct RestbindConfig {
    /// Transport configuration.
    #[serde(default)]
    pub server: ServerSection,

    /// Dispatch configuration.
    #[serde(default)]
    pub dispatch: DispatchSection,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl RestbindConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> RestbindConfigBuilder {
        RestbindConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - Server address is not a socket address
    /// - The body limit, request timeout or blocking pool size is zero
    /// - The log filter does not parse
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.http_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value("server.max_body_bytes", "must be at least 1"));
        }
        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::invalid_value("server.request_timeout_ms", "must be at least 1"));
        }
        if self.dispatch.blocking_threads == 0 {
            return Err(ConfigError::invalid_value("dispatch.blocking_threads", "must be at least 1"));
        }
        if self.logging.enabled {
            create_env_filter(&self.logging.level)
                .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;
        }
        Ok(())
    }

    /// Development preset: pretty debug logs with locations, JSON error bodies.
    ///
    /// ```
    /// use restbind_config::RestbindConfig;
    ///
    /// let config = RestbindConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config.logging.include_location = true;
        config.dispatch.json_errors = true;
        config
    }

    /// Production preset: JSON info logs.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.logging.level = "info".to_string();
        config.logging.format = LogFormat::Json;
        config
    }

    /// Transport settings for [`Server`](restbind_server::Server).
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::builder()
            .http_addr(self.server.http_addr.clone())
            .shutdown_timeout(Duration::from_secs(self.server.shutdown_timeout_secs))
            .request_timeout(Duration::from_millis(self.server.request_timeout_ms))
            .max_body_bytes(self.server.max_body_bytes)
            .blocking_threads(self.dispatch.blocking_threads)
            .build()
    }

    /// Settings for [`init_logging`](restbind_telemetry::init_logging).
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            enabled: self.logging.enabled,
            level: self.logging.level.clone(),
            format: self.logging.format,
            file_line_info: self.logging.include_location,
            ..LogConfig::production()
        }
    }

    /// Applies the settings the router itself honors.
    ///
    /// Routes registered afterwards read at most `server.max_body_bytes`.
    /// With `json_errors`, failures no other handler claims are answered by
    /// [`JsonExceptionHandler`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `json_errors` is set and the
    /// router already serves.
    pub fn configure(&self, rest: &mut RestRouter) -> Result<(), ConfigError> {
        if self.dispatch.json_errors {
            rest.add_exception_handler(JsonExceptionHandler::entry())
                .map_err(|e| ConfigError::invalid_value("dispatch.json_errors", e.to_string()))?;
        }
        rest.set_body_limit(self.server.max_body_bytes);
        Ok(())
    }
}

/// Builder for [`RestbindConfig`].
#[derive(Debug, Default)]
pub struct RestbindConfigBuilder {
    server: Option<ServerSection>,
    dispatch: Option<DispatchSection>,
    logging: Option<LoggingSection>,
}

impl RestbindConfigBuilder {
    /// Creates a builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transport section.
    #[must_use]
    pub fn server(mut self, server: ServerSection) -> Self {
        self.server = Some(server);
        self
    }

    /// Sets the dispatch section.
    #[must_use]
    pub fn dispatch(mut self, dispatch: DispatchSection) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Sets the logging section.
    #[must_use]
    pub fn logging(mut self, logging: LoggingSection) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> RestbindConfig {
        RestbindConfig {
            server: self.server.unwrap_or_default(),
            dispatch: self.dispatch.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
        }
    }
}
