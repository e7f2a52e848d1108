//! Layered configuration loading.
//!
//! A [`ConfigLoader`] starts from a preset, may replace it with the contents
//! of a file or string, and finally applies environment overrides named
//! `PREFIX__SECTION__FIELD`.

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use restbind_telemetry::LogFormat;

use crate::{ConfigError, RestbindConfig};

/// Serialization format of a configuration source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// TOML, selected by a `.toml` extension.
    Toml,
    /// JSON, selected by a `.json` extension.
    Json,
}

impl Format {
    /// Picks the format from a file extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnsupportedFormat` for any other extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?
            .parse()
    }

    fn parse(self, content: &str) -> Result<RestbindConfig, ConfigError> {
        Ok(match self {
            Self::Toml => toml::from_str(content)?,
            Self::Json => serde_json::from_str(content)?,
        })
    }
}

impl FromStr for Format {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Builds a [`RestbindConfig`] from layered sources.
///
/// Sources are applied in call order. Reading a file replaces the whole
/// configuration, so keys the file leaves out fall back to their defaults
/// rather than to an earlier preset. Environment overrides are applied last,
/// inside [`load`](Self::load).
///
/// ```no_run
/// use restbind_config::ConfigLoader;
///
/// # fn main() -> Result<(), restbind_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_file("restbind.toml")?
///     .with_env_prefix("RESTBIND")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: RestbindConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Starts from [`RestbindConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from [`RestbindConfig::development`].
    ///
    /// ```
    /// use restbind_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert!(config.dispatch.json_errors);
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = RestbindConfig::development();
        self
    }

    /// Starts from [`RestbindConfig::production`].
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = RestbindConfig::production();
        self
    }

    /// Replaces the configuration with the contents of `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing, unreadable, has an extension other than
    /// `.toml` or `.json`, or does not match the schema.
    pub fn with_file(self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = Format::from_path(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::file_not_found(path)
            } else {
                ConfigError::read_error(path, e)
            }
        })?;
        self.with_str(&content, format)
    }

    /// Like [`with_file`](Self::with_file), but a missing file leaves the
    /// configuration untouched.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed.
    pub fn with_optional_file(self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Replaces the configuration with `content` parsed as `format`.
    ///
    /// ```
    /// use restbind_config::{ConfigLoader, Format};
    ///
    /// let config = ConfigLoader::new()
    ///     .with_str("[dispatch]\nblocking_threads = 16", Format::Toml)
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.dispatch.blocking_threads, 16);
    /// ```
    ///
    /// # Errors
    ///
    /// Fails if `content` does not match the schema.
    pub fn with_str(mut self, content: &str, format: Format) -> Result<Self, ConfigError> {
        self.config = format.parse(content)?;
        Ok(self)
    }

    /// Reads overrides from variables named `PREFIX__SECTION__FIELD`, for
    /// example `RESTBIND__DISPATCH__JSON_ERRORS=true`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_ascii_uppercase());
        self
    }

    /// Loads the nearest `.env` file into the process environment. A missing
    /// file is ignored.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::DotenvError` if the file is malformed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Err(e) if !e.not_found() => Err(e.into()),
            _ => Ok(self),
        }
    }

    /// Applies environment overrides, then validates.
    ///
    /// # Errors
    ///
    /// Fails if an override is malformed or names an unknown field, or if
    /// [`RestbindConfig::validate`] rejects the result.
    pub fn load(mut self) -> Result<RestbindConfig, ConfigError> {
        if let Some(prefix) = &self.env_prefix {
            apply_overrides(&mut self.config, prefix, env::vars())?;
        }
        self.config.validate()?;
        Ok(self.config)
    }

    /// The configuration as layered so far, without overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> RestbindConfig {
        self.config
    }
}

/// Applies every `PREFIX__SECTION__FIELD` variable in `vars`, sorted by name.
fn apply_overrides<I>(config: &mut RestbindConfig, prefix: &str, vars: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let marker = format!("{prefix}__");
    let mut matching: Vec<(String, String)> = vars.into_iter().filter(|(name, _)| name.starts_with(&marker)).collect();
    matching.sort();

    for (var, value) in &matching {
        let rest = &var[marker.len()..];
        let Some((section, field)) = rest.split_once("__").filter(|(_, f)| !f.contains("__")) else {
            return Err(ConfigError::env_parse_error(var, "expected PREFIX__SECTION__FIELD"));
        };
        apply_override(config, var, section, field, value)?;
    }
    Ok(())
}

fn apply_override(
    config: &mut RestbindConfig,
    var: &str,
    section: &str,
    field: &str,
    value: &str,
) -> Result<(), ConfigError> {
    let section = section.to_ascii_lowercase();
    match (section.as_str(), field.to_ascii_lowercase().as_str()) {
        ("server", "http_addr") => config.server.http_addr = value.to_string(),
        ("server", "shutdown_timeout_secs") => config.server.shutdown_timeout_secs = number(var, value)?,
        ("server", "request_timeout_ms") => config.server.request_timeout_ms = number(var, value)?,
        ("server", "max_body_bytes") => config.server.max_body_bytes = number(var, value)?,
        ("dispatch", "blocking_threads") => config.dispatch.blocking_threads = number(var, value)?,
        ("dispatch", "json_errors") => config.dispatch.json_errors = flag(var, value)?,
        ("logging", "enabled") => config.logging.enabled = flag(var, value)?,
        ("logging", "level") => config.logging.level = value.to_string(),
        ("logging", "format") => {
            config.logging.format = value
                .parse::<LogFormat>()
                .map_err(|_| ConfigError::env_parse_error(var, "expected json or pretty"))?;
        }
        ("logging", "include_location") => config.logging.include_location = flag(var, value)?,
        _ => return Err(ConfigError::unknown_field(field, section)),
    }
    Ok(())
}

fn number<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(var, "expected a non-negative integer"))
}

fn flag(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env_parse_error(var, "expected a boolean")),
    }
}
