//! Configuration Loader
//!
//! Layers three sources, lowest precedence first: serde defaults, an optional
//! YAML/TOML file, and `RESILIENCE__SECTION__FIELD` environment variables.

use super::error::{ConfigResult, ConfigurationError};
use super::ServiceConfig;
use config::{Config, Environment, File};
use std::path::Path;
use tracing::{debug, info};

/// Default environment variable prefix
pub const ENV_PREFIX: &str = "RESILIENCE";

const ENV_SEPARATOR: &str = "__";

impl ServiceConfig {
    /// Load configuration using the default `RESILIENCE` prefix
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> ConfigResult<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration with an explicit environment prefix
    ///
    /// A path that is given but missing is an error; the file format is
    /// inferred from its extension.
    pub fn load_with_prefix<P: AsRef<Path>>(path: Option<P>, prefix: &str) -> ConfigResult<Self> {
        let path: Option<&Path> = path.as_ref().map(|p| p.as_ref());
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigurationError::config_file_not_found(path));
            }
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(prefix)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let source_name = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("{prefix}{ENV_SEPARATOR}* environment"));

        let config: ServiceConfig = builder
            .build()
            .and_then(|built| built.try_deserialize::<ServiceConfig>())
            .map_err(|e| ConfigurationError::load_error(source_name.clone(), e))?;

        config.validate()?;

        info!(
            source = %source_name,
            database = %redact_url(&config.database.url),
            redis = %redact_url(&config.redis.url),
            broker = %redact_url(&config.broker.url),
            "Configuration loaded"
        );

        Ok(config)
    }
}

/// Strip credentials from a connection URL before it is logged
pub fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}
