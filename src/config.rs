//! TOML-based application configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::renewable::{MAX_CAPACITY_KW, MIN_CAPACITY_KW};

/// Top-level configuration parsed from TOML.
///
/// All sections have defaults that point at the bundled sample data and a
/// prediction service on localhost. Load with [`AppConfig::from_toml_file`]
/// or start from [`AppConfig::default`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Static data source locations.
    #[serde(default)]
    pub data: DataConfig,
    /// Prediction service connection.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Renewable estimate defaults.
    #[serde(default)]
    pub renewable: RenewableConfig,
    /// HTTP API settings.
    #[serde(default)]
    pub api: ApiConfig,
}

/// Static data source locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    /// GeoJSON feature collection of state outlines.
    pub boundaries: PathBuf,
    /// JSON array of `{city, state, latitude, longitude}`.
    pub cities: PathBuf,
    /// Forecast CSV dataset.
    pub forecasts: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            boundaries: PathBuf::from("data/states.geojson"),
            cities: PathBuf::from("data/cities.json"),
            forecasts: PathBuf::from("data/forecast.csv"),
        }
    }
}

/// Prediction service connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// URL that receives `POST {district, date}`.
    pub endpoint: String,
    /// Per-request timeout in milliseconds (must be > 0).
    pub timeout_ms: u64,
}

impl GatewayConfig {
    /// Request timeout as a [`Duration`].
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5000/predict".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Renewable estimate defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenewableConfig {
    /// Initial panel capacity (kW, 1–8).
    pub capacity_kw: f64,
}

impl Default for RenewableConfig {
    fn default() -> Self {
        Self { capacity_kw: 1.0 }
    }
}

/// HTTP API settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    /// Socket address to bind, e.g. `"0.0.0.0:3000"`.
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, thiserror::Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"gateway.timeout_ms"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl AppConfig {
    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let d = &self.data;
        for (field, path) in [
            ("data.boundaries", &d.boundaries),
            ("data.cities", &d.cities),
            ("data.forecasts", &d.forecasts),
        ] {
            if path.as_os_str().is_empty() {
                errors.push(ConfigError {
                    field: field.into(),
                    message: "must not be empty".into(),
                });
            }
        }

        let g = &self.gateway;
        match reqwest::Url::parse(&g.endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(ConfigError {
                field: "gateway.endpoint".into(),
                message: format!("scheme must be http or https, got \"{}\"", url.scheme()),
            }),
            Err(e) => errors.push(ConfigError {
                field: "gateway.endpoint".into(),
                message: format!("invalid URL \"{}\": {e}", g.endpoint),
            }),
        }
        if g.timeout_ms == 0 {
            errors.push(ConfigError {
                field: "gateway.timeout_ms".into(),
                message: "must be > 0".into(),
            });
        }

        let cap = self.renewable.capacity_kw;
        if !(MIN_CAPACITY_KW..=MAX_CAPACITY_KW).contains(&cap) {
            errors.push(ConfigError {
                field: "renewable.capacity_kw".into(),
                message: format!("must be in [{MIN_CAPACITY_KW}, {MAX_CAPACITY_KW}]"),
            });
        }

        if self.api.bind.parse::<std::net::SocketAddr>().is_err() {
            errors.push(ConfigError {
                field: "api.bind".into(),
                message: format!("\"{}\" is not a socket address", self.api.bind),
            });
        }

        errors
    }
}
