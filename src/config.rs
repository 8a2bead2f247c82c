use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "hidro-status";
const ENV_PREFIX: &str = "HIDRO";
/// Longest query window accepted, about a century.
const MAX_WINDOW_DAYS: i64 = 36_500;

/// Connection to the telemetry API.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    /// Account the API is queried with. Required.
    pub user: String,
    /// Trailing window queried when no start date is given.
    pub window_days: i64,
    pub timeout_secs: u64,
    /// Restricts the response to these variables when not empty.
    pub variables: Vec<String>,
}

impl ApiSettings {
    /// Only needed before talking to the API; offline commands skip it.
    pub fn require_user(&self) -> Result<(), config::ConfigError> {
        if self.user.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "api.user must be set (config file or HIDRO_API__USER)".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://api.fdx-ingenieria.com.ar/api_new".to_string(),
            user: String::new(),
            window_days: 360,
            timeout_secs: 30,
            variables: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub path: PathBuf,
    /// Only rows whose `grupo` equals this value are loaded. `None` loads all.
    pub group: Option<String>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("Sensores_base.csv"),
            group: Some("Delta".to_string()),
        }
    }
}

/// Unit conversions and windows used by the health summary.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Raw battery units per percent.
    pub battery_divisor: f64,
    /// Raw signal value that maps to 100%.
    pub signal_full_scale: f64,
    /// Span before the last reading averaged for the signal.
    pub signal_window_hours: i64,
    /// Look-back for the battery change.
    pub battery_window_days: i64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            battery_divisor: 10.0,
            signal_full_scale: 30.0,
            signal_window_hours: 10,
            battery_window_days: 7,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportSettings {
    /// File name prefix for every generated output.
    pub output: String,
    pub lines_per_page: usize,
    pub chart_width: usize,
    pub chart_height: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            output: "SensoresDelta".to_string(),
            lines_per_page: 60,
            chart_width: 60,
            chart_height: 8,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub registry: RegistrySettings,
    pub health: HealthSettings,
    pub report: ReportSettings,
}

impl Settings {
    /// Defaults, then the config file, then `HIDRO_*` variables (`HIDRO_API__USER`).
    ///
    /// An explicit `path` must exist; the default `hidro-status.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();
        Self::build(path, Self::environment())
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("api.variables")
    }

    fn build(path: Option<&Path>, environment: config::Environment) -> Result<Self, config::ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(environment)
            .build()?;

        let settings: Settings = settings.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if !(1..=MAX_WINDOW_DAYS).contains(&self.api.window_days) {
            return Err(config::ConfigError::Message(format!(
                "api.window_days must be between 1 and {MAX_WINDOW_DAYS}"
            )));
        }
        if !(1..=MAX_WINDOW_DAYS * 24).contains(&self.health.signal_window_hours)
            || !(1..=MAX_WINDOW_DAYS).contains(&self.health.battery_window_days)
        {
            return Err(config::ConfigError::Message(
                "health.signal_window_hours and health.battery_window_days must be positive and at most a century"
                    .to_string(),
            ));
        }
        if self.health.battery_divisor == 0.0 || self.health.signal_full_scale == 0.0 {
            return Err(config::ConfigError::Message(
                "health.battery_divisor and health.signal_full_scale must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
