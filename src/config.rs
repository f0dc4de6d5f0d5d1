use crate::occupancy::{AlertCommand, OccupancyConfig};
use crate::server::ServerSettings;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_UDP_HOST: &str = "0.0.0.0";
pub const DEFAULT_UDP_PORT: u16 = 5000;
pub const DEFAULT_OSC_HOST: &str = "127.0.0.1";
pub const DEFAULT_OSC_PORT: u16 = 7000;
pub const DEFAULT_WEB_HOST: &str = "0.0.0.0";
pub const DEFAULT_WEB_PORT: u16 = 3000;
pub const DEFAULT_OCCUPANCY_SENSOR_ID: &str = "sofa";
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_PROGRESS_CEILING: u32 = 100;
pub const DEFAULT_SUSTAINED_FALSE_MS: u64 = 10_000;
pub const DEFAULT_DEFERRED_CHECK_MS: u64 = 11_000;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub udp: Option<EndpointSection>,
    #[serde(default)]
    pub osc: Option<EndpointSection>,
    #[serde(default)]
    pub web: Option<EndpointSection>,
    #[serde(default)]
    pub occupancy: Option<OccupancySection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EndpointSection {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OccupancySection {
    /// Sensor id of the occupancy FSR (default: "sofa")
    pub sensor_id: Option<String>,
    /// Progress tick interval in milliseconds (default: 1000)
    pub tick_interval_ms: Option<u64>,
    /// Progress value that ends a sitting episode (default: 100)
    pub progress_ceiling: Option<u32>,
    /// Continuous standing time before the alert process restarts (default: 10000)
    pub sustained_false_ms: Option<u64>,
    /// Delay between a stand event and its re-check (default: 11000)
    pub deferred_check_ms: Option<u64>,
    /// Launch the alert process when the server starts (default: true)
    pub launch_alert_on_start: Option<bool>,
    #[serde(default)]
    pub alert: Option<AlertSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertSection {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        let occupancy = self.occupancy_config();
        if occupancy.progress_ceiling == 0 {
            return Err(ConfigError::Invalid(
                "occupancy.progress_ceiling must be greater than zero".to_string(),
            ));
        }
        if occupancy.tick_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "occupancy.tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self
            .alert_command()
            .is_some_and(|alert| alert.program.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "occupancy.alert.program must not be empty".to_string(),
            ));
        }
        if occupancy.deferred_check_delay < occupancy.sustained_false {
            return Err(ConfigError::Invalid(
                "occupancy.deferred_check_ms must not be shorter than occupancy.sustained_false_ms"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Log level from `[logging].level`, falling back to INFO.
    pub fn log_level(&self) -> tracing::Level {
        tracing::Level::from_str(self.logging.level.trim()).unwrap_or(tracing::Level::INFO)
    }

    pub fn udp_endpoint(&self) -> (String, u16) {
        endpoint(self.udp.as_ref(), DEFAULT_UDP_HOST, DEFAULT_UDP_PORT)
    }

    pub fn osc_endpoint(&self) -> (String, u16) {
        endpoint(self.osc.as_ref(), DEFAULT_OSC_HOST, DEFAULT_OSC_PORT)
    }

    pub fn web_endpoint(&self) -> (String, u16) {
        endpoint(self.web.as_ref(), DEFAULT_WEB_HOST, DEFAULT_WEB_PORT)
    }

    pub fn occupancy_config(&self) -> OccupancyConfig {
        let section = self.occupancy.as_ref();
        let millis =
            |value: Option<u64>, default: u64| Duration::from_millis(value.unwrap_or(default));

        OccupancyConfig {
            sensor_id: section
                .and_then(|s| s.sensor_id.clone())
                .unwrap_or_else(|| DEFAULT_OCCUPANCY_SENSOR_ID.to_string()),
            tick_interval: millis(
                section.and_then(|s| s.tick_interval_ms),
                DEFAULT_TICK_INTERVAL_MS,
            ),
            progress_ceiling: section
                .and_then(|s| s.progress_ceiling)
                .unwrap_or(DEFAULT_PROGRESS_CEILING),
            sustained_false: millis(
                section.and_then(|s| s.sustained_false_ms),
                DEFAULT_SUSTAINED_FALSE_MS,
            ),
            deferred_check_delay: millis(
                section.and_then(|s| s.deferred_check_ms),
                DEFAULT_DEFERRED_CHECK_MS,
            ),
            launch_alert_on_start: section
                .and_then(|s| s.launch_alert_on_start)
                .unwrap_or(true),
        }
    }

    /// Command from `[occupancy.alert]`; `None` disables the alert process.
    pub fn alert_command(&self) -> Option<AlertCommand> {
        self.occupancy
            .as_ref()
            .and_then(|s| s.alert.as_ref())
            .map(|alert| AlertCommand {
                program: alert.program.clone(),
                args: alert.args.clone(),
            })
    }

    pub fn server_settings(&self) -> ServerSettings {
        let (ingest_host, ingest_port) = self.udp_endpoint();
        let (forward_host, forward_port) = self.osc_endpoint();
        ServerSettings {
            ingest_host,
            ingest_port,
            forward_host,
            forward_port,
            occupancy: self.occupancy_config(),
        }
    }
}

fn endpoint(section: Option<&EndpointSection>, host: &str, port: u16) -> (String, u16) {
    let host = section
        .and_then(|s| s.host.clone())
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| host.to_string());
    let port = section.and_then(|s| s.port).unwrap_or(port);
    (host, port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn write_temp_config(
        tag: &str,
        contents: &str,
    ) -> Result<std::path::PathBuf, Box<dyn std::error::Error>> {
        let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        let path = std::env::temp_dir().join(format!("sensor-hub-config-{tag}-{unique}.toml"));
        fs::write(&path, contents)?;
        Ok(path)
    }

    #[test]
    fn default_config_sets_endpoints_and_alert() -> Result<(), Box<dyn std::error::Error>> {
        let config = load_default()?;
        assert_eq!(config.udp_endpoint().1, DEFAULT_UDP_PORT);
        assert_eq!(config.osc_endpoint(), ("127.0.0.1".to_string(), 7000));
        let alert = config.alert_command().ok_or("default config has no alert command")?;
        assert_eq!(alert.program, "python");
        assert_eq!(alert.args, vec!["bsod_invite_fullscreen.py".to_string()]);
        Ok(())
    }

    #[test]
    fn minimal_config_uses_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config(
            "minimal",
            r#"
[app]
name = "sensor-hub"

[logging]
level = "debug"
"#,
        )?;

        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);
        let config = result?;

        assert_eq!(config.log_level(), tracing::Level::DEBUG);
        assert_eq!(config.udp_endpoint(), ("0.0.0.0".to_string(), 5000));
        assert_eq!(config.web_endpoint(), ("0.0.0.0".to_string(), 3000));

        let occupancy = config.occupancy_config();
        assert_eq!(occupancy.sensor_id, "sofa");
        assert_eq!(occupancy.tick_interval, Duration::from_millis(1000));
        assert_eq!(occupancy.progress_ceiling, 100);
        assert_eq!(occupancy.sustained_false, Duration::from_millis(10_000));
        assert_eq!(occupancy.deferred_check_delay, Duration::from_millis(11_000));
        assert!(occupancy.launch_alert_on_start);
        assert_eq!(config.alert_command(), None);
        Ok(())
    }

    #[test]
    fn occupancy_section_overrides_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config(
            "occupancy",
            r#"
[app]
name = "sensor-hub"

[logging]
level = "info"

[udp]
port = 6000

[occupancy]
sensor_id = "couch"
tick_interval_ms = 50
progress_ceiling = 20
sustained_false_ms = 200
deferred_check_ms = 250
launch_alert_on_start = false

[occupancy.alert]
program = "cat"
args = ["-u"]
"#,
        )?;

        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);
        let config = result?;

        assert_eq!(config.udp_endpoint(), ("0.0.0.0".to_string(), 6000));
        let occupancy = config.occupancy_config();
        assert_eq!(occupancy.sensor_id, "couch");
        assert_eq!(occupancy.tick_interval, Duration::from_millis(50));
        assert_eq!(occupancy.progress_ceiling, 20);
        assert!(!occupancy.launch_alert_on_start);

        let alert = config.alert_command().ok_or("alert section not parsed")?;
        assert_eq!(alert.program, "cat");
        assert_eq!(alert.args, vec!["-u".to_string()]);
        Ok(())
    }

    #[test]
    fn blank_alert_program_is_invalid() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config(
            "blank-alert",
            r#"
[app]
name = "sensor-hub"

[logging]
level = "info"

[occupancy.alert]
program = "  "
"#,
        )?;

        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
        Ok(())
    }

    #[test]
    fn deferred_check_shorter_than_threshold_is_invalid()
    -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config(
            "deferred",
            r#"
[app]
name = "sensor-hub"

[logging]
level = "info"

[occupancy]
sustained_false_ms = 5000
deferred_check_ms = 1000
"#,
        )?;

        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
        Ok(())
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config(
            "level",
            r#"
[app]
name = "sensor-hub"

[logging]
level = "chatty"
"#,
        )?;

        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);

        assert_eq!(result?.log_level(), tracing::Level::INFO);
        Ok(())
    }

    #[test]
    fn missing_config_file_returns_read_error() {
        let temp_dir = std::env::temp_dir();
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let path = temp_dir.join(format!("sensor-hub-config-missing-{unique}.toml"));

        let result = load_from_path(&path);

        assert!(matches!(result, Err(ConfigError::Read(_))));
    }

    #[test]
    fn invalid_toml_returns_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config("invalid", "not = [valid")?;

        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        Ok(())
    }
}
