use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    #[serde(default)]
    pub auth_username: Option<String>,
    #[serde(default)]
    pub auth_password: Option<String>,
    #[serde(default)]
    pub ca_certs: Option<PathBuf>,
    #[serde(default = "default_publish_timeout", with = "duration_str")]
    pub publish_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default)]
    pub qos: u8,
    #[serde(default)]
    pub retain: bool,
    #[serde(default = "default_disk_usage_for_drives")]
    pub disk_usage_for_drives: String,
    #[serde(default)]
    pub embedded_board: Option<bool>,
    #[serde(default = "default_command_timeout", with = "duration_str")]
    pub command_timeout: Duration,
    #[serde(default)]
    pub metrics_textfile: Option<PathBuf>,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default = "default_mpstat")]
    pub mpstat: String,
    #[serde(default = "default_vcgencmd")]
    pub vcgencmd: String,
    #[serde(default = "default_who")]
    pub who: String,
    #[serde(default = "default_apt_check")]
    pub apt_check: String,
    #[serde(default = "default_update_notifier_dir")]
    pub update_notifier_dir: PathBuf,
    #[serde(default = "default_reboot_required_file")]
    pub reboot_required_file: PathBuf,
    #[serde(default = "default_utmp")]
    pub utmp: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_id: default_client_id(),
            keepalive_secs: default_keepalive_secs(),
            auth_username: None,
            auth_password: None,
            ca_certs: None,
            publish_timeout: default_publish_timeout(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            qos: 0,
            retain: false,
            disk_usage_for_drives: default_disk_usage_for_drives(),
            embedded_board: None,
            command_timeout: default_command_timeout(),
            metrics_textfile: None,
            tools: ToolsConfig::default(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mpstat: default_mpstat(),
            vcgencmd: default_vcgencmd(),
            who: default_who(),
            apt_check: default_apt_check(),
            update_notifier_dir: default_update_notifier_dir(),
            reboot_required_file: default_reboot_required_file(),
            utmp: default_utmp(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg = Self::from_yaml(&text).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path_display,
                source,
            },
            other => other,
        })?;
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let parse_err = |source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        };
        // An empty or comment-only document is null, not an empty mapping.
        let value: serde_yaml::Value = if text.trim().is_empty() {
            serde_yaml::Value::Null
        } else {
            serde_yaml::from_str(text).map_err(parse_err)?
        };
        let cfg: Config = if value.is_null() {
            Config::default()
        } else {
            serde_yaml::from_value(value).map_err(parse_err)?
        };

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_broker(&self.broker)?;
        validate_probe(&self.probe)?;
        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

impl BrokerConfig {
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.auth_username, &self.auth_password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }
}

impl ProbeConfig {
    pub fn disk_paths(&self) -> Vec<String> {
        parse_disk_paths(&self.disk_usage_for_drives)
    }
}

pub fn parse_disk_paths(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn validate_broker(cfg: &BrokerConfig) -> Result<(), ConfigError> {
    if cfg.host.trim().is_empty() {
        return Err(ConfigError::Validation(
            "broker.host must not be empty".to_string(),
        ));
    }
    if cfg.port == 0 {
        return Err(ConfigError::Validation(
            "broker.port must be in range 1..65535".to_string(),
        ));
    }
    if cfg.client_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "broker.client_id must not be empty".to_string(),
        ));
    }
    // rumqttc rejects keep-alive intervals shorter than 5 seconds.
    if cfg.keepalive_secs < 5 {
        return Err(ConfigError::Validation(
            "broker.keepalive_secs must be >= 5".to_string(),
        ));
    }
    if cfg.publish_timeout.is_zero() {
        return Err(ConfigError::Validation(
            "broker.publish_timeout must be > 0".to_string(),
        ));
    }
    if let Some(ca) = &cfg.ca_certs {
        if ca.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "broker.ca_certs must not be empty when set".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_probe(cfg: &ProbeConfig) -> Result<(), ConfigError> {
    if cfg.topic.trim().is_empty() {
        return Err(ConfigError::Validation(
            "probe.topic must not be empty".to_string(),
        ));
    }
    if cfg.topic.contains(['+', '#']) {
        return Err(ConfigError::Validation(format!(
            "probe.topic '{}' must not contain wildcards",
            cfg.topic
        )));
    }
    if cfg.qos > 2 {
        return Err(ConfigError::Validation(format!(
            "probe.qos must be 0, 1 or 2, got {}",
            cfg.qos
        )));
    }
    if cfg.command_timeout.is_zero() {
        return Err(ConfigError::Validation(
            "probe.command_timeout must be > 0".to_string(),
        ));
    }

    let tools = &cfg.tools;
    let named = [
        ("mpstat", tools.mpstat.as_str()),
        ("vcgencmd", tools.vcgencmd.as_str()),
        ("who", tools.who.as_str()),
        ("apt_check", tools.apt_check.as_str()),
    ];
    for (name, value) in named {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "probe.tools.{name} must not be empty"
            )));
        }
    }
    let paths = [
        ("update_notifier_dir", &tools.update_notifier_dir),
        ("reboot_required_file", &tools.reboot_required_file),
        ("utmp", &tools.utmp),
    ];
    for (name, value) in paths {
        if value.as_os_str().is_empty() {
            return Err(ConfigError::Validation(format!(
                "probe.tools.{name} must not be empty"
            )));
        }
    }

    Ok(())
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

const fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "HwProbeSensor".to_string()
}

const fn default_keepalive_secs() -> u64 {
    60
}

const fn default_publish_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_topic() -> String {
    "hwprobe".to_string()
}

fn default_disk_usage_for_drives() -> String {
    ".".to_string()
}

const fn default_command_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_mpstat() -> String {
    "mpstat".to_string()
}

fn default_vcgencmd() -> String {
    "vcgencmd".to_string()
}

fn default_who() -> String {
    "who".to_string()
}

fn default_apt_check() -> String {
    "/usr/lib/update-notifier/apt-check".to_string()
}

fn default_update_notifier_dir() -> PathBuf {
    PathBuf::from("/usr/lib/update-notifier")
}

fn default_reboot_required_file() -> PathBuf {
    PathBuf::from("/var/run/reboot-required")
}

fn default_utmp() -> PathBuf {
    PathBuf::from("/var/run/utmp")
}
