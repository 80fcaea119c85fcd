//! Configuration loading from TOML files
//!
//! Config file is selected via the --config command line argument. A missing
//! file falls back to defaults with a warning; a file that fails to parse,
//! or any validation failure, is fatal before monitoring starts.

use crate::domain::types::SeatId;
use anyhow::{bail, Context};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Unique site identifier (e.g., tail number or cabin id)
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        SiteConfig {
            id: default_site_id(),
        }
    }
}

fn default_site_id() -> String {
    "cabin".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    /// Topic the external vision pipeline publishes to
    #[serde(default = "default_vision_topic")]
    pub vision_topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_vision_topic() -> String {
    "cabin/vision".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeatsConfig {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StabilizationConfig {
    /// History size per identity evidence window
    pub window_capacity: usize,
    /// Observations per stabilization pass
    pub batch_size: usize,
    /// History size per detector channel window
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    15
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Maximum embedding distance for a positive match
    pub tolerance: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrollmentConfig {
    /// JSON file with enrolled passenger records
    #[serde(default = "default_enrollment_file")]
    pub file: String,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self { file: default_enrollment_file() }
    }
}

fn default_enrollment_file() -> String {
    "config/passengers.json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BeltConfig {
    /// Root of the GPIO sysfs tree
    #[serde(default = "default_gpio_root")]
    pub gpio_root: String,
    /// Seat name to GPIO pin number
    #[serde(default)]
    pub pins: HashMap<String, u32>,
    #[serde(default = "default_belt_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for BeltConfig {
    fn default() -> Self {
        Self {
            gpio_root: default_gpio_root(),
            pins: HashMap::new(),
            poll_interval_ms: default_belt_poll_interval_ms(),
        }
    }
}

fn default_gpio_root() -> String {
    "/sys/class/gpio".to_string()
}

fn default_belt_poll_interval_ms() -> u64 {
    250
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// File path for notification egress (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "notifications.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
}

fn default_broker_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { bind_address: default_broker_bind_address(), port: default_broker_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttEgressConfig {
    /// Enable MQTT egress publishing
    #[serde(default = "default_mqtt_egress_enabled")]
    pub enabled: bool,
    /// Topic for status/welcome notifications (QoS 1)
    #[serde(default = "default_notifications_topic")]
    pub notifications_topic: String,
    /// Topic for per-cycle cabin state snapshots (QoS 0)
    #[serde(default = "default_state_topic")]
    pub state_topic: String,
    /// Topic for periodic metrics snapshots (QoS 0)
    #[serde(default = "default_metrics_topic")]
    pub metrics_topic: String,
}

impl Default for MqttEgressConfig {
    fn default() -> Self {
        Self {
            enabled: default_mqtt_egress_enabled(),
            notifications_topic: default_notifications_topic(),
            state_topic: default_state_topic(),
            metrics_topic: default_metrics_topic(),
        }
    }
}

fn default_mqtt_egress_enabled() -> bool {
    true
}

fn default_notifications_topic() -> String {
    "cabin/notifications".to_string()
}

fn default_state_topic() -> String {
    "cabin/state".to_string()
}

fn default_metrics_topic() -> String {
    "cabin/metrics".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

fn default_prometheus_port() -> u16 {
    9090
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    pub mqtt: MqttConfig,
    pub seats: SeatsConfig,
    pub stabilization: StabilizationConfig,
    pub identity: IdentityConfig,
    #[serde(default)]
    pub enrollment: EnrollmentConfig,
    #[serde(default)]
    pub belt: BeltConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub mqtt_egress: MqttEgressConfig,
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_vision_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    seats: Vec<SeatId>,
    window_capacity: usize,
    batch_size: usize,
    channel_capacity: usize,
    identity_tolerance: f64,
    enrollment_file: String,
    belt_gpio_root: String,
    belt_pins: Vec<(SeatId, u32)>,
    belt_poll_interval_ms: u64,
    egress_file: String,
    broker_bind_address: String,
    broker_port: u16,
    mqtt_egress_enabled: bool,
    mqtt_egress_notifications_topic: String,
    mqtt_egress_state_topic: String,
    mqtt_egress_metrics_topic: String,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: "cabin".to_string(),
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_vision_topic: "cabin/vision".to_string(),
            mqtt_username: None,
            mqtt_password: None,
            seats: ["A1", "A2", "B1", "B2"].iter().map(|s| SeatId::new(s)).collect(),
            window_capacity: 5,
            batch_size: 5,
            channel_capacity: 15,
            identity_tolerance: 0.55,
            enrollment_file: "config/passengers.json".to_string(),
            belt_gpio_root: "/sys/class/gpio".to_string(),
            belt_pins: Self::default_belt_pins(),
            belt_poll_interval_ms: 250,
            egress_file: "notifications.jsonl".to_string(),
            broker_bind_address: "0.0.0.0".to_string(),
            broker_port: 1883,
            mqtt_egress_enabled: true,
            mqtt_egress_notifications_topic: "cabin/notifications".to_string(),
            mqtt_egress_state_topic: "cabin/state".to_string(),
            mqtt_egress_metrics_topic: "cabin/metrics".to_string(),
            metrics_interval_secs: 10,
            prometheus_port: 9090,
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    fn default_belt_pins() -> Vec<(SeatId, u32)> {
        vec![
            (SeatId::new("A1"), 31),
            (SeatId::new("A2"), 7),
            (SeatId::new("B1"), 33),
            (SeatId::new("B2"), 29),
        ]
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let seats: Vec<SeatId> =
            toml_config.seats.names.iter().map(|name| SeatId::new(name)).collect();

        let mut belt_pins: Vec<(SeatId, u32)> = toml_config
            .belt
            .pins
            .iter()
            .map(|(seat, &pin)| (SeatId::new(seat), pin))
            .collect();
        belt_pins.sort_by(|a, b| a.0.cmp(&b.0));

        let config = Self {
            site_id: toml_config.site.id,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_vision_topic: toml_config.mqtt.vision_topic,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            seats,
            window_capacity: toml_config.stabilization.window_capacity,
            batch_size: toml_config.stabilization.batch_size,
            channel_capacity: toml_config.stabilization.channel_capacity,
            identity_tolerance: toml_config.identity.tolerance,
            enrollment_file: toml_config.enrollment.file,
            belt_gpio_root: toml_config.belt.gpio_root,
            belt_pins,
            belt_poll_interval_ms: toml_config.belt.poll_interval_ms,
            egress_file: toml_config.egress.file,
            broker_bind_address: toml_config.broker.bind_address,
            broker_port: toml_config.broker.port,
            mqtt_egress_enabled: toml_config.mqtt_egress.enabled,
            mqtt_egress_notifications_topic: toml_config.mqtt_egress.notifications_topic,
            mqtt_egress_state_topic: toml_config.mqtt_egress.state_topic,
            mqtt_egress_metrics_topic: toml_config.mqtt_egress.metrics_topic,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            config_file: path.display().to_string(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a path. A missing file falls back to defaults;
    /// a file that exists but fails to parse or validate is fatal.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config_file_missing_using_defaults");
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// Reject configurations the monitoring loop cannot run with
    fn validate(&self) -> anyhow::Result<()> {
        if self.seats.is_empty() {
            bail!("seat set must not be empty");
        }
        let mut unique = self.seats.clone();
        unique.sort();
        unique.dedup();
        if unique.len() != self.seats.len() {
            bail!("seat names must be unique");
        }
        if self.window_capacity == 0 {
            bail!("stabilization.window_capacity must be positive");
        }
        if self.batch_size == 0 {
            bail!("stabilization.batch_size must be positive");
        }
        if self.batch_size > self.window_capacity {
            bail!(
                "stabilization.batch_size ({}) exceeds window_capacity ({}); a batch would never complete",
                self.batch_size,
                self.window_capacity
            );
        }
        if self.channel_capacity == 0 {
            bail!("stabilization.channel_capacity must be positive");
        }
        if !self.identity_tolerance.is_finite() || self.identity_tolerance <= 0.0 {
            bail!("identity.tolerance must be a positive finite number");
        }
        Ok(())
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_vision_topic(&self) -> &str {
        &self.mqtt_vision_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn seats(&self) -> &[SeatId] {
        &self.seats
    }

    pub fn window_capacity(&self) -> usize {
        self.window_capacity
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn identity_tolerance(&self) -> f64 {
        self.identity_tolerance
    }

    pub fn enrollment_file(&self) -> &str {
        &self.enrollment_file
    }

    pub fn belt_gpio_root(&self) -> &str {
        &self.belt_gpio_root
    }

    pub fn belt_pins(&self) -> &[(SeatId, u32)] {
        &self.belt_pins
    }

    pub fn belt_poll_interval_ms(&self) -> u64 {
        self.belt_poll_interval_ms
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn broker_bind_address(&self) -> &str {
        &self.broker_bind_address
    }

    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    pub fn mqtt_egress_enabled(&self) -> bool {
        self.mqtt_egress_enabled
    }

    pub fn mqtt_egress_notifications_topic(&self) -> &str {
        &self.mqtt_egress_notifications_topic
    }

    pub fn mqtt_egress_state_topic(&self) -> &str {
        &self.mqtt_egress_state_topic
    }

    pub fn mqtt_egress_metrics_topic(&self) -> &str {
        &self.mqtt_egress_metrics_topic
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the egress file
    #[cfg(test)]
    pub fn with_egress_file(mut self, file: &str) -> Self {
        self.egress_file = file.to_string();
        self
    }

    /// Builder method for tests to set stabilization parameters
    #[cfg(test)]
    pub fn with_stabilization(mut self, window_capacity: usize, batch_size: usize) -> Self {
        self.window_capacity = window_capacity;
        self.batch_size = batch_size;
        self
    }
}
