//! Configuration file parsing and structures.
//!
//! ledboardd uses a single TOML file. The dynamic `[leds]` table (LED index
//! keyed, values either a bare entity id or an entity-with-color table) is
//! resolved once at startup into the immutable [`LedMapTable`]; all shape
//! checking happens here, off the hot path.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use tracing_subscriber::filter::LevelFilter;

use crate::color::Color;
use crate::color::InvalidColorFormat;
use crate::heartbeat::Heartbeat;
use crate::heartbeat::InvalidHeartbeatPeriod;
use crate::mapping::LedMapTable;
use crate::mapping::MappingError;

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub strip: StripConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub leds: BTreeMap<String, Vec<LedEntry>>,
}

#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,
}

/// The physical strip being driven
#[derive(Debug, Deserialize)]
pub struct StripConfig {
    /// Number of pixels on the strip
    pub length: usize,

    /// UDP realtime endpoint of the strip, e.g. "192.168.4.40:21324"
    pub target: String,
}

fn default_brightness() -> f32 {
    1.0
}

fn default_on_color() -> String {
    "#FFFFFF".to_string()
}

fn default_off_color() -> String {
    "#000000".to_string()
}

/// Global display options
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Global brightness scale in [0.0, 1.0]
    pub brightness: f32,

    /// On-color used for entities configured without an explicit color
    pub on_color: String,

    /// Color rendered when no entity on a LED is on
    pub off_color: String,

    /// Treat every mapped entity as on. Layout-verification mode.
    pub force_all_on: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            brightness: default_brightness(),
            on_color: default_on_color(),
            off_color: default_off_color(),
            force_all_on: false,
        }
    }
}

fn default_heartbeat_period_ms() -> i64 {
    500
}

fn default_heartbeat_color() -> String {
    "#0000FF".to_string()
}

/// Heartbeat indicator configuration
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// LED index of the indicator; negative disables the heartbeat
    pub led: i64,

    /// Phase toggle interval in milliseconds
    pub period_ms: i64,

    /// Indicator color during the on phase
    pub color: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            led: -1,
            period_ms: default_heartbeat_period_ms(),
            color: default_heartbeat_color(),
        }
    }
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "ledboardd".to_string()
}

fn default_topic_prefix() -> String {
    "statusboard/state".to_string()
}

/// MQTT state source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address
    pub broker: String,

    /// MQTT broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// MQTT client ID
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Prefix for per-entity state topics: `<prefix>/<entity_id>`
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    /// Optional username for authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password for authentication
    #[serde(default)]
    pub password: Option<String>,
}

/// One entry in a LED's entity list: either a bare entity id (which uses the
/// default on-color) or an entity with its own color.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LedEntry {
    Entity(String),
    EntityWithColor { entity: String, color: String },
}

/// Validated, immutable board setup produced from a [`Config`].
#[derive(Debug)]
pub struct Board {
    pub table: LedMapTable,
    pub heartbeat: Option<Heartbeat>,
    pub brightness: f32,
    pub off_color: Color,
    pub force_all_on: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid LED index {key:?}: expected a non-negative integer")]
    InvalidLedIndex { key: String },

    #[error("LED {led} is out of range for a strip of length {length}")]
    LedOutOfRange { led: usize, length: usize },

    #[error("heartbeat LED {led} is out of range for a strip of length {length}")]
    HeartbeatLedOutOfRange { led: usize, length: usize },

    #[error("brightness {0} is out of range (expected 0.0..=1.0)")]
    InvalidBrightness(f32),

    #[error("{field}: {source}")]
    InvalidColor {
        field: &'static str,
        #[source]
        source: InvalidColorFormat,
    },

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    HeartbeatPeriod(#[from] InvalidHeartbeatPeriod),
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Validate and resolve the configuration into an immutable [`Board`].
    ///
    /// Every failure here is fatal to startup: malformed colors, duplicate
    /// mappings, out-of-range indices, bad brightness, and non-positive
    /// heartbeat periods.
    pub fn build_board(&self) -> Result<Board, ConfigError> {
        if !(0.0..=1.0).contains(&self.display.brightness) {
            return Err(ConfigError::InvalidBrightness(self.display.brightness));
        }

        let off_color =
            Color::parse(&self.display.off_color).map_err(|source| ConfigError::InvalidColor {
                field: "display.off_color",
                source,
            })?;

        let mut entries = Vec::new();
        for (key, led_entries) in &self.leds {
            let led: usize = key
                .parse()
                .map_err(|_| ConfigError::InvalidLedIndex { key: key.clone() })?;
            if led >= self.strip.length {
                return Err(ConfigError::LedOutOfRange {
                    led,
                    length: self.strip.length,
                });
            }

            for entry in led_entries {
                let (entity, color_text) = match entry {
                    LedEntry::Entity(entity) => (entity.clone(), self.display.on_color.clone()),
                    LedEntry::EntityWithColor { entity, color } => {
                        (entity.clone(), color.clone())
                    }
                };
                entries.push((led, entity, color_text));
            }
        }

        let table = LedMapTable::build(entries)?;

        let heartbeat = if self.heartbeat.led >= 0 {
            let led = self.heartbeat.led as usize;
            if led >= self.strip.length {
                return Err(ConfigError::HeartbeatLedOutOfRange {
                    led,
                    length: self.strip.length,
                });
            }
            let color =
                Color::parse(&self.heartbeat.color).map_err(|source| ConfigError::InvalidColor {
                    field: "heartbeat.color",
                    source,
                })?;
            Some(Heartbeat::new(led, self.heartbeat.period_ms, color)?)
        } else {
            None
        };

        Ok(Board {
            table,
            heartbeat,
            brightness: self.display.brightness,
            off_color,
            force_all_on: self.display.force_all_on,
        })
    }
}
