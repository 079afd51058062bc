//! Persistent configuration.
//!
//! Settings live in `~/.tuskwatch/config.ini`:
//!
//! ```ini
//! [server]
//! bind_address = 127.0.0.1:8765
//!
//! [camera]
//! reference_lat = -1.2921
//! reference_lng = 34.7617
//! meters_per_unit = 1
//!
//! [alerts]
//! cooldown_secs = 120
//! trigger = exit
//! webhook_url = https://ranger.example.org/alerts
//!
//! [boundary]
//! enabled = true
//! center_x = 200
//! center_y = 250
//! size = 100
//! ```
//!
//! Missing keys fall back to defaults; keys that are present but do not
//! parse are errors. Every key is listed in [`ConfigKey`].

mod keys;

pub use keys::ConfigKey;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;
use tracing::debug;

use crate::geo::{GeoError, LatLng, LocalPoint, ReferenceFrame};
use crate::logging::{LoggingConfig, DEFAULT_LOG_LEVEL};
use crate::membership::ReplacePolicy;
use crate::notify::{NotificationDispatcher, TransportError, WebhookNotifier};
use crate::session::{SessionConfig, DEFAULT_FRAME_RATE};
use crate::source::{MockConfig, SourceConfig, SourceKind, DEFAULT_MOCK_FRAME_LIMIT};
use crate::throttle::{AlertTrigger, DEFAULT_COOLDOWN};
use crate::zone::{BoundaryConfig, ReplaceReport, ZoneRegistry};

/// Directory name under the home directory.
pub const CONFIG_DIR_NAME: &str = ".tuskwatch";

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Default WebSocket listen address.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8765";

/// Errors from reading, writing or interpreting configuration.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Unknown config key '{0}'")]
    UnknownKey(String),

    #[error("Invalid camera calibration: {0}")]
    Calibration(#[from] GeoError),

    #[error("Failed to create alert notifier: {0}")]
    Notifier(#[from] TransportError),

    #[error("Zone file {path} is invalid: {reason}")]
    ZoneFile { path: PathBuf, reason: String },
}

/// `~/.tuskwatch`, or `./.tuskwatch` when no home directory is known.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// `~/.tuskwatch/config.ini`.
pub fn config_file_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub bind_address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub reference_lat: f64,
    pub reference_lng: f64,
    pub meters_per_unit: f64,
    pub origin_x: f64,
    pub origin_y: f64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        let frame = ReferenceFrame::default();
        Self {
            reference_lat: frame.reference.lat,
            reference_lng: frame.reference.lng,
            meters_per_unit: frame.meters_per_unit,
            origin_x: frame.origin.x,
            origin_y: frame.origin.y,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    pub frame_rate: f64,
    pub source: SourceKind,
    pub replay_file: Option<PathBuf>,
    pub restamp: bool,
    pub mock_entities: usize,
    /// Zero runs the simulation until stopped.
    pub mock_frame_limit: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            source: SourceKind::default(),
            replay_file: None,
            restamp: true,
            mock_entities: MockConfig::default().max_entities,
            mock_frame_limit: DEFAULT_MOCK_FRAME_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertSettings {
    pub cooldown_secs: u64,
    pub trigger: AlertTrigger,
    /// Alerts are only logged when unset.
    pub webhook_url: Option<String>,
    pub dispatch_timeout_secs: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            cooldown_secs: DEFAULT_COOLDOWN.as_secs(),
            trigger: AlertTrigger::default(),
            webhook_url: None,
            dispatch_timeout_secs: crate::notify::DEFAULT_DISPATCH_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneSettings {
    /// JSON zone list loaded at startup. Takes precedence over `[boundary]`.
    pub file: Option<PathBuf>,
    pub replace_policy: ReplacePolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            directory: Some(config_dir().join("logs")),
        }
    }
}

/// Contents of `config.ini`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub server: ServerSettings,
    pub camera: CameraSettings,
    pub stream: StreamSettings,
    pub alerts: AlertSettings,
    pub zones: ZoneSettings,
    pub boundary: BoundaryConfig,
    pub logging: LoggingSettings,
}

impl ConfigFile {
    /// Loads the default config file, or defaults if it does not exist.
    pub fn load() -> Result<Self, ConfigFileError> {
        let path = config_file_path();
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Loads `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed, or any present key holds
    /// an invalid value.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        let ini = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(source) => ConfigFileError::Io {
                path: path.to_path_buf(),
                source,
            },
            ini::Error::Parse(e) => ConfigFileError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        })?;
        Self::from_ini(&ini)
    }

    /// Parses INI text.
    pub fn parse(contents: &str) -> Result<Self, ConfigFileError> {
        let ini = Ini::load_from_str(contents).map_err(|e| ConfigFileError::Parse {
            path: PathBuf::from("<string>"),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigFileError> {
        let mut config = Self::default();
        for key in ConfigKey::all() {
            if let Some(value) = ini.get_from(Some(key.section()), key.key_name()) {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Writes to the default config file, creating `~/.tuskwatch` if needed.
    pub fn save(&self) -> Result<(), ConfigFileError> {
        self.save_to(&config_file_path())
    }

    /// Writes every key to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigFileError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        self.to_ini()
            .write_to_file(path)
            .map_err(|source| ConfigFileError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            ini.with_section(Some(key.section()))
                .set(key.key_name(), key.get(self));
        }
        ini
    }

    /// Camera calibration.
    pub fn reference_frame(&self) -> Result<ReferenceFrame, ConfigFileError> {
        let camera = &self.camera;
        Ok(ReferenceFrame::with_origin(
            LatLng::new(camera.reference_lat, camera.reference_lng),
            camera.meters_per_unit,
            LocalPoint::new(camera.origin_x, camera.origin_y),
        )?)
    }

    /// Session settings.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigFileError> {
        if !(self.stream.frame_rate.is_finite() && self.stream.frame_rate > 0.0) {
            return Err(ConfigFileError::InvalidValue {
                key: ConfigKey::StreamFrameRate.name(),
                value: self.stream.frame_rate.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(SessionConfig::default()
            .with_frame_rate(self.stream.frame_rate)
            .with_reference_frame(self.reference_frame()?)
            .with_cooldown(Duration::from_secs(self.alerts.cooldown_secs))
            .with_trigger(self.alerts.trigger)
            .with_replace_policy(self.zones.replace_policy)
            .with_dispatch_timeout(Duration::from_secs(self.alerts.dispatch_timeout_secs)))
    }

    /// Frame source settings.
    pub fn source_config(&self) -> SourceConfig {
        let limit = self.stream.mock_frame_limit;
        let mock = MockConfig::default()
            .with_max_entities(self.stream.mock_entities)
            .with_frame_limit((limit > 0).then_some(limit));
        SourceConfig {
            kind: self.stream.source,
            replay_file: self.stream.replay_file.clone(),
            restamp: self.stream.restamp,
            mock,
        }
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::default()
            .with_level(self.logging.level.clone())
            .with_directory(self.logging.directory.clone())
    }

    /// Initial zones: the zone file when configured, otherwise the boundary.
    ///
    /// Invalid entries in the zone file are dropped and listed in the report.
    pub fn zone_registry(&self) -> Result<(ZoneRegistry, ReplaceReport), ConfigFileError> {
        match &self.zones.file {
            Some(path) => {
                let mut registry = ZoneRegistry::new();
                let report = registry.replace_values(read_zone_file(path)?);
                Ok((registry, report))
            }
            None => {
                let registry = ZoneRegistry::from_boundary(&self.boundary);
                let report = ReplaceReport {
                    generation: registry.generation(),
                    accepted: registry.ids().cloned().collect(),
                    rejected: Vec::new(),
                };
                Ok((registry, report))
            }
        }
    }

    /// Webhook dispatcher when a URL is set, otherwise log-only.
    pub fn dispatcher(&self) -> Result<NotificationDispatcher, ConfigFileError> {
        let timeout = Duration::from_secs(self.alerts.dispatch_timeout_secs);
        match &self.alerts.webhook_url {
            Some(url) => {
                let notifier = WebhookNotifier::new(url.clone(), timeout)?;
                Ok(NotificationDispatcher::new(Arc::new(notifier), timeout))
            }
            None => Ok(NotificationDispatcher::logging()),
        }
    }
}

/// Reads raw zone entries from a JSON file.
///
/// Accepts either a bare array or an object with a `zones` array, the same
/// shape clients send in configuration updates.
pub fn read_zone_file(path: &Path) -> Result<Vec<serde_json::Value>, ConfigFileError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let invalid = |reason: String| ConfigFileError::ZoneFile {
        path: path.to_path_buf(),
        reason,
    };
    let value: serde_json::Value =
        serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))?;
    match value {
        serde_json::Value::Array(entries) => Ok(entries),
        serde_json::Value::Object(mut object) => match object.remove("zones") {
            Some(serde_json::Value::Array(entries)) => Ok(entries),
            _ => Err(invalid("expected a \"zones\" array".to_string())),
        },
        _ => Err(invalid("expected an array of zones".to_string())),
    }
}
