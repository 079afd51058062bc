//! Typed access to individual configuration settings.

use std::path::PathBuf;
use std::str::FromStr;

use super::{ConfigFile, ConfigFileError};

/// Every setting of `config.ini`, addressable as `section.key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    ServerBindAddress,
    CameraReferenceLat,
    CameraReferenceLng,
    CameraMetersPerUnit,
    CameraOriginX,
    CameraOriginY,
    StreamFrameRate,
    StreamSource,
    StreamReplayFile,
    StreamRestamp,
    StreamMockEntities,
    StreamMockFrameLimit,
    AlertsCooldownSecs,
    AlertsTrigger,
    AlertsWebhookUrl,
    AlertsDispatchTimeoutSecs,
    ZonesFile,
    ZonesReplacePolicy,
    BoundaryEnabled,
    BoundaryCenterX,
    BoundaryCenterY,
    BoundarySize,
    BoundaryName,
    LoggingLevel,
    LoggingDirectory,
}

impl ConfigKey {
    /// All keys, grouped by section in file order.
    pub fn all() -> &'static [ConfigKey] {
        use ConfigKey::*;
        &[
            ServerBindAddress,
            CameraReferenceLat,
            CameraReferenceLng,
            CameraMetersPerUnit,
            CameraOriginX,
            CameraOriginY,
            StreamFrameRate,
            StreamSource,
            StreamReplayFile,
            StreamRestamp,
            StreamMockEntities,
            StreamMockFrameLimit,
            AlertsCooldownSecs,
            AlertsTrigger,
            AlertsWebhookUrl,
            AlertsDispatchTimeoutSecs,
            ZonesFile,
            ZonesReplacePolicy,
            BoundaryEnabled,
            BoundaryCenterX,
            BoundaryCenterY,
            BoundarySize,
            BoundaryName,
            LoggingLevel,
            LoggingDirectory,
        ]
    }

    /// Full name, e.g. `alerts.cooldown_secs`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// INI section.
    pub fn section(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            ServerBindAddress => "server",
            CameraReferenceLat | CameraReferenceLng | CameraMetersPerUnit | CameraOriginX
            | CameraOriginY => "camera",
            StreamFrameRate | StreamSource | StreamReplayFile | StreamRestamp
            | StreamMockEntities | StreamMockFrameLimit => "stream",
            AlertsCooldownSecs | AlertsTrigger | AlertsWebhookUrl | AlertsDispatchTimeoutSecs => {
                "alerts"
            }
            ZonesFile | ZonesReplacePolicy => "zones",
            BoundaryEnabled | BoundaryCenterX | BoundaryCenterY | BoundarySize | BoundaryName => {
                "boundary"
            }
            LoggingLevel | LoggingDirectory => "logging",
        }
    }

    /// Key within its section.
    pub fn key_name(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            ServerBindAddress => "bind_address",
            CameraReferenceLat => "reference_lat",
            CameraReferenceLng => "reference_lng",
            CameraMetersPerUnit => "meters_per_unit",
            CameraOriginX => "origin_x",
            CameraOriginY => "origin_y",
            StreamFrameRate => "frame_rate",
            StreamSource => "source",
            StreamReplayFile => "replay_file",
            StreamRestamp => "restamp",
            StreamMockEntities => "mock_entities",
            StreamMockFrameLimit => "mock_frame_limit",
            AlertsCooldownSecs => "cooldown_secs",
            AlertsTrigger => "trigger",
            AlertsWebhookUrl => "webhook_url",
            AlertsDispatchTimeoutSecs => "dispatch_timeout_secs",
            ZonesFile => "file",
            ZonesReplacePolicy => "replace_policy",
            BoundaryEnabled => "enabled",
            BoundaryCenterX => "center_x",
            BoundaryCenterY => "center_y",
            BoundarySize => "size",
            BoundaryName => "name",
            LoggingLevel => "level",
            LoggingDirectory => "directory",
        }
    }

    /// Current value as written to the file; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        use ConfigKey::*;
        fn path(p: &Option<PathBuf>) -> String {
            p.as_ref().map(|p| p.display().to_string()).unwrap_or_default()
        }
        match self {
            ServerBindAddress => config.server.bind_address.clone(),
            CameraReferenceLat => config.camera.reference_lat.to_string(),
            CameraReferenceLng => config.camera.reference_lng.to_string(),
            CameraMetersPerUnit => config.camera.meters_per_unit.to_string(),
            CameraOriginX => config.camera.origin_x.to_string(),
            CameraOriginY => config.camera.origin_y.to_string(),
            StreamFrameRate => config.stream.frame_rate.to_string(),
            StreamSource => config.stream.source.to_string(),
            StreamReplayFile => path(&config.stream.replay_file),
            StreamRestamp => config.stream.restamp.to_string(),
            StreamMockEntities => config.stream.mock_entities.to_string(),
            StreamMockFrameLimit => config.stream.mock_frame_limit.to_string(),
            AlertsCooldownSecs => config.alerts.cooldown_secs.to_string(),
            AlertsTrigger => config.alerts.trigger.to_string(),
            AlertsWebhookUrl => config.alerts.webhook_url.clone().unwrap_or_default(),
            AlertsDispatchTimeoutSecs => config.alerts.dispatch_timeout_secs.to_string(),
            ZonesFile => path(&config.zones.file),
            ZonesReplacePolicy => match config.zones.replace_policy {
                crate::membership::ReplacePolicy::PruneRemoved => "prune".to_string(),
                crate::membership::ReplacePolicy::ResetAll => "reset".to_string(),
            },
            BoundaryEnabled => config.boundary.enabled.to_string(),
            BoundaryCenterX => config.boundary.center.x.to_string(),
            BoundaryCenterY => config.boundary.center.y.to_string(),
            BoundarySize => config.boundary.size.to_string(),
            BoundaryName => config.boundary.name.clone(),
            LoggingLevel => config.logging.level.clone(),
            LoggingDirectory => path(&config.logging.directory),
        }
    }

    /// Parse and store `value`.
    ///
    /// An empty value clears optional settings.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigFileError> {
        use ConfigKey::*;
        let value = value.trim();
        let optional_path = || (!value.is_empty()).then(|| PathBuf::from(value));
        match self {
            ServerBindAddress => config.server.bind_address = self.non_empty(value)?,
            CameraReferenceLat => config.camera.reference_lat = self.parse(value)?,
            CameraReferenceLng => config.camera.reference_lng = self.parse(value)?,
            CameraMetersPerUnit => config.camera.meters_per_unit = self.parse(value)?,
            CameraOriginX => config.camera.origin_x = self.parse(value)?,
            CameraOriginY => config.camera.origin_y = self.parse(value)?,
            StreamFrameRate => config.stream.frame_rate = self.parse(value)?,
            StreamSource => config.stream.source = self.parse(value)?,
            StreamReplayFile => config.stream.replay_file = optional_path(),
            StreamRestamp => config.stream.restamp = self.parse(value)?,
            StreamMockEntities => config.stream.mock_entities = self.parse(value)?,
            StreamMockFrameLimit => config.stream.mock_frame_limit = self.parse(value)?,
            AlertsCooldownSecs => config.alerts.cooldown_secs = self.parse(value)?,
            AlertsTrigger => config.alerts.trigger = self.parse(value)?,
            AlertsWebhookUrl => {
                config.alerts.webhook_url = (!value.is_empty()).then(|| value.to_string())
            }
            AlertsDispatchTimeoutSecs => config.alerts.dispatch_timeout_secs = self.parse(value)?,
            ZonesFile => config.zones.file = optional_path(),
            ZonesReplacePolicy => config.zones.replace_policy = self.parse(value)?,
            BoundaryEnabled => config.boundary.enabled = self.parse(value)?,
            BoundaryCenterX => config.boundary.center.x = self.parse(value)?,
            BoundaryCenterY => config.boundary.center.y = self.parse(value)?,
            BoundarySize => config.boundary.size = self.parse(value)?,
            BoundaryName => config.boundary.name = self.non_empty(value)?,
            LoggingLevel => config.logging.level = self.non_empty(value)?,
            LoggingDirectory => config.logging.directory = optional_path(),
        }
        Ok(())
    }

    fn parse<T>(&self, value: &str) -> Result<T, ConfigFileError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        value.parse().map_err(|e: T::Err| ConfigFileError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: e.to_string(),
        })
    }

    fn non_empty(&self, value: &str) -> Result<String, ConfigFileError> {
        if value.is_empty() {
            return Err(ConfigFileError::InvalidValue {
                key: self.name(),
                value: String::new(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(value.to_string())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigFileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or(ConfigFileError::UnknownKey(wanted))
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}
