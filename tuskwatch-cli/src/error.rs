//! CLI error type.

use std::fmt;

use tuskwatch::config::ConfigFileError;
use tuskwatch::logging::LoggingError;
use tuskwatch::server::ServerError;
use tuskwatch::session::SessionError;
use tuskwatch::source::SourceError;

/// Everything a command can fail with.
#[derive(Debug)]
pub enum CliError {
    /// Invalid arguments or settings.
    Config(String),
    /// The config file could not be read, written or interpreted.
    ConfigFile(ConfigFileError),
    Logging(LoggingError),
    /// The WebSocket server failed.
    Serve(ServerError),
    /// The frame source could not be opened.
    Source(SourceError),
    /// The tracking session ended abnormally.
    Session(SessionError),
    /// The async runtime could not be created.
    Runtime(std::io::Error),
    /// A zone file has invalid entries.
    Zones(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::Logging(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Serve(e) => write!(f, "Server error: {}", e),
            CliError::Source(e) => write!(f, "Frame source error: {}", e),
            CliError::Session(e) => write!(f, "Tracking session error: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::Zones(msg) => write!(f, "Zone error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Logging(e) => Some(e),
            CliError::Serve(e) => Some(e),
            CliError::Source(e) => Some(e),
            CliError::Session(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Config(_) | CliError::Zones(_) => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<ServerError> for CliError {
    fn from(e: ServerError) -> Self {
        CliError::Serve(e)
    }
}

impl From<SourceError> for CliError {
    fn from(e: SourceError) -> Self {
        CliError::Source(e)
    }
}

impl From<SessionError> for CliError {
    fn from(e: SessionError) -> Self {
        CliError::Session(e)
    }
}
