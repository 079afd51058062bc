//! Shared setup for long-running commands.

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tuskwatch::config::ConfigFile;
use tuskwatch::logging::{init_logging, LoggingGuard};

use crate::error::CliError;

/// Loads configuration and installs logging. Keep it alive for the whole
/// command so the log file is flushed on exit.
pub struct CliRunner {
    config: ConfigFile,
    _logging: LoggingGuard,
}

impl CliRunner {
    /// # Arguments
    ///
    /// * `config_path` - Explicit config file; the default location otherwise
    /// * `log_level` - Overrides `[logging] level`
    pub fn new(config_path: Option<&Path>, log_level: Option<&str>) -> Result<Self, CliError> {
        let config = load_config(config_path)?;

        let mut logging = config.logging_config();
        if let Some(level) = log_level {
            logging = logging.with_level(level);
        }
        let guard = init_logging(&logging)?;

        Ok(Self {
            config,
            _logging: guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            version = tuskwatch::VERSION,
            command,
            "Tuskwatch starting"
        );
    }

    /// Multi-threaded Tokio runtime for the command.
    pub fn runtime(&self) -> Result<tokio::runtime::Runtime, CliError> {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(CliError::Runtime)
    }

    /// Token cancelled on Ctrl-C.
    pub fn shutdown_token(&self, message: &'static str) -> Result<CancellationToken, CliError> {
        let token = CancellationToken::new();
        let handler_token = token.clone();
        ctrlc::set_handler(move || {
            println!();
            println!("{}", message);
            handler_token.cancel();
        })
        .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;
        Ok(token)
    }
}

/// Loads `path` if given, else the default config file.
///
/// A missing default file means defaults; a missing explicit file is an error.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    match path {
        Some(path) => Ok(ConfigFile::load_from(path)?),
        None => Ok(ConfigFile::load()?),
    }
}
