//! Settings file management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::deploy::command::DEFAULT_OUTPUT_CAP;
use crate::deploy::{CommandTimeouts, DeployerOptions, LogLimits};
use crate::errors::DeployerError;
use crate::logs::LogLevel;

/// Deployer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Also write a daily rolling log file under the logs directory
    #[serde(default)]
    pub log_to_file: bool,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Command timeouts
    #[serde(default)]
    pub timeouts: TimeoutSettings,

    /// Journal line limits
    #[serde(default)]
    pub logs: LogLimitSettings,

    /// Seconds a mutating call waits for the application lock
    #[serde(default = "default_lock_wait")]
    pub lock_wait_secs: u64,

    /// Bytes of stdout/stderr kept per command
    #[serde(default = "default_output_cap")]
    pub output_cap_bytes: usize,

    /// Parent of default workspaces; `<base>/workspaces` when unset
    #[serde(default)]
    pub workspaces_dir: Option<PathBuf>,
}

fn default_lock_wait() -> u64 {
    30
}

fn default_output_cap() -> usize {
    DEFAULT_OUTPUT_CAP
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            server: ServerSettings::default(),
            timeouts: TimeoutSettings::default(),
            logs: LogLimitSettings::default(),
            lock_wait_secs: default_lock_wait(),
            output_cap_bytes: default_output_cap(),
            workspaces_dir: None,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8002
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Timeouts in seconds per command family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_git_secs")]
    pub git_secs: u64,

    #[serde(default = "default_build_secs")]
    pub build_secs: u64,

    #[serde(default = "default_service_secs")]
    pub service_secs: u64,

    #[serde(default = "default_query_secs")]
    pub query_secs: u64,
}

fn default_git_secs() -> u64 {
    600
}

fn default_build_secs() -> u64 {
    1800
}

fn default_service_secs() -> u64 {
    120
}

fn default_query_secs() -> u64 {
    30
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            git_secs: default_git_secs(),
            build_secs: default_build_secs(),
            service_secs: default_service_secs(),
            query_secs: default_query_secs(),
        }
    }
}

impl From<&TimeoutSettings> for CommandTimeouts {
    fn from(t: &TimeoutSettings) -> Self {
        Self {
            git: Duration::from_secs(t.git_secs),
            build: Duration::from_secs(t.build_secs),
            service: Duration::from_secs(t.service_secs),
            query: Duration::from_secs(t.query_secs),
        }
    }
}

/// Bounds for `lines` on log requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLimitSettings {
    #[serde(default = "default_lines")]
    pub default_lines: u32,

    #[serde(default = "default_min_lines")]
    pub min_lines: u32,

    #[serde(default = "default_max_lines")]
    pub max_lines: u32,
}

fn default_lines() -> u32 {
    100
}

fn default_min_lines() -> u32 {
    1
}

fn default_max_lines() -> u32 {
    10_000
}

impl Default for LogLimitSettings {
    fn default() -> Self {
        Self {
            default_lines: default_lines(),
            min_lines: default_min_lines(),
            max_lines: default_max_lines(),
        }
    }
}

impl Settings {
    /// Apply `DEPLOYER_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("DEPLOYER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("DEPLOYER_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!("Ignoring invalid DEPLOYER_PORT: {}", port),
            }
        }
        if let Some(level) = lookup("DEPLOYER_LOG_LEVEL") {
            match level.parse() {
                Ok(level) => self.log_level = level,
                Err(e) => warn!("Ignoring DEPLOYER_LOG_LEVEL: {}", e),
            }
        }
        if let Some(max) = lookup("DEPLOYER_MAX_LINES") {
            match max.parse() {
                Ok(max) => self.logs.max_lines = max,
                Err(_) => warn!("Ignoring invalid DEPLOYER_MAX_LINES: {}", max),
            }
        }
    }

    /// Reject combinations the deployer cannot run with
    pub fn validate(&self) -> Result<(), DeployerError> {
        let limits = &self.logs;
        if limits.min_lines == 0 || limits.min_lines > limits.max_lines {
            return Err(DeployerError::ConfigError(format!(
                "log line bounds must satisfy 1 <= min_lines ({}) <= max_lines ({})",
                limits.min_lines, limits.max_lines
            )));
        }
        let t = &self.timeouts;
        if [t.git_secs, t.build_secs, t.service_secs, t.query_secs].contains(&0) {
            return Err(DeployerError::ConfigError(
                "command timeouts must be non-zero".to_string(),
            ));
        }
        if self.output_cap_bytes == 0 {
            return Err(DeployerError::ConfigError(
                "output_cap_bytes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn deployer_options(&self) -> DeployerOptions {
        let limits = &self.logs;
        DeployerOptions {
            timeouts: CommandTimeouts::from(&self.timeouts),
            log_limits: LogLimits {
                default_lines: limits
                    .default_lines
                    .clamp(limits.min_lines, limits.max_lines),
                min_lines: limits.min_lines,
                max_lines: limits.max_lines,
            },
            lock_wait: Duration::from_secs(self.lock_wait_secs),
            output_cap: self.output_cap_bytes,
        }
    }
}
