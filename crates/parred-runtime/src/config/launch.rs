use core::time::Duration;

use super::logger::LoggerConfig;

/// Configuration of kernel launches.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct LaunchConfig {
    /// How long the host waits for a submitted command buffer before giving up.
    #[serde(default = "timeout_ms_default")]
    pub timeout_ms: u64,

    /// Logger used to report every launch.
    #[serde(default)]
    pub logger: LoggerConfig<LaunchLogLevel>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: timeout_ms_default(),
            logger: LoggerConfig::default(),
        }
    }
}

impl LaunchConfig {
    /// The launch timeout as a [Duration].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn timeout_ms_default() -> u64 {
    10_000
}

/// Verbosity of launch logging.
#[derive(Default, Copy, Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum LaunchLogLevel {
    /// Launch logging is disabled.
    #[default]
    #[serde(rename = "disabled")]
    Disabled,

    /// Logs the entry point and the launch shape.
    #[serde(rename = "basic")]
    Basic,

    /// Logs the entry point, the launch shape and every binding.
    #[serde(rename = "full")]
    Full,
}

impl super::LogLevel for LaunchLogLevel {}
