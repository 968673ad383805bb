use core::fmt::Display;
use std::sync::Arc;

use crate::{
    command::Launch,
    config::{GlobalConfig, Logger, launch::LaunchLogLevel},
    server::Argument,
};

/// Logger used by servers to report launches, configured by the `[launch.logger]` section.
#[derive(Debug)]
pub struct ServerLogger {
    logger: Logger,
    level: LaunchLogLevel,
}

impl Default for ServerLogger {
    fn default() -> Self {
        Self::new(GlobalConfig::get())
    }
}

impl ServerLogger {
    /// Create a server logger from a configuration.
    pub fn new(config: Arc<GlobalConfig>) -> Self {
        let logger = Logger::from_config(config);
        let level = match logger.is_active() {
            true => logger.log_level_launch(),
            false => LaunchLogLevel::Disabled,
        };

        Self { logger, level }
    }

    /// Returns true if launches are logged.
    pub fn launch_activated(&self) -> bool {
        self.level != LaunchLogLevel::Disabled
    }

    /// Log a launch according to the configured level.
    pub fn log_launch(&mut self, launch: &Launch) {
        match self.level {
            LaunchLogLevel::Disabled => {}
            LaunchLogLevel::Basic => self.logger.log_launch(launch),
            LaunchLogLevel::Full => self.logger.log_launch(&FullLaunch(launch)),
        }
    }
}

struct FullLaunch<'a>(&'a Launch);

impl Display for FullLaunch<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let launch = self.0;
        write!(f, "{launch} with {} buffer(s)", launch.buffer_count())?;

        for (index, argument) in launch.bindings.arguments.iter() {
            match argument {
                Argument::Buffer(binding) => {
                    write!(f, "\n  [{index}] buffer {:?} ({} bytes)", binding.id(), binding.size())?
                }
                Argument::Scalar(value) => write!(f, "\n  [{index}] scalar {value}")?,
            }
        }
        for (index, size) in launch.bindings.shared_memories.iter() {
            write!(f, "\n  shared [{index}] {size} bytes")?;
        }

        Ok(())
    }
}
