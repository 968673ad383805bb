use super::{GlobalConfig, launch::LaunchLogLevel};
use core::fmt::Display;
use hashbrown::HashMap;
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::PathBuf,
    sync::Arc,
};

/// Configuration for logging in Parred, parameterized by a log level type.
///
/// Note that you can use multiple loggers at the same time.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct LoggerConfig<L: LogLevel> {
    /// Path to the log file, if file logging is enabled.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Whether to append to the log file (true) or overwrite it (false). Defaults to true.
    #[serde(default = "append_default")]
    pub append: bool,

    /// Whether to log to standard output.
    #[serde(default)]
    pub stdout: bool,

    /// Whether to log to standard error.
    #[serde(default)]
    pub stderr: bool,

    /// Optional crate-level logging configuration (e.g., info, debug, trace).
    #[serde(default)]
    pub log: Option<LogCrateLevel>,

    /// The log level for this logger, determining verbosity.
    #[serde(default)]
    pub level: L,
}

impl<L: LogLevel> Default for LoggerConfig<L> {
    fn default() -> Self {
        Self {
            file: None,
            append: true,
            stdout: false,
            stderr: false,
            log: None,
            level: L::default(),
        }
    }
}

/// Log levels using the `log` crate.
///
/// This enum defines verbosity levels for crate-level logging.
#[derive(
    Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize, Hash, PartialEq, Eq,
)]
pub enum LogCrateLevel {
    /// Logs informational messages.
    #[default]
    #[serde(rename = "info")]
    Info,

    /// Logs debugging messages.
    #[serde(rename = "debug")]
    Debug,

    /// Logs trace-level messages.
    #[serde(rename = "trace")]
    Trace,
}

fn append_default() -> bool {
    true
}

/// Trait for types that can be used as log levels in `LoggerConfig`.
pub trait LogLevel:
    serde::de::DeserializeOwned + serde::Serialize + Clone + Copy + core::fmt::Debug + Default
{
}

/// Central logging utility for Parred, managing multiple log outputs.
#[derive(Debug)]
pub struct Logger {
    /// Collection of logger instances (file, stdout, stderr, or crate-level).
    loggers: Vec<LoggerKind>,

    /// Indices of loggers used for launch logging.
    launch_index: Vec<usize>,

    /// Global configuration for logging settings.
    pub config: Arc<GlobalConfig>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Hash, PartialEq, Eq)]
enum LoggerId {
    File(PathBuf),
    Stdout,
    Stderr,
    LogCrate(LogCrateLevel),
}

impl Logger {
    /// Creates a new `Logger` instance based on the global configuration.
    pub fn new() -> Self {
        Self::from_config(GlobalConfig::get())
    }

    /// Creates a new `Logger` from an explicit configuration.
    ///
    /// Loggers shared by several settings (e.g. the same file) are only opened once.
    pub fn from_config(config: Arc<GlobalConfig>) -> Self {
        let mut loggers = Vec::new();
        let mut launch_index = Vec::new();
        let mut logger2index = HashMap::<LoggerId, usize>::new();

        let mut register = |id: LoggerId, logger: &dyn Fn() -> Option<LoggerKind>| {
            if let Some(index) = logger2index.get(&id) {
                launch_index.push(*index);
            } else if let Some(logger) = logger() {
                let index = loggers.len();
                logger2index.insert(id, index);
                loggers.push(logger);
                launch_index.push(index);
            }
        };

        let kind = &config.launch.logger;
        if kind.level != LaunchLogLevel::Disabled {
            if let Some(file) = &kind.file {
                register(LoggerId::File(file.clone()), &|| {
                    FileLogger::new(file, kind.append).map(LoggerKind::File)
                });
            }
            if kind.stdout {
                register(LoggerId::Stdout, &|| Some(LoggerKind::Stdout));
            }
            if kind.stderr {
                register(LoggerId::Stderr, &|| Some(LoggerKind::Stderr));
            }
            if let Some(level) = kind.log {
                register(LoggerId::LogCrate(level), &|| Some(LoggerKind::Log(level)));
            }
        }

        Self {
            loggers,
            launch_index,
            config,
        }
    }

    /// Logs a message for launches, directing it to all configured launch loggers.
    pub fn log_launch<S: Display>(&mut self, msg: &S) {
        let length = self.launch_index.len();
        if length > 1 {
            let msg = msg.to_string();
            for i in 0..length {
                let index = self.launch_index[i];
                self.loggers[index].log(&msg)
            }
        } else if let Some(index) = self.launch_index.first() {
            self.loggers[*index].log(msg)
        }
    }

    /// Returns the current launch log level from the global configuration.
    pub fn log_level_launch(&self) -> LaunchLogLevel {
        self.config.launch.logger.level
    }

    /// If at least one output receives launch logs.
    pub fn is_active(&self) -> bool {
        !self.launch_index.is_empty()
    }
}

/// Represents different types of loggers.
#[derive(Debug)]
enum LoggerKind {
    /// Logs to a file.
    File(FileLogger),

    /// Logs to standard output.
    Stdout,

    /// Logs to standard error.
    Stderr,

    /// Logs using the `log` crate with a specified level.
    Log(LogCrateLevel),
}

impl LoggerKind {
    fn log<S: Display>(&mut self, msg: &S) {
        match self {
            LoggerKind::File(file_logger) => file_logger.log(msg),
            LoggerKind::Stdout => println!("{msg}"),
            LoggerKind::Stderr => eprintln!("{msg}"),
            LoggerKind::Log(level) => match level {
                LogCrateLevel::Info => log::info!("{msg}"),
                LogCrateLevel::Debug => log::debug!("{msg}"),
                LogCrateLevel::Trace => log::trace!("{msg}"),
            },
        }
    }
}

/// Logger that writes messages to a file.
#[derive(Debug)]
struct FileLogger {
    writer: BufWriter<File>,
}

impl FileLogger {
    fn new(path: &PathBuf, append: bool) -> Option<Self> {
        let file = OpenOptions::new()
            .write(true)
            .append(append)
            .truncate(!append)
            .create(true)
            .open(path);

        match file {
            Ok(file) => Some(Self {
                writer: BufWriter::new(file),
            }),
            Err(err) => {
                log::warn!("Can't open the launch log file {path:?}: {err}");
                None
            }
        }
    }

    // Logs a message to the file, flushing the buffer to ensure immediate write.
    fn log<S: Display>(&mut self, msg: &S) {
        let written = writeln!(self.writer, "{msg}").and_then(|_| self.writer.flush());
        if let Err(err) = written {
            log::warn!("Failed to write launch log: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(logger: LoggerConfig<LaunchLogLevel>) -> Arc<GlobalConfig> {
        let mut config = GlobalConfig::default();
        config.launch.logger = logger;
        Arc::new(config)
    }

    #[test]
    fn disabled_level_registers_nothing() {
        let logger = Logger::from_config(config_with(LoggerConfig {
            stdout: true,
            ..Default::default()
        }));

        assert!(!logger.is_active());
    }

    #[test]
    fn file_logger_writes_every_message() {
        let path = std::env::temp_dir().join(format!("parred-log-{}.log", std::process::id()));
        let mut logger = Logger::from_config(config_with(LoggerConfig {
            file: Some(path.clone()),
            append: false,
            log: Some(LogCrateLevel::Debug),
            level: LaunchLogLevel::Basic,
            ..Default::default()
        }));

        logger.log_launch(&"first");
        logger.log_launch(&"second");
        drop(logger);

        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }
}
