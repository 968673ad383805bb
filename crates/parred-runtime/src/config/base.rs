use super::{
    device::DeviceConfig,
    launch::{LaunchConfig, LaunchLogLevel},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Static mutex holding the global configuration, initialized as `None`.
static PARRED_GLOBAL_CONFIG: spin::Mutex<Option<Arc<GlobalConfig>>> = spin::Mutex::new(None);

/// Names of the configuration file, searched in the current directory and its parents.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["parred.toml", "Parred.toml"];

/// Represents the global configuration for Parred, combining launch and device settings.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GlobalConfig {
    /// Configuration for kernel launches.
    #[serde(default)]
    pub launch: LaunchConfig,

    /// Topology of the simulated device.
    #[serde(default)]
    pub device: DeviceConfig,
}

/// Error raised while reading a configuration file.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The file couldn't be read.
    #[error("Can't read the configuration file {path:?}\nCaused by:\n  {source}")]
    Io {
        /// The file that was read.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The file isn't valid toml or doesn't match the expected layout.
    #[error("The configuration file {path:?} doesn't have the right format\nCaused by:\n  {source}")]
    Format {
        /// The file that was parsed.
        path: PathBuf,
        /// The underlying error.
        source: toml::de::Error,
    },
}

impl GlobalConfig {
    /// Retrieves the current global configuration, loading it from the current directory if not set.
    ///
    /// If no configuration is set, it attempts to load one from `parred.toml` or `Parred.toml` in
    /// the current directory or its parents. If no file is found, a default configuration is used.
    ///
    /// # Panics
    ///
    /// Panics if a configuration file is found but can't be parsed.
    pub fn get() -> Arc<Self> {
        let mut state = PARRED_GLOBAL_CONFIG.lock();
        if let Some(config) = state.as_ref() {
            return config.clone();
        }

        let config = match find_config_file() {
            Some(path) => match Self::from_file_path(&path) {
                Ok(config) => config,
                Err(err) => panic!("{err}"),
            },
            None => Self::default(),
        };
        let config = Arc::new(config.override_from_env());
        *state = Some(config.clone());

        config
    }

    /// Sets the global configuration to the provided value.
    ///
    /// # Panics
    /// Panics if the configuration has already been set or read, as it cannot be overridden.
    ///
    /// # Warning
    /// This method must be called at the start of the program, before any calls to `get`. Attempting
    /// to set the configuration after it has been initialized will cause a panic.
    pub fn set(config: Self) {
        let mut state = PARRED_GLOBAL_CONFIG.lock();
        if state.is_some() {
            panic!("Cannot set the global configuration multiple times.");
        }
        *state = Some(Arc::new(config));
    }

    /// Save the current configuration to the provided file path.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, content)
    }

    /// Overrides configuration fields based on environment variables.
    pub fn override_from_env(self) -> Self {
        self.override_from(|key| std::env::var(key).ok())
    }

    fn override_from(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(val) = var("PARRED_DEBUG_LOG") {
            let logger = &mut self.launch.logger;
            logger.level = LaunchLogLevel::Full;

            match val.as_str() {
                "stdout" => logger.stdout = true,
                "stderr" => logger.stderr = true,
                "1" | "true" => logger.file = Some("/tmp/parred.log".into()),
                "0" | "false" => logger.level = LaunchLogLevel::Disabled,
                file_path => logger.file = Some(file_path.into()),
            }
        }

        if let Some(val) = var("PARRED_LAUNCH_TIMEOUT_MS") {
            match val.parse() {
                Ok(timeout_ms) => self.launch.timeout_ms = timeout_ms,
                Err(_) => log::warn!("Ignoring PARRED_LAUNCH_TIMEOUT_MS={val}, not an integer"),
            }
        }

        self
    }

    /// Loads configuration from a specified file path.
    pub fn from_file_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        read_config_file(path)
    }
}

/// Read a configuration file into `T`.
///
/// Keys `T` doesn't know about are ignored, so every consumer of the file can deserialize the
/// sections it cares about.
pub fn read_config_file<T, P>(path: P) -> Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::Format {
        path: path.to_path_buf(),
        source,
    })
}

/// Finds `parred.toml` or `Parred.toml` in the current directory or its parents.
///
/// Traverses up the directory tree until a configuration file is found or the root is reached.
pub fn find_config_file() -> Option<PathBuf> {
    let mut dir = std::env::current_dir().ok()?;

    loop {
        for name in CONFIG_FILE_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        if !dir.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_sections_use_defaults() {
        let config: GlobalConfig = toml::from_str("[launch]\ntimeout_ms = 25\n").unwrap();

        assert_eq!(config.launch.timeout_ms, 25);
        assert_eq!(config.launch.logger.level, LaunchLogLevel::Disabled);
        assert_eq!(config.device, DeviceConfig::default());
    }

    #[test]
    fn device_section_is_parsed() {
        let content = r#"
            [device]
            max_group_size = 64
            plane_dim = 16
            subgroups = false
        "#;
        let config: GlobalConfig = toml::from_str(content).unwrap();

        assert_eq!(config.device.max_group_size, 64);
        assert_eq!(config.device.plane_dim, 16);
        assert!(!config.device.subgroups);
        assert_eq!(config.device.max_bindings, DeviceConfig::default().max_bindings);
    }

    #[test]
    fn env_overrides_logger_and_timeout() {
        let config = GlobalConfig::default().override_from(|key| match key {
            "PARRED_DEBUG_LOG" => Some("stderr".to_string()),
            "PARRED_LAUNCH_TIMEOUT_MS" => Some("1500".to_string()),
            _ => None,
        });

        assert_eq!(config.launch.logger.level, LaunchLogLevel::Full);
        assert!(config.launch.logger.stderr);
        assert_eq!(config.launch.timeout_ms, 1500);
    }

    #[test]
    fn invalid_timeout_is_ignored() {
        let config = GlobalConfig::default().override_from(|key| match key {
            "PARRED_LAUNCH_TIMEOUT_MS" => Some("soon".to_string()),
            _ => None,
        });

        assert_eq!(config.launch.timeout_ms, LaunchConfig::default().timeout_ms);
    }

    #[test]
    fn saved_config_can_be_loaded_back() {
        let path = std::env::temp_dir().join(format!("parred-config-{}.toml", std::process::id()));
        let mut config = GlobalConfig::default();
        config.device.max_group_size = 128;

        config.save(&path).unwrap();
        let loaded = GlobalConfig::from_file_path(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.device, config.device);
    }

    #[test]
    fn malformed_file_is_reported() {
        let path = std::env::temp_dir().join(format!("parred-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[device]\nmax_group_size = \"large\"\n").unwrap();

        let result = GlobalConfig::from_file_path(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(result, Err(ConfigError::Format { .. })));
    }

    #[test]
    #[serial_test::serial]
    fn global_config_is_loaded_once() {
        let first = GlobalConfig::get();
        let second = GlobalConfig::get();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    #[serial_test::serial]
    #[should_panic(expected = "Cannot set the global configuration multiple times.")]
    fn global_config_cannot_be_set_after_being_read() {
        GlobalConfig::get();
        GlobalConfig::set(GlobalConfig::default());
    }
}
