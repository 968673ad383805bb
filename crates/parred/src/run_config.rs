use parred_reduce::{ReduceStrategy, RunConfig};
use parred_runtime::config::{ConfigError, find_config_file, read_config_file};
use serde::Deserialize;

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    run: RunConfig,
}

/// Load the `[run]` section of the configuration file, with the environment overrides applied.
///
/// Uses the default run when no configuration file exists.
pub fn load_run_config() -> Result<RunConfig, ConfigError> {
    let config = match find_config_file() {
        Some(path) => {
            log::info!("Reading the run configuration from {}", path.display());
            read_config_file::<ConfigFile, _>(path)?.run
        }
        None => RunConfig::default(),
    };

    Ok(override_from(config, |key| std::env::var(key).ok()))
}

fn override_from(mut config: RunConfig, var: impl Fn(&str) -> Option<String>) -> RunConfig {
    if let Some(val) = var("PARRED_STRATEGY") {
        match val.parse::<ReduceStrategy>() {
            Ok(strategy) => config.strategy = strategy,
            Err(err) => log::warn!("Ignoring PARRED_STRATEGY: {err}"),
        }
    }

    if let Some(val) = var("PARRED_LENGTH") {
        match val.parse() {
            Ok(length) => config.length = length,
            Err(_) => log::warn!("Ignoring PARRED_LENGTH={val}, not an integer"),
        }
    }

    config
}
