//! # Config Loader
//!
//! Loads `commander.toml` and layers the environment on top of it. The CLI applies its
//! own flags last, so the effective precedence is: flags, environment, file, defaults.
use crate::{
    constants::{CONCURRENCY_ENV, CONFIG_DIR, CONFIG_FILENAME},
    models::CommanderConfig,
};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Could not parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Environment variable {name} has invalid value '{value}'.")]
    InvalidEnv { name: &'static str, value: String },
}

/// `<config_dir>/commander/commander.toml`, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILENAME))
}

/// Loads the configuration.
///
/// An explicit `path` must exist. Without one, the default location is tried and a
/// missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<CommanderConfig, ConfigError> {
    let (path, must_exist) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match default_config_path() {
            Some(p) => (p, false),
            None => {
                log::debug!("No platform config directory; using default configuration.");
                return Ok(CommanderConfig::default());
            }
        },
    };

    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound && !must_exist => {
            log::debug!("Config file {} not found; using defaults.", path.display());
            return Ok(CommanderConfig::default());
        }
        Err(source) => return Err(ConfigError::Io { path, source }),
    };

    let config: CommanderConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;
    log::debug!("Loaded config from {}: {:?}", path.display(), config);
    Ok(config)
}

/// Applies environment overrides read through `lookup` (usually `std::env::var(..).ok()`).
pub fn apply_env_overrides<F>(config: &mut CommanderConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(CONCURRENCY_ENV) {
        let concurrency = value
            .trim()
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidEnv {
                name: CONCURRENCY_ENV,
                value: value.clone(),
            })?;
        config.executor.concurrency = Some(concurrency);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_config() {
        let file = write_config("log_level = \"debug\"\n[executor]\nconcurrency = 3\n");
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.executor.concurrency, Some(3));
        assert_eq!(config.executor.concurrency(), 3);
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let file = write_config("");
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config, CommanderConfig::default());
        assert!(config.executor.concurrency() >= 1);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(Some(&dir.path().join("nope.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let file = write_config("[executor]\nthreads = 3\n");
        assert!(matches!(
            load_config(Some(file.path())),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_env_overrides_concurrency() {
        let mut config = CommanderConfig::default();
        apply_env_overrides(&mut config, |name| {
            (name == CONCURRENCY_ENV).then(|| " 7 ".to_string())
        })
        .unwrap();
        assert_eq!(config.executor.concurrency(), 7);

        let err = apply_env_overrides(&mut config, |_| Some("many".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn test_zero_concurrency_means_default() {
        let mut config = CommanderConfig::default();
        config.executor.concurrency = Some(0);
        assert!(config.executor.concurrency() >= 1);
    }
}
