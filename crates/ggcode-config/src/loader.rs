//! Loading, saving, and initializing `${HOME}/.ggcode/config.json` (§6).

use std::path::Path;

use ggcode_core::GgcodeHome;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Load configuration from `home`'s `config.json`.
///
/// # Errors
///
/// Returns [`ConfigError::Missing`] if the file does not exist,
/// [`ConfigError::Malformed`] if it is not valid JSON, or
/// [`ConfigError::Invalid`] if it fails validation.
pub fn load(home: &GgcodeHome) -> ConfigResult<Config> {
    load_file(&home.config_path())
}

/// Load configuration from an explicit path, bypassing home resolution.
///
/// # Errors
///
/// See [`load`].
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    if !path.exists() {
        return Err(ConfigError::Missing(path.display().to_string()));
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config: Config = serde_json::from_str(&text).map_err(|source| ConfigError::Malformed {
        path: path.display().to_string(),
        source,
    })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Write `config` to `home`'s `config.json`, creating the directory tree
/// if needed. Uses write-to-temp-then-rename for durability (§9).
///
/// # Errors
///
/// Returns [`ConfigError::Io`] on any filesystem failure.
pub fn save(home: &GgcodeHome, config: &Config) -> ConfigResult<()> {
    home.ensure().map_err(|source| ConfigError::Io {
        path: home.root().display().to_string(),
        source: std::io::Error::other(source.to_string()),
    })?;
    let path = home.config_path();
    let text = serde_json::to_string_pretty(config).map_err(|source| ConfigError::Malformed {
        path: path.display().to_string(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, text).map_err(|source| ConfigError::Io {
        path: tmp.display().to_string(),
        source,
    })?;
    std::fs::rename(&tmp, &path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(())
}

/// Write out the default configuration, failing if a config already
/// exists at that location (used by `config init`).
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if a config file is already present,
/// otherwise see [`save`].
pub fn init(home: &GgcodeHome) -> ConfigResult<Config> {
    let path = home.config_path();
    if path.exists() {
        return Err(ConfigError::Invalid(format!(
            "config already exists at {}",
            path.display()
        )));
    }
    let config = Config::default();
    save(home, &config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let home = GgcodeHome::from_path(dir.path());
        let created = init(&home).unwrap();
        let loaded = load(&home).unwrap();
        assert_eq!(created.agent.max_iterations, loaded.agent.max_iterations);
    }

    #[test]
    fn init_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let home = GgcodeHome::from_path(dir.path());
        init(&home).unwrap();
        assert!(init(&home).is_err());
    }

    #[test]
    fn load_missing_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let home = GgcodeHome::from_path(dir.path());
        assert!(matches!(load(&home), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn load_malformed_json_reports_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let home = GgcodeHome::from_path(dir.path());
        home.ensure().unwrap();
        std::fs::write(home.config_path(), "{ not json").unwrap();
        assert!(matches!(load(&home), Err(ConfigError::Malformed { .. })));
    }

    #[test]
    fn load_rejects_invalid_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let home = GgcodeHome::from_path(dir.path());
        home.ensure().unwrap();
        let mut config = Config::default();
        config.model_config.temperature = 5.0;
        std::fs::write(
            home.config_path(),
            serde_json::to_string(&config).unwrap(),
        )
        .unwrap();
        assert!(matches!(load(&home), Err(ConfigError::Invalid(_))));
    }
}
