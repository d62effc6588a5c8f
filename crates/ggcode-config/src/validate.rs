//! Schema/range validation rules for [`Config`] (§6, §7 `config-schema`).

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Validate every range-bounded field in `config`.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] naming the first field out of range.
pub fn validate(config: &Config) -> ConfigResult<()> {
    let m = &config.model_config;
    in_range("model_config.temperature", m.temperature, 0.0, 2.0)?;
    in_range("model_config.top_p", m.top_p, 0.0, 1.0)?;
    in_range_i32("model_config.top_k", m.top_k, -1, 100)?;
    in_range("model_config.repetition_penalty", m.repetition_penalty, 1.0, 2.0)?;

    let a = &config.agent;
    in_range("agent.compress_threshold", a.compress_threshold, 0.0, 1.0)?;
    if a.max_iterations == 0 {
        return Err(ConfigError::Invalid(
            "agent.max_iterations must be at least 1".to_string(),
        ));
    }
    if a.max_context_tokens == 0 {
        return Err(ConfigError::Invalid(
            "agent.max_context_tokens must be greater than 0".to_string(),
        ));
    }

    if config.api.base_url.is_empty() {
        return Err(ConfigError::Invalid(
            "api.base_url must not be empty".to_string(),
        ));
    }
    if config.api.model.is_empty() {
        return Err(ConfigError::Invalid(
            "api.model must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn in_range(field: &str, value: f64, min: f64, max: f64) -> ConfigResult<()> {
    if value < min || value > max {
        return Err(ConfigError::Invalid(format!(
            "{field} must be in [{min}, {max}], got {value}"
        )));
    }
    Ok(())
}

fn in_range_i32(field: &str, value: i32, min: i32, max: i32) -> ConfigResult<()> {
    if value < min || value > max {
        return Err(ConfigError::Invalid(format!(
            "{field} must be in [{min}, {max}], got {value}"
        )));
    }
    Ok(())
}

/// Validate and apply a single `/setting set <param> <value>` update,
/// returning the updated config on success.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] for an unknown parameter name or an
/// out-of-range / unparsable value.
pub fn apply_setting(mut config: Config, param: &str, value: &str) -> ConfigResult<Config> {
    let parsed: f64 = value
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("'{value}' is not a number")))?;
    match param {
        "temperature" => config.model_config.temperature = parsed,
        "top_p" => config.model_config.top_p = parsed,
        "top_k" => config.model_config.top_k = parsed as i32,
        "repetition_penalty" => config.model_config.repetition_penalty = parsed,
        other => {
            return Err(ConfigError::Invalid(format!(
                "unknown setting parameter '{other}'"
            )))
        }
    }
    validate(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn temperature_out_of_range_rejected() {
        let mut config = Config::default();
        config.model_config.temperature = 2.1;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn top_k_allows_negative_one_sentinel() {
        let mut config = Config::default();
        config.model_config.top_k = -1;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn apply_setting_updates_and_validates() {
        let config = Config::default();
        let updated = apply_setting(config, "temperature", "1.2").unwrap();
        assert!((updated.model_config.temperature - 1.2).abs() < f64::EPSILON);
    }

    #[test]
    fn apply_setting_rejects_unknown_param() {
        let config = Config::default();
        assert!(apply_setting(config, "nonsense", "1").is_err());
    }

    #[test]
    fn apply_setting_rejects_out_of_range() {
        let config = Config::default();
        assert!(apply_setting(config, "top_p", "5").is_err());
    }
}
