//! Configuration validation for Cosmic Watch.
//!
//! Missing credentials are the only startup condition that aborts the
//! process; everything else in the service degrades per cycle.

use thiserror::Error;

use crate::config::{Config, FeedConfig, MonitorConfig, ObservabilityConfig, TelegramConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.feed.validate() {
            errors.push(e);
        }
        if let Err(e) = self.telegram.validate() {
            errors.push(e);
        }
        if let Err(e) = self.monitor.validate() {
            errors.push(e);
        }
        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load with environment overrides and validate.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

fn missing(field: &str) -> ValidationError {
    ValidationError::MissingField {
        field: field.to_string(),
    }
}

impl Validate for FeedConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(missing("feed.api_key"));
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "feed.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for TelegramConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.bot_token.as_deref().map_or(true, str::is_empty) {
            return Err(missing("telegram.bot_token"));
        }
        if self.group_chat_id.is_none() {
            return Err(missing("telegram.group_chat_id"));
        }
        Ok(())
    }
}

impl Validate for MonitorConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.interval_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "monitor.interval_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.delivery_concurrency == 0 {
            return Err(ValidationError::InvalidValue {
                field: "monitor.delivery_concurrency".into(),
                reason: "must be greater than 0".into(),
            });
        }
        for (field, value) in [
            ("monitor.creation_threshold", self.creation_threshold),
            ("monitor.alert_threshold", self.alert_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::InvalidValue {
                    field: field.into(),
                    reason: format!("{value} is not a non-negative score"),
                });
            }
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        const FORMATS: &[&str] = &["json", "pretty"];

        if !LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of {}", LEVELS.join(", ")),
            });
        }
        if !FORMATS.contains(&self.log_format.as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of {}", FORMATS.join(", ")),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_config() -> Config {
        let mut config = Config::default();
        config.feed.api_key = Some("key".into());
        config.telegram.bot_token = Some("123:abc".into());
        config.telegram.group_chat_id = Some(-1001);
        config
    }

    #[test]
    fn test_complete_config_is_valid() {
        assert!(complete_config().validate().is_ok());
    }

    #[test]
    fn test_default_config_reports_all_missing_credentials() {
        let err = Config::default().validate().unwrap_err();
        match err {
            ValidationError::Multiple(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_group_chat() {
        let mut config = complete_config();
        config.telegram.group_chat_id = None;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("telegram.group_chat_id"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = complete_config();
        config.monitor.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let mut config = complete_config();
        config.monitor.alert_threshold = -1.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("monitor.alert_threshold"));
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        let mut config = complete_config();
        config.observability.log_format = "xml".into();
        assert!(config.validate().is_err());
    }
}
