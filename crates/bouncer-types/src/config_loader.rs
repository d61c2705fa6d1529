/// Config file loader with environment overrides and validation.
///
/// Reads the YAML config, lets secrets come from the environment instead of
/// the file, and rejects configurations the daemon could not run with.
use std::net::SocketAddr;
use std::path::Path;

use crate::config::*;
use crate::errors::BouncerError;

/// Environment variable overriding `telegram.access_token`.
pub const ENV_TELEGRAM_TOKEN: &str = "BOUNCER_TELEGRAM_TOKEN";

/// Environment variable overriding `registry.database_url`.
pub const ENV_DATABASE_URL: &str = "BOUNCER_DATABASE_URL";

/// A validated configuration together with its parsed message templates.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: BouncerConfig,
    pub templates: MessageTemplates,
}

/// Loads and validates the bouncer configuration.
///
/// Expected file layout:
/// ```yaml
/// enabled: true
/// telegram:
///   chat_ids: "-1001,-1002"
/// messages:
///   info: "Verify at {help} to join {title}"
///   welcome: "Welcome to {title}! Rules: {rules}"
///   help_url: https://forum.example/verify
///   rules_url: https://forum.example/rules
/// registry:
///   database_url: postgres://localhost/forum
/// ```
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the config file at `path`, apply process environment overrides
    /// and validate.
    pub fn load(path: &Path) -> Result<LoadedConfig, BouncerError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Like [`load`](Self::load), reading overrides through `env`.
    pub fn load_with_env<F>(path: &Path, env: F) -> Result<LoadedConfig, BouncerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BouncerError::Config(format!("failed to read {}: {e}", path.display())))?;
        let mut config: BouncerConfig = serde_yaml::from_str(&content)
            .map_err(|e| BouncerError::Config(format!("failed to parse {}: {e}", path.display())))?;

        Self::apply_overrides(&mut config, env);
        let templates = Self::validate(&config)?;

        tracing::debug!(
            path = %path.display(),
            groups = config.telegram.monitored_groups().len(),
            "configuration loaded"
        );
        Ok(LoadedConfig { config, templates })
    }

    /// Replace secrets with values from the environment when present.
    fn apply_overrides<F>(config: &mut BouncerConfig, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = env(ENV_TELEGRAM_TOKEN).filter(|v| !v.is_empty()) {
            config.telegram.access_token = token;
        }
        if let Some(url) = env(ENV_DATABASE_URL).filter(|v| !v.is_empty()) {
            config.registry.database_url = url;
        }
    }

    /// Validate the config for internal consistency and parse its templates.
    ///
    /// Checks:
    /// - Access token and database URL are present
    /// - At least one monitored group is configured
    /// - Timeouts and intervals are positive, and the long poll fits in a cycle
    /// - Templates only use the placeholders allowed for their kind
    /// - The HTTP listen address parses
    pub fn validate(config: &BouncerConfig) -> Result<MessageTemplates, BouncerError> {
        Self::validate_telegram(&config.telegram)?;
        Self::validate_registry(&config.registry)?;
        Self::validate_schedule(&config.schedule, &config.telegram)?;

        config
            .http
            .listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| {
                BouncerError::Config(format!(
                    "invalid http.listen_addr '{}': {e}",
                    config.http.listen_addr
                ))
            })?;

        config.messages.compile()
    }

    fn validate_telegram(config: &TelegramConfig) -> Result<(), BouncerError> {
        if config.access_token.trim().is_empty() {
            return Err(BouncerError::Config(format!(
                "telegram.access_token is empty (set it in the file or via {ENV_TELEGRAM_TOKEN})"
            )));
        }
        if config.monitored_groups().is_empty() {
            return Err(BouncerError::Config(
                "telegram.chat_ids must list at least one group".to_string(),
            ));
        }
        if config.poll_timeout_secs == 0 {
            return Err(BouncerError::Config(
                "telegram.poll_timeout_secs must be positive".to_string(),
            ));
        }
        if config.request_timeout_secs == 0 {
            return Err(BouncerError::Config(
                "telegram.request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_registry(config: &RegistryConfig) -> Result<(), BouncerError> {
        if config.database_url.trim().is_empty() {
            return Err(BouncerError::Config(format!(
                "registry.database_url is empty (set it in the file or via {ENV_DATABASE_URL})"
            )));
        }
        if config.field_name.trim().is_empty() {
            return Err(BouncerError::Config(
                "registry.field_name must not be empty".to_string(),
            ));
        }
        if config.timeout_secs == 0 {
            return Err(BouncerError::Config(
                "registry.timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_schedule(
        schedule: &ScheduleConfig,
        telegram: &TelegramConfig,
    ) -> Result<(), BouncerError> {
        if schedule.poll_interval_secs == 0 {
            return Err(BouncerError::Config(
                "schedule.poll_interval_secs must be positive".to_string(),
            ));
        }
        if telegram.poll_timeout_secs >= schedule.poll_interval_secs {
            return Err(BouncerError::Config(format!(
                "telegram.poll_timeout_secs ({}) must be shorter than schedule.poll_interval_secs ({})",
                telegram.poll_timeout_secs, schedule.poll_interval_secs
            )));
        }
        if schedule.max_welcome_attempts == 0 {
            return Err(BouncerError::Config(
                "schedule.max_welcome_attempts must be positive".to_string(),
            ));
        }
        if schedule.max_approve_attempts == 0 {
            return Err(BouncerError::Config(
                "schedule.max_approve_attempts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
