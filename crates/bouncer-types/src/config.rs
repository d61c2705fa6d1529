//! Configuration types for the bouncer daemon.
//!
//! Parsed from a single YAML file (see `config/bouncer.yaml`). Everything is
//! static per process; there is no hot reload.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::BouncerError;
use crate::models::GroupId;
use crate::template::{MessageTemplate, Placeholder};

/// Default Telegram Bot API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BouncerConfig {
    /// Master switch. When false the daemon exits without polling.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Messaging platform access.
    pub telegram: TelegramConfig,
    /// Outbound message templates and the links they reference.
    pub messages: MessagesConfig,
    /// Identity registry database.
    pub registry: RegistryConfig,
    /// Reconciliation cycle timing.
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Revoke endpoint listener.
    #[serde(default)]
    pub http: HttpConfig,
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot access token. Overridden by `BOUNCER_TELEGRAM_TOKEN` when set.
    #[serde(default)]
    pub access_token: String,
    /// Base URL of the Bot API (overridable for testing).
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Comma-separated ids of the monitored groups.
    pub chat_ids: String,
    /// Long-poll timeout for fetching updates (in seconds).
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    /// Timeout for every non-polling Bot API call (in seconds).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl TelegramConfig {
    /// The monitored groups, parsed from `chat_ids`. Empty segments are ignored.
    pub fn monitored_groups(&self) -> Vec<GroupId> {
        self.chat_ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(GroupId::from)
            .collect()
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Message templates and links.
///
/// `info` may reference `{title}` and `{help}`; `welcome` may reference
/// `{title}` and `{rules}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    /// Sent once to an unverified requester.
    pub info: String,
    /// Sent to a requester after their request has been approved.
    pub welcome: String,
    /// Substituted for `{help}`.
    pub help_url: String,
    /// Substituted for `{rules}`.
    pub rules_url: String,
}

impl MessagesConfig {
    /// Placeholders the informational message may use.
    pub const INFO_PLACEHOLDERS: &'static [Placeholder] = &[Placeholder::Title, Placeholder::Help];
    /// Placeholders the welcome message may use.
    pub const WELCOME_PLACEHOLDERS: &'static [Placeholder] =
        &[Placeholder::Title, Placeholder::Rules];

    /// Parse both templates.
    pub fn compile(&self) -> Result<MessageTemplates, BouncerError> {
        let info = MessageTemplate::parse(&self.info, Self::INFO_PLACEHOLDERS)
            .map_err(|e| in_context("messages.info", e))?;
        let welcome = MessageTemplate::parse(&self.welcome, Self::WELCOME_PLACEHOLDERS)
            .map_err(|e| in_context("messages.welcome", e))?;
        Ok(MessageTemplates {
            info,
            welcome,
            help_url: self.help_url.clone(),
            rules_url: self.rules_url.clone(),
        })
    }
}

fn in_context(context: &str, err: BouncerError) -> BouncerError {
    match err {
        BouncerError::Config(msg) => BouncerError::Config(format!("{context}: {msg}")),
        other => other,
    }
}

/// Parsed message templates together with the links they substitute.
#[derive(Debug, Clone)]
pub struct MessageTemplates {
    pub info: MessageTemplate,
    pub welcome: MessageTemplate,
    pub help_url: String,
    pub rules_url: String,
}

/// Identity registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// PostgreSQL connection URL. Overridden by `BOUNCER_DATABASE_URL` when set.
    #[serde(default)]
    pub database_url: String,
    /// Name of the user custom field holding platform identity ids.
    #[serde(default = "default_field_name")]
    pub field_name: String,
    /// Upper bound for the verified-identity query (in seconds).
    #[serde(default = "default_registry_timeout_secs")]
    pub timeout_secs: u64,
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Reconciliation cycle timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Period between cycle triggers (in seconds).
    pub poll_interval_secs: u64,
    /// Failed welcome deliveries tolerated after an approval before the
    /// request is dropped from the queue.
    pub max_welcome_attempts: u32,
    /// Approvals the platform may reject before the request is dropped from
    /// the queue. Network failures are retried without limit.
    pub max_approve_attempts: u32,
}

impl ScheduleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            max_welcome_attempts: 5,
            max_approve_attempts: 5,
        }
    }
}

/// HTTP listener for the revoke endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Socket address to bind, e.g. `127.0.0.1:8080`.
    pub listen_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_poll_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_field_name() -> String {
    "telegram_ids".to_string()
}

fn default_registry_timeout_secs() -> u64 {
    10
}
