/// Unified error type for the bouncer crates.
///
/// Platform adapters, the identity registry, configuration loading and the
/// reconciliation loop all report failures through this type. Variants map
/// one-to-one onto the propagation policy: transport and API failures are
/// retried next cycle, registry failures fall back to the last snapshot.
#[derive(Debug, thiserror::Error)]
pub enum BouncerError {
    /// The messaging platform could not be reached (network error or timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The messaging platform rejected the call.
    #[error("platform API error in {method} (code {code:?}): {description}")]
    Api {
        /// Bot API method that was called (e.g. `approveChatJoinRequest`).
        method: String,
        /// Error code reported by the platform, or the HTTP status if absent.
        code: Option<i64>,
        /// Human-readable description reported by the platform.
        description: String,
    },

    /// The identity registry query exceeded its time bound.
    #[error("identity registry query timed out after {0}ms")]
    RegistryTimeout(u64),

    /// Any other identity registry failure (connection, query, decoding).
    #[error("identity registry error: {0}")]
    Registry(String),

    /// Error from configuration loading or validation.
    #[error("config error: {0}")]
    Config(String),

    /// An identity identifier could not be parsed.
    #[error("invalid identity id '{0}'")]
    InvalidIdentity(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Generic internal error for unexpected conditions.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for BouncerError {
    fn from(err: serde_json::Error) -> Self {
        BouncerError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for BouncerError {
    fn from(err: serde_yaml::Error) -> Self {
        BouncerError::Serialization(err.to_string())
    }
}
