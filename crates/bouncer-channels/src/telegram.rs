//! Telegram Bot API channel adapter.
//!
//! Implements [`PlatformClient`] on top of the Bot API:
//! - `getUpdates` long polling restricted to `chat_join_request` updates
//! - `approveChatJoinRequest` for admitting verified requesters
//! - `unbanChatMember` for revocation (removes a member but lets them rejoin)
//! - `sendMessage` with HTML parse mode
//!
//! Every method is a JSON `POST {api_base}/bot{token}/{method}`. The token is
//! part of the URL, so transport errors are stripped of their URL before they
//! are logged or returned.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};

use bouncer_types::config::{TelegramConfig, DEFAULT_API_BASE};
use bouncer_types::errors::BouncerError;
use bouncer_types::traits::PlatformClient;
use bouncer_types::{GroupId, IdentityId, JoinRequest, MessageTarget, UpdateEvent};

/// Extra time granted on top of the long-poll timeout before the HTTP request
/// itself is abandoned.
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Timeout for establishing a connection to the Bot API.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Update kinds requested from `getUpdates`.
const ALLOWED_UPDATES: &[&str] = &["chat_join_request"];

/// Telegram Bot API client.
pub struct TelegramClient {
    /// HTTP client for API requests.
    client: Client,
    /// Bot access token.
    token: String,
    /// Base URL for the API (overridable for testing).
    api_base: String,
    /// Timeout for every call except the long poll.
    request_timeout: Duration,
}

// -- Bot API request/response types --

/// Envelope wrapping every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Serialize)]
struct GetUpdatesParams<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Debug, Serialize)]
struct ChatMemberParams<'a> {
    chat_id: &'a str,
    user_id: i64,
}

#[derive(Debug, Serialize)]
struct UnbanParams<'a> {
    chat_id: &'a str,
    user_id: i64,
    /// `false` so that unbanning a current member removes them.
    only_if_banned: bool,
}

#[derive(Debug, Serialize)]
struct SendMessageParams<'a> {
    chat_id: ChatRef<'a>,
    text: &'a str,
    parse_mode: &'static str,
}

/// `chat_id` may be an integer (users) or a string (groups, `@username`).
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ChatRef<'a> {
    Id(i64),
    Name(&'a str),
}

#[derive(Debug, Deserialize)]
struct RawJoinRequest {
    chat: RawChat,
    from: RawUser,
}

#[derive(Debug, Deserialize)]
struct RawChat {
    id: i64,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: i64,
}

impl TelegramClient {
    /// Create a client for the given token, API base URL and per-call timeout.
    pub fn new(
        token: impl Into<String>,
        api_base: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, BouncerError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| BouncerError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            token: token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    /// Create a client from the `telegram` config section.
    pub fn from_config(config: &TelegramConfig) -> Result<Self, BouncerError> {
        let api_base = if config.api_base.is_empty() {
            DEFAULT_API_BASE
        } else {
            config.api_base.as_str()
        };
        Self::new(
            config.access_token.clone(),
            api_base,
            config.request_timeout(),
        )
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Call a Bot API method and decode its `result`.
    async fn call<P, R>(&self, method: &str, params: &P, timeout: Duration) -> Result<R, BouncerError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.method_url(method))
            .timeout(timeout)
            .json(params)
            .send()
            .await
            .map_err(|e| {
                BouncerError::Transport(format!("{method} request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            BouncerError::Transport(format!(
                "{method} response body unreadable: {}",
                e.without_url()
            ))
        })?;

        let envelope: ApiResponse<R> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) => {
                return Err(BouncerError::Api {
                    method: method.to_string(),
                    code: Some(i64::from(status.as_u16())),
                    description: format!("malformed response (HTTP {status}): {e}"),
                });
            }
        };

        if !envelope.ok || !status.is_success() {
            return Err(BouncerError::Api {
                method: method.to_string(),
                code: envelope.error_code.or(Some(i64::from(status.as_u16()))),
                description: envelope
                    .description
                    .unwrap_or_else(|| format!("HTTP {status}")),
            });
        }

        envelope.result.ok_or_else(|| BouncerError::Api {
            method: method.to_string(),
            code: None,
            description: "response is missing 'result'".to_string(),
        })
    }

    /// Convert raw `getUpdates` entries into update events.
    ///
    /// Entries without an `update_id` are dropped. A join request payload that
    /// does not have the expected shape is logged and the update is kept as a
    /// plain event so the cursor still moves past it.
    fn parse_updates(raw: Vec<serde_json::Value>) -> Vec<UpdateEvent> {
        raw.into_iter()
            .filter_map(|mut value| {
                let Some(update_id) = value.get("update_id").and_then(|v| v.as_i64()) else {
                    tracing::warn!(update = %value, "dropping update without update_id");
                    return None;
                };

                let join_request = value
                    .get_mut("chat_join_request")
                    .map(serde_json::Value::take)
                    .and_then(|payload| {
                        match serde_json::from_value::<RawJoinRequest>(payload) {
                            Ok(raw) => Some(JoinRequest {
                                group_id: GroupId::from(raw.chat.id),
                                group_title: raw
                                    .chat
                                    .title
                                    .unwrap_or_else(|| raw.chat.id.to_string()),
                                identity_id: IdentityId(raw.from.id),
                                source_update_id: update_id,
                            }),
                            Err(e) => {
                                tracing::warn!(
                                    update_id,
                                    error = %e,
                                    "ignoring malformed chat_join_request payload"
                                );
                                None
                            }
                        }
                    });

                Some(UpdateEvent {
                    update_id,
                    join_request,
                })
            })
            .collect()
    }
}

#[async_trait]
impl PlatformClient for TelegramClient {
    async fn fetch_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<UpdateEvent>, BouncerError> {
        let params = GetUpdatesParams {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: ALLOWED_UPDATES,
        };
        let raw: Vec<serde_json::Value> = self
            .call("getUpdates", &params, timeout + POLL_GRACE)
            .await?;

        let updates = Self::parse_updates(raw);
        tracing::debug!(offset, count = updates.len(), "fetched updates");
        Ok(updates)
    }

    async fn approve_join_request(
        &self,
        group: &GroupId,
        identity: IdentityId,
    ) -> Result<(), BouncerError> {
        let params = ChatMemberParams {
            chat_id: group.as_str(),
            user_id: identity.get(),
        };
        let _: IgnoredAny = self
            .call("approveChatJoinRequest", &params, self.request_timeout)
            .await?;
        Ok(())
    }

    async fn remove_member(
        &self,
        group: &GroupId,
        identity: IdentityId,
    ) -> Result<(), BouncerError> {
        // Unbanning a current member kicks them without banning, so they
        // may request to join again right away.
        let params = UnbanParams {
            chat_id: group.as_str(),
            user_id: identity.get(),
            only_if_banned: false,
        };
        let _: IgnoredAny = self
            .call("unbanChatMember", &params, self.request_timeout)
            .await?;
        Ok(())
    }

    async fn send_message(&self, target: &MessageTarget, text: &str) -> Result<(), BouncerError> {
        let chat_id = match target {
            MessageTarget::Group(group) => ChatRef::Name(group.as_str()),
            MessageTarget::Identity(identity) => ChatRef::Id(identity.get()),
        };
        let params = SendMessageParams {
            chat_id,
            text,
            parse_mode: "HTML",
        };
        let _: IgnoredAny = self
            .call("sendMessage", &params, self.request_timeout)
            .await?;
        Ok(())
    }
}
