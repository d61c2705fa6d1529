/// Messaging platform adapters for bouncer.
///
/// Each adapter implements the `PlatformClient` trait for a specific platform:
/// - **Telegram**: Telegram Bot API adapter (long polling, join request approval,
///   member removal, HTML messages)
pub mod telegram;

pub use telegram::TelegramClient;
