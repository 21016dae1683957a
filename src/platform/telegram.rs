use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, LinkPreviewOptions, MessageKind, Recipient, UpdateKind};
use teloxide::{ApiError, RequestError};
use tokio::sync::{mpsc, OnceCell};
use tracing::{debug, info, warn};

use super::{
    ChatHandle, ChatInfo, Entity, Identity, IncomingEvent, Notifier, PlatformClient,
    PlatformError,
};

/// Long-poll timeout for getUpdates
const POLL_TIMEOUT_SECS: u32 = 30;

/// HTTP timeout for the watcher. A long poll must finish before the request
/// times out, otherwise every idle window looks like a network failure.
const HTTP_TIMEOUT: Duration = Duration::from_secs(POLL_TIMEOUT_SECS as u64 + 10);

/// How a configured group identifier addresses a chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatAddress {
    Username(String),
    Id(i64),
    /// Private invite link. The Bot API has no way to resolve these.
    Invite,
}

/// Parse `https://t.me/name`, `t.me/name`, `@name`, `name` or a numeric chat id.
pub fn parse_identifier(identifier: &str) -> Option<ChatAddress> {
    let trimmed = identifier.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(id) = trimmed.parse::<i64>() {
        return Some(ChatAddress::Id(id));
    }

    let path = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let path = path.strip_prefix("www.").unwrap_or(path);
    let path = ["t.me/", "telegram.me/", "telegram.dog/"]
        .iter()
        .find_map(|host| path.strip_prefix(host))
        .unwrap_or(path);

    if path.starts_with('+') || path.starts_with("joinchat/") {
        return Some(ChatAddress::Invite);
    }

    let name = path.strip_prefix('@').unwrap_or(path);
    // Message permalinks (t.me/name/42) still address the chat
    let name = name.split('/').next().unwrap_or(name);
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some(ChatAddress::Username(name.to_string()))
}

fn recipient_for(identifier: &str) -> Result<Recipient, PlatformError> {
    match parse_identifier(identifier) {
        Some(ChatAddress::Username(name)) => Ok(Recipient::ChannelUsername(format!("@{}", name))),
        Some(ChatAddress::Id(id)) => Ok(Recipient::Id(ChatId(id))),
        Some(ChatAddress::Invite) => Err(PlatformError::NotFound(format!(
            "{} (invite links cannot be resolved by a bot)",
            identifier
        ))),
        None => Err(PlatformError::NotFound(format!(
            "{} (not a valid chat identifier)",
            identifier
        ))),
    }
}

/// Map a Bot API failure onto the platform error kinds the monitor reacts to
fn classify(err: RequestError, what: &str) -> PlatformError {
    match err {
        RequestError::RetryAfter(wait) => PlatformError::RateLimited(wait.duration()),
        RequestError::Api(ApiError::ChatNotFound) => PlatformError::NotFound(what.to_string()),
        RequestError::Api(api) => PlatformError::Protocol(format!("{}: {}", what, api)),
        RequestError::MigrateToChatId(id) => {
            PlatformError::Protocol(format!("{}: chat migrated to {:?}", what, id))
        }
        other => PlatformError::Other(anyhow::Error::new(other).context(what.to_string())),
    }
}

/// Warning for a watcher that cannot see ordinary group posts
fn privacy_warning(can_read_all_group_messages: bool) -> Option<&'static str> {
    (!can_read_all_group_messages).then_some(
        "Watcher bot has privacy mode enabled and only sees commands and replies in groups; \
         disable it with /setprivacy in @BotFather or make the bot a group admin",
    )
}

pub fn disabled_link_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

fn event_from_message(msg: &Message) -> IncomingEvent {
    let text = msg.text().or_else(|| msg.caption()).unwrap_or_default();
    IncomingEvent {
        chat: ChatInfo {
            id: msg.chat.id.0,
            username: msg.chat.username().map(str::to_string),
        },
        message_id: msg.id.0,
        text: text.to_string(),
        is_action: !matches!(msg.kind, MessageKind::Common(_)),
    }
}

/// Monitoring client backed by a Bot API token.
///
/// The watcher bot must already be a member of every monitored group: bots
/// cannot join chats on their own, so `join_channel` always reports a protocol
/// error and the membership pass logs it per group.
///
/// With privacy mode on (the BotFather default) a bot in a group only sees
/// commands, replies and service messages. Disable it with `/setprivacy`, or
/// make the watcher a group admin, or most posts will never be matched.
pub struct TelegramClient {
    bot: Bot,
    me: OnceCell<UserId>,
    /// Next getUpdates offset, kept across reconnects so nothing is re-read.
    offset: AtomicI32,
}

impl TelegramClient {
    pub fn new(token: &str) -> anyhow::Result<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to build the watcher HTTP client")?;
        Ok(Self {
            bot: Bot::with_client(token, client),
            me: OnceCell::new(),
            offset: AtomicI32::new(0),
        })
    }

    async fn my_id(&self) -> Result<UserId, PlatformError> {
        self.me
            .get_or_try_init(|| async {
                self.bot
                    .get_me()
                    .await
                    .map(|me| me.user.id)
                    .map_err(|e| classify(e, "getMe"))
            })
            .await
            .copied()
    }
}

#[async_trait]
impl PlatformClient for TelegramClient {
    async fn connect(&self) -> Result<(), PlatformError> {
        let me = self.bot.get_me().await.map_err(|e| classify(e, "getMe"))?;
        debug!("Watcher connected as {}", me.user.id.0);
        if let Some(warning) = privacy_warning(me.can_read_all_group_messages) {
            warn!("{}", warning);
        }
        Ok(())
    }

    async fn get_me(&self) -> Result<Identity, PlatformError> {
        let me = self.bot.get_me().await.map_err(|e| classify(e, "getMe"))?;
        Ok(Identity {
            id: me.user.id.0,
            username: me.user.username.clone(),
        })
    }

    async fn get_entity(&self, identifier: &str) -> Result<Entity, PlatformError> {
        let recipient = recipient_for(identifier)?;
        let chat = self
            .bot
            .get_chat(recipient)
            .await
            .map_err(|e| classify(e, identifier))?;

        let broadcast = chat.is_channel();
        let joined = if broadcast {
            false
        } else {
            let me = self.my_id().await?;
            match self.bot.get_chat_member(chat.id, me).await {
                Ok(member) => member.kind.is_present(),
                // Non-members are refused access to the member list
                Err(RequestError::Api(_)) => false,
                Err(e) => return Err(classify(e, identifier)),
            }
        };

        Ok(Entity {
            handle: ChatHandle(chat.id.0),
            broadcast,
            joined,
        })
    }

    async fn get_input_entity(&self, identifier: &str) -> Result<ChatHandle, PlatformError> {
        match recipient_for(identifier)? {
            Recipient::Id(id) => Ok(ChatHandle(id.0)),
            recipient => {
                let chat = self
                    .bot
                    .get_chat(recipient)
                    .await
                    .map_err(|e| classify(e, identifier))?;
                Ok(ChatHandle(chat.id.0))
            }
        }
    }

    async fn join_channel(&self, identifier: &str) -> Result<(), PlatformError> {
        Err(PlatformError::Protocol(format!(
            "bots cannot join {} on their own; add the watcher bot to the chat",
            identifier
        )))
    }

    async fn run_until_disconnected(
        &self,
        chats: &[ChatHandle],
        events: mpsc::Sender<IncomingEvent>,
    ) -> Result<(), PlatformError> {
        let watched: HashSet<i64> = chats.iter().map(|c| c.0).collect();
        info!("Polling updates for {} chat(s)", watched.len());

        loop {
            let updates = self
                .bot
                .get_updates()
                .offset(self.offset.load(Ordering::Relaxed))
                .timeout(POLL_TIMEOUT_SECS)
                .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::ChannelPost])
                .await
                .map_err(|e| classify(e, "getUpdates"))?;

            for update in updates {
                self.offset.store(update.id.as_offset(), Ordering::Relaxed);

                let msg = match update.kind {
                    UpdateKind::Message(msg) | UpdateKind::ChannelPost(msg) => msg,
                    _ => continue,
                };
                if !watched.contains(&msg.chat.id.0) {
                    continue;
                }
                if events.send(event_from_message(&msg)).await.is_err() {
                    debug!("Event receiver closed, stopping update polling");
                    return Ok(());
                }
            }
        }
    }
}

/// Delivers alerts through the admin bot
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_message(
        &self,
        recipient: i64,
        text: &str,
        disable_link_preview: bool,
    ) -> anyhow::Result<()> {
        let mut request = self.bot.send_message(ChatId(recipient), text);
        if disable_link_preview {
            request = request.link_preview_options(disabled_link_preview());
        }
        request
            .await
            .with_context(|| format!("Failed to send message to {}", recipient))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::Seconds;

    #[test]
    fn test_parse_public_links() {
        let expected = Some(ChatAddress::Username("rust_jobs".to_string()));
        assert_eq!(parse_identifier("https://t.me/rust_jobs"), expected);
        assert_eq!(parse_identifier("t.me/rust_jobs/"), expected);
        assert_eq!(parse_identifier("@rust_jobs"), expected);
        assert_eq!(parse_identifier("  rust_jobs "), expected);
        assert_eq!(parse_identifier("https://telegram.me/rust_jobs/1234"), expected);
    }

    #[test]
    fn test_parse_numeric_id() {
        assert_eq!(
            parse_identifier("-1001234567890"),
            Some(ChatAddress::Id(-1001234567890))
        );
    }

    #[test]
    fn test_parse_invite_links() {
        assert_eq!(
            parse_identifier("https://t.me/+AbCdEf123"),
            Some(ChatAddress::Invite)
        );
        assert_eq!(
            parse_identifier("https://t.me/joinchat/XyZ"),
            Some(ChatAddress::Invite)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_identifier(""), None);
        assert_eq!(parse_identifier("   "), None);
        assert_eq!(parse_identifier("not a link!"), None);
    }

    #[test]
    fn test_long_poll_fits_in_http_timeout() {
        assert!(Duration::from_secs(POLL_TIMEOUT_SECS as u64) < HTTP_TIMEOUT);
    }

    #[test]
    fn test_classify_rate_limit() {
        let err = classify(
            RequestError::RetryAfter(Seconds::from_seconds(30)),
            "getUpdates",
        );
        assert!(matches!(err, PlatformError::RateLimited(d) if d == Duration::from_secs(30)));
    }

    #[test]
    fn test_classify_missing_chat() {
        let err = classify(RequestError::Api(ApiError::ChatNotFound), "@gone");
        assert!(matches!(err, PlatformError::NotFound(ref what) if what == "@gone"));
    }

    #[test]
    fn test_classify_other_api_errors_as_protocol() {
        let err = classify(RequestError::Api(ApiError::BotKicked), "@jobs");
        assert!(matches!(err, PlatformError::Protocol(_)));

        let err = classify(RequestError::MigrateToChatId(ChatId(-100123)), "@jobs");
        assert!(matches!(err, PlatformError::Protocol(ref reason) if reason.contains("migrated")));
    }

    #[test]
    fn test_privacy_mode_warning() {
        assert!(privacy_warning(false).is_some());
        assert!(privacy_warning(true).is_none());
    }

    #[test]
    fn test_invite_link_is_unresolvable() {
        let err = recipient_for("https://t.me/+secret").unwrap_err();
        assert!(matches!(err, PlatformError::NotFound(_)));
    }
}
