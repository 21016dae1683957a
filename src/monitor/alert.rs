use crate::platform::{ChatInfo, IncomingEvent};

const ALERT_MARKER: &str = "🔔 Matching message found:";

/// Where an alert points the reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageLink {
    Permalink(String),
    /// Chats without a public handle have no permalink
    Private { chat_id: i64, message_id: i32 },
}

impl std::fmt::Display for MessageLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageLink::Permalink(url) => write!(f, "{}", url),
            MessageLink::Private {
                chat_id,
                message_id,
            } => write!(
                f,
                "(private group, chat_id: {}, message_id: {})",
                chat_id, message_id
            ),
        }
    }
}

pub fn message_link(domain: &str, chat: &ChatInfo, message_id: i32) -> MessageLink {
    match chat.username.as_deref().filter(|u| !u.is_empty()) {
        Some(handle) => {
            MessageLink::Permalink(format!("https://{}/{}/{}", domain, handle, message_id))
        }
        None => MessageLink::Private {
            chat_id: chat.id,
            message_id,
        },
    }
}

/// Render the alert sent to admins: marker, text, then the link line.
pub fn format_alert(domain: &str, event: &IncomingEvent, chat: &ChatInfo) -> String {
    let link = message_link(domain, chat, event.message_id);
    format!(
        "{}\n\n{}\n\n🔗 Link: {}",
        ALERT_MARKER,
        event.text.trim(),
        link
    )
}
