use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use tracing::{error, info, warn};

use crate::platform::telegram::{disabled_link_preview, parse_identifier, ChatAddress};
use crate::storage::Store;

const HELP_TEXT: &str = "Commands:\n\
    /myid - Show your Telegram ID\n\
    /add_admin <id> - Add an admin\n\
    /add_word <phrase> - Add a keyword phrase\n\
    /del_word <phrase> - Remove a keyword phrase\n\
    /add_group <link> - Monitor a group or channel\n\
    /del_group <link> - Stop monitoring a group\n\
    /admins - List admins\n\
    /words - List keyword phrases\n\
    /groups - List monitored groups\n\n\
    Changes to groups and keywords apply when the monitor restarts.";

/// Shared state for the admin command handlers
pub struct AppState {
    pub store: Store,
    /// Admins from configuration; always allowed, never stored
    pub static_admins: Vec<i64>,
}

impl AppState {
    pub fn new(store: Store, static_admins: Vec<i64>) -> Self {
        Self {
            store,
            static_admins,
        }
    }

    async fn is_admin(&self, user_id: i64) -> bool {
        if self.static_admins.contains(&user_id) {
            return true;
        }
        match self.store.is_admin(user_id).await {
            Ok(found) => found,
            Err(e) => {
                error!("Failed to check admin status for {}: {:#}", user_id, e);
                false
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    MyId,
    AddAdmin(Option<String>),
    AddWord(Option<String>),
    DelWord(Option<String>),
    AddGroup(Option<String>),
    DelGroup(Option<String>),
    Admins,
    Words,
    Groups,
    Unknown(String),
}

/// Parse `/command[@bot] [argument]`. Returns None for plain text.
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    let body = text.strip_prefix('/')?;
    let (head, rest) = match body.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (body, ""),
    };
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    let arg = (!rest.is_empty()).then(|| rest.to_string());

    let command = match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "myid" => Command::MyId,
        "add_admin" => Command::AddAdmin(arg),
        "add_word" => Command::AddWord(arg),
        "del_word" => Command::DelWord(arg),
        "add_group" => Command::AddGroup(arg),
        "del_group" => Command::DelGroup(arg),
        "admins" => Command::Admins,
        "words" => Command::Words,
        "groups" => Command::Groups,
        _ => Command::Unknown(name),
    };
    Some(command)
}

fn bullet_list(title: &str, items: &[String], empty: &str) -> String {
    if items.is_empty() {
        return empty.to_string();
    }
    let mut text = format!("{}\n\n", title);
    for item in items {
        text.push_str(item);
        text.push('\n');
    }
    text
}

/// Execute a command for an admin and build the reply text
pub async fn execute_command(
    state: &AppState,
    user_id: i64,
    username: Option<&str>,
    command: Command,
) -> Result<String> {
    let store = &state.store;
    let reply = match command {
        Command::Start => {
            let greeting = match store.get_user(user_id).await? {
                Some(user) => format!(
                    "Welcome back, {}! The bot is running.",
                    user.username.unwrap_or_else(|| user.tg_id.to_string())
                ),
                None => "Hello! The bot is running.".to_string(),
            };
            store.add_user(user_id, username).await?;
            format!("{}\n\n{}", greeting, HELP_TEXT)
        }
        Command::Help => HELP_TEXT.to_string(),
        Command::MyId => format!("Your Telegram ID: {}", user_id),
        Command::AddAdmin(None) => "No user ID given".to_string(),
        Command::AddAdmin(Some(raw)) => match raw.parse::<i64>() {
            Ok(id) => {
                if store.add_admin(id).await? {
                    "✅ Admin added".to_string()
                } else {
                    "Already an admin".to_string()
                }
            }
            Err(_) => format!("Not a valid user ID: {}", raw),
        },
        Command::AddWord(None) | Command::DelWord(None) => "No keyword given".to_string(),
        Command::AddWord(Some(word)) => {
            if store.add_keyword(&word).await? {
                "✅ Keyword added".to_string()
            } else {
                "Keyword already exists".to_string()
            }
        }
        Command::DelWord(Some(word)) => {
            if store.delete_keyword(&word).await? {
                "✅ Keyword removed".to_string()
            } else {
                "No such keyword".to_string()
            }
        }
        Command::AddGroup(None) | Command::DelGroup(None) => "No group link given".to_string(),
        Command::AddGroup(Some(link)) => match parse_identifier(&link) {
            None => format!("Not a valid group link: {}", link),
            Some(address) => {
                if !store.add_group(&link).await? {
                    "Group already monitored".to_string()
                } else if address == ChatAddress::Invite {
                    "✅ Group added, but invite links cannot be resolved; \
                     prefer a public link or the numeric chat ID"
                        .to_string()
                } else {
                    "✅ Group added".to_string()
                }
            }
        },
        Command::DelGroup(Some(link)) => {
            if store.delete_group(&link).await? {
                "✅ Group removed".to_string()
            } else {
                "No such group".to_string()
            }
        }
        Command::Admins => {
            let mut admins = state.static_admins.clone();
            for id in store.get_all_admins().await? {
                if !admins.contains(&id) {
                    admins.push(id);
                }
            }
            let admins: Vec<String> = admins.iter().map(|id| id.to_string()).collect();
            bullet_list("Admins:", &admins, "No admins yet")
        }
        Command::Words => bullet_list(
            "Keyword phrases:",
            &store.get_all_keywords().await?,
            "No keywords yet",
        ),
        Command::Groups => bullet_list(
            "Monitored groups:",
            &store.get_all_groups().await?,
            "No groups yet",
        ),
        Command::Unknown(name) => format!("Unknown command /{}. Send /help for the list.", name),
    };
    Ok(reply)
}

/// Split long messages for Telegram's 4096 char limit
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// Run the admin command bot
pub async fn run(bot: Bot, state: Arc<AppState>) -> Result<()> {
    info!("Starting admin bot...");

    let handler = Update::filter_message()
        .filter_async(|msg: Message, state: Arc<AppState>| async move {
            match msg.from.as_ref().and_then(|u| i64::try_from(u.id.0).ok()) {
                Some(user_id) => state.is_admin(user_id).await,
                None => false,
            }
        })
        .endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("admin bot"))
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let user = match msg.from.as_ref() {
        Some(user) => user,
        None => return Ok(()),
    };
    let Ok(user_id) = i64::try_from(user.id.0) else {
        return Ok(());
    };
    let command = match msg.text().and_then(parse_command) {
        Some(command) => command,
        None => return Ok(()),
    };

    info!("Command from admin {}: {:?}", user_id, command);

    let reply = match execute_command(&state, user_id, user.username.as_deref(), command).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("Error handling command: {:#}", e);
            format!("Error: {}", e)
        }
    };

    for chunk in split_message(&reply, 4000) {
        bot.send_message(msg.chat.id, chunk)
            .link_preview_options(disabled_link_preview())
            .await?;
    }
    Ok(())
}
