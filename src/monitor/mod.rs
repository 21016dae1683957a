//! Group monitoring pipeline.
//!
//! A cycle loads the [`Session`], resolves and joins the configured groups,
//! subscribes to the ones that resolved, and routes every incoming message
//! through the keyword matcher, the alert formatter and the dispatcher. The
//! [`Monitor`] restarts the cycle on recoverable errors and halts only when
//! no group could be resolved.

pub mod alert;
pub mod dispatcher;
pub mod matcher;
pub mod membership;
pub mod registry;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::platform::{ChatHandle, IncomingEvent, Notifier, PlatformClient, PlatformError};
use crate::storage::Store;
use alert::format_alert;
use dispatcher::AlertDispatcher;
use matcher::is_relevant;
use membership::MembershipManager;
use registry::{Group, GroupRegistry};
use session::Session;

/// Buffered events between the platform client and the handler
const EVENT_BUFFER: usize = 256;

/// Characters of message text shown in debug logs
const LOG_PREVIEW_CHARS: usize = 80;

fn preview(text: &str) -> String {
    match text.char_indices().nth(LOG_PREVIEW_CHARS) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("could not resolve {identifier}: {reason}")]
    Resolution { identifier: String, reason: String },

    #[error("rate limited for {}s", .0.as_secs())]
    RateLimit(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unexpected error: {0:#}")]
    Unexpected(anyhow::Error),

    #[error("no resolvable groups to monitor")]
    FatalConfiguration,
}

impl From<PlatformError> for MonitorError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::NotFound(identifier) => MonitorError::Resolution {
                identifier,
                reason: "not found".to_string(),
            },
            PlatformError::RateLimited(wait) => MonitorError::RateLimit(wait),
            PlatformError::Protocol(reason) => MonitorError::Protocol(reason),
            PlatformError::Other(e) => MonitorError::Unexpected(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Disconnected,
    Joining,
    Resolving,
    Subscribed,
    Running,
    Backoff(Duration),
    /// Stopped for good; needs an operator to add groups and restart
    Halted,
}

pub struct Monitor {
    client: Arc<dyn PlatformClient>,
    dispatcher: AlertDispatcher,
    store: Store,
    static_admins: Vec<i64>,
    config: MonitorConfig,
    state: MonitorState,
}

impl Monitor {
    pub fn new(
        client: Arc<dyn PlatformClient>,
        notifier: Arc<dyn Notifier>,
        store: Store,
        static_admins: Vec<i64>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            client,
            dispatcher: AlertDispatcher::new(notifier),
            store,
            static_admins,
            config,
            state: MonitorState::Disconnected,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    fn transition(&mut self, next: MonitorState) {
        debug!("Monitor state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// How long to wait before restarting after a cycle ended with `outcome`.
    /// `None` means the loop must stop.
    pub fn backoff_for(&self, outcome: &Result<(), MonitorError>) -> Option<Duration> {
        match outcome {
            // Clean disconnect
            Ok(()) => Some(self.config.protocol_backoff()),
            Err(MonitorError::RateLimit(wait)) => Some(*wait),
            Err(MonitorError::Protocol(_)) | Err(MonitorError::Resolution { .. }) => {
                Some(self.config.protocol_backoff())
            }
            Err(MonitorError::Unexpected(_)) => Some(self.config.unexpected_backoff()),
            Err(MonitorError::FatalConfiguration) => None,
        }
    }

    /// Run cycles forever. Returns only when no group can be monitored.
    pub async fn run(&mut self) -> Result<(), MonitorError> {
        loop {
            info!("Starting monitor cycle...");
            let outcome = self.run_cycle().await;

            let Some(wait) = self.backoff_for(&outcome) else {
                error!("No groups available for monitoring! Check the group list and access rights.");
                self.transition(MonitorState::Halted);
                return Err(MonitorError::FatalConfiguration);
            };

            match &outcome {
                Ok(()) => info!("Client disconnected, reconnecting in {}s", wait.as_secs()),
                Err(MonitorError::RateLimit(_)) => {
                    warn!("Rate limited: waiting {}s before restarting", wait.as_secs())
                }
                Err(e @ (MonitorError::Protocol(_) | MonitorError::Resolution { .. })) => {
                    warn!("{}. Reconnecting in {}s", e, wait.as_secs())
                }
                Err(e) => error!("Monitor failed: {}. Restarting in {}s", e, wait.as_secs()),
            }

            self.transition(MonitorState::Backoff(wait));
            sleep(wait).await;
            self.transition(MonitorState::Disconnected);
        }
    }

    /// One full pass: join, resolve, subscribe, run until disconnected.
    pub async fn run_cycle(&mut self) -> Result<(), MonitorError> {
        self.transition(MonitorState::Joining);
        let session = Session::load(&self.store, &self.static_admins)
            .await
            .map_err(MonitorError::Unexpected)?;

        let me = self.client.get_me().await?;
        info!(
            "Joining groups before monitoring as {} ({})",
            me.username.as_deref().unwrap_or("<no username>"),
            me.id
        );
        let mut groups = GroupRegistry::new(self.client.as_ref())
            .resolve(&session.groups)
            .await;
        MembershipManager::new(self.client.as_ref(), self.config.join_delay())
            .ensure_all(&mut groups)
            .await;

        self.transition(MonitorState::Resolving);
        let chats = self.resolve_handles(&groups).await;
        if chats.is_empty() {
            return Err(MonitorError::FatalConfiguration);
        }

        self.transition(MonitorState::Subscribed);
        self.client.connect().await?;

        self.transition(MonitorState::Running);
        info!("Monitoring {} chat(s)", chats.len());
        self.receive_until_disconnected(&session, &chats).await
    }

    /// Look up a subscribable handle for every group that resolved earlier.
    /// Membership changes can make a group inaccessible, so this is redone
    /// after the join pass.
    async fn resolve_handles(&self, groups: &[Group]) -> Vec<ChatHandle> {
        let mut chats: Vec<ChatHandle> = Vec::new();
        for group in groups.iter().filter(|g| g.is_resolved()) {
            loop {
                match self.client.get_input_entity(&group.identifier).await {
                    Ok(handle) => {
                        if group.handle != Some(handle) {
                            debug!("{} now resolves to chat {}", group.identifier, handle.0);
                        }
                        info!("Will monitor: {}", group.identifier);
                        if !chats.contains(&handle) {
                            chats.push(handle);
                        }
                        break;
                    }
                    Err(PlatformError::RateLimited(wait)) => {
                        warn!(
                            "Rate limited while resolving {}, waiting {}s",
                            group.identifier,
                            wait.as_secs()
                        );
                        sleep(wait).await;
                    }
                    Err(e) => {
                        warn!("Could not get a handle for {}: {}", group.identifier, e);
                        break;
                    }
                }
            }
        }
        chats
    }

    async fn receive_until_disconnected(
        &self,
        session: &Session,
        chats: &[ChatHandle],
    ) -> Result<(), MonitorError> {
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        let client = Arc::clone(&self.client);
        let run = client.run_until_disconnected(chats, tx);
        tokio::pin!(run);

        let result = loop {
            tokio::select! {
                result = &mut run => break result,
                Some(event) = rx.recv() => self.handle_event(session, event).await,
            }
        };

        // Events already delivered before the disconnect are still handled
        while let Ok(event) = rx.try_recv() {
            self.handle_event(session, event).await;
        }

        result.map_err(MonitorError::from)
    }

    pub async fn handle_event(&self, session: &Session, event: IncomingEvent) {
        if event.is_action {
            info!(
                "Ignoring service message {} in chat {}",
                event.message_id, event.chat.id
            );
            return;
        }

        let text = event.text.trim();
        if text.is_empty() {
            debug!("Skipping message {} without text", event.message_id);
            return;
        }

        if !is_relevant(text, &session.keywords) {
            debug!("Message does not match: {}", preview(text));
            return;
        }

        let alert = format_alert(&self.config.link_domain, &event, &event.chat);
        info!("Match found: {}", alert);

        if session.admins.is_empty() {
            warn!("Match in chat {} but no admins to notify", event.chat.id);
            return;
        }
        let report = self.dispatcher.dispatch(&alert, &session.admins).await;
        debug!(
            "Alert for message {} delivered to {}/{} admin(s)",
            event.message_id,
            report.delivered.len(),
            session.admins.len()
        );
    }
}
