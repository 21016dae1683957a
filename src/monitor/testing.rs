//! In-memory platform and notifier doubles for monitor tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::platform::{
    ChatHandle, ChatInfo, Entity, Identity, IncomingEvent, Notifier, PlatformClient,
    PlatformError,
};

/// One `run_until_disconnected` call: events to emit, then how it ends.
pub struct RunStep {
    pub events: Vec<IncomingEvent>,
    pub result: Result<(), PlatformError>,
}

#[derive(Default)]
pub struct FakeClient {
    entities: HashMap<String, Entity>,
    /// Errors returned by get_entity before it succeeds, per identifier
    entity_failures: Mutex<HashMap<String, VecDeque<PlatformError>>>,
    /// Errors returned by join_channel before it succeeds, per identifier
    join_failures: Mutex<HashMap<String, VecDeque<PlatformError>>>,
    /// Identifiers get_input_entity refuses
    input_failures: HashSet<String>,
    runs: Mutex<VecDeque<RunStep>>,
    pub joins: Mutex<Vec<(String, Instant)>>,
    pub entity_lookups: Mutex<Vec<String>>,
    pub subscriptions: Mutex<Vec<(Instant, Vec<ChatHandle>)>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, identifier: &str, id: i64, joined: bool) -> Self {
        self.entities.insert(
            identifier.to_string(),
            Entity {
                handle: ChatHandle(id),
                broadcast: false,
                joined,
            },
        );
        self
    }

    pub fn with_channel(mut self, identifier: &str, id: i64) -> Self {
        self.entities.insert(
            identifier.to_string(),
            Entity {
                handle: ChatHandle(id),
                broadcast: true,
                joined: false,
            },
        );
        self
    }

    pub fn failing_entity(self, identifier: &str, err: PlatformError) -> Self {
        self.entity_failures
            .lock()
            .unwrap()
            .entry(identifier.to_string())
            .or_default()
            .push_back(err);
        self
    }

    pub fn failing_join(self, identifier: &str, err: PlatformError) -> Self {
        self.join_failures
            .lock()
            .unwrap()
            .entry(identifier.to_string())
            .or_default()
            .push_back(err);
        self
    }

    pub fn failing_input(mut self, identifier: &str) -> Self {
        self.input_failures.insert(identifier.to_string());
        self
    }

    pub fn with_run(self, events: Vec<IncomingEvent>, result: Result<(), PlatformError>) -> Self {
        self.runs.lock().unwrap().push_back(RunStep { events, result });
        self
    }

    pub fn joined(&self) -> Vec<String> {
        self.joins
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[async_trait]
impl PlatformClient for FakeClient {
    async fn connect(&self) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn get_me(&self) -> Result<Identity, PlatformError> {
        Ok(Identity {
            id: 1,
            username: Some("watcher".to_string()),
        })
    }

    async fn get_entity(&self, identifier: &str) -> Result<Entity, PlatformError> {
        self.entity_lookups
            .lock()
            .unwrap()
            .push(identifier.to_string());
        let queued = self
            .entity_failures
            .lock()
            .unwrap()
            .get_mut(identifier)
            .and_then(VecDeque::pop_front);
        if let Some(err) = queued {
            return Err(err);
        }
        self.entities
            .get(identifier)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(identifier.to_string()))
    }

    async fn get_input_entity(&self, identifier: &str) -> Result<ChatHandle, PlatformError> {
        if self.input_failures.contains(identifier) {
            return Err(PlatformError::Protocol("CHANNEL_PRIVATE".to_string()));
        }
        self.entities
            .get(identifier)
            .map(|e| e.handle)
            .ok_or_else(|| PlatformError::NotFound(identifier.to_string()))
    }

    async fn join_channel(&self, identifier: &str) -> Result<(), PlatformError> {
        let queued = self
            .join_failures
            .lock()
            .unwrap()
            .get_mut(identifier)
            .and_then(VecDeque::pop_front);
        if let Some(err) = queued {
            return Err(err);
        }
        self.joins
            .lock()
            .unwrap()
            .push((identifier.to_string(), Instant::now()));
        Ok(())
    }

    async fn run_until_disconnected(
        &self,
        chats: &[ChatHandle],
        events: mpsc::Sender<IncomingEvent>,
    ) -> Result<(), PlatformError> {
        self.subscriptions
            .lock()
            .unwrap()
            .push((Instant::now(), chats.to_vec()));
        let step = self.runs.lock().unwrap().pop_front();
        match step {
            Some(step) => {
                for event in step.events {
                    if events.send(event).await.is_err() {
                        return Ok(());
                    }
                }
                step.result
            }
            // Script exhausted: stay connected forever
            None => std::future::pending().await,
        }
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    failing: HashSet<i64>,
    pub sent: Mutex<Vec<(i64, String, bool)>>,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, recipient: i64) -> Self {
        self.failing.insert(recipient);
        self
    }

    pub fn recipients(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.sent.lock().unwrap().iter().map(|s| s.0).collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send_message(
        &self,
        recipient: i64,
        text: &str,
        disable_link_preview: bool,
    ) -> anyhow::Result<()> {
        if self.failing.contains(&recipient) {
            anyhow::bail!("Forbidden: bot was blocked by the user");
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient, text.to_string(), disable_link_preview));
        Ok(())
    }
}

pub fn event(chat_id: i64, username: Option<&str>, message_id: i32, text: &str) -> IncomingEvent {
    IncomingEvent {
        chat: ChatInfo {
            id: chat_id,
            username: username.map(str::to_string),
        },
        message_id,
        text: text.to_string(),
        is_action: false,
    }
}
