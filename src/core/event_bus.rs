//! Publish/subscribe messaging between agents.
//!
//! The bus rides on the state store's channel primitive. Delivery is
//! fire-and-forget: a subscriber that is not registered when an event is
//! published never sees it, and nothing is replayed.
//!
//! One listen loop per bus drains the inbox and runs the handlers for the
//! message's channel one after another, in registration order. A slow
//! handler delays everything behind it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::Event;

use super::state_store::{MessageSink, RawMessage, StateStore, StoreError};

/// Default bounded wait per poll of the inbox
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Errors raised by the bus
#[derive(Debug, Error)]
pub enum BusError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Listen loop is already running for this bus")]
    AlreadyListening,
}

/// Channel names the bus routes categories to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMap {
    pub tasks: String,
    pub files: String,
    pub system: String,
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self {
            tasks: "skyras:tasks".to_string(),
            files: "skyras:files".to_string(),
            system: "skyras:system".to_string(),
        }
    }
}

impl ChannelMap {
    /// Resolve the channel for an event category by prefix
    pub fn for_category(&self, category: &str) -> &str {
        if category.starts_with("task.") {
            &self.tasks
        } else if category.starts_with("file.") {
            &self.files
        } else {
            &self.system
        }
    }
}

/// Something that reacts to events on a channel
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        (self)(event.clone()).await
    }
}

/// Event bus bound to one state store
pub struct EventBus {
    store: StateStore,
    channels: ChannelMap,
    poll_interval: Duration,
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
    inbox_tx: MessageSink,
    inbox_rx: Mutex<Option<mpsc::UnboundedReceiver<RawMessage>>>,
    shutdown: watch::Sender<bool>,
}

impl EventBus {
    /// Create a bus with the default channel names and poll interval
    pub fn new(store: StateStore) -> Self {
        Self::with_channels(store, ChannelMap::default())
    }

    pub fn with_channels(store: StateStore, channels: ChannelMap) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            channels,
            poll_interval: DEFAULT_POLL_INTERVAL,
            handlers: RwLock::new(HashMap::new()),
            inbox_tx,
            inbox_rx: Mutex::new(Some(inbox_rx)),
            shutdown,
        }
    }

    /// Override the bounded wait per poll
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn channels(&self) -> &ChannelMap {
        &self.channels
    }

    /// Build an event stamped with the current time (no I/O)
    pub fn create_event(
        &self,
        category: &str,
        source_agent: &str,
        payload: Map<String, Value>,
    ) -> Event {
        Event::new(category, source_agent, payload)
    }

    /// Publish on the channel derived from the event category
    pub async fn publish(&self, event: &Event) -> Result<usize, BusError> {
        let channel = self.channels.for_category(&event.category).to_string();
        self.publish_to(event, &channel).await
    }

    /// Publish on an explicit channel. Returns how many subscribers were
    /// listening; zero is not an error.
    #[instrument(skip(self, event), fields(category = %event.category))]
    pub async fn publish_to(&self, event: &Event, channel: &str) -> Result<usize, BusError> {
        let payload = serde_json::to_string(event)?;
        let receivers = self.store.publish(channel, &payload).await?;
        debug!(receivers, agent = %event.source_agent, "Published event");
        Ok(receivers)
    }

    /// Register a handler for a channel
    pub async fn subscribe<H>(&self, channel: &str, handler: H) -> Result<(), BusError>
    where
        H: EventHandler + 'static,
    {
        self.subscribe_shared(channel, Arc::new(handler)).await
    }

    /// Register an already shared handler for a channel.
    ///
    /// The first handler on a channel issues the underlying subscribe; if that
    /// fails nothing is registered.
    pub async fn subscribe_shared(
        &self,
        channel: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), BusError> {
        let mut handlers = self.handlers.write().await;
        if !handlers.contains_key(channel) {
            self.store.subscribe(channel, self.inbox_tx.clone()).await?;
            info!(channel, "Subscribed to channel");
        }
        handlers.entry(channel.to_string()).or_default().push(handler);
        Ok(())
    }

    /// Number of handlers registered for a channel
    pub async fn handler_count(&self, channel: &str) -> usize {
        self.handlers
            .read()
            .await
            .get(channel)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Ask the listen loop to stop after its current dispatch
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Run the consumer loop until `shutdown` is called.
    ///
    /// Meant to be spawned as a long-lived background task. Each poll waits at
    /// most `poll_interval` for a message before yielding and polling again.
    pub async fn listen(&self) -> Result<(), BusError> {
        let mut inbox = self
            .inbox_rx
            .lock()
            .await
            .take()
            .ok_or(BusError::AlreadyListening)?;
        let mut stop = self.shutdown.subscribe();

        info!(poll_ms = self.poll_interval.as_millis() as u64, "Event listener started");

        loop {
            if *stop.borrow() {
                break;
            }

            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                polled = tokio::time::timeout(self.poll_interval, inbox.recv()) => {
                    match polled {
                        Ok(Some(message)) => self.dispatch(message).await,
                        Ok(None) => break,
                        Err(_) => {} // nothing this poll
                    }
                }
            }
        }

        info!("Event listener stopped");
        Ok(())
    }

    async fn dispatch(&self, message: RawMessage) {
        let event: Event = match serde_json::from_str(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(channel = %message.channel, error = %e, "Dropping undecodable message");
                return;
            }
        };

        let handlers = self
            .handlers
            .read()
            .await
            .get(&message.channel)
            .cloned()
            .unwrap_or_default();

        debug!(
            channel = %message.channel,
            category = %event.category,
            handlers = handlers.len(),
            "Dispatching event"
        );

        for (index, handler) in handlers.into_iter().enumerate() {
            let event = event.clone();
            // run on its own task so a panicking handler is contained
            let outcome = tokio::spawn(async move { handler.handle(&event).await }).await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(
                    channel = %message.channel,
                    handler = index,
                    error = %e,
                    "Event handler failed"
                ),
                Err(e) => error!(
                    channel = %message.channel,
                    handler = index,
                    error = %e,
                    "Event handler panicked"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MemoryBackend;

    fn test_bus() -> EventBus {
        let store = StateStore::new(Arc::new(MemoryBackend::new()), "test");
        EventBus::new(store)
    }

    #[test]
    fn test_channel_routing_by_prefix() {
        let channels = ChannelMap::default();

        assert_eq!(channels.for_category("task.created"), "skyras:tasks");
        assert_eq!(channels.for_category("file.uploaded"), "skyras:files");
        assert_eq!(channels.for_category("episode.created"), "skyras:system");
        assert_eq!(channels.for_category("schedule.changed"), "skyras:system");
        // prefix must include the dot
        assert_eq!(channels.for_category("tasks.created"), "skyras:system");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = test_bus();
        let event = bus.create_event("task.created", "letitia", Map::new());

        assert_eq!(bus.publish(&event).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_handlers_accumulate_per_channel() {
        let bus = test_bus();
        bus.subscribe("skyras:tasks", |_e: Event| async { Ok::<(), anyhow::Error>(()) })
            .await
            .unwrap();
        bus.subscribe("skyras:tasks", |_e: Event| async { Ok::<(), anyhow::Error>(()) })
            .await
            .unwrap();

        assert_eq!(bus.handler_count("skyras:tasks").await, 2);
        assert_eq!(bus.handler_count("skyras:files").await, 0);
    }

    #[tokio::test]
    async fn test_second_listen_is_rejected() {
        let bus = Arc::new(test_bus().with_poll_interval(Duration::from_millis(10)));
        let listener = tokio::spawn({
            let bus = bus.clone();
            async move { bus.listen().await }
        });

        // give the first loop time to claim the inbox
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(bus.listen().await, Err(BusError::AlreadyListening)));

        bus.shutdown();
        listener.await.unwrap().unwrap();
    }
}
