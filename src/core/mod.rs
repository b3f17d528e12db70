//! Core coordination logic.
//!
//! This module contains:
//! - StateStore: Namespaced key/value and list storage over a backend
//! - MemoryBackend: Shared in-process data service
//! - EventBus: Publish/subscribe messaging between agents
//! - EpisodeManager: Episode/scene workflow engine

pub mod event_bus;
pub mod memory;
pub mod state_store;
pub mod workflow;

// Re-export commonly used types
pub use event_bus::{BusError, ChannelMap, EventBus, EventHandler, DEFAULT_POLL_INTERVAL};
pub use memory::MemoryBackend;
pub use state_store::{Backend, MessageSink, RawMessage, StateStore, StoreError};
pub use workflow::{
    episode_key, episode_scenes_key, scene_key, EpisodeManager, WorkflowError,
    EPISODE_INDEX_KEY,
};
