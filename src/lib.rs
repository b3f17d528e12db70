//! skyras - coordination core for a multi-agent content studio
//!
//! Agents share state through a namespaced key/value store and talk to each
//! other over a publish/subscribe event bus. On top of that sits the
//! Episode/Scene workflow: an episode owns five fixed scenes, and once every
//! scene is completed the episode advances to `ready_for_assembly` and the
//! automation system is notified exactly once.
//!
//! # Modules
//!
//! - `core`: StateStore, EventBus, EpisodeManager
//! - `domain`: Event, Episode, Scene and operation outcomes
//! - `adapters`: Collaborator interfaces (layout, n8n, Notion, generators)
//! - `agents`: Event-driven glue (tracker mirror, scene reporter)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run one episode end to end in-process
//! skyras simulate "The Lost Crayon" --episode-number 1
//!
//! # Show resolved configuration
//! skyras config
//! ```

pub mod adapters;
pub mod agents;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use crate::core::{EpisodeManager, EventBus, MemoryBackend, StateStore, StoreError, WorkflowError};
pub use crate::domain::{
    Episode, EpisodeStatus, EpisodeView, Event, NewEpisode, Scene, SceneStatus,
};
