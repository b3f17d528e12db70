//! Domain types for the coordination core.
//!
//! This module contains the core data structures:
//! - Events: Immutable notifications exchanged between agents
//! - Episode: Top-level production entity and its lifecycle
//! - Scene: The five fixed child units of an episode
//! - Outcome: Composite results of workflow operations

pub mod episode;
pub mod events;
pub mod outcome;
pub mod scene;

// Re-export commonly used types
pub use episode::{Episode, EpisodeStatus, EpisodeView, NewEpisode};
pub use events::{categories, Event};
pub use outcome::{
    ApiResponse, CompletionCheck, EpisodeCreated, EpisodeUpdated, SceneUpdated, SideEffect,
};
pub use scene::{
    template_for, Scene, SceneKind, SceneStatus, SceneTemplate, SCENES_PER_EPISODE,
    SCENE_TEMPLATES,
};
