//! Composite results of workflow operations.
//!
//! A primary state transition either succeeds or fails as a whole; the
//! secondary calls it triggers (notifications, provisioning, event publishing)
//! are reported next to it as `SideEffect`s and never turn a success into a
//! failure.

use std::fmt::Display;

use serde::Serialize;

use super::episode::{Episode, EpisodeStatus};
use super::scene::{Scene, SCENES_PER_EPISODE};

/// Outcome of one secondary call made during a workflow operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SideEffect {
    pub name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SideEffect {
    pub fn ok(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: true,
            detail: None,
        }
    }

    pub fn failed(name: impl Into<String>, detail: impl Display) -> Self {
        Self {
            name: name.into(),
            success: false,
            detail: Some(detail.to_string()),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Result of creating an episode
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeCreated {
    pub episode: Episode,
    pub scenes: Vec<Scene>,
    pub side_effects: Vec<SideEffect>,
}

impl EpisodeCreated {
    /// All five scenes were written and every side effect succeeded
    pub fn is_complete(&self) -> bool {
        self.scenes.len() == SCENES_PER_EPISODE && self.side_effects.iter().all(|s| s.success)
    }

    pub fn failed_side_effects(&self) -> impl Iterator<Item = &SideEffect> {
        self.side_effects.iter().filter(|s| !s.success)
    }
}

/// Result of a scene status update
#[derive(Debug, Clone, Serialize)]
pub struct SceneUpdated {
    pub scene: Scene,
    /// The owning episode is (now or already) at or past `ready_for_assembly`;
    /// false for an episode in `error`
    pub episode_ready: bool,
    pub side_effects: Vec<SideEffect>,
}

/// What a completion-check pass observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionCheck {
    /// Not every scene is completed yet
    Incomplete { completed: usize },
    /// This pass moved the episode to `ready_for_assembly`
    Advanced {
        notification: SideEffect,
        publish: SideEffect,
    },
    /// The episode had already left `planning`; carries the status seen
    AlreadyAdvanced { status: EpisodeStatus },
}

impl CompletionCheck {
    /// Whether the episode is ready for (or past) assembly after this pass.
    /// An episode in `error` never is.
    pub fn episode_ready(&self) -> bool {
        match self {
            Self::Incomplete { .. } => false,
            Self::Advanced { .. } => true,
            Self::AlreadyAdvanced { status } => status.is_assembly_ready(),
        }
    }
}

/// Result of an explicit episode status change
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeUpdated {
    pub episode: Episode,
    /// False when the episode already had the requested status
    pub changed: bool,
    pub side_effects: Vec<SideEffect>,
}

/// User-facing rendering of any operation: `{success, data?, error?}`
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn from_result<E: Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(e) => Self {
                success: false,
                data: None,
                error: Some(e.to_string()),
            },
        }
    }
}
