//! Adapter interfaces for external collaborators.
//!
//! The coordination core only talks to the outside world through these
//! traits: folder provisioning, workflow-automation webhooks, the project
//! tracker, and asset generators.

pub mod layout;
pub mod n8n;
pub mod notion;

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{Episode, Scene, SceneStatus};

// Re-export the concrete adapters
pub use layout::FsProvisioner;
pub use n8n::N8nNotifier;
pub use notion::NotionTracker;

/// Result of a workflow-automation notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyOutcome {
    pub success: bool,
    pub detail: String,
}

impl NotifyOutcome {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
        }
    }
}

/// Creates the on-disk layout for an episode
#[async_trait]
pub trait LayoutProvisioner: Send + Sync {
    /// Provision (or re-provision) the folders for an episode and return the
    /// episode root. Must be idempotent for the same `(title, episode_id)`.
    async fn provision(&self, title: &str, episode_id: Uuid) -> Result<PathBuf>;
}

/// Fires named workflows in the automation system
#[async_trait]
pub trait WorkflowNotifier: Send + Sync {
    fn name(&self) -> &str;

    /// Never fails: an unreachable endpoint is reported as an unsuccessful
    /// outcome.
    async fn notify(&self, workflow: &str, payload: Value) -> NotifyOutcome;
}

/// Mirrors episodes and scenes into an external project tracker
#[async_trait]
pub trait ProjectTracker: Send + Sync {
    fn name(&self) -> &str;

    /// Create the episode record, returning its tracker id
    async fn create_episode_record(&self, episode: &Episode) -> Result<String>;

    /// Create one task per scene under the episode record, returning
    /// `(scene_number, task_id)` pairs
    async fn create_scene_tasks(&self, record_id: &str, scenes: &[Scene]) -> Result<Vec<(u8, String)>>;

    async fn update_scene_status(
        &self,
        task_id: &str,
        status: SceneStatus,
        error_message: Option<&str>,
    ) -> Result<()>;
}

/// Kind of asset a generator produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    Video,
    Voice,
    Music,
}

/// A generation job for one scene
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub episode_id: Uuid,
    pub scene_number: u8,
    pub kind: AssetKind,
    pub prompt: String,
}

/// What a generator produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssetResult {
    Generated { artifact_path: PathBuf },
    Failed { error: String },
}

/// Image/video/voice/music generation clients
#[async_trait]
pub trait AssetGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_asset(&self, request: &GenerationRequest) -> AssetResult;
}
