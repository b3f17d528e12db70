//! Runs an asset generator for a scene and reports the outcome back into
//! the workflow engine.

use std::sync::Arc;

use tracing::{info, warn};

use crate::adapters::{AssetGenerator, AssetResult, GenerationRequest};
use crate::core::{EpisodeManager, WorkflowError};
use crate::domain::{SceneStatus, SceneUpdated};

/// Generator-side agent glue
pub struct SceneReporter {
    manager: Arc<EpisodeManager>,
    generator: Arc<dyn AssetGenerator>,
}

impl SceneReporter {
    pub fn new(manager: Arc<EpisodeManager>, generator: Arc<dyn AssetGenerator>) -> Self {
        Self { manager, generator }
    }

    /// Mark the scene in progress, generate, then mark it completed or
    /// errored. A scene already in progress is left as is before generating.
    pub async fn run(&self, request: &GenerationRequest) -> Result<SceneUpdated, WorkflowError> {
        self.manager
            .update_scene_status(
                request.episode_id,
                request.scene_number,
                SceneStatus::InProgress,
                None,
            )
            .await?;

        match self.generator.generate_asset(request).await {
            AssetResult::Generated { artifact_path } => {
                info!(
                    generator = self.generator.name(),
                    scene_number = request.scene_number,
                    artifact = %artifact_path.display(),
                    "Asset generated"
                );
                self.manager
                    .update_scene_status(
                        request.episode_id,
                        request.scene_number,
                        SceneStatus::Completed,
                        None,
                    )
                    .await
            }
            AssetResult::Failed { error } => {
                warn!(
                    generator = self.generator.name(),
                    scene_number = request.scene_number,
                    %error,
                    "Asset generation failed"
                );
                self.manager
                    .update_scene_status(
                        request.episode_id,
                        request.scene_number,
                        SceneStatus::Error,
                        Some(format!("{}: {}", self.generator.name(), error)),
                    )
                    .await
            }
        }
    }
}
