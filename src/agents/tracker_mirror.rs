//! Mirrors workflow events into the project tracker.
//!
//! Subscribed to the system channel. On `episode.created` it creates the
//! episode record and one task per scene; on `scene.updated` it pushes the
//! new status to the scene's task. Tracker ids are kept in the state store
//! under `tracker:episode:{id}` and `tracker:scene:{id}`.
//!
//! Everything here is best-effort: failures bubble up to the bus, which logs
//! them, and never touch the episode or scene records.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use crate::adapters::ProjectTracker;
use crate::core::{EventHandler, StateStore};
use crate::domain::{categories, Event, EpisodeView, Scene};

pub fn tracker_episode_key(episode_id: Uuid) -> String {
    format!("tracker:episode:{}", episode_id)
}

pub fn tracker_scene_key(scene_id: Uuid) -> String {
    format!("tracker:scene:{}", scene_id)
}

/// Event handler keeping the tracker in step with the workflow
pub struct TrackerMirror {
    tracker: Arc<dyn ProjectTracker>,
    store: StateStore,
}

impl TrackerMirror {
    pub fn new(tracker: Arc<dyn ProjectTracker>, store: StateStore) -> Self {
        Self { tracker, store }
    }

    async fn mirror_episode(&self, view: EpisodeView) -> Result<()> {
        let episode_id = view.episode.id;
        let record_id = self
            .tracker
            .create_episode_record(&view.episode)
            .await?;
        self.store
            .put(&tracker_episode_key(episode_id), &record_id, None)
            .await?;

        let tasks = self
            .tracker
            .create_scene_tasks(&record_id, &view.scenes)
            .await?;
        for (scene_number, task_id) in tasks {
            if let Some(scene) = view.scenes.iter().find(|s| s.scene_number == scene_number) {
                self.store
                    .put(&tracker_scene_key(scene.id), &task_id, None)
                    .await?;
            }
        }

        info!(%episode_id, tracker = self.tracker.name(), %record_id, "Mirrored episode");
        Ok(())
    }

    async fn mirror_scene(&self, scene: Scene) -> Result<()> {
        let Some(task_id) = self
            .store
            .get_as::<String>(&tracker_scene_key(scene.id))
            .await?
        else {
            debug!(scene_id = %scene.id, "Scene has no tracker task, skipping");
            return Ok(());
        };

        self.tracker
            .update_scene_status(&task_id, scene.status, scene.error_message.as_deref())
            .await
    }
}

#[async_trait]
impl EventHandler for TrackerMirror {
    async fn handle(&self, event: &Event) -> Result<()> {
        match event.category.as_str() {
            categories::EPISODE_CREATED => {
                let view: EpisodeView = event
                    .payload_as()
                    .context("Malformed episode.created payload")?;
                self.mirror_episode(view).await
            }
            categories::SCENE_UPDATED => {
                let scene: Scene = event
                    .payload_as()
                    .context("Malformed scene.updated payload")?;
                self.mirror_scene(scene).await
            }
            _ => Ok(()),
        }
    }
}
