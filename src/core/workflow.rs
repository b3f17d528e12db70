//! Episode/scene workflow engine.
//!
//! `EpisodeManager` is the only writer of episode and scene records. It works
//! against a key/value store with no multi-key transactions, so:
//!
//! - creating an episode is a sequence of independent writes with no
//!   rollback; anything after the episode record that fails is reported as a
//!   failed side effect rather than an error;
//! - scene updates are last-write-wins on the scene record;
//! - episode status moves through a compare-and-swap on the episode record,
//!   so exactly one completion pass advances the episode and notifies.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{LayoutProvisioner, NotifyOutcome, WorkflowNotifier};
use crate::domain::{
    categories, CompletionCheck, Episode, EpisodeCreated, EpisodeStatus, EpisodeUpdated,
    EpisodeView, Event, NewEpisode, Scene, SceneStatus, SceneUpdated, SideEffect,
    SCENES_PER_EPISODE, SCENE_TEMPLATES,
};

use super::event_bus::EventBus;
use super::state_store::{StateStore, StoreError};

/// Agent name stamped on events published by the engine
pub const DEFAULT_AGENT_NAME: &str = "marcus";

/// Upper bound on any single collaborator call
pub const DEFAULT_COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(10);

/// Index of all episode ids, newest first
pub const EPISODE_INDEX_KEY: &str = "episodes:list";

/// Attempts at a status compare-and-swap before reporting a conflict
const CAS_ATTEMPTS: usize = 3;

pub const WORKFLOW_EPISODE_CREATED: &str = "episode-created";
pub const WORKFLOW_SCENES_COMPLETE: &str = "episode-scenes-complete";

pub fn episode_key(episode_id: Uuid) -> String {
    format!("episode:{}", episode_id)
}

pub fn episode_scenes_key(episode_id: Uuid) -> String {
    format!("episode:{}:scenes", episode_id)
}

pub fn scene_key(scene_id: Uuid) -> String {
    format!("scene:{}", scene_id)
}

/// Failures of a primary workflow operation
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Episode not found: {0}")]
    EpisodeNotFound(Uuid),

    #[error("Scene {scene_number} not found in episode {episode_id}")]
    SceneNotFound { episode_id: Uuid, scene_number: u8 },

    #[error("Invalid scene transition: {from} -> {to}")]
    InvalidSceneTransition { from: SceneStatus, to: SceneStatus },

    #[error("Invalid episode transition: {from} -> {to}")]
    InvalidEpisodeTransition {
        from: EpisodeStatus,
        to: EpisodeStatus,
    },

    #[error("Episode {0} kept changing during a status update")]
    Conflict(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorkflowError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::EpisodeNotFound(_) | Self::SceneNotFound { .. }
        )
    }
}

/// What a status compare-and-swap did to the episode record
enum StatusSwap {
    Changed(Episode),
    /// `decide` left the record alone; carries the episode as read
    Unchanged(Episode),
}

/// Episode/scene state machine over the shared store
pub struct EpisodeManager {
    store: StateStore,
    bus: Arc<EventBus>,
    provisioner: Arc<dyn LayoutProvisioner>,
    notifier: Arc<dyn WorkflowNotifier>,
    agent_name: String,
    collaborator_timeout: Duration,
}

impl EpisodeManager {
    pub fn new(
        store: StateStore,
        bus: Arc<EventBus>,
        provisioner: Arc<dyn LayoutProvisioner>,
        notifier: Arc<dyn WorkflowNotifier>,
    ) -> Self {
        Self {
            store,
            bus,
            provisioner,
            notifier,
            agent_name: DEFAULT_AGENT_NAME.to_string(),
            collaborator_timeout: DEFAULT_COLLABORATOR_TIMEOUT,
        }
    }

    pub fn with_agent_name(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = agent_name.into();
        self
    }

    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Create an episode with its five scenes.
    ///
    /// Only a failed write of the episode record is an error. Provisioning,
    /// indexing, scene writes, notification and publishing are tolerated one
    /// by one and listed in `side_effects`; nothing is rolled back.
    #[instrument(skip(self, request), fields(title = %request.title))]
    pub async fn create_episode(&self, request: NewEpisode) -> Result<EpisodeCreated, WorkflowError> {
        let episode_id = Uuid::new_v4();
        let mut side_effects = Vec::new();

        let folder_path = match tokio::time::timeout(
            self.collaborator_timeout,
            self.provisioner.provision(&request.title, episode_id),
        )
        .await
        {
            Ok(Ok(path)) => {
                side_effects.push(SideEffect::ok("provision_layout"));
                Some(path.display().to_string())
            }
            Ok(Err(e)) => {
                warn!(%episode_id, error = %e, "Layout provisioning failed");
                side_effects.push(SideEffect::failed("provision_layout", format!("{:#}", e)));
                None
            }
            Err(_) => {
                warn!(%episode_id, "Layout provisioning timed out");
                side_effects.push(SideEffect::failed(
                    "provision_layout",
                    format!("timed out after {:?}", self.collaborator_timeout),
                ));
                None
            }
        };

        let now = Utc::now();
        let episode = Episode {
            id: episode_id,
            title: request.title,
            episode_number: request.episode_number,
            theme: request.theme,
            tagline: request.tagline,
            status: EpisodeStatus::Planning,
            folder_path,
            created_at: now,
            updated_at: now,
        };

        self.store.put(&episode_key(episode_id), &episode, None).await?;
        info!(%episode_id, "Episode created");

        if let Err(e) = self
            .store
            .list_prepend(EPISODE_INDEX_KEY, &episode_id.to_string())
            .await
        {
            side_effects.push(SideEffect::failed("index_episode", e));
        }

        let mut scenes = Vec::with_capacity(SCENES_PER_EPISODE);
        for template in SCENE_TEMPLATES.iter() {
            let scene = Scene::from_template(episode_id, template);
            match self.persist_new_scene(&scene).await {
                Ok(()) => scenes.push(scene),
                Err(e) => {
                    warn!(%episode_id, scene_number = template.number, error = %e, "Scene creation failed");
                    side_effects.push(SideEffect::failed(
                        format!("create_scene_{}", template.number),
                        e,
                    ));
                }
            }
        }

        side_effects.push(
            self.notify(
                WORKFLOW_EPISODE_CREATED,
                json!({
                    "episode_id": episode_id,
                    "title": episode.title,
                    "folder_path": episode.folder_path,
                    "scenes": scenes,
                }),
            )
            .await,
        );

        let view = EpisodeView {
            episode: episode.clone(),
            scenes: scenes.clone(),
        };
        side_effects.push(self.emit(categories::EPISODE_CREATED, &view).await);

        Ok(EpisodeCreated {
            episode,
            scenes,
            side_effects,
        })
    }

    async fn persist_new_scene(&self, scene: &Scene) -> Result<(), StoreError> {
        self.store.put(&scene_key(scene.id), scene, None).await?;
        self.store
            .list_prepend(&episode_scenes_key(scene.episode_id), &scene.id.to_string())
            .await?;
        Ok(())
    }

    /// Set the status of one scene, then run the completion check if the
    /// scene is now completed.
    ///
    /// Re-applying the current status writes and publishes nothing. Concurrent
    /// updates to the same scene are last-write-wins.
    #[instrument(skip(self, error_message))]
    pub async fn update_scene_status(
        &self,
        episode_id: Uuid,
        scene_number: u8,
        status: SceneStatus,
        error_message: Option<String>,
    ) -> Result<SceneUpdated, WorkflowError> {
        let mut scene = self
            .find_scene(episode_id, scene_number)
            .await?
            .ok_or(WorkflowError::SceneNotFound {
                episode_id,
                scene_number,
            })?;

        if !scene.status.can_transition_to(status) {
            return Err(WorkflowError::InvalidSceneTransition {
                from: scene.status,
                to: status,
            });
        }

        let message_changed = error_message.is_some() && error_message != scene.error_message;
        let mut side_effects = Vec::new();

        if scene.status != status || message_changed {
            scene.status = status;
            scene.updated_at = Utc::now();
            if error_message.is_some() {
                scene.error_message = error_message;
            } else if !status.is_failure() {
                scene.error_message = None;
            }

            self.store.put(&scene_key(scene.id), &scene, None).await?;
            info!(scene_id = %scene.id, %status, "Scene status updated");
            side_effects.push(self.emit(categories::SCENE_UPDATED, &scene).await);
        } else {
            debug!(scene_id = %scene.id, %status, "Scene already in requested status");
        }

        let mut episode_ready = false;
        if status == SceneStatus::Completed {
            match self.check_episode_completion(episode_id).await {
                Ok(check) => {
                    episode_ready = check.episode_ready();
                    match check {
                        CompletionCheck::Advanced {
                            notification,
                            publish,
                        } => {
                            side_effects.push(notification);
                            side_effects.push(publish);
                        }
                        CompletionCheck::AlreadyAdvanced { status } => {
                            debug!(%episode_id, %status, "Episode already past planning");
                        }
                        CompletionCheck::Incomplete { completed } => {
                            debug!(%episode_id, completed, "Episode not complete yet");
                        }
                    }
                }
                Err(e) => {
                    warn!(%episode_id, error = %e, "Completion check failed");
                    side_effects.push(SideEffect::failed("completion_check", e));
                }
            }
        }

        Ok(SceneUpdated {
            scene,
            episode_ready,
            side_effects,
        })
    }

    /// Check whether every scene is completed and, if so, advance the episode
    /// to `ready_for_assembly`.
    ///
    /// The advance is a compare-and-swap from `planning`; only the pass that
    /// wins it notifies the automation system and publishes the change. Any
    /// other pass reports the status it found, which may be `error`.
    pub async fn check_episode_completion(
        &self,
        episode_id: Uuid,
    ) -> Result<CompletionCheck, WorkflowError> {
        let scenes = self.load_scenes(episode_id).await?;
        let completed = scenes
            .iter()
            .filter(|s| s.status == SceneStatus::Completed)
            .count();

        if scenes.len() < SCENES_PER_EPISODE || completed < SCENES_PER_EPISODE {
            return Ok(CompletionCheck::Incomplete { completed });
        }

        let swap = self
            .swap_episode_status(episode_id, |current| {
                if current == EpisodeStatus::Planning {
                    Ok(Some(EpisodeStatus::ReadyForAssembly))
                } else {
                    Ok(None)
                }
            })
            .await?;

        let episode = match swap {
            StatusSwap::Changed(episode) => episode,
            StatusSwap::Unchanged(episode) => {
                return Ok(CompletionCheck::AlreadyAdvanced {
                    status: episode.status,
                });
            }
        };

        info!(%episode_id, "All scenes complete, episode ready for assembly");
        let notification = self
            .notify(WORKFLOW_SCENES_COMPLETE, json!({ "episode_id": episode_id }))
            .await;
        let publish = self.emit(categories::EPISODE_STATUS_CHANGED, &episode).await;

        Ok(CompletionCheck::Advanced {
            notification,
            publish,
        })
    }

    /// Explicit status change, used by the assembly/export/upload stages.
    ///
    /// Only forward moves (or `error`) are accepted. Re-applying the current
    /// status returns the episode unchanged.
    #[instrument(skip(self))]
    pub async fn update_episode_status(
        &self,
        episode_id: Uuid,
        status: EpisodeStatus,
    ) -> Result<EpisodeUpdated, WorkflowError> {
        let swap = self
            .swap_episode_status(episode_id, |current| {
                if current == status {
                    Ok(None)
                } else if current.can_transition_to(status) {
                    Ok(Some(status))
                } else {
                    Err(WorkflowError::InvalidEpisodeTransition {
                        from: current,
                        to: status,
                    })
                }
            })
            .await?;

        match swap {
            StatusSwap::Changed(episode) => {
                info!(%episode_id, %status, "Episode status updated");
                let publish = self.emit(categories::EPISODE_STATUS_CHANGED, &episode).await;
                Ok(EpisodeUpdated {
                    episode,
                    changed: true,
                    side_effects: vec![publish],
                })
            }
            StatusSwap::Unchanged(episode) => Ok(EpisodeUpdated {
                episode,
                changed: false,
                side_effects: Vec::new(),
            }),
        }
    }

    /// Read-modify-CAS loop on the episode record.
    ///
    /// `decide` maps the current status to the next one (`None` leaves the
    /// record alone).
    async fn swap_episode_status<F>(
        &self,
        episode_id: Uuid,
        decide: F,
    ) -> Result<StatusSwap, WorkflowError>
    where
        F: Fn(EpisodeStatus) -> Result<Option<EpisodeStatus>, WorkflowError>,
    {
        let key = episode_key(episode_id);

        for _ in 0..CAS_ATTEMPTS {
            let raw = self
                .store
                .get_raw(&key)
                .await?
                .ok_or(WorkflowError::EpisodeNotFound(episode_id))?;
            let mut episode: Episode = serde_json::from_str(&raw).map_err(StoreError::from)?;

            let Some(next) = decide(episode.status)? else {
                return Ok(StatusSwap::Unchanged(episode));
            };

            episode.status = next;
            episode.updated_at = Utc::now();
            if self.store.compare_and_swap(&key, &raw, &episode).await? {
                return Ok(StatusSwap::Changed(episode));
            }
            debug!(%episode_id, "Episode record changed underneath, retrying");
        }

        Err(WorkflowError::Conflict(episode_id))
    }

    /// Episode with its scenes, ordered by scene number
    pub async fn get_episode_status(&self, episode_id: Uuid) -> Result<EpisodeView, WorkflowError> {
        let episode = self
            .store
            .get_as::<Episode>(&episode_key(episode_id))
            .await?
            .ok_or(WorkflowError::EpisodeNotFound(episode_id))?;

        let mut scenes = self.load_scenes(episode_id).await?;
        scenes.sort_by_key(|s| s.scene_number);

        Ok(EpisodeView { episode, scenes })
    }

    /// Most recently created episodes first
    pub async fn list_episodes(&self, limit: usize) -> Result<Vec<Episode>, WorkflowError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = self
            .store
            .list_range_as(EPISODE_INDEX_KEY, 0, limit as i64 - 1)
            .await?;

        let mut episodes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(episode) = self.store.get_as::<Episode>(&episode_key(id)).await? {
                episodes.push(episode);
            }
        }
        Ok(episodes)
    }

    /// Ask the automation system to kick off another agent.
    ///
    /// Reports only whether the notification went through, not what the
    /// agent did with it.
    pub async fn trigger_agent(&self, agent_name: &str, task: Value) -> NotifyOutcome {
        let payload = json!({
            "agent": agent_name,
            "task": task,
            "triggered_by": self.agent_name,
            "timestamp": Utc::now().to_rfc3339(),
        });
        self.notify_raw(&format!("trigger-{}", agent_name), payload).await
    }

    /// Scene records for an episode in index order (newest first).
    ///
    /// Ids whose record is missing are skipped.
    async fn load_scenes(&self, episode_id: Uuid) -> Result<Vec<Scene>, StoreError> {
        let ids: Vec<Uuid> = self
            .store
            .list_range_as(&episode_scenes_key(episode_id), 0, -1)
            .await?;

        let mut scenes = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.get_as::<Scene>(&scene_key(id)).await? {
                Some(scene) => scenes.push(scene),
                None => warn!(%episode_id, scene_id = %id, "Indexed scene has no record"),
            }
        }
        Ok(scenes)
    }

    /// Linear scan of the scene index; the index is in insertion order, not
    /// scene-number order.
    async fn find_scene(&self, episode_id: Uuid, scene_number: u8) -> Result<Option<Scene>, StoreError> {
        let ids: Vec<Uuid> = self
            .store
            .list_range_as(&episode_scenes_key(episode_id), 0, -1)
            .await?;

        for id in ids {
            if let Some(scene) = self.store.get_as::<Scene>(&scene_key(id)).await? {
                if scene.scene_number == scene_number {
                    return Ok(Some(scene));
                }
            }
        }
        Ok(None)
    }

    async fn notify_raw(&self, workflow: &str, payload: Value) -> NotifyOutcome {
        match tokio::time::timeout(
            self.collaborator_timeout,
            self.notifier.notify(workflow, payload),
        )
        .await
        {
            Ok(outcome) => {
                if !outcome.success {
                    warn!(workflow, detail = %outcome.detail, "Workflow notification failed");
                }
                outcome
            }
            Err(_) => {
                warn!(workflow, "Workflow notification timed out");
                NotifyOutcome::failed(format!(
                    "{} timed out after {:?}",
                    self.notifier.name(),
                    self.collaborator_timeout
                ))
            }
        }
    }

    async fn notify(&self, workflow: &str, payload: Value) -> SideEffect {
        let outcome = self.notify_raw(workflow, payload).await;
        let name = format!("notify:{}", workflow);
        if outcome.success {
            SideEffect::ok(name).with_detail(outcome.detail)
        } else {
            SideEffect::failed(name, outcome.detail)
        }
    }

    async fn emit<T: Serialize + ?Sized>(&self, category: &str, payload: &T) -> SideEffect {
        let name = format!("publish:{}", category);
        let event = match Event::from_payload(category, &self.agent_name, payload) {
            Ok(event) => event,
            Err(e) => return SideEffect::failed(name, e),
        };

        match self.bus.publish(&event).await {
            Ok(receivers) => SideEffect::ok(name).with_detail(format!("{} receivers", receivers)),
            Err(e) => {
                warn!(category, error = %e, "Failed to publish event");
                SideEffect::failed(name, e)
            }
        }
    }
}
