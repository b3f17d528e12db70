//! Command-line interface for skyras.
//!
//! Provides a one-process simulation of the episode workflow and a dump of
//! the resolved configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::adapters::{
    AssetGenerator, AssetKind, AssetResult, FsProvisioner, GenerationRequest, N8nNotifier,
    NotionTracker,
};
use crate::agents::{SceneReporter, TrackerMirror};
use crate::config::{self, ResolvedConfig};
use crate::core::{EpisodeManager, EventBus, MemoryBackend, StateStore};
use crate::domain::{ApiResponse, Event, NewEpisode, SCENE_TEMPLATES};

/// skyras - multi-agent coordination core
#[derive(Parser, Debug)]
#[command(name = "skyras")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an episode and drive all five scenes to completion in-process
    Simulate {
        /// Episode title
        title: String,

        /// Episode number
        #[arg(short = 'n', long)]
        episode_number: Option<u32>,

        /// Episode theme
        #[arg(long)]
        theme: Option<String>,

        /// Episode tagline
        #[arg(long)]
        tagline: Option<String>,

        /// Make the first generation for this scene fail (it is retried)
        #[arg(long)]
        fail_scene: Option<u8>,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Simulate {
                title,
                episode_number,
                theme,
                tagline,
                fail_scene,
            } => {
                let request = NewEpisode {
                    title,
                    episode_number,
                    theme,
                    tagline,
                };
                simulate(request, fail_scene).await
            }
            Commands::Config => show_config(),
        }
    }
}

/// Generator standing in for the real asset services during a simulation.
///
/// Writes nothing; reports a path inside the scene folder. Fails once for
/// `fail_scene` so the retry path gets exercised.
struct SimulatedGenerator {
    episode_dir: PathBuf,
    fail_scene: Option<u8>,
    failed_once: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl AssetGenerator for SimulatedGenerator {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn generate_asset(&self, request: &GenerationRequest) -> AssetResult {
        use std::sync::atomic::Ordering;

        if self.fail_scene == Some(request.scene_number)
            && !self.failed_once.swap(true, Ordering::SeqCst)
        {
            return AssetResult::Failed {
                error: "simulated generation failure".to_string(),
            };
        }

        AssetResult::Generated {
            artifact_path: self
                .episode_dir
                .join("HeyGen_Video")
                .join(format!("Scene_{:02}", request.scene_number))
                .join("take_01.mp4"),
        }
    }
}

/// Wire the agents together against an in-process store and run one
/// episode end to end
async fn simulate(request: NewEpisode, fail_scene: Option<u8>) -> Result<()> {
    let cfg = config::config()?;

    let store = StateStore::new(Arc::new(MemoryBackend::new()), cfg.namespace.clone());
    let bus = Arc::new(
        EventBus::with_channels(store.clone(), cfg.channels.clone())
            .with_poll_interval(cfg.poll_interval),
    );

    let listener = tokio::spawn({
        let bus = bus.clone();
        async move { bus.listen().await }
    });

    let system = cfg.channels.system.clone();
    bus.subscribe(&system, |event: Event| async move {
        info!(
            category = %event.category,
            agent = %event.source_agent,
            "System event"
        );
        Ok::<(), anyhow::Error>(())
    })
    .await?;

    match NotionTracker::from_parts(
        cfg.tracker.api_key.as_deref(),
        cfg.tracker.database_id.as_deref(),
    ) {
        Some(tracker) => {
            bus.subscribe(&system, TrackerMirror::new(Arc::new(tracker), store.clone()))
                .await?;
            info!("Mirroring episodes into Notion");
        }
        None => info!("Notion not configured, tracker mirror disabled"),
    }

    let provisioner = FsProvisioner::new(&cfg.episodes_root);
    let notifier = N8nNotifier::new(&cfg.notifier.url, cfg.notifier.api_key.clone())
        .with_timeout(cfg.notifier.timeout);
    let manager = Arc::new(
        EpisodeManager::new(store, bus.clone(), Arc::new(provisioner), Arc::new(notifier))
            .with_agent_name(&cfg.agent_name),
    );

    let created = manager
        .create_episode(request)
        .await
        .context("Failed to create episode")?;
    let episode_id = created.episode.id;

    println!("Created episode: {}", episode_id);
    println!("Title: {}", created.episode.title);
    if let Some(ref folder) = created.episode.folder_path {
        println!("Folder: {}", folder);
    }
    for effect in created.failed_side_effects() {
        println!(
            "  ! {}: {}",
            effect.name,
            effect.detail.as_deref().unwrap_or("failed")
        );
    }
    if created.scenes.len() != SCENE_TEMPLATES.len() {
        bail!(
            "Only {} of {} scenes were created",
            created.scenes.len(),
            SCENE_TEMPLATES.len()
        );
    }

    let episode_dir = created
        .episode
        .folder_path
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| cfg.episodes_root.clone());
    let reporter = SceneReporter::new(
        manager.clone(),
        Arc::new(SimulatedGenerator {
            episode_dir,
            fail_scene,
            failed_once: std::sync::atomic::AtomicBool::new(false),
        }),
    );

    println!();
    for template in SCENE_TEMPLATES.iter() {
        let request = GenerationRequest {
            episode_id,
            scene_number: template.number,
            kind: AssetKind::Video,
            prompt: template.description.to_string(),
        };

        let mut updated = reporter.run(&request).await?;
        if let Some(ref message) = updated.scene.error_message {
            println!("Scene {} failed: {} (retrying)", template.number, message);
            updated = reporter.run(&request).await?;
        }
        println!(
            "Scene {} [{}] {}",
            template.number, updated.scene.status, updated.scene.name
        );
        if updated.episode_ready {
            println!("Episode ready for assembly");
        }
    }

    let status = manager.get_episode_status(episode_id).await;
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&ApiResponse::from_result(status))?
    );

    bus.shutdown();
    match listener.await {
        Ok(result) => result?,
        Err(e) => warn!(error = %e, "Event listener task failed"),
    }

    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg: &ResolvedConfig = config::config()?;

    println!("SkyRas Configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:          {}", cfg.home.display());
    println!("  Episodes root: {}", cfg.episodes_root.display());
    println!();
    println!("Store:");
    println!("  Namespace:     {}", cfg.namespace);
    println!();
    println!("Bus:");
    println!("  Agent name:    {}", cfg.agent_name);
    println!("  Poll interval: {}ms", cfg.poll_interval.as_millis());
    println!("  Tasks channel: {}", cfg.channels.tasks);
    println!("  Files channel: {}", cfg.channels.files);
    println!("  System channel: {}", cfg.channels.system);
    println!();
    println!("Notifier (n8n):");
    println!("  URL:           {}", cfg.notifier.url);
    println!("  API key:       {}", redacted(cfg.notifier.api_key.as_deref()));
    println!("  Timeout:       {}s", cfg.notifier.timeout.as_secs());
    println!();
    println!("Tracker (Notion):");
    println!("  API key:       {}", redacted(cfg.tracker.api_key.as_deref()));
    println!(
        "  Database:      {}",
        cfg.tracker.database_id.as_deref().unwrap_or("(not set)")
    );

    Ok(())
}

fn redacted(secret: Option<&str>) -> &'static str {
    match secret {
        Some(_) => "(set)",
        None => "(not set)",
    }
}
