//! Filesystem provisioner for episode folder layouts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::domain::SCENES_PER_EPISODE;

use super::LayoutProvisioner;

/// Top-level folders inside every episode
pub const EPISODE_FOLDERS: [&str; 8] = [
    "Script",
    "Midjourney_Art",
    "HeyGen_Video",
    "ElevenLabs_VO",
    "Suno_Audio",
    "Resolve_Project",
    "Resolve_Media",
    "Finals",
];

/// Asset folders that get one subfolder per scene
pub const PER_SCENE_FOLDERS: [&str; 4] =
    ["Midjourney_Art", "HeyGen_Video", "ElevenLabs_VO", "Resolve_Media"];

/// Creates episode folders under a root directory
pub struct FsProvisioner {
    root: PathBuf,
}

impl FsProvisioner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Episode directory for a title/id pair
    pub fn episode_dir(&self, title: &str, episode_id: Uuid) -> PathBuf {
        self.root
            .join(format!("Episode_{}_{}", sanitize_title(title), short_id(episode_id)))
    }
}

/// Keep alphanumerics, spaces, dashes and underscores; spaces become
/// underscores
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim().replace(' ', "_");
    if cleaned.is_empty() {
        "Untitled".to_string()
    } else {
        cleaned
    }
}

fn short_id(episode_id: Uuid) -> String {
    episode_id.simple().to_string()[..8].to_string()
}

#[async_trait]
impl LayoutProvisioner for FsProvisioner {
    async fn provision(&self, title: &str, episode_id: Uuid) -> Result<PathBuf> {
        let episode_dir = self.episode_dir(title, episode_id);

        for folder in EPISODE_FOLDERS {
            let dir = episode_dir.join(folder);
            fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create folder: {}", dir.display()))?;

            if PER_SCENE_FOLDERS.contains(&folder) {
                for scene_number in 1..=SCENES_PER_EPISODE {
                    let scene_dir = dir.join(format!("Scene_{:02}", scene_number));
                    fs::create_dir_all(&scene_dir).await.with_context(|| {
                        format!("Failed to create folder: {}", scene_dir.display())
                    })?;
                }
            }
        }

        let script_path = episode_dir
            .join("Script")
            .join(format!("EP{}_Script.md", short_id(episode_id)));
        if !fs::try_exists(&script_path).await.unwrap_or(false) {
            fs::write(
                &script_path,
                format!("# {}\n\nEpisode script will be generated here.\n", title),
            )
            .await
            .with_context(|| format!("Failed to write script stub: {}", script_path.display()))?;
        }

        debug!(path = %episode_dir.display(), "Provisioned episode layout");
        Ok(episode_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("The Big Lie!"), "The_Big_Lie");
        assert_eq!(sanitize_title("  Pilot - Part_1 "), "Pilot_-_Part_1");
        assert_eq!(sanitize_title("???"), "Untitled");
    }

    #[tokio::test]
    async fn test_provision_creates_layout() {
        let temp = TempDir::new().unwrap();
        let provisioner = FsProvisioner::new(temp.path());
        let episode_id = Uuid::new_v4();

        let dir = provisioner.provision("Pilot", episode_id).await.unwrap();

        assert!(dir.starts_with(temp.path()));
        for folder in EPISODE_FOLDERS {
            assert!(dir.join(folder).is_dir(), "missing {}", folder);
        }
        assert!(dir.join("HeyGen_Video/Scene_05").is_dir());
        assert!(!dir.join("Suno_Audio/Scene_01").exists());

        let script = dir
            .join("Script")
            .join(format!("EP{}_Script.md", short_id(episode_id)));
        let content = std::fs::read_to_string(script).unwrap();
        assert!(content.starts_with("# Pilot"));
    }

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let provisioner = FsProvisioner::new(temp.path());
        let episode_id = Uuid::new_v4();

        let first = provisioner.provision("Pilot", episode_id).await.unwrap();
        let script = first
            .join("Script")
            .join(format!("EP{}_Script.md", short_id(episode_id)));
        std::fs::write(&script, "edited by a writer").unwrap();

        let second = provisioner.provision("Pilot", episode_id).await.unwrap();
        assert_eq!(first, second);
        // existing script is left alone
        assert_eq!(std::fs::read_to_string(&script).unwrap(), "edited by a writer");
    }
}
