//! Episode records and their lifecycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::scene::Scene;

/// Top-level production entity owning exactly five scenes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: Uuid,

    pub title: String,

    #[serde(default)]
    pub episode_number: Option<u32>,

    #[serde(default)]
    pub theme: Option<String>,

    #[serde(default)]
    pub tagline: Option<String>,

    /// Current lifecycle stage
    pub status: EpisodeStatus,

    /// Provisioned folder (absent if provisioning failed)
    #[serde(default)]
    pub folder_path: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Input for creating an episode
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEpisode {
    pub title: String,
    #[serde(default)]
    pub episode_number: Option<u32>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub tagline: Option<String>,
}

impl NewEpisode {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// An episode with its scenes resolved, ordered by scene number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeView {
    #[serde(flatten)]
    pub episode: Episode,

    pub scenes: Vec<Scene>,
}

/// Lifecycle stage of an episode.
///
/// Stages only move forward; `error` can be entered from any non-terminal
/// stage. `completed` and `error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    Planning,
    ReadyForAssembly,
    Assembling,
    Exporting,
    Uploading,
    Completed,
    Error,
}

impl EpisodeStatus {
    /// Position along the forward pipeline (`None` for `error`)
    fn stage(self) -> Option<u8> {
        match self {
            Self::Planning => Some(0),
            Self::ReadyForAssembly => Some(1),
            Self::Assembling => Some(2),
            Self::Exporting => Some(3),
            Self::Uploading => Some(4),
            Self::Completed => Some(5),
            Self::Error => None,
        }
    }

    /// At or past `ready_for_assembly`, and not `error`
    pub fn is_assembly_ready(self) -> bool {
        self.stage().map_or(false, |stage| stage >= 1)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Whether moving to `next` is allowed. Re-applying the current stage is
    /// accepted as a no-op.
    pub fn can_transition_to(self, next: EpisodeStatus) -> bool {
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        match (self.stage(), next.stage()) {
            (_, None) => true,
            (Some(current), Some(target)) => target > current,
            (None, Some(_)) => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::ReadyForAssembly => "ready_for_assembly",
            Self::Assembling => "assembling",
            Self::Exporting => "exporting",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl Default for EpisodeStatus {
    fn default() -> Self {
        Self::Planning
    }
}

impl fmt::Display for EpisodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EpisodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planning" => Ok(Self::Planning),
            "ready_for_assembly" => Ok(Self::ReadyForAssembly),
            "assembling" => Ok(Self::Assembling),
            "exporting" => Ok(Self::Exporting),
            "uploading" => Ok(Self::Uploading),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown episode status '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_only() {
        use EpisodeStatus::*;

        assert!(Planning.can_transition_to(ReadyForAssembly));
        assert!(ReadyForAssembly.can_transition_to(Assembling));
        assert!(Uploading.can_transition_to(Completed));
        // skipping ahead is still forward
        assert!(Assembling.can_transition_to(Uploading));

        assert!(!Assembling.can_transition_to(Planning));
        assert!(!Completed.can_transition_to(Uploading));
    }

    #[test]
    fn test_error_reachable_from_non_terminal() {
        use EpisodeStatus::*;

        for status in [Planning, ReadyForAssembly, Assembling, Exporting, Uploading] {
            assert!(status.can_transition_to(Error), "{} -> error", status);
        }
        assert!(!Completed.can_transition_to(Error));
        assert!(!Error.can_transition_to(Planning));
    }

    #[test]
    fn test_assembly_ready_excludes_error() {
        use EpisodeStatus::*;

        assert!(!Planning.is_assembly_ready());
        for status in [ReadyForAssembly, Assembling, Exporting, Uploading, Completed] {
            assert!(status.is_assembly_ready(), "{}", status);
        }
        assert!(!Error.is_assembly_ready());
    }

    #[test]
    fn test_same_status_is_idempotent() {
        assert!(EpisodeStatus::Completed.can_transition_to(EpisodeStatus::Completed));
        assert!(EpisodeStatus::Error.can_transition_to(EpisodeStatus::Error));
    }

    #[test]
    fn test_status_string_round_trip() {
        let status: EpisodeStatus = "ready_for_assembly".parse().unwrap();
        assert_eq!(status, EpisodeStatus::ReadyForAssembly);
        assert_eq!(
            serde_json::to_string(&status).unwrap(),
            "\"ready_for_assembly\""
        );
        assert!("archived".parse::<EpisodeStatus>().is_err());
    }
}
