//! Scene records, their status machine and the fixed scene templates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every episode has exactly this many scenes
pub const SCENES_PER_EPISODE: usize = 5;

/// One of the five fixed child units of an episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: Uuid,

    /// Owning episode (back-reference)
    pub episode_id: Uuid,

    /// 1..=5, unique within the episode
    pub scene_number: u8,

    pub scene_type: SceneKind,

    pub name: String,

    pub description: String,

    pub status: SceneStatus,

    pub duration_seconds: u32,

    #[serde(default)]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Scene {
    /// Instantiate a fresh `todo` scene from a template
    pub fn from_template(episode_id: Uuid, template: &SceneTemplate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            episode_id,
            scene_number: template.number,
            scene_type: template.kind,
            name: template.name.to_string(),
            description: template.description.to_string(),
            status: SceneStatus::Todo,
            duration_seconds: template.duration_seconds,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Scene type bound to a scene number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneKind {
    Intro,
    Reflection,
    ImaginaryLand,
    SongPerformance,
    Resolution,
}

/// Fixed blueprint for one scene slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneTemplate {
    pub number: u8,
    pub kind: SceneKind,
    pub name: &'static str,
    pub description: &'static str,
    pub duration_seconds: u32,
}

/// Scene slots in creation order
pub const SCENE_TEMPLATES: [SceneTemplate; SCENES_PER_EPISODE] = [
    SceneTemplate {
        number: 1,
        kind: SceneKind::Intro,
        name: "Direct-to-Camera Intro",
        description: "School hallway, SkySky confesses guilt",
        duration_seconds: 30,
    },
    SceneTemplate {
        number: 2,
        kind: SceneKind::Reflection,
        name: "Podcast Reflection",
        description: "Bedroom, bedtime podcast",
        duration_seconds: 60,
    },
    SceneTemplate {
        number: 3,
        kind: SceneKind::ImaginaryLand,
        name: "Imaginary Land",
        description: "Golden cloud meadow, meets Luma",
        duration_seconds: 90,
    },
    SceneTemplate {
        number: 4,
        kind: SceneKind::SongPerformance,
        name: "Song Performance",
        description: "Full musical number",
        duration_seconds: 90,
    },
    SceneTemplate {
        number: 5,
        kind: SceneKind::Resolution,
        name: "Real-World Resolution",
        description: "School hallway, confession & closure",
        duration_seconds: 45,
    },
];

/// Look up the template for a scene number
pub fn template_for(scene_number: u8) -> Option<&'static SceneTemplate> {
    SCENE_TEMPLATES.iter().find(|t| t.number == scene_number)
}

/// Progress of a single scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneStatus {
    Todo,
    InProgress,
    Completed,
    Blocked,
    Error,
}

impl SceneStatus {
    /// Whether a scene may move from `self` to `next`.
    ///
    /// `todo` may jump straight to an outcome; `blocked`/`error` recover only
    /// to `todo` or `in_progress`; `completed` is terminal. Re-applying the
    /// current status is always allowed.
    pub fn can_transition_to(self, next: SceneStatus) -> bool {
        use SceneStatus::*;

        if self == next {
            return true;
        }
        match self {
            Todo => matches!(next, InProgress | Completed | Blocked | Error),
            InProgress => matches!(next, Completed | Blocked | Error),
            Blocked | Error => matches!(next, Todo | InProgress),
            Completed => false,
        }
    }

    /// `blocked` and `error` carry an error message
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Blocked | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
            Self::Error => "error",
        }
    }
}

impl Default for SceneStatus {
    fn default() -> Self {
        Self::Todo
    }
}

impl fmt::Display for SceneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SceneStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "blocked" => Ok(Self::Blocked),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown scene status '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_cover_numbers_one_to_five() {
        let numbers: Vec<u8> = SCENE_TEMPLATES.iter().map(|t| t.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert_eq!(template_for(4).unwrap().kind, SceneKind::SongPerformance);
        assert!(template_for(6).is_none());
        assert!(template_for(0).is_none());
    }

    #[test]
    fn test_scene_from_template() {
        let episode_id = Uuid::new_v4();
        let scene = Scene::from_template(episode_id, &SCENE_TEMPLATES[2]);

        assert_eq!(scene.episode_id, episode_id);
        assert_eq!(scene.scene_number, 3);
        assert_eq!(scene.name, "Imaginary Land");
        assert_eq!(scene.duration_seconds, 90);
        assert_eq!(scene.status, SceneStatus::Todo);
    }

    #[test]
    fn test_scene_transitions() {
        use SceneStatus::*;

        assert!(Todo.can_transition_to(InProgress));
        assert!(Todo.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Blocked));
        assert!(Error.can_transition_to(Todo));
        assert!(Blocked.can_transition_to(InProgress));

        assert!(!InProgress.can_transition_to(Todo));
        assert!(!Error.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(Completed.can_transition_to(Completed));
    }

    #[test]
    fn test_scene_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&SceneKind::ImaginaryLand).unwrap(),
            "\"imaginary_land\""
        );
        assert_eq!("in_progress".parse::<SceneStatus>().unwrap(), SceneStatus::InProgress);
    }
}
