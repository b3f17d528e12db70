//! Event-driven agents built on the bus and the workflow engine.
//!
//! - TrackerMirror: keeps the project tracker in step with workflow events
//! - SceneReporter: reports generator results back as scene status updates

pub mod scene_reporter;
pub mod tracker_mirror;

pub use scene_reporter::SceneReporter;
pub use tracker_mirror::{tracker_episode_key, tracker_scene_key, TrackerMirror};
