//! Notion pages API adapter for mirroring episodes and scenes.
//!
//! Episodes become pages in a database; scenes become child pages of the
//! episode page with a status select.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::domain::{Episode, Scene, SceneStatus};

use super::ProjectTracker;

const NOTION_API: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

/// Notion API client
pub struct NotionTracker {
    api_key: String,
    database_id: String,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

/// Subset of a Notion page response
#[derive(Debug, Deserialize)]
struct PageResponse {
    id: String,
}

impl NotionTracker {
    pub fn new(api_key: impl Into<String>, database_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            database_id: database_id.into(),
            base_url: NOTION_API.to_string(),
            timeout: Duration::from_secs(10),
            client: reqwest::Client::new(),
        }
    }

    /// Point the client at a different API root (proxies, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a tracker only when both credentials are present
    pub fn from_parts(api_key: Option<&str>, database_id: Option<&str>) -> Option<Self> {
        match (api_key, database_id) {
            (Some(key), Some(db)) if !key.is_empty() && !db.is_empty() => Some(Self::new(key, db)),
            _ => None,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<PageResponse> {
        let response = request
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Notion-Version", NOTION_VERSION)
            .timeout(self.timeout)
            .send()
            .await
            .context("Failed to reach Notion")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Notion API error ({}): {}", status, text);
        }

        response
            .json::<PageResponse>()
            .await
            .context("Failed to parse Notion response")
    }

    async fn create_page(&self, body: Value) -> Result<String> {
        let request = self
            .client
            .post(format!("{}/pages", self.base_url))
            .json(&body);
        Ok(self.send(request).await?.id)
    }
}

/// Select label used on the Notion board for each scene status
pub fn status_label(status: SceneStatus) -> &'static str {
    match status {
        SceneStatus::Todo => "To Do",
        SceneStatus::InProgress => "In Progress",
        SceneStatus::Completed => "Done",
        SceneStatus::Blocked => "Blocked",
        SceneStatus::Error => "Error",
    }
}

fn rich_text(content: &str) -> Value {
    json!([{ "text": { "content": content } }])
}

fn episode_page(database_id: &str, episode: &Episode) -> Value {
    json!({
        "parent": { "database_id": database_id },
        "properties": {
            "Title": { "title": rich_text(&episode.title) },
            "Episode Number": { "number": episode.episode_number.unwrap_or(0) },
            "Status": { "select": { "name": episode.status.as_str() } },
            "Theme": { "rich_text": rich_text(episode.theme.as_deref().unwrap_or("")) },
            "Tagline": { "rich_text": rich_text(episode.tagline.as_deref().unwrap_or("")) },
            "Created": { "date": { "start": episode.created_at.to_rfc3339() } }
        }
    })
}

fn scene_page(record_id: &str, scene: &Scene) -> Value {
    json!({
        "parent": { "page_id": record_id },
        "properties": {
            "Name": { "title": rich_text(&format!("Scene {}: {}", scene.scene_number, scene.name)) },
            "Status": { "select": { "name": status_label(scene.status) } },
            "Scene Number": { "number": scene.scene_number },
            "Duration": { "number": scene.duration_seconds },
            "Description": { "rich_text": rich_text(&scene.description) }
        }
    })
}

#[async_trait]
impl ProjectTracker for NotionTracker {
    fn name(&self) -> &str {
        "notion"
    }

    async fn create_episode_record(&self, episode: &Episode) -> Result<String> {
        self.create_page(episode_page(&self.database_id, episode))
            .await
            .with_context(|| format!("Failed to create episode page for {}", episode.id))
    }

    async fn create_scene_tasks(&self, record_id: &str, scenes: &[Scene]) -> Result<Vec<(u8, String)>> {
        let mut tasks = Vec::with_capacity(scenes.len());
        for scene in scenes {
            let task_id = self
                .create_page(scene_page(record_id, scene))
                .await
                .with_context(|| format!("Failed to create task for scene {}", scene.scene_number))?;
            tasks.push((scene.scene_number, task_id));
        }
        Ok(tasks)
    }

    async fn update_scene_status(
        &self,
        task_id: &str,
        status: SceneStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut properties = json!({
            "Status": { "select": { "name": status_label(status) } }
        });
        if let Some(message) = error_message {
            properties["Error"] = json!({ "rich_text": rich_text(message) });
        }

        let request = self
            .client
            .patch(format!("{}/pages/{}", self.base_url, task_id))
            .json(&json!({ "properties": properties }));
        self.send(request)
            .await
            .with_context(|| format!("Failed to update Notion task {}", task_id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SCENE_TEMPLATES;
    use uuid::Uuid;

    #[test]
    fn test_status_labels() {
        assert_eq!(status_label(SceneStatus::Todo), "To Do");
        assert_eq!(status_label(SceneStatus::Completed), "Done");
    }

    #[test]
    fn test_from_parts_requires_both_credentials() {
        assert!(NotionTracker::from_parts(Some("key"), None).is_none());
        assert!(NotionTracker::from_parts(Some(""), Some("db")).is_none());
        assert!(NotionTracker::from_parts(Some("key"), Some("db")).is_some());
    }

    #[test]
    fn test_scene_page_body() {
        let scene = Scene::from_template(Uuid::new_v4(), &SCENE_TEMPLATES[0]);
        let body = scene_page("page-1", &scene);

        assert_eq!(body["parent"]["page_id"], "page-1");
        assert_eq!(
            body["properties"]["Name"]["title"][0]["text"]["content"],
            "Scene 1: Direct-to-Camera Intro"
        );
        assert_eq!(body["properties"]["Status"]["select"]["name"], "To Do");
        assert_eq!(body["properties"]["Duration"]["number"], 30);
    }
}
