use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Authenticated session user, as reported by `/api/profile`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// Trained character model reference.
///
/// Listings merge personal and shared models; only entries the backend
/// reports as completed are usable for generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRef {
    pub id: i64,
    pub name: String,
    #[serde(default = "default_model_status")]
    pub status: String,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_model_status() -> String {
    "completed".to_string()
}

impl ModelRef {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }
}

/// Historical generation record from `/api/video/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(rename = "taskId", default)]
    pub task_id: Option<String>,
    #[serde(rename = "videoUrl", default)]
    pub video_url: Option<String>,
    #[serde(default = "default_video_status")]
    pub status: String,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_video_status() -> String {
    "done".to_string()
}

/// Response body of `POST /api/video/start`.
#[derive(Debug, Clone, Deserialize)]
pub struct StartResponse {
    #[serde(rename = "promptId")]
    pub prompt_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusResponse {
    pub status: String,
}

/// Canonical decode of the backend's job status vocabulary.
///
/// `pending`, `processing` and `running` all mean the job is still being
/// worked on; anything outside the known set is a decode error rather
/// than a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawJobStatus {
    InProgress,
    Done,
    Failed,
}

impl RawJobStatus {
    pub fn parse(s: &str) -> Result<Self, ApiError> {
        match s {
            "pending" | "processing" | "running" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(ApiError::Decode(format!("unknown job status {other:?}"))),
        }
    }
}
