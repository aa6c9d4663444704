/// Media gallery view-model
///
/// Normalizes backend records and in-flight jobs into one `MediaItem`
/// shape. The listing keeps the order its sources chose; filtering
/// narrows by kind without re-sorting.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use api_client::VideoRecord;
use jobs::GenerationJob;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    Generating,
    Completed,
    Failed,
}

/// One gallery entry, whatever it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub kind: MediaKind,
    pub prompt: String,
    /// Playable/viewable location; absent while the item is in flight
    pub url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    /// Width over height, if the source reported dimensions
    #[serde(default)]
    pub aspect_ratio: Option<f32>,
    pub status: MediaStatus,
    pub created_at: Option<DateTime<Utc>>,
    /// Character model the item was generated with, if known
    #[serde(default)]
    pub character_name: Option<String>,
}

impl MediaItem {
    pub fn is_viewable(&self) -> bool {
        self.status == MediaStatus::Completed && self.url.is_some()
    }
}

impl From<VideoRecord> for MediaItem {
    fn from(record: VideoRecord) -> Self {
        let status = match record.status.as_str() {
            "done" => MediaStatus::Completed,
            "failed" => MediaStatus::Failed,
            other => {
                debug!(id = %record.id, status = %other, "treating status as generating");
                MediaStatus::Generating
            }
        };
        Self {
            id: record.id,
            kind: MediaKind::Video,
            prompt: record.prompt,
            url: record.video_url,
            thumbnail_url: None,
            aspect_ratio: None,
            status,
            created_at: record.created_at,
            character_name: None,
        }
    }
}

/// A job still in flight shows up in the gallery as a generating item.
impl From<&GenerationJob> for MediaItem {
    fn from(job: &GenerationJob) -> Self {
        Self {
            id: job.prompt_id.clone(),
            kind: MediaKind::Video,
            prompt: job.prompt.clone(),
            url: None,
            thumbnail_url: None,
            aspect_ratio: None,
            status: MediaStatus::Generating,
            created_at: None,
            character_name: Some(job.model_name.clone()),
        }
    }
}

/// Gallery view over a set of items.
///
/// Items stay in insertion order; the backend returns newest first and
/// that ordering is part of the contract.
#[derive(Debug, Default, Clone)]
pub struct Gallery {
    items: Vec<MediaItem>,
}

impl Gallery {
    pub fn new(items: Vec<MediaItem>) -> Self {
        Self { items }
    }

    pub fn from_videos(records: Vec<VideoRecord>) -> Self {
        Self::new(records.into_iter().map(MediaItem::from).collect())
    }

    pub fn push(&mut self, item: MediaItem) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    /// Items matching the kind, original order preserved. `None` keeps
    /// everything.
    pub fn filter(&self, kind: Option<MediaKind>) -> Vec<&MediaItem> {
        self.items
            .iter()
            .filter(|item| kind.map_or(true, |k| item.kind == k))
            .collect()
    }

    /// Completed items with a URL, for players and download lists.
    pub fn viewable(&self) -> Vec<&MediaItem> {
        self.items.iter().filter(|i| i.is_viewable()).collect()
    }
}
