/// Two-track timeline model
///
/// One video track and one audio track; clips reference imported media
/// assets and carry trim bounds in seconds of source time. The model is
/// plain data plus edit operations; playback and rendering live
/// elsewhere.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("asset not found: {0}")]
    AssetNotFound(String),
    #[error("clip not found: {0}")]
    ClipNotFound(String),
    #[error("invalid operation: {0}")]
    InvalidOp(String),
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// Imported source media a clip can reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: String,
    pub name: String,
    /// Location of the source, a URL or local path
    pub src: String,
    pub kind: TrackKind,
    /// Source duration in seconds, if known
    pub duration: Option<f64>,
}

impl MediaAsset {
    pub fn new(name: impl Into<String>, src: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            src: src.into(),
            kind,
            duration: None,
        }
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration = Some(secs);
        self
    }
}

/// A placed clip. `start` is timeline time; `trim_start`/`trim_end`
/// bound the source region, so `duration` never exceeds
/// `trim_end - trim_start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clip {
    pub id: String,
    pub asset_id: String,
    /// Timeline position in seconds
    pub start: f64,
    /// Played length in seconds
    pub duration: f64,
    /// Source in-point in seconds
    pub trim_start: f64,
    /// Source out-point in seconds
    pub trim_end: f64,
}

impl Clip {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Track {
    pub clips: Vec<Clip>,
}

/// The editable document: assets plus a video and an audio track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    pub name: String,
    pub assets: HashMap<String, MediaAsset>,
    pub video: Track,
    pub audio: Track,
}

impl Timeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            assets: HashMap::new(),
            video: Track::default(),
            audio: Track::default(),
        }
    }

    pub fn add_asset(&mut self, asset: MediaAsset) -> String {
        let id = asset.id.clone();
        self.assets.insert(id.clone(), asset);
        id
    }

    fn track(&self, kind: TrackKind) -> &Track {
        match kind {
            TrackKind::Video => &self.video,
            TrackKind::Audio => &self.audio,
        }
    }

    fn track_mut(&mut self, kind: TrackKind) -> &mut Track {
        match kind {
            TrackKind::Video => &mut self.video,
            TrackKind::Audio => &mut self.audio,
        }
    }

    /// Place an asset on its matching track at `start`. The clip opens
    /// untrimmed, covering the whole known source duration.
    pub fn add_clip(&mut self, asset_id: &str, start: f64) -> Result<String, TimelineError> {
        if start < 0.0 {
            return Err(TimelineError::InvalidOp(format!(
                "clip start {start} is negative"
            )));
        }
        let asset = self
            .assets
            .get(asset_id)
            .ok_or_else(|| TimelineError::AssetNotFound(asset_id.to_string()))?;
        let duration = asset.duration.unwrap_or(5.0);
        let kind = asset.kind;
        let clip = Clip {
            id: Uuid::new_v4().to_string(),
            asset_id: asset_id.to_string(),
            start,
            duration,
            trim_start: 0.0,
            trim_end: duration,
        };
        let id = clip.id.clone();
        let track = self.track_mut(kind);
        track.clips.push(clip);
        track.clips.sort_by(|a, b| a.start.total_cmp(&b.start));
        Ok(id)
    }

    pub fn remove_clip(&mut self, clip_id: &str) -> Result<Clip, TimelineError> {
        for track in [&mut self.video, &mut self.audio] {
            if let Some(pos) = track.clips.iter().position(|c| c.id == clip_id) {
                return Ok(track.clips.remove(pos));
            }
        }
        Err(TimelineError::ClipNotFound(clip_id.to_string()))
    }

    /// Move a clip to a new timeline position, keeping its trim.
    pub fn move_clip(&mut self, clip_id: &str, start: f64) -> Result<(), TimelineError> {
        if start < 0.0 {
            return Err(TimelineError::InvalidOp(format!(
                "clip start {start} is negative"
            )));
        }
        let clip = self.clip_mut(clip_id)?;
        clip.start = start;
        for track in [&mut self.video, &mut self.audio] {
            track.clips.sort_by(|a, b| a.start.total_cmp(&b.start));
        }
        Ok(())
    }

    /// Re-trim a clip. The in-point must precede the out-point; the
    /// out-point is clamped into the source duration when the asset
    /// reports one, and the played duration shrinks to fit.
    pub fn trim_clip(
        &mut self,
        clip_id: &str,
        trim_start: f64,
        trim_end: f64,
    ) -> Result<(), TimelineError> {
        if trim_start < 0.0 || trim_end <= trim_start {
            return Err(TimelineError::InvalidOp(format!(
                "trim bounds {trim_start}..{trim_end} are empty or negative"
            )));
        }
        let asset_id = self
            .get_clip(clip_id)
            .ok_or_else(|| TimelineError::ClipNotFound(clip_id.to_string()))?
            .asset_id
            .clone();
        let source_len = self.assets.get(&asset_id).and_then(|a| a.duration);
        let trim_end = match source_len {
            Some(len) => trim_end.min(len),
            None => trim_end,
        };
        if trim_end <= trim_start {
            return Err(TimelineError::InvalidOp(format!(
                "trim starts at {trim_start}, past the end of the source"
            )));
        }
        let clip = self.clip_mut(clip_id)?;
        clip.trim_start = trim_start;
        clip.trim_end = trim_end;
        clip.duration = trim_end - trim_start;
        Ok(())
    }

    fn clip_mut(&mut self, clip_id: &str) -> Result<&mut Clip, TimelineError> {
        for track in [&mut self.video, &mut self.audio] {
            if let Some(clip) = track.clips.iter_mut().find(|c| c.id == clip_id) {
                return Ok(clip);
            }
        }
        Err(TimelineError::ClipNotFound(clip_id.to_string()))
    }

    pub fn get_clip(&self, clip_id: &str) -> Option<&Clip> {
        self.video
            .clips
            .iter()
            .chain(self.audio.clips.iter())
            .find(|c| c.id == clip_id)
    }

    /// End of the last clip across both tracks.
    pub fn total_duration(&self) -> f64 {
        self.video
            .clips
            .iter()
            .chain(self.audio.clips.iter())
            .map(Clip::end)
            .fold(0.0, f64::max)
    }

    /// Clips on one track in playback order.
    pub fn clips_on(&self, kind: TrackKind) -> &[Clip] {
        &self.track(kind).clips
    }

    /// Clips covering a timeline instant, video track first.
    pub fn clips_at(&self, time: f64) -> Vec<&Clip> {
        self.video
            .clips
            .iter()
            .chain(self.audio.clips.iter())
            .filter(|c| c.start <= time && time < c.end())
            .collect()
    }
}

/// Export request document.
///
/// Rendering happens server-side; this is the JSON the timeline hands
/// over when the user asks for an export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    pub name: String,
    pub duration: f64,
    pub assets: Vec<MediaAsset>,
    pub video: Vec<Clip>,
    pub audio: Vec<Clip>,
}

impl ExportRequest {
    pub fn from_timeline(timeline: &Timeline) -> Self {
        let mut assets: Vec<MediaAsset> = timeline.assets.values().cloned().collect();
        assets.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            name: timeline.name.clone(),
            duration: timeline.total_duration(),
            assets,
            video: timeline.video.clips.clone(),
            audio: timeline.audio.clips.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, TimelineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
