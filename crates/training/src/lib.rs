/// Training upload preparation
///
/// Collects the files a user picked for character training, keeps only
/// the media types the backend accepts, and reports what was dropped so
/// the caller can say why.
use image::imageops::FilterType;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "mkv", "avi"];

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("upload set is empty")]
    Empty,
    #[error("character name must not be empty")]
    MissingName,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("thumbnail failed for {path}: {source}")]
    Thumbnail {
        path: PathBuf,
        source: image::ImageError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    Image,
    Video,
}

/// One accepted file.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub path: PathBuf,
    pub kind: UploadKind,
    /// Small preview image, once generated; images only
    pub preview: Option<PathBuf>,
}

/// A file that was offered but not accepted, with the reason.
#[derive(Debug, Clone)]
pub struct RejectedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub images: usize,
    pub videos: usize,
    pub rejected: usize,
}

fn classify(path: &Path) -> Option<UploadKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(UploadKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(UploadKind::Video)
    } else {
        None
    }
}

/// The set of files selected for one training submission.
#[derive(Debug, Default)]
pub struct UploadSet {
    accepted: Vec<UploadFile>,
    rejected: Vec<RejectedFile>,
}

impl UploadSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a file; unknown extensions and missing files are recorded
    /// as rejected instead of failing the whole set.
    pub fn add(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !path.is_file() {
            self.reject(path, "not a file");
            return;
        }
        match classify(&path) {
            Some(kind) => {
                debug!(path = %path.display(), ?kind, "accepted upload file");
                self.accepted.push(UploadFile {
                    path,
                    kind,
                    preview: None,
                });
            }
            None => self.reject(path, "unsupported file type"),
        }
    }

    pub fn add_files<I, P>(&mut self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        for path in paths {
            self.add(path);
        }
    }

    fn reject(&mut self, path: PathBuf, reason: &str) {
        debug!(path = %path.display(), reason, "rejected upload file");
        self.rejected.push(RejectedFile {
            path,
            reason: reason.to_string(),
        });
    }

    /// Build a set from everything directly inside a directory.
    /// Subdirectories are not descended into; a picked folder means the
    /// files in it, not its whole tree.
    pub fn from_directory(dir: &Path) -> Result<Self, TrainingError> {
        let mut set = Self::new();
        let mut paths = BTreeSet::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| {
                TrainingError::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "walk failed")
                }))
            })?;
            if entry.file_type().is_file() {
                paths.insert(entry.into_path());
            }
        }
        for path in paths {
            set.add(path);
        }
        Ok(set)
    }

    pub fn remove(&mut self, path: &Path) -> bool {
        let before = self.accepted.len();
        self.accepted.retain(|f| f.path != path);
        self.accepted.len() != before
    }

    pub fn files(&self) -> &[UploadFile] {
        &self.accepted
    }

    pub fn rejected(&self) -> &[RejectedFile] {
        &self.rejected
    }

    pub fn paths(&self) -> Vec<&Path> {
        self.accepted.iter().map(|f| f.path.as_path()).collect()
    }

    pub fn stats(&self) -> UploadStats {
        UploadStats {
            images: self
                .accepted
                .iter()
                .filter(|f| f.kind == UploadKind::Image)
                .count(),
            videos: self
                .accepted
                .iter()
                .filter(|f| f.kind == UploadKind::Video)
                .count(),
            rejected: self.rejected.len(),
        }
    }

    /// Generate preview thumbnails for accepted images into `dir`,
    /// recording each on its `UploadFile`. Videos are left without a
    /// preview.
    pub fn generate_previews(&mut self, dir: &Path, max_dim: u32) -> Result<usize, TrainingError> {
        let mut written = 0;
        for file in &mut self.accepted {
            if file.kind != UploadKind::Image || file.preview.is_some() {
                continue;
            }
            let stem = file
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "preview".to_string());
            let out = dir.join(format!("{stem}-preview.png"));
            if write_thumbnail_at(&file.path, &out, max_dim)? {
                file.preview = Some(out);
                written += 1;
            }
        }
        Ok(written)
    }

    /// Validate the set for submission under `name`.
    pub fn check_ready(&self, name: &str) -> Result<(), TrainingError> {
        if name.trim().is_empty() {
            return Err(TrainingError::MissingName);
        }
        if self.accepted.is_empty() {
            return Err(TrainingError::Empty);
        }
        Ok(())
    }
}

/// Write a small preview thumbnail for an accepted image.
///
/// Videos are skipped; previewing those needs a decoder we do not carry.
pub fn write_thumbnail(
    file: &UploadFile,
    out: &Path,
    max_dim: u32,
) -> Result<bool, TrainingError> {
    if file.kind != UploadKind::Image {
        return Ok(false);
    }
    write_thumbnail_at(&file.path, out, max_dim)
}

fn write_thumbnail_at(src: &Path, out: &Path, max_dim: u32) -> Result<bool, TrainingError> {
    let img = image::open(src).map_err(|source| TrainingError::Thumbnail {
        path: src.to_path_buf(),
        source,
    })?;
    let thumb = img.resize(max_dim, max_dim, FilterType::Triangle);
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    thumb.save(out).map_err(|source| TrainingError::Thumbnail {
        path: out.to_path_buf(),
        source,
    })?;
    Ok(true)
}
