//! Image Store - Persist, verify and hand out rendered explanations
//!
//! Write path: temp file in the target directory → rename → reopen →
//! decode → dimension check. Only an image that survives the whole round
//! trip is exposed; on any failure the target file is removed so an older
//! image can never be mistaken for the current one.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::logic::error::{RiskError, RiskResult};
use crate::logic::render::ExplanationImage;

const IMAGE_EXTENSION: &str = "png";

/// How published images are named
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageNaming {
    /// Fresh v4 UUID per submission; safe for concurrent users
    PerRequest,
    /// One shared file overwritten by every submission
    Fixed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishedImage {
    pub id: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
    naming: ImageNaming,
    /// Per-request images older than this are swept on publish
    ttl: Option<Duration>,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>, naming: ImageNaming) -> RiskResult<Self> {
        let dir = dir.into();

        if let ImageNaming::Fixed(name) = &naming {
            if !is_safe_name(name) {
                return Err(RiskError::image_persist(
                    &dir,
                    format!("fixed image name '{}' is not a plain file name", name),
                ));
            }
        }

        fs::create_dir_all(&dir).map_err(|e| RiskError::image_persist(&dir, e))?;
        log::info!("Image store at {} ({:?})", dir.display(), naming);

        Ok(Self {
            dir,
            naming,
            ttl: None,
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn naming(&self) -> &ImageNaming {
        &self.naming
    }

    fn next_id(&self) -> String {
        match &self.naming {
            ImageNaming::PerRequest => Uuid::new_v4().to_string(),
            ImageNaming::Fixed(name) => name.clone(),
        }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, IMAGE_EXTENSION))
    }

    /// Persist and verify an image. Nothing is exposed unless verification passes.
    pub fn publish(&self, image: &ExplanationImage) -> RiskResult<PublishedImage> {
        if let (ImageNaming::PerRequest, Some(ttl)) = (&self.naming, self.ttl) {
            self.sweep_expired(ttl);
        }

        let id = self.next_id();
        let path = self.path_for(&id);

        match self.write_and_verify(&path, image) {
            Ok(()) => {
                log::debug!("Published explanation image {} ({} bytes)", id, image.png.len());
                Ok(PublishedImage {
                    id,
                    path,
                    width: image.width,
                    height: image.height,
                    bytes: image.png.len(),
                    published_at: Utc::now(),
                })
            }
            Err(reason) => {
                // Never leave a stale or broken image behind
                if let Err(e) = fs::remove_file(&path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        log::warn!("Could not remove {}: {}", path.display(), e);
                    }
                }
                log::error!("Image publish failed at {}: {}", path.display(), reason);
                Err(RiskError::image_persist(path, reason))
            }
        }
    }

    fn write_and_verify(&self, path: &Path, image: &ExplanationImage) -> Result<(), String> {
        let tmp_path = self
            .dir
            .join(format!(".{}.tmp", Uuid::new_v4().simple()));

        let written = write_file(&tmp_path, &image.png).and_then(|_| {
            fs::rename(&tmp_path, path).map_err(|e| format!("rename failed: {}", e))
        });
        if let Err(reason) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(reason);
        }

        let (width, height) = verify_png(path)?;
        if (width, height) != (image.width, image.height) {
            return Err(format!(
                "decoded image is {}x{}, expected {}x{}",
                width, height, image.width, image.height
            ));
        }
        Ok(())
    }

    /// Path of a published image, if `id` is one this store could have produced
    pub fn resolve(&self, id: &str) -> Option<PathBuf> {
        let valid = match &self.naming {
            ImageNaming::PerRequest => Uuid::parse_str(id).is_ok(),
            ImageNaming::Fixed(name) => id == name,
        };
        if !valid {
            return None;
        }
        let path = self.path_for(id);
        path.is_file().then_some(path)
    }

    /// Delete per-request images older than `ttl`; returns how many were removed
    pub fn sweep_expired(&self, ttl: Duration) -> usize {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Sweep skipped, cannot read {}: {}", self.dir.display(), e);
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let is_ours = path.extension().and_then(|e| e.to_str()) == Some(IMAGE_EXTENSION)
                && path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(|s| Uuid::parse_str(s).is_ok())
                    .unwrap_or(false);
            if !is_ours {
                continue;
            }

            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or(Duration::ZERO);
            if age >= ttl && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            log::debug!("Swept {} expired explanation images", removed);
        }
        removed
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), String> {
    let mut file = fs::File::create(path).map_err(|e| format!("create failed: {}", e))?;
    file.write_all(bytes)
        .map_err(|e| format!("write failed: {}", e))?;
    file.sync_all().map_err(|e| format!("sync failed: {}", e))
}

/// Reopen a file from disk and fully decode it as PNG
pub fn verify_png(path: &Path) -> Result<(u32, u32), String> {
    let bytes = fs::read(path).map_err(|e| format!("reopen failed: {}", e))?;
    let decoded = image::load_from_memory_with_format(&bytes, image::ImageFormat::Png)
        .map_err(|e| format!("decode failed: {}", e))?;
    Ok((decoded.width(), decoded.height()))
}

fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
