//! Flat-file image stores: known-identity gallery and intruder snapshots.

use crate::frame::{self, FrameError};
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const GALLERY_EXTENSIONS: [&str; 2] = ["jpg", "png"];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] FrameError),
    #[error("username cannot be empty")]
    EmptyName,
    #[error("invalid username: {0:?}")]
    InvalidName(String),
    #[error("no image found for user '{0}'")]
    NotFound(String),
}

/// Display label for a gallery file stem: alphabetic characters only,
/// first upper-cased and the rest lower-cased (`john1` → `John`).
pub fn identity_name(stem: &str) -> String {
    let mut letters = stem.chars().filter(|c| c.is_alphabetic());
    match letters.next() {
        Some(first) => first
            .to_uppercase()
            .chain(letters.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

fn validate_name(name: &str) -> Result<&str, StoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::EmptyName);
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(name)
}

fn is_gallery_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| GALLERY_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Directory of reference images, one file per known identity.
pub struct GalleryStore {
    dir: PathBuf,
}

impl GalleryStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Gallery image paths in filename order.
    fn image_paths(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if is_gallery_image(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Number of reference images currently in the store.
    pub fn count(&self) -> Result<usize, StoreError> {
        Ok(self.image_paths()?.len())
    }

    /// Read every reference image as `(identity name, pixels)`.
    ///
    /// Files that fail to decode are skipped.
    pub fn load(&self) -> Result<Vec<(String, RgbImage)>, StoreError> {
        let mut references = Vec::new();
        for path in self.image_paths()? {
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            let name = identity_name(stem);
            match image::open(&path) {
                Ok(image) => references.push((name, image.to_rgb8())),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable gallery image");
                }
            }
        }
        tracing::debug!(dir = %self.dir.display(), count = references.len(), "gallery store loaded");
        Ok(references)
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.jpg"))
    }

    /// Save `image` as `<name>.jpg`, overwriting any previous image of that name.
    pub fn save(&self, name: &str, image: &RgbImage) -> Result<PathBuf, StoreError> {
        let name = validate_name(name)?;
        let path = self.path_for(name);
        frame::save_jpeg(image, &path)?;
        tracing::info!(name, path = %path.display(), "reference image saved");
        Ok(path)
    }

    /// Copy an existing image file into the store as `<name>.jpg`.
    pub fn import(&self, name: &str, source: &Path) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        let image = image::open(source)
            .map_err(|e| StoreError::Image(FrameError::Image(e)))?
            .to_rgb8();
        self.save(name, &image)
    }

    /// Delete `<name>.jpg`.
    pub fn remove(&self, name: &str) -> Result<PathBuf, StoreError> {
        let name = validate_name(name)?;
        let path = self.path_for(name);
        if !path.is_file() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        fs::remove_file(&path)?;
        tracing::info!(name, path = %path.display(), "reference image removed");
        Ok(path)
    }
}

/// Append-only directory of annotated snapshots of unrecognized faces.
pub struct IntruderStore {
    dir: PathBuf,
}

impl IntruderStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `intruder_<unix_timestamp>.jpg`; snapshots in the same second share a path.
    pub fn path_for(&self, at: chrono::DateTime<chrono::Utc>) -> PathBuf {
        self.dir.join(format!("intruder_{}.jpg", at.timestamp()))
    }

    /// Write a snapshot taken at `at` and return its path.
    pub fn record(
        &self,
        image: &RgbImage,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<PathBuf, StoreError> {
        let path = self.path_for(at);
        frame::save_jpeg(image, &path)?;
        tracing::info!(path = %path.display(), "intruder snapshot saved");
        Ok(path)
    }
}
