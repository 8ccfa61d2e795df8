//! The per-frame recognition and alerting loop.
//!
//! `Surveillance` owns every component of the pipeline and is driven one
//! iteration at a time by the engine thread. Nothing here is shared across
//! threads.

use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use watchpost_core::{FaceEncoder, Gallery, Matcher};
use watchpost_io::frame::{self, INTRUDER_COLOR, KNOWN_COLOR};
use watchpost_io::{AlertSink, Annotator, CameraError, FrameSource, GalleryStore, IntruderStore, StoreError};

/// Label drawn on unrecognized faces.
pub const INTRUDER_LABEL: &str = "Intruder";

#[derive(Debug, thiserror::Error)]
pub enum SurveillanceError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
}

/// Tunables for one iteration.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub match_threshold: f32,
    pub detect_scale: f32,
    pub poll_delay: Duration,
    pub retry_delay: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            match_threshold: 0.45,
            detect_scale: 0.25,
            poll_delay: Duration::from_millis(10),
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// What one iteration did, and how long to wait before the next.
#[derive(Debug)]
pub enum Tick {
    /// The token was cancelled before any work started.
    Cancelled,
    /// The frame could not be fetched or decoded.
    Retry(Duration),
    Processed { report: FrameReport, next: Duration },
}

/// Outcome of one processed frame.
#[derive(Debug, Default)]
pub struct FrameReport {
    /// Label drawn for each detection, in detection order.
    pub labels: Vec<String>,
    /// Intruder snapshots written (and alerted) during this frame.
    pub intruders: Vec<PathBuf>,
}

/// Where a new reference image comes from.
#[derive(Debug, Clone)]
pub enum ReferenceSource {
    /// Grab the current camera frame.
    Camera,
    /// Import an existing image file.
    File(PathBuf),
}

/// Result of enrolling a new identity.
#[derive(Debug, Clone, Serialize)]
pub struct Enrolled {
    pub path: PathBuf,
    /// Display label derived from the saved filename.
    pub label: String,
    /// Whether a face was found in the saved image.
    pub encoded: bool,
}

/// Counters surfaced through `Status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    pub frames_processed: u64,
    pub fetch_failures: u64,
    pub faces_detected: u64,
    pub intruders_recorded: u64,
}

/// Surveillance state machine: Idle until started, Running until stopped.
pub struct Surveillance {
    source: Box<dyn FrameSource>,
    encoder: Box<dyn FaceEncoder>,
    matcher: Box<dyn Matcher>,
    alert: Box<dyn AlertSink>,
    gallery_store: GalleryStore,
    intruders: IntruderStore,
    annotator: Annotator,
    live_view: Option<PathBuf>,
    settings: LoopSettings,
    gallery: Gallery,
    running: Option<CancellationToken>,
    stats: Stats,
}

impl Surveillance {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Box<dyn FrameSource>,
        encoder: Box<dyn FaceEncoder>,
        matcher: Box<dyn Matcher>,
        alert: Box<dyn AlertSink>,
        gallery_store: GalleryStore,
        intruders: IntruderStore,
        annotator: Annotator,
        settings: LoopSettings,
    ) -> Self {
        Self {
            source,
            encoder,
            matcher,
            alert,
            gallery_store,
            intruders,
            annotator,
            live_view: None,
            settings,
            gallery: Gallery::default(),
            running: None,
            stats: Stats::default(),
        }
    }

    /// Also write every annotated frame to `path`.
    pub fn with_live_view(mut self, path: impl Into<PathBuf>) -> Self {
        self.live_view = Some(path.into());
        self
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn intruder_dir(&self) -> &Path {
        self.intruders.dir()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Token of the current run, if running.
    pub fn token(&self) -> Option<CancellationToken> {
        self.running.clone()
    }

    /// Re-read and re-encode the whole gallery store.
    pub fn rebuild_gallery(&mut self) -> Result<usize, SurveillanceError> {
        let references = self.gallery_store.load()?;
        self.gallery = Gallery::build(self.encoder.as_mut(), references);
        Ok(self.gallery.len())
    }

    /// Idle → Running. Returns false if already running.
    pub fn start(&mut self) -> bool {
        if self.running.is_some() {
            return false;
        }
        if let Some(path) = &self.live_view {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to clear live view"),
            }
        }
        self.running = Some(CancellationToken::new());
        tracing::info!(identities = self.gallery.len(), "surveillance started");
        true
    }

    /// Running → Idle. Returns false if already idle.
    pub fn stop(&mut self) -> bool {
        match self.running.take() {
            Some(token) => {
                token.cancel();
                tracing::info!("surveillance stopped");
                true
            }
            None => false,
        }
    }

    /// Run one iteration: fetch, detect, match, annotate, and record/alert on
    /// every unrecognized face.
    ///
    /// Cancellation is only observed here, before any work starts.
    pub fn tick(&mut self, token: &CancellationToken) -> Tick {
        if token.is_cancelled() {
            return Tick::Cancelled;
        }

        let frame = match self.source.fetch_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.fetch_failures += 1;
                tracing::warn!(error = %e, "failed to load frame from camera");
                return Tick::Retry(self.settings.retry_delay);
            }
        };

        let small = frame.downscale(self.settings.detect_scale);
        let detections = self.encoder.detect_and_encode(&small).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "face encoding failed; frame skipped");
            Vec::new()
        });

        let upscale = 1.0 / self.settings.detect_scale;
        let captured_at = frame.captured_at;
        let mut image = frame.image;
        let mut report = FrameReport::default();

        for detection in &detections {
            let result = self.gallery.identify(
                self.matcher.as_ref(),
                &detection.embedding,
                self.settings.match_threshold,
            );
            let bbox = detection.bbox.scaled(upscale);

            let (label, color) = match result.name() {
                Some(name) => (name.to_string(), KNOWN_COLOR),
                None => (INTRUDER_LABEL.to_string(), INTRUDER_COLOR),
            };
            tracing::debug!(label = %label, distance = result.distance, "face classified");
            self.annotator.draw(&mut image, &bbox, &label, color);

            if !result.is_known() {
                if let Some(path) = self.record_intruder(&image, captured_at) {
                    report.intruders.push(path);
                }
            }
            report.labels.push(label);
        }

        self.stats.frames_processed += 1;
        self.stats.faces_detected += detections.len() as u64;
        self.write_live_view(&image);

        Tick::Processed {
            report,
            next: self.settings.poll_delay,
        }
    }

    /// Persist the annotated frame and alert on it before returning.
    fn record_intruder(
        &mut self,
        image: &RgbImage,
        captured_at: DateTime<Utc>,
    ) -> Option<PathBuf> {
        match self.intruders.record(image, captured_at) {
            Ok(path) => {
                self.stats.intruders_recorded += 1;
                self.alert.send_alert(&path);
                Some(path)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to save intruder snapshot");
                None
            }
        }
    }

    fn write_live_view(&self, image: &RgbImage) {
        let Some(path) = &self.live_view else {
            return;
        };
        let tmp = path.with_extension("jpg.part");
        let result = frame::save_jpeg(image, &tmp)
            .map_err(|e| e.to_string())
            .and_then(|()| std::fs::rename(&tmp, path).map_err(|e| e.to_string()));
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "failed to update live view");
        }
    }

    /// Save a reference image as `<name>.jpg`, then rebuild the gallery.
    pub fn add_identity(
        &mut self,
        name: &str,
        source: &ReferenceSource,
    ) -> Result<Enrolled, SurveillanceError> {
        if name.trim().is_empty() {
            return Err(StoreError::EmptyName.into());
        }

        let path = match source {
            ReferenceSource::Camera => {
                let frame = self.source.fetch_frame()?;
                self.gallery_store.save(name, &frame.image)?
            }
            ReferenceSource::File(file) => self.gallery_store.import(name, file)?,
        };

        self.rebuild_gallery()?;

        let label = watchpost_io::store::identity_name(name.trim());
        let encoded = self.has_face(&path);
        if !encoded {
            tracing::warn!(name, "no face found in new reference image");
        }
        tracing::info!(name, label = %label, encoded, "identity added");
        Ok(Enrolled { path, label, encoded })
    }

    /// Whether the encoder finds a face in the stored reference at `path`.
    ///
    /// Labels are not unique (`john1` and `john2` are both "John"), so the
    /// saved file itself is checked rather than the gallery names.
    fn has_face(&mut self, path: &Path) -> bool {
        let image = match image::open(path) {
            Ok(image) => image.to_rgb8(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot re-read reference image");
                return false;
            }
        };
        match self.encoder.detect_and_encode(&image) {
            Ok(detections) => !detections.is_empty(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to encode reference image");
                false
            }
        }
    }

    /// Delete `<name>.jpg`, then rebuild the gallery.
    pub fn remove_identity(&mut self, name: &str) -> Result<PathBuf, SurveillanceError> {
        let path = self.gallery_store.remove(name)?;
        self.rebuild_gallery()?;
        tracing::info!(name, "identity removed");
        Ok(path)
    }
}
