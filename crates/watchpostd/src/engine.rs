use crate::config::{Config, MatcherKind};
use crate::surveillance::{
    Enrolled, LoopSettings, ReferenceSource, Stats, Surveillance, SurveillanceError, Tick,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use watchpost_core::{CosineMatcher, EuclideanMatcher, Matcher, OnnxFaceEncoder};
use watchpost_io::{AlertSink, Annotator, GalleryStore, HttpCamera, IntruderStore, NullAlert, TelegramAlert};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] watchpost_io::CameraError),
    #[error("encoder error: {0}")]
    Encoder(#[from] watchpost_core::EncoderError),
    #[error("alert setup failed: {0}")]
    Alert(#[from] watchpost_io::alert::AlertError),
    #[error(transparent)]
    Surveillance(#[from] SurveillanceError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

impl From<watchpost_io::StoreError> for EngineError {
    fn from(e: watchpost_io::StoreError) -> Self {
        EngineError::Surveillance(e.into())
    }
}

/// Snapshot of the engine for `Status`.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub identities: usize,
    pub intruder_dir: PathBuf,
    #[serde(flatten)]
    pub stats: Stats,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Start {
        reply: oneshot::Sender<bool>,
    },
    Stop {
        reply: oneshot::Sender<bool>,
    },
    AddIdentity {
        name: String,
        source: ReferenceSource,
        reply: oneshot::Sender<Result<Enrolled, EngineError>>,
    },
    RemoveIdentity {
        name: String,
        reply: oneshot::Sender<Result<PathBuf, EngineError>>,
    },
    ListIdentities {
        reply: oneshot::Sender<Vec<String>>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Idle → Running. Returns false if surveillance was already running.
    pub async fn start(&self) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::Start { reply }).await
    }

    /// Running → Idle, effective at the next iteration boundary.
    pub async fn stop(&self) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::Stop { reply }).await
    }

    /// Save a new reference image and rebuild the gallery.
    pub async fn add_identity(
        &self,
        name: String,
        source: ReferenceSource,
    ) -> Result<Enrolled, EngineError> {
        self.request(|reply| EngineRequest::AddIdentity { name, source, reply })
            .await?
    }

    /// Delete a reference image and rebuild the gallery.
    pub async fn remove_identity(&self, name: String) -> Result<PathBuf, EngineError> {
        self.request(|reply| EngineRequest::RemoveIdentity { name, reply })
            .await?
    }

    pub async fn list_identities(&self) -> Result<Vec<String>, EngineError> {
        self.request(|reply| EngineRequest::ListIdentities { reply }).await
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        self.request(|reply| EngineRequest::Status { reply }).await
    }
}

/// Assemble the production pipeline from configuration.
///
/// Must run on the engine thread: the blocking HTTP clients cannot be
/// created inside the async runtime.
pub fn build_surveillance(config: &Config) -> Result<Surveillance, EngineError> {
    let camera = HttpCamera::new(config.camera_url.clone(), config.camera_timeout())?;

    let encoder = OnnxFaceEncoder::load(&config.scrfd_model_path(), &config.arcface_model_path())?;
    tracing::info!(dir = %config.model_dir.display(), "face models loaded");

    let matcher: Box<dyn Matcher> = match config.matcher {
        MatcherKind::Euclidean => Box::new(EuclideanMatcher),
        MatcherKind::Cosine => Box::new(CosineMatcher),
    };

    let alert: Box<dyn AlertSink> = match config.telegram_credentials() {
        Some((token, chat_id)) => {
            tracing::info!(chat_id, "telegram alerts enabled");
            Box::new(TelegramAlert::new(token, chat_id)?)
        }
        None => {
            tracing::warn!("no bot token/chat id configured; intruder alerts stay local");
            Box::new(NullAlert)
        }
    };

    let settings = LoopSettings {
        match_threshold: config.match_threshold,
        detect_scale: config.detect_scale,
        poll_delay: config.poll_delay(),
        retry_delay: config.retry_delay(),
    };

    let annotator = Annotator::new(config.label_font.as_deref());
    if !annotator.has_font() {
        tracing::warn!("no label font available; boxes are drawn without names");
    }

    let mut surveillance = Surveillance::new(
        Box::new(camera),
        Box::new(encoder),
        matcher,
        alert,
        GalleryStore::open(&config.gallery_dir)?,
        IntruderStore::open(&config.intruder_dir)?,
        annotator,
        settings,
    )
    .with_live_view(&config.live_view_path);

    let identities = surveillance.rebuild_gallery()?;
    tracing::info!(identities, dir = %config.gallery_dir.display(), "gallery loaded");

    Ok(surveillance)
}

/// Spawn the engine on a dedicated OS thread.
///
/// `build` runs on that thread and must produce the pipeline; a build
/// failure is returned here and the thread exits (fail-fast startup).
pub async fn spawn_engine<F>(build: F) -> Result<EngineHandle, EngineError>
where
    F: FnOnce() -> Result<Surveillance, EngineError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<EngineRequest>(8);
    let (ready_tx, ready_rx) = oneshot::channel::<Result<(), EngineError>>();

    std::thread::Builder::new()
        .name("watchpost-engine".into())
        .spawn(move || match build() {
            Ok(surveillance) => {
                let _ = ready_tx.send(Ok(()));
                run(surveillance, rx);
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
            }
        })
        .map_err(EngineError::Spawn)?;

    ready_rx.await.map_err(|_| EngineError::ChannelClosed)??;
    Ok(EngineHandle { tx })
}

/// Engine thread body: serve requests between iterations.
///
/// While idle the thread blocks on the request channel; while running it
/// drains pending requests, runs one iteration, then sleeps for the delay
/// the iteration asked for.
fn run(mut surveillance: Surveillance, mut rx: mpsc::Receiver<EngineRequest>) {
    tracing::info!("engine thread started");

    loop {
        let request = if surveillance.is_running() {
            match rx.try_recv() {
                Ok(req) => Some(req),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break,
            }
        } else {
            match rx.blocking_recv() {
                Some(req) => Some(req),
                None => break,
            }
        };

        if let Some(req) = request {
            handle(&mut surveillance, req);
            continue;
        }

        let Some(token) = surveillance.token() else {
            continue;
        };
        match surveillance.tick(&token) {
            Tick::Cancelled => {}
            Tick::Retry(delay) => std::thread::sleep(delay),
            Tick::Processed { report, next } => {
                if !report.labels.is_empty() {
                    tracing::debug!(labels = ?report.labels, intruders = report.intruders.len(), "frame processed");
                }
                std::thread::sleep(next);
            }
        }
    }

    surveillance.stop();
    tracing::info!("engine thread exiting");
}

fn handle(surveillance: &mut Surveillance, req: EngineRequest) {
    match req {
        EngineRequest::Start { reply } => {
            let _ = reply.send(surveillance.start());
        }
        EngineRequest::Stop { reply } => {
            let _ = reply.send(surveillance.stop());
        }
        EngineRequest::AddIdentity { name, source, reply } => {
            let result = surveillance.add_identity(&name, &source).map_err(EngineError::from);
            let _ = reply.send(result);
        }
        EngineRequest::RemoveIdentity { name, reply } => {
            let result = surveillance.remove_identity(&name).map_err(EngineError::from);
            let _ = reply.send(result);
        }
        EngineRequest::ListIdentities { reply } => {
            let _ = reply.send(surveillance.gallery().names());
        }
        EngineRequest::Status { reply } => {
            let _ = reply.send(EngineStatus {
                running: surveillance.is_running(),
                identities: surveillance.gallery().len(),
                intruder_dir: surveillance.intruder_dir().to_path_buf(),
                stats: surveillance.stats().clone(),
            });
        }
    }
}
