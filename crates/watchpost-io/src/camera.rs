//! Still-frame polling from a networked camera.

use crate::frame::{Frame, FrameError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("camera returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("frame decode failed: {0}")]
    Decode(#[from] FrameError),
}

/// Anything that can hand out one still frame on demand.
pub trait FrameSource {
    fn fetch_frame(&mut self) -> Result<Frame, CameraError>;
}

/// Camera that serves a JPEG still on every HTTP GET (e.g. ESP32-CAM `/cam-hi.jpg`).
pub struct HttpCamera {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpCamera {
    /// Build a camera client for `url`.
    ///
    /// `timeout` of `None` keeps the transport default.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, CameraError> {
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let url = url.into();
        tracing::info!(url = %url, ?timeout, "http camera configured");
        Ok(Self {
            client: builder.build()?,
            url,
        })
    }
}

impl FrameSource for HttpCamera {
    fn fetch_frame(&mut self) -> Result<Frame, CameraError> {
        let response = self.client.get(&self.url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(CameraError::Status(status));
        }
        let bytes = response.bytes()?;
        tracing::trace!(len = bytes.len(), "frame received");
        Ok(Frame::decode(&bytes)?)
    }
}
