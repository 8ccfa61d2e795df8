//! Intruder notifications.

use reqwest::blocking::multipart::Form;
use std::path::Path;
use thiserror::Error;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("cannot attach {path}: {source}")]
    Attach {
        path: String,
        source: std::io::Error,
    },
    #[error("upload failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Destination for intruder snapshots.
///
/// Delivery is fire-and-forget: implementations log failures and never retry.
pub trait AlertSink {
    fn send_alert(&self, image_path: &Path);
}

/// Sends the snapshot to a Telegram chat through the bot `sendPhoto` method.
pub struct TelegramAlert {
    client: reqwest::blocking::Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramAlert {
    pub fn new(bot_token: &str, chat_id: impl Into<String>) -> Result<Self, AlertError> {
        Self::with_api_base(TELEGRAM_API_BASE, bot_token, chat_id)
    }

    /// Same as [`new`](Self::new) against a different Bot API server.
    pub fn with_api_base(
        api_base: &str,
        bot_token: &str,
        chat_id: impl Into<String>,
    ) -> Result<Self, AlertError> {
        Ok(Self {
            client: reqwest::blocking::Client::builder().build()?,
            endpoint: format!("{}/bot{bot_token}/sendPhoto", api_base.trim_end_matches('/')),
            chat_id: chat_id.into(),
        })
    }

    fn upload(&self, image_path: &Path) -> Result<reqwest::StatusCode, AlertError> {
        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .file("photo", image_path)
            .map_err(|source| AlertError::Attach {
                path: image_path.display().to_string(),
                source,
            })?;
        let response = self.client.post(&self.endpoint).multipart(form).send()?;
        Ok(response.status())
    }
}

impl AlertSink for TelegramAlert {
    fn send_alert(&self, image_path: &Path) {
        match self.upload(image_path) {
            Ok(status) => {
                tracing::debug!(path = %image_path.display(), %status, "alert uploaded");
            }
            Err(e) => {
                tracing::warn!(path = %image_path.display(), error = %e, "alert upload failed");
            }
        }
    }
}

/// Sink used when no notification channel is configured.
pub struct NullAlert;

impl AlertSink for NullAlert {
    fn send_alert(&self, image_path: &Path) {
        tracing::debug!(path = %image_path.display(), "no alert channel configured; snapshot kept locally");
    }
}
