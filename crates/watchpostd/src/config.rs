use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_LABEL_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Distance metric used to compare probes with the gallery.
///
/// ArcFace embeddings are L2-normalized, so a Euclidean distance `d` equals
/// a cosine similarity of `1 - d^2 / 2`. The 0.45 default therefore only
/// accepts similarity above about 0.9, far stricter than typical ArcFace
/// operating points; `cosine` with a threshold around 0.6 to 0.7 (cosine
/// distance) is the usual choice for these models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherKind {
    Euclidean,
    Cosine,
}

impl FromStr for MatcherKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euclidean" => Ok(Self::Euclidean),
            "cosine" => Ok(Self::Cosine),
            other => Err(ConfigError::Invalid(format!("unknown matcher {other:?}"))),
        }
    }
}

/// Daemon configuration.
///
/// Loaded from an optional TOML file named by `WATCHPOST_CONFIG`, then
/// overridden by `WATCHPOST_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// URL that returns one JPEG still per GET.
    pub camera_url: String,
    /// Camera request timeout in milliseconds (0 = transport default).
    pub camera_timeout_ms: u64,
    /// Telegram bot token; alerts are disabled unless both token and chat id are set.
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    /// A probe matches when its nearest gallery distance is below this value.
    ///
    /// The 0.45 default was tuned for 128-d dlib Euclidean distances. On the
    /// normalized 512-d ArcFace embeddings used here it rejects most genuine
    /// matches; retune it, or switch `matcher` to `cosine`, for real use.
    pub match_threshold: f32,
    pub matcher: MatcherKind,
    /// Delay between processed frames.
    pub poll_delay_ms: u64,
    /// Delay before retrying after a failed frame fetch.
    pub retry_delay_ms: u64,
    /// Downscale factor applied before face detection.
    pub detect_scale: f32,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Reference images of known identities.
    pub gallery_dir: PathBuf,
    /// Annotated snapshots of unrecognized faces.
    pub intruder_dir: PathBuf,
    /// Latest annotated frame, rewritten every processed iteration.
    pub live_view_path: PathBuf,
    /// TrueType font for box labels.
    pub label_font: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();
        let label_font = Path::new(DEFAULT_LABEL_FONT)
            .exists()
            .then(|| PathBuf::from(DEFAULT_LABEL_FONT));

        Self {
            camera_url: "http://esp32cam.local/cam-hi.jpg".to_string(),
            camera_timeout_ms: 0,
            bot_token: None,
            chat_id: None,
            match_threshold: 0.45,
            matcher: MatcherKind::Euclidean,
            poll_delay_ms: 10,
            retry_delay_ms: 100,
            detect_scale: 0.25,
            model_dir: data_dir.join("models"),
            gallery_dir: data_dir.join("image_folder"),
            intruder_dir: data_dir.join("intruder_images"),
            live_view_path: data_dir.join("live.jpg"),
            label_font,
        }
    }
}

impl Config {
    /// Load from `WATCHPOST_CONFIG` (if set) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("WATCHPOST_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loading config file");
        Ok(toml::from_str(&text)?)
    }

    /// Apply `WATCHPOST_*` overrides from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let var = |name: &str| lookup(&format!("WATCHPOST_{name}")).filter(|v| !v.is_empty());

        if let Some(v) = var("CAMERA_URL") {
            self.camera_url = v;
        }
        if let Some(v) = var("CAMERA_TIMEOUT_MS") {
            self.camera_timeout_ms = parse("CAMERA_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = var("BOT_TOKEN") {
            self.bot_token = Some(v);
        }
        if let Some(v) = var("CHAT_ID") {
            self.chat_id = Some(v);
        }
        if let Some(v) = var("MATCH_THRESHOLD") {
            self.match_threshold = parse("MATCH_THRESHOLD", &v)?;
        }
        if let Some(v) = var("MATCHER") {
            self.matcher = v.parse()?;
        }
        if let Some(v) = var("POLL_DELAY_MS") {
            self.poll_delay_ms = parse("POLL_DELAY_MS", &v)?;
        }
        if let Some(v) = var("RETRY_DELAY_MS") {
            self.retry_delay_ms = parse("RETRY_DELAY_MS", &v)?;
        }
        if let Some(v) = var("DETECT_SCALE") {
            self.detect_scale = parse("DETECT_SCALE", &v)?;
        }
        if let Some(v) = var("MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = var("GALLERY_DIR") {
            self.gallery_dir = PathBuf::from(v);
        }
        if let Some(v) = var("INTRUDER_DIR") {
            self.intruder_dir = PathBuf::from(v);
        }
        if let Some(v) = var("LIVE_VIEW_PATH") {
            self.live_view_path = PathBuf::from(v);
        }
        if let Some(v) = var("LABEL_FONT") {
            self.label_font = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera_url.trim().is_empty() {
            return Err(ConfigError::Invalid("camera_url must not be empty".into()));
        }
        if !(self.match_threshold.is_finite() && self.match_threshold > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "match_threshold must be a positive number, got {}",
                self.match_threshold
            )));
        }
        if !(self.detect_scale > 0.0 && self.detect_scale <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "detect_scale must be in (0, 1], got {}",
                self.detect_scale
            )));
        }
        Ok(())
    }

    /// Bot credentials, when both halves are configured.
    pub fn telegram_credentials(&self) -> Option<(&str, &str)> {
        match (self.bot_token.as_deref(), self.chat_id.as_deref()) {
            (Some(token), Some(chat)) => Some((token, chat)),
            _ => None,
        }
    }

    pub fn camera_timeout(&self) -> Option<Duration> {
        (self.camera_timeout_ms > 0).then(|| Duration::from_millis(self.camera_timeout_ms))
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> PathBuf {
        self.model_dir.join("w600k_r50.onnx")
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("watchpost")
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("WATCHPOST_{name}: cannot parse {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_reference_behavior() {
        let config = Config::default();
        assert_eq!(config.match_threshold, 0.45);
        assert_eq!(config.poll_delay(), Duration::from_millis(10));
        assert_eq!(config.retry_delay(), Duration::from_millis(100));
        assert_eq!(config.detect_scale, 0.25);
        assert_eq!(config.matcher, MatcherKind::Euclidean);
        assert!(config.camera_timeout().is_none());
        assert!(config.telegram_credentials().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("WATCHPOST_CAMERA_URL", "http://10.0.0.7/cam-hi.jpg"),
                ("WATCHPOST_MATCH_THRESHOLD", "0.6"),
                ("WATCHPOST_MATCHER", "Cosine"),
                ("WATCHPOST_RETRY_DELAY_MS", "250"),
                ("WATCHPOST_BOT_TOKEN", "123:ABC"),
                ("WATCHPOST_CHAT_ID", "42"),
                ("WATCHPOST_GALLERY_DIR", "/srv/faces"),
                ("WATCHPOST_LABEL_FONT", ""),
            ]))
            .unwrap();

        assert_eq!(config.camera_url, "http://10.0.0.7/cam-hi.jpg");
        assert_eq!(config.match_threshold, 0.6);
        assert_eq!(config.matcher, MatcherKind::Cosine);
        assert_eq!(config.retry_delay(), Duration::from_millis(250));
        assert_eq!(config.telegram_credentials(), Some(("123:ABC", "42")));
        assert_eq!(config.gallery_dir, PathBuf::from("/srv/faces"));
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("WATCHPOST_POLL_DELAY_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_toml_file_with_partial_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchpost.toml");
        std::fs::write(
            &path,
            "camera_url = \"http://cam/still.jpg\"\nmatch_threshold = 0.5\nmatcher = \"cosine\"\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.camera_url, "http://cam/still.jpg");
        assert_eq!(config.match_threshold, 0.5);
        assert_eq!(config.matcher, MatcherKind::Cosine);
        assert_eq!(config.poll_delay_ms, 10);
    }

    #[test]
    fn test_validate_rejects_bad_scale() {
        let config = Config {
            detect_scale: 0.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_model_paths() {
        let config = Config {
            model_dir: PathBuf::from("/opt/models"),
            ..Config::default()
        };
        assert_eq!(config.scrfd_model_path(), PathBuf::from("/opt/models/det_10g.onnx"));
        assert_eq!(config.arcface_model_path(), PathBuf::from("/opt/models/w600k_r50.onnx"));
    }
}
