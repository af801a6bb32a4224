//! Service configuration, read from an optional JSON file.
//!
//! Every field has a default, so `{}` is a valid config. Command-line flags
//! override file values after loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::archive::DEFAULT_MAX_INFLATED_BYTES;
use crate::error::{QlsError, Result};
use crate::scale::{DEFAULT_SCORE_HALF_WIDTH, DEFAULT_SCORE_MAX, DEFAULT_SCORE_MIN, ScoreScale};
use crate::score::Scorer;
use crate::session::{DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_IDLE, SessionLimits};
use crate::train::{METADATA_FILE, MODEL_FILE};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub model_path: PathBuf,
    pub metadata_path: PathBuf,
    pub score_min: f64,
    pub score_max: f64,
    pub score_half_width: f64,
    pub max_upload_bytes: usize,
    /// Ceiling on the decompressed size of one `.npz` upload.
    pub max_inflated_bytes: usize,
    pub max_sessions: usize,
    /// Idle seconds before a session expires; 0 disables expiry.
    pub session_idle_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(MODEL_FILE),
            metadata_path: PathBuf::from(METADATA_FILE),
            score_min: DEFAULT_SCORE_MIN,
            score_max: DEFAULT_SCORE_MAX,
            score_half_width: DEFAULT_SCORE_HALF_WIDTH,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_inflated_bytes: DEFAULT_MAX_INFLATED_BYTES,
            max_sessions: DEFAULT_MAX_SESSIONS,
            session_idle_secs: DEFAULT_SESSION_IDLE.as_secs(),
        }
    }
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| QlsError::io(path, e))?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            QlsError::configuration(format!("{}: malformed config: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.scorer()?;
        for (name, value) in [
            ("max_upload_bytes", self.max_upload_bytes),
            ("max_inflated_bytes", self.max_inflated_bytes),
            ("max_sessions", self.max_sessions),
        ] {
            if value == 0 {
                return Err(QlsError::configuration(format!("{name} must be positive")));
            }
        }
        Ok(())
    }

    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            max_sessions: self.max_sessions,
            idle_ttl: (self.session_idle_secs > 0)
                .then(|| Duration::from_secs(self.session_idle_secs)),
        }
    }

    /// Build the scorer for these bounds and half-width.
    pub fn scorer(&self) -> Result<Scorer> {
        Scorer::new(
            ScoreScale::new(self.score_min, self.score_max)?,
            self.score_half_width,
        )
    }
}
