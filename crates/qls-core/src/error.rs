//! Error taxonomy shared by every QLS entry point.
//!
//! Four failure kinds surface to callers:
//! - [`QlsError::DataFormat`]: malformed uploads, wrong array shapes, bad CSV rows.
//! - [`QlsError::Configuration`]: invalid normalization bounds, unreadable
//!   artifacts or metadata. Fatal at startup.
//! - [`QlsError::Inference`]: the pipeline cannot evaluate an input.
//! - [`QlsError::Io`]: file system failures with the offending path attached.
//!
//! Unseen topologies are not errors; see [`crate::encoding::UnknownCategoryWarning`].

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, QlsError>;

#[derive(Debug, Error)]
pub enum QlsError {
    #[error("data format error: {0}")]
    DataFormat(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Stable machine-readable label for each error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DataFormat,
    Configuration,
    Inference,
    Io,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DataFormat => "data_format",
            Self::Configuration => "configuration",
            Self::Inference => "inference",
            Self::Io => "io",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl QlsError {
    pub fn data_format(msg: impl Into<String>) -> Self {
        Self::DataFormat(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DataFormat(_) => ErrorKind::DataFormat,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Inference(_) => ErrorKind::Inference,
            Self::Io { .. } => ErrorKind::Io,
        }
    }
}
