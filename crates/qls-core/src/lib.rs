//! # qls-core
//!
//! **Quantum Life Score: from density matrices and physical parameters to a
//! score with an interval.**
//!
//! Two paths share one output shape (point estimate, interval, auxiliary
//! info):
//!
//! - **Scoring**: `.npz`/`.npy` upload → density matrices → mean tr(ρ·ρ†) →
//!   normalized into [0, 1] → fixed ±w interval clamped to [0, 1].
//! - **Prediction**: `{topology, J, gamma, sigma}` → one-hot encoder →
//!   boosted regression trees → point estimate ± the session's half-width.
//!
//! ## Quick Start
//!
//! ```no_run
//! use qls_core::{ParameterRecord, Predictor, SessionStore};
//! use std::path::Path;
//!
//! let predictor = Predictor::load(Path::new("model.json"), Path::new("metadata.json"))?;
//! let sessions = SessionStore::new(predictor.metadata().conformal_width_90);
//! let session = sessions.create();
//!
//! let record = ParameterRecord::new("ring", 0.2, 0.02, 0.04);
//! let out = predictor.predict(&record, &session.calibration)?;
//! println!("{:.3} in [{:.3}, {:.3}]", out.prediction, out.interval.lo, out.interval.hi);
//! # Ok::<(), qls_core::QlsError>(())
//! ```
//!
//! ## Calibration
//!
//! The stored half-width (`conformal_width_90`) is the 90th percentile of
//! absolute residuals on a held-out split at training time. A session can
//! recalibrate against its own reference CSV; the new width lives only in
//! that session's [`SessionCalibration`].

pub mod archive;
pub mod calibration;
pub mod config;
pub mod dataset;
pub mod encoding;
pub mod error;
pub mod matrix;
pub mod metadata;
pub mod model;
pub mod npy;
pub mod params;
pub mod pipeline;
pub mod predictor;
pub mod scale;
pub mod score;
pub mod session;
pub mod train;

pub use archive::{load_samples, load_samples_limited};
pub use calibration::{CalibrationSource, Recalibration, quantile, recalibrate};
pub use config::ServiceConfig;
pub use dataset::{Dataset, DatasetRow};
pub use encoding::{OneHotEncoder, UnknownCategoryPolicy, UnknownCategoryWarning};
pub use error::{ErrorKind, QlsError, Result};
pub use matrix::{Complex, DensityMatrix};
pub use metadata::CalibrationMetadata;
pub use params::{OutOfRange, ParameterBounds, ParameterRecord, Range};
pub use pipeline::{Pipeline, PointEstimate, QlsModel};
pub use predictor::{Prediction, PredictionWarning, Predictor};
pub use scale::{Interval, ScoreScale, clamp01};
pub use score::{RawScore, ScoreComponents, ScoreReport, Scorer, compute_raw_score};
pub use session::{Session, SessionCalibration, SessionLimits, SessionStore};
pub use train::{TrainOptions, TrainReport, TrainedArtifacts, ensure_trained, train};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
