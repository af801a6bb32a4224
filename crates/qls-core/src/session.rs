//! Per-session interval calibration.
//!
//! A session starts at the stored default half-width. Recalibration replaces
//! only that session's value; the artifact, the metadata and other sessions
//! are untouched.
//!
//! The store is bounded: sessions idle longer than the TTL expire, and once
//! `max_sessions` is reached creating a session evicts the least recently
//! used one.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calibration::{CalibrationSource, Recalibration};

/// The half-width a prediction call uses, and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionCalibration {
    pub half_width: f64,
    pub source: CalibrationSource,
    /// Reference rows behind a recalibrated width.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_rows: Option<usize>,
}

impl SessionCalibration {
    pub fn stored_default(half_width: f64) -> Self {
        Self {
            half_width,
            source: CalibrationSource::StoredDefault,
            n_rows: None,
        }
    }
}

impl From<Recalibration> for SessionCalibration {
    fn from(r: Recalibration) -> Self {
        Self {
            half_width: r.half_width,
            source: r.source,
            n_rows: Some(r.n_rows),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: Uuid,
    /// Unix seconds.
    pub created_at: u64,
    /// Unix seconds of the last prediction or calibration change.
    pub last_used_at: u64,
    pub calibration: SessionCalibration,
    pub predictions: u64,
}

pub const DEFAULT_MAX_SESSIONS: usize = 1024;
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionLimits {
    pub max_sessions: usize,
    /// `None` keeps idle sessions until evicted by count.
    pub idle_ttl: Option<Duration>,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            idle_ttl: Some(DEFAULT_SESSION_IDLE),
        }
    }
}

#[derive(Debug)]
struct Entry {
    session: Session,
    touched: Instant,
}

impl Entry {
    fn touch(&mut self) {
        self.touched = Instant::now();
        self.session.last_used_at = unix_now();
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Sessions keyed by id, behind a reader-writer lock.
#[derive(Debug)]
pub struct SessionStore {
    default_width: f64,
    limits: SessionLimits,
    sessions: RwLock<HashMap<Uuid, Entry>>,
}

impl SessionStore {
    pub fn new(default_width: f64) -> Self {
        Self::with_limits(default_width, SessionLimits::default())
    }

    pub fn with_limits(default_width: f64, limits: SessionLimits) -> Self {
        Self {
            default_width,
            limits,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn limits(&self) -> SessionLimits {
        self.limits
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Entry>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Entry>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_live(&self, entry: &Entry, now: Instant) -> bool {
        self.limits
            .idle_ttl
            .is_none_or(|ttl| now.duration_since(entry.touched) < ttl)
    }

    fn prune_locked(&self, sessions: &mut HashMap<Uuid, Entry>, now: Instant) -> usize {
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let live = self.is_live(entry, now);
            if !live {
                log::debug!("session {id} expired");
            }
            live
        });
        before - sessions.len()
    }

    /// Drop every expired session. Returns how many went.
    pub fn prune(&self) -> usize {
        self.prune_locked(&mut self.write(), Instant::now())
    }

    pub fn default_calibration(&self) -> SessionCalibration {
        SessionCalibration::stored_default(self.default_width)
    }

    pub fn create(&self) -> Session {
        let now = unix_now();
        let session = Session {
            id: Uuid::new_v4(),
            created_at: now,
            last_used_at: now,
            calibration: self.default_calibration(),
            predictions: 0,
        };
        let mut sessions = self.write();
        self.prune_locked(&mut sessions, Instant::now());
        while sessions.len() >= self.limits.max_sessions.max(1) {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, e)| e.touched)
                .map(|(id, _)| *id)
            else {
                break;
            };
            sessions.remove(&oldest);
            log::info!(
                "session {oldest} evicted ({} sessions max)",
                self.limits.max_sessions
            );
        }
        sessions.insert(
            session.id,
            Entry {
                session: session.clone(),
                touched: Instant::now(),
            },
        );
        log::debug!("session {} created", session.id);
        session
    }

    pub fn get(&self, id: &Uuid) -> Option<Session> {
        let now = Instant::now();
        self.read()
            .get(id)
            .filter(|e| self.is_live(e, now))
            .map(|e| e.session.clone())
    }

    /// Copy of the session's calibration for one prediction call.
    pub fn calibration(&self, id: &Uuid) -> Option<SessionCalibration> {
        let now = Instant::now();
        self.read()
            .get(id)
            .filter(|e| self.is_live(e, now))
            .map(|e| e.session.calibration)
    }

    pub fn record_prediction(&self, id: &Uuid) {
        let now = Instant::now();
        if let Some(e) = self.write().get_mut(id).filter(|e| self.is_live(e, now)) {
            e.session.predictions += 1;
            e.touch();
        }
    }

    /// Swap in a new calibration. Returns the updated session, `None` if the
    /// session no longer exists or has expired.
    pub fn set_calibration(&self, id: &Uuid, calibration: SessionCalibration) -> Option<Session> {
        let now = Instant::now();
        let mut sessions = self.write();
        let entry = sessions.get_mut(id).filter(|e| self.is_live(e, now))?;
        entry.session.calibration = calibration;
        entry.touch();
        log::info!(
            "session {id}: half-width {:.4} ({})",
            calibration.half_width,
            calibration.source
        );
        Some(entry.session.clone())
    }

    /// Back to the stored default width.
    pub fn reset(&self, id: &Uuid) -> Option<Session> {
        self.set_calibration(id, self.default_calibration())
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        self.write().remove(id).is_some()
    }

    /// Live sessions.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.read().values().filter(|e| self.is_live(e, now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
