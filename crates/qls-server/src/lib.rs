//! HTTP QLS server.
//!
//! Serves the density-matrix scoring endpoint and session-calibrated
//! parameter prediction. Failures come back as non-2xx statuses with a
//! `{"error": {"kind", "message"}}` body.

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use qls_core::{
    CalibrationMetadata, Dataset, ErrorKind, ParameterRecord, Prediction, Predictor, QlsError,
    Recalibration, ScoreReport, Scorer, ServiceConfig, Session, SessionStore, load_samples_limited,
};

/// Multipart field carrying the `.npz`/`.npy` upload.
pub const UPLOAD_FIELD: &str = "file";

/// Shared server state.
pub struct AppState {
    scorer: Scorer,
    predictor: Option<Arc<Predictor>>,
    sessions: SessionStore,
    max_upload_bytes: usize,
    max_inflated_bytes: usize,
}

impl AppState {
    /// `predictor` is `None` in scoring-only mode; prediction routes then
    /// answer 503. Upload and session limits come from `config`.
    pub fn new(scorer: Scorer, predictor: Option<Predictor>, config: &ServiceConfig) -> Self {
        let default_width = predictor
            .as_ref()
            .map(|p| p.metadata().conformal_width_90)
            .unwrap_or(qls_core::metadata::DEFAULT_CONFORMAL_WIDTH);
        Self {
            scorer,
            predictor: predictor.map(Arc::new),
            sessions: SessionStore::with_limits(default_width, config.session_limits()),
            max_upload_bytes: config.max_upload_bytes,
            max_inflated_bytes: config.max_inflated_bytes,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    fn predictor(&self) -> Result<&Arc<Predictor>, ApiError> {
        self.predictor.as_ref().ok_or_else(|| {
            ApiError::Unavailable("no model loaded; server runs in scoring-only mode".into())
        })
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error returned by every handler.
#[derive(Debug)]
pub enum ApiError {
    Qls(QlsError),
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
    /// Transport-level failure with the status chosen by axum.
    Upload(StatusCode, String),
    Internal(String),
}

impl From<QlsError> for ApiError {
    fn from(e: QlsError) -> Self {
        Self::Qls(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    kind: String,
    message: String,
}

/// Status code for each failure kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::DataFormat => StatusCode::BAD_REQUEST,
        ErrorKind::Inference => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Configuration | ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Qls(e) => status_for(e.kind()),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upload(status, _) => *status,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Qls(e) => e.kind().as_str(),
            Self::BadRequest(_) | Self::Upload(..) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal",
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Qls(e) => e.to_string(),
            Self::BadRequest(m)
            | Self::NotFound(m)
            | Self::Unavailable(m)
            | Self::Upload(_, m)
            | Self::Internal(m) => m.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            log::error!("{status}: {message}");
        } else {
            log::debug!("{status}: {message}");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind().to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid session id: {raw}")))
}

fn unknown_session(id: &Uuid) -> ApiError {
    ApiError::NotFound(format!("unknown session {id}"))
}

/// Run CPU-bound work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(format!("worker task failed: {e}")))?
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ScoreParams {
    /// Include the unnormalized score as `debug_raw`.
    #[serde(default)]
    pub debug: bool,
}

/// Decode and score one upload. Archives may inflate to at most
/// `max_inflated` bytes.
pub fn score_upload(
    scorer: &Scorer,
    bytes: &[u8],
    debug: bool,
    max_inflated: usize,
) -> Result<ScoreReport, ApiError> {
    if bytes.is_empty() {
        return Err(QlsError::data_format("uploaded file is empty").into());
    }
    let samples = load_samples_limited(bytes, max_inflated)?;
    Ok(scorer.score(&samples, debug)?)
}

async fn handle_compute_qls(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ScoreParams>,
    mut multipart: Multipart,
) -> Result<Json<ScoreReport>, ApiError> {
    let upload_error = |e: axum::extract::multipart::MultipartError| {
        ApiError::Upload(e.status(), e.body_text())
    };
    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(upload_error)?;
        log::debug!(
            "scoring upload {} ({} bytes)",
            file_name.as_deref().unwrap_or("<unnamed>"),
            bytes.len()
        );
        let (scorer, limit) = (state.scorer, state.max_inflated_bytes);
        return blocking(move || score_upload(&scorer, &bytes, params.debug, limit))
            .await
            .map(Json);
    }
    Err(QlsError::data_format(format!("multipart form has no '{UPLOAD_FIELD}' field")).into())
}

// ---------------------------------------------------------------------------
// Prediction and sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PredictRequest {
    #[serde(flatten)]
    pub record: ParameterRecord,
    /// Session whose calibration applies; stored default when absent.
    #[serde(default)]
    pub session: Option<Uuid>,
}

async fn handle_predict(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<Prediction>, ApiError> {
    let Json(req) = body.map_err(|e| QlsError::data_format(e.body_text()))?;
    let predictor = state.predictor()?;
    let calibration = match &req.session {
        Some(id) => state
            .sessions
            .calibration(id)
            .ok_or_else(|| unknown_session(id))?,
        None => predictor.default_calibration(),
    };
    let prediction = predictor.predict(&req.record, &calibration)?;
    if let Some(id) = &req.session {
        state.sessions.record_prediction(id);
    }
    Ok(Json(prediction))
}

async fn handle_create_session(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Session>) {
    (StatusCode::CREATED, Json(state.sessions.create()))
}

async fn handle_get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let id = parse_session_id(&id)?;
    state
        .sessions
        .get(&id)
        .map(Json)
        .ok_or_else(|| unknown_session(&id))
}

async fn handle_delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_session_id(&id)?;
    if state.sessions.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(unknown_session(&id))
    }
}

#[derive(Debug, Serialize)]
pub struct RecalibrateResponse {
    pub session: Session,
    pub recalibration: Recalibration,
    pub previous_half_width: f64,
}

/// CSV body with `topology,J,gamma,sigma[,QLS]`. On any failure the
/// session keeps its current width.
async fn handle_recalibrate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<RecalibrateResponse>, ApiError> {
    let id = parse_session_id(&id)?;
    let predictor = Arc::clone(state.predictor()?);
    let previous = state
        .sessions
        .calibration(&id)
        .ok_or_else(|| unknown_session(&id))?;
    let recalibration = blocking(move || {
        let reference = Dataset::from_reader(&body[..])?;
        Ok(predictor.recalibrate(&reference)?)
    })
    .await?;
    let session = state
        .sessions
        .set_calibration(&id, recalibration.into())
        .ok_or_else(|| unknown_session(&id))?;
    Ok(Json(RecalibrateResponse {
        session,
        recalibration,
        previous_half_width: previous.half_width,
    }))
}

async fn handle_reset_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let id = parse_session_id(&id)?;
    state
        .sessions
        .reset(&id)
        .map(Json)
        .ok_or_else(|| unknown_session(&id))
}

#[derive(Debug, Serialize)]
pub struct MetadataResponse {
    #[serde(flatten)]
    pub metadata: CalibrationMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_sha256: Option<String>,
}

async fn handle_metadata(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MetadataResponse>, ApiError> {
    let predictor = state.predictor()?;
    Ok(Json(MetadataResponse {
        metadata: predictor.metadata().clone(),
        model_sha256: predictor.fingerprint().map(str::to_string),
    }))
}

// ---------------------------------------------------------------------------
// Health and index
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_sha256: Option<String>,
    pub sessions: usize,
    pub score_range: [f64; 2],
    pub score_half_width: f64,
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let scale = state.scorer.scale();
    let predictor = state.predictor.as_deref();
    Json(HealthResponse {
        status: if predictor.is_some() {
            "healthy".to_string()
        } else {
            "scoring_only".to_string()
        },
        version: qls_core::VERSION.to_string(),
        model_loaded: predictor.is_some(),
        model_sha256: predictor.and_then(|p| p.fingerprint()).map(str::to_string),
        sessions: state.sessions.len(),
        score_range: [scale.min(), scale.max()],
        score_half_width: state.scorer.half_width(),
    })
}

async fn handle_index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let topologies = state
        .predictor
        .as_deref()
        .map(|p| p.metadata().topologies_seen.clone())
        .unwrap_or_default();

    Json(serde_json::json!({
        "name": "QLS Server",
        "version": qls_core::VERSION,
        "topologies": topologies,
        "max_upload_bytes": state.max_upload_bytes,
        "max_inflated_bytes": state.max_inflated_bytes,
        "max_sessions": state.sessions.limits().max_sessions,
        "endpoints": {
            "/": "This API index",
            "/compute-qls": {
                "method": "POST",
                "description": "Score density matrices from a multipart upload",
                "params": {
                    "file": "Multipart field with a .npz archive or a single .npy array",
                    "debug": "true to include the unnormalized score as debug_raw",
                }
            },
            "/api/v1/predict": {
                "method": "POST",
                "description": "Predict QLS from physical parameters",
                "body": "JSON {topology, J, gamma, sigma, session?}",
            },
            "/api/v1/sessions": "POST to create a calibration session",
            "/api/v1/sessions/{id}": "GET to inspect, DELETE to drop a session",
            "/api/v1/sessions/{id}/recalibrate": "POST a reference CSV (topology,J,gamma,sigma[,QLS])",
            "/api/v1/sessions/{id}/reset": "POST to restore the stored default width",
            "/api/v1/metadata": "Training bounds, stored width and topologies",
            "/health": "Health check",
        },
    }))
}

/// Build the axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/compute-qls", post(handle_compute_qls))
        .route("/api/v1/predict", post(handle_predict))
        .route("/api/v1/metadata", get(handle_metadata))
        .route("/api/v1/sessions", post(handle_create_session))
        .route(
            "/api/v1/sessions/{id}",
            get(handle_get_session).delete(handle_delete_session),
        )
        .route("/api/v1/sessions/{id}/recalibrate", post(handle_recalibrate))
        .route("/api/v1/sessions/{id}/reset", post(handle_reset_session))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

/// Run the HTTP QLS server until Ctrl-C.
pub async fn run_server(state: AppState, host: &str, port: u16) -> std::io::Result<()> {
    let app = build_router(Arc::new(state));
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("shutting down");
            }
        })
        .await
}
