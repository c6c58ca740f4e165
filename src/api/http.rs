//! Control-plane REST surface.
//!
//! Validation and conflict answers are synchronous; everything after a job
//! is accepted is observable only through these read endpoints or the event
//! plane.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::abtest::manager::ABTestManager;
use crate::alerts::manager::AlertManager;
use crate::common::config::Config;
use crate::common::error::CoreError;
use crate::drift::detector::DriftDetector;
use crate::events::gateway::ConnectionGateway;
use crate::metrics::recorder::MetricsRecorder;
use crate::training::domain::{ModelType, TriggerType};
use crate::training::service::JobLifecycleManager;

/// Shared state handed to every handler.
pub struct AppState {
    pub lifecycle: Arc<JobLifecycleManager>,
    pub recorder: Arc<MetricsRecorder>,
    pub detector: Arc<DriftDetector>,
    pub abtests: Arc<ABTestManager>,
    pub alerts: Arc<AlertManager>,
    pub gateway: Arc<ConnectionGateway>,
    pub cfg: Config,
}

/// CoreError to wire response mapping.
struct ApiError(CoreError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

/// Build the full router, control plane plus event plane.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/training/trigger", post(trigger_training))
        .route("/metrics/trend", get(metrics_trend))
        .route("/drift/check", post(drift_check))
        .route("/ab-test/start", post(ab_test_start))
        .route("/ab-test/:id/results", get(ab_test_results))
        .route("/alerts/active", get(alerts_active))
        .route("/ws/:channel", get(super::ws::ws_handler))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct TriggerRequest {
    model_type: ModelType,
    machine_id: String,
    #[serde(default = "default_trigger_type")]
    trigger_type: TriggerType,
    reason: Option<String>,
}

fn default_trigger_type() -> TriggerType {
    TriggerType::Manual
}

async fn trigger_training(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TriggerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .lifecycle
        .trigger(req.model_type, &req.machine_id, req.trigger_type, req.reason)?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct TrendQuery {
    model_type: ModelType,
    machine_id: String,
    #[serde(default = "default_trend_days")]
    days: i64,
}

fn default_trend_days() -> i64 {
    30
}

async fn metrics_trend(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TrendQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if query.days <= 0 {
        return Err(CoreError::validation("days must be positive").into());
    }
    let rows = state.recorder.trend(query.model_type, &query.machine_id, query.days);
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
struct DriftRequest {
    model_type: ModelType,
    machine_id: String,
}

async fn drift_check(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DriftRequest>,
) -> impl IntoResponse {
    Json(state.detector.check(req.model_type, &req.machine_id))
}

#[derive(Debug, Deserialize)]
struct AbStartRequest {
    model_a_version: u32,
    model_b_version: u32,
    machine_id: String,
    model_type: ModelType,
    split: f64,
    /// Test duration in seconds.
    duration: i64,
}

async fn ab_test_start(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AbStartRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let test_id = state.abtests.start(
        req.model_a_version,
        req.model_b_version,
        &req.machine_id,
        req.model_type,
        req.split,
        req.duration,
    )?;
    Ok(Json(serde_json::json!({ "test_id": test_id })))
}

async fn ab_test_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let results = state.abtests.results(id)?;
    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
struct AlertsQuery {
    machine_id: Option<String>,
    model_type: Option<ModelType>,
}

async fn alerts_active(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertsQuery>,
) -> impl IntoResponse {
    Json(state.alerts.active(query.machine_id.as_deref(), query.model_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abtest::manager::ABTestManager;
    use crate::drift::domain::ErrorRatioStrategy;
    use crate::events::bus::{EventBus, MemBroker};
    use crate::events::gateway::ConnectionRegistry;
    use crate::store::mem::MemStore;
    use crate::training::domain::StubTrainer;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app() -> Router {
        let cfg = Config::load();
        let store = MemStore::shared();
        let bus = EventBus::new(Arc::new(MemBroker::new(64)));
        let recorder = Arc::new(MetricsRecorder::new(Arc::clone(&store)));
        let alerts = Arc::new(AlertManager::new(Arc::clone(&store), bus.clone()));
        let detector = Arc::new(DriftDetector::new(
            Arc::clone(&recorder),
            Arc::new(ErrorRatioStrategy::default()),
        ));
        let lifecycle = Arc::new(JobLifecycleManager::new(
            Arc::clone(&store),
            Arc::new(StubTrainer),
            Arc::clone(&recorder),
            Arc::clone(&alerts),
            bus.clone(),
            cfg.job_timeout_secs,
            cfg.estimated_training_secs,
        ));
        let abtests = Arc::new(ABTestManager::new(
            Arc::clone(&store),
            Arc::clone(&recorder),
            Arc::clone(&alerts),
            cfg.ab_min_samples,
            cfg.ab_confidence_margin,
        ));
        let gateway = Arc::new(ConnectionGateway::new(
            Arc::new(ConnectionRegistry::new()),
            cfg.heartbeat_interval_secs,
            cfg.missed_heartbeat_limit,
        ));
        router(Arc::new(AppState {
            lifecycle,
            recorder,
            detector,
            abtests,
            alerts,
            gateway,
            cfg,
        }))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn trigger_endpoint_accepts_and_acknowledges() {
        let app = app();
        let response = app
            .oneshot(
                Request::post("/training/trigger")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"model_type":"baseline","machine_id":"Compressor-1","trigger_type":"manual"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["triggered"], true);
        assert!(body["training_job_id"].is_string());
        assert!(body["estimated_completion"].is_string());
    }

    #[tokio::test]
    async fn empty_machine_id_is_rejected() {
        let app = app();
        let response = app
            .oneshot(
                Request::post("/training/trigger")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"model_type":"baseline","machine_id":""}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ab_start_validates_split_ratio() {
        let app = app();
        let response = app
            .oneshot(
                Request::post("/ab-test/start")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"model_a_version":1,"model_b_version":2,"machine_id":"m","model_type":"baseline","split":1.5,"duration":3600}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("split_ratio"));
    }

    #[tokio::test]
    async fn alerts_active_returns_empty_list() {
        let app = app();
        let response = app
            .oneshot(Request::get("/alerts/active").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn trend_returns_ordered_rows() {
        let app = app();
        let response = app
            .oneshot(
                Request::get("/metrics/trend?model_type=baseline&machine_id=press-1&days=7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await.is_array());
    }
}
