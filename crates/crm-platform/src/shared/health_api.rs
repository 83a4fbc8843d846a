//! Health Check Endpoints
//!
//! - /health - combined status with the MongoDB check
//! - /health/live - liveness
//! - /health/ready - readiness, pings MongoDB

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
    /// Running but not finished starting
    Degraded,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub uptime_secs: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<HealthCheck>,
}

#[derive(Debug, Serialize)]
pub struct SimpleHealthResponse {
    pub status: HealthStatus,
}

#[derive(Clone)]
pub struct HealthState {
    pub db: Option<mongodb::Database>,
    pub version: Option<String>,
    pub started_at: DateTime<Utc>,
    /// Set once startup has finished
    pub ready: Arc<AtomicBool>,
}

impl HealthState {
    pub fn new(db: Option<mongodb::Database>, version: Option<String>) -> Self {
        Self {
            db,
            version,
            started_at: Utc::now(),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn check_mongo(&self) -> Option<HealthCheck> {
        let db = self.db.as_ref()?;
        let start = Instant::now();
        let result = db.run_command(mongodb::bson::doc! { "ping": 1 }).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        Some(match result {
            Ok(_) => HealthCheck {
                name: "mongodb".to_string(),
                status: HealthStatus::Up,
                message: None,
                duration_ms,
            },
            Err(e) => HealthCheck {
                name: "mongodb".to_string(),
                status: HealthStatus::Down,
                message: Some(format!("Connection failed: {}", e)),
                duration_ms,
            },
        })
    }
}

fn status_code(status: HealthStatus) -> StatusCode {
    if status == HealthStatus::Down {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

pub async fn get_health(State(state): State<HealthState>) -> Response {
    let checks: Vec<HealthCheck> = state.check_mongo().await.into_iter().collect();

    let status = if checks.iter().any(|c| c.status == HealthStatus::Down) {
        HealthStatus::Down
    } else if !state.is_ready() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Up
    };

    let response = HealthResponse {
        status,
        timestamp: Utc::now(),
        version: state.version.clone(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        checks,
    };

    (status_code(status), Json(response)).into_response()
}

pub async fn get_liveness() -> Json<SimpleHealthResponse> {
    Json(SimpleHealthResponse {
        status: HealthStatus::Up,
    })
}

pub async fn get_readiness(State(state): State<HealthState>) -> Response {
    let status = if !state.is_ready() {
        HealthStatus::Down
    } else {
        match state.check_mongo().await {
            Some(check) => check.status,
            None => HealthStatus::Up,
        }
    };

    (status_code(status), Json(SimpleHealthResponse { status })).into_response()
}

pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(get_health))
        .route("/live", get(get_liveness))
        .route("/ready", get(get_readiness))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_serialization() {
        assert_eq!(serde_json::to_string(&HealthStatus::Up).unwrap(), "\"UP\"");
        assert_eq!(serde_json::to_string(&HealthStatus::Degraded).unwrap(), "\"DEGRADED\"");
    }

    #[test]
    fn test_health_state() {
        let state = HealthState::new(None, Some("1.0.0".to_string()));
        assert!(!state.is_ready());
        state.set_ready();
        assert!(state.is_ready());
    }

    #[tokio::test]
    async fn test_readiness_without_database() {
        let state = HealthState::new(None, None);
        let response = get_readiness(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.set_ready();
        let response = get_readiness(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
