//! GET /health: liveness plus the most recent request failure

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

const MODULE_NAME: &str = "pixelfree-agg";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    /// `code: message` of the last failed query; never internal detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Whole seconds between `started` and `now`; a clock that went backwards reads 0
fn uptime_seconds(started: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((now - started).num_seconds()).unwrap_or(0)
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        module: MODULE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: uptime_seconds(state.startup_time, Utc::now()),
        last_error: state.last_error.read().await.clone(),
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_uptime_seconds() {
        let started = Utc::now();
        assert_eq!(uptime_seconds(started, started + Duration::seconds(90)), 90);
        assert_eq!(uptime_seconds(started, started - Duration::seconds(5)), 0);
    }
}
