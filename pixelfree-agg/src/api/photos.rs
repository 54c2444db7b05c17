//! Photo query endpoints
//!
//! POST /api/photos/query takes the full query descriptor; GET /api/photos
//! is the single-source form driven by query-string parameters.

use crate::services::{QueryRequest, QueryResponse};
use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

/// POST /api/photos/query handler
///
/// **Request:** `{"type": "tag"|"user"|"compound"|"public", "limit": 20,
/// "tags": [...], "tagMode": "any"|"all", "accts": [...], "accountIds": [...],
/// "localOnly": false}`
///
/// **Response:** a JSON array of photos, or `{"photos": [...], "errors": [...]}`
/// when some handles could not be resolved
///
/// **Errors:**
/// - 400 Bad Request: unreadable body, unsupported type, no usable tags/users
/// - 401 Unauthorized: no valid access token
/// - 429 / 502: upstream failure after retries
pub async fn query_photos(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> ApiResult<Json<QueryResponse>> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let err = ApiError::bad_request(format!("invalid request body: {}", rejection.body_text()));
            state.record_error(&err).await;
            return Err(err);
        }
    };

    run_query(&state, request).await
}

/// GET /api/photos query string
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoParams {
    /// "tag" | "user" | "public" (default "public")
    #[serde(rename = "type")]
    pub query_type: Option<String>,
    pub tag: Option<String>,
    pub acct: Option<String>,
    pub account_id: Option<String>,
    pub local_only: Option<String>,
    pub limit: Option<String>,
}

impl From<PhotoParams> for QueryRequest {
    fn from(params: PhotoParams) -> Self {
        let query_type = params
            .query_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "public".to_string());

        QueryRequest {
            query_type: Some(query_type),
            limit: params.limit.map(Value::String),
            tags: params.tag.into_iter().collect(),
            accts: params.acct.into_iter().collect(),
            account_ids: params.account_id.into_iter().collect(),
            local_only: params.local_only.map(Value::String),
            ..Default::default()
        }
    }
}

/// GET /api/photos?type=tag&tag=otters | type=user&acct=... | type=public&localOnly=true
pub async fn list_photos(
    State(state): State<AppState>,
    Query(params): Query<PhotoParams>,
) -> ApiResult<Json<QueryResponse>> {
    run_query(&state, params.into()).await
}

async fn run_query(state: &AppState, request: QueryRequest) -> ApiResult<Json<QueryResponse>> {
    match state.dispatcher.dispatch(request).await {
        Ok(outcome) => Ok(Json(outcome.into())),
        Err(e) => {
            let err = ApiError::from(e);
            state.record_error(&err).await;
            Err(err)
        }
    }
}

/// Build photo routes
pub fn photo_routes() -> Router<AppState> {
    Router::new()
        .route("/api/photos", get(list_photos))
        .route("/api/photos/query", post(query_photos))
}
