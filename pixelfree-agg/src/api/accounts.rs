//! Account resolution endpoint

use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ResolveParams {
    pub acct: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub acct: String,
    pub account_id: String,
}

/// GET /api/accounts/resolve?acct=<handle>
///
/// Accepts `name`, `@name`, `name@host.tld`, or a profile URL.
pub async fn resolve_account(
    State(state): State<AppState>,
    Query(params): Query<ResolveParams>,
) -> ApiResult<Json<ResolveResponse>> {
    let acct = params
        .acct
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ApiError::bad_request("acct required"))?;

    let account_id = state
        .dispatcher
        .resolver()
        .resolve_handle(&acct)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ResolveResponse { acct, account_id }))
}

/// Build account routes
pub fn account_routes() -> Router<AppState> {
    Router::new().route("/api/accounts/resolve", get(resolve_account))
}
