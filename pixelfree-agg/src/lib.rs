//! pixelfree-agg library interface
//!
//! Federated photo aggregation: resolves handles across instances, fetches
//! tag and account timelines, and merges them into one photo list.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use services::{
    AccessTokenProvider, AccountResolver, AggregationEngine, PixelfedApi, QueryDispatcher,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Query entry point (owns the resolver and its cache)
    pub dispatcher: Arc<QueryDispatcher>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(dispatcher: Arc<QueryDispatcher>) -> Self {
        Self {
            dispatcher,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Wire resolver, engine and dispatcher around one upstream API and token source
    pub fn from_upstream(api: Arc<dyn PixelfedApi>, tokens: Arc<dyn AccessTokenProvider>) -> Self {
        let resolver = Arc::new(AccountResolver::new(api.clone(), tokens.clone()));
        let engine = Arc::new(AggregationEngine::new(api, tokens));
        Self::new(Arc::new(QueryDispatcher::new(resolver, engine)))
    }

    /// Remember a failed request for `/health`; only the public message is kept
    pub async fn record_error(&self, err: &ApiError) {
        let summary = format!("{}: {}", err.code(), err.public_message());
        *self.last_error.write().await = Some(summary);
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::photo_routes())
        .merge(api::account_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
