//! Shared test helpers
//!
//! - `FakePixelfedApi`: scripted in-memory upstream that records every call
//! - status JSON builders
//! - state wiring with a static token

#![allow(dead_code)]

use async_trait::async_trait;
use pixelfree_agg::services::upstream_client::request_params;
use pixelfree_agg::services::{
    AccessTokenProvider, PixelfedApi, StaticTokenProvider, UpstreamError, UpstreamResponse,
};
use pixelfree_agg::AppState;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

pub const TEST_TOKEN: &str = "test-token";

/// One recorded upstream request
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub path: String,
    pub token: String,
    pub params: Vec<(String, String)>,
}

impl RecordedCall {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
enum FakeReply {
    Json(Value),
    Status(u16),
}

struct Route {
    path: String,
    matcher: Option<(String, String)>,
    reply: FakeReply,
}

/// Scripted upstream; unknown paths answer 404
#[derive(Default)]
pub struct FakePixelfedApi {
    routes: Vec<Route>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakePixelfedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json(mut self, path: &str, body: Value) -> Self {
        self.routes.push(Route {
            path: path.to_string(),
            matcher: None,
            reply: FakeReply::Json(body),
        });
        self
    }

    /// Reply only when query parameter `key` equals `value`
    pub fn with_json_when(mut self, path: &str, key: &str, value: &str, body: Value) -> Self {
        self.routes.push(Route {
            path: path.to_string(),
            matcher: Some((key.to_string(), value.to_string())),
            reply: FakeReply::Json(body),
        });
        self
    }

    pub fn with_status(mut self, path: &str, status: u16) -> Self {
        self.routes.push(Route {
            path: path.to_string(),
            matcher: None,
            reply: FakeReply::Status(status),
        });
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.path).collect()
    }

    pub fn call_count(&self, path: &str) -> usize {
        self.calls().iter().filter(|c| c.path == path).count()
    }
}

#[async_trait]
impl PixelfedApi for FakePixelfedApi {
    async fn get_json(
        &self,
        path: &str,
        access_token: &str,
        params: &[(&str, Option<String>)],
    ) -> Result<UpstreamResponse, UpstreamError> {
        let params: Vec<(String, String)> = request_params(params)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let call = RecordedCall {
            path: path.to_string(),
            token: access_token.to_string(),
            params: params.clone(),
        };
        self.calls.lock().unwrap().push(call);

        let route = self.routes.iter().find(|r| {
            r.path == path
                && r.matcher
                    .as_ref()
                    .map_or(true, |(k, v)| params.iter().any(|(pk, pv)| pk == k && pv == v))
        });

        match route.map(|r| r.reply.clone()) {
            Some(FakeReply::Json(body)) => Ok(UpstreamResponse { status: 200, body }),
            Some(FakeReply::Status(status)) => Err(UpstreamError::Status {
                status,
                path: path.to_string(),
                body: None,
            }),
            None => Err(UpstreamError::Status {
                status: 404,
                path: path.to_string(),
                body: Some(json!({ "error": "Record not found" })),
            }),
        }
    }
}

/// RFC 3339 timestamp `minutes` after a fixed base time
pub fn at(minutes: u32) -> String {
    format!("2024-05-01T{:02}:{:02}:00.000Z", 8 + minutes / 60, minutes % 60)
}

/// Status with `images` image attachments
pub fn image_status(id: &str, minutes: u32, account_id: &str, tags: &[&str], images: usize) -> Value {
    let media: Vec<Value> = (0..images)
        .map(|i| {
            json!({
                "id": format!("{}-m{}", id, i),
                "type": "image",
                "url": format!("https://cdn.example/{}/{}.jpg", id, i),
                "preview_url": format!("https://cdn.example/{}/{}_s.jpg", id, i)
            })
        })
        .collect();

    json!({
        "id": id,
        "created_at": at(minutes),
        "content": format!("<p>post {}</p>", id),
        "url": format!("https://pixelfed.example/p/{}", id),
        "account": {
            "id": account_id,
            "acct": format!("user{}", account_id),
            "username": format!("user{}", account_id),
            "display_name": format!("User {}", account_id),
            "avatar": "https://cdn.example/avatar.png"
        },
        "tags": tags.iter().map(|t| json!({ "name": t })).collect::<Vec<_>>(),
        "media_attachments": media
    })
}

/// Status without any media
pub fn text_status(id: &str, minutes: u32, account_id: &str, tags: &[&str]) -> Value {
    let mut status = image_status(id, minutes, account_id, tags, 0);
    status["media_attachments"] = json!([]);
    status
}

/// Status with a single video attachment
pub fn video_status(id: &str, minutes: u32, account_id: &str, tags: &[&str]) -> Value {
    let mut status = image_status(id, minutes, account_id, tags, 0);
    status["media_attachments"] = json!([{
        "id": format!("{}-v", id),
        "type": "video",
        "url": format!("https://cdn.example/{}.mp4", id)
    }]);
    status
}

pub fn static_tokens() -> Arc<dyn AccessTokenProvider> {
    Arc::new(StaticTokenProvider::new(Some(TEST_TOKEN.to_string())))
}

pub fn no_tokens() -> Arc<dyn AccessTokenProvider> {
    Arc::new(StaticTokenProvider::new(None))
}

pub fn app_state(api: Arc<FakePixelfedApi>) -> AppState {
    AppState::from_upstream(api, static_tokens())
}
