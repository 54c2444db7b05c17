//! Query dispatcher
//!
//! Boundary between the HTTP layer and the aggregation engine: classifies a
//! query payload, normalizes tags, resolves handles (collecting per-handle
//! failures instead of aborting), validates, and runs the engine.

use crate::models::upstream::id_from_value;
use crate::models::{normalize_tags, Limit, PhotoQuery, PhotoRecord, QueryError, TagMode};
use crate::services::account_resolver::{AccountResolver, HandleFailure};
use crate::services::aggregation_engine::{AggregationEngine, AggregationError};
use crate::services::token_provider::AuthError;
use crate::services::upstream_client::UpstreamError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

/// Users selector accepted in the nested form `{"users": {...}}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSelector {
    #[serde(default, deserialize_with = "lenient_strings")]
    pub accts: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub account_ids: Vec<String>,
}

/// Incoming query descriptor
///
/// ```json
/// {"type": "compound", "limit": 10, "tags": ["hiking"], "tagMode": "any",
///  "accts": ["@alice@pixelfed.social"], "accountIds": ["42"]}
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    /// "tag" | "user" | "compound" | "public"
    #[serde(rename = "type", default)]
    pub query_type: Option<String>,
    /// Number or numeric string; anything else falls back to the default
    #[serde(default)]
    pub limit: Option<Value>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub tags: Vec<String>,
    /// "any" | "all" (default "any")
    #[serde(default)]
    pub tag_mode: Option<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub accts: Vec<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub account_ids: Vec<String>,
    #[serde(default)]
    pub users: Option<UserSelector>,
    /// Public queries only: `true` (or "true") restricts to local posts
    #[serde(default)]
    pub local_only: Option<Value>,
}

/// Accept a list of strings/numbers, a single string, or null
fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items.iter().filter_map(id_from_value).collect(),
        Some(single) => id_from_value(&single).into_iter().collect(),
        None => Vec::new(),
    })
}

/// Per-target failure reported next to partial results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetError {
    pub target: String,
    pub code: String,
    pub message: String,
}

impl From<HandleFailure> for TargetError {
    fn from(failure: HandleFailure) -> Self {
        Self {
            target: failure.handle,
            code: failure.error.code().to_string(),
            message: failure.error.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Bad or insufficient input; `failures` lists handles that could not be
    /// resolved when that is why the query ended up empty
    #[error("{message}")]
    Validation {
        message: String,
        failures: Vec<TargetError>,
    },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl DispatchError {
    fn validation(message: impl Into<String>) -> Self {
        DispatchError::Validation {
            message: message.into(),
            failures: Vec::new(),
        }
    }
}

impl From<AggregationError> for DispatchError {
    fn from(err: AggregationError) -> Self {
        match err {
            AggregationError::Validation(e) => DispatchError::validation(e.to_string()),
            AggregationError::Auth(e) => DispatchError::Auth(e),
            AggregationError::Upstream(e) => DispatchError::Upstream(e),
        }
    }
}

/// Photos plus any per-handle resolution failures
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub photos: Vec<PhotoRecord>,
    pub errors: Vec<TargetError>,
}

/// Wire shape: a bare list, or `{photos, errors}` when something failed
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Photos(Vec<PhotoRecord>),
    WithErrors {
        photos: Vec<PhotoRecord>,
        errors: Vec<TargetError>,
    },
}

impl From<DispatchOutcome> for QueryResponse {
    fn from(outcome: DispatchOutcome) -> Self {
        if outcome.errors.is_empty() {
            QueryResponse::Photos(outcome.photos)
        } else {
            QueryResponse::WithErrors {
                photos: outcome.photos,
                errors: outcome.errors,
            }
        }
    }
}

/// Clamp the requested limit; missing or non-numeric → default
pub fn parse_limit(raw: Option<&Value>) -> Limit {
    let requested = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match requested {
        Some(n) if n.is_finite() => Limit::clamped(n.trunc() as i64),
        _ => Limit::default(),
    }
}

/// `true`, "true" or "1" → true; anything else → false
pub fn parse_flag(raw: Option<&Value>) -> bool {
    match raw {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

/// Missing → Any; unknown values are rejected
pub fn parse_tag_mode(raw: Option<&str>) -> Result<TagMode, DispatchError> {
    match raw {
        None => Ok(TagMode::default()),
        Some(s) => TagMode::parse(s).ok_or_else(|| {
            DispatchError::validation(format!("unsupported tagMode \"{}\" (use any or all)", s))
        }),
    }
}

pub struct QueryDispatcher {
    resolver: Arc<AccountResolver>,
    engine: Arc<AggregationEngine>,
}

impl QueryDispatcher {
    pub fn new(resolver: Arc<AccountResolver>, engine: Arc<AggregationEngine>) -> Self {
        Self { resolver, engine }
    }

    pub fn resolver(&self) -> &Arc<AccountResolver> {
        &self.resolver
    }

    pub async fn dispatch(&self, request: QueryRequest) -> Result<DispatchOutcome, DispatchError> {
        let query_type = request
            .query_type
            .as_deref()
            .map(|t| t.trim().to_ascii_lowercase())
            .unwrap_or_default();
        let limit = parse_limit(request.limit.as_ref());

        tracing::info!(query_type = %query_type, limit = limit.get(), "Dispatching photo query");

        let (query, errors) = match query_type.as_str() {
            "tag" => {
                let tag_mode = parse_tag_mode(request.tag_mode.as_deref())?;
                let tags = normalize_tags(&request.tags);
                let query = PhotoQuery::tags(tags, tag_mode, limit)
                    .map_err(|e| DispatchError::validation(e.to_string()))?;
                (query, Vec::new())
            }
            "user" => {
                let (account_ids, errors) = self.collect_account_ids(&request).await?;
                let query = PhotoQuery::users(account_ids, limit)
                    .map_err(|e| empty_dimension(e, &errors))?;
                (query, errors)
            }
            "compound" => {
                let tag_mode = parse_tag_mode(request.tag_mode.as_deref())?;
                let tags = normalize_tags(&request.tags);
                let (account_ids, errors) = self.collect_account_ids(&request).await?;
                let query = PhotoQuery::compound(tags, account_ids, tag_mode, limit)
                    .map_err(|e| empty_dimension(e, &errors))?;
                (query, errors)
            }
            "public" => (
                PhotoQuery::public(parse_flag(request.local_only.as_ref()), limit),
                Vec::new(),
            ),
            other => {
                return Err(DispatchError::validation(format!(
                    "unsupported query type \"{}\"",
                    other
                )))
            }
        };

        let photos = self.engine.run(&query).await?;

        if !errors.is_empty() {
            tracing::warn!(
                failed_handles = errors.len(),
                photos = photos.len(),
                "Query completed with unresolved handles"
            );
        }

        Ok(DispatchOutcome { photos, errors })
    }

    /// Union of explicit ids and resolved handles (top-level and nested
    /// `users` forms), plus the handles that failed
    async fn collect_account_ids(
        &self,
        request: &QueryRequest,
    ) -> Result<(BTreeSet<String>, Vec<TargetError>), DispatchError> {
        let nested = request.users.clone().unwrap_or_default();

        let handles: Vec<&String> = request.accts.iter().chain(nested.accts.iter()).collect();
        let batch = self.resolver.resolve_many(&handles).await?;

        let account_ids = request
            .account_ids
            .iter()
            .chain(nested.account_ids.iter())
            .chain(batch.account_ids.iter())
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();

        let errors = batch.failures.into_iter().map(TargetError::from).collect();
        Ok((account_ids, errors))
    }
}

fn empty_dimension(err: QueryError, failures: &[TargetError]) -> DispatchError {
    DispatchError::Validation {
        message: err.to_string(),
        failures: failures.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None).get(), 20);
        assert_eq!(parse_limit(Some(&json!(1000))).get(), 40);
        assert_eq!(parse_limit(Some(&json!(0))).get(), 1);
        assert_eq!(parse_limit(Some(&json!(-3))).get(), 1);
        assert_eq!(parse_limit(Some(&json!("12"))).get(), 12);
        assert_eq!(parse_limit(Some(&json!(7.9))).get(), 7);
        assert_eq!(parse_limit(Some(&json!("lots"))).get(), 20);
        assert_eq!(parse_limit(Some(&json!(null))).get(), 20);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag(Some(&json!(true))));
        assert!(parse_flag(Some(&json!("TRUE"))));
        assert!(parse_flag(Some(&json!(1))));
        assert!(!parse_flag(Some(&json!("yes"))));
        assert!(!parse_flag(Some(&json!(false))));
        assert!(!parse_flag(None));
    }

    #[test]
    fn test_parse_tag_mode() {
        assert_eq!(parse_tag_mode(None).unwrap(), TagMode::Any);
        assert_eq!(parse_tag_mode(Some("ALL")).unwrap(), TagMode::All);
        assert!(matches!(
            parse_tag_mode(Some("most")),
            Err(DispatchError::Validation { .. })
        ));
    }

    #[test]
    fn test_request_deserialization_is_lenient() {
        let request: QueryRequest = serde_json::from_value(json!({
            "type": "compound",
            "limit": "5",
            "tags": ["#Hiking", 2024, null],
            "accountIds": [42, "43"],
            "users": { "accts": "@alice@pixelfed.social" }
        }))
        .unwrap();

        assert_eq!(request.query_type.as_deref(), Some("compound"));
        assert_eq!(request.tags, vec!["#Hiking", "2024"]);
        assert_eq!(request.account_ids, vec!["42", "43"]);
        assert_eq!(
            request.users.unwrap().accts,
            vec!["@alice@pixelfed.social"]
        );
        assert!(request.accts.is_empty());
    }

    #[test]
    fn test_response_shape() {
        let bare: QueryResponse = DispatchOutcome {
            photos: Vec::new(),
            errors: Vec::new(),
        }
        .into();
        assert_eq!(serde_json::to_value(&bare).unwrap(), json!([]));

        let with_errors: QueryResponse = DispatchOutcome {
            photos: Vec::new(),
            errors: vec![TargetError {
                target: "bob@bad".to_string(),
                code: "malformed_handle".to_string(),
                message: "Bad acct".to_string(),
            }],
        }
        .into();
        assert_eq!(
            serde_json::to_value(&with_errors).unwrap(),
            json!({
                "photos": [],
                "errors": [{ "target": "bob@bad", "code": "malformed_handle", "message": "Bad acct" }]
            })
        );
    }
}
