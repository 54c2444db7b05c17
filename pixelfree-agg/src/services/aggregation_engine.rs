//! Aggregation engine
//!
//! Fetches candidate posts per tag and/or per account, normalizes them into
//! photo records, and merges them into one bounded, newest-first list.
//!
//! **Merge semantics:**
//! - Tags only: union of tag timelines, re-filtered locally (Any/All)
//! - Users only: union of account timelines (replies excluded)
//! - Tags AND users: account timelines fetched at 3x the limit, then filtered
//!   locally by tag. Tag timelines are not intersected with user results
//!   because remote posts are often missing from a server's tag index.
//! - Public: the instance's public timeline, optionally local posts only
//!
//! Every path ends in the same pipeline: dedupe by id, stable sort by
//! `created_at` descending (missing timestamps last), truncate to the limit.
//!
//! A failed fetch for any single tag or account aborts the whole query.

use crate::models::{normalize_tags, Limit, PhotoQuery, PhotoRecord, QueryError, QueryKind, TagMode};
use crate::services::status_normalizer::records_from_timeline;
use crate::services::token_provider::{AccessTokenProvider, AuthError};
use crate::services::upstream_client::{api_path, PixelfedApi, UpstreamError};
use futures::future::try_join_all;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Lower bound on statuses requested per source
pub const MIN_PER_SOURCE: usize = 10;
/// Upstream page maximum
pub const MAX_PER_SOURCE: usize = 40;

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("{0}")]
    Validation(#[from] QueryError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Statuses fetched per tag/account: `clamp(ceil(limit * 1.5), 10, 40)`
pub fn per_source_limit(limit: Limit) -> usize {
    let over_fetch = (limit.get() * 3).div_ceil(2);
    over_fetch.clamp(MIN_PER_SOURCE, MAX_PER_SOURCE)
}

/// Statuses fetched per account for tag-and-user queries: `ceil(limit * 3)`,
/// bounded like every other per-source fetch
pub fn compound_fetch_limit(limit: Limit) -> usize {
    (limit.get() * 3).clamp(MIN_PER_SOURCE, MAX_PER_SOURCE)
}

/// Newest first; records without a timestamp sort after all dated ones
fn newest_first(a: &PhotoRecord, b: &PhotoRecord) -> Ordering {
    match (a.created_at, b.created_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Shared post-processing: dedupe by id, sort newest first, truncate
///
/// Idempotent: running it on its own output changes nothing.
pub fn finalize(records: Vec<PhotoRecord>, limit: Limit) -> Vec<PhotoRecord> {
    let mut seen = HashSet::new();
    let mut unique: Vec<PhotoRecord> = records
        .into_iter()
        .filter(|r| seen.insert(r.id.clone()))
        .collect();

    unique.sort_by(newest_first);
    unique.truncate(limit.get());
    unique
}

/// Keep records whose tags satisfy `tag_mode` against `wanted`
pub fn filter_by_tags(
    records: Vec<PhotoRecord>,
    wanted: &BTreeSet<String>,
    tag_mode: TagMode,
) -> Vec<PhotoRecord> {
    records
        .into_iter()
        .filter(|r| tag_mode.matches(&r.tags, wanted))
        .collect()
}

pub struct AggregationEngine {
    api: Arc<dyn PixelfedApi>,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl AggregationEngine {
    pub fn new(api: Arc<dyn PixelfedApi>, tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self { api, tokens }
    }

    /// Run a validated query
    pub async fn run(&self, query: &PhotoQuery) -> Result<Vec<PhotoRecord>, AggregationError> {
        match &query.kind {
            QueryKind::Tag { tags, tag_mode } => self.by_tags(tags, query.limit, *tag_mode).await,
            QueryKind::User { account_ids } => self.by_users(account_ids, query.limit).await,
            QueryKind::Compound {
                tags,
                account_ids,
                tag_mode,
            } => {
                self.compound(tags, account_ids, query.limit, *tag_mode)
                    .await
            }
            QueryKind::Public { local_only } => self.public_timeline(*local_only, query.limit).await,
        }
    }

    /// Latest photos carrying any/all of `tags`
    pub async fn by_tags(
        &self,
        tags: &BTreeSet<String>,
        limit: Limit,
        tag_mode: TagMode,
    ) -> Result<Vec<PhotoRecord>, AggregationError> {
        let wanted = normalize_tags(tags);
        if wanted.is_empty() {
            return Err(QueryError::MissingTags.into());
        }

        let token = self.tokens.access_token().await?;
        let per = per_source_limit(limit);

        let fetched = self.fetch_tag_timelines(&token, &wanted, per).await?;
        let fetched_count = fetched.len();
        let matching = filter_by_tags(fetched, &wanted, tag_mode);
        let photos = finalize(matching, limit);

        tracing::info!(
            tags = ?wanted,
            tag_mode = ?tag_mode,
            per_source = per,
            fetched = fetched_count,
            returned = photos.len(),
            "Aggregated photos by tag"
        );

        Ok(photos)
    }

    /// Latest photos posted by any of `account_ids`
    pub async fn by_users(
        &self,
        account_ids: &BTreeSet<String>,
        limit: Limit,
    ) -> Result<Vec<PhotoRecord>, AggregationError> {
        let ids = clean_ids(account_ids);
        if ids.is_empty() {
            return Err(QueryError::MissingUsers.into());
        }

        let token = self.tokens.access_token().await?;
        let per = per_source_limit(limit);

        let fetched = self.fetch_account_timelines(&token, &ids, per).await?;
        let fetched_count = fetched.len();
        let photos = finalize(fetched, limit);

        tracing::info!(
            accounts = ids.len(),
            per_source = per,
            fetched = fetched_count,
            returned = photos.len(),
            "Aggregated photos by user"
        );

        Ok(photos)
    }

    /// Latest photos posted by any of `account_ids` that carry the tags
    ///
    /// Falls back to a single-dimension query when one side is empty.
    pub async fn compound(
        &self,
        tags: &BTreeSet<String>,
        account_ids: &BTreeSet<String>,
        limit: Limit,
        tag_mode: TagMode,
    ) -> Result<Vec<PhotoRecord>, AggregationError> {
        let wanted = normalize_tags(tags);
        let ids = clean_ids(account_ids);

        match (wanted.is_empty(), ids.is_empty()) {
            (true, true) => return Err(QueryError::MissingDimensions.into()),
            (false, true) => return self.by_tags(&wanted, limit, tag_mode).await,
            (true, false) => return self.by_users(&ids, limit).await,
            (false, false) => {}
        }

        let token = self.tokens.access_token().await?;
        let per = compound_fetch_limit(limit);

        let fetched = self.fetch_account_timelines(&token, &ids, per).await?;
        let fetched_count = fetched.len();
        let matching = filter_by_tags(fetched, &wanted, tag_mode);
        let photos = finalize(matching, limit);

        tracing::info!(
            tags = ?wanted,
            tag_mode = ?tag_mode,
            accounts = ids.len(),
            per_source = per,
            fetched = fetched_count,
            returned = photos.len(),
            "Aggregated photos by user and tag"
        );

        Ok(photos)
    }

    /// Latest photos from the public timeline (`local_only` keeps this
    /// instance's posts only)
    pub async fn public_timeline(
        &self,
        local_only: bool,
        limit: Limit,
    ) -> Result<Vec<PhotoRecord>, AggregationError> {
        let token = self.tokens.access_token().await?;
        let per = per_source_limit(limit);

        let path = api_path(&["api", "v1", "timelines", "public"])?;
        let params = [
            ("limit", Some(per.to_string())),
            ("local", local_only.then(|| "true".to_string())),
        ];
        let response = self.api.get_json(&path, &token, &params).await?;
        let fetched = records_from_timeline(&response.body);
        let fetched_count = fetched.len();
        let photos = finalize(fetched, limit);

        tracing::info!(
            local_only,
            per_source = per,
            fetched = fetched_count,
            returned = photos.len(),
            "Aggregated photos from public timeline"
        );

        Ok(photos)
    }

    /// GET /api/v1/timelines/tag/{tag}?limit= for every tag, concurrently
    async fn fetch_tag_timelines(
        &self,
        token: &str,
        tags: &BTreeSet<String>,
        per: usize,
    ) -> Result<Vec<PhotoRecord>, UpstreamError> {
        let fetches = tags.iter().map(|tag| async move {
            let path = api_path(&["api", "v1", "timelines", "tag", tag.as_str()])?;
            let params = [("limit", Some(per.to_string()))];
            let response = self.api.get_json(&path, token, &params).await?;
            let records = records_from_timeline(&response.body);
            tracing::debug!(tag = %tag, photos = records.len(), "Fetched tag timeline");
            Ok::<_, UpstreamError>(records)
        });

        Ok(try_join_all(fetches).await?.into_iter().flatten().collect())
    }

    /// GET /api/v1/accounts/{id}/statuses?limit=&exclude_replies=true for
    /// every account, concurrently
    async fn fetch_account_timelines(
        &self,
        token: &str,
        account_ids: &BTreeSet<String>,
        per: usize,
    ) -> Result<Vec<PhotoRecord>, UpstreamError> {
        let fetches = account_ids.iter().map(|id| async move {
            let path = api_path(&["api", "v1", "accounts", id.as_str(), "statuses"])?;
            let params = [
                ("limit", Some(per.to_string())),
                ("exclude_replies", Some("true".to_string())),
            ];
            let response = self.api.get_json(&path, token, &params).await?;
            let records = records_from_timeline(&response.body);
            tracing::debug!(account_id = %id, photos = records.len(), "Fetched account timeline");
            Ok::<_, UpstreamError>(records)
        });

        Ok(try_join_all(fetches).await?.into_iter().flatten().collect())
    }
}

fn clean_ids(account_ids: &BTreeSet<String>) -> BTreeSet<String> {
    account_ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}
