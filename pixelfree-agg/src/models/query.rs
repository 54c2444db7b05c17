//! Photo query model
//!
//! A query selects posts by hashtag, by account, by both, or from the
//! instance's public timeline. All variants carry a result limit clamped
//! into `1..=40`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

pub const MIN_LIMIT: u32 = 1;
pub const MAX_LIMIT: u32 = 40;
pub const DEFAULT_LIMIT: u32 = 20;

/// Whether a record must carry at least one (Any) or every (All) queried tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMode {
    #[default]
    Any,
    All,
}

impl TagMode {
    /// Case-insensitive parse of "any" / "all"
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "any" => Some(TagMode::Any),
            "all" => Some(TagMode::All),
            _ => None,
        }
    }

    /// Check a record's (normalized) tag set against the wanted set
    pub fn matches(self, record_tags: &BTreeSet<String>, wanted: &BTreeSet<String>) -> bool {
        match self {
            TagMode::Any => wanted.iter().any(|t| record_tags.contains(t)),
            TagMode::All => wanted.iter().all(|t| record_tags.contains(t)),
        }
    }
}

/// Result-count limit, always within `MIN_LIMIT..=MAX_LIMIT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit(u32);

impl Limit {
    /// Clamp any requested value into range (0 and negatives become 1)
    pub fn clamped(requested: i64) -> Self {
        Limit(requested.clamp(MIN_LIMIT as i64, MAX_LIMIT as i64) as u32)
    }

    pub fn get(self) -> usize {
        self.0 as usize
    }
}

impl Default for Limit {
    fn default() -> Self {
        Limit(DEFAULT_LIMIT)
    }
}

/// Normalize one tag: trim, strip a single leading `#`, lowercase
///
/// Returns `None` when nothing is left.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let stripped = trimmed.strip_prefix('#').unwrap_or(trimmed).trim();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_lowercase())
    }
}

/// Normalize and de-duplicate a tag list
pub fn normalize_tags<I, S>(raw: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .filter_map(|t| normalize_tag(t.as_ref()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("tags required")]
    MissingTags,

    #[error("users required")]
    MissingUsers,

    #[error("tags or users required")]
    MissingDimensions,
}

/// Query variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    Tag {
        tags: BTreeSet<String>,
        tag_mode: TagMode,
    },
    User {
        account_ids: BTreeSet<String>,
    },
    /// Posts by any of `account_ids` that carry the queried tags
    Compound {
        tags: BTreeSet<String>,
        account_ids: BTreeSet<String>,
        tag_mode: TagMode,
    },
    /// Federated public timeline, or only this instance's posts
    Public { local_only: bool },
}

/// Validated query: a non-empty dimension plus a clamped limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoQuery {
    pub kind: QueryKind,
    pub limit: Limit,
}

impl PhotoQuery {
    pub fn tags(
        tags: BTreeSet<String>,
        tag_mode: TagMode,
        limit: Limit,
    ) -> Result<Self, QueryError> {
        if tags.is_empty() {
            return Err(QueryError::MissingTags);
        }
        Ok(Self {
            kind: QueryKind::Tag { tags, tag_mode },
            limit,
        })
    }

    pub fn users(account_ids: BTreeSet<String>, limit: Limit) -> Result<Self, QueryError> {
        if account_ids.is_empty() {
            return Err(QueryError::MissingUsers);
        }
        Ok(Self {
            kind: QueryKind::User { account_ids },
            limit,
        })
    }

    /// Public timeline query; needs no tags or users
    pub fn public(local_only: bool, limit: Limit) -> Self {
        Self {
            kind: QueryKind::Public { local_only },
            limit,
        }
    }

    /// Build a compound query, degenerating to a single dimension when the
    /// other one is empty
    pub fn compound(
        tags: BTreeSet<String>,
        account_ids: BTreeSet<String>,
        tag_mode: TagMode,
        limit: Limit,
    ) -> Result<Self, QueryError> {
        match (tags.is_empty(), account_ids.is_empty()) {
            (true, true) => Err(QueryError::MissingDimensions),
            (false, true) => Self::tags(tags, tag_mode, limit),
            (true, false) => Self::users(account_ids, limit),
            (false, false) => Ok(Self {
                kind: QueryKind::Compound {
                    tags,
                    account_ids,
                    tag_mode,
                },
                limit,
            }),
        }
    }
}
