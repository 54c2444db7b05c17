//! Normalized photo record served to the viewer

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// Author summary attached to every photo of a post
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoAuthor {
    pub account_id: String,
    /// `acct` (falls back to `username`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
}

/// One displayable image: a (post, image attachment) pairing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    /// `<statusId>:<mediaId>`; unique within a result set
    pub id: String,
    /// `None` when the upstream timestamp is missing or unparsable
    pub created_at: Option<DateTime<Utc>>,
    pub media_url: String,
    pub preview_url: String,
    pub caption_html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<PhotoAuthor>,
    /// Opaque passthrough (string or place object)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Value>,
    /// Lowercase tag names
    pub tags: BTreeSet<String>,
}

impl PhotoRecord {
    pub fn author_id(&self) -> Option<&str> {
        self.author.as_ref().map(|a| a.account_id.as_str())
    }
}
