//! Upstream (Pixelfed/Mastodon API) response shapes
//!
//! Only the fields the aggregator reads are modelled; everything else in the
//! upstream payload is ignored. Ids arrive as JSON strings on Mastodon and
//! sometimes as numbers on Pixelfed, so both are accepted and kept as strings.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// A post ("status") as returned by timeline endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// RFC 3339 creation timestamp
    #[serde(default)]
    pub created_at: Option<String>,
    /// Caption HTML
    #[serde(default)]
    pub content: Option<String>,
    /// Public URL of the post
    #[serde(default)]
    pub url: Option<String>,
    /// An account that does not decode is dropped, not the whole post
    #[serde(default, deserialize_with = "lenient_item")]
    pub account: Option<Account>,
    /// Absent on some Pixelfed payloads; treated as "no media"
    #[serde(default, deserialize_with = "lenient_list")]
    pub media_attachments: Option<Vec<MediaAttachment>>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub tags: Option<Vec<Tag>>,
    #[serde(default)]
    pub location: Option<Value>,
    #[serde(default)]
    pub place: Option<Value>,
    #[serde(default)]
    pub geo: Option<Value>,
}

/// Account summary embedded in a status or returned by account lookups
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// `name` for local accounts, `name@domain` for remote ones
    #[serde(default)]
    pub acct: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaAttachment {
    #[serde(default, deserialize_with = "opt_id_string")]
    pub id: Option<String>,
    /// "image", "video", "gifv", "audio", "unknown"
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tag {
    pub name: String,
}

/// `GET /api/v2/search` response (only the accounts section is read)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub accounts: Vec<AccountRef>,
}

/// Minimal account reference; tolerant of a missing id
#[derive(Debug, Clone, Deserialize)]
pub struct AccountRef {
    #[serde(default, deserialize_with = "opt_id_string")]
    pub id: Option<String>,
}

/// Convert a JSON string or number into an id string
pub fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    id_from_value(&value).ok_or_else(|| serde::de::Error::custom("expected string or numeric id"))
}

/// Decode an optional object, treating a malformed one as absent
fn lenient_item<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// Decode an optional array, skipping elements that do not decode;
/// a non-array value counts as absent
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => Some(
            items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
        ),
        _ => None,
    })
}

fn opt_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(id_from_value))
}
