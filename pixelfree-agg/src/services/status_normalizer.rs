//! Status normalizer
//!
//! Turns one upstream status into zero or more `PhotoRecord`s, one per image
//! attachment. Pure: no I/O.

use crate::models::{normalize_tag, PhotoAuthor, PhotoRecord, Status};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeSet;

const IMAGE_KIND: &str = "image";

/// Convert one status into photo records
///
/// A status without a media collection, or with no image attachments that
/// carry a URL, yields an empty vector.
pub fn to_photo_records(status: &Status) -> Vec<PhotoRecord> {
    let Some(attachments) = status.media_attachments.as_ref() else {
        return Vec::new();
    };

    let created_at = status.created_at.as_deref().and_then(parse_timestamp);
    let author = status.account.as_ref().map(|account| PhotoAuthor {
        account_id: account.id.clone(),
        handle: account.acct.clone().or_else(|| account.username.clone()),
        display_name: account.display_name.clone(),
        avatar_url: account.avatar.clone(),
        profile_url: account.url.clone(),
    });
    let caption_html = status.content.clone().unwrap_or_default();
    let location = first_present([&status.location, &status.place, &status.geo]);
    let tags: BTreeSet<String> = status
        .tags
        .iter()
        .flatten()
        .filter_map(|t| normalize_tag(&t.name))
        .collect();

    attachments
        .iter()
        .enumerate()
        .filter(|(_, media)| media.kind.as_deref() == Some(IMAGE_KIND))
        .filter_map(|(index, media)| {
            let media_url = media.url.clone().filter(|u| !u.is_empty())?;
            let preview_url = media
                .preview_url
                .clone()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| media_url.clone());
            let media_key = media.id.clone().unwrap_or_else(|| index.to_string());

            Some(PhotoRecord {
                id: format!("{}:{}", status.id, media_key),
                created_at,
                media_url,
                preview_url,
                caption_html: caption_html.clone(),
                post_url: status.url.clone(),
                author: author.clone(),
                location: location.clone(),
                tags: tags.clone(),
            })
        })
        .collect()
}

/// Decode a timeline payload into statuses
///
/// A non-array body yields nothing; elements that do not decode as a status
/// are skipped.
pub fn decode_statuses(body: &Value) -> Vec<Status> {
    let Some(items) = body.as_array() else {
        tracing::debug!("Timeline payload is not an array; ignoring");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<Status>(item.clone()) {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping undecodable status");
                None
            }
        })
        .collect()
}

/// Decode a timeline payload straight into photo records
pub fn records_from_timeline(body: &Value) -> Vec<PhotoRecord> {
    decode_statuses(body)
        .iter()
        .flat_map(to_photo_records)
        .collect()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn first_present(candidates: [&Option<Value>; 3]) -> Option<Value> {
    candidates
        .into_iter()
        .flatten()
        .find(|v| !v.is_null())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status(value: Value) -> Status {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_no_media_collection_yields_nothing() {
        let s = status(json!({ "id": "1", "content": "text only" }));
        assert!(to_photo_records(&s).is_empty());
    }

    #[test]
    fn test_video_only_yields_nothing() {
        let s = status(json!({
            "id": "1",
            "media_attachments": [{ "id": "m1", "type": "video", "url": "https://x/v.mp4" }]
        }));
        assert!(to_photo_records(&s).is_empty());
    }

    #[test]
    fn test_image_without_url_is_skipped() {
        let s = status(json!({
            "id": "1",
            "media_attachments": [{ "id": "m1", "type": "image" }]
        }));
        assert!(to_photo_records(&s).is_empty());
    }

    #[test]
    fn test_one_record_per_image_sharing_status_fields() {
        let s = status(json!({
            "id": "100",
            "created_at": "2024-05-01T12:00:00.000Z",
            "content": "<p>Otters!</p>",
            "url": "https://pixelfed.example/p/alice/100",
            "account": {
                "id": "42",
                "acct": "alice@pixelfed.example",
                "username": "alice",
                "display_name": "Alice",
                "avatar": "https://x/avatar.png"
            },
            "tags": [{ "name": "Otters" }, { "name": "river" }],
            "media_attachments": [
                { "id": "a", "type": "image", "url": "https://x/a.jpg", "preview_url": "https://x/a_s.jpg" },
                { "id": "b", "type": "video", "url": "https://x/b.mp4" },
                { "id": "c", "type": "image", "url": "https://x/c.jpg" }
            ]
        }));

        let records = to_photo_records(&s);
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].id, "100:a");
        assert_eq!(records[0].media_url, "https://x/a.jpg");
        assert_eq!(records[0].preview_url, "https://x/a_s.jpg");
        assert_eq!(records[1].id, "100:c");
        assert_eq!(records[1].media_url, "https://x/c.jpg");
        assert_eq!(records[1].preview_url, "https://x/c.jpg");

        for r in &records {
            assert_eq!(r.caption_html, "<p>Otters!</p>");
            assert_eq!(r.author_id(), Some("42"));
            assert_eq!(
                r.author.as_ref().unwrap().handle.as_deref(),
                Some("alice@pixelfed.example")
            );
            assert!(r.tags.contains("otters"));
            assert!(r.tags.contains("river"));
            assert_eq!(r.post_url.as_deref(), Some("https://pixelfed.example/p/alice/100"));
            assert!(r.created_at.is_some());
        }
        assert_eq!(records[0].author, records[1].author);
        assert_eq!(records[0].tags, records[1].tags);
    }

    #[test]
    fn test_media_id_falls_back_to_index() {
        let s = status(json!({
            "id": "7",
            "media_attachments": [
                { "type": "image", "url": "https://x/1.jpg" },
                { "type": "image", "url": "https://x/2.jpg" }
            ]
        }));
        let ids: Vec<_> = to_photo_records(&s).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["7:0", "7:1"]);
    }

    #[test]
    fn test_unparsable_timestamp_and_handle_fallback() {
        let s = status(json!({
            "id": "8",
            "created_at": "yesterday",
            "account": { "id": 5, "username": "bob" },
            "place": { "name": "Lake" },
            "media_attachments": [{ "id": 1, "type": "image", "url": "https://x/1.jpg" }]
        }));
        let records = to_photo_records(&s);
        assert_eq!(records.len(), 1);
        assert!(records[0].created_at.is_none());
        assert_eq!(records[0].author.as_ref().unwrap().handle.as_deref(), Some("bob"));
        assert_eq!(records[0].location, Some(json!({ "name": "Lake" })));
        assert_eq!(records[0].caption_html, "");
    }

    #[test]
    fn test_decode_statuses_skips_garbage() {
        let body = json!([
            { "id": "1", "media_attachments": [] },
            { "no_id": true },
            "nonsense"
        ]);
        assert_eq!(decode_statuses(&body).len(), 1);
        assert!(decode_statuses(&json!({ "error": "x" })).is_empty());
    }

    #[test]
    fn test_malformed_sub_fields_keep_the_images() {
        let body = json!([
            {
                "id": "10",
                "created_at": "2024-05-01T10:00:00Z",
                "account": { "acct": "anon" },
                "media_attachments": [{ "id": "a", "type": "image", "url": "https://x/10.jpg" }]
            },
            {
                "id": "11",
                "created_at": "2024-05-01T11:00:00Z",
                "account": { "id": "5", "acct": "eve" },
                "tags": [{ "url": "https://x/tags/broken" }, { "name": "Otters" }],
                "media_attachments": [{ "id": "b", "type": "image", "url": "https://x/11.jpg" }]
            }
        ]);

        let records = records_from_timeline(&body);
        assert_eq!(records.len(), 2);
        assert!(records[0].author.is_none());
        assert_eq!(records[1].author_id(), Some("5"));
        assert!(records[1].tags.contains("otters"));
    }
}
