//! Data models for the photo aggregator

pub mod photo;
pub mod query;
pub mod upstream;

pub use photo::{PhotoAuthor, PhotoRecord};
pub use query::{
    normalize_tag, normalize_tags, Limit, PhotoQuery, QueryError, QueryKind, TagMode,
    DEFAULT_LIMIT, MAX_LIMIT, MIN_LIMIT,
};
pub use upstream::{Account, MediaAttachment, SearchResults, Status, Tag};
