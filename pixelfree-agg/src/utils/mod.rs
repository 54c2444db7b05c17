//! Utility modules

pub mod http_retry;

pub use http_retry::{retry_transient, RetryPolicy, TransientError};
