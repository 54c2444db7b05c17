//! HTTP API handlers for pixelfree-agg

pub mod accounts;
pub mod health;
pub mod photos;

pub use accounts::account_routes;
pub use health::health_routes;
pub use photos::photo_routes;
