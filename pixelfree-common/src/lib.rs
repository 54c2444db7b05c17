//! # PixelFree Common Library
//!
//! Shared code for the PixelFree services including:
//! - Common error and result types
//! - TOML configuration model and loading
//! - OS-dependent compiled defaults

pub mod config;
pub mod error;

pub use error::{Error, Result};
