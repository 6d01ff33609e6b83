//! # Nota Common Library
//!
//! Shared code for the Nota score services:
//! - Common error type
//! - Configuration loading (environment + TOML)

pub mod config;
pub mod error;

pub use config::ServiceConfig;
pub use error::{Error, Result};
