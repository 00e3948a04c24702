//! Core types and utilities

pub mod config;
pub mod error;
pub mod logging;

pub use config::BuilderConfig;
pub use error::Error;

/// Standard Result type for the converter
pub type Result<T> = std::result::Result<T, Error>;
