//! Infrastructure layer: configuration loading.

pub mod config;

pub use config::{ConfigError, ConfigLoader};
