//! Process-wide node configuration.

pub mod settings;

pub use settings::{Config, GLOBAL_CONFIG};
