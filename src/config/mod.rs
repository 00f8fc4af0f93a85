//! Configuration and constants
//!
//! - [`defaults`] - Built-in default values
//! - [`settings`] - Optional `bleep.toml` workspace settings

pub mod defaults;
pub mod settings;

pub use settings::Settings;
