//! Core shared logic for the Hangar mod loader.
//!
//! This crate provides the pieces used by every other Hangar crate and by the
//! `hangar` CLI:
//!
//! - [`GameLayout`]: every directory the loader reads from or writes to,
//!   derived from a single game directory
//! - [`HangarConfig`]: the loader's `hangar.toml`, loaded leniently
//! - [`fs`]: directory wiping, sorted file listing and timestamp helpers

mod config;
mod error;
pub mod fs;
mod layout;

pub use config::{HangarConfig, LogConfig, MergeConfig, RelinkConfig, CONFIG_FILE_NAME};
pub use error::{Error, Result};
pub use layout::{detect_game_dir, is_valid_game_dir, GameLayout, MODULE_EXTENSION};
