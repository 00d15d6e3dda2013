// src/config/mod.rs

//! Configuration loading and validation for nodeagent.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Parse duration settings (`duration.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate the raw model into a [`ConfigFile`] (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{AgentSettings, ClientSection, ConfigFile, RawAgentSection, RawConfigFile};
