//! Shared error model, configuration, and credentials for storygraph.
//!
//! This crate is the foundation depended on by all other storygraph crates.
//! It provides:
//! - [`StoryGraphError`], the unified error type
//! - Configuration ([`AppConfig`], [`SessionConfig`], config loading)
//! - The on-disk [`Credentials`] file

pub mod config;
pub mod credentials;
pub mod error;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CredentialsConfig, DEFAULT_BASE_URL, SessionConfig, SiteConfig, config_dir,
    config_file_path, expand_home, init_config, load_config, load_config_from,
};
pub use credentials::Credentials;
pub use error::{Result, StoryGraphError};
