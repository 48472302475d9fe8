//! pubflag-common — Shared types, errors, and configuration used across all pubflag crates.

pub mod error;
pub mod target_config;
pub mod sandbox;

// Re-export commonly used types
pub use error::{PubflagError, Result};
pub use target_config::{
    Mode, PassConfig, PublisherSpec, ResolutionConfig, TargetConfig, Vocabulary,
};
