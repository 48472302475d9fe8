//! Configuration loading for pubflag.
//! Reads pubflag.toml from the current directory or path in PUBFLAG_CONFIG env var.
//!
//! Engine settings (`[publisher]`, `[vocabulary]`, `[resolution]`, `[pass]`,
//! `mode`, `potential_matches`) sit at the top level; `[agent]` holds the
//! binary's own options.

use pubflag_common::TargetConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub target: TargetConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// JSON list of content items; overridden by argv[1] or PUBFLAG_ITEMS
    #[serde(default)]
    pub items_path: Option<String>,
    #[serde(default)]
    pub output: OutputFormat,
    /// Keep running and re-classify whenever the items file changes
    #[serde(default)]
    pub watch: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 { 1_000 }

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            items_path: None,
            output: OutputFormat::default(),
            watch: false,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}


impl Config {
    /// Load configuration from pubflag.toml.
    /// Checks PUBFLAG_CONFIG env var first, then current directory.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("PUBFLAG_CONFIG")
            .unwrap_or_else(|_| "pubflag.toml".to_string());

        if !Path::new(&path).exists() {
            anyhow::bail!(
                "Config file not found: {}\n\
                 Copy pubflag.example.toml to pubflag.toml and edit it.",
                path
            );
        }

        let content = std::fs::read_to_string(&path)?;
        let mut config = Self::parse(&content)?;
        config.apply_env();
        Ok(config)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.target.validate()?;
        Ok(config)
    }

    /// Environment overrides, typically from `.env`.
    pub fn apply_env(&mut self) {
        if let Ok(email) = std::env::var("PUBFLAG_EMAIL") {
            if !email.trim().is_empty() {
                self.target.resolution.email = Some(email.trim().to_string());
            }
        }
        if let Ok(flag) = std::env::var("PUBFLAG_RESOLUTION") {
            self.target.resolution.enabled = !matches!(flag.trim(), "0" | "false" | "off");
        }
    }
}
