//! Client configuration, read from `config.toml`.

use std::fs;
use std::path::Path;
use serde::Deserialize;
use url::Url;
use crate::upload::{Result, UploadPolicy};

fn default_max_file_size_mb() -> u64 {
    30
}

fn default_event_capacity() -> usize {
    256
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// File upload endpoint of the node.
    pub endpoint: String,
    pub session_id: String,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    /// Events buffered per subscriber before it starts lagging.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Config {
    pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
        let config_str = fs::read_to_string(path)?;
        Self::from_toml_str(&config_str)
    }

    pub fn from_toml_str(config_str: &str) -> Result<Config> {
        Ok(toml::from_str(config_str)?)
    }

    /// Upload policy for this node and session.
    pub fn policy(&self) -> Result<UploadPolicy> {
        let endpoint = Url::parse(&self.endpoint)?;
        UploadPolicy::new(self.max_file_size_mb, endpoint).with_session(&self.session_id)
    }
}
