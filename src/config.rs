//! Configuration for the verification engine and the http requestor.
//!
//! Everything has a default, so an empty TOML document is a valid config.

use crate::error::{Error, Result};
use serde_derive::{Deserialize, Serialize};

/// Engine and requestor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, getset::Getters, getset::Setters)]
#[getset(get = "pub", set = "pub")]
pub struct Config {
    /// The `User-Agent` header sent along with proof fetches.
    #[serde(default = "default_user_agent")]
    user_agent: String,

    /// Proof content bigger than this is rejected without looking at it.
    #[serde(default = "default_max_content_bytes")]
    max_content_bytes: usize,

    /// The number of results a search returns when the request doesn't say.
    #[serde(default = "default_search_limit")]
    search_limit: usize,
}

fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

fn default_max_content_bytes() -> usize {
    1024 * 1024
}

fn default_search_limit() -> usize {
    100
}

impl Config {
    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            max_content_bytes: default_max_content_bytes(),
            search_limit: default_search_limit(),
        }
    }
}
