use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use pyr_diff::DEFAULT_FIELDS;
use pyr_export::{ExportConfig, DEFAULT_OPENING_DATE};

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "pyr.toml";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub export: ExportSection,
    pub diff: DiffSection,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub username: String,
    /// Environment variable holding the password.
    pub password_env: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".into(),
            username: "admin".into(),
            password_env: "PYR_REMOTE_PASSWORD".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSection {
    pub update_batch_size: usize,
    pub opening_date: String,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            update_batch_size: 4,
            opening_date: DEFAULT_OPENING_DATE.into(),
        }
    }
}

impl From<&ExportSection> for ExportConfig {
    fn from(section: &ExportSection) -> Self {
        Self {
            update_batch_size: section.update_batch_size,
            opening_date: section.opening_date.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffSection {
    pub fields: Vec<String>,
}

impl Default for DiffSection {
    fn default() -> Self {
        Self {
            fields: DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid configuration")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Load `path`, or `pyr.toml` if it exists, or fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::load(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Password for the remote, read from the configured variable.
    pub fn remote_password(&self) -> anyhow::Result<String> {
        std::env::var(&self.remote.password_env)
            .with_context(|| format!("environment variable {} is not set", self.remote.password_env))
    }
}
