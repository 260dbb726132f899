use crate::args::{Args, KeyArgs};
use crate::commit::Anchoring;
use crate::errors::*;
use crate::keyring::{self, KeySource};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Armored public key that replaces the compiled-in default key
    pub default_key: Option<String>,
    /// Keyring files that are always trusted
    #[serde(default)]
    pub keyrings: Vec<PathBuf>,
    #[serde(default)]
    pub strict_headers: bool,
}

impl Config {
    pub async fn load_config_from(path: &Path) -> Result<Self> {
        let buf = fs::read_to_string(&path).await?;
        let config = toml::from_str(&buf)?;
        Ok(config)
    }

    pub async fn load_with_args(args: &Args) -> Result<Self> {
        let path = match &args.config {
            Some(path) => Some(path.clone()),
            None => Self::default_path().filter(|path| path.exists()),
        };

        let config = if let Some(path) = path {
            debug!("Loading configuration from {path:?}");
            Self::load_config_from(&path)
                .await
                .with_context(|| anyhow!("Failed to load configuration from {:?}", path))?
        } else {
            Config::default()
        };

        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        let config_dir = dirs::config_dir()?;
        Some(config_dir.join("commit-sigcheck.toml"))
    }

    /// The configured default key, falling back to the one the binary was built with.
    pub fn default_source(&self, compiled_in: Option<&str>) -> Option<KeySource> {
        if let Some(key) = &self.default_key {
            Some(KeySource::new("default key from config", key.as_bytes()))
        } else {
            compiled_in.map(|key| KeySource::new("compiled-in default key", key.as_bytes()))
        }
    }

    /// Default key, configured keyrings, then keys given on the command line.
    pub fn key_sources(
        &self,
        compiled_in: Option<&str>,
        args: &KeyArgs,
    ) -> Result<Vec<KeySource>, InputError> {
        let mut sources = Vec::new();
        if !args.no_default_key {
            sources.extend(self.default_source(compiled_in));
        }
        sources.extend(keyring::read_sources(&self.keyrings)?);
        sources.extend(keyring::read_sources(&args.keys)?);
        Ok(sources)
    }

    pub fn anchoring(&self, strict_headers: bool) -> Anchoring {
        if strict_headers || self.strict_headers {
            Anchoring::Headers
        } else {
            Anchoring::FirstMatch
        }
    }
}
