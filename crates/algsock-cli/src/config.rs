//! Configuration file for `algsum`

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Extra hash registered on top of the builtin table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashEntry {
    /// Kernel algorithm name
    pub name: String,
    /// Digest size in bytes
    pub digest_size: usize,
    /// Block size in bytes
    pub block_size: usize,
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Algorithm used when `--algorithm` is not given
    pub algorithm: String,
    /// Connection and transfer settings
    pub alg: algsock::Config,
    /// Additional algorithms the kernel is known to provide
    #[serde(rename = "hash")]
    pub hashes: Vec<HashEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            algorithm: "sha1".to_string(),
            alg: algsock::Config::default(),
            hashes: Vec::new(),
        }
    }
}

impl Config {
    /// `~/.config/algsock/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("algsock")
            .join("config.toml")
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load the default file, or defaults if it does not exist
    pub fn load_or_default() -> Result<Self> {
        Self::load_or_default_from(&Self::default_path())
    }

    /// Load `path`, or defaults if it does not exist
    pub fn load_or_default_from(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.algorithm.is_empty() {
            bail!("algorithm must not be empty");
        }
        self.alg.validate()?;
        for entry in &self.hashes {
            if entry.digest_size == 0 || entry.block_size == 0 {
                bail!("hash {:?} needs non-zero digest and block sizes", entry.name);
            }
        }
        Ok(())
    }

    /// Builtin registry extended with the configured hashes
    pub fn registry(&self) -> algsock::Registry {
        self.hashes
            .iter()
            .fold(algsock::Registry::builtin(), |registry, entry| {
                registry.with_hash(&entry.name, entry.digest_size, entry.block_size)
            })
    }
}
