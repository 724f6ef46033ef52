//! Connection and transfer configuration

use crate::error::{AlgError, Result};
use serde::{Deserialize, Serialize};

/// Size of the pipe relay and of the chunks fed through it (64 KiB).
///
/// Matches the default pipe capacity on Linux, so a single vmsplice never
/// has to wait for the reader.
pub const DEFAULT_SOCKET_BUFFER_SIZE: usize = 64 * 1024;

/// How session writes reach the kernel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// vmsplice into a pipe, then splice the pipe into the socket
    #[default]
    Splice,
    /// `send(MSG_MORE)` directly on the socket (one extra copy)
    Send,
}

/// Optional parameters for a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `salg_feat` bits of the bind address
    pub feature: u32,
    /// `salg_mask` bits of the bind address
    pub mask: u32,
    /// Write strategy for sessions created from the connection
    pub write_mode: WriteMode,
    /// Try `sendfile` first for file-backed sources
    pub sendfile: bool,
    /// Chunk size for mmap-splice and buffered copies
    pub chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feature: 0,
            mask: 0,
            write_mode: WriteMode::Splice,
            sendfile: true,
            chunk_size: DEFAULT_SOCKET_BUFFER_SIZE,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(AlgError::InvalidConfig("chunk_size must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.feature, 0);
        assert_eq!(config.mask, 0);
        assert_eq!(config.write_mode, WriteMode::Splice);
        assert!(config.sendfile);
        assert_eq!(config.chunk_size, 64 * 1024);
    }

    #[test]
    fn test_config_validate() {
        let config = Config {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AlgError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_partial_deserialize() {
        let config: Config = serde_json::from_str(r#"{"write_mode":"send","mask":4}"#).unwrap();
        assert_eq!(config.write_mode, WriteMode::Send);
        assert_eq!(config.mask, 4);
        assert!(config.sendfile);
        assert_eq!(config.chunk_size, DEFAULT_SOCKET_BUFFER_SIZE);
    }
}
