//! Transformation descriptors
//!
//! An [`AlgAddr`] is the platform-neutral form of the kernel's
//! `sockaddr_alg`: transformation type, algorithm name and the optional
//! feature/mask bits.

use crate::config::Config;
use crate::error::{AlgError, Result};
use std::fmt;
use std::str::FromStr;

/// Capacity of `salg_type`, including the NUL terminator
pub const SALG_TYPE_LEN: usize = 14;

/// Capacity of `salg_name`, including the NUL terminator
pub const SALG_NAME_LEN: usize = 64;

/// Kernel transformation types understood by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    /// Message digests (`"hash"`)
    Hash,
}

impl TransformKind {
    /// The `salg_type` string for this kind
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hash => "hash",
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransformKind {
    type Err = AlgError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hash" => Ok(Self::Hash),
            other => Err(AlgError::UnsupportedTransform(other.to_string())),
        }
    }
}

/// A transformation kind paired with an algorithm name, as passed to dial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transform<'a> {
    /// Transformation type
    pub kind: TransformKind,
    /// Kernel algorithm name
    pub name: &'a str,
}

impl Transform<'static> {
    /// MD5 digests
    pub const MD5: Self = Transform::hash("md5");
    /// SHA-1 digests
    pub const SHA1: Self = Transform::hash("sha1");
    /// SHA-256 digests
    pub const SHA256: Self = Transform::hash("sha256");
}

impl<'a> Transform<'a> {
    /// A hash transformation for `name`
    pub const fn hash(name: &'a str) -> Self {
        Self {
            kind: TransformKind::Hash,
            name,
        }
    }
}

/// Bind address of an AF_ALG socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgAddr {
    kind: TransformKind,
    name: String,
    feature: u32,
    mask: u32,
}

impl AlgAddr {
    /// Build a descriptor, checking the kernel's field limits
    pub fn new(kind: TransformKind, name: &str, feature: u32, mask: u32) -> Result<Self> {
        if name.is_empty() {
            return Err(AlgError::InvalidConfig("algorithm name is empty".into()));
        }
        if name.len() >= SALG_NAME_LEN {
            return Err(AlgError::InvalidConfig(format!(
                "algorithm name {name:?} exceeds {} bytes",
                SALG_NAME_LEN - 1
            )));
        }
        if name.as_bytes().contains(&0) {
            return Err(AlgError::InvalidConfig(format!(
                "algorithm name {name:?} contains NUL"
            )));
        }
        debug_assert!(kind.as_str().len() < SALG_TYPE_LEN);

        Ok(Self {
            kind,
            name: name.to_string(),
            feature,
            mask,
        })
    }

    /// Build a descriptor from a transform and connection config
    pub fn from_config(transform: Transform<'_>, config: &Config) -> Result<Self> {
        Self::new(transform.kind, transform.name, config.feature, config.mask)
    }

    /// Transformation type
    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    /// Algorithm name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Feature bits
    pub fn feature(&self) -> u32 {
        self.feature
    }

    /// Mask bits
    pub fn mask(&self) -> u32 {
        self.mask
    }
}

impl fmt::Display for AlgAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse() {
        assert_eq!("hash".parse::<TransformKind>().unwrap(), TransformKind::Hash);
        assert!(matches!(
            "skcipher".parse::<TransformKind>(),
            Err(AlgError::UnsupportedTransform(t)) if t == "skcipher"
        ));
    }

    #[test]
    fn test_addr_limits() {
        assert!(AlgAddr::new(TransformKind::Hash, "sha1", 0, 0).is_ok());
        assert!(AlgAddr::new(TransformKind::Hash, "", 0, 0).is_err());
        assert!(AlgAddr::new(TransformKind::Hash, "a\0b", 0, 0).is_err());

        let longest = "x".repeat(SALG_NAME_LEN - 1);
        assert!(AlgAddr::new(TransformKind::Hash, &longest, 0, 0).is_ok());
        let too_long = "x".repeat(SALG_NAME_LEN);
        assert!(matches!(
            AlgAddr::new(TransformKind::Hash, &too_long, 0, 0),
            Err(AlgError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_addr_from_config() {
        let config = Config {
            feature: 1,
            mask: 2,
            ..Default::default()
        };
        let addr = AlgAddr::from_config(Transform::SHA256, &config).unwrap();
        assert_eq!(addr.kind(), TransformKind::Hash);
        assert_eq!(addr.name(), "sha256");
        assert_eq!((addr.feature(), addr.mask()), (1, 2));
        assert_eq!(addr.to_string(), "hash(sha256)");
    }
}
