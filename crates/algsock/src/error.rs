//! Error types for AF_ALG connections and hash sessions

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, AlgError>;

/// Errors that can occur while talking to the kernel crypto API
#[derive(Debug, Error)]
pub enum AlgError {
    /// The algorithm name is not present in the registry
    #[error("unknown hash algorithm {0:?}")]
    UnsupportedAlgorithm(String),

    /// The transformation type is not supported
    #[error("transformation type {0:?} unsupported")]
    UnsupportedTransform(String),

    /// Invalid configuration or transformation descriptor
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Socket creation or bind failed
    #[error("failed to dial kernel crypto API: {0}")]
    Dial(#[source] io::Error),

    /// Accepting a new hash session failed
    #[error("failed to accept hash session: {0}")]
    Accept(#[source] io::Error),

    /// Creating the session's pipe pair failed
    #[error("failed to create splice pipe: {0}")]
    Pipe(#[source] io::Error),

    /// A write or read primitive failed while moving data into the kernel
    #[error("transfer failed after {written} bytes: {source}")]
    Transfer {
        /// Bytes delivered to the kernel before the failure
        written: u64,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// The kernel refused to hand out a digest for an established session
    #[error("failed to read out finalized hash: {0}")]
    FinalizeCorruption(#[source] io::Error),

    /// Data was written to a session whose digest is already final
    #[error("hash session already finalized")]
    Finalized,

    /// A previous transfer or finalize failure left the session unusable
    #[error("hash session is unusable after an earlier failure")]
    Poisoned,

    /// Closing a descriptor failed
    #[error("failed to close descriptor: {0}")]
    Close(#[source] io::Error),

    /// AF_ALG sockets do not exist on this platform
    #[error("AF_ALG sockets not implemented on {os}/{arch}")]
    Unimplemented {
        /// Target operating system
        os: &'static str,
        /// Target architecture
        arch: &'static str,
    },
}

impl AlgError {
    /// The platform-unimplemented error for the current target
    #[must_use]
    pub fn unimplemented() -> Self {
        Self::Unimplemented {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
        }
    }

    /// Bytes delivered before a transfer failure, if this is one
    #[must_use]
    pub fn written(&self) -> Option<u64> {
        match self {
            Self::Transfer { written, .. } => Some(*written),
            _ => None,
        }
    }

    pub(crate) fn transfer(written: u64, source: io::Error) -> Self {
        Self::Transfer { written, source }
    }
}

impl From<AlgError> for io::Error {
    fn from(err: AlgError) -> Self {
        let kind = match &err {
            AlgError::Dial(e)
            | AlgError::Accept(e)
            | AlgError::Pipe(e)
            | AlgError::Close(e)
            | AlgError::FinalizeCorruption(e)
            | AlgError::Transfer { source: e, .. } => e.kind(),
            AlgError::UnsupportedAlgorithm(_)
            | AlgError::UnsupportedTransform(_)
            | AlgError::InvalidConfig(_) => io::ErrorKind::InvalidInput,
            AlgError::Unimplemented { .. } => io::ErrorKind::Unsupported,
            AlgError::Finalized | AlgError::Poisoned => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
