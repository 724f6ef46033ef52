//! # algsock
//!
//! Streaming hashes computed by the Linux kernel crypto API over `AF_ALG`
//! sockets.
//!
//! This crate provides:
//! - [`Connection`]: a socket bound once to a kernel transformation that
//!   accepts any number of independent hashing sessions
//! - [`HashSession`]: incremental `write` plus finalize-read, usable through
//!   [`std::io::Write`] and the [`Hash`] trait
//! - A zero-copy write path (vmsplice into a pipe, splice into the socket)
//!   with a `send(MSG_MORE)` alternative
//! - Tiered file transfer: sendfile, then mmap-splice, then a buffered copy
//! - An immutable algorithm [`Registry`] consulted before any socket is opened
//!
//! On platforms without `AF_ALG` every kernel operation reports
//! [`AlgError::Unimplemented`].
//!
//! ```no_run
//! use algsock::{Connection, Registry, Transform};
//! use std::io::Write;
//!
//! let registry = Registry::builtin();
//! let conn = Connection::dial(&registry, Transform::SHA256, None)?;
//! let mut session = conn.session()?;
//! session.write_all(b"hello world")?;
//! let digest = session.finalize()?;
//! assert_eq!(digest.len(), 32);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod addr;
pub mod config;
pub mod conn;
pub mod error;
pub mod hash;
pub mod registry;
pub mod source;
pub mod sys;

// Transfer internals
mod mmap;
mod pipeline;

pub use addr::{AlgAddr, Transform, TransformKind};
pub use config::{Config, DEFAULT_SOCKET_BUFFER_SIZE, WriteMode};
pub use conn::Connection;
pub use error::{AlgError, Result};
pub use hash::{Hash, HashSession, SessionState};
pub use registry::{Algorithm, Registry};
pub use source::Source;
