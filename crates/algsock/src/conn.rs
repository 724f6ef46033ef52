//! Bound AF_ALG connections
//!
//! A [`Connection`] is bound to one transformation once and hands out any
//! number of independent [`HashSession`]s, one per accepted socket.

use crate::addr::{AlgAddr, Transform, TransformKind};
use crate::config::{Config, WriteMode};
use crate::error::{AlgError, Result};
use crate::hash::{HashSession, MAX_DIGEST_SIZE};
use crate::registry::{Algorithm, Registry};
use crate::sys::{Socket, SysSocket};
use std::fmt;
use std::io;
use tracing::{debug, warn};

/// A socket bound to a kernel transformation
pub struct Connection<S: Socket = SysSocket> {
    socket: S,
    addr: AlgAddr,
    algorithm: Algorithm,
    config: Config,
}

fn dial_error(err: io::Error) -> AlgError {
    if err.kind() == io::ErrorKind::Unsupported {
        AlgError::unimplemented()
    } else {
        AlgError::Dial(err)
    }
}

/// Check a transform against the registry and build its bind address
fn resolve(
    registry: &Registry,
    transform: Transform<'_>,
    config: Option<&Config>,
) -> Result<(AlgAddr, Algorithm, Config)> {
    let config = config.cloned().unwrap_or_default();
    config.validate()?;

    let algorithm = match transform.kind {
        TransformKind::Hash => registry
            .lookup(transform.name)
            .cloned()
            .ok_or_else(|| AlgError::UnsupportedAlgorithm(transform.name.to_string()))?,
    };
    let addr = AlgAddr::from_config(transform, &config)?;
    Ok((addr, algorithm, config))
}

impl Connection<SysSocket> {
    /// Open an AF_ALG socket and bind it to `transform`
    ///
    /// The transform is checked against `registry` before any socket is
    /// created. `None` for `config` means [`Config::default`].
    ///
    /// # Errors
    ///
    /// - [`AlgError::UnsupportedAlgorithm`] if the registry does not know the name
    /// - [`AlgError::InvalidConfig`] for bad config or an oversized name
    /// - [`AlgError::Dial`] with the OS error if socket creation or bind fails
    /// - [`AlgError::Unimplemented`] on platforms without AF_ALG
    pub fn dial(
        registry: &Registry,
        transform: Transform<'_>,
        config: Option<&Config>,
    ) -> Result<Self> {
        let (addr, algorithm, config) = resolve(registry, transform, config)?;
        let socket = SysSocket::open().map_err(dial_error)?;
        Self::bind_resolved(socket, addr, algorithm, config)
    }
}

impl<S: Socket> Connection<S> {
    /// Bind an already opened socket to `transform`
    pub fn bind(
        socket: S,
        registry: &Registry,
        transform: Transform<'_>,
        config: Option<&Config>,
    ) -> Result<Self> {
        let (addr, algorithm, config) = resolve(registry, transform, config)?;
        Self::bind_resolved(socket, addr, algorithm, config)
    }

    fn bind_resolved(socket: S, addr: AlgAddr, algorithm: Algorithm, config: Config) -> Result<Self> {
        socket.bind(&addr).map_err(dial_error)?;
        debug!(fd = socket.as_raw_fd(), %addr, "bound AF_ALG socket");

        Ok(Self {
            socket,
            addr,
            algorithm,
            config,
        })
    }

    /// Accept a new session with explicit digest and block sizes
    ///
    /// In [`WriteMode::Splice`] the session also gets its own pipe pair; if
    /// that fails the accepted socket is released again.
    pub fn accept_session(&self, digest_size: usize, block_size: usize) -> Result<HashSession<S>> {
        if digest_size > MAX_DIGEST_SIZE {
            return Err(AlgError::InvalidConfig(format!(
                "digest size {digest_size} exceeds {MAX_DIGEST_SIZE} bytes"
            )));
        }

        let socket = self.socket.accept().map_err(AlgError::Accept)?;
        let pipes = match self.config.write_mode {
            WriteMode::Send => None,
            WriteMode::Splice => match socket.open_pipe() {
                Ok(pipes) => Some(pipes),
                Err(e) => {
                    let fd = socket.as_raw_fd();
                    if let Err(close_err) = socket.close() {
                        warn!(fd, error = %close_err, "failed to close session socket");
                    }
                    return Err(AlgError::Pipe(e));
                }
            },
        };

        debug!(
            fd = socket.as_raw_fd(),
            algorithm = self.algorithm.name(),
            mode = ?self.config.write_mode,
            "accepted hash session"
        );
        Ok(HashSession::new(
            socket,
            pipes,
            digest_size,
            block_size,
            self.config.clone(),
        ))
    }

    /// Accept a new session sized for the bound algorithm
    pub fn session(&self) -> Result<HashSession<S>> {
        self.accept_session(self.algorithm.digest_size(), self.algorithm.block_size())
    }

    /// The algorithm resolved at dial time
    pub fn algorithm(&self) -> &Algorithm {
        &self.algorithm
    }

    /// The bind address
    pub fn addr(&self) -> &AlgAddr {
        &self.addr
    }

    /// Configuration applied to new sessions
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Close the bound socket; open sessions are unaffected
    pub fn close(self) -> Result<()> {
        self.socket.close().map_err(AlgError::Close)
    }
}

impl<S: Socket> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("fd", &self.socket.as_raw_fd())
            .field("addr", &self.addr)
            .field("algorithm", &self.algorithm)
            .field("config", &self.config)
            .finish()
    }
}
