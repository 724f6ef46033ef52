//! Hashing sessions
//!
//! A [`HashSession`] owns one accepted AF_ALG socket. Bytes written to it are
//! pushed into the kernel with the more-data flag set; [`HashSession::sum`]
//! reads the finalized digest back out.
//!
//! File-backed sources go through a tiered transfer:
//!
//! 1. sendfile, which lets the kernel move file pages straight into the
//!    socket in a single call (that call finalizes the digest, so the session
//!    is sealed afterwards; a short call poisons it)
//! 2. mmap-splice, which maps the file and splices the mapping
//! 3. a buffered copy for everything else
//!
//! A tier that cannot be used falls through to the next one without
//! touching the session.

use crate::config::{Config, WriteMode};
use crate::error::{AlgError, Result};
use crate::mmap::Mapping;
use crate::pipeline::{Partial, send_all, splice_all};
use crate::source::{MAX_SENDFILE, Source, file_window, is_refusal};
use crate::sys::{Pipe, PipePair, Socket, SysSocket, retry};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use tracing::{debug, trace, warn};

/// Capacity of the digest read buffer; large enough for any kernel hash
pub const MAX_DIGEST_SIZE: usize = 128;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Freshly accepted or reset; nothing written yet
    Empty,
    /// Data written, digest not yet read
    Writing,
    /// A sendfile transfer made the kernel finalize; the digest is pending
    Sealed,
    /// Digest read and cached
    Finalized,
    /// A transfer or finalize failure left the kernel state unknown
    Poisoned,
}

/// A streaming hash computed by the kernel
pub trait Hash: io::Write {
    /// Append the digest of everything written so far to `prefix`
    fn sum(&mut self, prefix: &[u8]) -> Result<Vec<u8>>;

    /// Start a new digest
    fn reset(&mut self);

    /// Digest size in bytes
    fn size(&self) -> usize;

    /// Block size in bytes
    fn block_size(&self) -> usize;
}

/// One hashing session accepted from a [`Connection`](crate::Connection)
pub struct HashSession<S: Socket = SysSocket> {
    socket: S,
    pipes: Option<PipePair<S::Pipe>>,
    buf: [u8; MAX_DIGEST_SIZE],
    digest: Vec<u8>,
    size: usize,
    block_size: usize,
    state: SessionState,
    config: Config,
}

impl<S: Socket> HashSession<S> {
    /// Wrap an accepted socket
    ///
    /// `pipes` must be present exactly when the config selects
    /// [`WriteMode::Splice`]; `size` must not exceed [`MAX_DIGEST_SIZE`].
    pub(crate) fn new(
        socket: S,
        pipes: Option<PipePair<S::Pipe>>,
        size: usize,
        block_size: usize,
        config: Config,
    ) -> Self {
        debug_assert_eq!(pipes.is_some(), config.write_mode == WriteMode::Splice);
        debug_assert!(size <= MAX_DIGEST_SIZE);

        Self {
            socket,
            pipes,
            buf: [0; MAX_DIGEST_SIZE],
            digest: Vec::with_capacity(size),
            size,
            block_size,
            state: SessionState::Empty,
            config,
        }
    }

    /// Digest size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Block size in bytes
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Transfer configuration inherited from the connection
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn check_writable(&self) -> Result<()> {
        match self.state {
            SessionState::Empty | SessionState::Writing => Ok(()),
            SessionState::Sealed | SessionState::Finalized => Err(AlgError::Finalized),
            SessionState::Poisoned => Err(AlgError::Poisoned),
        }
    }

    fn fail(&mut self, written: u64, source: io::Error) -> AlgError {
        debug!(
            fd = self.socket.as_raw_fd(),
            written,
            error = %source,
            "transfer failed, poisoning session"
        );
        self.state = SessionState::Poisoned;
        AlgError::transfer(written, source)
    }

    /// Move `data` into the socket with the configured write mode
    fn push(&self, data: &[u8]) -> std::result::Result<(), Partial> {
        match &self.pipes {
            Some(pipes) => splice_all(self.socket.as_raw_fd(), pipes, data),
            None => send_all(&self.socket, data),
        }
    }

    /// Write `data` without finalizing the digest
    ///
    /// Either all of `data` is consumed or the session is poisoned and the
    /// error carries the exact number of bytes the kernel received.
    pub fn write_more(&mut self, data: &[u8]) -> Result<usize> {
        self.check_writable()?;
        if data.is_empty() {
            return Ok(0);
        }

        if let Err((written, e)) = self.push(data) {
            return Err(self.fail(written, e));
        }
        self.state = SessionState::Writing;
        trace!(fd = self.socket.as_raw_fd(), len = data.len(), "wrote");
        Ok(data.len())
    }

    /// Transfer everything `source` yields, returning the byte count
    pub fn read_from<'a>(&mut self, source: impl Into<Source<'a>>) -> Result<u64> {
        self.check_writable()?;
        match source.into() {
            Source::Bytes(bytes) => self.write_more(bytes).map(|n| n as u64),
            Source::File(file) => self.transfer_file(file, None),
            Source::LimitedFile { file, limit } => self.transfer_file(file, Some(limit)),
            Source::Reader(reader) => self.copy_generic(reader),
        }
    }

    fn transfer_file(&mut self, file: &File, limit: Option<u64>) -> Result<u64> {
        if self.config.sendfile {
            if let Some(written) = self.try_sendfile(file, limit)? {
                return Ok(written);
            }
        }
        if let Some(written) = self.try_mmap_splice(file, limit)? {
            return Ok(written);
        }

        let mut reader = file;
        match limit {
            Some(limit) => self.copy_generic(&mut Read::take(reader, limit)),
            None => self.copy_generic(&mut reader),
        }
    }

    /// Tier 1: let the kernel move file pages into the socket
    ///
    /// `Ok(None)` means the tier was not usable and nothing was sent.
    fn try_sendfile(&mut self, file: &File, limit: Option<u64>) -> Result<Option<u64>> {
        let fd = self.socket.as_raw_fd();
        let remain = match file_window(file, limit) {
            Ok((_, remain)) => remain,
            Err(e) => {
                debug!(fd, error = %e, "sendfile unusable, no file window");
                return Ok(None);
            }
        };
        if remain == 0 {
            return Ok(None);
        }
        if remain > MAX_SENDFILE {
            debug!(fd, remain, "file too large for a single sendfile");
            return Ok(None);
        }

        // The kernel finalizes at the end of every sendfile call, so the
        // window has to go through in exactly one call.
        let count = remain as usize;
        let written = match retry(|| self.socket.sendfile(file, count)) {
            Ok(0) => return Ok(None),
            Ok(n) if n == count => n as u64,
            Ok(n) => {
                let short = io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("sendfile moved {n} of {count} bytes"),
                );
                return Err(self.fail(n as u64, short));
            }
            Err(e) if is_refusal(&e) => {
                debug!(fd, error = %e, "sendfile refused, falling back");
                return Ok(None);
            }
            Err(e) => return Err(self.fail(0, e)),
        };
        trace!(fd, written, "sendfile");

        self.state = SessionState::Sealed;
        debug!(fd, written, "sendfile complete, session sealed");
        Ok(Some(written))
    }

    /// Tier 2: map the file and splice the mapped window
    fn try_mmap_splice(&mut self, file: &File, limit: Option<u64>) -> Result<Option<u64>> {
        let fd = self.socket.as_raw_fd();
        let (offset, remain) = match file_window(file, limit) {
            Ok(window) => window,
            Err(e) => {
                debug!(fd, error = %e, "mmap unusable, no file window");
                return Ok(None);
            }
        };
        if remain == 0 {
            return Ok(Some(0));
        }

        let (Ok(start), Ok(end)) = (usize::try_from(offset), usize::try_from(offset + remain))
        else {
            debug!(fd, offset, remain, "file window exceeds address space");
            return Ok(None);
        };
        let mapping = match Mapping::map(file, end) {
            Ok(mapping) => mapping,
            Err(e) => {
                debug!(fd, error = %e, "mmap failed, falling back");
                return Ok(None);
            }
        };

        let mut written: u64 = 0;
        for chunk in mapping.as_slice()[start..end].chunks(self.config.chunk_size) {
            if let Err((n, e)) = self.push(chunk) {
                return Err(self.fail(written + n, e));
            }
            written += chunk.len() as u64;
        }
        self.state = SessionState::Writing;
        drop(mapping);

        let mut cursor = file;
        if let Err(e) = cursor.seek(SeekFrom::Start(offset + remain)) {
            warn!(fd, error = %e, "failed to advance file position after mmap splice");
        }
        debug!(fd, written, "mmap splice complete");
        Ok(Some(written))
    }

    /// Tier 3: buffered copy through the regular write path
    fn copy_generic(&mut self, reader: &mut dyn Read) -> Result<u64> {
        let mut buf = vec![0u8; self.config.chunk_size];
        let mut written: u64 = 0;

        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail(written, e)),
            };
            if let Err((k, e)) = self.push(&buf[..n]) {
                return Err(self.fail(written + k, e));
            }
            self.state = SessionState::Writing;
            written += n as u64;
        }

        trace!(fd = self.socket.as_raw_fd(), written, "buffered copy complete");
        Ok(written)
    }

    /// Append the digest to `out`
    ///
    /// The first call reads the digest from the kernel; later calls return
    /// the cached value until [`reset`](Self::reset).
    pub fn sum_into(&mut self, out: &mut Vec<u8>) -> Result<()> {
        match self.state {
            SessionState::Poisoned => return Err(AlgError::Poisoned),
            SessionState::Finalized => {
                out.extend_from_slice(&self.digest);
                return Ok(());
            }
            SessionState::Empty | SessionState::Writing | SessionState::Sealed => {}
        }

        // Read with the full buffer so a digest longer than declared is seen
        let size = self.size;
        let socket = &self.socket;
        let buf = &mut self.buf;
        let n = match retry(|| socket.read(buf)) {
            Ok(n) if n == size => n,
            Ok(n) => {
                self.state = SessionState::Poisoned;
                return Err(AlgError::FinalizeCorruption(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("kernel returned {n} digest bytes, expected {size}"),
                )));
            }
            Err(e) => {
                self.state = SessionState::Poisoned;
                return Err(AlgError::FinalizeCorruption(e));
            }
        };

        self.digest.clear();
        self.digest.extend_from_slice(&self.buf[..n]);
        self.state = SessionState::Finalized;
        debug!(fd = self.socket.as_raw_fd(), size, "digest finalized");

        out.extend_from_slice(&self.digest);
        Ok(())
    }

    /// `prefix` followed by the digest
    pub fn sum(&mut self, prefix: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(prefix.len() + self.size);
        out.extend_from_slice(prefix);
        self.sum_into(&mut out)?;
        Ok(out)
    }

    /// The digest alone
    pub fn finalize(&mut self) -> Result<Vec<u8>> {
        self.sum(&[])
    }

    /// Re-arm a finalized or sealed session for a new digest
    ///
    /// The kernel starts over on the next write after a finalization, so no
    /// system call is made. In any other state this does nothing.
    pub fn reset(&mut self) {
        if matches!(self.state, SessionState::Finalized | SessionState::Sealed) {
            self.state = SessionState::Empty;
            self.digest.clear();
        }
    }

    /// Close the socket and both pipe ends
    ///
    /// All descriptors are closed even if one fails; the first error is
    /// returned.
    pub fn close(self) -> Result<()> {
        let Self { socket, pipes, .. } = self;
        let mut first = socket.close().err();
        if let Some(PipePair { read, write }) = pipes {
            for result in [read.close(), write.close()] {
                if let Err(e) = result {
                    first.get_or_insert(e);
                }
            }
        }
        match first {
            Some(e) => Err(AlgError::Close(e)),
            None => Ok(()),
        }
    }
}

impl<S: Socket> fmt::Debug for HashSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashSession")
            .field("fd", &self.socket.as_raw_fd())
            .field("size", &self.size)
            .field("block_size", &self.block_size)
            .field("state", &self.state)
            .field("write_mode", &self.config.write_mode)
            .finish()
    }
}

impl<S: Socket> io::Write for HashSession<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_more(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: Socket> Hash for HashSession<S> {
    fn sum(&mut self, prefix: &[u8]) -> Result<Vec<u8>> {
        HashSession::sum(self, prefix)
    }

    fn reset(&mut self) {
        HashSession::reset(self);
    }

    fn size(&self) -> usize {
        HashSession::size(self)
    }

    fn block_size(&self) -> usize {
        HashSession::block_size(self)
    }
}
