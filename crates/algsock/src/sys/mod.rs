//! Socket and pipe capabilities
//!
//! The transfer pipeline only ever talks to the kernel through the
//! [`Socket`] and [`Pipe`] traits. [`SysSocket`]/[`SysPipe`] issue the real
//! system calls on Linux and report "unimplemented" everywhere else; the
//! test suite swaps in a simulated kernel.

use crate::addr::AlgAddr;
use std::fs::File;
use std::io;
use std::ops::BitOr;
use std::os::raw::c_int;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::{SysPipe, SysSocket};

#[cfg(not(target_os = "linux"))]
mod unsupported;
#[cfg(not(target_os = "linux"))]
pub use unsupported::{SysPipe, SysSocket};

#[cfg(test)]
pub(crate) mod mock;

/// Raw descriptor number as passed to splice
pub type RawFd = c_int;

/// Flags accepted by splice and vmsplice (values from `linux/splice.h`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpliceFlags(u32);

impl SpliceFlags {
    /// No flags
    pub const NONE: Self = Self(0);
    /// Move pages instead of copying
    pub const MOVE: Self = Self(0x01);
    /// Do not block on pipe I/O
    pub const NONBLOCK: Self = Self(0x02);
    /// More data follows in a later splice
    pub const MORE: Self = Self(0x04);

    /// Raw flag bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Both sets of bits, usable in constants
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for SpliceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Flags accepted by send (values from `sys/socket.h`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MsgFlags(i32);

impl MsgFlags {
    /// No flags
    pub const NONE: Self = Self(0);
    /// More data follows; the kernel must not finalize yet
    pub const MORE: Self = Self(0x8000);

    /// Raw flag bits
    pub const fn bits(self) -> i32 {
        self.0
    }

    /// Whether every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Both ends of a pipe owned by one hash session
#[derive(Debug)]
pub struct PipePair<P> {
    /// Read end, spliced into the session socket
    pub read: P,
    /// Write end, target of vmsplice
    pub write: P,
}

/// Socket operations needed by connections and hash sessions
pub trait Socket: Sized {
    /// Pipe type whose read end can be spliced into this socket
    type Pipe: Pipe;

    /// Accept one pending session on a bound socket
    fn accept(&self) -> io::Result<Self>;

    /// Bind to a transformation
    fn bind(&self, addr: &AlgAddr) -> io::Result<()>;

    /// Descriptor number used as splice destination
    fn as_raw_fd(&self) -> RawFd;

    /// Read (the finalized digest)
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Send bytes directly
    fn send(&self, buf: &[u8], flags: MsgFlags) -> io::Result<usize>;

    /// Move up to `count` bytes from the file's current position into the
    /// socket, advancing the file position
    fn sendfile(&self, file: &File, count: usize) -> io::Result<usize>;

    /// Create a pipe pair for splicing into this socket
    fn open_pipe(&self) -> io::Result<PipePair<Self::Pipe>>;

    /// Close the socket
    fn close(self) -> io::Result<()>;
}

/// Pipe operations used by the splice write path
pub trait Pipe: Sized {
    /// Map user pages into the pipe (write end)
    fn vmsplice(&self, buf: &[u8], flags: SpliceFlags) -> io::Result<usize>;

    /// Move up to `len` bytes from the pipe (read end) into `out`
    fn splice(&self, out: RawFd, len: usize, flags: SpliceFlags) -> io::Result<usize>;

    /// Close this end
    fn close(self) -> io::Result<()>;
}

/// Run a primitive until it stops reporting `EINTR`/`EAGAIN`
pub(crate) fn retry<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match op() {
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                ) =>
            {
                continue;
            }
            other => return other,
        }
    }
}
