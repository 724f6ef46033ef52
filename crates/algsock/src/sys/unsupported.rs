//! Placeholder sockets for platforms without AF_ALG
//!
//! Every operation fails with [`io::ErrorKind::Unsupported`]; `dial`
//! turns that into [`AlgError::Unimplemented`](crate::AlgError::Unimplemented).

use super::{MsgFlags, Pipe, PipePair, RawFd, Socket, SpliceFlags};
use crate::addr::AlgAddr;
use std::fs::File;
use std::io;

fn unsupported() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!(
            "AF_ALG sockets not implemented on {}/{}",
            std::env::consts::OS,
            std::env::consts::ARCH
        ),
    )
}

/// Socket stand-in; it can never be opened
#[derive(Debug)]
pub struct SysSocket {
    _private: (),
}

impl SysSocket {
    /// Always fails
    pub fn open() -> io::Result<Self> {
        Err(unsupported())
    }
}

impl Socket for SysSocket {
    type Pipe = SysPipe;

    fn accept(&self) -> io::Result<Self> {
        Err(unsupported())
    }

    fn bind(&self, _addr: &AlgAddr) -> io::Result<()> {
        Err(unsupported())
    }

    fn as_raw_fd(&self) -> RawFd {
        -1
    }

    fn read(&self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(unsupported())
    }

    fn send(&self, _buf: &[u8], _flags: MsgFlags) -> io::Result<usize> {
        Err(unsupported())
    }

    fn sendfile(&self, _file: &File, _count: usize) -> io::Result<usize> {
        Err(unsupported())
    }

    fn open_pipe(&self) -> io::Result<PipePair<SysPipe>> {
        Err(unsupported())
    }

    fn close(self) -> io::Result<()> {
        Err(unsupported())
    }
}

/// Pipe stand-in; it can never be created
#[derive(Debug)]
pub struct SysPipe {
    _private: (),
}

impl Pipe for SysPipe {
    fn vmsplice(&self, _buf: &[u8], _flags: SpliceFlags) -> io::Result<usize> {
        Err(unsupported())
    }

    fn splice(&self, _out: RawFd, _len: usize, _flags: SpliceFlags) -> io::Result<usize> {
        Err(unsupported())
    }

    fn close(self) -> io::Result<()> {
        Err(unsupported())
    }
}
