//! In-memory kernel double for pipeline tests
//!
//! Sockets and pipes share one [`MockKernel`]; bytes spliced or sent into a
//! session socket accumulate until the "digest" is read, which returns an
//! FNV-1a checksum of everything received and clears the buffer. Faults and
//! short transfers are injected through [`Faults`].

use super::{MsgFlags, Pipe, PipePair, RawFd, Socket, SpliceFlags};
use crate::addr::AlgAddr;
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{self, Read};
use std::sync::{Arc, Mutex, MutexGuard};

/// Capacity of a simulated pipe
pub(crate) const PIPE_CAPACITY: usize = 64 * 1024;

/// One recorded primitive invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Bind(AlgAddr),
    Accept(RawFd),
    Vmsplice {
        fd: RawFd,
        len: usize,
        flags: SpliceFlags,
    },
    Splice {
        from: RawFd,
        to: RawFd,
        len: usize,
        flags: SpliceFlags,
    },
    Send {
        fd: RawFd,
        len: usize,
        flags: MsgFlags,
    },
    Sendfile {
        fd: RawFd,
        count: usize,
    },
    Read(RawFd),
    Close(RawFd),
}

/// Injected failures; errno values are returned as OS errors
#[derive(Debug, Default)]
pub(crate) struct Faults {
    /// Cap on bytes moved per vmsplice/splice/send/sendfile call
    pub max_transfer: Option<usize>,
    pub bind: Option<i32>,
    pub accept: Option<i32>,
    pub pipe: Option<i32>,
    pub sendfile: Option<i32>,
    pub send: Option<i32>,
    pub splice: Option<i32>,
    pub read: Option<i32>,
    /// Fail vmsplice with EPIPE once this many bytes went through in total
    pub vmsplice_after: Option<usize>,
    /// Fixed digest returned instead of the checksum
    pub digest: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct State {
    next_fd: RawFd,
    faults: Faults,
    calls: Vec<Call>,
    received: HashMap<RawFd, Vec<u8>>,
    pipes: HashMap<RawFd, VecDeque<u8>>,
    vmspliced: usize,
}

impl State {
    fn alloc_fd(&mut self) -> RawFd {
        self.next_fd += 1;
        self.next_fd + 100
    }

    fn cap(&self, len: usize) -> usize {
        self.faults.max_transfer.map_or(len, |max| len.min(max))
    }
}

fn os_err(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

/// FNV-1a over `data`, standing in for the kernel's digest
pub(crate) fn checksum(data: &[u8]) -> Vec<u8> {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in data {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash.to_be_bytes().to_vec()
}

/// Shared handle to the simulated kernel
#[derive(Debug, Clone, Default)]
pub(crate) struct MockKernel(Arc<Mutex<State>>);

impl MockKernel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.0.lock().unwrap()
    }

    /// A fresh unbound socket
    pub fn socket(&self) -> MockSocket {
        let fd = self.lock().alloc_fd();
        MockSocket {
            fd,
            kernel: self.clone(),
        }
    }

    pub fn faults(&self, set: impl FnOnce(&mut Faults)) {
        set(&mut self.lock().faults);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Bytes received by `fd` since its last digest read
    pub fn received(&self, fd: RawFd) -> Vec<u8> {
        self.lock().received.get(&fd).cloned().unwrap_or_default()
    }

    pub fn closed(&self) -> Vec<RawFd> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Close(fd) => Some(*fd),
                _ => None,
            })
            .collect()
    }
}

/// Simulated AF_ALG socket
#[derive(Debug)]
pub(crate) struct MockSocket {
    fd: RawFd,
    kernel: MockKernel,
}

impl Socket for MockSocket {
    type Pipe = MockPipe;

    fn accept(&self) -> io::Result<Self> {
        let mut state = self.kernel.lock();
        if let Some(code) = state.faults.accept {
            return Err(os_err(code));
        }
        let fd = state.alloc_fd();
        state.calls.push(Call::Accept(fd));
        state.received.insert(fd, Vec::new());
        Ok(Self {
            fd,
            kernel: self.kernel.clone(),
        })
    }

    fn bind(&self, addr: &AlgAddr) -> io::Result<()> {
        let mut state = self.kernel.lock();
        if let Some(code) = state.faults.bind {
            return Err(os_err(code));
        }
        state.calls.push(Call::Bind(addr.clone()));
        Ok(())
    }

    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.kernel.lock();
        state.calls.push(Call::Read(self.fd));
        if let Some(code) = state.faults.read {
            return Err(os_err(code));
        }
        let data = state.received.remove(&self.fd).unwrap_or_default();
        let digest = state.faults.digest.clone().unwrap_or_else(|| checksum(&data));
        let n = digest.len().min(buf.len());
        buf[..n].copy_from_slice(&digest[..n]);
        Ok(n)
    }

    fn send(&self, buf: &[u8], flags: MsgFlags) -> io::Result<usize> {
        let mut state = self.kernel.lock();
        if let Some(code) = state.faults.send {
            return Err(os_err(code));
        }
        let n = state.cap(buf.len());
        state.calls.push(Call::Send {
            fd: self.fd,
            len: n,
            flags,
        });
        state
            .received
            .entry(self.fd)
            .or_default()
            .extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn sendfile(&self, file: &File, count: usize) -> io::Result<usize> {
        let mut state = self.kernel.lock();
        if let Some(code) = state.faults.sendfile {
            return Err(os_err(code));
        }
        let mut chunk = vec![0u8; state.cap(count)];
        let mut reader = file;
        let n = reader.read(&mut chunk)?;
        state.calls.push(Call::Sendfile { fd: self.fd, count });
        state
            .received
            .entry(self.fd)
            .or_default()
            .extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    fn open_pipe(&self) -> io::Result<PipePair<MockPipe>> {
        let mut state = self.kernel.lock();
        if let Some(code) = state.faults.pipe {
            return Err(os_err(code));
        }
        let read_fd = state.alloc_fd();
        let write_fd = state.alloc_fd();
        state.pipes.insert(read_fd, VecDeque::new());
        Ok(PipePair {
            read: MockPipe {
                fd: read_fd,
                buffer: read_fd,
                kernel: self.kernel.clone(),
            },
            write: MockPipe {
                fd: write_fd,
                buffer: read_fd,
                kernel: self.kernel.clone(),
            },
        })
    }

    fn close(self) -> io::Result<()> {
        self.kernel.lock().calls.push(Call::Close(self.fd));
        Ok(())
    }
}

/// Simulated pipe end; both ends share the read end's buffer
#[derive(Debug)]
pub(crate) struct MockPipe {
    fd: RawFd,
    buffer: RawFd,
    kernel: MockKernel,
}

impl Pipe for MockPipe {
    fn vmsplice(&self, buf: &[u8], flags: SpliceFlags) -> io::Result<usize> {
        let mut state = self.kernel.lock();
        let mut allowed = state.cap(buf.len());
        if let Some(limit) = state.faults.vmsplice_after {
            if state.vmspliced >= limit {
                return Err(os_err(libc::EPIPE));
            }
            allowed = allowed.min(limit - state.vmspliced);
        }
        let queued = state.pipes.get(&self.buffer).map_or(0, VecDeque::len);
        let n = allowed.min(PIPE_CAPACITY - queued);
        if n == 0 && !buf.is_empty() {
            // A real pipe would block forever here
            return Err(os_err(libc::EDEADLK));
        }
        state.vmspliced += n;
        state.calls.push(Call::Vmsplice {
            fd: self.fd,
            len: n,
            flags,
        });
        state
            .pipes
            .entry(self.buffer)
            .or_default()
            .extend(&buf[..n]);
        Ok(n)
    }

    fn splice(&self, out: RawFd, len: usize, flags: SpliceFlags) -> io::Result<usize> {
        let mut state = self.kernel.lock();
        if let Some(code) = state.faults.splice {
            return Err(os_err(code));
        }
        let queued = state.pipes.get(&self.buffer).map_or(0, VecDeque::len);
        let n = state.cap(len).min(queued);
        let moved: Vec<u8> = state
            .pipes
            .get_mut(&self.buffer)
            .map(|q| q.drain(..n).collect())
            .unwrap_or_default();
        state.calls.push(Call::Splice {
            from: self.fd,
            to: out,
            len: n,
            flags,
        });
        state.received.entry(out).or_default().extend(moved);
        Ok(n)
    }

    fn close(self) -> io::Result<()> {
        self.kernel.lock().calls.push(Call::Close(self.fd));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_relay_delivers_to_socket() {
        let kernel = MockKernel::new();
        let listener = kernel.socket();
        let session = listener.accept().unwrap();
        let pipes = session.open_pipe().unwrap();

        assert_eq!(pipes.write.vmsplice(b"abc", SpliceFlags::NONE).unwrap(), 3);
        assert_eq!(
            pipes
                .read
                .splice(session.as_raw_fd(), 3, SpliceFlags::MORE)
                .unwrap(),
            3
        );
        assert_eq!(kernel.received(session.as_raw_fd()), b"abc");

        let mut buf = [0u8; 16];
        let n = session.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], checksum(b"abc").as_slice());
        assert!(kernel.received(session.as_raw_fd()).is_empty());
    }

    #[test]
    fn test_short_transfers() {
        let kernel = MockKernel::new();
        kernel.faults(|f| f.max_transfer = Some(2));
        let session = kernel.socket().accept().unwrap();
        assert_eq!(session.send(b"hello", MsgFlags::MORE).unwrap(), 2);
    }
}
