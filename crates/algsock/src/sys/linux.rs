//! AF_ALG sockets and pipes backed by Linux system calls

use super::{MsgFlags, Pipe, PipePair, RawFd, Socket, SpliceFlags};
use crate::addr::{AlgAddr, SALG_NAME_LEN, SALG_TYPE_LEN};
use std::fs::File;
use std::io::{self, Error};
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd};
use std::os::raw::c_void;
use std::ptr;

/// sockaddr_alg structure (matches struct sockaddr_alg in linux/if_alg.h)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct SockaddrAlg {
    /// Address family (AF_ALG = 38)
    salg_family: u16,
    /// Transformation type, NUL-terminated
    salg_type: [u8; SALG_TYPE_LEN],
    /// Feature bits
    salg_feat: u32,
    /// Mask bits
    salg_mask: u32,
    /// Algorithm name, NUL-terminated
    salg_name: [u8; SALG_NAME_LEN],
}

impl SockaddrAlg {
    fn new(addr: &AlgAddr) -> Self {
        let mut sa = Self {
            salg_family: libc::AF_ALG as u16,
            salg_type: [0; SALG_TYPE_LEN],
            salg_feat: addr.feature(),
            salg_mask: addr.mask(),
            salg_name: [0; SALG_NAME_LEN],
        };
        // AlgAddr guarantees both fit with room for the terminator
        let kind = addr.kind().as_str().as_bytes();
        sa.salg_type[..kind.len()].copy_from_slice(kind);
        let name = addr.name().as_bytes();
        sa.salg_name[..name.len()].copy_from_slice(name);
        sa
    }
}

/// Convert a `-1`-on-error syscall return into a byte count
fn cvt(ret: isize) -> io::Result<usize> {
    if ret < 0 {
        Err(Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

/// Close an owned descriptor, reporting the result of close(2)
fn close_fd(fd: OwnedFd) -> io::Result<()> {
    let raw = fd.into_raw_fd();
    // SAFETY: `raw` came out of an OwnedFd, so it is open and no other
    // owner will close it again.
    if unsafe { libc::close(raw) } < 0 {
        return Err(Error::last_os_error());
    }
    Ok(())
}

/// A socket that issues AF_ALG system calls
#[derive(Debug)]
pub struct SysSocket {
    fd: OwnedFd,
}

impl SysSocket {
    /// Open an unbound `AF_ALG`/`SOCK_SEQPACKET` socket
    pub fn open() -> io::Result<Self> {
        // SAFETY: socket() is a standard syscall; the result is checked below.
        let fd = unsafe {
            libc::socket(
                libc::AF_ALG,
                libc::SOCK_SEQPACKET | libc::SOCK_CLOEXEC,
                0,
            )
        };
        if fd < 0 {
            return Err(Error::last_os_error());
        }

        // SAFETY: fd is a freshly created descriptor owned by nobody else.
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }
}

impl Socket for SysSocket {
    type Pipe = SysPipe;

    fn accept(&self) -> io::Result<Self> {
        // SAFETY: accept4() with null address pointers is valid for sockets
        // that do not report a peer address.
        let fd = unsafe {
            libc::accept4(
                self.fd.as_raw_fd(),
                ptr::null_mut(),
                ptr::null_mut(),
                libc::SOCK_CLOEXEC,
            )
        };
        if fd < 0 {
            return Err(Error::last_os_error());
        }

        // SAFETY: accept4 returned a new descriptor we now own.
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    fn bind(&self, addr: &AlgAddr) -> io::Result<()> {
        let sa = SockaddrAlg::new(addr);

        // SAFETY: bind() receives a pointer to a fully initialised
        // sockaddr_alg and its exact size.
        let ret = unsafe {
            libc::bind(
                self.fd.as_raw_fd(),
                &sa as *const SockaddrAlg as *const libc::sockaddr,
                std::mem::size_of::<SockaddrAlg>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(Error::last_os_error());
        }
        Ok(())
    }

    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: buf is valid for writes of buf.len() bytes.
        cvt(unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut c_void,
                buf.len(),
            )
        })
    }

    fn send(&self, buf: &[u8], flags: MsgFlags) -> io::Result<usize> {
        // SAFETY: buf is valid for reads of buf.len() bytes.
        cvt(unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                buf.as_ptr() as *const c_void,
                buf.len(),
                flags.bits(),
            )
        })
    }

    fn sendfile(&self, file: &File, count: usize) -> io::Result<usize> {
        // SAFETY: a null offset makes the kernel use and advance the file
        // position; both descriptors are open for the duration of the call.
        cvt(unsafe {
            libc::sendfile(
                self.fd.as_raw_fd(),
                file.as_raw_fd(),
                ptr::null_mut(),
                count,
            )
        })
    }

    fn open_pipe(&self) -> io::Result<PipePair<SysPipe>> {
        SysPipe::pair()
    }

    fn close(self) -> io::Result<()> {
        close_fd(self.fd)
    }
}

/// One end of a pipe used for vmsplice/splice
#[derive(Debug)]
pub struct SysPipe {
    fd: OwnedFd,
}

impl SysPipe {
    /// Create a connected pipe pair
    pub fn pair() -> io::Result<PipePair<Self>> {
        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: pipe2() writes two descriptors into the array.
        if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } < 0 {
            return Err(Error::last_os_error());
        }

        // SAFETY: both descriptors were just created and are owned here.
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        Ok(PipePair {
            read: Self { fd: read },
            write: Self { fd: write },
        })
    }
}

impl Pipe for SysPipe {
    fn vmsplice(&self, buf: &[u8], flags: SpliceFlags) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let iov = libc::iovec {
            iov_base: buf.as_ptr() as *mut c_void,
            iov_len: buf.len(),
        };

        // SAFETY: the iovec describes a live borrowed buffer; without
        // SPLICE_F_GIFT the kernel only reads from it.
        cvt(unsafe { libc::vmsplice(self.fd.as_raw_fd(), &iov, 1, flags.bits()) })
    }

    fn splice(&self, out: RawFd, len: usize, flags: SpliceFlags) -> io::Result<usize> {
        // SAFETY: null offsets are required for pipes and sockets.
        cvt(unsafe {
            libc::splice(
                self.fd.as_raw_fd(),
                ptr::null_mut(),
                out,
                ptr::null_mut(),
                len,
                flags.bits(),
            )
        })
    }

    fn close(self) -> io::Result<()> {
        close_fd(self.fd)
    }
}
