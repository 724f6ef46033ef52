//! Read-only file mappings for the mmap-splice transfer tier

use std::fs::File;
use std::io::{self, Error};
use std::os::fd::AsRawFd;
use std::os::raw::c_void;
use std::ptr;

/// A read-only shared mapping of a file prefix, unmapped on drop
pub(crate) struct Mapping {
    ptr: *mut c_void,
    len: usize,
}

impl Mapping {
    /// Map the first `len` bytes of `file`
    ///
    /// The mapping always starts at offset 0 so it is page aligned; callers
    /// slice out the window they need.
    pub(crate) fn map(file: &File, len: usize) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot map an empty file",
            ));
        }

        // SAFETY: mmap is a standard POSIX syscall. We request a read-only
        // shared mapping of an open descriptor; the result is checked
        // against MAP_FAILED.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(Error::last_os_error());
        }

        Ok(Self { ptr, len })
    }

    /// The mapped bytes
    pub(crate) fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is a live PROT_READ mapping of exactly len bytes that
        // stays valid until drop.
        unsafe { std::slice::from_raw_parts(self.ptr as *const u8, self.len) }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: Unmapping the region with its original size
        unsafe {
            libc::munmap(self.ptr, self.len);
        }
    }
}
