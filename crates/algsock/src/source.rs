//! Byte sources accepted by [`HashSession::read_from`]
//!
//! [`HashSession::read_from`]: crate::HashSession::read_from

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek};

/// Largest byte count a single sendfile call will move on Linux.
///
/// Every sendfile call ends without the more-data flag, so a file that needs
/// more than one call cannot go through this tier.
pub(crate) const MAX_SENDFILE: u64 = 0x7fff_f000;

/// Where the bytes for a session transfer come from
///
/// File-backed sources are eligible for the zero-copy tiers (sendfile, then
/// mmap-splice); everything else goes through a buffered copy.
pub enum Source<'a> {
    /// An in-memory buffer, spliced directly
    Bytes(&'a [u8]),
    /// A file, read from its current position to EOF
    File(&'a File),
    /// A file, read from its current position for at most `limit` bytes
    LimitedFile {
        /// The file to read
        file: &'a File,
        /// Maximum number of bytes to transfer
        limit: u64,
    },
    /// Any other reader; always copied through a buffer
    Reader(&'a mut dyn Read),
}

impl<'a> Source<'a> {
    /// A file capped at `limit` bytes from its current position
    pub fn limited(file: &'a File, limit: u64) -> Self {
        Self::LimitedFile { file, limit }
    }

    /// A generic reader
    pub fn reader<R: Read + 'a>(reader: &'a mut R) -> Self {
        Self::Reader(reader)
    }
}

impl<'a> From<&'a File> for Source<'a> {
    fn from(file: &'a File) -> Self {
        Self::File(file)
    }
}

impl<'a> From<&'a [u8]> for Source<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::Bytes(bytes)
    }
}

impl fmt::Debug for Source<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::File(file) => f.debug_tuple("File").field(file).finish(),
            Self::LimitedFile { file, limit } => f
                .debug_struct("LimitedFile")
                .field("file", file)
                .field("limit", limit)
                .finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// Current position of `file` and the byte count to transfer from there
///
/// Fails for anything that is not a regular file, which makes the caller
/// skip the zero-copy tiers.
pub(crate) fn file_window(file: &File, limit: Option<u64>) -> io::Result<(u64, u64)> {
    let meta = file.metadata()?;
    if !meta.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "not a regular file",
        ));
    }

    let mut cursor = file;
    let offset = cursor.stream_position()?;
    let available = meta.len().saturating_sub(offset);
    let remain = limit.map_or(available, |limit| limit.min(available));
    Ok((offset, remain))
}

/// Whether a first sendfile failure means the socket refuses sendfile
pub(crate) fn is_refusal(err: &io::Error) -> bool {
    // ENOTSUP has the same value as EOPNOTSUPP on Linux
    matches!(
        err.raw_os_error(),
        Some(libc::EINVAL | libc::ENOSYS | libc::EOPNOTSUPP)
    )
}
