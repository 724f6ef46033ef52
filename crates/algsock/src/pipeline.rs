//! Zero-copy write path
//!
//! Bytes reach a session socket in one of two ways:
//!
//! ```text
//!  user buffer ──vmsplice──▶ pipe ──splice(MOVE|NONBLOCK|MORE)──▶ socket
//!  user buffer ──send(MSG_MORE)──────────────────────────────────▶ socket
//! ```
//!
//! The socket does not take vmsplice from arbitrary user memory, so the
//! pipe is the zero-copy intermediate. Either hop may move fewer bytes than
//! asked; both loops run until the input is drained or a primitive fails.
//! The more-data flag on every hop keeps the kernel from finalizing the
//! digest between writes.

use crate::config::DEFAULT_SOCKET_BUFFER_SIZE;
use crate::sys::{MsgFlags, Pipe, PipePair, RawFd, Socket, SpliceFlags, retry};
use std::io;
use tracing::trace;

/// Flags for the pipe-to-socket hop
pub const SPLICE_OUT_FLAGS: SpliceFlags = SpliceFlags::MOVE
    .union(SpliceFlags::NONBLOCK)
    .union(SpliceFlags::MORE);

/// A failed transfer: bytes delivered to the socket, then the error
pub(crate) type Partial = (u64, io::Error);

fn zero_transfer(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::WriteZero,
        format!("{what} transferred zero bytes"),
    )
}

/// Relay `data` through the pipe into the socket
pub(crate) fn splice_all<P: Pipe>(
    out: RawFd,
    pipes: &PipePair<P>,
    data: &[u8],
) -> Result<(), Partial> {
    let mut written: u64 = 0;

    // A piece never exceeds the pipe's capacity, so vmsplice cannot wait on
    // a reader that only runs after it returns.
    for piece in data.chunks(DEFAULT_SOCKET_BUFFER_SIZE) {
        let mut offset = 0;
        while offset < piece.len() {
            let n = retry(|| pipes.write.vmsplice(&piece[offset..], SpliceFlags::NONE))
                .map_err(|e| (written, e))?;
            if n == 0 {
                return Err((written, zero_transfer("vmsplice")));
            }

            let drained = drain(out, &pipes.read, n).map_err(|(d, e)| (written + d, e))?;
            trace!(fd = out, vmspliced = n, drained, "relayed chunk");

            offset += n;
            written += n as u64;
        }
    }

    Ok(())
}

/// Splice exactly `len` queued bytes from the pipe into `out`
fn drain<P: Pipe>(out: RawFd, read: &P, len: usize) -> Result<u64, Partial> {
    let mut drained = 0;
    while drained < len {
        let n = retry(|| read.splice(out, len - drained, SPLICE_OUT_FLAGS))
            .map_err(|e| (drained as u64, e))?;
        if n == 0 {
            return Err((drained as u64, zero_transfer("splice")));
        }
        drained += n;
    }
    Ok(drained as u64)
}

/// Send `data` with `MSG_MORE` until all of it is accepted
pub(crate) fn send_all<S: Socket>(socket: &S, data: &[u8]) -> Result<(), Partial> {
    let mut offset = 0;
    while offset < data.len() {
        let n = retry(|| socket.send(&data[offset..], MsgFlags::MORE))
            .map_err(|e| (offset as u64, e))?;
        if n == 0 {
            return Err((offset as u64, zero_transfer("send")));
        }
        offset += n;
    }
    Ok(())
}
