//! Buffered reads over a link: whole lines for polling, and bounded reads up
//! to a terminator for frame bodies and binary trailers.

use std::io::{self, ErrorKind, Read};
use std::thread;
use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};

use crate::error::LinkError;

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;
const READ_CHUNK_SIZE: usize = 1024;

/// The unread tail of a unit whose read was cut short by a link error.
#[derive(Debug, Clone, Copy)]
struct Resync {
    terminator: &'static [u8],
    deadline: Instant,
}

/// Owns the read half of a link plus whatever has arrived but not yet been
/// consumed. Bytes past a terminator stay buffered for the next call.
pub struct LinkReader<R> {
    inner: R,
    buf: BytesMut,
    resync: Option<Resync>,
}

impl<R: Read> LinkReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            resync: None,
        }
    }

    /// Returns the next complete line if one is available. Partial lines stay
    /// buffered. Nothing is returned while the tail of an interrupted unit is
    /// still being skipped.
    pub fn poll_line(&mut self) -> io::Result<Option<BytesMut>> {
        if self.resyncing()? {
            return Ok(None);
        }
        if let Some(line) = self.take_through(b"\n", 0) {
            return Ok(Some(line));
        }
        let before = self.buf.len();
        if self.fill()? == 0 {
            return Ok(None);
        }
        Ok(self.take_through(b"\n", before))
    }

    /// Reads up to and including `terminator`, giving up once `timeout` has
    /// passed whether or not bytes are still arriving.
    ///
    /// On timeout the partial bytes are dropped so the next poll starts on
    /// fresh input. On a link error they are dropped as well, and later polls
    /// skip the rest of the unit up to `terminator`, for at most `timeout`.
    pub fn read_until(
        &mut self,
        terminator: &'static [u8],
        timeout: Duration,
        idle: Duration,
    ) -> Result<BytesMut, LinkError> {
        let deadline = Instant::now() + timeout;
        let mut from = 0;
        loop {
            if let Some(chunk) = self.take_through(terminator, from) {
                return Ok(chunk);
            }
            // The terminator may straddle the next read.
            from = self.buf.len().saturating_sub(terminator.len().saturating_sub(1));

            if Instant::now() >= deadline {
                let received = self.buf.len();
                self.buf.clear();
                return Err(LinkError::Timeout {
                    terminator: String::from_utf8_lossy(terminator).into_owned(),
                    waited: timeout,
                    received,
                });
            }
            match self.fill() {
                Ok(0) => thread::sleep(idle),
                Ok(_) => {}
                Err(err) => {
                    self.buf.clear();
                    self.resync = Some(Resync {
                        terminator,
                        deadline: Instant::now() + timeout,
                    });
                    return Err(LinkError::Io(err));
                }
            }
        }
    }

    /// Bytes received but not yet handed out.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Drops input left over from an interrupted unit. `true` while its
    /// terminator is still outstanding.
    fn resyncing(&mut self) -> io::Result<bool> {
        let Some(resync) = self.resync else {
            return Ok(false);
        };
        if !self.drop_through(resync.terminator) {
            if Instant::now() >= resync.deadline {
                self.buf.clear();
            } else {
                self.fill()?;
                if !self.drop_through(resync.terminator) {
                    return Ok(true);
                }
            }
        }
        self.resync = None;
        Ok(false)
    }

    /// One read attempt. A serial read that times out, or an in-memory
    /// source at its end, both count as "nothing yet".
    fn fill(&mut self) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(n);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    return Ok(0)
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn take_through(&mut self, terminator: &[u8], from: usize) -> Option<BytesMut> {
        let start = from.min(self.buf.len());
        let pos = find(&self.buf[start..], terminator)? + start;
        Some(self.buf.split_to(pos + terminator.len()))
    }

    /// Discards through `terminator` if it is buffered. Otherwise keeps only
    /// the bytes that could still begin it.
    fn drop_through(&mut self, terminator: &[u8]) -> bool {
        match find(&self.buf, terminator) {
            Some(pos) => {
                self.buf.advance(pos + terminator.len());
                true
            }
            None => {
                let keep = terminator.len().saturating_sub(1);
                let excess = self.buf.len().saturating_sub(keep);
                self.buf.advance(excess);
                false
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
