//! Newline-delimited message framing.

use std::io::{self, Read, Write};

/// Upper bound on one message, newline included.
pub(crate) const MAX_MESSAGE_BYTES: usize = 64 * 1024;

const CHUNK_BYTES: usize = 4 * 1024;

/// Outcome of one [`FrameReader::next_frame`] call.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Frame {
    /// A complete message without its trailing newline.
    Line(Vec<u8>),
    /// A message longer than [`MAX_MESSAGE_BYTES`] was skipped.
    Oversized,
    /// The read timed out before a full message arrived.
    Idle,
    /// The peer closed the stream.
    Closed,
}

/// Splits a byte stream into newline-terminated messages.
///
/// Bytes following a newline are kept for the next call, so one connection
/// can carry any number of messages. Oversized messages are dropped as they
/// arrive rather than buffered, and reported once their newline is seen.
pub(crate) struct FrameReader<R> {
    inner: R,
    pending: Vec<u8>,
    discarding: bool,
}

impl<R: Read> FrameReader<R> {
    pub(crate) const fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            discarding: false,
        }
    }

    pub(crate) const fn get_ref(&self) -> &R {
        &self.inner
    }

    pub(crate) const fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Reads until a full message is buffered, the read times out or the
    /// stream ends.
    ///
    /// A final message without a trailing newline is returned when the peer
    /// closes the stream.
    pub(crate) fn next_frame(&mut self) -> io::Result<Frame> {
        let mut chunk = [0_u8; CHUNK_BYTES];
        loop {
            if let Some(frame) = self.take_frame() {
                return Ok(frame);
            }
            match self.inner.read(&mut chunk) {
                Ok(0) => {
                    if self.pending.is_empty() || self.discarding {
                        self.pending.clear();
                        return Ok(Frame::Closed);
                    }
                    return Ok(Frame::Line(std::mem::take(&mut self.pending)));
                }
                Ok(read) => {
                    self.pending
                        .extend_from_slice(chunk.get(..read).unwrap_or_default());
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error)
                    if matches!(
                        error.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    return Ok(Frame::Idle);
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn take_frame(&mut self) -> Option<Frame> {
        let Some(end) = self.pending.iter().position(|byte| *byte == b'\n') else {
            if self.discarding || self.pending.len() > MAX_MESSAGE_BYTES {
                self.pending.clear();
                self.discarding = true;
            }
            return None;
        };
        let mut line: Vec<u8> = self.pending.drain(..=end).collect();
        if std::mem::take(&mut self.discarding) || line.len() > MAX_MESSAGE_BYTES {
            return Some(Frame::Oversized);
        }
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(Frame::Line(line))
    }
}

/// Writes `message` followed by a newline and flushes.
pub(crate) fn write_frame<W: Write + ?Sized>(writer: &mut W, message: &[u8]) -> io::Result<()> {
    enforce_message_limit(message.len().saturating_add(1))?;
    writer.write_all(message)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

fn enforce_message_limit(size: usize) -> io::Result<()> {
    if size > MAX_MESSAGE_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "message exceeds maximum size",
        ));
    }
    Ok(())
}
