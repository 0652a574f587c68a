//! Splits the incoming byte stream into debug text and tagged frames.
//!
//! Each pass takes one line from whichever link has one. A line without `<`
//! is debug text. Anything else starts a frame, which is completed from the
//! same link up to `</CRC>\n`; telemetry frames additionally pull in their
//! binary section up to the `END` sentinel. Whatever follows stays buffered
//! for the next pass.

use std::io::Read;
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, trace, warn};

use crate::decoder::decode;
use crate::error::{DemuxError, LinkError};
use crate::link::Channel;
use crate::message::{Frame, MessageType, BINARY_END, FRAME_TERMINATOR};
use crate::stream::LinkReader;

/// Bounds on the blocking reads that complete a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemuxTimeouts {
    /// Frame body after its first line.
    pub frame: Duration,
    /// Telemetry binary section.
    pub trailer: Duration,
    /// Pause between read attempts while waiting on a terminator.
    pub idle: Duration,
}

impl Default for DemuxTimeouts {
    fn default() -> Self {
        Self {
            frame: Duration::from_secs(2),
            trailer: Duration::from_secs(5),
            idle: Duration::from_millis(1),
        }
    }
}

/// One decoded unit of input.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A debug line, without its line terminator.
    Text { channel: Channel, line: String },
    /// A complete frame; telemetry carries its binary section.
    Frame { channel: Channel, frame: Frame },
}

pub struct StreamDemultiplexer<R> {
    links: Vec<(Channel, LinkReader<R>)>,
    timeouts: DemuxTimeouts,
    /// Link polled first on the next pass, so a chatty link cannot starve
    /// the other.
    next: usize,
}

impl<R: Read> StreamDemultiplexer<R> {
    pub fn new(timeouts: DemuxTimeouts) -> Self {
        Self {
            links: Vec::new(),
            timeouts,
            next: 0,
        }
    }

    pub fn attach(&mut self, channel: Channel, link: R) {
        self.links.push((channel, LinkReader::new(link)));
    }

    /// Drops every link handle along with any unconsumed input.
    pub fn detach_all(&mut self) {
        self.links.clear();
        self.next = 0;
    }

    pub fn is_attached(&self) -> bool {
        !self.links.is_empty()
    }

    /// Bytes waiting on `channel` that no pass has consumed yet.
    pub fn buffered(&self, channel: Channel) -> Option<&[u8]> {
        self.links
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, reader)| reader.buffered())
    }

    /// Runs one pass. `None` means no link had a complete line.
    pub fn next_event(&mut self) -> Option<Result<Inbound, DemuxError>> {
        let count = self.links.len();
        for offset in 0..count {
            let index = (self.next + offset) % count;
            let (channel, reader) = &mut self.links[index];
            let channel = *channel;
            match reader.poll_line() {
                Ok(None) => continue,
                Ok(Some(line)) => {
                    self.next = (index + 1) % count;
                    return Some(classify(channel, reader, line, &self.timeouts));
                }
                Err(err) => {
                    self.next = (index + 1) % count;
                    return Some(Err(LinkError::Io(err).into()));
                }
            }
        }
        None
    }
}

fn classify<R: Read>(
    channel: Channel,
    reader: &mut LinkReader<R>,
    first_line: BytesMut,
    timeouts: &DemuxTimeouts,
) -> Result<Inbound, DemuxError> {
    if !first_line.contains(&b'<') {
        let line = String::from_utf8_lossy(&first_line).trim_end().to_string();
        trace!(%channel, %line, "debug text");
        return Ok(Inbound::Text { channel, line });
    }

    let mut raw = first_line;
    if !raw.ends_with(FRAME_TERMINATOR) {
        let rest = reader
            .read_until(FRAME_TERMINATOR, timeouts.frame, timeouts.idle)
            .map_err(interrupted("frame"))?;
        raw.unsplit(rest);
    }
    let text = String::from_utf8_lossy(&raw).into_owned();

    let mut frame = match decode(&text) {
        Ok(frame) => frame,
        Err(source) => {
            // Pull a malformed telemetry frame's binary section off the link
            // too, or its bytes would be read back as lines.
            if declares_telemetry(&text) {
                let skipped = reader.read_until(BINARY_END, timeouts.trailer, timeouts.idle);
                if let Err(err) = skipped {
                    warn!(%channel, error = %err, "malformed frame's binary section not consumed");
                }
            }
            return Err(DemuxError::Parse { source, text });
        }
    };

    if frame.kind == MessageType::TM {
        let trailer = reader
            .read_until(BINARY_END, timeouts.trailer, timeouts.idle)
            .map_err(interrupted("telemetry binary section"))?;
        debug!(bytes = trailer.len(), "telemetry binary section");
        frame.binary_payload = Some(trailer.freeze());
    }
    debug!(%channel, kind = %frame.kind, "frame complete");
    Ok(Inbound::Frame { channel, frame })
}

/// A link error while completing a unit loses that unit; it is not retried.
fn interrupted(unit: &'static str) -> impl FnOnce(LinkError) -> DemuxError {
    move |err| match err {
        LinkError::Io(source) => DemuxError::Interrupted { unit, source },
        other => other.into(),
    }
}

fn declares_telemetry(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .is_some_and(|line| line.ends_with("<TM>"))
}
