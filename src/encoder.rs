//! Outbound frame construction.
//!
//! Frames are written in the pretty-printed layout the flight software was
//! developed against: root line, one tab-indented `<Field>value</Field>` line
//! per field, the closing root line, then the checksum line. The checksum
//! covers every byte before `<CRC>`.

use std::fmt::Write as _;
use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::checksum::frame_checksum;
use crate::clock;
use crate::message::{Frame, InstrumentMode, MessageType, BINARY_END, BINARY_START};

/// GPS position reported by the simulated gondola.
const GPS_LON: &str = "-105.000000";
const GPS_LAT: &str = "40.000000";
const GPS_ALT: &str = "1620.3";
const GPS_VBAT: &str = "16.2";
const GPS_DIFF: &str = "0.00453";
const GPS_QUALITY: &str = "3";

/// Acknowledgements the OBC transmits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    SAck,
    RAAck,
    TMAck,
}

impl AckKind {
    pub fn message_type(self) -> MessageType {
        match self {
            AckKind::SAck => MessageType::SAck,
            AckKind::RAAck => MessageType::RAAck,
            AckKind::TMAck => MessageType::TMAck,
        }
    }
}

impl TryFrom<MessageType> for AckKind {
    type Error = MessageType;

    fn try_from(kind: MessageType) -> Result<Self, Self::Error> {
        match kind {
            MessageType::SAck => Ok(AckKind::SAck),
            MessageType::RAAck => Ok(AckKind::RAAck),
            MessageType::TMAck => Ok(AckKind::TMAck),
            other => Err(other),
        }
    }
}

/// Source of the GPS `Time` field.
#[derive(Debug, Clone, PartialEq)]
pub enum GpsTime {
    /// Wall clock at build time.
    Clock,
    /// Literal text, for replaying a particular time of day.
    Fixed(String),
}

/// Everything the OBC can send.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    InstrumentMode(InstrumentMode),
    Gps { sza: f64, time: GpsTime },
    ShutdownWarning,
    Telecommand(String),
    Ack { kind: AckKind, value: String },
}

impl OutboundMessage {
    pub fn ack(kind: AckKind) -> Self {
        OutboundMessage::Ack {
            kind,
            value: "ACK".to_string(),
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            OutboundMessage::InstrumentMode(_) => MessageType::IM,
            OutboundMessage::Gps { .. } => MessageType::GPS,
            OutboundMessage::ShutdownWarning => MessageType::SW,
            OutboundMessage::Telecommand(_) => MessageType::TC,
            OutboundMessage::Ack { kind, .. } => kind.message_type(),
        }
    }

    /// Line recorded in the command log for this message.
    pub fn describe(&self) -> String {
        match self {
            OutboundMessage::Gps { sza, .. } => format!("Sending GPS, SZA = {}", format_float(*sza)),
            OutboundMessage::Telecommand(command) => format!("Sending TC: START{command}"),
            other => format!("Sending {}", other.message_type()),
        }
    }
}

/// Builds outbound frames for one instrument and numbers them.
pub struct FrameEncoder {
    instrument: String,
    next_msg_id: u32,
    command_log: Option<Box<dyn Write + Send>>,
}

impl FrameEncoder {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            next_msg_id: 1,
            command_log: None,
        }
    }

    /// Appends a one-line summary of every built frame to `sink`.
    pub fn with_command_log(mut self, sink: Box<dyn Write + Send>) -> Self {
        self.command_log = Some(sink);
        self
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Id the next frame will carry.
    pub fn next_msg_id(&self) -> u32 {
        self.next_msg_id
    }

    pub fn build(&mut self, message: &OutboundMessage) -> Frame {
        self.build_at(message, clock::now())
    }

    /// Builds `message` as if the wall clock read `now`.
    pub fn build_at(&mut self, message: &OutboundMessage, now: NaiveDateTime) -> Frame {
        let kind = message.message_type();
        let msg_id = self.next_msg_id;
        self.next_msg_id = self.next_msg_id.wrapping_add(1);

        let mut fields: Vec<(String, String)> = vec![("Msg".into(), msg_id.to_string())];
        let mut push = |name: &str, value: String| fields.push((name.to_string(), value));
        let mut binary_payload = None;

        match message {
            OutboundMessage::InstrumentMode(mode) => {
                push("Inst", self.instrument.clone());
                push("Mode", mode.code().to_string());
            }
            OutboundMessage::Gps { sza, time } => {
                push("Date", now.format("%Y/%m/%d").to_string());
                let time = match time {
                    GpsTime::Clock => now.format("%H:%M:%S").to_string(),
                    GpsTime::Fixed(text) => text.clone(),
                };
                push("Time", time);
                push("Lon", GPS_LON.to_string());
                push("Lat", GPS_LAT.to_string());
                push("Alt", GPS_ALT.to_string());
                push("SZA", format_float(*sza));
                push("VBAT", GPS_VBAT.to_string());
                push("Diff", GPS_DIFF.to_string());
                push("Quality", GPS_QUALITY.to_string());
            }
            OutboundMessage::ShutdownWarning => {
                push("Inst", self.instrument.clone());
            }
            OutboundMessage::Telecommand(command) => {
                push("Inst", self.instrument.clone());
                push("Length", command.len().to_string());
                binary_payload = Some(telecommand_trailer(command.as_bytes()));
            }
            OutboundMessage::Ack { value, .. } => {
                push("Inst", self.instrument.clone());
                push("Ack", value.clone());
            }
        }

        let raw_text = seal(&render(kind, &fields));
        let checksum = raw_text
            .rfind("<CRC>")
            .map(|end| frame_checksum(&raw_text.as_bytes()[..end]));
        debug!(%kind, msg_id, bytes = raw_text.len(), "built frame");

        self.log_command(message, now);

        Frame {
            kind,
            fields,
            checksum,
            raw_text,
            binary_payload,
        }
    }

    fn log_command(&mut self, message: &OutboundMessage, now: NaiveDateTime) {
        let Some(sink) = self.command_log.as_mut() else {
            return;
        };
        let line = format!("{}{}\n", clock::stamp(now), message.describe());
        if let Err(err) = sink.write_all(line.as_bytes()).and_then(|()| sink.flush()) {
            warn!(error = %err, "failed to append to command log");
        }
    }
}

/// Pretty-printed frame body without the checksum line.
fn render(kind: MessageType, fields: &[(String, String)]) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "<{kind}>");
    for (name, value) in fields {
        if value.is_empty() {
            let _ = writeln!(text, "\t<{name}/>");
        } else {
            let _ = writeln!(text, "\t<{name}>{}</{name}>", escape(value));
        }
    }
    let _ = writeln!(text, "</{kind}>");
    text
}

/// Appends `<CRC>n</CRC>` computed over `body`.
pub fn seal(body: &str) -> String {
    let crc = frame_checksum(body.as_bytes());
    format!("{body}<CRC>{crc}</CRC>\n")
}

/// `START` + command + big-endian checksum of the command + `END`.
pub fn telecommand_trailer(command: &[u8]) -> Bytes {
    let crc = frame_checksum(command);
    let capacity = BINARY_START.len() + command.len() + 2 + BINARY_END.len();
    let mut out = BytesMut::with_capacity(capacity);
    out.put_slice(BINARY_START);
    out.put_slice(command);
    out.put_u16(crc);
    out.put_slice(BINARY_END);
    out.freeze()
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

/// Floats always keep a decimal point on the wire (`45` is sent as `45.0`).
pub fn format_float(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    }
}
