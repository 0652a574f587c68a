//! Message types and the in-memory form of a frame.

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::checksum::frame_checksum;

/// Opening tag of the checksum field that closes every frame.
pub const CRC_OPEN: &str = "<CRC>";
/// Terminator a frame read waits for.
pub const FRAME_TERMINATOR: &[u8] = b"</CRC>\n";
/// Sentinels around binary sections.
pub const BINARY_START: &[u8] = b"START";
pub const BINARY_END: &[u8] = b"END";

/// Instruments the simulator has been used with.
pub const KNOWN_INSTRUMENTS: [&str; 4] = ["RATS", "LPC", "RACHUTS", "FLOATS"];

/// Every message type the protocol defines. The variant name is the root tag
/// on the wire.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    // Sent by the OBC.
    IM,
    GPS,
    SW,
    TC,
    // Acknowledgements; the first three are sent by the OBC, the last two
    // come back from the instrument.
    SAck,
    RAAck,
    TMAck,
    TCAck,
    IMAck,
    // Sent by the instrument.
    TM,
    IMR,
    S,
    RA,
}

impl MessageType {
    pub const ALL: [MessageType; 13] = [
        MessageType::IM,
        MessageType::GPS,
        MessageType::SW,
        MessageType::TC,
        MessageType::SAck,
        MessageType::RAAck,
        MessageType::TMAck,
        MessageType::TCAck,
        MessageType::IMAck,
        MessageType::TM,
        MessageType::IMR,
        MessageType::S,
        MessageType::RA,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::IM => "IM",
            MessageType::GPS => "GPS",
            MessageType::SW => "SW",
            MessageType::TC => "TC",
            MessageType::SAck => "SAck",
            MessageType::RAAck => "RAAck",
            MessageType::TMAck => "TMAck",
            MessageType::TCAck => "TCAck",
            MessageType::IMAck => "IMAck",
            MessageType::TM => "TM",
            MessageType::IMR => "IMR",
            MessageType::S => "S",
            MessageType::RA => "RA",
        }
    }

    /// The acknowledgement the OBC owes when this type is received.
    pub fn required_ack(self) -> Option<MessageType> {
        match self {
            MessageType::TM => Some(MessageType::TMAck),
            MessageType::S => Some(MessageType::SAck),
            MessageType::RA => Some(MessageType::RAAck),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `pad` so width specifiers line up the display columns.
        f.pad(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Modes an IM message can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentMode {
    Standby,
    Flight,
    LowPower,
    Safety,
    EndOfFlight,
}

impl InstrumentMode {
    pub const ALL: [InstrumentMode; 5] = [
        InstrumentMode::Standby,
        InstrumentMode::Flight,
        InstrumentMode::LowPower,
        InstrumentMode::Safety,
        InstrumentMode::EndOfFlight,
    ];

    pub fn code(self) -> &'static str {
        match self {
            InstrumentMode::Standby => "SB",
            InstrumentMode::Flight => "FL",
            InstrumentMode::LowPower => "LP",
            InstrumentMode::Safety => "SA",
            InstrumentMode::EndOfFlight => "EF",
        }
    }
}

impl fmt::Display for InstrumentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.code())
    }
}

impl FromStr for InstrumentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        InstrumentMode::ALL
            .into_iter()
            .find(|m| m.code().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown instrument mode `{wanted}`"))
    }
}

/// One protocol unit, either built for transmission or decoded from the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: MessageType,
    /// Fields in wire order, excluding the checksum.
    pub fields: Vec<(String, String)>,
    /// Value carried in the `<CRC>` field.
    pub checksum: Option<u16>,
    /// Textual form, up to and including the CRC line.
    pub raw_text: String,
    /// Binary section following the text, sentinels included.
    pub binary_payload: Option<Bytes>,
}

impl Frame {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// One-line `TYPE    key:value key:value` rendering used by the displays.
    pub fn summary(&self) -> String {
        let fields = self
            .fields
            .iter()
            .map(|(key, value)| format!("{key}:{value}"))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{:<7} {}", self.kind, fields)
    }

    /// Checksum over the text preceding the `<CRC>` tag, if there is one.
    pub fn computed_checksum(&self) -> Option<u16> {
        let end = self.raw_text.rfind(CRC_OPEN)?;
        Some(frame_checksum(&self.raw_text.as_bytes()[..end]))
    }

    pub fn checksum_matches(&self) -> bool {
        match (self.checksum, self.computed_checksum()) {
            (Some(carried), Some(computed)) => carried == computed,
            _ => false,
        }
    }

    /// Bytes as written to the link.
    pub fn to_bytes(&self) -> Bytes {
        let trailer = self.binary_payload.as_deref().unwrap_or_default();
        let mut out = BytesMut::with_capacity(self.raw_text.len() + trailer.len());
        out.put_slice(self.raw_text.as_bytes());
        out.put_slice(trailer);
        out.freeze()
    }
}
