//! Scanner for the flat tag/value grammar.
//!
//! Frame text is not a well-formed document: the checksum line follows the
//! closing root tag, and some instrument builds never close the root at all.
//! The scanner therefore works line by line and accepts exactly:
//!
//! ```text
//! <Type>
//!     <Name>value</Name>      (any number, no nesting)
//!     <Name/>
//! </Type>                     (optional)
//! <CRC>n</CRC>
//! ```

use crate::error::ParseError;
use crate::message::{Frame, MessageType};

enum Line<'a> {
    Open(&'a str),
    Close(&'a str),
    Empty(&'a str),
    Field(&'a str, &'a str),
}

/// Decodes one complete frame text (through the CRC line).
pub fn decode(text: &str) -> Result<Frame, ParseError> {
    let mut root: Option<MessageType> = None;
    let mut closed = false;
    let mut checksum = None;
    let mut fields = Vec::new();

    for (index, raw) in text.split('\n').enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let malformed = || ParseError::MalformedLine {
            line: index + 1,
            text: raw.to_string(),
        };

        let Some(kind) = root else {
            // Debug output may run into the start of a frame on the same line.
            let tag_start = line.find('<').ok_or(ParseError::MissingRoot)?;
            match classify(&line[tag_start..]) {
                Some(Line::Open(name)) => {
                    let kind = name
                        .parse::<MessageType>()
                        .map_err(ParseError::UnknownType)?;
                    root = Some(kind);
                }
                Some(_) => return Err(ParseError::MissingRoot),
                None => return Err(malformed()),
            }
            continue;
        };

        match classify(line).ok_or_else(malformed)? {
            Line::Field("CRC", value) => {
                let crc = value
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| ParseError::InvalidChecksum(value.to_string()))?;
                checksum = Some(crc);
            }
            Line::Close(name) if name == kind.as_str() && !closed => closed = true,
            Line::Field(..) | Line::Empty(_) if closed => {
                return Err(ParseError::TrailingContent {
                    root: kind.as_str().to_string(),
                    text: raw.to_string(),
                })
            }
            Line::Field(name, value) => fields.push((name.to_string(), unescape(value))),
            Line::Empty(name) => fields.push((name.to_string(), String::new())),
            Line::Open(_) | Line::Close(_) => return Err(malformed()),
        }
    }

    let kind = root.ok_or(ParseError::MissingRoot)?;
    Ok(Frame {
        kind,
        fields,
        checksum,
        raw_text: text.to_string(),
        binary_payload: None,
    })
}

fn classify(line: &str) -> Option<Line<'_>> {
    let inner = line.strip_prefix('<')?;
    let gt = inner.find('>')?;
    let tag = &inner[..gt];
    let rest = &inner[gt + 1..];

    if let Some(name) = tag.strip_prefix('/') {
        return (rest.is_empty() && is_name(name)).then_some(Line::Close(name));
    }
    if let Some(name) = tag.strip_suffix('/') {
        let name = name.trim_end();
        return (rest.is_empty() && is_name(name)).then_some(Line::Empty(name));
    }
    if !is_name(tag) {
        return None;
    }
    if rest.is_empty() {
        return Some(Line::Open(tag));
    }

    let value = rest
        .strip_suffix('>')
        .and_then(|r| r.strip_suffix(tag))
        .and_then(|r| r.strip_suffix("</"))?;
    // Values never contain markup; a '<' here means nesting or garbage.
    (!value.contains('<')).then_some(Line::Field(tag, value))
}

fn is_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}

fn unescape(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::frame_checksum;
    use crate::encoder::{AckKind, FrameEncoder, OutboundMessage};
    use crate::message::{InstrumentMode, KNOWN_INSTRUMENTS};

    #[test]
    fn decodes_encoded_instrument_mode_for_every_pair() {
        for instrument in KNOWN_INSTRUMENTS {
            let mut encoder = FrameEncoder::new(instrument);
            for mode in InstrumentMode::ALL {
                let built = encoder.build(&OutboundMessage::InstrumentMode(mode));
                let decoded = decode(&built.raw_text).unwrap();
                assert_eq!(decoded.kind, MessageType::IM);
                assert_eq!(decoded.field("Inst"), Some(instrument));
                assert_eq!(decoded.field("Mode"), Some(mode.code()));
                assert_eq!(decoded.checksum, built.checksum);
                assert!(decoded.checksum_matches());
            }
        }
    }

    #[test]
    fn decodes_frame_without_closing_root() {
        let body = "<S>\n<Msg>7</Msg>\n<Inst>LPC</Inst>\n";
        let text = format!("{body}<CRC>{}</CRC>\n", frame_checksum(body.as_bytes()));
        let frame = decode(&text).unwrap();
        assert_eq!(frame.kind, MessageType::S);
        assert_eq!(
            frame.fields,
            vec![("Msg".to_string(), "7".to_string()), ("Inst".to_string(), "LPC".to_string())]
        );
        assert!(frame.checksum_matches());
    }

    #[test]
    fn keeps_mismatched_checksum_without_rejecting() {
        let frame = decode("<RA>\n\t<Msg>1</Msg>\n</RA>\n<CRC>1</CRC>\n").unwrap();
        assert_eq!(frame.checksum, Some(1));
        assert!(!frame.checksum_matches());
    }

    #[test]
    fn accepts_empty_and_escaped_values() {
        let frame =
            decode("<TM>\n\t<StateMess1/>\n\t<StateMess2>a &lt;b&gt; &amp; c</StateMess2>\n</TM>\n<CRC>9</CRC>\n")
                .unwrap();
        assert_eq!(frame.field("StateMess1"), Some(""));
        assert_eq!(frame.field("StateMess2"), Some("a <b> & c"));
    }

    #[test]
    fn tolerates_noise_before_root_tag() {
        let frame = decode("junk<IMR>\n\t<Msg>3</Msg>\n</IMR>\n<CRC>5</CRC>\n").unwrap();
        assert_eq!(frame.kind, MessageType::IMR);
    }

    #[test]
    fn round_trips_acks_through_decoder() {
        let mut encoder = FrameEncoder::new("RACHUTS");
        let built = encoder.build(&OutboundMessage::ack(AckKind::TMAck));
        let decoded = decode(&built.raw_text).unwrap();
        assert_eq!(decoded.kind, MessageType::TMAck);
        assert_eq!(decoded.field("Ack"), Some("ACK"));
    }

    #[test]
    fn rejects_unknown_root() {
        assert_eq!(
            decode("<Bogus>\n<CRC>1</CRC>\n"),
            Err(ParseError::UnknownType("Bogus".into()))
        );
    }

    #[test]
    fn rejects_text_that_is_not_a_frame() {
        assert_eq!(decode("temp < 5 ok\n"), Err(ParseError::MalformedLine {
            line: 1,
            text: "temp < 5 ok".into(),
        }));
        assert_eq!(decode(""), Err(ParseError::MissingRoot));
        assert_eq!(decode("<Msg>1</Msg>\n"), Err(ParseError::MissingRoot));
    }

    #[test]
    fn rejects_nesting_and_broken_lines() {
        assert!(matches!(
            decode("<TM>\n\t<A><B>1</B></A>\n<CRC>1</CRC>\n"),
            Err(ParseError::MalformedLine { line: 2, .. })
        ));
        assert!(matches!(
            decode("<TM>\n\t<A>1</B>\n<CRC>1</CRC>\n"),
            Err(ParseError::MalformedLine { line: 2, .. })
        ));
        assert!(matches!(
            decode("<TM>\n\t<Inner>\n<CRC>1</CRC>\n"),
            Err(ParseError::MalformedLine { line: 2, .. })
        ));
    }

    #[test]
    fn rejects_bad_checksum_value() {
        assert_eq!(
            decode("<S>\n<CRC>abc</CRC>\n"),
            Err(ParseError::InvalidChecksum("abc".into()))
        );
        assert_eq!(
            decode("<S>\n<CRC>70000</CRC>\n"),
            Err(ParseError::InvalidChecksum("70000".into()))
        );
    }

    #[test]
    fn rejects_fields_after_root_closes() {
        assert!(matches!(
            decode("<S>\n</S>\n\t<Late>1</Late>\n<CRC>1</CRC>\n"),
            Err(ParseError::TrailingContent { .. })
        ));
    }
}
