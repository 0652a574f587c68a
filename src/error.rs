use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::message::MessageType;

/// Ways a completed frame can fail the flat tag/value grammar.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// No `<Type>` line opened the frame.
    #[error("frame has no root tag")]
    MissingRoot,
    /// A line is neither an open/close root tag nor a `<Tag>value</Tag>` pair.
    #[error("malformed line {line}: {text:?}")]
    MalformedLine { line: usize, text: String },
    /// The root tag names a message type outside the protocol.
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    /// The `<CRC>` value is not a decimal 16-bit number.
    #[error("invalid CRC value {0:?}")]
    InvalidChecksum(String),
    /// Text after the root was closed, other than the CRC line.
    #[error("unexpected content after </{root}>: {text:?}")]
    TrailingContent { root: String, text: String },
}

/// Failures on a serial link.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("link I/O error: {0}")]
    Io(#[from] io::Error),
    /// A bounded read gave up before its terminator arrived.
    #[error("no {terminator:?} within {waited:?} ({received} bytes discarded)")]
    Timeout {
        terminator: String,
        waited: Duration,
        received: usize,
    },
}

/// Everything the demultiplexer can report for one unit of input.
#[derive(Debug, Error)]
pub enum DemuxError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("discarding frame: {source}")]
    Parse {
        #[source]
        source: ParseError,
        text: String,
    },
    /// The link failed while a frame or its binary section was arriving.
    #[error("discarding partial {unit}: {source}")]
    Interrupted {
        unit: &'static str,
        #[source]
        source: io::Error,
    },
}

impl DemuxError {
    /// Link I/O failures (a port closed under a read, a cable pulled) are
    /// retried after an idle interval; everything else is a discarded unit.
    pub fn is_transient(&self) -> bool {
        matches!(self, DemuxError::Link(LinkError::Io(_)))
    }
}

/// Acknowledgement dispatch failures.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown ack command `{0}`")]
    UnknownAckCommand(MessageType),
    #[error("failed to transmit {kind}: {source}")]
    Transmit {
        kind: MessageType,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Orchestrator-level failures.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("serial links are suspended")]
    Suspended,
    #[error("already {0}")]
    State(&'static str),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("session artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to start reader worker: {0}")]
    Spawn(io::Error),
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
