//! # OBC Simulator Library
//!
//! This library simulates the on-board computer (OBC) that a balloon-borne
//! instrument talks to over serial. It builds the tagged, checksummed frames
//! the OBC sends, splits the instrument's output into debug text and frames,
//! stores telemetry, and acknowledges what needs acknowledging.
//!
//! The usual entry point is [`Session`], which owns the links and the
//! background reader. The codec layers ([`FrameEncoder`], [`decode`],
//! [`StreamDemultiplexer`]) can be used on their own.

pub mod artifacts;
pub mod checksum;
pub mod clock;
pub mod config;
pub mod decoder;
pub mod demux;
pub mod dispatch;
pub mod encoder;
pub mod error;
pub mod link;
pub mod message;
pub mod queue;
pub mod session;
pub mod stream;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use artifacts::SessionArtifacts;
pub use checksum::{checksum, CRC_SEED};
pub use config::{load_config, SimulatorConfig};
pub use decoder::decode;
pub use demux::{Inbound, StreamDemultiplexer};
pub use dispatch::AckDispatcher;
pub use encoder::{AckKind, FrameEncoder, GpsTime, OutboundMessage};
pub use error::{ConfigError, DemuxError, DispatchError, LinkError, ParseError, SessionError};
pub use message::{Frame, InstrumentMode, MessageType};
pub use queue::{Direction, QueueEntry};
pub use session::{PollBatch, Session};
