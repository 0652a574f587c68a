//! Entries passed from the reader worker to the session, and the channels
//! that carry them. Each queue is FIFO with one consumer.

use chrono::NaiveDateTime;
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::message::MessageType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    FromInstrument,
    ToInstrument,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueueEntry {
    /// Timestamped debug text, ready for display.
    LogLine {
        text: String,
        timestamp: NaiveDateTime,
    },
    /// Timestamped one-line rendering of a frame.
    FrameDisplay {
        kind: MessageType,
        direction: Direction,
        text: String,
        timestamp: NaiveDateTime,
    },
    /// An acknowledgement owed to the instrument.
    AckRequest(MessageType),
}

impl QueueEntry {
    pub fn text(&self) -> Option<&str> {
        match self {
            QueueEntry::LogLine { text, .. } | QueueEntry::FrameDisplay { text, .. } => Some(text),
            QueueEntry::AckRequest(_) => None,
        }
    }
}

/// Producer side, held by the worker (and cloned by the session for the
/// frames it transmits).
#[derive(Clone)]
pub struct QueueSenders {
    pub log: Sender<QueueEntry>,
    pub frames: Sender<QueueEntry>,
    pub acks: Sender<QueueEntry>,
}

/// Consumer side, held by the session.
pub struct QueueReceivers {
    pub log: Receiver<QueueEntry>,
    pub frames: Receiver<QueueEntry>,
    pub acks: Receiver<QueueEntry>,
}

pub fn session_queues() -> (QueueSenders, QueueReceivers) {
    let (log_tx, log_rx) = unbounded();
    let (frames_tx, frames_rx) = unbounded();
    let (acks_tx, acks_rx) = unbounded();
    (
        QueueSenders {
            log: log_tx,
            frames: frames_tx,
            acks: acks_tx,
        },
        QueueReceivers {
            log: log_rx,
            frames: frames_rx,
            acks: acks_rx,
        },
    )
}
