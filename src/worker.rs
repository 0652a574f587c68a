//! The background reader.
//!
//! The worker is the only reader of the serial links. It drives the
//! demultiplexer, persists what it decodes and reports it to the session over
//! the queues. The session attaches and detaches links with
//! [`WorkerControl`] messages; dropping the control sender stops the worker.

use std::io::{self, Write};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::NaiveDateTime;
use crossbeam_channel::{Receiver, TryRecvError};
use tracing::{debug, info, warn};

use crate::artifacts::TelemetryStore;
use crate::clock;
use crate::demux::{DemuxTimeouts, Inbound, StreamDemultiplexer};
use crate::error::DemuxError;
use crate::link::{Channel, Link};
use crate::message::{Frame, MessageType};
use crate::queue::{Direction, QueueEntry, QueueSenders};

pub enum WorkerControl {
    /// Start reading these handles, replacing any attached ones.
    Attach(Vec<(Channel, Box<dyn Link>)>),
    /// Stop reading and drop every handle.
    Detach,
}

/// Where the worker writes what it receives.
pub struct WorkerSinks {
    pub debug_log: Box<dyn Write + Send>,
    pub frame_log: Box<dyn Write + Send>,
    pub telemetry: TelemetryStore,
}

pub struct Worker {
    demux: StreamDemultiplexer<Box<dyn Link>>,
    control: Receiver<WorkerControl>,
    queues: QueueSenders,
    sinks: WorkerSinks,
    idle: Duration,
    verify_checksums: bool,
}

impl Worker {
    pub fn new(
        control: Receiver<WorkerControl>,
        queues: QueueSenders,
        sinks: WorkerSinks,
        timeouts: DemuxTimeouts,
    ) -> Self {
        Self {
            demux: StreamDemultiplexer::new(timeouts),
            control,
            queues,
            sinks,
            idle: timeouts.idle,
            verify_checksums: false,
        }
    }

    /// Compare each frame's `<CRC>` with the computed value and report
    /// mismatches. Frames are delivered either way.
    pub fn verify_checksums(mut self, enabled: bool) -> Self {
        self.verify_checksums = enabled;
        self
    }

    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("obc-reader".into())
            .spawn(move || self.run())
    }

    /// Runs until the control sender is dropped.
    pub fn run(mut self) {
        info!("reader worker started");
        loop {
            if !self.demux.is_attached() {
                // Nothing to read: block until the session attaches links.
                match self.control.recv() {
                    Ok(control) => self.apply(control),
                    Err(_) => break,
                }
                continue;
            }
            match self.control.try_recv() {
                Ok(control) => {
                    self.apply(control);
                    continue;
                }
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }
            if !self.step() {
                thread::sleep(self.idle);
            }
        }
        info!("reader worker stopped");
    }

    pub fn apply(&mut self, control: WorkerControl) {
        self.demux.detach_all();
        match control {
            WorkerControl::Attach(handles) => {
                for (channel, link) in handles {
                    debug!(%channel, link = link.name(), "reader attached");
                    self.demux.attach(channel, link);
                }
            }
            WorkerControl::Detach => debug!("reader detached"),
        }
    }

    /// Handles at most one unit of input. Returns `false` when there was
    /// nothing to do and the caller should idle.
    pub fn step(&mut self) -> bool {
        match self.demux.next_event() {
            None => false,
            Some(Ok(Inbound::Text { line, .. })) => {
                self.report_text(&line, clock::now());
                true
            }
            Some(Ok(Inbound::Frame { frame, .. })) => {
                self.handle_frame(frame, clock::now());
                true
            }
            Some(Err(err)) if err.is_transient() => {
                debug!(error = %err, "transient link error, retrying");
                false
            }
            Some(Err(err)) => {
                self.report_error(&err);
                true
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame, now: NaiveDateTime) {
        if self.verify_checksums && !frame.checksum_matches() {
            warn!(
                kind = %frame.kind,
                carried = ?frame.checksum,
                computed = ?frame.computed_checksum(),
                "checksum mismatch"
            );
            self.report_text(
                &format!(
                    "ERR: {} checksum mismatch (carried {:?}, computed {:?})",
                    frame.kind,
                    frame.checksum,
                    frame.computed_checksum()
                ),
                now,
            );
        }

        if frame.kind == MessageType::TM {
            let trailer = frame.binary_payload.as_deref().unwrap_or_default();
            match self.sinks.telemetry.write(frame.raw_text.as_bytes(), trailer, now) {
                Ok(path) => debug!(path = %path.display(), "telemetry record written"),
                Err(err) => {
                    warn!(error = %err, "failed to write telemetry record");
                    self.report_text(&format!("ERR: telemetry record not saved: {err}"), now);
                }
            }
        }

        if let Some(ack) = frame.kind.required_ack() {
            let _ = self.queues.acks.send(QueueEntry::AckRequest(ack));
        }

        let text = format!("{}{}\n", clock::stamp(now), frame.summary());
        write_sink(&mut self.sinks.frame_log, &text, "frame log");
        let _ = self.queues.frames.send(QueueEntry::FrameDisplay {
            kind: frame.kind,
            direction: Direction::FromInstrument,
            text,
            timestamp: now,
        });
    }

    fn report_error(&mut self, err: &DemuxError) {
        warn!(error = %err, "input discarded");
        if let DemuxError::Parse { text, .. } = err {
            debug!(%text, "discarded frame text");
        }
        self.report_text(&format!("ERR: {err}"), clock::now());
    }

    fn report_text(&mut self, line: &str, now: NaiveDateTime) {
        let text = format!("{}{}\n", clock::stamp(now), line);
        write_sink(&mut self.sinks.debug_log, &text, "debug log");
        let _ = self.queues.log.send(QueueEntry::LogLine {
            text,
            timestamp: now,
        });
    }
}

fn write_sink(sink: &mut Box<dyn Write + Send>, text: &str, name: &str) {
    if let Err(err) = sink.write_all(text.as_bytes()).and_then(|()| sink.flush()) {
        warn!(error = %err, sink = name, "write failed");
    }
}
