//! The OBC side of one test session.
//!
//! A [`Session`] is the only writer on the links and the only owner of their
//! open/closed state. It starts the reader worker, drains what the worker
//! reports, answers ack requests and runs the periodic GPS broadcast. The
//! console calls [`Session::poll`] on its refresh cadence.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Sender};
use tracing::{debug, error, info, warn};

use crate::artifacts::SessionArtifacts;
use crate::clock;
use crate::config::SimulatorConfig;
use crate::dispatch::{transmit, AckDispatcher};
use crate::encoder::{FrameEncoder, GpsTime, OutboundMessage};
use crate::error::{DispatchError, Result, SessionError};
use crate::link::{Connector, LinkSet, SerialConnector};
use crate::message::{Frame, MessageType};
use crate::queue::{session_queues, Direction, QueueEntry, QueueReceivers};
use crate::worker::{Worker, WorkerControl, WorkerSinks};

/// Delay before the first automatic GPS frame.
const FIRST_GPS_DELAY: Duration = Duration::from_secs(10);

/// Entries drained by one [`Session::poll`], split by display pane.
#[derive(Debug, Default)]
pub struct PollBatch {
    pub log: Vec<QueueEntry>,
    pub frames: Vec<QueueEntry>,
}

impl PollBatch {
    pub fn is_empty(&self) -> bool {
        self.log.is_empty() && self.frames.is_empty()
    }
}

pub struct Session {
    config: SimulatorConfig,
    artifacts: SessionArtifacts,
    encoder: FrameEncoder,
    dispatcher: AckDispatcher,
    zephyr: Box<dyn Connector>,
    log: Option<Box<dyn Connector>>,
    /// `None` while suspended.
    links: Option<LinkSet>,
    control: Sender<WorkerControl>,
    queues: QueueReceivers,
    /// Feeds transmitted frames into the same display queue as received ones.
    outbound: Sender<QueueEntry>,
    worker: JoinHandle<()>,
    next_gps: Option<Instant>,
}

impl Session {
    /// Starts a session on the serial ports named in `config`.
    pub fn open(config: SimulatorConfig, artifacts: SessionArtifacts) -> Result<Self> {
        let connector = |path: &str| SerialConnector {
            path: path.to_string(),
            baud_rate: config.baud_rate,
            read_timeout: config.timeouts.poll(),
        };
        let zephyr: Box<dyn Connector> = Box::new(connector(&config.zephyr_port));
        let log = config
            .separate_log_port()
            .map(|port| Box::new(connector(port)) as Box<dyn Connector>);
        Self::start(config, zephyr, log, artifacts)
    }

    /// Opens the links, starts the reader worker and attaches it.
    pub fn start(
        config: SimulatorConfig,
        zephyr: Box<dyn Connector>,
        log: Option<Box<dyn Connector>>,
        artifacts: SessionArtifacts,
    ) -> Result<Self> {
        config.validate()?;
        let links = LinkSet::open(zephyr.as_ref(), log.as_deref())?;
        let readers = links.reader_handles()?;

        let (senders, queues) = session_queues();
        let outbound = senders.frames.clone();
        let (control, control_rx) = unbounded();
        let sinks = WorkerSinks {
            debug_log: Box::new(artifacts.open_debug_log()?),
            frame_log: Box::new(artifacts.open_frame_log()?),
            telemetry: artifacts.telemetry(),
        };
        let worker = Worker::new(control_rx, senders, sinks, config.timeouts.demux())
            .verify_checksums(config.verify_checksums)
            .spawn()
            .map_err(SessionError::Spawn)?;
        let _ = control.send(WorkerControl::Attach(readers));

        let encoder = FrameEncoder::new(config.instrument.clone())
            .with_command_log(Box::new(artifacts.open_command_log()?));
        let next_gps = config.auto_gps.then(|| Instant::now() + FIRST_GPS_DELAY);

        info!(
            instrument = %config.instrument,
            zephyr = %zephyr.describe(),
            log = ?log.as_ref().map(|c| c.describe()),
            auto_ack = config.auto_ack,
            "session started"
        );

        Ok(Self {
            dispatcher: AckDispatcher::new(config.auto_ack),
            config,
            artifacts,
            encoder,
            zephyr,
            log,
            links: Some(links),
            control,
            queues,
            outbound,
            worker,
            next_gps,
        })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn artifacts(&self) -> &SessionArtifacts {
        &self.artifacts
    }

    pub fn instrument(&self) -> &str {
        self.encoder.instrument()
    }

    pub fn auto_ack(&self) -> bool {
        self.dispatcher.auto_ack()
    }

    pub fn set_auto_ack(&mut self, enabled: bool) {
        info!(enabled, "auto-ack changed");
        self.dispatcher.set_auto_ack(enabled);
    }

    pub fn auto_gps(&self) -> bool {
        self.next_gps.is_some()
    }

    pub fn set_auto_gps(&mut self, enabled: bool) {
        info!(enabled, "auto-GPS changed");
        self.next_gps = enabled.then(|| Instant::now() + self.config.gps_interval());
    }

    pub fn is_suspended(&self) -> bool {
        self.links.is_none()
    }

    /// Builds `message`, writes it on the Zephyr link and shows it in the
    /// frame display.
    pub fn send(&mut self, message: OutboundMessage) -> Result<Frame> {
        let links = self.links.as_mut().ok_or(SessionError::Suspended)?;
        let frame = self.encoder.build(&message);
        transmit(&frame, links.zephyr.as_mut())?;
        debug!(kind = %frame.kind, "frame sent");
        self.show_outbound(&frame);
        Ok(frame)
    }

    /// Drains everything the worker has reported, answering ack requests and
    /// sending a GPS frame if one is due.
    pub fn poll(&mut self) -> PollBatch {
        let mut batch = PollBatch::default();
        batch.log.extend(self.queues.log.try_iter());

        let requests: Vec<QueueEntry> = self.queues.acks.try_iter().collect();
        for request in requests {
            if let QueueEntry::AckRequest(kind) = request {
                if let Some(line) = self.handle_ack(kind) {
                    batch.log.push(line);
                }
            }
        }
        if let Some(line) = self.run_gps_timer(Instant::now()) {
            batch.log.push(line);
        }

        batch.frames.extend(self.queues.frames.try_iter());
        batch
    }

    /// Closes the links. The worker is told to drop its handles first.
    pub fn suspend(&mut self) -> Result<()> {
        if self.links.is_none() {
            return Err(SessionError::State("suspended"));
        }
        let _ = self.control.send(WorkerControl::Detach);
        self.links = None;
        info!("serial links suspended");
        Ok(())
    }

    /// Reopens the links and reattaches the worker. On failure the session
    /// stays suspended.
    pub fn resume(&mut self) -> Result<()> {
        if self.links.is_some() {
            return Err(SessionError::State("running"));
        }
        let links = LinkSet::open(self.zephyr.as_ref(), self.log.as_deref())?;
        let _ = self.control.send(WorkerControl::Attach(links.reader_handles()?));
        self.links = Some(links);
        info!("serial links resumed");
        Ok(())
    }

    /// Stops the worker and closes the links.
    pub fn shutdown(self) {
        let Session {
            control,
            links,
            worker,
            ..
        } = self;
        drop(control);
        drop(links);
        if worker.join().is_err() {
            error!("reader worker panicked");
        }
        info!("session closed");
    }

    /// Answers one ack request. Returns an error line for the log pane when
    /// the request could not be answered.
    fn handle_ack(&mut self, kind: MessageType) -> Option<QueueEntry> {
        let Some(links) = self.links.as_mut() else {
            debug!(%kind, "suspended, ack request dropped");
            return None;
        };
        match self
            .dispatcher
            .dispatch(kind, &mut self.encoder, links.zephyr.as_mut())
        {
            Ok(Some(frame)) => {
                self.show_outbound(&frame);
                None
            }
            Ok(None) => None,
            Err(err @ DispatchError::UnknownAckCommand(_)) => {
                error!(error = %err, "ack request ignored");
                Some(error_line(&err))
            }
            Err(err) => {
                warn!(error = %err, "ack not sent");
                Some(error_line(&err))
            }
        }
    }

    fn run_gps_timer(&mut self, now: Instant) -> Option<QueueEntry> {
        let due = self.next_gps?;
        if now < due {
            return None;
        }
        self.next_gps = Some(now + self.config.gps_interval());
        if self.is_suspended() {
            debug!("suspended, GPS skipped");
            return None;
        }
        let message = OutboundMessage::Gps {
            sza: self.config.default_sza,
            time: GpsTime::Clock,
        };
        match self.send(message) {
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "automatic GPS not sent");
                Some(error_line(&err))
            }
        }
    }

    fn show_outbound(&self, frame: &Frame) {
        let now = clock::now();
        let _ = self.outbound.send(QueueEntry::FrameDisplay {
            kind: frame.kind,
            direction: Direction::ToInstrument,
            text: format!("{} (TO) {}\n", clock::stamp(now), frame.summary()),
            timestamp: now,
        });
    }
}

fn error_line(err: &dyn std::error::Error) -> QueueEntry {
    let now = clock::now();
    QueueEntry::LogLine {
        text: format!("{}ERR: {err}\n", clock::stamp(now)),
        timestamp: now,
    }
}
