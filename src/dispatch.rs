//! Automatic acknowledgements.

use std::io::Write;

use tracing::{debug, info};

use crate::encoder::{AckKind, FrameEncoder, OutboundMessage};
use crate::error::DispatchError;
use crate::message::{Frame, MessageType};

/// Answers ack requests from the reader according to the session's
/// auto-ack policy.
#[derive(Debug, Clone, Copy)]
pub struct AckDispatcher {
    auto_ack: bool,
}

impl AckDispatcher {
    pub fn new(auto_ack: bool) -> Self {
        Self { auto_ack }
    }

    pub fn auto_ack(&self) -> bool {
        self.auto_ack
    }

    pub fn set_auto_ack(&mut self, enabled: bool) {
        self.auto_ack = enabled;
    }

    /// Builds and transmits the acknowledgement for `requested`.
    ///
    /// With auto-ack off every request is dropped, recognised or not, and
    /// `Ok(None)` is returned.
    pub fn dispatch<W: Write + ?Sized>(
        &self,
        requested: MessageType,
        encoder: &mut FrameEncoder,
        link: &mut W,
    ) -> Result<Option<Frame>, DispatchError> {
        if !self.auto_ack {
            debug!(%requested, "auto-ack disabled, request dropped");
            return Ok(None);
        }
        let kind = AckKind::try_from(requested).map_err(DispatchError::UnknownAckCommand)?;
        let frame = encoder.build(&OutboundMessage::ack(kind));
        transmit(&frame, link)?;
        info!(kind = %frame.kind, "acknowledgement sent");
        Ok(Some(frame))
    }
}

/// Writes a frame, binary trailer included, and flushes the link.
pub fn transmit<W: Write + ?Sized>(frame: &Frame, link: &mut W) -> Result<(), DispatchError> {
    link.write_all(&frame.to_bytes())
        .and_then(|()| link.flush())
        .map_err(|source| DispatchError::Transmit {
            kind: frame.kind,
            source,
        })
}
