//! Operator console: argument parsing, diagnostics setup, and the two front
//! ends (full-screen TUI and line-oriented headless console).

pub mod args;
pub mod console;
pub mod logging;
pub mod tui;

use obc_sim::{AckKind, GpsTime, InstrumentMode, OutboundMessage, Session};

/// Something the operator asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Send(OutboundMessage),
    Suspend,
    Resume,
    ToggleSuspend,
    /// `None` flips the current setting.
    AutoAck(Option<bool>),
    AutoGps(Option<bool>),
    Quit,
}

impl Action {
    pub fn gps(sza: f64) -> Self {
        Action::Send(OutboundMessage::Gps {
            sza,
            time: GpsTime::Clock,
        })
    }

    pub fn ack(kind: AckKind) -> Self {
        Action::Send(OutboundMessage::ack(kind))
    }

    pub fn mode(mode: InstrumentMode) -> Self {
        Action::Send(OutboundMessage::InstrumentMode(mode))
    }
}

/// Carries out `action` and returns a one-line status for the operator.
/// `Quit` is left to the caller.
pub fn perform(session: &mut Session, action: Action) -> String {
    let result = match action {
        Action::Send(message) => session
            .send(message)
            .map(|frame| format!("sent {}", frame.kind)),
        Action::Suspend => session.suspend().map(|()| "links suspended".to_string()),
        Action::Resume => session.resume().map(|()| "links resumed".to_string()),
        Action::ToggleSuspend if session.is_suspended() => {
            session.resume().map(|()| "links resumed".to_string())
        }
        Action::ToggleSuspend => session.suspend().map(|()| "links suspended".to_string()),
        Action::AutoAck(enabled) => {
            let enabled = enabled.unwrap_or(!session.auto_ack());
            session.set_auto_ack(enabled);
            Ok(format!("auto-ack {}", on_off(enabled)))
        }
        Action::AutoGps(enabled) => {
            let enabled = enabled.unwrap_or(!session.auto_gps());
            session.set_auto_gps(enabled);
            Ok(format!("auto-GPS {}", on_off(enabled)))
        }
        Action::Quit => Ok(String::new()),
    };
    result.unwrap_or_else(|err| {
        tracing::warn!(error = %err, "operator action failed");
        format!("error: {err}")
    })
}

/// Solar zenith angle typed by the operator, in degrees.
pub fn parse_sza(text: &str) -> Result<f64, String> {
    let sza: f64 = text
        .trim()
        .parse()
        .map_err(|_| format!("SZA `{}` is not a number", text.trim()))?;
    if !(0.0..=180.0).contains(&sza) {
        return Err(format!("SZA {sza} is outside 0..=180"));
    }
    Ok(sza)
}

pub fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

pub fn list_ports() -> anyhow::Result<()> {
    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        println!("  {}", port.port_name);
    }
    Ok(())
}
