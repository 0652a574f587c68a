//! Headless console: entries go to stdout, commands come from stdin.

use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, RecvTimeoutError};
use obc_sim::{AckKind, InstrumentMode, OutboundMessage, Session};
use tracing::debug;

use super::{parse_sza, perform, Action};

const HELP: &str = "commands: im <SB|FL|LP|SA|EF>, gps [SZA], sw, tc <COMMAND>, \
                    sack, raack, tmack, autoack [on|off], autogps [on|off], \
                    suspend, resume, quit";

/// Parses one operator line. Blank lines are `Ok(None)`.
pub fn parse_command(line: &str, default_sza: f64) -> Result<Option<Action>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let action = match word.to_ascii_lowercase().as_str() {
        "im" => Action::mode(rest.parse::<InstrumentMode>()?),
        "gps" if rest.is_empty() => Action::gps(default_sza),
        "gps" => Action::gps(parse_sza(rest)?),
        "sw" => Action::Send(OutboundMessage::ShutdownWarning),
        "tc" if rest.is_empty() => return Err("tc needs a command".into()),
        // The command is sent verbatim, spacing included.
        "tc" => Action::Send(OutboundMessage::Telecommand(rest.to_string())),
        "sack" => Action::ack(AckKind::SAck),
        "raack" => Action::ack(AckKind::RAAck),
        "tmack" => Action::ack(AckKind::TMAck),
        "autoack" => Action::AutoAck(parse_switch(rest)?),
        "autogps" => Action::AutoGps(parse_switch(rest)?),
        "suspend" => Action::Suspend,
        "resume" => Action::Resume,
        "quit" | "exit" => Action::Quit,
        other => return Err(format!("unknown command `{other}`; {HELP}")),
    };
    Ok(Some(action))
}

/// `on`/`off`, or nothing to flip the setting.
fn parse_switch(text: &str) -> Result<Option<bool>, String> {
    match text.to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "on" => Ok(Some(true)),
        "off" => Ok(Some(false)),
        other => Err(format!("expected on or off, got `{other}`")),
    }
}

pub fn run(mut session: Session) -> anyhow::Result<()> {
    println!("=========================");
    println!("      OBC Simulator      ");
    println!("=========================");
    println!(
        "Instrument {} on {}. Session files in {}",
        session.instrument(),
        session.config().zephyr_port,
        session.artifacts().dir().display()
    );
    println!("{HELP}");

    let (lines_tx, lines_rx) = unbounded();
    thread::Builder::new()
        .name("obc-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if lines_tx.send(line).is_err() {
                    break;
                }
            }
        })?;

    let ui_poll = session.config().timeouts.ui_poll();
    let default_sza = session.config().default_sza;
    let mut stdout = io::stdout();
    loop {
        let batch = session.poll();
        for entry in batch.log.iter().chain(&batch.frames) {
            if let Some(text) = entry.text() {
                stdout.write_all(text.as_bytes())?;
            }
        }
        stdout.flush()?;

        match lines_rx.recv_timeout(ui_poll) {
            Ok(line) => match parse_command(&line, default_sza) {
                Ok(Some(Action::Quit)) => break,
                Ok(Some(action)) => println!("{}", perform(&mut session, action)),
                Ok(None) => {}
                Err(message) => eprintln!("[ERROR] {message}"),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!("stdin closed");
                break;
            }
        }
    }

    // Let in-flight acknowledgements go out before closing.
    thread::sleep(Duration::from_millis(50));
    session.poll();
    session.shutdown();
    Ok(())
}
