//! Full-screen console.
//!
//! Layout: a status bar, the instrument's debug text on the left, frames to
//! and from the instrument on the right, and a prompt/help line at the
//! bottom. Single keys send messages; `i`, `g` and `t` open a prompt first.

use std::collections::VecDeque;
use std::io::{self, Stdout};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use obc_sim::queue::Direction as Flow;
use obc_sim::{
    AckKind, InstrumentMode, MessageType, OutboundMessage, PollBatch, QueueEntry, Session,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::{Frame, Terminal};

use super::{on_off, parse_sza, perform, Action};

/// Lines kept per pane.
const SCROLLBACK: usize = 2000;

const ORANGE: Color = Color::Rgb(255, 165, 0);

#[derive(Debug, Clone, PartialEq)]
enum Prompt {
    None,
    Mode,
    Sza(String),
    Command(String),
}

#[derive(Debug, Clone, PartialEq)]
struct FrameLine {
    direction: Flow,
    kind: MessageType,
    text: String,
}

impl FrameLine {
    /// Outbound frames are blue. Telemetry is coloured by the severity its
    /// summary carries.
    fn color(&self) -> Option<Color> {
        match (self.direction, self.kind) {
            (Flow::ToInstrument, _) => Some(Color::Blue),
            (Flow::FromInstrument, MessageType::TM) if self.text.contains("CRIT") => {
                Some(Color::Red)
            }
            (Flow::FromInstrument, MessageType::TM) if self.text.contains("WARN") => Some(ORANGE),
            (Flow::FromInstrument, MessageType::TM) => Some(Color::Green),
            (Flow::FromInstrument, _) => None,
        }
    }
}

struct App {
    log: VecDeque<String>,
    frames: VecDeque<FrameLine>,
    prompt: Prompt,
    status: String,
    default_sza: f64,
}

impl App {
    fn new(default_sza: f64) -> Self {
        Self {
            log: VecDeque::new(),
            frames: VecDeque::new(),
            prompt: Prompt::None,
            status: String::new(),
            default_sza,
        }
    }

    fn absorb(&mut self, batch: PollBatch) {
        for entry in batch.log {
            if let QueueEntry::LogLine { text, .. } = entry {
                push_capped(&mut self.log, text.trim_end().to_string());
            }
        }
        for entry in batch.frames {
            if let QueueEntry::FrameDisplay {
                kind,
                direction,
                text,
                ..
            } = entry
            {
                let line = FrameLine {
                    direction,
                    kind,
                    text: text.trim_end().to_string(),
                };
                push_capped(&mut self.frames, line);
            }
        }
    }

    /// Translates a key press into an action, updating prompt state.
    fn on_key(&mut self, key: KeyEvent) -> Option<Action> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        match &mut self.prompt {
            Prompt::None => self.on_command_key(key.code),
            Prompt::Mode => {
                let choice = match key.code {
                    KeyCode::Char(c @ '1'..='5') => {
                        InstrumentMode::ALL.get(usize::from(c as u8 - b'1')).copied()
                    }
                    _ => None,
                };
                self.prompt = Prompt::None;
                choice.map(Action::mode)
            }
            Prompt::Sza(text) | Prompt::Command(text) => match key.code {
                KeyCode::Esc => {
                    self.prompt = Prompt::None;
                    None
                }
                KeyCode::Backspace => {
                    text.pop();
                    None
                }
                KeyCode::Char(c) => {
                    text.push(c);
                    None
                }
                KeyCode::Enter => self.submit_prompt(),
                _ => None,
            },
        }
    }

    fn on_command_key(&mut self, code: KeyCode) -> Option<Action> {
        match code {
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('i') => {
                self.prompt = Prompt::Mode;
                None
            }
            KeyCode::Char('g') => {
                self.prompt = Prompt::Sza(obc_sim::encoder::format_float(self.default_sza));
                None
            }
            KeyCode::Char('t') => {
                self.prompt = Prompt::Command(String::new());
                None
            }
            KeyCode::Char('w') => Some(Action::Send(OutboundMessage::ShutdownWarning)),
            KeyCode::Char('s') => Some(Action::ack(AckKind::SAck)),
            KeyCode::Char('r') => Some(Action::ack(AckKind::RAAck)),
            KeyCode::Char('m') => Some(Action::ack(AckKind::TMAck)),
            KeyCode::Char('p') => Some(Action::ToggleSuspend),
            KeyCode::Char('a') => Some(Action::AutoAck(None)),
            KeyCode::Char('G') => Some(Action::AutoGps(None)),
            _ => None,
        }
    }

    fn submit_prompt(&mut self) -> Option<Action> {
        match std::mem::replace(&mut self.prompt, Prompt::None) {
            Prompt::Sza(text) => match parse_sza(&text) {
                Ok(sza) => Some(Action::gps(sza)),
                Err(message) => {
                    self.status = format!("error: {message}");
                    None
                }
            },
            Prompt::Command(text) if text.is_empty() => None,
            Prompt::Command(text) => Some(Action::Send(OutboundMessage::Telecommand(text))),
            Prompt::None | Prompt::Mode => None,
        }
    }
}

fn push_capped<T>(lines: &mut VecDeque<T>, line: T) {
    if lines.len() == SCROLLBACK {
        lines.pop_front();
    }
    lines.push_back(line);
}

pub fn run(mut session: Session) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let mut app = App::new(session.config().default_sza);
    let result = event_loop(&mut terminal, &mut app, &mut session);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    session.shutdown();
    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    session: &mut Session,
) -> anyhow::Result<()> {
    let ui_poll: Duration = session.config().timeouts.ui_poll();
    loop {
        app.absorb(session.poll());
        terminal.draw(|f| draw(f, app, session))?;

        if event::poll(ui_poll)? {
            if let Event::Key(key) = event::read()? {
                match app.on_key(key) {
                    Some(Action::Quit) => return Ok(()),
                    Some(action) => app.status = perform(session, action),
                    None => {}
                }
            }
        }
    }
}

fn draw(f: &mut Frame, app: &App, session: &Session) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(f.size());

    draw_status(f, app, session, rows[0]);

    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[1]);

    let log_lines = tail(&app.log, panes[0]).map(|line| {
        let style = if line.contains("ERR: ") {
            Style::default().fg(Color::Red)
        } else {
            Style::default()
        };
        Line::styled(line.clone(), style)
    });
    f.render_widget(
        Paragraph::new(log_lines.collect::<Vec<_>>()).block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Instrument Debug "),
        ),
        panes[0],
    );

    let frame_lines = tail(&app.frames, panes[1]).map(|line| {
        let style = line
            .color()
            .map_or_else(Style::default, |color| Style::default().fg(color));
        Line::styled(line.text.clone(), style)
    });
    f.render_widget(
        Paragraph::new(frame_lines.collect::<Vec<_>>()).block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Zephyr Messages "),
        ),
        panes[1],
    );

    f.render_widget(Paragraph::new(prompt_line(app)), rows[2]);
}

fn draw_status(f: &mut Frame, app: &App, session: &Session, area: Rect) {
    let config = session.config();
    let (link_text, link_color) = if session.is_suspended() {
        ("SUSPENDED", Color::Red)
    } else {
        ("CONNECTED", Color::Green)
    };
    let ports = match config.separate_log_port() {
        Some(log) => format!("{} + {}", config.zephyr_port, log),
        None => config.zephyr_port.clone(),
    };
    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", session.instrument()),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("| {ports} @ {} | ", config.baud_rate)),
        Span::styled(link_text, Style::default().fg(link_color)),
        Span::raw(format!(
            " | auto-ack {} | auto-GPS {} | {}",
            on_off(session.auto_ack()),
            on_off(session.auto_gps()),
            app.status
        )),
    ]);
    f.render_widget(
        Paragraph::new(line).block(
            Block::default()
                .borders(Borders::ALL)
                .title(" OBC Simulator "),
        ),
        area,
    );
}

fn prompt_line(app: &App) -> Line<'static> {
    match &app.prompt {
        Prompt::None => Line::raw(
            " i IM  g GPS  w SW  t TC  s SAck  r RAAck  m TMAck  a auto-ack  G auto-GPS  \
             p suspend/resume  q quit",
        ),
        Prompt::Mode => Line::raw(" Mode: 1 SB  2 FL  3 LP  4 SA  5 EF  (other key cancels)"),
        Prompt::Sza(text) => Line::raw(format!(" SZA (0-180): {text}_  (Enter sends, Esc cancels)")),
        Prompt::Command(text) => {
            Line::raw(format!(" TC command: {text}_  (Enter sends, Esc cancels)"))
        }
    }
}

/// The last lines of `lines` that fit inside a bordered `area`.
fn tail<T>(lines: &VecDeque<T>, area: Rect) -> impl Iterator<Item = &T> {
    let visible = usize::from(area.height.saturating_sub(2));
    lines.iter().skip(lines.len().saturating_sub(visible))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use crossterm::event::KeyModifiers;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            assert_eq!(app.on_key(press(KeyCode::Char(c))), None);
        }
    }

    #[test]
    fn single_keys_map_to_actions() {
        let mut app = App::new(120.0);
        assert_eq!(app.on_key(press(KeyCode::Char('w'))), Some(Action::Send(OutboundMessage::ShutdownWarning)));
        assert_eq!(app.on_key(press(KeyCode::Char('m'))), Some(Action::ack(AckKind::TMAck)));
        assert_eq!(app.on_key(press(KeyCode::Char('p'))), Some(Action::ToggleSuspend));
        assert_eq!(app.on_key(press(KeyCode::Char('a'))), Some(Action::AutoAck(None)));
        assert_eq!(app.on_key(press(KeyCode::Char('G'))), Some(Action::AutoGps(None)));
        assert_eq!(app.on_key(press(KeyCode::Char('q'))), Some(Action::Quit));
        assert_eq!(app.on_key(press(KeyCode::Char('z'))), None);
    }

    #[test]
    fn mode_prompt_takes_a_digit() {
        let mut app = App::new(120.0);
        assert_eq!(app.on_key(press(KeyCode::Char('i'))), None);
        assert_eq!(app.prompt, Prompt::Mode);
        assert_eq!(
            app.on_key(press(KeyCode::Char('3'))),
            Some(Action::mode(InstrumentMode::LowPower))
        );
        assert_eq!(app.prompt, Prompt::None);

        app.on_key(press(KeyCode::Char('i')));
        assert_eq!(app.on_key(press(KeyCode::Char('x'))), None);
        assert_eq!(app.prompt, Prompt::None);
    }

    #[test]
    fn gps_prompt_starts_from_default_sza() {
        let mut app = App::new(120.0);
        app.on_key(press(KeyCode::Char('g')));
        assert_eq!(app.prompt, Prompt::Sza("120.0".into()));
        for _ in 0..5 {
            app.on_key(press(KeyCode::Backspace));
        }
        type_text(&mut app, "45");
        assert_eq!(app.on_key(press(KeyCode::Enter)), Some(Action::gps(45.0)));
    }

    #[test]
    fn bad_sza_is_reported_not_sent() {
        let mut app = App::new(120.0);
        app.on_key(press(KeyCode::Char('g')));
        type_text(&mut app, "x");
        assert_eq!(app.on_key(press(KeyCode::Enter)), None);
        assert!(app.status.starts_with("error:"));
    }

    #[test]
    fn command_prompt_sends_telecommand() {
        let mut app = App::new(120.0);
        app.on_key(press(KeyCode::Char('t')));
        // Command keys are plain text inside a prompt.
        type_text(&mut app, "q1;");
        assert_eq!(
            app.on_key(press(KeyCode::Enter)),
            Some(Action::Send(OutboundMessage::Telecommand("q1;".into())))
        );

        app.on_key(press(KeyCode::Char('t')));
        assert_eq!(app.on_key(press(KeyCode::Esc)), None);
        assert_eq!(app.prompt, Prompt::None);
    }

    #[test]
    fn panes_keep_bounded_scrollback() {
        let mut app = App::new(120.0);
        let at = NaiveDate::from_ymd_opt(2026, 10, 18)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap();
        let batch = PollBatch {
            log: (0..SCROLLBACK + 5)
                .map(|i| QueueEntry::LogLine {
                    text: format!("[12:00:00.000] line {i}\n"),
                    timestamp: at,
                })
                .collect(),
            frames: vec![QueueEntry::FrameDisplay {
                kind: MessageType::S,
                direction: Flow::FromInstrument,
                text: "[12:00:00.000] S       Msg:1\n".into(),
                timestamp: at,
            }],
        };
        app.absorb(batch);
        assert_eq!(app.log.len(), SCROLLBACK);
        assert_eq!(app.log.front().unwrap(), "[12:00:00.000] line 5");
        assert_eq!(app.frames[0].text, "[12:00:00.000] S       Msg:1");
        assert_eq!(app.frames[0].color(), None);
    }

    #[test]
    fn telemetry_lines_are_coloured_by_severity() {
        let line = |direction, kind, text: &str| FrameLine {
            direction,
            kind,
            text: text.into(),
        };
        let tm = |text| line(Flow::FromInstrument, MessageType::TM, text);
        assert_eq!(tm("TM      StateFlag1:CRIT").color(), Some(Color::Red));
        assert_eq!(tm("TM      StateFlag1:WARN").color(), Some(ORANGE));
        assert_eq!(tm("TM      StateFlag1:FINE").color(), Some(Color::Green));
        assert_eq!(
            line(Flow::ToInstrument, MessageType::TMAck, "(TO) TMAck   Ack:ACK").color(),
            Some(Color::Blue)
        );
        assert_eq!(line(Flow::FromInstrument, MessageType::S, "S       Msg:CRIT").color(), None);
    }
}
