//! Terminal front end: crossterm input drives a `StickyRuntime<SceneHost>`.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers, MouseEventKind};
use crossterm::style::Print;
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, queue};
use thiserror::Error;

use crate::error::StickyError;
use crate::geometry::Size;
use crate::host::{HostInput, SceneHost};

use super::{RuntimeEvent, StickyRuntime};

/// Lines scrolled per mouse wheel notch.
pub const WHEEL_LINES: f32 = 3.0;
/// Lines scrolled per page key.
pub const PAGE_LINES: f32 = 10.0;

pub type DriverResult<T> = std::result::Result<T, DriverError>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("runtime error: {0}")]
    Runtime(#[from] StickyError),
    #[error("terminal error: {0}")]
    Terminal(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Map a terminal event to scene input. Terminal rows are scaled by
/// `line_height` so the scene can use its own vertical units.
pub fn translate_event(event: &Event, line_height: f32) -> Option<HostInput> {
    match event {
        Event::Resize(cols, rows) => Some(HostInput::Resize(Size::new(
            f32::from(*cols),
            f32::from(*rows) * line_height,
        ))),
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::ScrollDown => Some(HostInput::ScrollBy(WHEEL_LINES * line_height)),
            MouseEventKind::ScrollUp => Some(HostInput::ScrollBy(-WHEEL_LINES * line_height)),
            _ => None,
        },
        Event::Key(key) if key.kind != KeyEventKind::Release => match key.code {
            KeyCode::Down | KeyCode::Char('j') => Some(HostInput::ScrollBy(line_height)),
            KeyCode::Up | KeyCode::Char('k') => Some(HostInput::ScrollBy(-line_height)),
            KeyCode::PageDown | KeyCode::Char(' ') => {
                Some(HostInput::ScrollBy(PAGE_LINES * line_height))
            }
            KeyCode::PageUp => Some(HostInput::ScrollBy(-PAGE_LINES * line_height)),
            KeyCode::Home => Some(HostInput::ScrollTo(0.0)),
            KeyCode::End => Some(HostInput::ScrollTo(f32::MAX)),
            _ => None,
        },
        _ => None,
    }
}

/// `q`, `Esc` and `Ctrl+C` end the session.
pub fn is_quit(event: &Event) -> bool {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
            matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
        }
        _ => false,
    }
}

/// Owns a runtime and the terminal's raw mode/alternate screen state.
pub struct TerminalDriver {
    runtime: StickyRuntime<SceneHost>,
    line_height: f32,
}

impl TerminalDriver {
    pub fn new(runtime: StickyRuntime<SceneHost>) -> Self {
        Self {
            runtime,
            line_height: 1.0,
        }
    }

    pub fn with_line_height(mut self, line_height: f32) -> Self {
        self.line_height = if line_height > 0.0 { line_height } else { 1.0 };
        self
    }

    pub fn runtime(&self) -> &StickyRuntime<SceneHost> {
        &self.runtime
    }

    /// Feed one terminal event. Returns `false` once the session should end.
    pub fn handle_event(&mut self, event: &Event) -> DriverResult<bool> {
        if is_quit(event) {
            return Ok(false);
        }
        if let Some(input) = translate_event(event, self.line_height) {
            self.runtime.apply_input(input)?;
        }
        Ok(!self.runtime.should_exit())
    }

    /// Run a frame followed by the deferred tick.
    pub fn frame(&mut self) -> DriverResult<()> {
        self.runtime.dispatch(RuntimeEvent::Frame)?;
        self.runtime.dispatch(RuntimeEvent::Tick)?;
        Ok(())
    }

    pub fn run(mut self) -> DriverResult<StickyRuntime<SceneHost>> {
        let mut stdout = io::stdout();
        self.enter(&mut stdout)?;
        let result = self.run_inner(&mut stdout);
        self.exit(&mut stdout);
        result.map(|_| self.runtime)
    }

    fn run_inner(&mut self, stdout: &mut impl Write) -> DriverResult<()> {
        let (cols, rows) = terminal::size()?;
        self.handle_event(&Event::Resize(cols, rows))?;

        let frame_interval = self.runtime.config().frame_interval;
        let mut last_frame = Instant::now();
        loop {
            let timeout = frame_interval
                .checked_sub(last_frame.elapsed())
                .unwrap_or(Duration::ZERO);
            if event::poll(timeout)? {
                let event = event::read()?;
                if !self.handle_event(&event)? {
                    break;
                }
            }

            if last_frame.elapsed() >= frame_interval {
                last_frame = Instant::now();
                self.frame()?;
                self.draw_status(stdout)?;
            }
        }
        Ok(())
    }

    fn draw_status(&self, stdout: &mut impl Write) -> DriverResult<()> {
        let host = self.runtime.host();
        let mut line = format!("scroll {:.0}/{:.0}", host.scroll_top(), host.max_scroll());
        for group in self.runtime.groups() {
            let sticky: Vec<&str> = group
                .members()
                .iter()
                .filter(|member| member.is_sticky())
                .map(|member| member.id())
                .collect();
            line.push_str(&format!(
                " | {} [{}] +{:.0}",
                group.id(),
                sticky.join(","),
                group.total_sticky_height()
            ));
        }
        queue!(stdout, MoveTo(0, 0), Clear(ClearType::CurrentLine), Print(line))?;
        stdout.flush()?;
        Ok(())
    }

    fn enter(&self, stdout: &mut impl Write) -> DriverResult<()> {
        terminal::enable_raw_mode().map_err(|err| DriverError::Terminal(err.to_string()))?;
        execute!(
            stdout,
            EnterAlternateScreen,
            event::EnableMouseCapture,
            Hide,
            Clear(ClearType::All)
        )?;
        Ok(())
    }

    fn exit(&self, stdout: &mut impl Write) {
        execute!(stdout, Show, event::DisableMouseCapture, LeaveAlternateScreen).ok();
        terminal::disable_raw_mode().ok();
    }
}
