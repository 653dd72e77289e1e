//! Terminal preview for a running effect using crossterm.
//!
//! Draws the LED buffer either as a wrapped strip or, when the session has a
//! device, placed on the device canvas. Below it the control panel is rendered
//! from the session's widget tree; the selected control can be adjusted with
//! the arrow keys. The preview only reads frames, the scheduler owns the
//! machine.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    cursor,
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    style::{self, Color, Stylize},
    terminal::{self, ClearType},
    ExecutableCommand, QueueableCommand,
};
use futures::StreamExt;
use tracing::debug;

use super::{LedBuffer, MachineStatus};
use crate::color::Rgb;
use crate::device::DeviceConfig;
use crate::session::PreviewSession;

/// Width of each strip cell in characters.
const CELL_W: usize = 3;
/// Strip cells per row before wrapping.
const STRIP_COLS: usize = 24;
/// Canvas grid size used for device layouts.
const CANVAS_COLS: u16 = 48;
const CANVAS_ROWS: u16 = 18;
/// Speed change per +/- press.
const SPEED_STEP_MS: i64 = 10;
/// Dark gray for unlit LEDs.
const DIM: Color = Color::Rgb {
    r: 40,
    g: 40,
    b: 40,
};
/// Background color.
const BG: Color = Color::Rgb {
    r: 20,
    g: 20,
    b: 20,
};

const HELP: &str = "space start/stop  p pause  +/- speed  \u{2191}\u{2193} select  \u{2190}\u{2192} adjust  q quit";

/// What a key press asks the loop to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Quit,
    ToggleRun,
    TogglePause,
    Speed(i64),
    Select(isize),
    Adjust(i32),
}

fn key_action(key: KeyEvent) -> Option<Action> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    let action = match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Action::Quit,
        KeyCode::Char(' ') => Action::ToggleRun,
        KeyCode::Char('p') => Action::TogglePause,
        // Faster means a shorter interval
        KeyCode::Char('+') | KeyCode::Char('=') => Action::Speed(-SPEED_STEP_MS),
        KeyCode::Char('-') => Action::Speed(SPEED_STEP_MS),
        KeyCode::Up => Action::Select(-1),
        KeyCode::Down => Action::Select(1),
        KeyCode::Left => Action::Adjust(-1),
        KeyCode::Right => Action::Adjust(1),
        _ => return None,
    };
    Some(action)
}

/// Selection and the last message shown in the footer
#[derive(Debug, Default)]
struct View {
    selected: usize,
    message: Option<String>,
}

impl View {
    /// Apply an action to the session. Returns false on quit.
    fn apply(&mut self, session: &mut PreviewSession, action: Action) -> bool {
        let result = match action {
            Action::Quit => return false,
            Action::ToggleRun => session.toggle_run().map(|_| ()).map_err(|e| e.to_string()),
            Action::TogglePause => {
                session.scheduler().toggle_pause();
                Ok(())
            }
            Action::Speed(delta) => session
                .nudge_speed(delta)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Action::Select(delta) => {
                let count = session.controls().len();
                if count > 0 {
                    self.selected = (self.selected as isize + delta).rem_euclid(count as isize) as usize;
                }
                Ok(())
            }
            Action::Adjust(steps) => {
                if session.controls().is_empty() {
                    Ok(())
                } else {
                    session
                        .adjust_control(self.selected, steps)
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                }
            }
        };
        self.message = result.err();
        // Script panels may rebuild with fewer controls
        let count = session.controls().len();
        if count > 0 && self.selected >= count {
            self.selected = count - 1;
        }
        true
    }
}

/// Run the terminal preview. Returns when q/Esc is pressed.
pub async fn run(
    session: &mut PreviewSession,
    frame_interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = io::stdout();
    terminal::enable_raw_mode()?;
    stdout
        .execute(terminal::EnterAlternateScreen)?
        .execute(cursor::Hide)?
        .execute(terminal::Clear(ClearType::All))?;

    let result = run_loop(&mut stdout, session, frame_interval).await;

    // Cleanup
    stdout
        .execute(cursor::Show)?
        .execute(terminal::LeaveAlternateScreen)?;
    terminal::disable_raw_mode()?;

    result
}

async fn run_loop(
    stdout: &mut io::Stdout,
    session: &mut PreviewSession,
    frame_interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let dirty = Arc::new(AtomicBool::new(true));
    let frame_flag = Arc::clone(&dirty);
    let subscription = session.scheduler().subscribe_frames(move |_| {
        frame_flag.store(true, Ordering::Relaxed);
    });
    let mut status_rx = session.scheduler().watch_status();

    let mut events = EventStream::new();
    let mut redraw = tokio::time::interval(frame_interval);
    redraw.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut view = View::default();

    let result = loop {
        tokio::select! {
            event = events.next() => {
                match event {
                    Some(Ok(Event::Key(key))) => {
                        if let Some(action) = key_action(key) {
                            debug!(?action, "preview key");
                            if !view.apply(session, action) {
                                break Ok(());
                            }
                            dirty.store(true, Ordering::Relaxed);
                        }
                    }
                    Some(Ok(Event::Resize(..))) => {
                        stdout.queue(terminal::Clear(ClearType::All))?;
                        dirty.store(true, Ordering::Relaxed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(e.into()),
                    None => break Ok(()),
                }
            }

            changed = status_rx.changed() => {
                if changed.is_ok() {
                    dirty.store(true, Ordering::Relaxed);
                }
            }

            _ = redraw.tick() => {
                if dirty.swap(false, Ordering::Relaxed) {
                    if let Err(e) = draw(stdout, session, &view) {
                        break Err(e.into());
                    }
                }
            }
        }
    };

    session.scheduler().unsubscribe(subscription);
    result
}

fn draw(stdout: &mut io::Stdout, session: &PreviewSession, view: &View) -> io::Result<()> {
    let status = session.status();
    let status_color = match status {
        MachineStatus::Running => Color::Green,
        MachineStatus::Paused => Color::Yellow,
        MachineStatus::Idle => Color::Grey,
    };

    // Header
    stdout.queue(cursor::MoveTo(0, 0))?;
    stdout.queue(style::PrintStyledContent(
        format!(" {} ", session.name()).with(Color::White).on(Color::DarkGrey),
    ))?;
    stdout.queue(style::PrintStyledContent(
        format!(" {status} ").with(Color::Black).on(status_color),
    ))?;
    stdout.queue(style::PrintStyledContent(
        format!(" {} ms ", session.speed()).with(Color::White).on(Color::DarkGrey),
    ))?;
    stdout.queue(terminal::Clear(ClearType::UntilNewLine))?;

    let leds = session.leds();
    let mut row = 2;
    row = match session.device() {
        Some(device) if !device.placements().is_empty() => draw_canvas(stdout, device, &leds, row)?,
        _ => draw_strip(stdout, &leds, row)?,
    };

    // Panel
    row += 1;
    for line in session.panel_lines() {
        stdout.queue(cursor::MoveTo(0, row))?;
        stdout.queue(style::Print(" ".repeat(line.indent * 2 + 1)))?;
        if let Some(rgb) = line.swatch {
            stdout.queue(style::PrintStyledContent("  ".on(rgb_color(rgb))))?;
            stdout.queue(style::Print(" "))?;
        }
        let selected = line.control.is_some_and(|i| i == view.selected);
        if selected {
            stdout.queue(style::PrintStyledContent(
                format!("\u{25b6} {}", line.text).with(Color::Black).on(Color::White),
            ))?;
        } else {
            stdout.queue(style::Print(&line.text))?;
        }
        stdout.queue(terminal::Clear(ClearType::UntilNewLine))?;
        row += 1;
    }

    // Footer
    row += 1;
    stdout.queue(cursor::MoveTo(0, row))?;
    let error = view
        .message
        .clone()
        .or_else(|| session.scheduler().last_error().map(|e| e.to_string()));
    match error {
        Some(message) => stdout.queue(style::PrintStyledContent(
            format!(" {message} ").with(Color::White).on(Color::DarkRed),
        ))?,
        None => stdout.queue(style::PrintStyledContent(HELP.with(Color::DarkGrey)))?,
    };
    stdout.queue(terminal::Clear(ClearType::FromCursorDown))?;

    stdout.flush()
}

/// Draw the buffer as wrapped rows of cells. Returns the next free row.
fn draw_strip(stdout: &mut io::Stdout, leds: &LedBuffer, top: u16) -> io::Result<u16> {
    let mut row = top;
    for chunk in strip_rows(leds, STRIP_COLS) {
        stdout.queue(cursor::MoveTo(1, row))?;
        for rgb in chunk {
            let bg = if rgb.is_lit() { rgb_color(rgb) } else { DIM };
            stdout.queue(style::PrintStyledContent(" ".repeat(CELL_W).on(bg)))?;
            stdout.queue(style::PrintStyledContent(" ".on(BG)))?;
        }
        stdout.queue(terminal::Clear(ClearType::UntilNewLine))?;
        row += 1;
    }
    Ok(row)
}

/// Draw placed LEDs on a fixed grid. Returns the next free row.
fn draw_canvas(
    stdout: &mut io::Stdout,
    device: &DeviceConfig,
    leds: &LedBuffer,
    top: u16,
) -> io::Result<u16> {
    let blank = " ".repeat(CANVAS_COLS as usize);
    for r in 0..CANVAS_ROWS {
        stdout.queue(cursor::MoveTo(1, top + r))?;
        stdout.queue(style::PrintStyledContent(blank.as_str().on(BG)))?;
        stdout.queue(terminal::Clear(ClearType::UntilNewLine))?;
    }
    for (col, row, rgb) in canvas_cells(device, leds, CANVAS_COLS, CANVAS_ROWS) {
        let fg = if rgb.is_lit() { rgb_color(rgb) } else { DIM };
        stdout.queue(cursor::MoveTo(1 + col, top + row))?;
        stdout.queue(style::PrintStyledContent("\u{25cf}".with(fg).on(BG)))?;
    }
    Ok(top + CANVAS_ROWS)
}

fn strip_rows(leds: &LedBuffer, cols: usize) -> Vec<Vec<Rgb>> {
    let pixels: Vec<Rgb> = leds.pixels().collect();
    pixels.chunks(cols.max(1)).map(<[Rgb]>::to_vec).collect()
}

/// Grid cell and color of every placed LED that exists in the buffer
fn canvas_cells(device: &DeviceConfig, leds: &LedBuffer, cols: u16, rows: u16) -> Vec<(u16, u16, Rgb)> {
    device
        .placements()
        .into_iter()
        .filter_map(|p| {
            let rgb = leds.get(p.buffer_index)?;
            let (col, row) = device.to_cell(p.x, p.y, cols, rows);
            Some((col, row, rgb))
        })
        .collect()
}

fn rgb_color(rgb: Rgb) -> Color {
    Color::Rgb {
        r: rgb.r,
        g: rgb.g,
        b: rgb.b,
    }
}
