//! Row-diffing terminal renderer.
//!
//! Each cycle the dashboard composes a full candidate frame (one
//! [`RenderedRow`] per screen row) from a [`UiState`] snapshot.  The
//! [`Renderer`] compares it with its row cache and only touches rows whose
//! content changed; all of a frame's writes go out in one flush.
//!
//! Layout:
//!
//! ```text
//!   0   radio-gaga                          ↑↓ select  ⏎ play/stop  q quit
//!   1   ──────────────────────────────────────────────────────────────────
//!   2   ▶ 1  NTS1  Alice Coltrane - Turiya
//!   3   ■ 2  NTS2  Live Stream
//!   ..
//!   n   ● Playing NTS1                                            21:04:17
//!   n+1 API error - continuing                              (toast, optional)
//! ```

use std::collections::HashMap;
use std::io::{self, Write};
use std::time::{Duration, Instant};

use gaga_proto::protocol::{Stream, StreamId};
use gaga_proto::state::UiState;
use ratatui::crossterm::{
    cursor::MoveTo,
    queue,
    style::{Attribute, Color as TermColor, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use ratatui::style::{Color, Modifier, Style};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::theme;

pub const GLYPH_PLAYING: &str = "▶";
pub const GLYPH_STOPPED: &str = "■";
const ELLIPSIS: char = '…';
const HEADER_HINT: &str = "↑↓ select  ⏎ play/stop  s stop  r refresh  x random  q quit";

// ── Rows ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRow {
    pub text: String,
    pub style: Style,
}

impl RenderedRow {
    pub fn new(text: impl Into<String>, style: Style) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

pub type Frame = HashMap<u16, RenderedRow>;

/// Inputs to frame composition that do not live in the shared state.
pub struct FrameContext<'a> {
    pub streams: &'a [Stream],
    pub selected: StreamId,
    pub now: Instant,
    pub clock: String,
    pub width: u16,
    pub height: u16,
}

/// Truncate `text` to `width` columns, marking the cut with an ellipsis.
pub fn fit_width(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > width - 1 {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push(ELLIPSIS);
    out
}

/// `left` and `right` on one row, `right` flush against the edge.  `left` is
/// truncated first when the two do not fit.
fn spread(left: &str, right: &str, width: usize) -> String {
    let right_w = right.width();
    if right_w + 1 >= width {
        return fit_width(left, width);
    }
    let left = fit_width(left, width - right_w - 1);
    let gap = width - left.width() - right_w;
    format!("{}{}{}", left, " ".repeat(gap), right)
}

/// Build the full candidate frame for one snapshot.
pub fn compose_frame(state: &UiState, ctx: &FrameContext<'_>) -> Frame {
    let width = ctx.width as usize;
    let mut rows: Vec<RenderedRow> = Vec::with_capacity(ctx.streams.len() + 5);

    rows.push(RenderedRow::new(
        spread("radio-gaga", HEADER_HINT, width),
        theme::style_title(),
    ));
    rows.push(RenderedRow::new("─".repeat(width), theme::style_muted()));

    let name_w = ctx.streams.iter().map(|s| s.name.width()).max().unwrap_or(0);
    for stream in ctx.streams {
        let playing = state.playback.is_playing_stream(stream.id);
        let glyph = if playing { GLYPH_PLAYING } else { GLYPH_STOPPED };
        let hint = if stream.id < 9 {
            (stream.id + 1).to_string()
        } else {
            " ".to_string()
        };
        let line = state
            .display_line(stream.id)
            .cloned()
            .unwrap_or_default();
        let pad = " ".repeat(name_w - stream.name.width());
        let text = format!("{} {}  {}{}  {}", glyph, hint, stream.name, pad, line);
        rows.push(RenderedRow::new(
            fit_width(&text, width),
            theme::style_stream(stream.id == ctx.selected, playing),
        ));
    }

    rows.push(RenderedRow::new("", Style::default()));
    let status = match state.playback.active_stream_id {
        Some(id) if state.playback.is_playing => {
            let name = ctx
                .streams
                .iter()
                .find(|s| s.id == id)
                .map(|s| s.name.as_str())
                .unwrap_or("?");
            format!("● Playing {}", name)
        }
        _ => "■ Stopped".to_string(),
    };
    rows.push(RenderedRow::new(
        spread(&status, &ctx.clock, width),
        theme::style_status(state.playback.is_playing, state.playback.process_alive),
    ));

    if let Some(toast) = state.toast.as_ref().filter(|t| t.is_visible(ctx.now)) {
        rows.push(RenderedRow::new(
            fit_width(&toast.message, width),
            theme::style_toast(toast.severity),
        ));
    }

    rows.into_iter()
        .enumerate()
        .take(ctx.height as usize)
        .map(|(i, row)| (i as u16, row))
        .collect()
}

// ── Surface ───────────────────────────────────────────────────────────────────

/// Where row writes go.  Writes may be buffered until [`RowSurface::flush`].
pub trait RowSurface {
    fn draw_row(&mut self, row: u16, content: &RenderedRow) -> io::Result<()>;
    fn clear_row(&mut self, row: u16) -> io::Result<()>;
    fn clear_all(&mut self) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

/// Queues crossterm commands on a writer; nothing reaches the terminal until
/// `flush`.
pub struct CrosstermSurface<W: Write> {
    out: W,
}

impl<W: Write> CrosstermSurface<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

fn term_color(color: Color) -> TermColor {
    match color {
        Color::Reset => TermColor::Reset,
        Color::Black => TermColor::Black,
        Color::Red => TermColor::DarkRed,
        Color::Green => TermColor::DarkGreen,
        Color::Yellow => TermColor::DarkYellow,
        Color::Blue => TermColor::DarkBlue,
        Color::Magenta => TermColor::DarkMagenta,
        Color::Cyan => TermColor::DarkCyan,
        Color::Gray => TermColor::Grey,
        Color::DarkGray => TermColor::DarkGrey,
        Color::LightRed => TermColor::Red,
        Color::LightGreen => TermColor::Green,
        Color::LightYellow => TermColor::Yellow,
        Color::LightBlue => TermColor::Blue,
        Color::LightMagenta => TermColor::Magenta,
        Color::LightCyan => TermColor::Cyan,
        Color::White => TermColor::White,
        Color::Rgb(r, g, b) => TermColor::Rgb { r, g, b },
        Color::Indexed(i) => TermColor::AnsiValue(i),
    }
}

impl<W: Write> RowSurface for CrosstermSurface<W> {
    fn draw_row(&mut self, row: u16, content: &RenderedRow) -> io::Result<()> {
        let style = content.style;
        queue!(self.out, MoveTo(0, row), Clear(ClearType::CurrentLine))?;
        if let Some(fg) = style.fg {
            queue!(self.out, SetForegroundColor(term_color(fg)))?;
        }
        if let Some(bg) = style.bg {
            queue!(self.out, SetBackgroundColor(term_color(bg)))?;
        }
        if style.add_modifier.contains(Modifier::BOLD) {
            queue!(self.out, SetAttribute(Attribute::Bold))?;
        }
        queue!(
            self.out,
            Print(&content.text),
            SetAttribute(Attribute::Reset),
            ResetColor
        )
    }

    fn clear_row(&mut self, row: u16) -> io::Result<()> {
        queue!(self.out, MoveTo(0, row), Clear(ClearType::CurrentLine))
    }

    fn clear_all(&mut self) -> io::Result<()> {
        queue!(self.out, Clear(ClearType::All))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

// ── Renderer ──────────────────────────────────────────────────────────────────

/// What one render pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameDiff {
    pub drawn: usize,
    pub cleared: usize,
}

impl FrameDiff {
    pub fn is_empty(&self) -> bool {
        self.drawn == 0 && self.cleared == 0
    }
}

pub struct Renderer<S: RowSurface> {
    surface: S,
    cache: HashMap<u16, RenderedRow>,
    needs_full_clear: bool,
}

impl<S: RowSurface> Renderer<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            cache: HashMap::new(),
            needs_full_clear: true,
        }
    }

    #[cfg(test)]
    fn surface(&self) -> &S {
        &self.surface
    }

    /// Forget everything on screen; the next frame is drawn in full.
    pub fn invalidate(&mut self) {
        self.cache.clear();
        self.needs_full_clear = true;
    }

    /// Apply `frame`, touching only rows that differ from the cache.
    pub fn render(&mut self, frame: Frame) -> io::Result<FrameDiff> {
        let mut diff = FrameDiff::default();
        if self.needs_full_clear {
            self.surface.clear_all()?;
        }

        let mut stale: Vec<u16> = self
            .cache
            .keys()
            .filter(|row| !frame.contains_key(row))
            .copied()
            .collect();
        stale.sort_unstable();
        for row in stale {
            self.surface.clear_row(row)?;
            self.cache.remove(&row);
            diff.cleared += 1;
        }

        let mut rows: Vec<(u16, RenderedRow)> = frame.into_iter().collect();
        rows.sort_unstable_by_key(|(row, _)| *row);
        for (row, content) in rows {
            if self.cache.get(&row) == Some(&content) {
                continue;
            }
            self.surface.draw_row(row, &content)?;
            self.cache.insert(row, content);
            diff.drawn += 1;
        }

        if self.needs_full_clear || !diff.is_empty() {
            self.surface.flush()?;
        }
        self.needs_full_clear = false;
        Ok(diff)
    }
}

// ── Cadence ───────────────────────────────────────────────────────────────────

/// Adaptive frame interval: fast while things change, doubling up to `max`
/// while the screen is idle.
#[derive(Debug, Clone)]
pub struct Cadence {
    fast: Duration,
    max: Duration,
    current: Duration,
}

impl Cadence {
    pub fn new(fast: Duration, max: Duration) -> Self {
        Self {
            fast,
            max,
            current: fast,
        }
    }

    #[cfg(test)]
    fn current(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.fast;
    }

    /// Interval to sleep after a frame with `diff`.  A visible toast keeps
    /// the fast rate so its expiry is drawn promptly.
    pub fn after_frame(&mut self, diff: FrameDiff, toast_visible: bool) -> Duration {
        if !diff.is_empty() || toast_visible {
            self.current = self.fast;
        } else {
            self.current = (self.current * 2).min(self.max);
        }
        self.current
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests;
