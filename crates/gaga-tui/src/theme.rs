//! Color palette and row styles for the dashboard.

use gaga_proto::state::ToastSeverity;
use ratatui::style::{Color, Modifier, Style};

// ── Color palette ─────────────────────────────────────────────────────────────

pub const C_ACCENT: Color = Color::Rgb(255, 95, 95);
pub const C_PLAYING: Color = Color::Rgb(80, 200, 120);
pub const C_CONNECTING: Color = Color::Rgb(255, 184, 80);
pub const C_MUTED: Color = Color::Rgb(72, 72, 88);
pub const C_SECONDARY: Color = Color::Rgb(115, 115, 138);
pub const C_PRIMARY: Color = Color::Rgb(210, 210, 225);
pub const C_SELECTION_BG: Color = Color::Rgb(28, 28, 40);
pub const C_TOAST_INFO: Color = Color::Rgb(80, 160, 220);
pub const C_TOAST_ERROR: Color = Color::Rgb(255, 95, 95);

// ── Predefined styles ─────────────────────────────────────────────────────────

pub fn style_secondary() -> Style {
    Style::default().fg(C_SECONDARY)
}

pub fn style_title() -> Style {
    Style::default().fg(C_ACCENT).add_modifier(Modifier::BOLD)
}

pub fn style_muted() -> Style {
    Style::default().fg(C_MUTED)
}

/// Stream row style: playing rows are green, the selected row is bold on a
/// lifted background.
pub fn style_stream(selected: bool, playing: bool) -> Style {
    let fg = if playing { C_PLAYING } else { C_PRIMARY };
    let style = Style::default().fg(fg);
    if selected {
        style.bg(C_SELECTION_BG).add_modifier(Modifier::BOLD)
    } else {
        style
    }
}

pub fn style_status(playing: bool, alive: bool) -> Style {
    match (playing, alive) {
        (true, true) => Style::default().fg(C_PLAYING),
        (true, false) => Style::default().fg(C_CONNECTING),
        _ => style_secondary(),
    }
}

pub fn style_toast(severity: ToastSeverity) -> Style {
    let color = match severity {
        ToastSeverity::Info => C_TOAST_INFO,
        ToastSeverity::Error => C_TOAST_ERROR,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}
