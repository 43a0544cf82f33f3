mod halfblock;

pub use halfblock::HalfBlockPresenter;

use crate::surface::Surface;
use std::io::Write;

/// One terminal frame: the engine's output surface plus the text around it.
pub struct Frame<'a> {
    pub term_cols: u16,
    pub term_rows: u16,
    pub visual_rows: u16,
    pub surface: &'a Surface,
    pub hud: &'a str,
    pub hud_rows: u16,
    pub overlay: Option<&'a str>,
    pub sync_updates: bool,
}

/// Turns a [`Frame`] into terminal output.
pub trait Presenter {
    fn name(&self) -> &'static str;
    /// Device pixels per terminal cell, horizontally and vertically.
    fn cell_pixels(&self) -> (usize, usize);
    fn present(&mut self, frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<()>;
}

/// Centered box over a dimmed screen; the first line is drawn as a title.
pub fn draw_overlay_popup(
    out: &mut dyn Write,
    term_cols: u16,
    term_rows: u16,
    text: &str,
) -> anyhow::Result<()> {
    if text.trim().is_empty() {
        return Ok(());
    }
    let cols = term_cols as usize;
    let rows = term_rows as usize;
    if cols < 8 || rows < 4 {
        return Ok(());
    }

    let max_inner = cols.saturating_sub(6).max(1);
    let lines: Vec<String> = text.lines().flat_map(|l| wrap_chars(l, max_inner)).collect();
    let inner = lines
        .iter()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0)
        .clamp(1, max_inner);

    let box_w = (inner + 4).min(cols.saturating_sub(2)).max(4);
    let inner = box_w.saturating_sub(4);
    let body_h = lines.len().min(rows.saturating_sub(3).max(1));
    let box_h = (body_h + 2).min(rows.saturating_sub(1)).max(3);
    let col0 = cols.saturating_sub(box_w) / 2 + 1;
    let row0 = rows.saturating_sub(box_h) / 2 + 1;
    let edge = format!("+{}+", "-".repeat(box_w.saturating_sub(2)));

    out.write_all(b"\x1b[0m\x1b[38;2;220;228;242m\x1b[48;2;2;4;10m")?;
    for row in 1..=rows {
        write!(out, "\x1b[{row};1H\x1b[2K")?;
    }
    out.write_all(b"\x1b[38;2;236;242;255m\x1b[48;2;10;14;24m")?;
    write!(out, "\x1b[{row0};{col0}H{edge}")?;
    for (i, line) in lines.iter().take(body_h).enumerate() {
        let row = row0 + 1 + i;
        write!(out, "\x1b[{row};{col0}H| {:inner$} |", "")?;
        write!(out, "\x1b[{row};{}H", col0 + 2)?;
        if i == 0 {
            write!(out, "\x1b[1m\x1b[38;2;255;236;160m{line}\x1b[22m\x1b[38;2;236;242;255m")?;
        } else {
            write!(out, "{line}")?;
        }
    }
    write!(out, "\x1b[{};{col0}H{edge}", row0 + box_h - 1)?;
    out.write_all(b"\x1b[0m")?;
    Ok(())
}

/// Hard-wraps `line` every `width` chars; an empty line stays one empty line.
pub fn wrap_chars(line: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let chars: Vec<char> = line.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars.chunks(width).map(|c| c.iter().collect()).collect()
}
