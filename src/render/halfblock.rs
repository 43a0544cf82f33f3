use crate::render::{draw_overlay_popup, Frame, Presenter};
use std::io::Write;

const HALF_BLOCK: char = '\u{2580}';

/// Truecolor `▀` cells: foreground is the upper pixel, background the lower one.
#[derive(Debug, Default)]
pub struct HalfBlockPresenter {
    last_fg: Option<[u8; 3]>,
    last_bg: Option<[u8; 3]>,
}

impl HalfBlockPresenter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Presenter for HalfBlockPresenter {
    fn name(&self) -> &'static str {
        "halfblock"
    }

    fn cell_pixels(&self) -> (usize, usize) {
        (1, 2)
    }

    fn present(&mut self, frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<()> {
        let cols = frame.term_cols as usize;
        let visual_rows = frame.visual_rows as usize;
        let surface = frame.surface;
        if cols == 0 || visual_rows == 0 || surface.is_empty() {
            return Ok(());
        }
        if surface.width() != cols || surface.height() != visual_rows * 2 {
            tracing::debug!(
                cols,
                visual_rows,
                width = surface.width(),
                height = surface.height(),
                "surface does not match terminal grid; skipping frame"
            );
            return Ok(());
        }

        if frame.sync_updates {
            out.write_all(b"\x1b[?2026h")?;
        }
        // Home, reset, and no autowrap while full-width rows are painted.
        out.write_all(b"\x1b[H\x1b[0m\x1b[?7l")?;
        self.last_fg = None;
        self.last_bg = None;

        let px = surface.pixels();
        let row_bytes = cols * 4;
        for row in 0..visual_rows {
            let top = &px[row * 2 * row_bytes..(row * 2 + 1) * row_bytes];
            let bot = &px[(row * 2 + 1) * row_bytes..(row * 2 + 2) * row_bytes];
            for (t, b) in top.chunks_exact(4).zip(bot.chunks_exact(4)) {
                let fg = [t[0], t[1], t[2]];
                let bg = [b[0], b[1], b[2]];
                if self.last_fg != Some(fg) {
                    write!(out, "\x1b[38;2;{};{};{}m", fg[0], fg[1], fg[2])?;
                    self.last_fg = Some(fg);
                }
                if self.last_bg != Some(bg) {
                    write!(out, "\x1b[48;2;{};{};{}m", bg[0], bg[1], bg[2])?;
                    self.last_bg = Some(bg);
                }
                write!(out, "{HALF_BLOCK}")?;
            }
            out.write_all(b"\r\n")?;
        }

        let mut hud_lines = frame.hud.lines();
        for i in 0..frame.hud_rows as usize {
            write!(out, "\x1b[{};1H\x1b[0m\x1b[2K", visual_rows + i + 1)?;
            if let Some(line) = hud_lines.next() {
                let clipped: String = line.chars().take(cols).collect();
                out.write_all(clipped.as_bytes())?;
            }
        }

        if let Some(text) = frame.overlay {
            draw_overlay_popup(out, frame.term_cols, frame.term_rows, text)?;
        }

        out.write_all(b"\x1b[?7h")?;
        if frame.sync_updates {
            out.write_all(b"\x1b[?2026l")?;
        }
        out.flush()?;
        Ok(())
    }
}
