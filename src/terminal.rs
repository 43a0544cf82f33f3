use anyhow::Context;
use crossterm::{
    cursor,
    terminal::{self, ClearType},
    ExecutableCommand,
};
use std::io::{stdout, Stdout, Write};

/// Smallest grid the demo will draw into (columns, rows).
pub const MIN_TERMINAL: (u16, u16) = (8, 4);

/// Raw mode plus alternate screen for the lifetime of the value.
pub struct TerminalGuard {
    _private: (),
}

impl TerminalGuard {
    pub fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode().context("enable raw mode")?;
        // Constructed before the remaining setup so a failure below still restores the tty.
        let guard = Self { _private: () };

        let mut out = stdout();
        out.execute(terminal::EnterAlternateScreen)
            .context("enter alternate screen")?;
        out.execute(terminal::Clear(ClearType::All))
            .context("clear screen")?;
        out.execute(cursor::Hide).context("hide cursor")?;
        tracing::debug!("terminal prepared");
        Ok(guard)
    }

    pub fn stdout() -> Stdout {
        stdout()
    }

    /// Current terminal size, rejecting grids too small to hold a frame.
    pub fn size() -> anyhow::Result<(u16, u16)> {
        let (cols, rows) = terminal::size().context("get terminal size")?;
        if cols < MIN_TERMINAL.0 || rows < MIN_TERMINAL.1 {
            anyhow::bail!(
                "terminal too small (need at least {}x{}, got {cols}x{rows})",
                MIN_TERMINAL.0,
                MIN_TERMINAL.1
            );
        }
        Ok((cols, rows))
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut out = stdout();
        // Synchronized output off, autowrap on, colors reset.
        let _ = out.write_all(b"\x1b[?2026l\x1b[?7h\x1b[0m");
        let _ = out.flush();
        let _ = out.execute(cursor::Show);
        let _ = out.execute(terminal::LeaveAlternateScreen);
    }
}
