use anyhow::{Context, Result};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::IsTerminal;
use tracing::warn;

/// Holds the local terminal in raw mode so keystrokes reach the remote TTY
/// unprocessed. Raw mode is left again on drop.
pub struct RawModeGuard {
    engaged: bool,
}

impl RawModeGuard {
    pub fn engage() -> Result<Self> {
        if !std::io::stdin().is_terminal() {
            return Ok(Self { engaged: false });
        }

        enable_raw_mode().context("failed to enable raw mode")?;
        Ok(Self { engaged: true })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.engaged
            && let Err(error) = disable_raw_mode()
        {
            warn!(%error, "failed to restore terminal mode");
        }
    }
}

pub fn size() -> Option<(u16, u16)> {
    if !std::io::stdout().is_terminal() {
        return None;
    }
    crossterm::terminal::size().ok()
}
