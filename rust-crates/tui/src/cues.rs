use std::io::{
    self,
    Write,
};
use tracing::warn;

use crate::session::DropResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cue {
    Drop,
    Win,
    Lose,
}

impl Cue {
    pub fn for_result(result: &DropResult) -> Self {
        if result.payout.is_zero() {
            Cue::Lose
        } else {
            Cue::Win
        }
    }
}

pub trait CueSink {
    fn play(&mut self, cue: Cue) -> io::Result<()>;
}

/// Rings the terminal bell: once for a drop or loss, twice for a win.
pub struct TerminalBell<W: Write> {
    out: W,
}

impl<W: Write> TerminalBell<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> CueSink for TerminalBell<W> {
    fn play(&mut self, cue: Cue) -> io::Result<()> {
        let rings: &[u8] = match cue {
            Cue::Win => b"\x07\x07",
            Cue::Drop | Cue::Lose => b"\x07",
        };
        self.out.write_all(rings)?;
        self.out.flush()
    }
}

pub struct Cues<S> {
    sink: S,
    muted: bool,
}

impl<S: CueSink> Cues<S> {
    pub fn new(sink: S, muted: bool) -> Self {
        Self { sink, muted }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Returns the new muted state.
    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        self.muted
    }

    pub fn play(&mut self, cue: Cue) {
        if self.muted {
            return;
        }
        if let Err(err) = self.sink.play(cue) {
            warn!(%err, ?cue, "failed to play cue");
        }
    }
}
