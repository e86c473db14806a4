//! Host command interpreter.
//!
//! Each frame the host sends is one command word, optionally followed by a
//! carriage return. Every command gets exactly one reply frame.
//!
//! | Command  | Reply                                                    |
//! |----------|----------------------------------------------------------|
//! | `PING`   | `OK`                                                     |
//! | `STATUS` | `STATUS <idle\|streaming> <occupancy> <multiplier>`      |
//! | `STATS`  | `STATS <frames> <sent> <received> <boundaries> <blocks>` |
//! | `FAULTS` | the fault report, see [`crate::telemetry::fault_report`] |
//! | `CLEAR`  | `OK`, after resetting every fault counter                |
//! | other    | `ERR`                                                    |

use core::fmt::Write;

use audio_out::{Multiplier, StreamState};
use comm::CommStats;
use heapless::String;
use platform::FaultSnapshot;

use crate::telemetry::{self, REPORT_LEN};

/// Longest command word accepted, in bytes.
pub const COMMAND_MAX: usize = 32;

/// Longest reply.
pub const REPLY_LEN: usize = REPORT_LEN;

/// One reply frame, without its delimiter.
pub type Reply = String<REPLY_LEN>;

/// A parsed host command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Liveness check.
    Ping,
    /// Stream state and buffer level.
    Status,
    /// Serial and pipeline counters.
    Stats,
    /// Fault counters.
    Faults,
    /// Reset fault counters.
    Clear,
    /// Anything else.
    Unknown,
}

impl Command {
    /// Parse one frame, delimiter already stripped.
    ///
    /// Blank frames, such as the gap in a CR LF pair, are not commands.
    pub fn parse(frame: &[u8]) -> Option<Self> {
        let word = frame.strip_suffix(b"\r").unwrap_or(frame);
        let command = match word {
            b"" => return None,
            b"PING" => Command::Ping,
            b"STATUS" => Command::Status,
            b"STATS" => Command::Stats,
            b"FAULTS" => Command::Faults,
            b"CLEAR" => Command::Clear,
            _ => Command::Unknown,
        };
        Some(command)
    }
}

/// Everything a reply may report, sampled once per main-loop pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Stream state.
    pub state: StreamState,
    /// Bytes landed in the ring but not yet played.
    pub occupancy: u32,
    /// Current gain.
    pub multiplier: Multiplier,
    /// Serial channel totals.
    pub comm: CommStats,
    /// Blocks the pipeline has processed.
    pub blocks: u32,
    /// Faults from both subsystems.
    pub faults: FaultSnapshot,
}

/// Build the reply to `command`.
///
/// Side effects such as [`Command::Clear`] are the caller's; `status`
/// should already reflect them.
pub fn respond(command: Command, status: &Status) -> Reply {
    let mut out = Reply::new();
    // Every reply is shorter than REPLY_LEN, so writes cannot fail.
    match command {
        Command::Ping | Command::Clear => {
            let _ = out.push_str("OK");
        }
        Command::Status => {
            let _ = write!(
                out,
                "STATUS {} {} {}",
                state_name(status.state),
                status.occupancy,
                status.multiplier.raw()
            );
        }
        Command::Stats => {
            let c = &status.comm;
            let _ = write!(
                out,
                "STATS {} {} {} {} {}",
                c.frames_queued, c.bytes_sent, c.bytes_received, c.boundaries, status.blocks
            );
        }
        Command::Faults => {
            let _ = out.push_str(&telemetry::fault_report(&status.faults));
        }
        Command::Unknown => {
            let _ = out.push_str("ERR");
        }
    }
    out
}

fn state_name(state: StreamState) -> &'static str {
    match state {
        StreamState::Idle => "idle",
        StreamState::Streaming => "streaming",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn status() -> Status {
        Status {
            state: StreamState::Streaming,
            occupancy: 864,
            multiplier: Multiplier::UNITY,
            comm: CommStats::default(),
            blocks: 3,
            faults: FaultSnapshot::default(),
        }
    }

    #[test]
    fn parses_known_words() {
        assert_eq!(Command::parse(b"PING"), Some(Command::Ping));
        assert_eq!(Command::parse(b"STATUS\r"), Some(Command::Status));
        assert_eq!(Command::parse(b"CLEAR"), Some(Command::Clear));
        assert_eq!(Command::parse(b"ping"), Some(Command::Unknown));
        assert_eq!(Command::parse(b"PING PONG"), Some(Command::Unknown));
    }

    #[test]
    fn blank_frames_are_skipped() {
        assert_eq!(Command::parse(b""), None);
        assert_eq!(Command::parse(b"\r"), None);
    }

    #[test]
    fn status_reply_names_state_and_level() {
        assert_eq!(respond(Command::Status, &status()).as_str(), "STATUS streaming 864 16384");
    }

    #[test]
    fn stats_reply_lists_counters() {
        let mut s = status();
        s.comm.frames_queued = 2;
        s.comm.bytes_received = 12;
        assert_eq!(respond(Command::Stats, &s).as_str(), "STATS 2 0 12 0 3");
    }

    #[test]
    fn unknown_command_is_err() {
        assert_eq!(respond(Command::Unknown, &status()).as_str(), "ERR");
        assert_eq!(respond(Command::Ping, &status()).as_str(), "OK");
    }
}
