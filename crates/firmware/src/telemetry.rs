//! Frames the firmware sends without being asked.
//!
//! Scalars go out as two little-endian bytes followed by the delimiter.
//! The payload is binary, so a value whose low or high byte equals the
//! delimiter reads as two frames on the host; hosts that chart these
//! values resynchronise on the next frame.

use core::fmt::Write;

use heapless::String;
use platform::{FaultKind, FaultSnapshot};

/// Longest fault report: every counter at its maximum.
pub const REPORT_LEN: usize = 80;

/// Wire form of a 16-bit scalar.
pub fn scalar(value: u16) -> [u8; 2] {
    value.to_le_bytes()
}

/// Wire form of a signed 16-bit scalar.
pub fn signed_scalar(value: i16) -> [u8; 2] {
    value.to_le_bytes()
}

/// `FAULT res=0 full=0 ovr=1 mal=0 ddl=0 udr=0`
pub fn fault_report(faults: &FaultSnapshot) -> String<REPORT_LEN> {
    let mut out = String::new();
    // Capacity covers six five-digit counters, so writes cannot fail.
    let _ = out.push_str("FAULT");
    for kind in FaultKind::ALL {
        let _ = write!(out, " {}={}", kind.tag(), faults.get(kind));
    }
    out
}
