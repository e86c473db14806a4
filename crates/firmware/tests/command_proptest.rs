//! Property-based tests for the command interpreter.
//! Whatever the host sends, every non-blank line gets exactly one reply,
//! in order, and the firmware never stops answering.

#![allow(clippy::unwrap_used)]
#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::panic)]

mod common;

use common::Bench;
use firmware::command::Command;
use firmware::Shared;
use proptest::prelude::*;

fn word() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("PING".to_string()),
        Just("STATUS".to_string()),
        Just("STATS".to_string()),
        Just("CLEAR".to_string()),
        "[A-Z ]{1,12}",
    ]
}

fn expected_prefix(line: &str) -> &'static str {
    match Command::parse(line.as_bytes()) {
        Some(Command::Ping | Command::Clear) => "OK",
        Some(Command::Status) => "STATUS ",
        Some(Command::Stats) => "STATS ",
        Some(Command::Faults) => "FAULT ",
        Some(Command::Unknown) => "ERR",
        None => unreachable!("generated lines are never blank"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_line_gets_one_reply_in_order(words in prop::collection::vec(word(), 1..=8)) {
        let shared = Shared::new();
        let mut bench = Bench::new(&shared);
        let burst: String = words.iter().map(|w| format!("{w}\n")).collect();
        bench.host_send(burst.as_bytes());
        let report = bench.step();
        prop_assert_eq!(usize::from(report.commands), words.len());

        let lines = bench.lines();
        prop_assert_eq!(lines.len(), words.len());
        for (word, line) in words.iter().zip(&lines) {
            prop_assert!(line.starts_with(expected_prefix(word)), "{} -> {}", word, line);
        }
        // Still answering afterwards.
        prop_assert_eq!(bench.command("PING"), ["OK"]);
    }

    #[test]
    fn arbitrary_bytes_never_wedge_the_channel(
        noise in prop::collection::vec(any::<u8>(), 0..200),
    ) {
        let shared = Shared::new();
        let mut bench = Bench::new(&shared);
        bench.host_send(&noise);
        bench.idle();
        bench.step();
        bench.drain_wire();
        bench.step();
        bench.drain_wire();
        // A fresh line after a delimiter is always understood. Leftover
        // noise may still add a reply or a fault report around it.
        let lines = bench.command("\nPING");
        let last_reply = lines.iter().rev().find(|l| !l.starts_with("FAULT "));
        prop_assert_eq!(last_reply.map(String::as_str), Some("OK"));
    }
}
