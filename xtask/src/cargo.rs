//! One cargo invocation per build step, with timing and colored status.

use anyhow::{Context, Result};
use colored::Colorize;
use std::process::{Command, Output};
use std::time::Instant;

/// How a failing step affects the run.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Abort the task.
    Fatal,
    /// Report and carry on.
    Advisory,
}

/// Run `cargo <args>` as step `label`.
///
/// Returns the captured output so callers can summarise it.
pub fn step(label: &str, args: &[&str], severity: Severity) -> Result<Output> {
    println!("{}", format!("  {label}...").cyan());
    let start = Instant::now();

    let output = Command::new("cargo")
        .args(args)
        .output()
        .with_context(|| format!("Failed to run cargo {}", args.join(" ")))?;

    if output.status.success() {
        println!(
            "{}",
            format!("  ✓ {label} passed in {:.2}s", start.elapsed().as_secs_f64()).green()
        );
    } else {
        match severity {
            Severity::Fatal => {
                eprintln!("{}", format!("  ✗ {label} failed").red().bold());
                eprintln!();
                eprintln!("{}", String::from_utf8_lossy(&output.stderr));
                for line in String::from_utf8_lossy(&output.stdout).lines() {
                    eprintln!("  {line}");
                }
                anyhow::bail!("{label} failed");
            }
            Severity::Advisory => {
                eprintln!("{}", format!("  ⚠ {label} reported problems").yellow().bold());
                eprintln!();
                eprintln!("{}", String::from_utf8_lossy(&output.stderr));
            }
        }
    }
    println!();
    Ok(output)
}

/// Pull "5 passed; 0 failed; ..." out of libtest output.
pub fn test_summary(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let (passed, failed) = stdout
        .lines()
        .filter_map(|line| line.split("test result:").nth(1))
        .fold((0u32, 0u32), |(p, f), result| {
            (p.saturating_add(count(result, "passed")), f.saturating_add(count(result, "failed")))
        });
    format!("{passed} passed, {failed} failed")
}

fn count(result: &str, what: &str) -> u32 {
    result
        .split(';')
        .find(|part| part.trim_end().ends_with(what))
        .and_then(|part| part.split_whitespace().rev().nth(1))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}
