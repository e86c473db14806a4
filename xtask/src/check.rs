use anyhow::Result;
use colored::Colorize;
use std::time::Instant;

use crate::cargo::{step, Severity};

/// Bare-metal target the no_std crates must build for.
const TARGET: &str = "thumbv7m-none-eabi";

pub fn run() -> Result<()> {
    println!();
    println!("{}", "🔍 Checking builds...".cyan().bold());
    println!();

    let total_start = Instant::now();

    // The library crates are no_std and must build without the simulator.
    for package in ["platform", "comm", "audio-out", "firmware"] {
        step(
            &format!("Checking {package} ({TARGET})"),
            &["check", "-p", package, "--target", TARGET],
            Severity::Fatal,
        )?;
    }

    step(
        "Checking emulator (host)",
        &["check", "-p", "firmware", "--features", "emulator", "--examples"],
        Severity::Fatal,
    )?;

    step(
        "Running clippy",
        &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
        Severity::Advisory,
    )?;

    let fmt = step("Checking formatting", &["fmt", "--all", "--check"], Severity::Advisory)?;
    if !fmt.status.success() {
        eprintln!("     Run 'cargo fmt --all' to fix");
        println!();
    }

    println!(
        "{}",
        format!("✓ All checks completed in {:.2}s", total_start.elapsed().as_secs_f64())
            .green()
            .bold()
    );
    println!();

    Ok(())
}
