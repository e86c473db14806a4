use anyhow::{Context, Result};
use colored::Colorize;
use platform::config;
use std::process::Command;

pub fn run(ms: u32, log: &str) -> Result<()> {
    println!();
    println!(
        "{}",
        format!("🎧 {} emulator, {ms} ms of simulated time", config::APP_NAME).cyan().bold()
    );
    println!();

    // Inherit stdio so the emulator's tracing output streams live.
    let status = Command::new("cargo")
        .args(["run", "-p", "firmware", "--example", "emulator", "--features", "emulator", "--"])
        .arg(ms.to_string())
        .env("RUST_LOG", log)
        .status()
        .context("Failed to run the emulator")?;

    if !status.success() {
        anyhow::bail!("Emulator exited with {status}");
    }
    Ok(())
}
