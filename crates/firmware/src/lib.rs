//! HP-DAC Firmware
//!
//! USB audio DAC firmware: isochronous USB packets are byte-swapped into an
//! audio ring, scaled by the volume knob and shifted out over I2S, while a
//! delimiter-framed serial channel carries host commands and telemetry.
//!
//! # Architecture
//!
//! ```text
//! Application Layer (app, command, telemetry)
//!         ↓
//! Subsystems (audio-out, comm)
//!         ↓
//! Platform (DMA descriptors, spy, memory map)
//! ```
//!
//! Each subsystem is split into a main-loop half and an interrupt half
//! sharing one `static` state block ([`boot::Shared`]). [`boot::boot`]
//! brings both up and returns [`app::Firmware`] and [`app::Interrupts`].
//!
//! # Features
//!
//! - `std` - Host builds; interrupts convert from the simulated SoC's lines
//! - `emulator` - Desktop emulator on the simulated SoC (tokio, tracing)
//! - `defmt` - Log through defmt on the target
//!
//! # Examples
//!
//! ## Emulator Target
//!
//! ```bash
//! cargo run -p firmware --example emulator --features emulator
//! ```

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::await_holding_lock)]
#![deny(unsafe_op_in_unsafe_fn)]
// Logging discipline
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
#![warn(clippy::dbg_macro)]
// Intentional allows for this codebase:
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::similar_names)]

pub mod app;
pub mod boot;
pub mod command;
pub mod peripherals;
pub mod telemetry;

pub use app::{Firmware, Interrupt, Interrupts, StepReport};
pub use boot::{boot, BootConfig, BootError, Shared, BOOT_SEQUENCE_STEPS};
pub use peripherals::{AltSetting, KnobSample, KnobSampler, UsbAudio};
