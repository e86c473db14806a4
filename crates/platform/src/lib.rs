//! Hardware abstraction layer for the HP-DAC USB audio converter.
//!
//! The firmware runs on a PSoC 5LP class part where every data path is a
//! chain of DMA transfer descriptors (TDs) between SRAM and peripheral
//! FIFOs. This crate owns the traits at that seam so the streaming and
//! serial state machines above it can be driven by real registers on the
//! target and by a simulated SoC on the host.
//!
//! # Architecture Layers
//!
//! ```text
//! Application Layer (firmware crate: boot, main loop, interrupt dispatch)
//!         ↓
//! Feature Layers (audio-out, comm)
//!         ↓
//! Platform HAL (this crate - DMA / memory / spy traits, ring math, faults)
//!         ↓
//! Hardware Layer (PSoC DMAC + UDB components, or `sim` on the host)
//! ```
//!
//! # Modules
//!
//! - [`dma`] - transfer descriptors, channels and the controller trait
//! - [`memory`] - DMA-visible SRAM regions and byte-level access
//! - [`spy`] - the receive-boundary detector beside the UART
//! - [`ring`] - monotonic ring cursor arithmetic shared by every ring buffer
//! - [`fault`] - fault kinds and interrupt-safe fault counters
//! - [`design`] - channel and FIFO assignment of a concrete hardware design
//! - [`config`] - buffer sizes and timing constants
//!
//! # Features
//!
//! - `std`: Enable the simulated SoC ([`sim`]) for tests and the emulator
//! - `defmt`: Enable defmt logging derives

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
// Pedantic lints suppressed for this hardware HAL crate:
#![allow(clippy::doc_markdown)] // hex addresses and register names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors, callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

#[cfg(all(feature = "std", not(test)))]
extern crate std;

pub mod config;
pub mod design;
pub mod dma;
pub mod fault;
pub mod memory;
pub mod ring;
pub mod spy;

#[cfg(any(test, feature = "std"))]
pub mod sim;

pub use design::Design;
pub use dma::{ChannelId, ChannelStatus, Descriptor, DmaController, DmaError, TdFlags, TdHandle};
pub use fault::{FaultCounters, FaultKind, FaultSnapshot};
pub use memory::{Memory, Region};
pub use ring::RingCursor;
pub use spy::{SpyPeripheral, SpyStatus};

/// Everything the streaming and serial state machines touch on the SoC.
///
/// Implemented automatically for any type that provides all three
/// capabilities, so the simulator and a register-level backend both qualify
/// without extra glue.
pub trait Bus: DmaController + Memory + SpyPeripheral {}

impl<T: DmaController + Memory + SpyPeripheral + ?Sized> Bus for T {}
