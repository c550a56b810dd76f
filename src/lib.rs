//! Crank/cam trigger decoding, adaptive timer resolution and limp-mode
//! supervision for an EFI controller.
//!
//! The library target builds and tests on the host: none of the decoder,
//! timer controller or safety supervisor logic touches hardware directly,
//! they talk only to the capability traits in [`hal`]. The `stm32` feature
//! additionally compiles [`hal_stm32`], one concrete realization of those
//! traits, and the `ecu-firmware` binary that wires it all up through RTIC.

#![no_std]

pub mod decoder;
pub mod engine;
pub mod error;
pub mod hal;
pub mod safety;
pub mod timer;

#[cfg(feature = "stm32")]
pub mod hal_stm32;
