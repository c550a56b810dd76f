//! Error taxonomy shared by the decoder, timer controller and safety supervisor.
//!
//! There's deliberately no `SyncLost` variant here: loss of sync is not an error
//! return, it's a state flag (`SyncState::flags.sync_valid`). Runtime faults on the
//! capture path recover silently and are only ever observable through state, never
//! through a returned `Err` or a panic.

#![allow(dead_code)]

/// Error kinds returned by the core's fallible operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum EcuError {
    /// Operation called out of lifecycle order (e.g. `get_data` before `init`).
    InvalidState,
    /// Out-of-range field, or a config that otherwise fails validation.
    InvalidArg,
    /// A required HAL capability (hardware capture, event-task matrix) is absent.
    HardwareUnavailable,
    /// Couldn't create a timer, channel or lock.
    ResourceExhausted,
}

pub type EcuResult<T> = Result<T, EcuError>;
