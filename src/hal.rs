//! Hardware-abstraction capability contract.
//!
//! The core never reaches for a concrete peripheral type. Each capability the
//! hardware layer must provide is one trait here; a concrete realization (see
//! `hal_stm32` behind the `stm32` feature) implements whichever subset of these
//! its chip supports, and `HardwareCapabilities` tells the core which subset that
//! is at runtime. There is no `cfg`-gated decoder logic: the compile-time
//! `SOC_GPTIMER_SUPPORT_ETM`-style toggle the reference firmware used becomes this
//! runtime query, and dead-code elimination takes care of the rest once a concrete
//! HAL is chosen.

use crate::error::EcuResult;

/// Free-running monotonic microsecond clock. Must never decrease.
pub trait MonotonicClock {
    fn now_us(&self) -> u64;
}

/// A pulse-counter channel: counts CKP/CMP edges in hardware, independent of
/// whatever is also latching a capture timer off the same pin.
pub trait PulseCounterChannel {
    fn enable(&mut self);
    fn disable(&mut self);
    fn clear(&mut self);
    /// Reject edges narrower than this many nanoseconds (reference: 1250 ns).
    fn set_glitch_filter_ns(&mut self, ns: u32);
}

/// A general-purpose up-counter whose value can be latched ("captured") by an
/// external event with no CPU involvement.
pub trait CaptureTimer {
    /// Counting frequency of the timer, e.g. >= 1 MHz.
    fn resolution_hz(&self) -> u32;
    /// Most recent latched count.
    fn latched_count(&self) -> u32;
}

/// One binding in the event-task matrix: routes a GPIO rising edge directly to a
/// capture-timer latch task, without an interrupt in the loop.
pub trait EventTaskMatrixChannel {
    fn enable(&mut self);
    fn disable(&mut self);
}

/// A GPIO pin configured as an edge-interrupt input.
pub trait GpioEdgeInput {
    fn enable_rising_edge_interrupt(&mut self);
    fn disable_interrupt(&mut self);
}

/// Opaque handle returned by `WatchdogPeripheral::add_user`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub struct WatchdogHandle(pub u8);

/// Hardware watchdog timer with named per-user feed handles.
pub trait WatchdogPeripheral {
    fn init(&mut self, timeout_ms: u32);
    fn add_user(&mut self, name: &str) -> EcuResult<WatchdogHandle>;
    fn reset_user(&mut self, handle: WatchdogHandle);
}

/// Runtime capability query, replacing what the reference firmware expressed as a
/// compile-time `SOC_GPTIMER_SUPPORT_ETM`-style toggle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, defmt::Format)]
pub struct HardwareCapabilities {
    /// Can a GPIO edge be routed to a timer capture task with no CPU involvement?
    pub event_task_matrix: bool,
    /// Is a capture timer (>= 1 MHz) available at all?
    pub hardware_capture: bool,
}

/// Which path the decoder timestamps CKP/CMP edges on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum CapturePath {
    /// GPIO edge -> event-task matrix -> timer capture; read the latch in the ISR.
    EventTaskMatrix,
    /// No capture hardware (or no ETM routing): the edge ISR reads the monotonic
    /// clock directly.
    SoftwareTimestamp,
}

impl CapturePath {
    /// Select the lowest-jitter path the reported capabilities support.
    pub fn select(caps: HardwareCapabilities) -> Self {
        if caps.event_task_matrix && caps.hardware_capture {
            CapturePath::EventTaskMatrix
        } else {
            CapturePath::SoftwareTimestamp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_capability_selects_event_task_matrix() {
        let caps = HardwareCapabilities {
            event_task_matrix: true,
            hardware_capture: true,
        };
        assert_eq!(CapturePath::select(caps), CapturePath::EventTaskMatrix);
    }

    #[test]
    fn missing_etm_falls_back_to_software_timestamp() {
        let caps = HardwareCapabilities {
            event_task_matrix: false,
            hardware_capture: true,
        };
        assert_eq!(CapturePath::select(caps), CapturePath::SoftwareTimestamp);
    }

    #[test]
    fn missing_capture_timer_falls_back_to_software_timestamp() {
        let caps = HardwareCapabilities {
            event_task_matrix: true,
            hardware_capture: false,
        };
        assert_eq!(CapturePath::select(caps), CapturePath::SoftwareTimestamp);
    }
}
