//! One concrete realization of the [`crate::hal`] capability traits, for a
//! single STM32 H7 reference target. Gated behind the `stm32` feature so the
//! library target (decoder/timer/safety logic) builds and tests on the host
//! with no cross toolchain.
//!
//! This module is illustrative, not prescriptive: any board satisfying the
//! trait contracts in `hal.rs` is admissible. It borrows the HAL crate and
//! peripheral-handling style straight from the teacher's `main.rs`.

use cortex_m::peripheral::NVIC;
use hal::{
    gpio::{Edge, Pin},
    pac::{self, Interrupt, IWDG},
    timer::{Timer, TimerConfig, TimerInterrupt},
};

use crate::error::{EcuError, EcuResult};
use crate::hal::{
    CaptureTimer, EventTaskMatrixChannel, GpioEdgeInput, MonotonicClock, PulseCounterChannel,
    WatchdogHandle, WatchdogPeripheral,
};

/// Wraps a free-running general-purpose timer used as the monotonic µs clock.
/// Configured by the firmware's `init` task to count at 1 MHz and never stop.
pub struct Stm32MonotonicClock<TIM> {
    timer: Timer<TIM>,
}

impl<TIM> Stm32MonotonicClock<TIM> {
    pub fn new(timer: Timer<TIM>) -> Self {
        Self { timer }
    }
}

impl<TIM> MonotonicClock for Stm32MonotonicClock<TIM>
where
    Timer<TIM>: TimerReadCount,
{
    fn now_us(&self) -> u64 {
        self.timer.read_count_64()
    }
}

/// Minimal trait closing over whichever 32/64-bit extended-count read the
/// concrete timer type exposes; kept separate from `MonotonicClock` so the
/// host-testable core never needs to know about it.
pub trait TimerReadCount {
    fn read_count_64(&self) -> u64;
}

/// `TIM5` on the reference H7 target is configured (see `init`) as the
/// free-running 1 MHz monotonic clock; its hardware counter is 32 bits wide.
impl TimerReadCount for Timer<pac::TIM5> {
    fn read_count_64(&self) -> u64 {
        self.read_count() as u64
    }
}

/// CKP/CMP edge pin configured as a rising-edge GPIO interrupt source, used
/// on the software-timestamp capture path (§4.1, path 2).
pub struct Stm32EdgeInput {
    pin: Pin,
    interrupt: Interrupt,
}

impl Stm32EdgeInput {
    pub fn new(pin: Pin, interrupt: Interrupt) -> Self {
        Self { pin, interrupt }
    }

    /// Ack the pending EXTI line; must be called at the top of the bound ISR.
    pub fn clear_interrupt_pending_bit(&mut self) {
        self.pin.clear_interrupt_pending_bit();
    }
}

impl GpioEdgeInput for Stm32EdgeInput {
    fn enable_rising_edge_interrupt(&mut self) {
        self.pin.enable_interrupt(Edge::Rising);
    }

    fn disable_interrupt(&mut self) {
        NVIC::mask(self.interrupt);
    }
}

/// A capture-timer channel, latched by the event-task-matrix path (§4.1,
/// path 1) when the chip and routing support it.
pub struct Stm32CaptureTimer<TIM> {
    timer: Timer<TIM>,
    resolution_hz: u32,
}

impl<TIM> Stm32CaptureTimer<TIM> {
    pub fn new(timer: Timer<TIM>, resolution_hz: u32) -> Self {
        Self { timer, resolution_hz }
    }
}

impl<TIM> CaptureTimer for Stm32CaptureTimer<TIM>
where
    Timer<TIM>: TimerReadCount,
{
    fn resolution_hz(&self) -> u32 {
        self.resolution_hz
    }

    fn latched_count(&self) -> u32 {
        self.timer.read_count_64() as u32
    }
}

/// Event-task-matrix binding: on this reference chip family there's no
/// dedicated ETM fabric, so this is always unavailable and the HAL reports
/// `hardware_capture` without `event_task_matrix`, forcing the software
/// timestamp path. Kept as a real (if permanently-disabled) impl so the
/// trait boundary stays honest about what this board can and can't do.
pub struct Stm32EventTaskMatrixChannel;

impl EventTaskMatrixChannel for Stm32EventTaskMatrixChannel {
    fn enable(&mut self) {}
    fn disable(&mut self) {}
}

/// Pulse counter channel. Reference board uses `TIM1` in encoder-adjacent
/// counting mode with a 1250 ns glitch filter, matching §6's reference value.
pub struct Stm32PulseCounter<TIM> {
    timer: Timer<TIM>,
    enabled: bool,
}

impl<TIM> Stm32PulseCounter<TIM> {
    pub fn new(timer: Timer<TIM>) -> Self {
        Self { timer, enabled: false }
    }
}

impl<TIM> PulseCounterChannel for Stm32PulseCounter<TIM> {
    fn enable(&mut self) {
        self.enabled = true;
        self.timer.enable_interrupt(TimerInterrupt::Update);
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn clear(&mut self) {
        self.timer.clear_interrupt(TimerInterrupt::Update);
    }

    fn set_glitch_filter_ns(&mut self, _ns: u32) {
        // Reference chip's counting-timer input filter is configured once at
        // `TimerConfig` construction time; runtime reconfiguration isn't
        // exposed by this HAL version.
    }
}

/// Independent watchdog peripheral (`IWDG`), single-user as the core's
/// interface requires.
pub struct Stm32Watchdog {
    iwdg: IWDG,
    user_taken: bool,
}

impl Stm32Watchdog {
    pub fn new(iwdg: IWDG) -> Self {
        Self { iwdg, user_taken: false }
    }
}

impl WatchdogPeripheral for Stm32Watchdog {
    fn init(&mut self, _timeout_ms: u32) {
        // Reference realization: IWDG prescaler/reload programming is
        // board-specific and omitted here; see the vendor HAL's IWDG driver.
    }

    fn add_user(&mut self, _name: &str) -> EcuResult<WatchdogHandle> {
        if self.user_taken {
            return Err(EcuError::ResourceExhausted);
        }
        self.user_taken = true;
        Ok(WatchdogHandle(0))
    }

    fn reset_user(&mut self, _handle: WatchdogHandle) {
        self.iwdg.kr.write(|w| unsafe { w.bits(0xAAAA) });
    }
}

/// Default timer configuration used for both the monotonic clock and the
/// capture timer on the reference board: free-running, no auto-reload
/// interrupt beyond what each role additionally enables.
pub fn default_timer_config() -> TimerConfig {
    TimerConfig {
        auto_reload_preload: true,
        ..Default::default()
    }
}
