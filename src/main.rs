#![no_main]
#![no_std]

use defmt_rtt as _;
use panic_probe as _;

use ecu_core::engine::{Engine, EngineLimits};
use ecu_core::hal::{GpioEdgeInput, HardwareCapabilities, MonotonicClock};
use ecu_core::hal_stm32::{Stm32EdgeInput, Stm32MonotonicClock};

/// The one statically-allocated composition root (§2.5). Every task below is
/// handed `&'static ENGINE`; nothing reaches this by any other path.
static ENGINE: Engine = Engine::new(6_500, 7_500, 1_150, 90, 160);

#[rtic::app(device = hal::pac, peripherals = true, dispatchers = [EXTI9_5])]
mod app {
    use super::*;
    use cortex_m::asm;
    use hal::{
        clocks::Clocks,
        gpio::{Pin, PinMode, Port},
        pac,
        timer::{Timer, TimerConfig, TimerInterrupt},
    };

    #[shared]
    struct Shared {
        /// Free-running monotonic µs clock. Shared (not per-ISR local) since
        /// both the CKP and CMP edge tasks read it independently.
        clock_timer: Stm32MonotonicClock<pac::TIM5>,
    }

    #[local]
    struct Local {
        ckp_pin: Stm32EdgeInput,
        cmp_pin: Stm32EdgeInput,
        control_timer: Timer<pac::TIM15>,
    }

    #[init]
    fn init(cx: init::Context) -> (Shared, Local, init::Monotonics) {
        let dp = cx.device;

        let clock_cfg = Clocks::default();
        clock_cfg.setup().expect("clock config failed");

        let mut ckp_pin = Stm32EdgeInput::new(
            Pin::new(Port::A, 0, PinMode::Input),
            pac::Interrupt::EXTI0,
        );
        ckp_pin.enable_rising_edge_interrupt();

        let mut cmp_pin = Stm32EdgeInput::new(
            Pin::new(Port::A, 1, PinMode::Input),
            pac::Interrupt::EXTI1,
        );
        cmp_pin.enable_rising_edge_interrupt();

        let mut clock_raw = Timer::new_tim5(dp.TIM5, 1_000_000., TimerConfig::default(), &clock_cfg);
        clock_raw.enable();
        let clock_timer = Stm32MonotonicClock::new(clock_raw);

        let mut control_timer = Timer::new_tim15(dp.TIM15, 100., TimerConfig::default(), &clock_cfg);
        control_timer.enable_interrupt(TimerInterrupt::Update);
        control_timer.enable();

        let caps = HardwareCapabilities {
            event_task_matrix: false,
            hardware_capture: true,
        };
        let limits = EngineLimits::default();
        ENGINE
            .init(caps, "ecu_main", &limits, 0)
            .expect("engine init failed");

        defmt::info!("ecu-core firmware initialised");

        (
            Shared { clock_timer },
            Local {
                ckp_pin,
                cmp_pin,
                control_timer,
            },
            init::Monotonics(),
        )
    }

    #[idle]
    fn idle(_cx: idle::Context) -> ! {
        loop {
            asm::wfi();
        }
    }

    /// CKP rising edge. Software-timestamp capture path: reads the monotonic
    /// clock directly and hands the truncated `u32` microsecond value to the
    /// decoder (DESIGN.md, Q1 — the 64→32 bit truncation happens exactly here).
    #[task(binds = EXTI0, shared = [clock_timer], local = [ckp_pin], priority = 8)]
    fn ckp_isr(mut cx: ckp_isr::Context) {
        cx.local.ckp_pin.clear_interrupt_pending_bit();
        let t_us = cx.shared.clock_timer.lock(|clock| (clock.now_us() & 0xFFFF_FFFF) as u32);
        ENGINE.on_ckp_edge(t_us);
    }

    /// CMP rising edge, same capture path as CKP.
    #[task(binds = EXTI1, shared = [clock_timer], local = [cmp_pin], priority = 8)]
    fn cmp_isr(mut cx: cmp_isr::Context) {
        cx.local.cmp_pin.clear_interrupt_pending_bit();
        let t_us = cx.shared.clock_timer.lock(|clock| (clock.now_us() & 0xFFFF_FFFF) as u32);
        ENGINE.on_cmp_edge(t_us);
    }

    /// Periodic low-priority control task: runs the safety supervisor and
    /// feeds the watchdog. Never touches the decoder's ISR spinlock for
    /// longer than one `get_data` call.
    #[task(binds = TIM1_BRK_TIM15, shared = [clock_timer], local = [control_timer], priority = 1)]
    fn control_isr(mut cx: control_isr::Context) {
        cx.local.control_timer.clear_interrupt(TimerInterrupt::Update);
        let now_us = cx.shared.clock_timer.lock(|clock| (clock.now_us() & 0xFFFF_FFFF) as u32);
        let now_ms = now_us / 1_000;

        // Placeholder sensor inputs: on real hardware these come from ADC DMA
        // results published elsewhere; wiring that up is out of scope here
        // (§1 non-goals — no fuel/spark map computation, no persisted config).
        let clt_ddegc = 900;
        let vbat_dv = 125;
        let knock_detected = false;

        // Runtime errors here are silently recovered (§7): a control tick
        // simply skips this cycle's checks and retries on the next one.
        let _ = ENGINE.run_safety_checks(now_us, now_ms, clt_ddegc, vbat_dv, knock_detected);
        ENGINE.watchdog.feed(now_ms);
    }
}
