//! Composition root: the one statically-allocated object owning the decoder,
//! timer controller, safety supervisor and watchdog for the lifetime of the
//! MCU runtime (base spec §2.5 / Design Note 1).
//!
//! An interrupt handler is handed a `'static` reference to an `Engine`; nothing
//! is reached through an ambient module-scope global.

use crate::decoder::{SyncConfig, SyncState, TriggerDecoder};
use crate::error::EcuResult;
use crate::hal::{CapturePath, HardwareCapabilities};
use crate::safety::{SafetySupervisor, Watchdog};
use crate::timer::AdaptiveTimerController;

/// Tunables the composition root needs at construction time that aren't part
/// of `SyncConfig` (which lives on the decoder and can change post-init).
pub struct EngineLimits {
    pub rpm_cutoff: u32,
    pub rpm_absolute_max: u32,
    pub overheat_threshold_ddegc: i32,
    pub vbat_min_dv: i32,
    pub vbat_max_dv: i32,
    pub watchdog_timeout_ms: u32,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            rpm_cutoff: 6_500,
            rpm_absolute_max: 7_500,
            overheat_threshold_ddegc: 1_150,
            vbat_min_dv: 90,
            vbat_max_dv: 160,
            watchdog_timeout_ms: 100,
        }
    }
}

/// Owns every core subsystem. Statically allocated (`Engine::new` is `const
/// fn`), `init`ialised once at startup with the hardware capabilities this
/// particular board reports.
pub struct Engine {
    pub decoder: TriggerDecoder,
    pub timer: AdaptiveTimerController,
    pub safety: SafetySupervisor,
    pub watchdog: Watchdog,
}

impl Engine {
    pub const fn new(limits_rpm_cutoff: u32, limits_rpm_absolute_max: u32, overheat_ddegc: i32, vbat_min_dv: i32, vbat_max_dv: i32) -> Self {
        Self {
            decoder: TriggerDecoder::new(),
            timer: AdaptiveTimerController::new(),
            safety: SafetySupervisor::new(
                limits_rpm_cutoff,
                limits_rpm_absolute_max,
                overheat_ddegc,
                vbat_min_dv,
                vbat_max_dv,
            ),
            watchdog: Watchdog::new(),
        }
    }

    /// Bring every subsystem up. `caps` decides the capture path; if no
    /// capture timer is available the timer controller is forced into its
    /// safe tier per §4.2's hardware-unavailable fallback.
    pub fn init(&self, caps: HardwareCapabilities, watchdog_user: &str, limits: &EngineLimits, now_ms: u32) -> EcuResult<CapturePath> {
        self.decoder.init()?;
        self.decoder.start()?;

        if !caps.hardware_capture {
            self.timer.fallback_to_safe_tier();
        }

        self.watchdog.init(watchdog_user, limits.watchdog_timeout_ms, now_ms)?;

        Ok(CapturePath::select(caps))
    }

    /// Called from the CKP ISR with an already-resolved `u32` microsecond
    /// timestamp (the HAL/ISR shell does the 64-bit-clock truncation per
    /// DESIGN.md Q1, not this function).
    pub fn on_ckp_edge(&self, t_us: u32) {
        self.decoder.on_ckp_edge(t_us);
        // Runtime errors on the capture path are silently recovered (§7):
        // a get_data error here means the decoder isn't initialised yet,
        // which can't happen once the ISR is live, but the ISR must never
        // panic on it either way.
        if let Ok(snapshot) = self.decoder.get_data(t_us) {
            self.timer.update_tier(snapshot.rpm);
        }
    }

    pub fn on_cmp_edge(&self, t_us: u32) {
        self.decoder.on_cmp_edge(t_us);
    }

    /// Run safety checks against the latest decoder snapshot and current
    /// sensor readings; called from a lower-priority control task, not an ISR.
    pub fn run_safety_checks(
        &self,
        now_us: u32,
        now_ms: u32,
        clt_ddegc: i32,
        vbat_dv: i32,
        knock_detected: bool,
    ) -> EcuResult<SyncState> {
        let snapshot = self.decoder.get_data(now_us)?;
        self.safety.check_over_rev(snapshot.rpm, now_ms);
        self.safety.check_overheat(clt_ddegc, now_ms);
        self.safety.check_battery_voltage(vbat_dv, now_ms);
        self.safety.handle_knock(knock_detected, now_ms);
        self.safety.deactivate_limp_mode(now_ms);
        Ok(snapshot)
    }

    pub fn set_sync_config(&self, cfg: SyncConfig) -> EcuResult<()> {
        self.decoder.set_config(cfg)
    }
}
