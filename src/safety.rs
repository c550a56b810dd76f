//! Sensor range validation, limp-mode supervision, knock handling and the
//! single-user watchdog.
//!
//! Mirrors the teacher's `safety.rs` in spirit (atomic/critical-section-guarded
//! state, no panics on any reachable path) but implements an entirely different
//! domain state machine: engine limp mode instead of flight arming.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::String;

use crate::error::{EcuError, EcuResult};

/// Limp mode cannot deactivate earlier than this many ms after activation.
pub const LIMP_MIN_DURATION_MS: u32 = 5_000;
/// Conditions must have been continuously safe this long before INACTIVE.
pub const LIMP_RECOVERY_HYSTERESIS_MS: u32 = 2_000;

const KNOCK_RETARD_STEP_TENTHS: u16 = 10;
const KNOCK_RECOVER_STEP_TENTHS: u16 = 5;
const KNOCK_RETARD_MAX_TENTHS: u16 = 100;

/// Result of a single ADC sensor range check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum SensorRangeStatus {
    Ok,
    ShortToGround,
    ShortToSupply,
}

/// `validate(adc, min, max)` from base spec §4.3.
pub fn validate_sensor_range(adc: i32, min: i32, max: i32) -> SensorRangeStatus {
    if adc < min {
        SensorRangeStatus::ShortToGround
    } else if adc > max {
        SensorRangeStatus::ShortToSupply
    } else {
        SensorRangeStatus::Ok
    }
}

/// Deactivation state machine position (base spec §4.3 diagram).
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum LimpPhase {
    Inactive,
    Active,
    Monitoring,
}

/// Limp-mode condition and bookkeeping state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub struct LimpState {
    pub phase: LimpPhase,
    pub active: bool,
    pub activation_time_ms: u32,
    /// Start of the current continuous safe window, or `None` if unsafe right now.
    pub conditions_safe_since_ms: Option<u32>,
    pub knock_retard_tenths_deg: u16,
    pub knock_count: u32,
}

impl Default for LimpState {
    fn default() -> Self {
        Self {
            phase: LimpPhase::Inactive,
            active: false,
            activation_time_ms: 0,
            conditions_safe_since_ms: None,
            knock_retard_tenths_deg: 0,
            knock_count: 0,
        }
    }
}

/// Cause recorded alongside `activate_limp_mode` for logging/telemetry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum LimpCause {
    OverRevCutoff,
    OverRevAbsolute,
    Overheat,
    BatteryOutOfRange,
    Knock,
    External,
}

pub struct SafetySupervisor {
    state: Mutex<RefCell<LimpState>>,
    rpm_cutoff: u32,
    rpm_absolute_max: u32,
    overheat_threshold_ddegc: i32,
    vbat_min_dv: i32,
    vbat_max_dv: i32,
}

impl SafetySupervisor {
    pub const fn new(
        rpm_cutoff: u32,
        rpm_absolute_max: u32,
        overheat_threshold_ddegc: i32,
        vbat_min_dv: i32,
        vbat_max_dv: i32,
    ) -> Self {
        Self {
            state: Mutex::new(RefCell::new(LimpState {
                phase: LimpPhase::Inactive,
                active: false,
                activation_time_ms: 0,
                conditions_safe_since_ms: None,
                knock_retard_tenths_deg: 0,
                knock_count: 0,
            })),
            rpm_cutoff,
            rpm_absolute_max,
            overheat_threshold_ddegc,
            vbat_min_dv,
            vbat_max_dv,
        }
    }

    pub fn get_state(&self) -> LimpState {
        critical_section::with(|cs| *self.state.borrow(cs).borrow())
    }

    pub fn is_limp_mode_active(&self) -> bool {
        self.get_state().active
    }

    /// Force limp mode active. Idempotent: re-activating while already active
    /// does not reset `activation_time_ms`.
    pub fn activate_limp_mode(&self, now_ms: u32, cause: LimpCause) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            if !state.active {
                state.active = true;
                state.phase = LimpPhase::Active;
                state.activation_time_ms = now_ms;
                state.conditions_safe_since_ms = None;
                defmt::warn!("limp mode activated: {}", cause);
            }
        });
    }

    /// Evaluate the ACTIVE -> MONITORING -> INACTIVE transitions. Must be
    /// called by the caller periodically; there is no background timer task.
    pub fn deactivate_limp_mode(&self, now_ms: u32) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            match state.phase {
                LimpPhase::Inactive => {}
                LimpPhase::Active => {
                    if now_ms.wrapping_sub(state.activation_time_ms) >= LIMP_MIN_DURATION_MS {
                        state.phase = LimpPhase::Monitoring;
                        defmt::info!("limp mode entering monitoring window");
                    }
                }
                LimpPhase::Monitoring => {
                    if let Some(since) = state.conditions_safe_since_ms {
                        if now_ms.wrapping_sub(since) >= LIMP_RECOVERY_HYSTERESIS_MS {
                            state.phase = LimpPhase::Inactive;
                            state.active = false;
                            state.conditions_safe_since_ms = None;
                            defmt::info!("limp mode deactivated");
                        }
                    }
                }
            }
        });
    }

    /// Record whether conditions are currently safe. `false` cancels the
    /// monitoring window and falls back to ACTIVE if already MONITORING.
    pub fn mark_conditions_safe(&self, safe: bool, now_ms: u32) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            if safe {
                if state.conditions_safe_since_ms.is_none() {
                    state.conditions_safe_since_ms = Some(now_ms);
                }
            } else {
                state.conditions_safe_since_ms = None;
                if state.phase == LimpPhase::Monitoring {
                    state.phase = LimpPhase::Active;
                    defmt::warn!("limp recovery cancelled, conditions unsafe again");
                }
            }
        });
    }

    /// `rpm >= cutoff` or `rpm > absolute_max` triggers activation.
    pub fn check_over_rev(&self, rpm: u32, now_ms: u32) -> bool {
        if rpm >= self.rpm_cutoff || rpm > self.rpm_absolute_max {
            let cause = if rpm > self.rpm_absolute_max {
                LimpCause::OverRevAbsolute
            } else {
                LimpCause::OverRevCutoff
            };
            self.activate_limp_mode(now_ms, cause);
            true
        } else {
            false
        }
    }

    pub fn check_overheat(&self, temp_ddegc: i32, now_ms: u32) -> bool {
        if temp_ddegc > self.overheat_threshold_ddegc {
            self.activate_limp_mode(now_ms, LimpCause::Overheat);
            true
        } else {
            false
        }
    }

    pub fn check_battery_voltage(&self, vbat_dv: i32, now_ms: u32) -> bool {
        if vbat_dv < self.vbat_min_dv || vbat_dv > self.vbat_max_dv {
            self.activate_limp_mode(now_ms, LimpCause::BatteryOutOfRange);
            true
        } else {
            false
        }
    }

    /// Knock retards timing by `KNOCK_RETARD_STEP_TENTHS` per detected event,
    /// clamped at `KNOCK_RETARD_MAX_TENTHS`, and recovers by
    /// `KNOCK_RECOVER_STEP_TENTHS` per event-free call.
    pub fn handle_knock(&self, detected: bool, now_ms: u32) -> u16 {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            if detected {
                state.knock_count += 1;
                state.knock_retard_tenths_deg = (state.knock_retard_tenths_deg
                    + KNOCK_RETARD_STEP_TENTHS)
                    .min(KNOCK_RETARD_MAX_TENTHS);
                if state.knock_retard_tenths_deg >= KNOCK_RETARD_MAX_TENTHS {
                    defmt::warn!("knock retard saturated at max");
                }
            } else {
                state.knock_retard_tenths_deg =
                    state.knock_retard_tenths_deg.saturating_sub(KNOCK_RECOVER_STEP_TENTHS);
            }
            state.knock_retard_tenths_deg
        });

        if detected {
            self.activate_limp_mode(now_ms, LimpCause::Knock);
        }
        self.get_state().knock_retard_tenths_deg
    }
}

/// Maximum length of a watchdog user's name; bounded so the supervisor never
/// allocates.
pub const WATCHDOG_NAME_CAP: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq, defmt::Format)]
struct WatchdogInner {
    enabled: bool,
    timeout_ms: u32,
    last_feed_time_ms: u32,
    user_name: String<WATCHDOG_NAME_CAP>,
}

impl Default for WatchdogInner {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: 0,
            last_feed_time_ms: 0,
            user_name: String::new(),
        }
    }
}

/// Single-user software watchdog. Only one caller may hold the feed handle, as
/// named in the base spec's interface (`watchdog_init/feed/check`).
pub struct Watchdog {
    inner: Mutex<RefCell<WatchdogInner>>,
}

impl Watchdog {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(WatchdogInner {
                enabled: false,
                timeout_ms: 0,
                last_feed_time_ms: 0,
                user_name: String::new(),
            })),
        }
    }

    pub fn init(&self, name: &str, timeout_ms: u32, now_ms: u32) -> EcuResult<()> {
        let user_name = String::try_from(name).map_err(|_| EcuError::InvalidArg)?;
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow(cs).borrow_mut();
            inner.enabled = true;
            inner.timeout_ms = timeout_ms;
            inner.last_feed_time_ms = now_ms;
            inner.user_name = user_name;
        });
        Ok(())
    }

    pub fn feed(&self, now_ms: u32) {
        critical_section::with(|cs| {
            self.inner.borrow(cs).borrow_mut().last_feed_time_ms = now_ms;
        });
    }

    /// `now - last_feed <= timeout`. A missed feed does not itself reset
    /// anything; it's the caller's job to escalate.
    pub fn check(&self, now_ms: u32) -> bool {
        let (alive, elapsed, timeout_ms) = critical_section::with(|cs| {
            let inner = self.inner.borrow(cs).borrow();
            if !inner.enabled {
                return (true, 0, 0);
            }
            let elapsed = now_ms.wrapping_sub(inner.last_feed_time_ms);
            (elapsed <= inner.timeout_ms, elapsed, inner.timeout_ms)
        });

        if !alive {
            defmt::error!(
                "watchdog timeout: {} ms since last feed (limit {} ms)",
                elapsed,
                timeout_ms
            );
        }

        alive
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor() -> SafetySupervisor {
        SafetySupervisor::new(6_500, 7_500, 1_100, 110, 150)
    }

    #[test]
    fn sensor_range_reports_all_three_states() {
        assert_eq!(validate_sensor_range(50, 100, 900), SensorRangeStatus::ShortToGround);
        assert_eq!(validate_sensor_range(950, 100, 900), SensorRangeStatus::ShortToSupply);
        assert_eq!(validate_sensor_range(500, 100, 900), SensorRangeStatus::Ok);
    }

    #[test]
    fn over_rev_cutoff_and_absolute_both_activate() {
        let sup = supervisor();
        assert!(sup.check_over_rev(6_600, 0));
        assert!(sup.is_limp_mode_active());

        let sup2 = supervisor();
        assert!(sup2.check_over_rev(8_000, 0));
        assert!(sup2.is_limp_mode_active());

        let sup3 = supervisor();
        assert!(!sup3.check_over_rev(6_000, 0));
        assert!(!sup3.is_limp_mode_active());
    }

    #[test]
    fn overheat_and_battery_checks_activate() {
        let sup = supervisor();
        assert!(sup.check_overheat(1_200, 0));
        assert!(sup.is_limp_mode_active());

        let sup2 = supervisor();
        assert!(sup2.check_battery_voltage(100, 0));
        assert!(sup2.is_limp_mode_active());
    }

    #[test]
    fn knock_retards_and_recovers_with_clamp() {
        let sup = supervisor();
        for _ in 0..15 {
            sup.handle_knock(true, 0);
        }
        assert_eq!(sup.get_state().knock_retard_tenths_deg, KNOCK_RETARD_MAX_TENTHS);
        assert_eq!(sup.get_state().knock_count, 15);

        for _ in 0..3 {
            sup.handle_knock(false, 0);
        }
        assert_eq!(
            sup.get_state().knock_retard_tenths_deg,
            KNOCK_RETARD_MAX_TENTHS - 3 * KNOCK_RECOVER_STEP_TENTHS
        );
    }

    #[test]
    fn p6_limp_dwell_blocks_early_deactivation() {
        let sup = supervisor();
        sup.activate_limp_mode(0, LimpCause::External);
        sup.deactivate_limp_mode(4_000);
        assert!(sup.is_limp_mode_active());
        assert_eq!(sup.get_state().phase, LimpPhase::Active);
    }

    #[test]
    fn scenario_5_full_recovery_sequence() {
        let sup = supervisor();
        sup.activate_limp_mode(0, LimpCause::External);

        // t=4s: still active, dwell not yet met.
        sup.deactivate_limp_mode(4_000);
        assert!(sup.is_limp_mode_active());
        assert_eq!(sup.get_state().phase, LimpPhase::Active);

        // t=6s: dwell met (>=5s), mark safe then deactivate -> MONITORING.
        sup.deactivate_limp_mode(6_000);
        assert_eq!(sup.get_state().phase, LimpPhase::Monitoring);
        sup.mark_conditions_safe(true, 6_000);
        sup.deactivate_limp_mode(6_000);
        assert!(sup.is_limp_mode_active());
        assert_eq!(sup.get_state().phase, LimpPhase::Monitoring);

        // t=8.1s: safe window (6s..8.1s = 2.1s) exceeds hysteresis (2s) -> INACTIVE.
        sup.deactivate_limp_mode(8_100);
        assert!(!sup.is_limp_mode_active());
        assert_eq!(sup.get_state().phase, LimpPhase::Inactive);
    }

    #[test]
    fn mark_unsafe_cancels_monitoring_back_to_active() {
        let sup = supervisor();
        sup.activate_limp_mode(0, LimpCause::External);
        sup.deactivate_limp_mode(6_000);
        assert_eq!(sup.get_state().phase, LimpPhase::Monitoring);

        sup.mark_conditions_safe(false, 6_500);
        assert_eq!(sup.get_state().phase, LimpPhase::Active);
        assert!(sup.get_state().conditions_safe_since_ms.is_none());
    }

    #[test]
    fn watchdog_check_respects_timeout_and_feed() {
        let wd = Watchdog::new();
        wd.init("ignition_ctrl", 1_000, 0).unwrap();
        assert!(wd.check(500));
        assert!(wd.check(1_000));
        assert!(!wd.check(1_001));

        wd.feed(1_000);
        assert!(wd.check(1_999));
        assert!(!wd.check(2_001));
    }

    #[test]
    fn watchdog_name_too_long_is_rejected() {
        let wd = Watchdog::new();
        assert_eq!(
            wd.init("this_name_is_way_too_long_for_the_cap", 1_000, 0),
            Err(EcuError::InvalidArg)
        );
    }

    #[test]
    fn watchdog_disabled_reports_ok() {
        let wd = Watchdog::new();
        assert!(wd.check(1_000_000));
    }
}
