//! Adaptive timer-resolution controller.
//!
//! Maps rpm to one of four discrete timer tick resolutions, hysteresis-gated so
//! a noisy rpm signal near a boundary doesn't thrash the downstream scheduler's
//! timer reprogramming.

use core::cell::RefCell;

use critical_section::Mutex;

/// One resolution tier: the rpm ceiling it covers, and the tick rate it selects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub struct TimerTier {
    pub rpm_upper_bound: u32,
    pub resolution_hz: u32,
}

/// Tier 3's upper bound is nominally infinite; represented as `u32::MAX`.
pub const TIMER_TIERS: [TimerTier; 4] = [
    TimerTier { rpm_upper_bound: 1_000, resolution_hz: 10_000_000 },
    TimerTier { rpm_upper_bound: 2_500, resolution_hz: 5_000_000 },
    TimerTier { rpm_upper_bound: 4_500, resolution_hz: 2_000_000 },
    TimerTier { rpm_upper_bound: u32::MAX, resolution_hz: 1_000_000 },
];

pub const TIMER_HYSTERESIS_RPM: u32 = 100;

/// Weight used by the exponentially-weighted average resolution tracker.
const EWMA_ALPHA_NUM: u64 = 1;
const EWMA_ALPHA_DEN: u64 = 10;

/// Accumulated statistics about tier transitions and sample validation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, defmt::Format)]
pub struct TierStats {
    pub transition_count: u32,
    /// EWMA of accepted resolution_hz, scaled by `EWMA_ALPHA_DEN` to stay integer.
    pub avg_resolution_hz_scaled: u64,
    pub max_precision_gain_milli: u32,
    pub validation_failures: u32,
    pub validation_samples: u32,
}

/// Controller state: current tier, last observed rpm, accumulated stats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub struct TimerState {
    pub current_tier: u8,
    pub current_resolution_hz: u32,
    pub last_rpm: u32,
    pub enabled: bool,
    pub stats: TierStats,
}

impl Default for TimerState {
    fn default() -> Self {
        Self {
            current_tier: 0,
            current_resolution_hz: TIMER_TIERS[0].resolution_hz,
            last_rpm: 0,
            enabled: true,
            stats: TierStats::default(),
        }
    }
}

/// Adaptive tier selector. Shared between the control task that feeds rpm
/// updates and any telemetry reader, guarded the same way `TriggerDecoder`
/// guards `SyncState`.
pub struct AdaptiveTimerController {
    state: Mutex<RefCell<TimerState>>,
}

impl AdaptiveTimerController {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(TimerState {
                current_tier: 0,
                current_resolution_hz: TIMER_TIERS[0].resolution_hz,
                last_rpm: 0,
                enabled: true,
                stats: TierStats {
                    transition_count: 0,
                    avg_resolution_hz_scaled: 0,
                    max_precision_gain_milli: 0,
                    validation_failures: 0,
                    validation_samples: 0,
                },
            })),
        }
    }

    /// Resolution the given rpm *would* select, independent of hysteresis state.
    pub fn get_resolution(&self, rpm: u32) -> u32 {
        tier_for_rpm(rpm).resolution_hz
    }

    /// Tick width in microseconds (rounded) the given rpm would select.
    pub fn get_precision_us(&self, rpm: u32) -> u32 {
        let hz = self.get_resolution(rpm);
        ((1_000_000u64 + hz as u64 / 2) / hz as u64) as u32
    }

    /// Feed a new rpm reading. Returns whether the tier actually changed.
    ///
    /// Single-step hysteresis only: a tier change moves exactly one tier per
    /// call even if rpm has jumped across more than one boundary, matching
    /// base spec §4.2's literal upshift/downshift rule (re-evaluate on the
    /// next call to climb further).
    pub fn update_tier(&self, rpm: u32) -> bool {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            state.last_rpm = rpm;

            if !state.enabled {
                return false;
            }

            let cur = state.current_tier as usize;
            let mut next: Option<usize> = None;

            if cur < TIMER_TIERS.len() - 1 {
                let upshift_threshold = TIMER_TIERS[cur].rpm_upper_bound as u64 + TIMER_HYSTERESIS_RPM as u64;
                if (rpm as u64) > upshift_threshold {
                    next = Some(cur + 1);
                }
            }
            if next.is_none() && cur > 0 {
                let downshift_threshold = TIMER_TIERS[cur - 1].rpm_upper_bound as i64 - TIMER_HYSTERESIS_RPM as i64;
                if (rpm as i64) < downshift_threshold {
                    next = Some(cur - 1);
                }
            }

            match next {
                Some(next_tier) => {
                    let old_hz = state.current_resolution_hz;
                    let new_hz = TIMER_TIERS[next_tier].resolution_hz;
                    state.current_tier = next_tier as u8;
                    state.current_resolution_hz = new_hz;
                    state.stats.transition_count += 1;

                    let avg = &mut state.stats.avg_resolution_hz_scaled;
                    let scaled_new = new_hz as u64 * EWMA_ALPHA_DEN;
                    *avg = if *avg == 0 {
                        scaled_new
                    } else {
                        (EWMA_ALPHA_NUM * scaled_new + (EWMA_ALPHA_DEN - EWMA_ALPHA_NUM) * *avg) / EWMA_ALPHA_DEN
                    };

                    let gain_milli = if old_hz == 0 {
                        0
                    } else {
                        ((new_hz as u64 * 1000) / old_hz as u64) as u32
                    };
                    if gain_milli > state.stats.max_precision_gain_milli {
                        state.stats.max_precision_gain_milli = gain_milli;
                    }
                    defmt::info!("timer tier changed to {}", next_tier);
                    true
                }
                None => false,
            }
        })
    }

    /// Validate a measured-vs-expected timestamp sample (tolerance 10%).
    /// Failures are recorded but never force a retier.
    pub fn validate_sample(&self, measured_us: u32, expected_us: u32) -> bool {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            state.stats.validation_samples += 1;
            let diff = measured_us.abs_diff(expected_us) as u64;
            let tolerance = (expected_us as u64) / 10;
            let ok = diff <= tolerance;
            if !ok {
                state.stats.validation_failures += 1;
            }
            ok
        })
    }

    pub fn set_enabled(&self, enabled: bool) {
        critical_section::with(|cs| {
            self.state.borrow(cs).borrow_mut().enabled = enabled;
        });
    }

    pub fn get_stats(&self) -> TierStats {
        critical_section::with(|cs| self.state.borrow(cs).borrow().stats)
    }

    pub fn get_state(&self) -> TimerState {
        critical_section::with(|cs| *self.state.borrow(cs).borrow())
    }

    /// HAL reported no usable capture timer at init: force tier 3 and disable
    /// further automatic retiering, per §4.2's hardware-unavailable fallback.
    pub fn fallback_to_safe_tier(&self) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            let safe_tier = TIMER_TIERS.len() - 1;
            state.current_tier = safe_tier as u8;
            state.current_resolution_hz = TIMER_TIERS[safe_tier].resolution_hz;
            state.enabled = false;
        });
        defmt::warn!("no capture timer available, forcing tier 3 and disabling auto-retier");
    }
}

impl Default for AdaptiveTimerController {
    fn default() -> Self {
        Self::new()
    }
}

fn tier_for_rpm(rpm: u32) -> TimerTier {
    for tier in TIMER_TIERS.iter() {
        if rpm <= tier.rpm_upper_bound {
            return *tier;
        }
    }
    TIMER_TIERS[TIMER_TIERS.len() - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_resolution_matches_tier_table() {
        let ctrl = AdaptiveTimerController::new();
        assert_eq!(ctrl.get_resolution(500), 10_000_000);
        assert_eq!(ctrl.get_resolution(1_000), 10_000_000);
        assert_eq!(ctrl.get_resolution(1_001), 5_000_000);
        assert_eq!(ctrl.get_resolution(2_500), 5_000_000);
        assert_eq!(ctrl.get_resolution(2_501), 2_000_000);
        assert_eq!(ctrl.get_resolution(4_500), 2_000_000);
        assert_eq!(ctrl.get_resolution(9_000), 1_000_000);
    }

    #[test]
    fn precision_us_matches_tier_tick_width() {
        let ctrl = AdaptiveTimerController::new();
        assert_eq!(ctrl.get_precision_us(9_000), 1); // tier 3: 1 MHz -> 1 us tick
        assert_eq!(ctrl.get_precision_us(2_501), 1); // tier 2: 2 MHz -> rounds to 1 us
    }

    #[test]
    fn scenario_4_tier_hysteresis_sequence() {
        // Scenario: 2400 -> 2550 -> 2450 -> 2650, thresholds {1000,2500,4500}, H=100.
        // Starting tier must be 1 (we step there first since update_tier only moves
        // one tier per call and starts at tier 0).
        let ctrl = AdaptiveTimerController::new();
        assert!(ctrl.update_tier(1_200)); // 0 -> 1 (1000+100=1100 < 1200)
        assert_eq!(ctrl.get_state().current_tier, 1);
        let stats_after_warmup = ctrl.get_stats().transition_count;

        assert!(!ctrl.update_tier(2_400)); // within tier 1, below upshift threshold 2600
        assert!(!ctrl.update_tier(2_550)); // still below 2600
        assert!(!ctrl.update_tier(2_450)); // still tier 1
        assert!(ctrl.update_tier(2_650)); // crosses 2500+100=2600 -> tier 2

        let stats = ctrl.get_stats();
        assert_eq!(stats.transition_count, stats_after_warmup + 1);
        assert_eq!(ctrl.get_state().current_tier, 2);
    }

    #[test]
    fn p5_hysteresis_band_suppresses_transitions() {
        let ctrl = AdaptiveTimerController::new();
        assert!(ctrl.update_tier(1_200));
        let before = ctrl.get_stats().transition_count;
        for rpm in [1_150, 1_250, 1_300, 1_180] {
            ctrl.update_tier(rpm);
        }
        assert_eq!(ctrl.get_stats().transition_count, before);
    }

    #[test]
    fn downshift_requires_hysteresis_margin() {
        let ctrl = AdaptiveTimerController::new();
        assert!(ctrl.update_tier(1_200)); // tier 1
        assert!(!ctrl.update_tier(950)); // 1000-100=900, 950 not below it
        assert!(ctrl.update_tier(850)); // below 900 -> downshift to tier 0
        assert_eq!(ctrl.get_state().current_tier, 0);
    }

    #[test]
    fn validation_failures_do_not_retier() {
        let ctrl = AdaptiveTimerController::new();
        let before_tier = ctrl.get_state().current_tier;
        assert!(!ctrl.validate_sample(200, 100));
        assert_eq!(ctrl.get_state().current_tier, before_tier);
        assert_eq!(ctrl.get_stats().validation_failures, 1);
        assert!(ctrl.validate_sample(105, 100));
        assert_eq!(ctrl.get_stats().validation_samples, 2);
    }

    #[test]
    fn hardware_unavailable_forces_safe_tier_and_disables() {
        let ctrl = AdaptiveTimerController::new();
        ctrl.fallback_to_safe_tier();
        let state = ctrl.get_state();
        assert_eq!(state.current_tier, 3);
        assert_eq!(state.current_resolution_hz, 1_000_000);
        assert!(!state.enabled);
        assert!(!ctrl.update_tier(100));
    }
}
