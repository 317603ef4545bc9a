//! Per-validator gas power.
//!
//! Every validator accrues gas power in two windows at a rate
//! proportional to its weight, measured in median time. Accrual is capped
//! per window, and every event spends its `gas_power_used` from both.

use crate::checkpoint::EpochSummary;
use poset_config::{GasPowerConfig, GasPowerRules};
use poset_types::{
    GasPowerLeft, Timestamp, ValidatorId, ValidatorSet, Weight, GAS_POWER_WINDOWS, HOUR, SECOND,
    SHORT_TERM_GAS,
};

/// Where a validator's previous gas power comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasPowerOrigin {
    /// Left after the self-parent
    SelfParent {
        /// Self-parent's gas power left
        left: GasPowerLeft,
        /// Self-parent's median time
        median_time: Timestamp,
    },
    /// Left after the creator's last confirmed event of the previous epoch
    PrevEpoch {
        /// Its gas power left
        left: GasPowerLeft,
        /// Its median time
        median_time: Timestamp,
    },
    /// Nothing known about the creator
    Fresh {
        /// Start of the current epoch
        epoch_start: Timestamp,
    },
}

impl GasPowerOrigin {
    /// Origin for a creator's first event of an epoch.
    pub fn first_event(prev_epoch: &EpochSummary, creator: ValidatorId) -> Self {
        match prev_epoch.last_header(creator) {
            Some(header) => GasPowerOrigin::PrevEpoch {
                left: header.gas_power_left,
                median_time: header.median_time,
            },
            None => GasPowerOrigin::Fresh {
                epoch_start: prev_epoch.time,
            },
        }
    }
}

/// Allocation parameters of one validator in one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowParams {
    /// Gas accrued per hour
    pub per_hour: u64,
    /// Accrual cap
    pub max_gas_power: u64,
    /// Allocation at the start of an epoch
    pub startup_gas: u64,
}

/// Gas power rules bound to a validator set.
#[derive(Debug, Clone, Copy)]
pub struct GasPowerCalculator<'a> {
    config: &'a GasPowerConfig,
    validators: &'a ValidatorSet,
}

impl<'a> GasPowerCalculator<'a> {
    /// Binds `config` to `validators`.
    pub fn new(config: &'a GasPowerConfig, validators: &'a ValidatorSet) -> Self {
        Self { config, validators }
    }

    /// Parameters of `creator` in window `window`.
    pub fn params(&self, window: usize, creator: ValidatorId) -> WindowParams {
        let rules = self.rules(window);
        let per_hour = mul_div(
            rules.alloc_per_hour,
            self.validators.weight(creator),
            self.validators.total_weight(),
        );
        let max_gas_power = mul_div(per_hour, rules.max_alloc_period_secs * SECOND, HOUR);
        let startup_gas = mul_div(per_hour, rules.startup_alloc_period_secs * SECOND, HOUR)
            .max(rules.min_startup_gas);
        WindowParams {
            per_hour,
            max_gas_power,
            startup_gas,
        }
    }

    /// Gas power available to an event of `creator` with `median_time`,
    /// before its own usage is subtracted.
    pub fn available(
        &self,
        creator: ValidatorId,
        median_time: Timestamp,
        origin: GasPowerOrigin,
    ) -> GasPowerLeft {
        let mut available = GasPowerLeft::default();
        for window in 0..GAS_POWER_WINDOWS {
            let params = self.params(window, creator);
            let (prev_left, prev_time) = match origin {
                GasPowerOrigin::SelfParent { left, median_time } => (left.gas[window], median_time),
                GasPowerOrigin::PrevEpoch { left, median_time } => {
                    (left.gas[window].max(params.startup_gas), median_time)
                }
                GasPowerOrigin::Fresh { epoch_start } => (params.startup_gas, epoch_start),
            };
            let allocated = if median_time > prev_time {
                mul_div(params.per_hour, median_time - prev_time, HOUR)
            } else {
                0
            };
            available.gas[window] = prev_left
                .saturating_add(allocated)
                .min(params.max_gas_power);
        }
        available
    }

    fn rules(&self, window: usize) -> &GasPowerRules {
        match window {
            SHORT_TERM_GAS => &self.config.short,
            _ => &self.config.long,
        }
    }
}

/// `a * b / c` without intermediate overflow, saturating at `u64::MAX`.
fn mul_div(a: u64, b: u64, c: Weight) -> u64 {
    if c == 0 {
        return 0;
    }
    let value = a as u128 * b as u128 / c as u128;
    value.min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use poset_types::Validator;

    fn make_config() -> GasPowerConfig {
        GasPowerConfig {
            short: GasPowerRules {
                alloc_per_hour: 3_600_000,
                max_alloc_period_secs: 60,
                startup_alloc_period_secs: 10,
                min_startup_gas: 100,
            },
            long: GasPowerRules {
                alloc_per_hour: 3_600_000,
                max_alloc_period_secs: 3600,
                startup_alloc_period_secs: 60,
                min_startup_gas: 100,
            },
        }
    }

    #[test]
    fn test_params_proportional_to_weight() {
        let config = make_config();
        let validators =
            ValidatorSet::new(vec![Validator::new(1, 3), Validator::new(2, 1)]).unwrap();
        let calc = GasPowerCalculator::new(&config, &validators);

        let heavy = calc.params(SHORT_TERM_GAS, 1);
        assert_eq!(heavy.per_hour, 2_700_000);
        assert_eq!(heavy.max_gas_power, 45_000);
        assert_eq!(heavy.startup_gas, 7_500);

        let light = calc.params(SHORT_TERM_GAS, 2);
        assert_eq!(light.per_hour, 900_000);
        assert_eq!(calc.params(SHORT_TERM_GAS, 99).startup_gas, 100);
    }

    #[test]
    fn test_accrual_is_capped() {
        let config = make_config();
        let validators = ValidatorSet::equal(1).unwrap();
        let calc = GasPowerCalculator::new(&config, &validators);

        let origin = GasPowerOrigin::SelfParent {
            left: GasPowerLeft::new(0, 0),
            median_time: 0,
        };
        let after_second = calc.available(1, SECOND, origin);
        assert_eq!(after_second, GasPowerLeft::new(1_000, 1_000));

        let after_day = calc.available(1, 24 * HOUR, origin);
        assert_eq!(after_day, GasPowerLeft::new(60_000, 3_600_000));
    }

    #[test]
    fn test_time_going_backwards_allocates_nothing() {
        let config = make_config();
        let validators = ValidatorSet::equal(1).unwrap();
        let calc = GasPowerCalculator::new(&config, &validators);

        let origin = GasPowerOrigin::SelfParent {
            left: GasPowerLeft::new(500, 700),
            median_time: 10 * SECOND,
        };
        assert_eq!(calc.available(1, SECOND, origin), GasPowerLeft::new(500, 700));
    }

    #[test]
    fn test_prev_epoch_clamped_to_startup() {
        let config = make_config();
        let validators = ValidatorSet::equal(1).unwrap();
        let calc = GasPowerCalculator::new(&config, &validators);

        let origin = GasPowerOrigin::PrevEpoch {
            left: GasPowerLeft::new(0, 1_000_000),
            median_time: 5 * SECOND,
        };
        assert_eq!(
            calc.available(1, 5 * SECOND, origin),
            GasPowerLeft::new(10_000, 1_000_000)
        );

        let fresh = GasPowerOrigin::Fresh {
            epoch_start: 5 * SECOND,
        };
        assert_eq!(
            calc.available(1, 5 * SECOND, fresh),
            GasPowerLeft::new(10_000, 60_000)
        );
    }
}
