// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Round configuration for the CPU scheduler
//! INVARIANTS: superperiod > 0, fill_quantum > 0, 1 <= priority_levels <= MAX_PRIORITY_LEVELS

use crate::error::ConfigError;
use crate::share::Priority;

/// Default round length (1 s in microseconds).
pub const DEFAULT_SUPERPERIOD_US: u32 = 1_000_000;
/// Default filler slice (10 ms in microseconds).
pub const DEFAULT_FILL_QUANTUM_US: u32 = 10_000;
/// Default number of claim priority bands.
pub const DEFAULT_PRIORITY_LEVELS: u16 = 4;
/// Priorities are `u8`, so at most 256 bands exist.
pub const MAX_PRIORITY_LEVELS: u16 = 256;

/// Static parameters of one scheduler instance.
///
/// All time values use the caller's unit; the scheduler never reads a clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct SchedConfig {
    /// Length of one round; every claim is replenished when it elapses.
    pub superperiod: u32,
    /// Slice granted to a filler turn and to the idle share.
    pub fill_quantum: u32,
    /// Number of claim priority bands (`0..priority_levels`).
    pub priority_levels: u16,
}

impl SchedConfig {
    pub const fn new(superperiod: u32, fill_quantum: u32) -> Self {
        Self { superperiod, fill_quantum, priority_levels: DEFAULT_PRIORITY_LEVELS }
    }

    pub const fn with_priority_levels(mut self, priority_levels: u16) -> Self {
        self.priority_levels = priority_levels;
        self
    }

    /// Checks the configuration once, before a scheduler is built from it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.superperiod == 0 {
            return Err(ConfigError::ZeroSuperperiod);
        }
        if self.fill_quantum == 0 {
            return Err(ConfigError::ZeroFillQuantum);
        }
        if self.priority_levels == 0 || self.priority_levels > MAX_PRIORITY_LEVELS {
            return Err(ConfigError::PriorityLevels {
                levels: self.priority_levels,
                max: MAX_PRIORITY_LEVELS,
            });
        }
        Ok(())
    }

    /// Highest priority a share may carry. Only meaningful on a validated config.
    pub fn max_priority(&self) -> Priority {
        Priority::new(self.priority_levels.saturating_sub(1).min(u8::MAX as u16) as u8)
    }
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SUPERPERIOD_US, DEFAULT_FILL_QUANTUM_US)
    }
}
