// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Per-CPU claim/fill scheduler core (no_std)
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests per module, property tests (tests_prop), scenario tests (tests/rounds.rs)
//! PUBLIC API: CpuScheduler, Share, ShareId, Priority, Queue, SchedConfig, SchedError, ConfigError
//! DEPENDS_ON: alloc (share arena, claim-list table)
//! INVARIANTS: Ready shares sit in exactly one queue; head quota is never zero; one instance per CPU
//!
//! The scheduler decides, at every kernel entry/exit, which share runs next
//! and for how long. Shares with a quota hold a *claim*: a fixed-priority
//! reservation that is replenished once per round (the superperiod). Shares
//! without a claim left are *fillers* and are served round-robin with a fixed
//! fill quantum. A permanent idle share backs the fill queue so there is
//! always something to run.
//!
//! The caller owns the clock: it reports consumed time through
//! [`CpuScheduler::update`] and must arm a timer for at most
//! [`CpuScheduler::head_quota`] time units.

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

mod config;
mod error;
mod list;
mod scheduler;
mod share;

#[cfg(test)]
mod tests_prop;

pub use config::{
    SchedConfig, DEFAULT_FILL_QUANTUM_US, DEFAULT_PRIORITY_LEVELS, DEFAULT_SUPERPERIOD_US,
    MAX_PRIORITY_LEVELS,
};
pub use error::{ConfigError, Result, SchedError};
pub use list::ShareIter;
pub use scheduler::CpuScheduler;
pub use share::{Priority, Queue, Share, ShareId};
