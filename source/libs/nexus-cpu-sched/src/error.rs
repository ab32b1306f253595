// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Errors reported by the checked (`try_*`) scheduler API.
//!
//! The kernel paths call the unchecked operations, which treat every one of
//! these as a programming error and panic.

use thiserror::Error;

use crate::share::{Priority, ShareId};

/// Result alias used by the checked scheduler API.
pub type Result<T> = core::result::Result<T, SchedError>;

/// Rejected scheduler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("superperiod must be non-zero")]
    ZeroSuperperiod,
    #[error("fill quantum must be non-zero")]
    ZeroFillQuantum,
    #[error("priority levels must be within 1..={max}, got {levels}")]
    PriorityLevels { levels: u16, max: u16 },
}

/// Misuse of a scheduler operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedError {
    /// The id was never handed out or its share was removed already.
    #[error("share {0} is not inserted")]
    UnknownShare(ShareId),
    /// The idle share is owned by the scheduler and cannot be manipulated.
    #[error("share {0} is the idle share")]
    IdleShare(ShareId),
    #[error("share {0} is already ready")]
    AlreadyReady(ShareId),
    #[error("share {0} is not ready")]
    NotReady(ShareId),
    #[error("priority {priority} exceeds the highest level {max}")]
    InvalidPriority { priority: Priority, max: Priority },
    #[error(transparent)]
    Config(#[from] ConfigError),
}
