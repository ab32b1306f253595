// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Trace file model
//! INVARIANTS: Share names are unique (TOML table keys); `idle` is reserved
//!
//! A trace is a TOML document:
//!
//! ```toml
//! [scheduler]
//! superperiod = 1000
//! fill_quantum = 100
//!
//! [shares]
//! a = { priority = 2, quota = 230 }
//!
//! [[step]]
//! ops = ["create a", "ready a"]
//! update = 120
//! head = "a"
//! quota = 230
//! elapsed = 200
//! ```
//!
//! Each step applies its operations in order, reports `update` consumed time
//! and then compares the scheduler against the expected head, quota and
//! (optionally) round time.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use nexus_cpu_sched::{SchedConfig, SchedError};
use serde::Deserialize;
use thiserror::Error;

/// Name under which traces refer to the scheduler's idle share.
pub const IDLE: &str = "idle";

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("malformed trace: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unrecognised operation `{0}`")]
    UnknownOp(String),
    #[error("share `{0}` is not declared in [shares]")]
    UndeclaredShare(String),
    #[error("share name `idle` is reserved")]
    ReservedName,
    #[error("share `{0}` is not created")]
    NotCreated(String),
    #[error("share `{0}` is created twice")]
    CreatedTwice(String),
    #[error("step {step}: {op}: {source}")]
    Sched {
        step: usize,
        op: String,
        #[source]
        source: SchedError,
    },
    #[error("step {step}: {what} expected {expected}, got {actual}")]
    Mismatch { step: usize, what: &'static str, expected: String, actual: String },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Trace {
    #[serde(default)]
    pub scheduler: SchedConfig,
    #[serde(default)]
    pub shares: BTreeMap<String, ShareSpec>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShareSpec {
    pub priority: u8,
    #[serde(default)]
    pub quota: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    #[serde(default)]
    pub ops: Vec<String>,
    pub update: u32,
    pub head: String,
    pub quota: u32,
    pub elapsed: Option<u32>,
}

impl FromStr for Trace {
    type Err = TraceError;

    fn from_str(text: &str) -> Result<Self, TraceError> {
        let trace: Trace = toml::from_str(text)?;
        if trace.shares.contains_key(IDLE) {
            return Err(TraceError::ReservedName);
        }
        Ok(trace)
    }
}

/// One share operation of a step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Create(String),
    Destroy(String),
    Ready(String),
    Unready(String),
    Yield,
    /// `ready_check` must advise an update.
    Outranks(String),
    /// `ready_check` must not advise an update.
    Waits(String),
    Quota(String, u32),
}

impl FromStr for Op {
    type Err = TraceError;

    fn from_str(text: &str) -> Result<Self, TraceError> {
        let unknown = || TraceError::UnknownOp(text.to_string());
        let words: Vec<&str> = text.split_whitespace().collect();
        let op = match words.as_slice() {
            ["create", name] => Op::Create(name.to_string()),
            ["destroy", name] => Op::Destroy(name.to_string()),
            ["ready", name] => Op::Ready(name.to_string()),
            ["unready", name] => Op::Unready(name.to_string()),
            ["yield"] => Op::Yield,
            ["outranks", name] => Op::Outranks(name.to_string()),
            ["waits", name] => Op::Waits(name.to_string()),
            ["quota", name, quota] => {
                Op::Quota(name.to_string(), quota.parse().map_err(|_| unknown())?)
            }
            _ => return Err(unknown()),
        };
        Ok(op)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Create(name) => write!(f, "create {name}"),
            Op::Destroy(name) => write!(f, "destroy {name}"),
            Op::Ready(name) => write!(f, "ready {name}"),
            Op::Unready(name) => write!(f, "unready {name}"),
            Op::Yield => f.write_str("yield"),
            Op::Outranks(name) => write!(f, "outranks {name}"),
            Op::Waits(name) => write!(f, "waits {name}"),
            Op::Quota(name, quota) => write!(f, "quota {name} {quota}"),
        }
    }
}
