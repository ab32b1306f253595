// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Step-by-step replay of a trace against one scheduler instance
//!
//! Steps are rendered in the compact notation used by the scheduler's
//! reference test suites: `C(a)` create, `D(a)` destroy, `A(a)` ready,
//! `I(a)` unready, `Y` yield, `O(a)`/`N(a)` ready check expecting an advised
//! or no update, `Q(a,n)` quota change, `U(t)` update, and the resulting
//! head as `H(a,quota,round-time)`. The schedule follows after a bar: time
//! left in the round, the non-empty claim lists from the highest band down,
//! then the fill ring.
//!
//! ```text
//! A(a) U(120) H(a,230,200) | r800 p2[a] fill[]
//! ```

use std::collections::BTreeMap;

use log::{debug, info};
use nexus_cpu_sched::{CpuScheduler, Priority, Share, ShareId};

use crate::trace::{Op, ShareSpec, Step, Trace, TraceError, IDLE};

/// Result of a complete replay.
#[derive(Debug, Default)]
pub struct Report {
    /// One rendered line per step.
    pub lines: Vec<String>,
    pub steps: usize,
    /// Number of round wraps observed.
    pub rounds: usize,
}

pub struct Replay {
    sched: CpuScheduler,
    specs: BTreeMap<String, ShareSpec>,
    live: BTreeMap<String, ShareId>,
}

impl Replay {
    pub fn new(trace: &Trace) -> Result<Self, TraceError> {
        let sched = CpuScheduler::new(trace.scheduler).map_err(|err| TraceError::Sched {
            step: 0,
            op: "configure".to_string(),
            source: err.into(),
        })?;
        Ok(Self { sched, specs: trace.shares.clone(), live: BTreeMap::new() })
    }

    pub fn scheduler(&self) -> &CpuScheduler {
        &self.sched
    }

    /// Replays every step of `trace`, stopping at the first divergence.
    pub fn run(trace: &Trace) -> Result<Report, TraceError> {
        let mut replay = Self::new(trace)?;
        let mut report = Report::default();
        for (index, step) in trace.steps.iter().enumerate() {
            let before = replay.sched.elapsed();
            report.lines.push(replay.step(index + 1, step)?);
            if replay.sched.elapsed() < before {
                report.rounds += 1;
            }
            report.steps += 1;
        }
        info!("replayed {} steps, {} round wraps", report.steps, report.rounds);
        Ok(report)
    }

    /// Applies one step and checks its expectations. Returns the rendered step.
    pub fn step(&mut self, index: usize, step: &Step) -> Result<String, TraceError> {
        let mut line = String::new();
        for text in &step.ops {
            let op: Op = text.parse()?;
            line.push_str(&self.apply(index, &op)?);
            line.push(' ');
        }

        self.sched.update(step.update);
        let head = self.name_of(self.sched.head());
        line.push_str(&format!(
            "U({}) H({},{},{})",
            step.update,
            head,
            self.sched.head_quota(),
            self.sched.elapsed()
        ));
        line.push_str(" | ");
        line.push_str(&self.schedule());
        debug!("step {index}: {line}");

        expect(index, "head", &step.head, &head)?;
        expect(index, "quota", &step.quota, &self.sched.head_quota())?;
        if let Some(elapsed) = step.elapsed {
            expect(index, "elapsed", &elapsed, &self.sched.elapsed())?;
        }
        Ok(line)
    }

    fn apply(&mut self, step: usize, op: &Op) -> Result<String, TraceError> {
        let sched_err = |source| TraceError::Sched { step, op: op.to_string(), source };
        let rendered = match op {
            Op::Create(name) => {
                let spec =
                    self.specs.get(name).ok_or_else(|| TraceError::UndeclaredShare(name.clone()))?;
                if self.live.contains_key(name) {
                    return Err(TraceError::CreatedTwice(name.clone()));
                }
                let share = Share::new(Priority::new(spec.priority), spec.quota);
                let id = self.sched.try_insert(share).map_err(sched_err)?;
                self.live.insert(name.clone(), id);
                format!("C({name})")
            }
            Op::Destroy(name) => {
                let id =
                    self.live.remove(name).ok_or_else(|| TraceError::NotCreated(name.clone()))?;
                self.sched.try_remove(id).map_err(sched_err)?;
                format!("D({name})")
            }
            Op::Ready(name) => {
                self.sched.try_ready(self.id_of(name)?).map_err(sched_err)?;
                format!("A({name})")
            }
            Op::Unready(name) => {
                self.sched.try_unready(self.id_of(name)?).map_err(sched_err)?;
                format!("I({name})")
            }
            Op::Yield => {
                self.sched.yield_head();
                "Y".to_string()
            }
            Op::Outranks(name) | Op::Waits(name) => {
                let advised = self.sched.try_ready_check(self.id_of(name)?).map_err(sched_err)?;
                expect(step, "ready check", &matches!(op, Op::Outranks(_)), &advised)?;
                if advised {
                    format!("O({name})")
                } else {
                    format!("N({name})")
                }
            }
            Op::Quota(name, quota) => {
                self.sched.try_set_quota(self.id_of(name)?, *quota).map_err(sched_err)?;
                format!("Q({name},{quota})")
            }
        };
        Ok(rendered)
    }

    /// Renders the round time left, the claim lists and the fill ring.
    pub fn schedule(&self) -> String {
        let names = |ids: &mut dyn Iterator<Item = ShareId>| {
            ids.map(|id| self.name_of(id)).collect::<Vec<_>>().join(",")
        };
        let mut out = format!("r{}", self.sched.residual());
        for level in (0..self.sched.config().priority_levels).rev() {
            let priority = Priority::new(level as u8);
            if self.sched.claims(priority).next().is_some() {
                out.push_str(&format!(" p{level}[{}]", names(&mut self.sched.claims(priority))));
            }
        }
        out.push_str(&format!(" fill[{}]", names(&mut self.sched.fills())));
        out
    }

    fn id_of(&self, name: &str) -> Result<ShareId, TraceError> {
        self.live.get(name).copied().ok_or_else(|| TraceError::NotCreated(name.to_string()))
    }

    fn name_of(&self, id: ShareId) -> String {
        if id == self.sched.idle() {
            return IDLE.to_string();
        }
        self.live
            .iter()
            .find(|&(_, &live)| live == id)
            .map_or_else(|| id.to_string(), |(name, _)| name.clone())
    }
}

fn expect<T: PartialEq + ToString + ?Sized>(
    step: usize,
    what: &'static str,
    expected: &T,
    actual: &T,
) -> Result<(), TraceError> {
    if expected == actual {
        return Ok(());
    }
    Err(TraceError::Mismatch {
        step,
        what,
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}
