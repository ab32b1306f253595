// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Host-side replay tool for the per-CPU claim/fill scheduler
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! PUBLIC API: replay_str(), replay_file(), run(), Args, Report
//! DEPENDS_ON: nexus-cpu-sched (serde feature), clap, toml, env_logger
//!
//! Usage: `sched-trace <TRACE> [--quiet]`. Exits non-zero on the first step
//! whose head, quota or round time diverges from the trace.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

mod runner;
mod trace;

pub use runner::{Replay, Report};
pub use trace::{Op, ShareSpec, Step, Trace, TraceError, IDLE};

#[derive(Debug, Parser)]
#[command(name = "sched-trace", about = "Replay a scheduler trace and check every step")]
pub struct Args {
    /// TOML trace to replay.
    pub trace: PathBuf,
    /// Only print the summary line.
    #[arg(short, long)]
    pub quiet: bool,
}

/// Parses and replays a trace held in memory.
pub fn replay_str(text: &str) -> Result<Report, TraceError> {
    let trace: Trace = text.parse()?;
    Replay::run(&trace)
}

pub fn replay_file(path: &Path) -> anyhow::Result<Report> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading trace {}", path.display()))?;
    replay_str(&text).with_context(|| format!("replaying {}", path.display()))
}

pub fn execute(args: &Args) -> anyhow::Result<String> {
    let report = replay_file(&args.trace)?;
    let mut out = String::new();
    if !args.quiet {
        for (index, line) in report.lines.iter().enumerate() {
            out.push_str(&format!("{:>3}: {line}\n", index + 1));
        }
    }
    out.push_str(&format!("ok: {} steps, {} round wraps\n", report.steps, report.rounds));
    Ok(out)
}

pub fn run() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    log::debug!("replaying {}", args.trace.display());
    print!("{}", execute(&args)?);
    Ok(())
}
