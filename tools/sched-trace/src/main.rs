// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: sched-trace entrypoint wiring to the replay library

fn main() -> anyhow::Result<()> {
    sched_trace::run()
}
