//! CONTEXT: End-to-end round scenarios for the per-CPU scheduler
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 8 integration tests
//!
//! TEST_SCOPE:
//!   - Idle fallback and round wrap
//!   - Claim service, exhaustion into the fill queue, claim preserved across unready
//!   - Preemption advice for higher-priority claims
//!   - Fill fairness under yield
//!   - Replenishment at the round boundary
//!
//! TEST_SCENARIOS:
//!   - idle_fallback(): no shares, idle always head with the fill quantum
//!   - claim_service_and_exhaustion(): claim runs, drains, fills, then idles once blocked
//!   - claim_preserved_across_unready(): resumed claim continues with the remainder
//!   - priority_preemption_check(): ready_check advises an update, update selects the claim
//!   - fill_fairness(): two fillers alternate under yield
//!   - round_replenishment(): drained claim is head-eligible again after the wrap
//!   - higher_band_runs_first(): claims served by band, equal bands in FIFO order
//!   - migration_between_cpus(): remove from one scheduler, insert into another
//!
//! DEPENDENCIES:
//!   - nexus_cpu_sched::CpuScheduler: scheduler under test
//!
//! All scenarios use a superperiod of 1000 and a fill quantum of 100.
use nexus_cpu_sched::{CpuScheduler, Priority, Queue, SchedConfig, Share, ShareId};

fn scheduler() -> CpuScheduler {
    CpuScheduler::new(SchedConfig::new(1000, 100)).expect("valid config")
}

fn insert(s: &mut CpuScheduler, prio: u8, quota: u32) -> ShareId {
    s.insert(Share::new(Priority::new(prio), quota))
}

#[track_caller]
fn expect_head(s: &CpuScheduler, head: ShareId, quota: u32) {
    assert_eq!((s.head(), s.head_quota()), (head, quota), "elapsed {}", s.elapsed());
}

#[test]
fn idle_fallback() {
    let mut s = scheduler();
    let idle = s.idle();
    s.update(10);
    expect_head(&s, idle, 100);
    assert_eq!(s.elapsed(), 10);

    // Consumption is trimmed to the granted quota.
    for consumed in [90, 120, 130, 140, 150, 160, 170, 180, 190] {
        s.update(consumed);
        expect_head(&s, idle, 100);
    }
    assert_eq!(s.elapsed(), 900);
    s.update(200);
    expect_head(&s, idle, 100);
    assert_eq!(s.elapsed(), 0);
}

#[test]
fn claim_service_and_exhaustion() {
    let mut s = scheduler();
    let a = insert(&mut s, 2, 230);
    s.ready(a);
    s.update(0);
    expect_head(&s, a, 230);
    assert!(s.head_claims());

    s.update(100);
    expect_head(&s, a, 130);
    s.update(130);
    expect_head(&s, a, 100);
    assert!(!s.head_claims());
    assert_eq!(s.share(a).unwrap().queue(), Queue::Fill);
    assert_eq!(s.elapsed(), 230);

    s.unready(a);
    s.update(100);
    expect_head(&s, s.idle(), 100);
}

#[test]
fn claim_preserved_across_unready() {
    let mut s = scheduler();
    let a = insert(&mut s, 2, 230);
    s.ready(a);
    s.update(0);
    s.update(100);
    s.unready(a);
    s.update(50);
    expect_head(&s, s.idle(), 100);
    assert_eq!(s.share(a).unwrap().claim_left(), 80);
    assert_eq!(s.elapsed(), 150);

    s.ready(a);
    s.update(10);
    expect_head(&s, a, 80);
}

#[test]
fn priority_preemption_check() {
    let mut s = scheduler();
    let f = insert(&mut s, 0, 0);
    s.ready(f);
    s.update(0);
    expect_head(&s, f, 100);

    let b = insert(&mut s, 3, 100);
    assert!(s.ready_check(b));
    expect_head(&s, f, 100);

    s.update(10);
    expect_head(&s, b, 100);
    assert_eq!(s.share(f).unwrap().fill_left(), 90);

    // The preempted filler resumes with the rest of its slice.
    s.update(100);
    expect_head(&s, f, 90);
}

#[test]
fn fill_fairness() {
    let mut s = scheduler();
    let f1 = insert(&mut s, 1, 0);
    let f2 = insert(&mut s, 1, 0);
    s.ready(f1);
    s.ready(f2);
    s.update(0);
    expect_head(&s, f1, 100);

    for turn in 0..6 {
        s.yield_head();
        s.update(0);
        let expected = if turn % 2 == 0 { f2 } else { f1 };
        expect_head(&s, expected, 100);
    }
}

#[test]
fn round_replenishment() {
    let mut s = scheduler();
    let a = insert(&mut s, 2, 230);
    s.ready(a);
    s.update(0);
    s.update(230);
    expect_head(&s, a, 100);
    assert_eq!(s.share(a).unwrap().claim_left(), 0);

    for _ in 0..7 {
        s.update(100);
        assert_eq!(s.share(a).unwrap().claim_left(), 0);
    }
    assert_eq!(s.elapsed(), 930);
    expect_head(&s, a, 70);

    s.update(100);
    assert_eq!(s.elapsed(), 0);
    expect_head(&s, a, 230);
    assert!(s.head_claims());
    assert_eq!(s.share(a).unwrap().claim_left(), 230);
}

#[test]
fn higher_band_runs_first() {
    let mut s = scheduler();
    let low = insert(&mut s, 1, 50);
    let first = insert(&mut s, 3, 30);
    let second = insert(&mut s, 3, 40);
    for id in [low, first, second] {
        s.ready(id);
    }
    assert_eq!(s.claims(Priority::new(3)).collect::<Vec<_>>(), [first, second]);

    s.update(0);
    expect_head(&s, first, 30);
    s.update(30);
    expect_head(&s, second, 40);
    s.update(40);
    expect_head(&s, low, 50);
    s.update(50);
    // All claims spent: fillers in the order their claims ran dry.
    expect_head(&s, first, 100);
    assert_eq!(s.fills().collect::<Vec<_>>(), [first, second, low]);
}

#[test]
fn migration_between_cpus() {
    let mut cpu0 = scheduler();
    let mut cpu1 = scheduler();
    let a = insert(&mut cpu0, 2, 230);
    cpu0.ready(a);
    cpu0.update(0);
    expect_head(&cpu0, a, 230);

    let share = cpu0.remove(a);
    expect_head(&cpu0, cpu0.idle(), 100);
    assert!(cpu0.share(a).is_none());

    let moved = cpu1.insert(share);
    cpu1.ready(moved);
    cpu1.update(0);
    expect_head(&cpu1, moved, 230);
}
