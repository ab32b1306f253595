// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Per-CPU claim/fill scheduler
//! OWNERS: @kernel-sched-team
//! PUBLIC API: CpuScheduler (insert/remove/ready/unready/yield_head/update/head/head_quota/ready_check/set_quota)
//! DEPENDS_ON: share (arena), list (intrusive FIFO), config
//! INVARIANTS: A ready non-idle share sits in exactly one of {claim list of its priority, fill queue};
//!             claim-list members have claim_left > 0; head_quota > 0; elapsed < superperiod
//!
//! ## Rounds, claims and fills
//!
//! Time is cut into rounds of `superperiod` units. At the start of a round
//! every share's claim is refilled to its quota. While a ready share has
//! claim left it waits in the claim list of its priority; the highest
//! non-empty list supplies the head. A share whose claim runs dry moves to
//! the fill queue, where all claimless ready shares take turns of
//! `fill_quantum` units. With nothing ready the idle share runs.
//!
//! ## Lazy head
//!
//! The decision is memoized in `head`/`head_quota` and only recomputed by
//! [`CpuScheduler::update`] (or when the head is removed). Readying a share
//! never changes the head by itself; [`CpuScheduler::ready_check`] tells the
//! caller whether an early `update` is warranted.
//!
//! ## Send/Sync
//!
//! A scheduler belongs to one CPU and is only touched by that CPU's kernel
//! control flow with interrupts masked. It is `!Send` and `!Sync`; migration
//! is `remove` on one instance followed by `insert` on another.

use alloc::vec::Vec;
use core::marker::PhantomData;

use log::{debug, error, trace};

use crate::config::SchedConfig;
use crate::error::{ConfigError, Result, SchedError};
use crate::list::{ShareIter, ShareList};
use crate::share::{Priority, Queue, Share, ShareArena, ShareId};

pub struct CpuScheduler {
    config: SchedConfig,
    shares: ShareArena,
    claims: Vec<ShareList>,
    fills: ShareList,
    idle: ShareId,
    head: ShareId,
    head_quota: u32,
    head_claims: bool,
    head_yields: bool,
    // Cleared when the head is removed: the next consumption belongs to nobody.
    head_accountable: bool,
    elapsed: u32,
    _not_send_sync: PhantomData<*mut ()>,
}
static_assertions::assert_not_impl_any!(CpuScheduler: Send, Sync);

impl CpuScheduler {
    /// Creates a scheduler whose only member is its idle share.
    pub fn new(config: SchedConfig) -> core::result::Result<Self, ConfigError> {
        config.validate()?;

        let mut shares = ShareArena::new();
        let mut idle_share = Share::new(Priority::MIN, 0);
        idle_share.ready = true;
        let idle = shares.insert(idle_share);
        let claims = (0..config.priority_levels).map(|_| ShareList::new()).collect();

        debug!(
            "cpu scheduler: superperiod={} fill_quantum={} levels={}",
            config.superperiod, config.fill_quantum, config.priority_levels
        );
        Ok(Self {
            config,
            shares,
            claims,
            fills: ShareList::new(),
            idle,
            head: idle,
            head_quota: config.fill_quantum.min(config.superperiod),
            head_claims: false,
            head_yields: false,
            head_accountable: true,
            elapsed: 0,
            _not_send_sync: PhantomData,
        })
    }

    // Membership

    /// Adds `share` as not ready with its full claim and returns its handle.
    pub fn insert(&mut self, share: Share) -> ShareId {
        self.try_insert(share).unwrap_or_else(|err| misuse("insert", err))
    }

    pub fn try_insert(&mut self, mut share: Share) -> Result<ShareId> {
        let max = self.config.max_priority();
        if share.priority() > max {
            return Err(SchedError::InvalidPriority { priority: share.priority(), max });
        }
        share.reset();
        let id = self.shares.insert(share);
        debug!(
            "insert {id}: prio={} quota={}",
            self.shares[id].priority(),
            self.shares[id].quota()
        );
        Ok(id)
    }

    /// Detaches a share and hands its record back. Its unconsumed claim is lost.
    ///
    /// Removing the head re-derives the selection immediately; the time the
    /// removed head consumed so far is charged to nobody.
    pub fn remove(&mut self, id: ShareId) -> Share {
        self.try_remove(id).unwrap_or_else(|err| misuse("remove", err))
    }

    pub fn try_remove(&mut self, id: ShareId) -> Result<Share> {
        self.checked(id)?;
        self.dequeue(id);
        let mut share = self.shares.remove(id).ok_or(SchedError::UnknownShare(id))?;
        share.ready = false;
        debug!("remove {id}");

        if self.head == id {
            self.head_yields = false;
            self.head_accountable = false;
            self.select(None);
        }
        Ok(share)
    }

    // Eligibility

    /// Makes a share eligible. It joins its claim list if it has claim left,
    /// the back of the fill queue otherwise.
    pub fn ready(&mut self, id: ShareId) {
        self.try_ready(id).unwrap_or_else(|err| misuse("ready", err))
    }

    pub fn try_ready(&mut self, id: ShareId) -> Result<()> {
        if self.checked(id)?.ready {
            return Err(SchedError::AlreadyReady(id));
        }
        let fill_quantum = self.config.fill_quantum;
        let share = &mut self.shares[id];
        share.ready = true;
        share.fill = fill_quantum;
        self.enqueue(id);
        trace!("ready {id} -> {:?}", self.shares[id].queue());
        Ok(())
    }

    /// Makes a share ineligible. Its claim is kept for the rest of the round.
    pub fn unready(&mut self, id: ShareId) {
        self.try_unready(id).unwrap_or_else(|err| misuse("unready", err))
    }

    pub fn try_unready(&mut self, id: ShareId) -> Result<()> {
        if !self.checked(id)?.ready {
            return Err(SchedError::NotReady(id));
        }
        self.dequeue(id);
        self.shares[id].ready = false;
        trace!("unready {id}");
        Ok(())
    }

    /// Changes the per-round quota of a share.
    ///
    /// The remaining claim is clamped to the new quota, so a raise only takes
    /// effect with the next round. A ready share left without claim moves to
    /// the fill queue. If `id` is the head serving its claim, the granted
    /// quota shrinks to the new claim. A head left without claim is
    /// re-derived like a removed head, without charging the running turn.
    pub fn set_quota(&mut self, id: ShareId, quota: u32) {
        self.try_set_quota(id, quota).unwrap_or_else(|err| misuse("set_quota", err))
    }

    pub fn try_set_quota(&mut self, id: ShareId, quota: u32) -> Result<()> {
        self.checked(id)?;
        let share = &mut self.shares[id];
        share.set_quota(quota);
        let claim = share.claim;
        if share.queue == Queue::Claim && !share.has_claim() {
            self.demote(id);
        }
        debug!("quota {id} = {quota}, claim left {claim}");

        if id == self.head && self.head_claims {
            if claim == 0 {
                self.head_yields = false;
                self.head_accountable = false;
                self.select(None);
            } else {
                self.head_quota = self.head_quota.min(claim);
            }
        }
        Ok(())
    }

    // Head selection

    /// Gives up the rest of the head's current turn.
    ///
    /// A filler loses the rest of its slice. A claim holder keeps its
    /// unconsumed claim but is queued behind its peers and passed over by
    /// the next selection.
    pub fn yield_head(&mut self) {
        trace!("yield {}", self.head);
        self.head_yields = true;
    }

    /// Accounts `consumed` time to the head and re-derives the head.
    ///
    /// Consumption beyond the granted head quota is ignored: the caller is
    /// required to preempt the head within [`head_quota`](Self::head_quota).
    pub fn update(&mut self, consumed: u32) {
        let used = consumed.min(self.head_quota).min(self.residual());
        let mut passed_over = None;
        if self.head_accountable {
            if self.head_claims {
                passed_over = self.charge_claim(used);
            } else {
                self.charge_fill(used);
            }
        }
        self.head_accountable = true;
        self.head_yields = false;
        self.advance(used);
        self.select(passed_over);
        trace!(
            "update consumed={consumed} used={used} elapsed={} -> head {} quota {} ({})",
            self.elapsed,
            self.head,
            self.head_quota,
            if self.head_claims { "claim" } else { "fill" }
        );
    }

    /// Readies `id` if necessary and reports whether it outranks the current
    /// head, i.e. whether an early [`update`](Self::update) is warranted.
    /// The memoized head is left untouched. The idle share never outranks.
    pub fn ready_check(&mut self, id: ShareId) -> bool {
        self.try_ready_check(id).unwrap_or_else(|err| misuse("ready_check", err))
    }

    pub fn try_ready_check(&mut self, id: ShareId) -> Result<bool> {
        if id == self.idle {
            return Ok(false);
        }
        if !self.checked(id)?.ready {
            self.try_ready(id)?;
        }
        Ok(self.outranks_head(id))
    }

    // Queries

    /// Share selected by the last update.
    #[inline]
    pub fn head(&self) -> ShareId {
        self.head
    }

    /// Time granted to the head; never zero.
    #[inline]
    pub fn head_quota(&self) -> u32 {
        self.head_quota
    }

    /// Whether the head is served from its claim (as opposed to a fill turn).
    #[inline]
    pub fn head_claims(&self) -> bool {
        self.head_claims
    }

    #[inline]
    pub fn idle(&self) -> ShareId {
        self.idle
    }

    #[inline]
    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    #[inline]
    pub fn superperiod(&self) -> u32 {
        self.config.superperiod
    }

    #[inline]
    pub fn fill_quantum(&self) -> u32 {
        self.config.fill_quantum
    }

    /// Time consumed in the current round.
    #[inline]
    pub fn elapsed(&self) -> u32 {
        self.elapsed
    }

    /// Time left in the current round.
    #[inline]
    pub fn residual(&self) -> u32 {
        self.config.superperiod - self.elapsed
    }

    pub fn share(&self, id: ShareId) -> Option<&Share> {
        self.shares.get(id)
    }

    /// All shares, the idle share included, in slot order.
    pub fn shares(&self) -> impl Iterator<Item = (ShareId, &Share)> + '_ {
        self.shares.iter()
    }

    /// Claim list of `priority`, front to back. Empty for unknown levels.
    pub fn claims(&self, priority: Priority) -> ShareIter<'_> {
        self.claims
            .get(priority.as_index())
            .map_or_else(|| ShareIter::empty(&self.shares), |list| list.iter(&self.shares))
    }

    /// Fill queue, front to back. The idle share is never listed.
    pub fn fills(&self) -> ShareIter<'_> {
        self.fills.iter(&self.shares)
    }

    /// Number of inserted shares, not counting the idle share.
    pub fn len(&self) -> usize {
        self.shares.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Internals

    fn checked(&self, id: ShareId) -> Result<&Share> {
        if id == self.idle {
            return Err(SchedError::IdleShare(id));
        }
        self.shares.get(id).ok_or(SchedError::UnknownShare(id))
    }

    fn enqueue(&mut self, id: ShareId) {
        if self.shares[id].has_claim() {
            self.push_claim(id);
        } else {
            self.push_fill(id);
        }
    }

    fn dequeue(&mut self, id: ShareId) {
        let share = &self.shares[id];
        let (priority, queue) = (share.priority().as_index(), share.queue);
        match queue {
            Queue::Claim => self.claims[priority].remove(&mut self.shares, id),
            Queue::Fill => self.fills.remove(&mut self.shares, id),
            Queue::None => return,
        }
        self.shares[id].queue = Queue::None;
    }

    fn push_claim(&mut self, id: ShareId) {
        let priority = self.shares[id].priority().as_index();
        self.claims[priority].push_back(&mut self.shares, id);
        self.shares[id].queue = Queue::Claim;
    }

    fn push_fill(&mut self, id: ShareId) {
        self.fills.push_back(&mut self.shares, id);
        self.shares[id].queue = Queue::Fill;
    }

    /// Moves a claim-list member without claim left to the back of the fill queue.
    fn demote(&mut self, id: ShareId) {
        self.dequeue(id);
        self.shares[id].fill = self.config.fill_quantum;
        self.push_fill(id);
        debug!("{id} has no claim left, filling");
    }

    /// Charges a claim turn. Returns the head if it yielded with claim left.
    fn charge_claim(&mut self, used: u32) -> Option<ShareId> {
        let id = self.head;
        let share = &mut self.shares[id];
        share.claim = share.claim.saturating_sub(used);
        if share.queue != Queue::Claim {
            return None;
        }
        if share.claim == 0 {
            self.demote(id);
            return None;
        }
        if !self.head_yields {
            return None;
        }
        let priority = share.priority().as_index();
        self.claims[priority].move_to_back(&mut self.shares, id);
        Some(id)
    }

    /// Charges a fill turn. A finished turn rotates the head to the back.
    fn charge_fill(&mut self, used: u32) {
        let id = self.head;
        if self.fills.front() != Some(id) {
            return;
        }
        let share = &mut self.shares[id];
        let left = if self.head_yields { 0 } else { share.fill.saturating_sub(used) };
        if left > 0 {
            share.fill = left;
            return;
        }
        share.fill = self.config.fill_quantum;
        self.fills.rotate(&mut self.shares);
    }

    fn advance(&mut self, used: u32) {
        self.elapsed += used;
        if self.elapsed >= self.config.superperiod {
            self.next_round();
        }
    }

    fn next_round(&mut self) {
        self.elapsed = 0;
        self.shares.for_each_mut(Share::replenish);

        // Replenished fillers return to their claim lists in fill order.
        let mut cursor = self.fills.front();
        while let Some(id) = cursor {
            cursor = self.shares[id].links.next;
            if self.shares[id].has_claim() {
                self.fills.remove(&mut self.shares, id);
                self.push_claim(id);
            }
        }
        debug!("round wrapped, claims replenished");
    }

    fn select(&mut self, passed_over: Option<ShareId>) {
        let residual = self.residual();

        let claimant = self.claims.iter().rev().find_map(|level| match level.front() {
            Some(front) if Some(front) == passed_over => self.shares[front].links.next,
            front => front,
        });
        if let Some(id) = claimant {
            let claim = self.shares[id].claim;
            self.set_head(id, claim.min(residual), true);
            return;
        }
        if let Some(id) = self.fills.front() {
            let fill = self.shares[id].fill;
            self.set_head(id, fill.min(residual), false);
            return;
        }
        // A yielding claim holder still beats idling.
        if let Some(id) = passed_over {
            let claim = self.shares[id].claim;
            self.set_head(id, claim.min(residual), true);
            return;
        }
        self.set_head(self.idle, self.config.fill_quantum.min(residual), false);
    }

    fn set_head(&mut self, id: ShareId, quota: u32, claims: bool) {
        debug_assert!(quota > 0, "head {id} granted an empty quota");
        self.head = id;
        self.head_quota = quota;
        self.head_claims = claims;
    }

    fn outranks_head(&self, id: ShareId) -> bool {
        if id == self.head {
            return false;
        }
        let head = &self.shares[self.head];
        if self.head != self.idle && !head.ready {
            // The memoized head stopped running; anything ready beats it.
            return true;
        }
        let share = &self.shares[id];
        match share.queue {
            Queue::None => false,
            // A filler head that was re-readied sits behind the new front.
            Queue::Fill => {
                self.head == self.idle || (!self.head_claims && self.fills.front() == Some(id))
            }
            Queue::Claim => {
                if !self.head_claims || head.queue != Queue::Claim {
                    return true;
                }
                if share.priority() != head.priority() {
                    return share.priority() > head.priority();
                }
                // Same band: only a member queued ahead of the head outranks it.
                let mut cursor = head.links.next;
                while let Some(next) = cursor {
                    if next == id {
                        return false;
                    }
                    cursor = self.shares[next].links.next;
                }
                true
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        let mut queued = 0;
        for (id, share) in self.shares.iter() {
            if id == self.idle {
                assert!(share.ready && share.queue == Queue::None);
                continue;
            }
            let expected = match (share.ready, share.has_claim()) {
                (false, _) => Queue::None,
                (true, true) => Queue::Claim,
                (true, false) => Queue::Fill,
            };
            assert_eq!(share.queue, expected, "share {id} sits in the wrong queue");
            assert!(share.claim <= share.quota(), "share {id} claims beyond its quota");
            let found = match share.queue {
                Queue::None => 0,
                Queue::Claim => self.claims(share.priority()).filter(|&m| m == id).count(),
                Queue::Fill => self.fills().filter(|&m| m == id).count(),
            };
            assert_eq!(found, usize::from(share.queue != Queue::None), "share {id} links");
            queued += found;
        }
        let listed: usize =
            self.claims.iter().map(ShareList::len).sum::<usize>() + self.fills.len();
        assert_eq!(listed, queued, "queues hold unknown members");
        assert!(self.head_quota > 0);
        assert!(self.elapsed < self.config.superperiod);
        assert!(self.shares.get(self.head).is_some(), "head is stale");
    }
}

#[cold]
fn misuse(op: &'static str, err: SchedError) -> ! {
    error!("cpu scheduler misuse in {op}: {err}");
    panic!("cpu scheduler misuse in {op}: {err}");
}
