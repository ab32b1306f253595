// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Share records and the arena that owns them
//! OWNERS: @kernel-sched-team
//! PUBLIC API: Share, ShareId, Priority, Queue
//! INVARIANTS: Links are only meaningful while `queue != Queue::None`; ids carry a slot generation
//!
//! Queue links are arena indices instead of pointers: a share's `prev`/`next`
//! name its neighbours in whichever single queue currently holds it.

use alloc::vec::Vec;
use core::fmt;
use core::ops::{Index, IndexMut};

/// Priority band of a share. Higher values take precedence.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Priority(u8);

impl Priority {
    /// Lowest band; the idle share lives here.
    pub const MIN: Self = Self(0);

    #[inline]
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u8 {
        self.0
    }

    /// Returns the priority as an index into the claim-list table.
    #[inline]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle of a share inside one scheduler.
///
/// **Ownership**: only the scheduler hands out ids (on insert). A removed
/// share's id goes stale; its slot may be reused under a new generation, so a
/// stale id never aliases a newer share.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShareId {
    index: u32,
    generation: u32,
}

impl ShareId {
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ShareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Collection that currently holds a share.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Queue {
    /// Not ready (or the idle share, which sits behind the fill queue).
    #[default]
    None,
    /// Claim list of the share's priority.
    Claim,
    /// The round-robin fill queue.
    Fill,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Links {
    pub(crate) prev: Option<ShareId>,
    pub(crate) next: Option<ShareId>,
}

/// A schedulable context: a priority band plus an optional per-round quota.
///
/// A share with quota `0` is a pure filler. A fresh share is not ready and
/// holds its full claim.
#[derive(Clone, Debug)]
pub struct Share {
    priority: Priority,
    quota: u32,
    pub(crate) claim: u32,
    pub(crate) fill: u32,
    pub(crate) ready: bool,
    pub(crate) queue: Queue,
    pub(crate) links: Links,
}

impl Share {
    pub const fn new(priority: Priority, quota: u32) -> Self {
        Self {
            priority,
            quota,
            claim: quota,
            fill: 0,
            ready: false,
            queue: Queue::None,
            links: Links { prev: None, next: None },
        }
    }

    #[inline]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Reservation granted per round.
    #[inline]
    pub fn quota(&self) -> u32 {
        self.quota
    }

    /// Reservation left in the current round.
    #[inline]
    pub fn claim_left(&self) -> u32 {
        self.claim
    }

    /// Slice left in the share's current filler turn.
    #[inline]
    pub fn fill_left(&self) -> u32 {
        self.fill
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    #[inline]
    pub fn queue(&self) -> Queue {
        self.queue
    }

    /// Whether the share can be served from its claim list right now.
    #[inline]
    pub fn has_claim(&self) -> bool {
        self.quota > 0 && self.claim > 0
    }

    pub(crate) fn set_quota(&mut self, quota: u32) {
        self.quota = quota;
        self.claim = self.claim.min(quota);
    }

    pub(crate) fn replenish(&mut self) {
        self.claim = self.quota;
    }

    /// Brings a share handed in by the caller into the inserted-but-inactive state.
    pub(crate) fn reset(&mut self) {
        self.claim = self.quota;
        self.fill = 0;
        self.ready = false;
        self.queue = Queue::None;
        self.links = Links::default();
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    share: Option<Share>,
}

/// Owner of every share record of one scheduler, idle share included.
#[derive(Debug, Default)]
pub(crate) struct ShareArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl ShareArena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, share: Share) -> ShareId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.share = Some(share);
            return ShareId { index, generation: slot.generation };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, share: Some(share) });
        ShareId { index, generation: 0 }
    }

    pub(crate) fn remove(&mut self, id: ShareId) -> Option<Share> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        let share = slot.share.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(share)
    }

    pub(crate) fn get(&self, id: ShareId) -> Option<&Share> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.share.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: ShareId) -> Option<&mut Share> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.share.as_mut())
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (ShareId, &Share)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.share.as_ref().map(|share| {
                (ShareId { index: index as u32, generation: slot.generation }, share)
            })
        })
    }

    pub(crate) fn for_each_mut(&mut self, mut f: impl FnMut(&mut Share)) {
        for share in self.slots.iter_mut().filter_map(|slot| slot.share.as_mut()) {
            f(share);
        }
    }
}

impl Index<ShareId> for ShareArena {
    type Output = Share;

    fn index(&self, id: ShareId) -> &Share {
        match self.get(id) {
            Some(share) => share,
            None => panic!("stale share id {id}"),
        }
    }
}

impl IndexMut<ShareId> for ShareArena {
    fn index_mut(&mut self, id: ShareId) -> &mut Share {
        match self.get_mut(id) {
            Some(share) => share,
            None => panic!("stale share id {id}"),
        }
    }
}
