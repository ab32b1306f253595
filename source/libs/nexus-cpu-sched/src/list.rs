// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Intrusive FIFO of shares, linked through the arena.
//!
//! Every operation is O(1) and allocation-free. A share must be in at most
//! one list at a time, since it carries a single pair of links.

use crate::share::{Links, ShareArena, ShareId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ShareList {
    head: Option<ShareId>,
    tail: Option<ShareId>,
    len: usize,
}

impl ShareList {
    pub(crate) const fn new() -> Self {
        Self { head: None, tail: None, len: 0 }
    }

    #[inline]
    pub(crate) fn front(&self) -> Option<ShareId> {
        self.head
    }

    #[inline]
    pub(crate) fn back(&self) -> Option<ShareId> {
        self.tail
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn push_back(&mut self, arena: &mut ShareArena, id: ShareId) {
        debug_assert_eq!(arena[id].links, Links::default(), "share {id} is linked twice");
        arena[id].links = Links { prev: self.tail, next: None };
        match self.tail {
            Some(tail) => arena[tail].links.next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
    }

    /// Unlinks `id`, which must be a member of this list.
    pub(crate) fn remove(&mut self, arena: &mut ShareArena, id: ShareId) {
        let Links { prev, next } = core::mem::take(&mut arena[id].links);
        match prev {
            Some(prev) => arena[prev].links.next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => arena[next].links.prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
    }

    /// Moves `id` behind every other member.
    pub(crate) fn move_to_back(&mut self, arena: &mut ShareArena, id: ShareId) {
        if self.back() == Some(id) {
            return;
        }
        self.remove(arena, id);
        self.push_back(arena, id);
    }

    /// Moves the front member to the back.
    pub(crate) fn rotate(&mut self, arena: &mut ShareArena) {
        if let Some(front) = self.head {
            self.move_to_back(arena, front);
        }
    }

    pub(crate) fn iter<'a>(&self, arena: &'a ShareArena) -> ShareIter<'a> {
        ShareIter { arena, cursor: self.head }
    }
}

/// Front-to-back iterator over the members of a claim list or the fill queue.
#[derive(Clone, Debug)]
pub struct ShareIter<'a> {
    arena: &'a ShareArena,
    cursor: Option<ShareId>,
}

impl<'a> ShareIter<'a> {
    pub(crate) fn empty(arena: &'a ShareArena) -> Self {
        Self { arena, cursor: None }
    }
}

impl Iterator for ShareIter<'_> {
    type Item = ShareId;

    fn next(&mut self) -> Option<ShareId> {
        let id = self.cursor?;
        self.cursor = self.arena[id].links.next;
        Some(id)
    }
}
