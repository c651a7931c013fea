// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Time-bucketed storage for in-flight envelopes.
//!
//! Arrivals live in fixed-length windows of [`WINDOW_TICKS`] ticks, each a
//! dense array of per-millisecond buckets. Windows are anchored to absolute
//! multiples of [`WINDOW_TICKS`], so two arrivals exactly one window length
//! apart always land in different windows. The queue keeps a contiguous run
//! of windows from the one containing the current tick through the one
//! containing the furthest pending arrival; elapsed windows are evicted from
//! the front, new ones appended lazily at the back. Insert and pop are O(1),
//! which is the whole point of trading a binary heap for this layout.

use std::collections::VecDeque;

use crate::Tick;

/// Length of one window in ticks.
pub(crate) const WINDOW_TICKS: Tick = 60_000;

/// One entry in a bucket's LIFO chain.
struct Slot<E> {
    entry: E,
    next: Option<Box<Slot<E>>>,
}

/// A fixed span of [`WINDOW_TICKS`] consecutive ticks.
///
/// Each bucket is the head of a heap-linked stack, so an empty bucket costs
/// a single pointer and insertion is always at the head (LIFO).
struct Window<E> {
    start: Tick,
    buckets: Vec<Option<Box<Slot<E>>>>,
    len: usize,
}

impl<E> Window<E> {
    fn new(start: Tick) -> Self {
        debug_assert_eq!(start % WINDOW_TICKS, 0);
        Self {
            start,
            buckets: std::iter::repeat_with(|| None)
                .take(WINDOW_TICKS as usize)
                .collect(),
            len: 0,
        }
    }

    fn end(&self) -> Tick {
        self.start + WINDOW_TICKS
    }

    fn push(&mut self, arrival: Tick, entry: E) {
        let offset = (arrival - self.start) as usize;
        let next = self.buckets[offset].take();
        self.buckets[offset] = Some(Box::new(Slot { entry, next }));
        self.len += 1;
    }

    fn pop(&mut self, offset: usize) -> Option<E> {
        let slot = self.buckets[offset].take()?;
        let Slot { entry, next } = *slot;
        self.buckets[offset] = next;
        self.len -= 1;
        Some(entry)
    }

    fn chain_len(&self, offset: usize) -> usize {
        let mut count = 0;
        let mut cur = self.buckets[offset].as_deref();
        while let Some(slot) = cur {
            count += 1;
            cur = slot.next.as_deref();
        }
        count
    }
}

impl<E> Drop for Window<E> {
    fn drop(&mut self) {
        // unlink iteratively, a long chain would otherwise recurse per slot
        for bucket in &mut self.buckets {
            let mut cur = bucket.take();
            while let Some(mut slot) = cur {
                cur = slot.next.take();
            }
        }
    }
}

/// The event queue holding every pending envelope, keyed by arrival tick.
pub(crate) struct EventQueue<E> {
    windows: VecDeque<Window<E>>,
    len: usize,
}

impl<E> EventQueue<E> {
    pub(crate) fn new() -> Self {
        Self {
            windows: VecDeque::new(),
            len: 0,
        }
    }

    /// Files `entry` under its arrival tick, at the head of the bucket.
    ///
    /// Entries due at the identical tick come back out in reverse order of
    /// insertion; this exact rule is part of the reproducibility contract.
    ///
    /// # Panics
    ///
    /// Panics if `arrival` lies before `now` or beyond [`crate::MAX_TICK`].
    pub(crate) fn insert(&mut self, arrival: Tick, entry: E, now: Tick) {
        assert!(
            arrival >= now,
            "arrival tick {arrival} is before the current tick {now}"
        );
        assert!(
            arrival <= crate::MAX_TICK,
            "arrival tick {arrival} exceeds the clock bound"
        );
        self.evict_elapsed(now);

        if self.windows.is_empty() {
            self.windows.push_back(Window::new(now - now % WINDOW_TICKS));
        }
        let start = arrival - arrival % WINDOW_TICKS;
        while self.back_start() < start {
            let next = self.back_start() + WINDOW_TICKS;
            self.windows.push_back(Window::new(next));
        }

        let index = ((start - self.front_start()) / WINDOW_TICKS) as usize;
        self.windows[index].push(arrival, entry);
        self.len += 1;
    }

    /// Removes and returns the most recently inserted entry due exactly at
    /// `now`, if any.
    pub(crate) fn pop_at(&mut self, now: Tick) -> Option<E> {
        self.evict_elapsed(now);
        let front = self.windows.front_mut()?;
        if now < front.start {
            return None;
        }
        debug_assert!(now < front.end());
        let entry = front.pop((now - front.start) as usize)?;
        self.len -= 1;
        Some(entry)
    }

    /// Earliest pending arrival tick, scanning windows and buckets in time
    /// order. Introspection only, not for the hot path.
    pub(crate) fn peek_earliest(&self) -> Option<Tick> {
        for window in &self.windows {
            if window.len == 0 {
                continue;
            }
            for (offset, bucket) in window.buckets.iter().enumerate() {
                if bucket.is_some() {
                    return Some(window.start + offset as Tick);
                }
            }
        }
        None
    }

    /// Number of entries due exactly at `tick`.
    pub(crate) fn size_at(&self, tick: Tick) -> usize {
        let start = tick - tick % WINDOW_TICKS;
        let Some(front) = self.windows.front() else {
            return 0;
        };
        if start < front.start {
            return 0;
        }
        let index = ((start - front.start) / WINDOW_TICKS) as usize;
        match self.windows.get(index) {
            Some(window) => window.chain_len((tick - start) as usize),
            None => 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of live windows, including empty gap windows.
    pub(crate) fn window_count(&self) -> usize {
        self.windows.len()
    }

    fn front_start(&self) -> Tick {
        self.windows.front().map_or(0, |w| w.start)
    }

    fn back_start(&self) -> Tick {
        self.windows.back().map_or(0, |w| w.start)
    }

    fn evict_elapsed(&mut self, now: Tick) {
        while let Some(front) = self.windows.front() {
            if front.end() > now {
                break;
            }
            debug_assert_eq!(front.len, 0, "evicting a window with pending envelopes");
            self.windows.pop_front();
        }
    }
}
