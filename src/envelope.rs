// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Envelopes: a message in flight to one or many recipients.
//!
//! A logical send to N recipients allocates exactly one envelope, re-queued
//! up to N times. The shared fan-out variant does not even store per-
//! recipient arrival ticks; it recomputes the current one on demand from the
//! sender, the send tick and a per-envelope seed, using the same fixed hash
//! that produced its recipient ordering. Envelopes dominate peak memory in
//! broadcast-heavy simulations, so keeping them this small is deliberate.

use crate::task::TaskKind;
use crate::{NodeId, Tick};

/// What an envelope carries: protocol traffic or an internal task.
pub(crate) enum Payload<M: 'static, N: 'static> {
    Msg(M),
    Task(TaskKind<M, N>),
}

/// Deterministic per-recipient dice roll in `[0, 99]` for shared fan-outs.
///
/// A splitmix64-style finalizer over the recipient id and the envelope seed.
/// It depends only on its inputs, never on call order, so the arrival
/// computed while sorting recipients and the one recomputed at delivery time
/// always agree.
pub(crate) fn fanout_delta(recipient: NodeId, seed: u64) -> u64 {
    let mut z = recipient
        .wrapping_add(seed)
        .wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^= z >> 31;
    z % 100
}

/// A message in flight, owned by the event queue while pending.
pub(crate) enum Envelope<M: 'static, N: 'static> {
    /// One precomputed arrival; exhausted after a single delivery.
    Single {
        payload: Payload<M, N>,
        from: NodeId,
        to: NodeId,
        arrival: Tick,
        done: bool,
    },
    /// Delay-free fan-out: recipients pre-sorted ascending by arrival, one
    /// seed instead of N stored latencies.
    Shared {
        payload: Payload<M, N>,
        from: NodeId,
        sent_at: Tick,
        recipients: Vec<NodeId>,
        seed: u64,
        cursor: usize,
    },
    /// Staggered fan-out: sends spaced by an inter-message delay, one
    /// precomputed arrival per recipient, sorted ascending.
    Staggered {
        payload: Payload<M, N>,
        from: NodeId,
        recipients: Vec<(NodeId, Tick)>,
        cursor: usize,
    },
}

impl<M: 'static, N: 'static> Envelope<M, N> {
    pub(crate) fn single(payload: Payload<M, N>, from: NodeId, to: NodeId, arrival: Tick) -> Self {
        Self::Single {
            payload,
            from,
            to,
            arrival,
            done: false,
        }
    }

    /// `recipients` must already be sorted ascending by the arrival tick
    /// that [`fanout_delta`] and the latency model assign them.
    pub(crate) fn shared(
        payload: Payload<M, N>,
        from: NodeId,
        sent_at: Tick,
        recipients: Vec<NodeId>,
        seed: u64,
    ) -> Self {
        debug_assert!(!recipients.is_empty());
        Self::Shared {
            payload,
            from,
            sent_at,
            recipients,
            seed,
            cursor: 0,
        }
    }

    /// `recipients` must already be sorted ascending by arrival tick.
    pub(crate) fn staggered(
        payload: Payload<M, N>,
        from: NodeId,
        recipients: Vec<(NodeId, Tick)>,
    ) -> Self {
        debug_assert!(!recipients.is_empty());
        debug_assert!(recipients.is_sorted_by_key(|&(_, arrival)| arrival));
        Self::Staggered {
            payload,
            from,
            recipients,
            cursor: 0,
        }
    }

    pub(crate) fn sender(&self) -> NodeId {
        match self {
            Self::Single { from, .. } | Self::Shared { from, .. } | Self::Staggered { from, .. } => {
                *from
            }
        }
    }

    /// The recipient the envelope is currently in flight to.
    pub(crate) fn recipient(&self) -> NodeId {
        match self {
            Self::Single { to, .. } => *to,
            Self::Shared {
                recipients, cursor, ..
            } => recipients[*cursor],
            Self::Staggered {
                recipients, cursor, ..
            } => recipients[*cursor].0,
        }
    }

    /// Arrival tick of the current recipient.
    ///
    /// The shared fan-out recomputes it through `latency`, which resolves
    /// `(from, to, delta)` to a latency in ticks; the other variants return
    /// their precomputed value.
    pub(crate) fn arrival_with<F>(&self, latency: F) -> Tick
    where
        F: FnOnce(NodeId, NodeId, u64) -> Tick,
    {
        match self {
            Self::Single { arrival, .. } => *arrival,
            Self::Shared {
                from,
                sent_at,
                recipients,
                seed,
                cursor,
                ..
            } => {
                let to = recipients[*cursor];
                sent_at
                    .checked_add(latency(*from, to, fanout_delta(to, *seed)))
                    .expect("arrival tick overflows the clock")
            }
            Self::Staggered {
                recipients, cursor, ..
            } => recipients[*cursor].1,
        }
    }

    /// True while at least one recipient has not been visited.
    pub(crate) fn has_more(&self) -> bool {
        match self {
            Self::Single { done, .. } => !done,
            Self::Shared {
                recipients, cursor, ..
            } => *cursor < recipients.len(),
            Self::Staggered {
                recipients, cursor, ..
            } => *cursor < recipients.len(),
        }
    }

    /// Moves the recipient cursor forward. The cursor only ever advances.
    pub(crate) fn advance(&mut self) {
        match self {
            Self::Single { done, .. } => *done = true,
            Self::Shared { cursor, .. } | Self::Staggered { cursor, .. } => *cursor += 1,
        }
    }

    /// Re-arms a single-recipient envelope for a later tick. Used by
    /// periodic tasks, which reuse their envelope for every firing.
    pub(crate) fn reschedule(&mut self, arrival: Tick) {
        match self {
            Self::Single {
                arrival: a, done, ..
            } => {
                *a = arrival;
                *done = false;
            }
            _ => unreachable!("only single-recipient envelopes reschedule"),
        }
    }

    pub(crate) fn payload_mut(&mut self) -> &mut Payload<M, N> {
        match self {
            Self::Single { payload, .. }
            | Self::Shared { payload, .. }
            | Self::Staggered { payload, .. } => payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(tag: u64) -> Payload<u64, ()> {
        Payload::Msg(tag)
    }

    #[test]
    fn basic() {
        let mut env: Envelope<u64, ()> = Envelope::single(msg(7), 1, 2, 10);
        assert_eq!(env.sender(), 1);
        assert_eq!(env.recipient(), 2);
        assert_eq!(env.arrival_with(|_, _, _| unreachable!()), 10);
        assert!(env.has_more());
        env.advance();
        assert!(!env.has_more());
    }

    #[test]
    fn fanout_delta_is_in_range_and_order_independent() {
        let seed = 0xdead_beef;
        let forward: Vec<u64> = (0..1000).map(|id| fanout_delta(id, seed)).collect();
        let backward: Vec<u64> = (0..1000).rev().map(|id| fanout_delta(id, seed)).collect();
        assert!(forward.iter().all(|&d| d < 100));
        assert_eq!(forward, backward.into_iter().rev().collect::<Vec<_>>());
        // not degenerate: at least half of the possible values show up
        let mut seen = [false; 100];
        for &d in &forward {
            seen[d as usize] = true;
        }
        assert!(seen.iter().filter(|&&s| s).count() > 50);
    }

    #[test]
    fn shared_envelope_recomputes_arrivals() {
        let seed = 99;
        let mut recipients = vec![3, 4, 5];
        recipients.sort_by_key(|&to| fanout_delta(to, seed));
        let mut env: Envelope<u64, ()> = Envelope::shared(msg(1), 0, 100, recipients.clone(), seed);

        for &to in &recipients {
            assert_eq!(env.recipient(), to);
            let arrival = env.arrival_with(|from, _, delta| {
                assert_eq!(from, 0);
                delta
            });
            assert_eq!(arrival, 100 + fanout_delta(to, seed));
            env.advance();
        }
        assert!(!env.has_more());
    }

    #[test]
    fn n_advances_exhaust_an_n_recipient_envelope() {
        let recipients: Vec<(u64, Tick)> = (0..5).map(|i| (i, 10 + i)).collect();
        let mut env: Envelope<u64, ()> = Envelope::staggered(msg(2), 9, recipients);
        for _ in 0..5 {
            assert!(env.has_more());
            env.advance();
        }
        assert!(!env.has_more());
    }
}
