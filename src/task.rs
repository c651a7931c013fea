// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Boxed effects and predicates backing the task-scheduling primitives.
//!
//! One-shot and periodic tasks ride the event queue as zero-size envelopes a
//! node addresses to itself. Conditional tasks never enter the queue; they
//! wait in a side list the engine walks on idle ticks.

use crate::network::Network;
use crate::{NodeId, Tick};

/// An effect run on behalf of the node that scheduled it.
pub(crate) type Effect<M, N> = Box<dyn FnMut(&mut Network<M, N>, NodeId)>;

/// A read-only check against the current simulation state.
pub(crate) type Predicate<M, N> = Box<dyn Fn(&Network<M, N>, NodeId) -> bool>;

/// Payload of a task envelope.
pub(crate) enum TaskKind<M: 'static, N: 'static> {
    /// Runs once at its scheduled tick.
    Once(Effect<M, N>),
    /// Runs, then reschedules itself at `now + period` while `keep_running`
    /// holds. The first failed check stops the task permanently.
    Periodic {
        effect: Effect<M, N>,
        period: Tick,
        keep_running: Predicate<M, N>,
    },
}

/// A task evaluated on idle ticks only, outside the event queue.
///
/// Eligibility starts at the minimum-start tick and moves to
/// `now + duration` after every successful run. Ordinary traffic can delay
/// a run arbitrarily, since busy ticks skip the side list entirely.
pub(crate) struct ConditionalTask<M: 'static, N: 'static> {
    pub(crate) owner: NodeId,
    pub(crate) next_eligible: Tick,
    pub(crate) duration: Tick,
    pub(crate) start_if: Predicate<M, N>,
    pub(crate) repeat_if: Predicate<M, N>,
    pub(crate) effect: Effect<M, N>,
}
