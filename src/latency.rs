// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Pluggable network latency models.
//!
//! A model is a pure function from `(sender, recipient, delta)` to a one-way
//! latency in whole milliseconds, where `delta` is a dice roll in `[0, 99]`
//! supplied by the engine. Purity is what keeps fan-out envelopes cheap: the
//! engine can recompute an arrival instead of storing it, and both
//! computations agree by construction.
//!
//! Provided models:
//! - [`FixedLatency`]: one constant for every pair.
//! - [`UniformLatency`]: `delta` mapped linearly onto `[0, max]`.
//! - [`DistanceLatency`]: toroidal map distance plus heavy-tailed jitter.
//! - [`MeasuredLatency`]: dense 100-slot empirical distribution.
//! - [`CityLatency`]: pairwise city tables with symmetric lookup.

pub mod cities;
pub mod distance;
pub mod measured;

use rand::Rng;
use thiserror::Error;

use crate::node::Node;
use crate::Tick;

pub use cities::CityLatency;
pub use distance::DistanceLatency;
pub use measured::MeasuredLatency;

/// Errors while constructing a latency model from user-supplied data.
#[derive(Debug, Error)]
pub enum LatencyError {
    #[error("distribution proportions sum to {0}, expected exactly 100")]
    BadProportionSum(u64),
    #[error("distribution has {props} proportions but {values} values")]
    MismatchedLengths { props: usize, values: usize },
    #[error("distribution proportion at index {0} is zero")]
    ZeroProportion(usize),
    #[error("distribution is empty")]
    EmptyDistribution,
    #[error("latency table contains no city pairs")]
    EmptyTable,
    #[error("failed to read latency table: {0}")]
    Csv(#[from] csv::Error),
}

/// Strategy object resolving per-message network latency.
///
/// Contract, relied on for tick monotonicity:
/// - the returned latency is at least 1 tick, never 0;
/// - two nodes with the same id (i.e. the same node) always resolve to
///   exactly 1 tick;
/// - the result is a pure function of the two nodes and `delta`.
pub trait LatencyModel {
    /// One-way latency in ticks for a message from `from` to `to`, given a
    /// dice roll `delta` in `[0, 99]`.
    fn latency(&self, from: &Node, to: &Node, delta: u64) -> Tick;
}

/// The same latency for every distinct pair of nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedLatency {
    ms: Tick,
}

impl FixedLatency {
    /// # Panics
    ///
    /// Panics if `ms` is zero.
    #[must_use]
    pub fn new(ms: Tick) -> Self {
        assert!(ms >= 1, "latency must be at least 1 tick");
        Self { ms }
    }
}

impl Default for FixedLatency {
    fn default() -> Self {
        Self::new(1)
    }
}

impl LatencyModel for FixedLatency {
    fn latency(&self, from: &Node, to: &Node, _delta: u64) -> Tick {
        if from.id() == to.id() { 1 } else { self.ms }
    }
}

/// Latency uniform over `[1, max]`, driven entirely by the dice roll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformLatency {
    max: Tick,
}

impl UniformLatency {
    /// # Panics
    ///
    /// Panics if `max` is zero.
    #[must_use]
    pub fn new(max: Tick) -> Self {
        assert!(max >= 1, "latency must be at least 1 tick");
        Self { max }
    }
}

impl LatencyModel for UniformLatency {
    fn latency(&self, from: &Node, to: &Node, delta: u64) -> Tick {
        if from.id() == to.id() {
            return 1;
        }
        // delta * max overflows u64 for large max
        let ms = (u128::from(delta) * u128::from(self.max) / 99) as Tick;
        ms.max(1)
    }
}

/// Estimates any model's latency distribution by sampling it.
///
/// Draws `rounds` random pairs of distinct nodes, sweeps the dice roll
/// deterministically over all 100 values, and buckets the sorted results
/// back into a [`MeasuredLatency`] with one percent per slot. Estimating a
/// [`MeasuredLatency`] built from a non-decreasing table reproduces that
/// table exactly.
///
/// # Panics
///
/// Panics if `rounds` is not a positive multiple of 100 or `nodes` holds
/// fewer than two nodes.
pub fn estimate_latency<R: Rng + ?Sized>(
    model: &dyn LatencyModel,
    nodes: &[Node],
    rounds: usize,
    rng: &mut R,
) -> Result<MeasuredLatency, LatencyError> {
    assert!(
        rounds > 0 && rounds % 100 == 0,
        "rounds must be a positive multiple of 100"
    );
    assert!(nodes.len() >= 2, "estimation needs at least two nodes");

    let mut samples = Vec::with_capacity(rounds);
    for i in 0..rounds {
        let a = rng.random_range(0..nodes.len());
        let mut b = rng.random_range(0..nodes.len());
        while b == a {
            b = rng.random_range(0..nodes.len());
        }
        samples.push(model.latency(&nodes[a], &nodes[b], (i % 100) as u64));
    }
    samples.sort_unstable();

    let per_slot = rounds / 100;
    let proportions = vec![1; 100];
    let values: Vec<Tick> = (0..100).map(|i| samples[(i + 1) * per_slot - 1]).collect();
    MeasuredLatency::from_distribution(&proportions, &values)
}
