// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Geography-flavored latency on the toroidal map.

use crate::latency::LatencyModel;
use crate::node::{self, Node};
use crate::Tick;

/// Default shape parameter of the jitter distribution.
const GPD_SHAPE: f64 = 0.25;
/// Default scale parameter of the jitter distribution.
const GPD_SCALE: f64 = 5.0;
/// Default location parameter of the jitter distribution.
const GPD_LOCATION: f64 = -3.0;

/// Latency proportional to toroidal distance plus heavy-tailed jitter.
///
/// The base term scales the distance between the two nodes so that the
/// farthest possible pair on the map sees `base_max` ticks. On top of that,
/// the delta picks a per-percent jitter offset from a Generalized Pareto
/// quantile table precomputed at construction. The defaults give most
/// messages a few ticks of spread with a long tail of stragglers.
#[derive(Clone, Debug)]
pub struct DistanceLatency {
    base_max: Tick,
    jitter: [i64; 100],
}

impl DistanceLatency {
    /// Distance model with the default jitter parameters.
    #[must_use]
    pub fn new(base_max: Tick) -> Self {
        Self::with_jitter(base_max, GPD_SHAPE, GPD_SCALE, GPD_LOCATION)
    }

    /// Distance model with explicit Generalized Pareto jitter parameters.
    #[must_use]
    pub fn with_jitter(base_max: Tick, shape: f64, scale: f64, location: f64) -> Self {
        debug_assert!(shape > 0.0);
        debug_assert!(scale > 0.0);
        let mut jitter = [0; 100];
        for (i, entry) in jitter.iter_mut().enumerate() {
            // quantile at the middle of the i-th percent slot
            let p = (i as f64 + 0.5) / 100.0;
            let q = location + scale * ((1.0 - p).powf(-shape) - 1.0) / shape;
            *entry = q.round() as i64;
        }
        Self { base_max, jitter }
    }
}

impl Default for DistanceLatency {
    fn default() -> Self {
        Self::new(150)
    }
}

impl LatencyModel for DistanceLatency {
    fn latency(&self, from: &Node, to: &Node, delta: u64) -> Tick {
        if from.id() == to.id() {
            return 1;
        }
        let base = from.distance_to(to) / node::max_distance() * self.base_max as f64;
        let ms = base.round() as i64 + self.jitter[delta as usize];
        ms.max(1) as Tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeBuilder;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn basic() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut builder =
            NodeBuilder::with_positions(vec![(10, 500), (1990, 500), (1000, 500)]);
        let close_a = builder.build(&mut rng);
        let close_b = builder.build(&mut rng);
        let far = builder.build(&mut rng);

        let model = DistanceLatency::default();
        for delta in 0..100 {
            assert!(model.latency(&close_a, &close_b, delta) >= 1);
            assert!(model.latency(&close_a, &far, delta) >= 1);
        }
        assert_eq!(model.latency(&far, &far, 7), 1);
    }

    #[test]
    fn distance_wraps_around_the_map_edge() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut builder =
            NodeBuilder::with_positions(vec![(10, 500), (1990, 500), (1000, 500)]);
        let west = builder.build(&mut rng);
        let east = builder.build(&mut rng);
        let center = builder.build(&mut rng);

        let model = DistanceLatency::default();
        // west and east are 20 apart across the wrap, not 1980
        assert!(model.latency(&west, &east, 50) < model.latency(&west, &center, 50));
    }

    #[test]
    fn jitter_tail_slows_unlucky_deltas() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut builder = NodeBuilder::with_positions(vec![(0, 0), (1000, 500)]);
        let a = builder.build(&mut rng);
        let b = builder.build(&mut rng);

        let model = DistanceLatency::default();
        assert!(model.latency(&a, &b, 99) > model.latency(&a, &b, 0));
    }
}
