// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Empirical latency distributions measured on real networks.

use crate::latency::{LatencyError, LatencyModel};
use crate::node::Node;
use crate::Tick;

/// Latency model backed by a dense 100-slot lookup table.
///
/// Built from a bucketed distribution: `proportions[i]` percent of messages
/// experience up to `values[i]` ticks. Slot `d` of the expanded table holds
/// roughly the latency below which `d` percent of samples fall, with values
/// ramping linearly inside each bucket, so a dice roll in `[0, 99]` indexes
/// the distribution in O(1).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeasuredLatency {
    table: [Tick; 100],
}

impl MeasuredLatency {
    /// Expands a bucketed distribution into the dense lookup table.
    ///
    /// Rejects the distribution unless its proportions are all nonzero and
    /// sum to exactly 100, which is what guarantees the table fills all 100
    /// slots.
    pub fn from_distribution(
        proportions: &[u64],
        values: &[Tick],
    ) -> Result<Self, LatencyError> {
        if proportions.len() != values.len() {
            return Err(LatencyError::MismatchedLengths {
                props: proportions.len(),
                values: values.len(),
            });
        }
        if proportions.is_empty() {
            return Err(LatencyError::EmptyDistribution);
        }
        let sum: u64 = proportions.iter().sum();
        if sum != 100 {
            return Err(LatencyError::BadProportionSum(sum));
        }

        let mut table = [0; 100];
        let mut slot = 0;
        let mut cur: i64 = 0;
        for (i, (&prop, &value)) in proportions.iter().zip(values).enumerate() {
            if prop == 0 {
                return Err(LatencyError::ZeroProportion(i));
            }
            let step = (value as i64 - cur) / prop as i64;
            for _ in 0..prop {
                cur += step;
                table[slot] = cur.max(0) as Tick;
                slot += 1;
            }
        }
        debug_assert_eq!(slot, 100);
        Ok(Self { table })
    }

    /// The expanded per-percent lookup table.
    #[must_use]
    pub fn table(&self) -> &[Tick; 100] {
        &self.table
    }
}

impl LatencyModel for MeasuredLatency {
    fn latency(&self, from: &Node, to: &Node, delta: u64) -> Tick {
        if from.id() == to.id() {
            return 1;
        }
        self.table[delta as usize].max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::build_nodes;

    #[test]
    fn basic() {
        let model = MeasuredLatency::from_distribution(&[10, 90], &[10, 100]).unwrap();
        assert_eq!(model.table().len(), 100);
        // each bucket ramps linearly up to its value
        assert_eq!(model.table()[0], 1);
        assert_eq!(model.table()[9], 10);
        assert_eq!(model.table()[99], 100);
        assert!(model.table().is_sorted());

        let nodes = build_nodes(2, 5);
        for delta in 0..100 {
            assert!(model.latency(&nodes[0], &nodes[1], delta) >= 1);
        }
        assert_eq!(model.latency(&nodes[1], &nodes[1], 42), 1);
    }

    #[test]
    fn rejects_proportions_not_summing_to_100() {
        let proportions = [16, 18, 17, 12, 8, 5, 4, 3, 3, 1, 1, 2, 1, 1, 7];
        let values: Vec<Tick> = (1..=15).map(|i| i * 20).collect();
        match MeasuredLatency::from_distribution(&proportions, &values) {
            Err(LatencyError::BadProportionSum(99)) => {}
            other => panic!("expected a proportion-sum rejection, got {other:?}"),
        }
    }

    #[test]
    fn accepts_exact_sum_and_fills_every_slot() {
        let proportions = [16, 18, 17, 12, 8, 5, 4, 3, 3, 1, 1, 2, 1, 1, 8];
        let values: Vec<Tick> = (1..=15).map(|i| i * 20).collect();
        let model = MeasuredLatency::from_distribution(&proportions, &values).unwrap();
        assert_eq!(model.table().len(), 100);
        assert!(model.table().iter().all(|&ms| ms >= 1));
        assert!(model.table().is_sorted());
    }

    #[test]
    fn rejects_zero_proportions() {
        match MeasuredLatency::from_distribution(&[50, 0, 50], &[10, 20, 30]) {
            Err(LatencyError::ZeroProportion(1)) => {}
            other => panic!("expected a zero-proportion rejection, got {other:?}"),
        }
    }

    #[test]
    fn rejects_mismatched_lengths() {
        assert!(matches!(
            MeasuredLatency::from_distribution(&[100], &[10, 20]),
            Err(LatencyError::MismatchedLengths { props: 1, values: 2 })
        ));
    }

    #[test]
    fn rejects_empty_distributions() {
        assert!(matches!(
            MeasuredLatency::from_distribution(&[], &[]),
            Err(LatencyError::EmptyDistribution)
        ));
    }
}
