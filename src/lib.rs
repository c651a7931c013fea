// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Foehn: deterministic discrete-event simulation kernel for distributed protocols.
//!
//! A simulation is a [`Network`] of [`Node`]s driven tick by tick (one tick is
//! one simulated millisecond). Protocols plug in a message type implementing
//! [`Message`] and per-node state, send through the engine, and get
//! bit-for-bit reproducible runs from a single seed: all randomness funnels
//! through one PRNG owned by the network, message arrival times come from a
//! pluggable [`LatencyModel`], and equal-tick deliveries follow a fixed
//! most-recently-inserted-first order.

#![deny(rustdoc::broken_intra_doc_links)]

mod envelope;
pub mod latency;
pub mod logging;
pub mod network;
pub mod node;
pub mod p2p;
mod queue;
mod task;
#[cfg(test)]
pub mod test_utils;

use static_assertions::const_assert_eq;

pub use self::latency::cities::CityLatency;
pub use self::latency::distance::DistanceLatency;
pub use self::latency::measured::MeasuredLatency;
pub use self::latency::{FixedLatency, LatencyError, LatencyModel, UniformLatency, estimate_latency};
pub use self::network::{Message, Network};
pub use self::node::{Aspect, Node, NodeBuilder};
pub use self::p2p::{FloodMessage, FloodState, GossipNode, PeerGraph};

// NOTE: In many places we assume that `usize` is 64 bits wide.
// So, for now, we only support 64-bit architectures.
const_assert_eq!(std::mem::size_of::<usize>(), 8);

/// Node ID number type.
///
/// IDs are dense: a network of `n` nodes uses exactly `0..n`.
pub type NodeId = u64;

/// Simulated time in milliseconds since the start of the run.
pub type Tick = u64;

/// Upper bound on the simulated clock.
///
/// Leaves enough headroom that window and arrival arithmetic cannot wrap.
/// Driving a simulation past this bound panics instead of wrapping silently.
pub const MAX_TICK: Tick = u64::MAX / 4;

/// Minimal no-op message for tests and benchmarks.
///
/// Delivery has no effect, so it exercises only the kernel itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PingMessage {
    size: usize,
}

impl PingMessage {
    #[must_use]
    pub const fn new(size: usize) -> Self {
        Self { size }
    }
}

impl Default for PingMessage {
    fn default() -> Self {
        Self::new(256)
    }
}

impl<N: 'static> Message<N> for PingMessage {
    fn deliver(&self, _net: &mut Network<Self, N>, _from: NodeId, _to: NodeId) {}

    fn size_bytes(&self) -> usize {
        self.size
    }
}

/// Creates a [`Network`] of stateless nodes for testing and benchmarking purposes.
///
/// This code lives here to enable sharing between different testing and benchmarking.
/// It should not be used in production code.
#[must_use]
pub fn create_test_network(seed: u64, nodes: u64) -> Network<PingMessage, ()> {
    let mut net = Network::new(seed);
    let mut builder = NodeBuilder::new();
    for _ in 0..nodes {
        net.add_node(&mut builder, ());
    }
    net
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic() {
        let mut net = create_test_network(42, 10);
        assert_eq!(net.node_count(), 10);
        assert_eq!(net.time(), 0);
        assert!(!net.has_pending_messages());

        net.send(PingMessage::default(), 0, 1);
        assert!(net.has_pending_messages());
        net.run_ms(10);
        assert!(!net.has_pending_messages());
        assert_eq!(net.time(), 10);
    }
}
