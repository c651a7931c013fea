// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Utility types and functions for tests and benchmarks.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::network::{Message, Network};
use crate::node::{Node, NodeBuilder};
use crate::p2p::{FloodMessage, FloodState, GossipNode};
use crate::{NodeId, Tick};

/// A small protocol message covering the common delivery shapes.
#[derive(Clone, Debug)]
pub enum TestMsg {
    /// Effect-free message of a configurable wire size.
    Ping { size: usize },
    /// Logs `(sender, arrival tick, tag)` at the recipient.
    Trace { tag: u64 },
    /// A flood, for gossip embedded in a larger protocol enum.
    Flood(FloodMessage<u64>),
}

impl From<FloodMessage<u64>> for TestMsg {
    fn from(msg: FloodMessage<u64>) -> Self {
        Self::Flood(msg)
    }
}

impl Message<TestState> for TestMsg {
    fn deliver(&self, net: &mut Network<Self, TestState>, from: NodeId, to: NodeId) {
        match self {
            Self::Ping { .. } => {}
            Self::Trace { tag } => {
                let now = net.time();
                net.state_mut(to).log.push((from, now, *tag));
            }
            Self::Flood(msg) => msg.receive(net, from, to),
        }
    }

    fn size_bytes(&self) -> usize {
        match self {
            Self::Ping { size } => *size,
            Self::Trace { .. } => 8,
            Self::Flood(msg) => msg.size_bytes(),
        }
    }
}

/// Per-node protocol state recording what was delivered to it.
#[derive(Debug, Default)]
pub struct TestState {
    /// One `(sender, arrival tick, tag)` entry per trace delivery.
    pub log: Vec<(NodeId, Tick, u64)>,
    pub flood: FloodState,
}

impl GossipNode<u64> for TestState {
    fn flood_state(&mut self) -> &mut FloodState {
        &mut self.flood
    }
}

/// Builds `count` randomly placed nodes from a seeded PRNG.
#[must_use]
pub fn build_nodes(count: u64, seed: u64) -> Vec<Node> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut builder = NodeBuilder::new();
    (0..count).map(|_| builder.build(&mut rng)).collect()
}

/// A network of `count` randomly placed nodes with the default latency.
#[must_use]
pub fn test_network(seed: u64, count: u64) -> Network<TestMsg, TestState> {
    let mut net = Network::new(seed);
    let mut builder = NodeBuilder::new();
    for _ in 0..count {
        net.add_node(&mut builder, TestState::default());
    }
    net
}

/// A network with one node per given map position.
#[must_use]
pub fn positioned_network(seed: u64, positions: Vec<(u32, u32)>) -> Network<TestMsg, TestState> {
    let count = positions.len();
    let mut net = Network::new(seed);
    let mut builder = NodeBuilder::with_positions(positions);
    for _ in 0..count {
        net.add_node(&mut builder, TestState::default());
    }
    net
}
