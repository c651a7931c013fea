// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end reproducibility checks over the public API.
//!
//! Two runs with the same seed must produce bit-identical histories, down
//! to per-node traffic counters and gossip hook order, even with every
//! source of randomness in play (positions, node aspects, latency rolls,
//! fan-out ordering and peer shuffling).

use foehn::node::{ExtraLatency, ParetoSpeed};
use foehn::{
    FloodMessage, FloodState, GossipNode, Network, NodeBuilder, PeerGraph, UniformLatency,
};

#[derive(Debug, Default)]
struct ProtocolState {
    flood: FloodState,
    hooked: Vec<u64>,
}

impl GossipNode<u64> for ProtocolState {
    fn flood_state(&mut self) -> &mut FloodState {
        &mut self.flood
    }

    fn on_gossip(&mut self, payload: &u64) {
        self.hooked.push(*payload);
    }
}

type NodeTrace = ((u32, u32), u64, u64, u64, u64, Vec<u64>);

/// Runs a gossip workload and returns its full observable history.
fn run_once(seed: u64) -> (u64, Vec<NodeTrace>) {
    const NODES: u64 = 30;

    let mut net: Network<FloodMessage<u64>, ProtocolState> = Network::new(seed);
    let mut builder = NodeBuilder::new()
        .aspect(ParetoSpeed::new(3.0))
        .aspect(ExtraLatency {
            probability: 0.2,
            max: 30,
        });
    for _ in 0..NODES {
        net.add_node(&mut builder, ProtocolState::default());
    }
    net.set_latency_model(UniformLatency::new(200));

    let graph = PeerGraph::with_avg_degree(NODES, 6, net.rng());
    for id in 0..NODES {
        let peers = graph.peers_of(id).to_vec();
        net.state_mut(id).flood.set_peers(peers);
    }

    // node 0 floods a fresh identifier every half second until the clock
    // hits two seconds
    let mut next_id = 0;
    net.register_periodic_task(
        500,
        500,
        0,
        |net, _| net.time() < 2000,
        move |net, id| {
            let msg = FloodMessage::versioned(next_id, next_id, next_id, 200).with_delays(10, 5);
            net.send(msg, id, id);
            next_id += 1;
        },
    );

    net.run_ms(5000);

    let nodes = (0..NODES)
        .map(|id| {
            let node = net.node(id);
            (
                node.position(),
                node.msg_sent(),
                node.msg_received(),
                node.bytes_sent(),
                node.bytes_received(),
                net.state(id).hooked.clone(),
            )
        })
        .collect();
    (net.time(), nodes)
}

#[test]
fn same_seed_same_history() {
    assert_eq!(run_once(1), run_once(1));
}

#[test]
fn different_seeds_diverge() {
    assert_ne!(run_once(1), run_once(2));
}

#[test]
fn periodic_floods_fire_on_schedule() {
    let (_, nodes) = run_once(1);
    // four launches at ticks 500 through 2000, self-delivered first
    assert_eq!(nodes[0].5, vec![0, 1, 2, 3]);
}
