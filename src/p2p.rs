// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Peer-to-peer overlays and flood dissemination.
//!
//! A [`PeerGraph`] is a symmetric link set over the nodes of a network,
//! built either to an average or a strict minimum degree. On top of it,
//! [`FloodMessage`] implements the classic gossip pattern: remember what you
//! have seen, fire a hook on news, re-broadcast to everyone but whoever told
//! you.

use std::collections::{BTreeSet, HashMap};

use log::trace;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

use crate::network::{Message, Network};
use crate::{NodeId, Tick};

/// Symmetric peer links over a fixed set of nodes.
///
/// Links are canonicalized as `(min, max)` pairs, so duplicates and self
/// links cannot exist. The per-node peer lists are kept alongside the link
/// set for O(1) lookup.
pub struct PeerGraph {
    links: BTreeSet<(NodeId, NodeId)>,
    peers: Vec<Vec<NodeId>>,
}

impl PeerGraph {
    /// Peer count every node is topped up to after random linking.
    const MIN_PEERS: usize = 3;

    /// An empty graph over `nodes` nodes, for manual wiring.
    #[must_use]
    pub fn new(nodes: u64) -> Self {
        Self {
            links: BTreeSet::new(),
            peers: vec![Vec::new(); nodes as usize],
        }
    }

    /// Random graph averaging `degree` links per node.
    ///
    /// Links random pairs until the edge count reaches `nodes * degree / 2`,
    /// then tops every node up to at least [`Self::MIN_PEERS`] peers.
    pub fn with_avg_degree(nodes: u64, degree: usize, rng: &mut dyn RngCore) -> Self {
        assert!(
            nodes > Self::MIN_PEERS as u64,
            "graph needs more than {} nodes",
            Self::MIN_PEERS
        );
        assert!(
            (degree as u64) < nodes,
            "average degree must be below the node count"
        );
        let mut graph = Self::new(nodes);
        let target = nodes as usize * degree / 2;
        while graph.links.len() < target {
            let a = rng.random_range(0..nodes);
            let b = rng.random_range(0..nodes);
            if a != b {
                graph.add_link(a, b);
            }
        }
        graph.top_up(Self::MIN_PEERS, rng);
        graph
    }

    /// Random graph where every node gets at least `degree` peers.
    pub fn with_min_degree(nodes: u64, degree: usize, rng: &mut dyn RngCore) -> Self {
        assert!(
            (degree as u64) < nodes,
            "minimum degree must be below the node count"
        );
        let mut graph = Self::new(nodes);
        graph.top_up(degree.max(Self::MIN_PEERS), rng);
        graph
    }

    fn top_up(&mut self, min: usize, rng: &mut dyn RngCore) {
        let nodes = self.peers.len() as u64;
        for a in 0..nodes {
            while self.peers[a as usize].len() < min {
                let b = rng.random_range(0..nodes);
                if b != a {
                    self.add_link(a, b);
                }
            }
        }
    }

    /// Links two distinct nodes. False if the link already exists or `a`
    /// and `b` are the same node.
    pub fn add_link(&mut self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return false;
        }
        if !self.links.insert(Self::canonical(a, b)) {
            return false;
        }
        self.peers[a as usize].push(b);
        self.peers[b as usize].push(a);
        true
    }

    /// Removes a link in either orientation. False if it did not exist.
    pub fn remove_link(&mut self, a: NodeId, b: NodeId) -> bool {
        if !self.links.remove(&Self::canonical(a, b)) {
            return false;
        }
        self.peers[a as usize].retain(|&peer| peer != b);
        self.peers[b as usize].retain(|&peer| peer != a);
        true
    }

    #[must_use]
    pub fn peers_of(&self, id: NodeId) -> &[NodeId] {
        &self.peers[id as usize]
    }

    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// All links as canonical `(low, high)` pairs, in sorted order.
    pub fn links(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.links.iter().copied()
    }

    fn canonical(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
        (a.min(b), a.max(b))
    }
}

/// Per-node dedup store for flood messages.
///
/// Keeps a single best-version slot per identifier. A strictly newer
/// sequence number replaces the record; an equal or older one is ignored.
#[derive(Clone, Debug, Default)]
pub struct FloodState {
    peers: Vec<NodeId>,
    seen: HashMap<u64, u64>,
}

impl FloodState {
    /// Installs this node's peer list, usually copied from a [`PeerGraph`].
    pub fn set_peers(&mut self, peers: Vec<NodeId>) {
        self.peers = peers;
    }

    #[must_use]
    pub fn peers(&self) -> &[NodeId] {
        &self.peers
    }

    /// Records a sighting. True exactly when this is the first sighting of
    /// the identifier or a strictly newer sequence, i.e. when the message
    /// should be acted on and forwarded.
    pub fn record(&mut self, identifier: u64, seq: u64) -> bool {
        match self.seen.get_mut(&identifier) {
            Some(best) if *best >= seq => false,
            Some(best) => {
                *best = seq;
                true
            }
            None => {
                self.seen.insert(identifier, seq);
                true
            }
        }
    }

    /// The best sequence seen for an identifier, if any.
    #[must_use]
    pub fn best_seen(&self, identifier: u64) -> Option<u64> {
        self.seen.get(&identifier).copied()
    }

    /// Number of identifiers with a recorded sighting.
    #[must_use]
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

/// Per-node state that can take part in flooding.
pub trait GossipNode<P> {
    fn flood_state(&mut self) -> &mut FloodState;

    /// Hook fired on the first or a strictly newer sighting of an
    /// identifier, before the message is forwarded.
    fn on_gossip(&mut self, _payload: &P) {}
}

/// A payload flooded through the peer overlay.
///
/// Plain floods use sequence number 0; versioned floods bump it so newer
/// revisions of the same identifier replace older ones mid-flight.
#[derive(Clone, Debug)]
pub struct FloodMessage<P> {
    identifier: u64,
    seq: u64,
    payload: P,
    size: usize,
    think_ms: Tick,
    stagger_ms: Tick,
}

impl<P: Clone + 'static> FloodMessage<P> {
    /// A plain flood message (sequence 0).
    #[must_use]
    pub fn new(identifier: u64, payload: P, size: usize) -> Self {
        Self::versioned(identifier, 0, payload, size)
    }

    /// A versioned flood message.
    #[must_use]
    pub fn versioned(identifier: u64, seq: u64, payload: P, size: usize) -> Self {
        Self {
            identifier,
            seq,
            payload,
            size,
            think_ms: 0,
            stagger_ms: 0,
        }
    }

    /// Sets the per-hop think delay and the per-peer stagger delay.
    ///
    /// The think delay is scaled by each forwarding node's speed ratio.
    #[must_use]
    pub fn with_delays(mut self, think_ms: Tick, stagger_ms: Tick) -> Self {
        self.think_ms = think_ms;
        self.stagger_ms = stagger_ms;
        self
    }

    #[must_use]
    pub fn identifier(&self) -> u64 {
        self.identifier
    }

    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[must_use]
    pub fn payload(&self) -> &P {
        &self.payload
    }

    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.size
    }

    /// Handles this message's arrival at `to`: dedup, hook, re-broadcast.
    ///
    /// Forwards to all of the node's peers except the sender, in shuffled
    /// order, after the node's scaled think delay. Call this from the
    /// [`Message::deliver`] arm of any message type wrapping a flood.
    pub fn receive<M, N>(&self, net: &mut Network<M, N>, from: NodeId, to: NodeId)
    where
        M: Message<N> + From<FloodMessage<P>>,
        N: GossipNode<P> + 'static,
    {
        let state = net.state_mut(to);
        if !state.flood_state().record(self.identifier, self.seq) {
            trace!("node {to} ignoring flood {} seq {}", self.identifier, self.seq);
            return;
        }
        state.on_gossip(&self.payload);
        let mut peers: Vec<NodeId> = state
            .flood_state()
            .peers()
            .iter()
            .copied()
            .filter(|&peer| peer != from)
            .collect();
        if peers.is_empty() {
            return;
        }
        peers.shuffle(net.rng());
        let think = net.node(to).scaled_delay(self.think_ms);
        let sent_at = net
            .time()
            .checked_add(think)
            .expect("tick arithmetic overflows the clock");
        net.send_with_delay(M::from(self.clone()), sent_at, to, &peers, self.stagger_ms);
    }
}

impl<P: Clone + 'static, N: GossipNode<P> + 'static> Message<N> for FloodMessage<P> {
    fn deliver(&self, net: &mut Network<Self, N>, from: NodeId, to: NodeId) {
        self.receive(net, from, to);
    }

    fn size_bytes(&self) -> usize {
        self.size
    }
}
