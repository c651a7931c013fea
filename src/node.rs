// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Simulated nodes and topology construction.
//!
//! Nodes live on a toroidal rectangle, so distance wraps around both edges
//! and no region of the map is structurally more isolated than another.
//! Identity, position and per-node quirks are assigned exactly once by a
//! [`NodeBuilder`]; afterwards only the engine mutates a node (liveness and
//! traffic counters).

use std::sync::Arc;

use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

use crate::{NodeId, Tick};

/// Width of the toroidal map.
pub const MAP_WIDTH: u32 = 2000;
/// Height of the toroidal map.
pub const MAP_HEIGHT: u32 = 1000;

/// Largest possible distance between two points on the map.
#[must_use]
pub fn max_distance() -> f64 {
    f64::from(MAP_WIDTH / 2).hypot(f64::from(MAP_HEIGHT / 2))
}

/// A single simulated node.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    id: NodeId,
    x: u32,
    y: u32,
    hash: [u8; 32],
    city: Option<String>,
    speed_ratio: f64,
    extra_latency: Tick,
    down: bool,
    msg_sent: u64,
    msg_received: u64,
    bytes_sent: u64,
    bytes_received: u64,
}

impl Node {
    pub(crate) fn new(id: NodeId, x: u32, y: u32, city: Option<String>) -> Self {
        debug_assert!(x < MAP_WIDTH && y < MAP_HEIGHT);
        Self {
            id,
            x,
            y,
            hash: Sha256::digest(id.to_le_bytes()).into(),
            city,
            speed_ratio: 1.0,
            extra_latency: 0,
            down: false,
            msg_sent: 0,
            msg_received: 0,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn position(&self) -> (u32, u32) {
        (self.x, self.y)
    }

    /// SHA-256 hash of the node's id.
    #[must_use]
    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    #[must_use]
    pub fn city(&self) -> Option<&str> {
        self.city.as_deref()
    }

    /// Multiplier applied to this node's processing delays. Values above 1
    /// make the node slower than baseline.
    #[must_use]
    pub fn speed_ratio(&self) -> f64 {
        self.speed_ratio
    }

    pub fn set_speed_ratio(&mut self, ratio: f64) {
        debug_assert!(ratio > 0.0);
        self.speed_ratio = ratio;
    }

    /// Fixed extra latency added on top of the latency model for every
    /// message this node sends or receives.
    #[must_use]
    pub fn extra_latency(&self) -> Tick {
        self.extra_latency
    }

    pub fn set_extra_latency(&mut self, ms: Tick) {
        self.extra_latency = ms;
    }

    #[must_use]
    pub fn is_down(&self) -> bool {
        self.down
    }

    pub(crate) fn set_down(&mut self, down: bool) {
        self.down = down;
    }

    #[must_use]
    pub fn msg_sent(&self) -> u64 {
        self.msg_sent
    }

    #[must_use]
    pub fn msg_received(&self) -> u64 {
        self.msg_received
    }

    #[must_use]
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub(crate) fn record_sent(&mut self, bytes: u64) {
        self.msg_sent += 1;
        self.bytes_sent += bytes;
    }

    pub(crate) fn record_received(&mut self, bytes: u64) {
        self.msg_received += 1;
        self.bytes_received += bytes;
    }

    /// Distance to another node, wrapping around both map edges.
    #[must_use]
    pub fn distance_to(&self, other: &Node) -> f64 {
        let dx = self.x.abs_diff(other.x).min(MAP_WIDTH - self.x.abs_diff(other.x));
        let dy = self.y.abs_diff(other.y).min(MAP_HEIGHT - self.y.abs_diff(other.y));
        f64::from(dx).hypot(f64::from(dy))
    }

    /// A processing delay as experienced by this node, rounded up.
    #[must_use]
    pub fn scaled_delay(&self, delay: Tick) -> Tick {
        (delay as f64 * self.speed_ratio).ceil() as Tick
    }
}

enum PositionSource {
    /// Uniformly random on the map.
    Random,
    /// An explicit coordinate list, cycled in order.
    List { positions: Vec<(u32, u32)>, cursor: usize },
    /// City labels with fixed positions, assigned round-robin.
    Cities { cities: Vec<(String, (u32, u32))>, cursor: usize },
}

/// Assigns ids, positions and aspects to new nodes.
///
/// Ids are dense and monotonically increasing. The builder is a topology
/// "recipe": [`NodeBuilder::reset_clone`] produces a copy with a fresh id
/// counter so an equivalent topology can be replayed for repeated
/// experiments.
pub struct NodeBuilder {
    next_id: NodeId,
    source: PositionSource,
    aspects: Vec<Arc<dyn Aspect>>,
}

impl NodeBuilder {
    /// Builder placing nodes uniformly at random.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 0,
            source: PositionSource::Random,
            aspects: Vec::new(),
        }
    }

    /// Builder cycling through an explicit list of positions.
    #[must_use]
    pub fn with_positions(positions: Vec<(u32, u32)>) -> Self {
        assert!(!positions.is_empty(), "position list must not be empty");
        Self {
            next_id: 0,
            source: PositionSource::List { positions, cursor: 0 },
            aspects: Vec::new(),
        }
    }

    /// Builder assigning city labels and their positions round-robin.
    #[must_use]
    pub fn with_cities(cities: &[(&str, (u32, u32))]) -> Self {
        assert!(!cities.is_empty(), "city list must not be empty");
        let cities = cities
            .iter()
            .map(|&(name, pos)| (name.to_owned(), pos))
            .collect();
        Self {
            next_id: 0,
            source: PositionSource::Cities { cities, cursor: 0 },
            aspects: Vec::new(),
        }
    }

    /// Adds an aspect evaluated once per built node.
    #[must_use]
    pub fn aspect(mut self, aspect: impl Aspect + 'static) -> Self {
        self.aspects.push(Arc::new(aspect));
        self
    }

    /// Builds the next node, drawing any randomness from `rng`.
    pub fn build(&mut self, rng: &mut dyn RngCore) -> Node {
        let id = self.next_id;
        self.next_id += 1;
        let (x, y, city) = match &mut self.source {
            PositionSource::Random => (
                rng.random_range(0..MAP_WIDTH),
                rng.random_range(0..MAP_HEIGHT),
                None,
            ),
            PositionSource::List { positions, cursor } => {
                let (x, y) = positions[*cursor % positions.len()];
                *cursor += 1;
                (x, y, None)
            }
            PositionSource::Cities { cities, cursor } => {
                let (name, (x, y)) = &cities[*cursor % cities.len()];
                *cursor += 1;
                (*x, *y, Some(name.clone()))
            }
        };
        let mut node = Node::new(id, x, y, city);
        for aspect in &self.aspects {
            aspect.apply(rng, &mut node);
        }
        node
    }

    /// A copy of this recipe with a fresh id counter and position cursor.
    #[must_use]
    pub fn reset_clone(&self) -> Self {
        let source = match &self.source {
            PositionSource::Random => PositionSource::Random,
            PositionSource::List { positions, .. } => PositionSource::List {
                positions: positions.clone(),
                cursor: 0,
            },
            PositionSource::Cities { cities, .. } => PositionSource::Cities {
                cities: cities.clone(),
                cursor: 0,
            },
        };
        Self {
            next_id: 0,
            source,
            aspects: self.aspects.clone(),
        }
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A per-node quirk generator, evaluated once when the node is built.
pub trait Aspect {
    fn apply(&self, rng: &mut dyn RngCore, node: &mut Node);
}

/// Pareto-distributed speed ratio: most nodes near `scale`, a heavy tail of
/// much slower ones.
#[derive(Clone, Copy, Debug)]
pub struct ParetoSpeed {
    pub shape: f64,
    pub scale: f64,
}

impl ParetoSpeed {
    #[must_use]
    pub fn new(shape: f64) -> Self {
        Self { shape, scale: 1.0 }
    }
}

impl Aspect for ParetoSpeed {
    fn apply(&self, rng: &mut dyn RngCore, node: &mut Node) {
        let u: f64 = rng.random();
        let ratio = self.scale * (1.0 - u).powf(-1.0 / self.shape);
        node.set_speed_ratio(ratio);
    }
}

/// Normally distributed speed ratio, floored at 1.0.
#[derive(Clone, Copy, Debug)]
pub struct GaussianSpeed {
    pub mean: f64,
    pub std_dev: f64,
}

impl Aspect for GaussianSpeed {
    fn apply(&self, rng: &mut dyn RngCore, node: &mut Node) {
        // Box-Muller transform
        let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
        let u2: f64 = rng.random();
        let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
        node.set_speed_ratio((self.mean + self.std_dev * z).max(1.0));
    }
}

/// With probability `probability`, gives the node a fixed extra latency
/// uniform in `[1, max]`.
#[derive(Clone, Copy, Debug)]
pub struct ExtraLatency {
    pub probability: f64,
    pub max: Tick,
}

impl Aspect for ExtraLatency {
    fn apply(&self, rng: &mut dyn RngCore, node: &mut Node) {
        if rng.random::<f64>() < self.probability {
            node.set_extra_latency(rng.random_range(1..=self.max));
        }
    }
}
