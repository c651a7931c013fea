// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The simulation engine: clock, PRNG, node registry and delivery loop.
//!
//! One [`Network`] is one simulation run. All randomness funnels through its
//! single seeded PRNG, so runs are bit-for-bit reproducible; to start over,
//! construct a fresh network instead of rewinding this one. The clock only
//! moves forward, one millisecond tick at a time, delivering whatever the
//! event queue holds for that tick.

use log::{debug, trace};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use smallvec::SmallVec;

use crate::envelope::{Envelope, Payload, fanout_delta};
use crate::latency::{FixedLatency, LatencyModel};
use crate::node::{MAP_WIDTH, Node, NodeBuilder};
use crate::queue::EventQueue;
use crate::task::{ConditionalTask, TaskKind};
use crate::{MAX_TICK, NodeId, Tick};

/// A protocol message the engine can deliver.
///
/// `N` is the per-node protocol state living next to each kernel [`Node`].
pub trait Message<N: 'static>: Sized + 'static {
    /// Runs the message's effect at the recipient.
    ///
    /// Called by the engine once per delivered copy, with the clock already
    /// at the arrival tick. Down or partitioned-off recipients never see a
    /// call.
    fn deliver(&self, net: &mut Network<Self, N>, from: NodeId, to: NodeId);

    /// Wire size in bytes, counted against both endpoints.
    ///
    /// Only internal task envelopes are zero-sized; protocol messages
    /// should report an honest payload size.
    fn size_bytes(&self) -> usize;
}

fn advance_tick(at: Tick, by: Tick) -> Tick {
    at.checked_add(by).expect("tick arithmetic overflows the clock")
}

/// The discrete-event simulation engine.
///
/// Generic over the protocol message type `M` and per-node protocol state
/// `N`. The engine owns the kernel [`Node`]s and the protocol states in two
/// parallel vectors indexed by node id.
pub struct Network<M: 'static, N: 'static> {
    rng: ChaCha8Rng,
    now: Tick,
    queue: EventQueue<Envelope<M, N>>,
    latency: Box<dyn LatencyModel>,
    /// Vertical partition boundaries (x coordinates), kept sorted.
    partitions: SmallVec<[u32; 4]>,
    conditional_tasks: Vec<ConditionalTask<M, N>>,
    nodes: Vec<Node>,
    states: Vec<N>,
}

impl<M: Message<N>, N: 'static> Network<M, N> {
    /// A fresh network at tick zero.
    ///
    /// Starts with a fixed 1ms latency model; swap it with
    /// [`Network::set_latency_model`] before sending.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            now: 0,
            queue: EventQueue::new(),
            latency: Box::new(FixedLatency::default()),
            partitions: SmallVec::new(),
            conditional_tasks: Vec::new(),
            nodes: Vec::new(),
            states: Vec::new(),
        }
    }

    /// Adds the next node from `builder`, with its protocol state.
    pub fn add_node(&mut self, builder: &mut NodeBuilder, state: N) -> NodeId {
        let node = builder.build(&mut self.rng);
        assert_eq!(
            node.id(),
            self.nodes.len() as NodeId,
            "node ids must stay dense, use a fresh or reset builder"
        );
        let id = node.id();
        self.nodes.push(node);
        self.states.push(state);
        id
    }

    /// Swaps the latency model.
    ///
    /// # Panics
    ///
    /// Panics if messages are pending. Shared fan-out envelopes recompute
    /// arrivals through the model, so swapping it mid-flight would move
    /// already-scheduled deliveries.
    pub fn set_latency_model(&mut self, model: impl LatencyModel + 'static) {
        assert!(
            self.queue.is_empty(),
            "cannot swap the latency model with messages in flight"
        );
        debug!("latency model swapped at tick {}", self.now);
        self.latency = Box::new(model);
    }

    /// Sends `msg` from `from` to `to`, arriving per the latency model.
    pub fn send(&mut self, msg: M, from: NodeId, to: NodeId) {
        self.send_with_delay(msg, self.now, from, &[to], 0);
    }

    /// Broadcasts `msg` to every node except the sender.
    pub fn send_to_all(&mut self, msg: M, from: NodeId) {
        let recipients: Vec<NodeId> =
            (0..self.nodes.len() as NodeId).filter(|&id| id != from).collect();
        self.send_with_delay(msg, self.now, from, &recipients, 0);
    }

    /// Sends `msg` to an explicit recipient list at the current tick.
    pub fn send_to(&mut self, msg: M, from: NodeId, recipients: &[NodeId]) {
        self.send_with_delay(msg, self.now, from, recipients, 0);
    }

    /// Sends `msg` at `sent_at`, spacing consecutive recipients by
    /// `delay_between` ticks.
    ///
    /// With a zero delay all copies leave at `sent_at` and the recipients
    /// share one compact envelope; a positive delay staggers them, the i-th
    /// surviving recipient's copy leaving at `sent_at + i * delay_between`.
    ///
    /// # Panics
    ///
    /// Panics if `sent_at` lies in the past or the sender is down.
    pub fn send_with_delay(
        &mut self,
        msg: M,
        sent_at: Tick,
        from: NodeId,
        recipients: &[NodeId],
        delay_between: Tick,
    ) {
        assert!(
            sent_at >= self.now,
            "send tick {sent_at} is before the current tick"
        );
        assert!(
            !self.nodes[from as usize].is_down(),
            "node {from} is down and cannot send"
        );

        // the sender pays for every candidate, dropped or not
        let size = msg.size_bytes() as u64;
        assert!(size > 0, "wire messages must report a nonzero size");
        for _ in recipients {
            self.nodes[from as usize].record_sent(size);
        }

        let kept: Vec<NodeId> = recipients
            .iter()
            .copied()
            .filter(|&to| {
                if self.nodes[to as usize].is_down() || !self.same_partition(from, to) {
                    trace!("dropping send from {from} to {to} at tick {}", self.now);
                    false
                } else {
                    true
                }
            })
            .collect();

        match kept.as_slice() {
            [] => {}
            &[to] => {
                let delta = self.rng.random_range(0..100);
                let arrival = advance_tick(sent_at, self.latency_between(from, to, delta));
                self.insert_envelope(Envelope::single(Payload::Msg(msg), from, to, arrival));
            }
            _ if delay_between == 0 => {
                let seed = self.rng.next_u64();
                let mut recipients = kept;
                recipients
                    .sort_by_key(|&to| self.latency_between(from, to, fanout_delta(to, seed)));
                self.insert_envelope(Envelope::shared(
                    Payload::Msg(msg),
                    from,
                    sent_at,
                    recipients,
                    seed,
                ));
            }
            _ => {
                let mut recipients: Vec<(NodeId, Tick)> = kept
                    .into_iter()
                    .enumerate()
                    .map(|(i, to)| {
                        let delta = self.rng.random_range(0..100);
                        let spacing = (i as Tick)
                            .checked_mul(delay_between)
                            .expect("stagger delay overflows the clock");
                        let leave = advance_tick(sent_at, spacing);
                        (to, advance_tick(leave, self.latency_between(from, to, delta)))
                    })
                    .collect();
                recipients.sort_by_key(|&(_, arrival)| arrival);
                self.insert_envelope(Envelope::staggered(Payload::Msg(msg), from, recipients));
            }
        }
    }

    /// Schedules `msg` to arrive at an absolute tick, bypassing the latency
    /// model. Meant for protocol-internal timers.
    ///
    /// # Panics
    ///
    /// Panics unless `arrival` lies strictly in the future.
    pub fn send_arrive_at(&mut self, msg: M, from: NodeId, to: NodeId, arrival: Tick) {
        assert!(
            arrival > self.now,
            "arrival tick {arrival} is not in the future"
        );
        assert!(
            !self.nodes[from as usize].is_down(),
            "node {from} is down and cannot send"
        );
        let size = msg.size_bytes() as u64;
        assert!(size > 0, "wire messages must report a nonzero size");
        self.nodes[from as usize].record_sent(size);
        self.insert_envelope(Envelope::single(Payload::Msg(msg), from, to, arrival));
    }

    /// Runs `effect` once at tick `at`, on behalf of `node`.
    ///
    /// Silently skipped if the node is down when the tick comes.
    pub fn register_task(
        &mut self,
        at: Tick,
        node: NodeId,
        effect: impl FnMut(&mut Network<M, N>, NodeId) + 'static,
    ) {
        assert!(at > self.now, "task tick {at} is not in the future");
        let payload = Payload::Task(TaskKind::Once(Box::new(effect)));
        self.insert_envelope(Envelope::single(payload, node, node, at));
    }

    /// Runs `effect` at `first` and then every `period` ticks for as long
    /// as `keep_running` holds afterwards.
    ///
    /// The effect is skipped while the node is down, but rescheduling
    /// continues, so the task resumes after a revival. The first failed
    /// `keep_running` check stops the task permanently.
    pub fn register_periodic_task(
        &mut self,
        first: Tick,
        period: Tick,
        node: NodeId,
        keep_running: impl Fn(&Network<M, N>, NodeId) -> bool + 'static,
        effect: impl FnMut(&mut Network<M, N>, NodeId) + 'static,
    ) {
        assert!(first > self.now, "task tick {first} is not in the future");
        assert!(period > 0, "period must be positive");
        let payload = Payload::Task(TaskKind::Periodic {
            effect: Box::new(effect),
            period,
            keep_running: Box::new(keep_running),
        });
        self.insert_envelope(Envelope::single(payload, node, node, first));
    }

    /// Registers a task evaluated on idle ticks only.
    ///
    /// Starting at `min_start`, every tick that delivered nothing checks
    /// `start_if`; on success the effect runs, the task becomes eligible
    /// again at `now + duration`, and it is dropped for good if `repeat_if`
    /// then fails. Busy ticks never evaluate it, so steady traffic can
    /// delay it arbitrarily past `min_start`.
    pub fn register_conditional_task(
        &mut self,
        node: NodeId,
        min_start: Tick,
        duration: Tick,
        start_if: impl Fn(&Network<M, N>, NodeId) -> bool + 'static,
        repeat_if: impl Fn(&Network<M, N>, NodeId) -> bool + 'static,
        effect: impl FnMut(&mut Network<M, N>, NodeId) + 'static,
    ) {
        assert!(duration > 0, "duration must be positive");
        self.conditional_tasks.push(ConditionalTask {
            owner: node,
            next_eligible: min_start,
            duration,
            start_if: Box::new(start_if),
            repeat_if: Box::new(repeat_if),
            effect: Box::new(effect),
        });
    }

    /// Splits the map at `fraction * MAP_WIDTH`.
    ///
    /// Messages crossing any active boundary are dropped: new sends at
    /// send time, traffic already in flight at its delivery tick. Boundaries
    /// accumulate until [`Network::end_partition`] heals them all.
    pub fn partition(&mut self, fraction: f64) {
        assert!(
            fraction > 0.0 && fraction < 1.0,
            "partition fraction {fraction} is not in (0, 1)"
        );
        let boundary = (fraction * f64::from(MAP_WIDTH)) as u32;
        let pos = self.partitions.partition_point(|&b| b < boundary);
        self.partitions.insert(pos, boundary);
        debug!("partitioned the map at x = {boundary}");
    }

    /// Heals all partitions.
    pub fn end_partition(&mut self) {
        debug!("healing all partitions");
        self.partitions.clear();
    }

    /// Marks a node down or back up.
    ///
    /// A down node neither sends nor receives; revival does not replay
    /// traffic that arrived in between.
    pub fn set_down(&mut self, id: NodeId, down: bool) {
        if down {
            debug!("node {id} going down at tick {}", self.now);
        } else {
            debug!("node {id} coming back up at tick {}", self.now);
        }
        self.nodes[id as usize].set_down(down);
    }

    /// Advances the clock by whole simulated seconds.
    pub fn run(&mut self, seconds: Tick) {
        self.run_ms(seconds.checked_mul(1000).expect("run length overflows"));
    }

    /// Advances the clock `ms` ticks, delivering everything due on the way.
    ///
    /// The clock moves tick by tick whether or not traffic is pending, so
    /// periodic and conditional tasks keep their cadence in quiet
    /// stretches.
    pub fn run_ms(&mut self, ms: Tick) {
        let target = advance_tick(self.now, ms);
        assert!(target <= MAX_TICK, "simulated clock past its bound");
        trace!("running from tick {} to {target}", self.now);
        while self.now < target {
            self.now += 1;
            self.tick();
        }
    }

    /// Delivers everything due at the current tick. A tick with no ready
    /// envelope is idle and walks the conditional-task list instead.
    fn tick(&mut self) {
        let mut idle = true;
        while let Some(env) = self.queue.pop_at(self.now) {
            idle = false;
            self.process_envelope(env);
        }
        if idle {
            self.run_conditional_tasks();
        }
    }

    fn process_envelope(&mut self, mut env: Envelope<M, N>) {
        let from = env.sender();
        let to = env.recipient();

        let mut periodic_next = None;
        match env.payload_mut() {
            Payload::Msg(msg) => {
                if self.nodes[to as usize].is_down() {
                    trace!("dropping delivery to down node {to} at tick {}", self.now);
                } else if !self.same_partition(from, to) {
                    trace!(
                        "dropping delivery from {from} to {to} across a partition at tick {}",
                        self.now
                    );
                } else {
                    self.nodes[to as usize].record_received(msg.size_bytes() as u64);
                    msg.deliver(self, from, to);
                }
            }
            Payload::Task(TaskKind::Once(effect)) => {
                if !self.nodes[to as usize].is_down() {
                    effect(self, to);
                }
            }
            Payload::Task(TaskKind::Periodic {
                effect,
                period,
                keep_running,
            }) => {
                if !self.nodes[to as usize].is_down() {
                    effect(self, to);
                }
                if keep_running(self, to) {
                    periodic_next = Some(advance_tick(self.now, *period));
                }
            }
        }

        if let Some(at) = periodic_next {
            env.reschedule(at);
            self.queue.insert(at, env, self.now);
            return;
        }
        env.advance();
        if env.has_more() {
            let arrival = self.arrival_of(&env);
            self.queue.insert(arrival, env, self.now);
        }
    }

    /// One pass over the conditional-task side list, in registration order.
    /// Tasks registered by an effect during the pass start from the next
    /// idle tick.
    fn run_conditional_tasks(&mut self) {
        if self.conditional_tasks.is_empty() {
            return;
        }
        let mut tasks = std::mem::take(&mut self.conditional_tasks);
        tasks.retain_mut(|task| {
            if self.now < task.next_eligible || self.nodes[task.owner as usize].is_down() {
                return true;
            }
            if !(task.start_if)(self, task.owner) {
                return true;
            }
            (task.effect)(self, task.owner);
            task.next_eligible = advance_tick(self.now, task.duration);
            (task.repeat_if)(self, task.owner)
        });
        let registered = std::mem::take(&mut self.conditional_tasks);
        tasks.extend(registered);
        self.conditional_tasks = tasks;
    }

    fn insert_envelope(&mut self, env: Envelope<M, N>) {
        let arrival = self.arrival_of(&env);
        self.queue.insert(arrival, env, self.now);
    }

    fn arrival_of(&self, env: &Envelope<M, N>) -> Tick {
        env.arrival_with(|from, to, delta| self.latency_between(from, to, delta))
    }

    /// Latency of one concrete send, including both endpoints' extra
    /// latency on top of the model.
    fn latency_between(&self, from: NodeId, to: NodeId, delta: u64) -> Tick {
        let a = &self.nodes[from as usize];
        let b = &self.nodes[to as usize];
        let in_flight = self.latency.latency(a, b, delta);
        advance_tick(advance_tick(in_flight, a.extra_latency()), b.extra_latency())
    }

    /// Which side of the boundaries a node falls on.
    fn partition_group(&self, id: NodeId) -> usize {
        let (x, _) = self.nodes[id as usize].position();
        self.partitions.partition_point(|&b| b <= x)
    }

    fn same_partition(&self, a: NodeId, b: NodeId) -> bool {
        self.partitions.is_empty() || self.partition_group(a) == self.partition_group(b)
    }

    /// The current simulation tick.
    #[must_use]
    pub fn time(&self) -> Tick {
        self.now
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All nodes currently up.
    pub fn live_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|node| !node.is_down())
    }

    #[must_use]
    pub fn state(&self, id: NodeId) -> &N {
        &self.states[id as usize]
    }

    pub fn state_mut(&mut self, id: NodeId) -> &mut N {
        &mut self.states[id as usize]
    }

    #[must_use]
    pub fn has_pending_messages(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Earliest pending arrival tick, if any. Introspection only.
    #[must_use]
    pub fn next_arrival(&self) -> Option<Tick> {
        self.queue.peek_earliest()
    }

    /// The network's PRNG. Protocol code must draw all randomness from
    /// here to keep runs reproducible.
    pub fn rng(&mut self) -> &mut dyn RngCore {
        &mut self.rng
    }
}
