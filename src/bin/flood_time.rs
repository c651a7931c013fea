// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Flood propagation timing simulation.
//!
//! Floods one message through a random peer overlay and records when each
//! node first hears it, across many independently seeded runs in parallel.
//! Reports average per-percentile propagation times and optionally writes
//! all 100 percentiles to a CSV file.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::Context;
use foehn::node::{MAP_HEIGHT, MAP_WIDTH};
use foehn::{
    CityLatency, DistanceLatency, FixedLatency, FloodMessage, FloodState, GossipNode, Message,
    Network, NodeBuilder, NodeId, PeerGraph, Tick, UniformLatency, logging,
};
use log::{info, warn};
use rayon::prelude::*;
use serde::Deserialize;

/// Identifier of the one message each run floods.
const FLOOD_ID: u64 = 1;

/// Flood propagation timing simulation.
#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Scenario file (TOML), built-in defaults are used if not given.
    #[arg(long)]
    scenario: Option<PathBuf>,
    /// Writes per-percentile propagation times to this CSV file.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
struct Scenario {
    nodes: u64,
    degree: usize,
    runs: u64,
    base_seed: u64,
    duration_ms: Tick,
    think_ms: Tick,
    stagger_ms: Tick,
    message_size: usize,
    latency: LatencyChoice,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            nodes: 200,
            degree: 8,
            runs: 20,
            base_seed: 1,
            duration_ms: 10_000,
            think_ms: 10,
            stagger_ms: 0,
            message_size: 1500,
            latency: LatencyChoice::Distance { base_max: 150 },
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum LatencyChoice {
    Fixed { ms: Tick },
    Uniform { max: Tick },
    Distance { base_max: Tick },
    Cities { table: Option<PathBuf> },
}

#[derive(Debug, Default)]
struct SimState {
    flood: FloodState,
    heard_at: Option<Tick>,
}

impl GossipNode<u64> for SimState {
    fn flood_state(&mut self) -> &mut FloodState {
        &mut self.flood
    }
}

#[derive(Clone, Debug)]
struct SimMsg(FloodMessage<u64>);

impl From<FloodMessage<u64>> for SimMsg {
    fn from(msg: FloodMessage<u64>) -> Self {
        Self(msg)
    }
}

impl Message<SimState> for SimMsg {
    fn deliver(&self, net: &mut Network<Self, SimState>, from: NodeId, to: NodeId) {
        self.0.receive(net, from, to);
        let now = net.time();
        let state = net.state_mut(to);
        if state.flood.best_seen(FLOOD_ID).is_some() && state.heard_at.is_none() {
            state.heard_at = Some(now);
        }
    }

    fn size_bytes(&self) -> usize {
        self.0.size_bytes()
    }
}

fn main() -> Result<()> {
    // enable fancy `color_eyre` error messages
    color_eyre::install()?;

    logging::enable_logforth();

    let args = Args::parse();
    let scenario = match &args.scenario {
        Some(path) => load_scenario(path)?,
        None => Scenario::default(),
    };
    info!(
        "flooding {} nodes at degree {} over {} runs",
        scenario.nodes, scenario.degree, scenario.runs
    );

    // city tables are loaded once and cloned into every run
    let city_table = match &scenario.latency {
        LatencyChoice::Cities { table: Some(path) } => Some(
            CityLatency::from_csv_path(path)
                .with_context(|| format!("loading city table {}", path.display()))?,
        ),
        LatencyChoice::Cities { table: None } => Some(CityLatency::aws()),
        _ => None,
    };

    let stats = Mutex::new(PercentileStats::default());
    (0..scenario.runs).into_par_iter().for_each(|run| {
        let (latencies, unreached) =
            run_flood(scenario.base_seed + run, &scenario, city_table.clone());
        stats.lock().unwrap().record(&latencies, unreached);
    });
    let stats = stats.into_inner().unwrap();

    info!("avg p50 latency: {:.2} ms", stats.avg(50));
    info!("avg p90 latency: {:.2} ms", stats.avg(90));
    info!("avg max latency: {:.2} ms", stats.avg(100));
    if stats.unreached > 0 {
        warn!("{} node(s) never heard the flood", stats.unreached);
    }

    if let Some(path) = &args.output {
        stats.write_to_csv(path).context("writing output file")?;
        info!("wrote percentiles to {}", path.display());
    }

    Ok(())
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    let mut file = File::open(path).context("scenario file is required")?;
    let mut raw = String::new();
    file.read_to_string(&mut raw)?;
    toml::from_str(&raw).context("can not parse scenario")
}

/// Runs one seeded flood and returns sorted first-delivery times relative
/// to the origin, plus the number of nodes the flood never reached.
fn run_flood(seed: u64, scenario: &Scenario, city_table: Option<CityLatency>) -> (Vec<f64>, u64) {
    let mut net: Network<SimMsg, SimState> = Network::new(seed);

    let mut builder = match (&scenario.latency, &city_table) {
        (LatencyChoice::Cities { table: None }, _) => {
            NodeBuilder::with_cities(CityLatency::aws_regions())
        }
        (LatencyChoice::Cities { table: Some(_) }, Some(table)) => {
            // tables from a file carry no map coordinates; the model never
            // looks at positions, so cities get evenly spaced slots
            let names: Vec<&str> = table.cities().collect();
            let spread: Vec<(&str, (u32, u32))> = names
                .iter()
                .enumerate()
                .map(|(i, &name)| {
                    let x = i as u32 * MAP_WIDTH / names.len() as u32;
                    (name, (x, MAP_HEIGHT / 2))
                })
                .collect();
            NodeBuilder::with_cities(&spread)
        }
        _ => NodeBuilder::new(),
    };
    for _ in 0..scenario.nodes {
        net.add_node(&mut builder, SimState::default());
    }

    match &scenario.latency {
        LatencyChoice::Fixed { ms } => net.set_latency_model(FixedLatency::new(*ms)),
        LatencyChoice::Uniform { max } => net.set_latency_model(UniformLatency::new(*max)),
        LatencyChoice::Distance { base_max } => {
            net.set_latency_model(DistanceLatency::new(*base_max));
        }
        LatencyChoice::Cities { .. } => {
            net.set_latency_model(city_table.expect("city table is preloaded"));
        }
    }

    let graph = PeerGraph::with_avg_degree(scenario.nodes, scenario.degree, net.rng());
    for id in 0..scenario.nodes {
        net.state_mut(id).flood.set_peers(graph.peers_of(id).to_vec());
    }

    let msg = FloodMessage::new(FLOOD_ID, 0_u64, scenario.message_size)
        .with_delays(scenario.think_ms, scenario.stagger_ms);
    net.send(SimMsg(msg), 0, 0);
    net.run_ms(scenario.duration_ms);

    let origin = net.state(0).heard_at.expect("origin hears its own flood") as f64;
    let mut latencies = Vec::new();
    let mut unreached = 0;
    for id in 0..scenario.nodes {
        match net.state(id).heard_at {
            Some(at) => latencies.push(at as f64 - origin),
            None => unreached += 1,
        }
    }
    latencies.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap());
    (latencies, unreached)
}

/// Running per-percentile propagation averages over all runs.
struct PercentileStats {
    sum_percentile_latencies: [f64; 100],
    unreached: u64,
    count: u64,
}

impl PercentileStats {
    /// Records one run's sorted first-delivery times.
    fn record(&mut self, sorted: &[f64], unreached: u64) {
        debug_assert!(sorted.is_sorted_by(|a, b| a <= b));
        for percentile in 1..=100_usize {
            let idx = (percentile * sorted.len()).div_ceil(100) - 1;
            self.sum_percentile_latencies[percentile - 1] += sorted[idx];
        }
        self.unreached += unreached;
        self.count += 1;
    }

    fn avg(&self, percentile: usize) -> f64 {
        assert!(percentile > 0 && percentile <= 100);
        self.sum_percentile_latencies[percentile - 1] / self.count as f64
    }

    /// Writes all percentiles to a CSV file.
    fn write_to_csv(&self, filename: impl AsRef<Path>) -> std::io::Result<()> {
        let file = File::create(filename)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "percentile,flood_ms")?;
        for percentile in 1..=100 {
            writeln!(writer, "{percentile},{:.2}", self.avg(percentile))?;
        }
        Ok(())
    }
}

impl Default for PercentileStats {
    fn default() -> Self {
        Self {
            sum_percentile_latencies: [0.0; 100],
            unreached: 0,
            count: 0,
        }
    }
}
