// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Pairwise city latency tables.
//!
//! Maps every pair of city labels to a one-way latency. Lookups are
//! symmetric, `(a, b)` falls back to `(b, a)`, so tables only need each pair
//! once. Tables come from CSV files with `source,destination,avg` columns or
//! from the built-in AWS region table.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io;
use std::path::Path;

use crate::latency::{LatencyError, LatencyModel};
use crate::node::Node;
use crate::Tick;

/// One-way latencies between eight AWS regions, in milliseconds.
const AWS_PAIRS: &[(&str, &str, f64)] = &[
    ("virginia", "oregon", 36.0),
    ("virginia", "ireland", 38.0),
    ("virginia", "frankfurt", 44.0),
    ("virginia", "tokyo", 74.0),
    ("virginia", "singapore", 106.0),
    ("virginia", "sydney", 99.0),
    ("virginia", "sao-paulo", 60.0),
    ("oregon", "ireland", 62.0),
    ("oregon", "frankfurt", 70.0),
    ("oregon", "tokyo", 49.0),
    ("oregon", "singapore", 82.0),
    ("oregon", "sydney", 69.0),
    ("oregon", "sao-paulo", 89.0),
    ("ireland", "frankfurt", 12.0),
    ("ireland", "tokyo", 105.0),
    ("ireland", "singapore", 87.0),
    ("ireland", "sydney", 132.0),
    ("ireland", "sao-paulo", 92.0),
    ("frankfurt", "tokyo", 111.0),
    ("frankfurt", "singapore", 81.0),
    ("frankfurt", "sydney", 140.0),
    ("frankfurt", "sao-paulo", 101.0),
    ("tokyo", "singapore", 34.0),
    ("tokyo", "sydney", 52.0),
    ("tokyo", "sao-paulo", 128.0),
    ("singapore", "sydney", 46.0),
    ("singapore", "sao-paulo", 163.0),
    ("sydney", "sao-paulo", 156.0),
];

/// The same eight regions with their positions on the toroidal map,
/// projected from real-world coordinates. Feed these to
/// [`NodeBuilder::with_cities`](crate::node::NodeBuilder::with_cities).
const AWS_REGIONS: &[(&str, (u32, u32))] = &[
    ("virginia", (570, 285)),
    ("oregon", (336, 245)),
    ("ireland", (965, 204)),
    ("frankfurt", (1048, 222)),
    ("tokyo", (1776, 302)),
    ("singapore", (1577, 492)),
    ("sydney", (1840, 688)),
    ("sao-paulo", (741, 631)),
];

/// One `source,destination,avg` row of a pairwise latency table.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct PairRecord {
    pub source: String,
    pub destination: String,
    /// Average one-way latency in milliseconds.
    pub avg: f64,
}

/// Latency model backed by a pairwise city table.
#[derive(Clone, Debug, Default)]
pub struct CityLatency {
    table: HashMap<String, HashMap<String, Tick>>,
    cities: BTreeSet<String>,
}

impl CityLatency {
    /// Builds a table from in-memory records.
    ///
    /// Sub-millisecond averages are rounded up to the 1ms latency floor.
    pub fn from_records<I: IntoIterator<Item = PairRecord>>(records: I) -> Self {
        let mut model = Self::default();
        for record in records {
            let ms = (record.avg.round() as Tick).max(1);
            model.cities.insert(record.source.clone());
            model.cities.insert(record.destination.clone());
            model
                .table
                .entry(record.source)
                .or_default()
                .insert(record.destination, ms);
        }
        model
    }

    /// Parses a `source,destination,avg` CSV table.
    pub fn from_csv_reader<R: io::Read>(reader: R) -> Result<Self, LatencyError> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            let record: PairRecord = result?;
            records.push(record);
        }
        if records.is_empty() {
            return Err(LatencyError::EmptyTable);
        }
        Ok(Self::from_records(records))
    }

    /// Reads a `source,destination,avg` CSV table from a file.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, LatencyError> {
        let file = File::open(path).map_err(csv::Error::from)?;
        Self::from_csv_reader(file)
    }

    /// The built-in AWS region table.
    #[must_use]
    pub fn aws() -> Self {
        Self::from_records(AWS_PAIRS.iter().map(|&(source, destination, avg)| {
            PairRecord {
                source: source.to_owned(),
                destination: destination.to_owned(),
                avg,
            }
        }))
    }

    /// City labels and map positions matching [`CityLatency::aws`].
    #[must_use]
    pub fn aws_regions() -> &'static [(&'static str, (u32, u32))] {
        AWS_REGIONS
    }

    /// All city labels the table knows about, in sorted order.
    pub fn cities(&self) -> impl Iterator<Item = &str> {
        self.cities.iter().map(String::as_str)
    }

    /// Looks up the latency between two cities, falling back to the
    /// reversed pair.
    #[must_use]
    pub fn latency_between(&self, a: &str, b: &str) -> Option<Tick> {
        self.table
            .get(a)
            .and_then(|row| row.get(b))
            .or_else(|| self.table.get(b).and_then(|row| row.get(a)))
            .copied()
    }
}

impl LatencyModel for CityLatency {
    /// # Panics
    ///
    /// Panics if either node has no city label, or if two distinct labeled
    /// cities are missing from the table. Both are configuration bugs in the
    /// experiment under test.
    fn latency(&self, from: &Node, to: &Node, _delta: u64) -> Tick {
        if from.id() == to.id() {
            return 1;
        }
        let from_city = from
            .city()
            .unwrap_or_else(|| panic!("node {} has no city", from.id()));
        let to_city = to
            .city()
            .unwrap_or_else(|| panic!("node {} has no city", to.id()));
        match self.latency_between(from_city, to_city) {
            Some(ms) => ms,
            None if from_city == to_city => 1,
            None => panic!("no latency entry between {from_city} and {to_city}"),
        }
    }
}
