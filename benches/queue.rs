// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

use divan::counter::ItemsCount;
use foehn::{Network, NodeId, PingMessage, UniformLatency, create_test_network};

fn main() {
    // run registered benchmarks.
    divan::main();
}

#[divan::bench(consts = [100, 1000])]
fn unicast_round<const N: u64>(bencher: divan::Bencher) {
    bencher
        .counter(ItemsCount::new(N as usize))
        .with_inputs(|| create_test_network(42, N))
        .bench_values(|mut net: Network<PingMessage, ()>| {
            for id in 0..N {
                net.send(PingMessage::default(), id, (id + 1) % N);
            }
            net.run_ms(5);
        });
}

#[divan::bench(consts = [100, 1000, 5000])]
fn broadcast_fanout<const N: u64>(bencher: divan::Bencher) {
    bencher
        .counter(ItemsCount::new(N as usize))
        .with_inputs(|| {
            let mut net = create_test_network(42, N);
            net.set_latency_model(UniformLatency::new(200));
            net
        })
        .bench_values(|mut net: Network<PingMessage, ()>| {
            net.send_to_all(PingMessage::default(), 0);
            net.run_ms(250);
        });
}

#[divan::bench(consts = [100, 1000])]
fn staggered_fanout<const N: u64>(bencher: divan::Bencher) {
    bencher
        .counter(ItemsCount::new(N as usize))
        .with_inputs(|| create_test_network(42, N))
        .bench_values(|mut net: Network<PingMessage, ()>| {
            let recipients: Vec<NodeId> = (1..N).collect();
            net.send_with_delay(PingMessage::default(), 0, 0, &recipients, 2);
            net.run_ms(2 * N + 10);
        });
}

#[divan::bench(consts = [100, 1000])]
fn periodic_timers<const N: u64>(bencher: divan::Bencher) {
    bencher
        .counter(ItemsCount::new(N as usize))
        .with_inputs(|| {
            let mut net = create_test_network(42, N);
            for id in 0..N {
                net.register_periodic_task(1 + (id % 50), 50, id, |_, _| true, |_, _| {});
            }
            net
        })
        .bench_values(|mut net: Network<PingMessage, ()>| net.run_ms(1000));
}

#[divan::bench]
fn idle_ticks(bencher: divan::Bencher) {
    bencher
        .counter(ItemsCount::new(10_000_usize))
        .with_inputs(|| create_test_network(42, 2))
        .bench_values(|mut net: Network<PingMessage, ()>| net.run_ms(10_000));
}
