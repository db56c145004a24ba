//! Per-ack cost of the controller, by tier.
//!
//! Run with: `cargo bench --bench on_ack`
//!
//! `steady` sees a constant RTT, so elision can skip the network on tiers
//! that enable it. `jittered` cycles through scattered RTTs and keeps the
//! network running on every ack.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::time::Duration;

use entropy_cc::config::INFINITE_SSTHRESH;
use entropy_cc::{EntropyController, Tier};

const ACKS_PER_ITER: u64 = 64;

const JITTERED_US: [u64; 8] = [9_100, 12_400, 10_050, 15_800, 9_700, 11_300, 14_200, 10_600];

fn bench_on_ack(c: &mut Criterion) {
    let mut group = c.benchmark_group("controller/on_ack");
    group.throughput(Throughput::Elements(ACKS_PER_ITER));

    for tier in Tier::ALL {
        let controller = EntropyController::for_tier(tier);
        let segment = controller.config().segment_size;
        let cwnd = 64 * segment;

        group.bench_with_input(BenchmarkId::new("steady", tier), &tier, |b, _| {
            let mut state = controller.init(cwnd, cwnd);
            let rtt = Duration::from_millis(10);
            b.iter(|| {
                for _ in 0..ACKS_PER_ITER {
                    black_box(controller.on_ack(&mut state, rtt, segment, cwnd, INFINITE_SSTHRESH));
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("jittered", tier), &tier, |b, _| {
            let mut state = controller.init(cwnd, cwnd);
            b.iter(|| {
                for i in 0..ACKS_PER_ITER {
                    let rtt = Duration::from_micros(JITTERED_US[i as usize % JITTERED_US.len()]);
                    black_box(controller.on_ack(&mut state, rtt, segment, cwnd, INFINITE_SSTHRESH));
                }
            });
        });
    }

    group.finish();
}

fn bench_loss_events(c: &mut Criterion) {
    let controller = EntropyController::for_tier(Tier::Standard);
    let cwnd = 64 * controller.config().segment_size;
    c.bench_function("controller/reduce_undo", |b| {
        let mut state = controller.init(cwnd, cwnd);
        b.iter(|| {
            let ssthresh = controller.on_reduce_request(&mut state, black_box(cwnd));
            black_box(controller.on_undo_request(&mut state, ssthresh))
        });
    });
}

criterion_group!(
    name = on_ack;
    config = Criterion::default()
        .warm_up_time(Duration::from_secs(1))
        .measurement_time(Duration::from_secs(5))
        .noise_threshold(0.05);
    targets = bench_on_ack, bench_loss_events
);

criterion_main!(on_ack);
