//! SQ/CQ ring push/pop throughput, single- and multi-producer.

use std::sync::Arc;
use std::thread;

use criterion::{criterion_group, criterion_main, Criterion};

use ring_core::descriptor::{SubmissionDescriptor, UserData};
use ring_core::completion::CompletionEntry;
use ring_core::shared::EngineMetrics;
use ring_rt::rings::{CqRing, SqRing};

fn bench_sq_single_producer(c: &mut Criterion) {
    let metrics = Arc::new(EngineMetrics::default());
    let sq = SqRing::new(4096, Arc::clone(&metrics));
    let desc = SubmissionDescriptor::zeroed();
    let mut drain = vec![SubmissionDescriptor::zeroed(); 4096];

    c.bench_function("sq_push_pop_single_producer", |b| {
        b.iter(|| {
            sq.submit(desc).unwrap();
            sq.dequeue_batch(&mut drain[..1]);
        })
    });
}

fn bench_sq_multi_producer(c: &mut Criterion) {
    let metrics = Arc::new(EngineMetrics::default());
    let sq = Arc::new(SqRing::new(4096, Arc::clone(&metrics)));

    c.bench_function("sq_push_4_producers", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let sq = Arc::clone(&sq);
                    thread::spawn(move || {
                        for _ in 0..64 {
                            let _ = sq.submit(SubmissionDescriptor::zeroed());
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            let mut drain = vec![SubmissionDescriptor::zeroed(); 256];
            sq.dequeue_batch(&mut drain);
        })
    });
}

fn bench_cq_push_and_drain_overflow(c: &mut Criterion) {
    let metrics = Arc::new(EngineMetrics::default());
    let cq = CqRing::new(64, Arc::clone(&metrics));
    let entry = CompletionEntry::new(UserData(1), 0, 0);

    c.bench_function("cq_push_with_overflow_spill", |b| {
        b.iter(|| {
            for _ in 0..128 {
                cq.push(entry);
            }
            cq.drain_overflow_into_ring();
            let mut drain = vec![CompletionEntry::new(UserData::NONE, 0, 0); 128];
            cq.dequeue_batch(&mut drain);
        })
    });
}

criterion_group!(
    rings,
    bench_sq_single_producer,
    bench_sq_multi_producer,
    bench_cq_push_and_drain_overflow
);
criterion_main!(rings);
