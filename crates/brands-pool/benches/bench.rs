use brands_pool::WorkerPool;
use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use tokio_util::sync::CancellationToken;

/// Round trip of one task: handoff to an idle worker, run, result back.
///
/// A submission that races a worker returning to its wait is dropped, so each
/// iteration retries until a value comes back.
fn submit_with_result_bench(c: &mut Criterion) {
    let root = CancellationToken::new();

    for capacity in [1, 2, 4, 8] {
        let pool = WorkerPool::with_capacity(&root, capacity).expect("failed to start pool");

        let mut group = c.benchmark_group("pool/submit_with_result");
        group.throughput(Throughput::Elements(1));
        group.bench_function(format!("workers/{capacity}"), |b| {
            b.iter(|| {
                loop {
                    let rx = pool.submit_with_result(|worker_id| black_box(worker_id));
                    if let Ok(worker_id) = rx.blocking_recv() {
                        break worker_id;
                    }
                    core::hint::spin_loop();
                }
            });
        });
        group.finish();

        pool.stop();
    }
}

/// Cost of the drop path when every worker is busy.
fn saturated_submit_bench(c: &mut Criterion) {
    let root = CancellationToken::new();
    let pool = WorkerPool::with_capacity(&root, 1).expect("failed to start pool");

    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
    let (started_tx, started_rx) = crossbeam_channel::bounded::<()>(1);
    loop {
        let release = release_rx.clone();
        let started = started_tx.clone();
        let task = move |_| {
            let _ = started.send(());
            let _ = release.recv();
        };
        if pool.try_submit(task).is_ok() {
            break;
        }
        core::hint::spin_loop();
    }
    started_rx.recv().expect("worker never started");

    let mut group = c.benchmark_group("pool/submit");
    group.throughput(Throughput::Elements(1));
    group.bench_function("saturated", |b| {
        b.iter(|| pool.submit(|worker_id| { black_box(worker_id); }));
    });
    group.finish();

    drop(release_tx);
    pool.stop();
}

criterion_group!(benches, submit_with_result_bench, saturated_submit_bench);
criterion_main!(benches);
