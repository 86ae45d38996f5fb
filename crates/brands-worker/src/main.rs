#![doc = include_str!("../README.md")]

mod config;
mod telemetry;

use brands_pool::WorkerPool;
use clap::Parser;
use config::{CliArgs, HostConfig};
use core::time::Duration;
use std::sync::Arc;
use telemetry::init_telemetry;
use tokio::{
    runtime::Builder,
    signal,
    time::{MissedTickBehavior, interval, timeout},
};
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Grace period for the runtime's own threads once `run` has returned.
const RUNTIME_SHUTDOWN: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = HostConfig::try_from(args)?;

    init_telemetry()?;

    let runtime = Builder::new_multi_thread().enable_all().build()?;
    let result = runtime.block_on(run(config));

    // A pool that missed its shutdown deadline is still stopping on a
    // blocking thread; don't let it hold the process open.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
    result
}

async fn run(config: HostConfig) -> anyhow::Result<()> {
    let root = CancellationToken::new();
    let pool = Arc::new(match config.num_workers {
        Some(num_workers) => WorkerPool::with_capacity(&root, num_workers)?,
        None => WorkerPool::new(&root)?,
    });
    log_startup_info(&pool, &config);

    let heartbeat = config
        .heartbeat_interval
        .map(|period| tokio::spawn(run_heartbeat(Arc::clone(&pool), period, root.clone())));

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, terminating gracefully...");

    // 1. Stop heartbeats and cancel the pool's parent lifecycle
    root.cancel();
    if let Some(heartbeat) = heartbeat {
        if let Err(e) = heartbeat.await {
            tracing::error!("Heartbeat task failed: {e}");
        }
    }

    // 2. Wait for running tasks to finish
    stop_pool(pool, config.shutdown_timeout).await;

    tracing::info!("Worker host shut down successfully");
    Ok(())
}

fn log_startup_info(pool: &WorkerPool, config: &HostConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting worker host with {} workers and full config: {:#?}",
            pool.capacity(),
            config
        );
    } else {
        tracing::info!("Starting worker host with {} workers", pool.capacity());
    }
}

/// Periodically submits a task reporting the pool's size.
///
/// Heartbeats go through the same best-effort submission as real work, so a
/// missing heartbeat in the logs means every worker was busy at that tick.
async fn run_heartbeat(pool: Arc<WorkerPool>, period: Duration, token: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {
                let capacity = pool.capacity();
                let active = pool.active_workers();
                let dropped = pool.dropped_tasks();
                let panicked = pool.panicked_tasks();
                pool.submit(move |worker_id| {
                    tracing::info!(worker_id, capacity, active, dropped, panicked, "Heartbeat");
                });
            }
        }
    }
}

/// Runs the blocking [`WorkerPool::stop`] off the async workers, bounded by
/// `limit`.
async fn stop_pool(pool: Arc<WorkerPool>, limit: Duration) {
    let stopping = tokio::task::spawn_blocking(move || pool.stop());

    match timeout(limit, stopping).await {
        Ok(Ok(())) => tracing::debug!("All workers exited"),
        Ok(Err(e)) => tracing::error!("Worker pool shutdown failed: {e}"),
        Err(_) => tracing::warn!("Worker pool did not stop within {limit:?}, abandoning it"),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}
