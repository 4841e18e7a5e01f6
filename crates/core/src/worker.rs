//! Polling worker trait and lifecycle management.
//!
//! Provides the [`Worker`] trait for long-running polling loops,
//! [`WorkerBuilder`] for fluent configuration, [`WorkerRunner`] for driving a
//! worker on the tokio runtime, and [`Shutdown`] as the cancellation channel
//! every loop observes.
//!
//! Poll bodies are synchronous (OS event log queries, file reads, SQLite
//! transactions) and run on the blocking pool; the loop itself lives on an
//! async task so the inter-cycle sleep can be raced against cancellation.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::WorkerError;

// ── Worker trait ─────────────────────────────────────────────────────

/// A polling loop body.
///
/// The runner calls `start()` once, then `poll()` once per cycle until
/// shutdown is signalled, then `stop()` once. A failed or panicking `poll()`
/// is logged and the loop carries on with the next cycle.
pub trait Worker: Send + 'static {
    /// Human-readable name for this worker (used in logging).
    fn name(&self) -> &str;

    /// Called once before the first cycle.
    fn start(&mut self) -> Result<(), WorkerError> {
        Ok(())
    }

    /// Run one poll cycle.
    fn poll(&mut self) -> Result<(), WorkerError>;

    /// Called once after the last cycle. Release open resources.
    fn stop(&mut self) -> Result<(), WorkerError> {
        Ok(())
    }
}

// ── Shutdown ─────────────────────────────────────────────────────────

/// Cancellation channel shared by the orchestrator and every loop.
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// A receiver for one loop.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Signal every subscribed loop to finish after its current cycle.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C (cross-platform fallback).
    pub async fn os_signal() {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(mut sigint), Ok(mut sigterm)) => {
                    tokio::select! {
                        _ = sigint.recv() => {}
                        _ = sigterm.recv() => {}
                    }
                    return;
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!(error = %e, "failed to register unix signal handlers, using ctrl_c");
                }
            }
        }

        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl_c");
            std::future::pending::<()>().await;
        }
    }
}

// ── WorkerBuilder ────────────────────────────────────────────────────

/// Fluent builder for configuring a [`WorkerRunner`].
///
/// # Example
/// ```ignore
/// let config = WorkerBuilder::new("log-tailer")
///     .poll_interval(Duration::from_secs(1))
///     .build();
/// let handle = WorkerRunner::spawn(worker, config, shutdown.subscribe());
/// ```
pub struct WorkerBuilder {
    name: String,
    poll_interval: Duration,
}

impl WorkerBuilder {
    /// Create a new builder with the given worker name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Set the sleep between poll cycles (default: 1s).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn build(self) -> WorkerRunnerConfig {
        WorkerRunnerConfig {
            name: self.name,
            poll_interval: self.poll_interval,
        }
    }
}

/// Configuration produced by [`WorkerBuilder`], consumed by [`WorkerRunner`].
#[derive(Debug, Clone)]
pub struct WorkerRunnerConfig {
    pub name: String,
    pub poll_interval: Duration,
}

// ── WorkerHandle ─────────────────────────────────────────────────────

/// A spawned loop that can be joined with a bounded timeout.
pub struct WorkerHandle {
    name: String,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the loop to exit. Returns `false` if it did not finish within
    /// `timeout`; the task is then aborted (an in-flight blocking poll body is
    /// left to finish on its own).
    pub async fn join(self, timeout: Duration) -> bool {
        let abort = self.join.abort_handle();
        match tokio::time::timeout(timeout, self.join).await {
            Ok(Ok(())) => {
                info!(worker = %self.name, "worker joined");
                true
            }
            Ok(Err(e)) => {
                error!(worker = %self.name, error = %e, "worker task failed");
                true
            }
            Err(_) => {
                warn!(
                    worker = %self.name,
                    timeout = ?timeout,
                    "worker did not stop in time, abandoning"
                );
                abort.abort();
                false
            }
        }
    }
}

// ── WorkerRunner ─────────────────────────────────────────────────────

/// Drives a [`Worker`] until its shutdown receiver flips to `true`.
pub struct WorkerRunner;

impl WorkerRunner {
    /// Spawn the worker loop on the current tokio runtime.
    pub fn spawn<W: Worker>(
        worker: W,
        config: WorkerRunnerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> WorkerHandle {
        let name = config.name.clone();
        let join = tokio::spawn(Self::run(worker, config, shutdown));
        WorkerHandle { name, join }
    }

    /// Run a worker to completion on the calling task.
    pub async fn run<W: Worker>(
        worker: W,
        config: WorkerRunnerConfig,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let name = config.name;
        info!(worker = %name, interval = ?config.poll_interval, "starting worker");

        let Some((mut worker, started)) = Self::blocking(worker, |w| w.start()).await else {
            error!(worker = %name, "worker task lost during start");
            return;
        };
        if let Err(e) = started {
            error!(worker = %name, error = %e, "worker failed to start");
            return;
        }
        info!(worker = %name, "worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let Some((w, polled)) = Self::blocking(worker, |w| w.poll()).await else {
                error!(worker = %name, "worker task lost during poll, loop terminated");
                return;
            };
            worker = w;
            if let Err(e) = polled {
                error!(worker = %name, error = %e, "poll cycle failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(config.poll_interval) => {}
                changed = shutdown.changed() => {
                    // A dropped sender also means the orchestrator is gone.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(worker = %name, "shutdown signal received, stopping worker");
        match Self::blocking(worker, |w| w.stop()).await {
            Some((_, Ok(()))) => info!(worker = %name, "worker stopped gracefully"),
            Some((_, Err(e))) => warn!(worker = %name, error = %e, "worker stop returned error"),
            None => error!(worker = %name, "worker task lost during stop"),
        }
    }

    /// Run one lifecycle step on the blocking pool, handing ownership of the
    /// worker there and back. A panic in the step is caught and reported as
    /// [`WorkerError::Panicked`]; the worker is kept for the next cycle.
    /// `None` means the blocking task itself was cancelled.
    async fn blocking<W, F>(mut worker: W, step: F) -> Option<(W, Result<(), WorkerError>)>
    where
        W: Worker,
        F: FnOnce(&mut W) -> Result<(), WorkerError> + Send + 'static,
    {
        tokio::task::spawn_blocking(move || {
            let result = catch_unwind(AssertUnwindSafe(|| step(&mut worker))).unwrap_or_else(
                |payload| {
                    Err(WorkerError::Panicked {
                        worker: worker.name().to_string(),
                        message: panic_message(payload.as_ref()),
                    })
                },
            );
            (worker, result)
        })
        .await
        .ok()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Worker that counts lifecycle calls and optionally fails every poll.
    struct CountingWorker {
        starts: Arc<AtomicU32>,
        polls: Arc<AtomicU32>,
        stops: Arc<AtomicU32>,
        fail_polls: bool,
    }

    impl Worker for CountingWorker {
        fn name(&self) -> &str {
            "counting-worker"
        }

        fn start(&mut self) -> Result<(), WorkerError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn poll(&mut self) -> Result<(), WorkerError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.fail_polls {
                return Err(WorkerError::failed("counting-worker", "boom"));
            }
            Ok(())
        }

        fn stop(&mut self) -> Result<(), WorkerError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counting(fail_polls: bool) -> (CountingWorker, [Arc<AtomicU32>; 3]) {
        let counters = [
            Arc::new(AtomicU32::new(0)),
            Arc::new(AtomicU32::new(0)),
            Arc::new(AtomicU32::new(0)),
        ];
        let worker = CountingWorker {
            starts: counters[0].clone(),
            polls: counters[1].clone(),
            stops: counters[2].clone(),
            fail_polls,
        };
        (worker, counters)
    }

    #[tokio::test]
    async fn worker_lifecycle_start_poll_stop() {
        let (worker, [starts, polls, stops]) = counting(false);
        let shutdown = Shutdown::new();
        let config = WorkerBuilder::new("counting-worker")
            .poll_interval(Duration::from_millis(10))
            .build();

        let handle = WorkerRunner::spawn(worker, config, shutdown.subscribe());
        tokio::time::sleep(Duration::from_millis(80)).await;

        shutdown.trigger();
        assert!(handle.join(Duration::from_secs(2)).await);

        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(polls.load(Ordering::SeqCst) >= 2, "should poll repeatedly");
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_interrupts_long_sleep() {
        let (worker, [_, polls, stops]) = counting(false);
        let shutdown = Shutdown::new();
        let config = WorkerBuilder::new("slow-worker")
            .poll_interval(Duration::from_secs(3600))
            .build();

        let handle = WorkerRunner::spawn(worker, config, shutdown.subscribe());
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown.trigger();
        assert!(
            handle.join(Duration::from_secs(2)).await,
            "cancellation should not wait for the poll interval"
        );
        assert_eq!(polls.load(Ordering::SeqCst), 1);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_polls_do_not_stop_the_loop() {
        let (worker, [_, polls, _]) = counting(true);
        let shutdown = Shutdown::new();
        let config = WorkerBuilder::new("failing-worker")
            .poll_interval(Duration::from_millis(5))
            .build();

        let handle = WorkerRunner::spawn(worker, config, shutdown.subscribe());
        tokio::time::sleep(Duration::from_millis(80)).await;
        shutdown.trigger();
        assert!(handle.join(Duration::from_secs(2)).await);

        assert!(polls.load(Ordering::SeqCst) >= 2);
    }

    /// Panics on its first poll, then behaves.
    struct PanickyWorker {
        polls: Arc<AtomicU32>,
        stops: Arc<AtomicU32>,
    }

    impl Worker for PanickyWorker {
        fn name(&self) -> &str {
            "panicky-worker"
        }

        fn poll(&mut self) -> Result<(), WorkerError> {
            if self.polls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first cycle blew up");
            }
            Ok(())
        }

        fn stop(&mut self) -> Result<(), WorkerError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn panicking_poll_does_not_end_the_loop() {
        let polls = Arc::new(AtomicU32::new(0));
        let stops = Arc::new(AtomicU32::new(0));
        let worker = PanickyWorker {
            polls: polls.clone(),
            stops: stops.clone(),
        };
        let shutdown = Shutdown::new();
        let config = WorkerBuilder::new("panicky-worker")
            .poll_interval(Duration::from_millis(5))
            .build();

        let handle = WorkerRunner::spawn(worker, config, shutdown.subscribe());
        tokio::time::sleep(Duration::from_millis(80)).await;
        shutdown.trigger();
        assert!(handle.join(Duration::from_secs(2)).await);

        assert!(polls.load(Ordering::SeqCst) >= 2, "loop should survive the panic");
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn caught_panic_is_reported_as_an_error() {
        let worker = PanickyWorker {
            polls: Arc::new(AtomicU32::new(0)),
            stops: Arc::new(AtomicU32::new(0)),
        };
        let (worker, result) = WorkerRunner::blocking(worker, |w| w.poll()).await.unwrap();
        match result {
            Err(WorkerError::Panicked { worker, message }) => {
                assert_eq!(worker, "panicky-worker");
                assert_eq!(message, "first cycle blew up");
            }
            other => panic!("expected a caught panic, got {:?}", other),
        }

        let (_, result) = WorkerRunner::blocking(worker, |w| w.poll()).await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn triggered_before_spawn_skips_polling() {
        let (worker, [starts, polls, stops]) = counting(false);
        let shutdown = Shutdown::new();
        shutdown.trigger();
        assert!(shutdown.is_triggered());

        let config = WorkerBuilder::new("late-worker").build();
        WorkerRunner::run(worker, config, shutdown.subscribe()).await;

        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(polls.load(Ordering::SeqCst), 0);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }
}
