//! # Reader Pool and Cancellation
//!
//! Two execution resources shared by every request:
//!
//! - the **reader pool** running per-partition plans when a request opts
//!   into concurrent dispatch. `cpu` is a dedicated priority worker pool;
//!   `io` attaches plain worker threads to the storage I/O side, which
//!   behaves better when plans spend their time blocked in the store.
//! - the **kill checker**, a throttled view of the catalog's kill
//!   registry polled before each row emission.

use crate::catalog::{MetaCatalog, PlanId, SessionId};
use crate::config::QueryConfig;
use std::cell::Cell;
use std::sync::Arc;
use tracing::{info, warn};

/// Which flavor of reader pool to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderPoolKind {
    Io,
    Cpu,
}

impl ReaderPoolKind {
    /// Parse the config string; unknown values fall back to `cpu`.
    pub fn parse(text: &str) -> ReaderPoolKind {
        match text {
            "io" => ReaderPoolKind::Io,
            "cpu" => ReaderPoolKind::Cpu,
            other => {
                warn!(kind = other, "unknown reader_handlers_type, falling back to cpu");
                ReaderPoolKind::Cpu
            }
        }
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// The pool running per-partition plan executions.
pub struct ReaderPool {
    inner: PoolInner,
}

enum PoolInner {
    Cpu(rayon::ThreadPool),
    Io(IoPool),
}

impl ReaderPool {
    pub fn build(config: &QueryConfig) -> ReaderPool {
        let handlers = config.reader_handlers.max(1);
        let kind = ReaderPoolKind::parse(&config.reader_handlers_type);
        info!(handlers, ?kind, "starting reader pool");
        let inner = match kind {
            ReaderPoolKind::Cpu => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(handlers)
                    .thread_name(|i| format!("reader-cpu-{i}"))
                    .build()
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "cpu reader pool failed to build, using a single worker");
                        rayon::ThreadPoolBuilder::new()
                            .num_threads(1)
                            .build()
                            .expect("single-thread pool")
                    });
                PoolInner::Cpu(pool)
            }
            ReaderPoolKind::Io => PoolInner::Io(IoPool::new(handlers)),
        };
        ReaderPool { inner }
    }

    /// Hand a partition task to a pool worker.
    pub fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        match &self.inner {
            PoolInner::Cpu(pool) => pool.spawn(job),
            PoolInner::Io(pool) => pool.spawn(Box::new(job)),
        }
    }
}

/// Plain worker threads on an unbounded channel: the shape of workers
/// attached to the storage I/O pool.
struct IoPool {
    sender: Option<crossbeam_channel::Sender<Job>>,
    workers: Vec<std::thread::JoinHandle<()>>,
}

impl IoPool {
    fn new(handlers: usize) -> IoPool {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let workers = (0..handlers)
            .map(|i| {
                let receiver = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("reader-io-{i}"))
                    .spawn(move || {
                        while let Ok(job) = receiver.recv() {
                            job();
                        }
                    })
                    .expect("spawn io reader thread")
            })
            .collect();
        IoPool { sender: Some(sender), workers }
    }

    fn spawn(&self, job: Job) {
        if let Some(sender) = &self.sender {
            // receivers only disappear on drop, where the sender goes first
            let _ = sender.send(job);
        }
    }
}

impl Drop for IoPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Throttled kill-registry probe, one per partition execution. The
/// counter is partition-local state, so polling frequency is independent
/// of how many partitions run concurrently.
pub struct KillChecker {
    catalog: Arc<MetaCatalog>,
    session: SessionId,
    plan: PlanId,
    frequency: u32,
    calls: Cell<u64>,
}

impl KillChecker {
    pub fn new(
        catalog: Arc<MetaCatalog>,
        session: SessionId,
        plan: PlanId,
        frequency: u32,
    ) -> KillChecker {
        KillChecker { catalog, session, plan, frequency, calls: Cell::new(0) }
    }

    /// True when the plan is killed. Consults the registry every
    /// `frequency` calls (`0` = every call); non-polling calls report
    /// not-killed.
    pub fn check(&self) -> bool {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if self.frequency > 0 && call % u64::from(self.frequency) != 0 {
            return false;
        }
        self.catalog.is_killed(self.session, self.plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn unknown_pool_kind_falls_back_to_cpu() {
        assert_eq!(ReaderPoolKind::parse("cpu"), ReaderPoolKind::Cpu);
        assert_eq!(ReaderPoolKind::parse("io"), ReaderPoolKind::Io);
        assert_eq!(ReaderPoolKind::parse("gpu"), ReaderPoolKind::Cpu);
    }

    #[test]
    fn both_pool_kinds_run_jobs() {
        for kind in ["cpu", "io"] {
            let mut config = QueryConfig::default();
            config.reader_handlers = 2;
            config.reader_handlers_type = kind.to_string();
            let pool = ReaderPool::build(&config);
            let counter = Arc::new(AtomicUsize::new(0));
            let (done_tx, done_rx) = crossbeam_channel::bounded(8);
            for _ in 0..8 {
                let counter = Arc::clone(&counter);
                let done = done_tx.clone();
                pool.spawn(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let _ = done.send(());
                });
            }
            for _ in 0..8 {
                done_rx
                    .recv_timeout(std::time::Duration::from_secs(5))
                    .expect("job finished");
            }
            assert_eq!(counter.load(Ordering::SeqCst), 8);
        }
    }

    #[test]
    fn kill_checker_polls_at_frequency() {
        let catalog = Arc::new(MetaCatalog::new());
        catalog.kill_plan(7, 7);
        // frequency 0: every call polls
        let checker = KillChecker::new(Arc::clone(&catalog), 7, 7, 0);
        assert!(checker.check());
        // frequency 4: calls 1..3 after a poll are skipped
        let catalog2 = Arc::new(MetaCatalog::new());
        let checker = KillChecker::new(Arc::clone(&catalog2), 7, 7, 4);
        assert!(!checker.check());
        catalog2.kill_plan(7, 7);
        assert!(!checker.check());
        assert!(!checker.check());
        assert!(!checker.check());
        // fifth call polls again and observes the kill
        assert!(checker.check());
    }
}
