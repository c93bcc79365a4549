//! Worker pools for database tasks.
//!
//! The pool is owned by the caller and injected into the
//! [`Monitor`](super::Monitor). Jobs must not assume they run on any
//! particular thread.

use tracing::error;

/// A unit of work submitted to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs, usually on other threads.
///
/// An executor that cannot run a job must drop it; the job's resources
/// (including its join registration) are released on drop.
pub trait Executor: Send + Sync {
    fn execute(&self, name: String, job: Job);
}

/// Bounded pool.
impl Executor for rayon::ThreadPool {
    fn execute(&self, _name: String, job: Job) {
        self.spawn(job);
    }
}

/// Spawns one named OS thread per job.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadExecutor;

impl Executor for ThreadExecutor {
    fn execute(&self, name: String, job: Job) {
        if let Err(e) = std::thread::Builder::new().name(name.clone()).spawn(job) {
            error!(task = %name, error = %e, "failed to spawn worker thread");
        }
    }
}

/// Runs each job on the submitting thread before returning.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, _name: String, job: Job) {
        job();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    fn run_all(executor: &dyn Executor, n: usize) -> usize {
        let count = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        for i in 0..n {
            let count = Arc::clone(&count);
            let tx = tx.clone();
            executor.execute(
                format!("job-{}", i),
                Box::new(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                    let _ = tx.send(());
                }),
            );
        }
        for _ in 0..n {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        count.load(Ordering::SeqCst)
    }

    #[test]
    fn rayon_pool_runs_every_job() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        assert_eq!(run_all(&pool, 10), 10);
    }

    #[test]
    fn thread_executor_runs_every_job() {
        assert_eq!(run_all(&ThreadExecutor, 4), 4);
    }

    #[test]
    fn inline_executor_runs_before_returning() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        InlineExecutor.execute(
            "inline".to_string(),
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
