//! Worker pool that runs trigger actions off the reading loops

use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send>;

/// Fixed set of worker threads fed from one queue.
///
/// Jobs run concurrently up to the worker count; the rest wait in the
/// queue. A panicking job never takes its worker down.
pub(crate) struct ActionPool {
    jobs: mpsc::UnboundedSender<Job>,
}

impl ActionPool {
    pub(crate) fn new(workers: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        for id in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            let spawned = thread::Builder::new()
                .name(format!("deck-action-{}", id))
                .spawn(move || worker(rx));
            if let Err(e) = spawned {
                warn!("Could not start action worker {}: {}", id, e);
            }
        }
        debug!("Action pool started with {} worker(s)", workers.max(1));
        Self { jobs: tx }
    }

    /// Pool shared by every deck in the process
    pub(crate) fn global() -> &'static ActionPool {
        static POOL: OnceLock<ActionPool> = OnceLock::new();
        POOL.get_or_init(|| {
            let workers = thread::available_parallelism().map_or(4, |n| n.get()).max(4);
            ActionPool::new(workers)
        })
    }

    /// Queue `job`; the receiver yields its result, or an error if it panicked
    pub(crate) fn run<T>(
        &self,
        job: impl FnOnce() -> T + Send + 'static,
    ) -> oneshot::Receiver<thread::Result<T>>
    where
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            let _ = tx.send(panic::catch_unwind(AssertUnwindSafe(job)));
        });
        // No worker could be started; run on the caller's thread
        if let Err(mpsc::error::SendError(rejected)) = self.jobs.send(job) {
            rejected();
        }
        rx
    }
}

fn worker(jobs: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>) {
    loop {
        let job = jobs.lock().blocking_recv();
        match job {
            Some(job) => job(),
            None => break,
        }
    }
}

/// Text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
