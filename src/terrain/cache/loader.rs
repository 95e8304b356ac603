use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_queue::SegQueue;
use tracing::{debug, info};

use crate::terrain::error::Result;

pub type LoadJob = Box<dyn FnOnce() + Send + 'static>;

// Upper bound on how long an idle worker sleeps before rechecking the queue.
const IDLE_PARK: Duration = Duration::from_millis(50);

struct LoaderShared {
    queue: SegQueue<LoadJob>,
    shutdown: AtomicBool,
}

/// Worker threads running tile fetches off the update thread.
///
/// Dropping the loader asks the workers to stop; they finish the job they are
/// running and discard whatever is still queued.
pub struct TileLoader {
    name: String,
    shared: Arc<LoaderShared>,
    workers: Vec<JoinHandle<()>>,
}

impl TileLoader {
    pub fn new(name: &str, threads: usize) -> Result<Self> {
        let shared = Arc::new(LoaderShared {
            queue: SegQueue::new(),
            shutdown: AtomicBool::new(false),
        });

        let mut workers = Vec::with_capacity(threads.max(1));
        for i in 0..threads.max(1) {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("{name}-{i}"))
                .spawn(move || worker_loop(shared))?;
            workers.push(handle);
        }

        info!("started tile loader '{}' with {} worker(s)", name, workers.len());
        Ok(Self {
            name: name.to_string(),
            shared,
            workers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn submit(&self, job: LoadJob) {
        self.shared.queue.push(job);
        for worker in &self.workers {
            worker.thread().unpark();
        }
    }
}

impl Drop for TileLoader {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        for worker in &self.workers {
            worker.thread().unpark();
        }
        debug!("tile loader '{}' shutting down", self.name);
    }
}

fn worker_loop(shared: Arc<LoaderShared>) {
    while !shared.shutdown.load(Ordering::Acquire) {
        match shared.queue.pop() {
            Some(job) => job(),
            None => thread::park_timeout(IDLE_PARK),
        }
    }
}
