use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use thiserror::Error;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

/// Writes queued behind the journal thread before callers start getting
/// `Backlogged`. A visit produces a handful of rows, so this only fills up
/// when the disk stalls.
pub const QUEUE_DEPTH: usize = 64;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// Why a job never reached SQLite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JournalError {
    #[error("journal queue is full")]
    Backlogged,
    #[error("journal thread is not running")]
    WorkerGone,
}

/// Clears the liveness flag however the thread exits, panics included.
struct AliveGuard(Arc<AtomicBool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct Worker {
    jobs: Option<mpsc::SyncSender<Job>>,
    alive: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        // closing the queue lets the thread drain what is left and exit
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("journal thread panicked");
            }
        }
    }
}

/// Visit journal. The connection is opened and migrated on the caller's
/// thread, then handed to a dedicated thread that runs every query.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
}

impl Database {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create journal directory {}", parent.display()))?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("failed to open journal {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("failed to enable WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("failed to enable foreign keys")?;
        run_migrations(&mut conn).context("failed to run journal migrations")?;

        let database = Self::spawn(conn)?;
        info!("Journal opened at {}", path.display());
        Ok(database)
    }

    fn spawn(mut conn: Connection) -> Result<Self> {
        let (jobs, queue) = mpsc::sync_channel::<Job>(QUEUE_DEPTH);
        let alive = Arc::new(AtomicBool::new(true));
        let guard = AliveGuard(alive.clone());

        let thread = thread::Builder::new()
            .name("kiosk-db".into())
            .spawn(move || {
                let _guard = guard;
                for job in queue {
                    job(&mut conn);
                }
                info!("Journal thread stopped");
            })
            .context("failed to spawn journal thread")?;

        Ok(Self {
            worker: Arc::new(Worker {
                jobs: Some(jobs),
                alive,
                thread: Some(thread),
            }),
        })
    }

    /// False once the journal thread has exited; every later call fails with
    /// `JournalError::WorkerGone`.
    pub fn is_alive(&self) -> bool {
        self.worker.alive.load(Ordering::SeqCst)
    }

    /// Queue `task` on the journal thread and wait for its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let reply = self.submit(task)?;
        reply.await.map_err(|_| JournalError::WorkerGone)?
    }

    /// Enqueue without waiting. Never blocks: a full queue is reported as
    /// `JournalError::Backlogged` instead of stalling the flow.
    fn submit<F, T>(&self, task: F) -> Result<oneshot::Receiver<Result<T>>, JournalError>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let jobs = self.worker.jobs.as_ref().ok_or(JournalError::WorkerGone)?;
        let (reply_tx, reply_rx) = oneshot::channel();

        let job: Job = Box::new(move |conn| {
            // the caller may have been cancelled; the write still happened
            let _ = reply_tx.send(task(conn));
        });

        match jobs.try_send(job) {
            Ok(()) => Ok(reply_rx),
            Err(mpsc::TrySendError::Full(_)) => {
                warn!("journal queue full ({QUEUE_DEPTH}); dropping write");
                Err(JournalError::Backlogged)
            }
            Err(mpsc::TrySendError::Disconnected(_)) => Err(JournalError::WorkerGone),
        }
    }
}
