use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::ScopedTimer;

struct ScopeInner {
    token: CancellationToken,
    mounted: AtomicBool,
    timers: Mutex<Vec<ScopedTimer>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Lifetime of one mounted screen.
///
/// Tasks and timers started through the scope stop when it closes. Anything
/// that resumes after an await checks `is_mounted` before touching shared
/// state or navigating.
#[derive(Clone)]
pub struct ScreenScope {
    inner: Arc<ScopeInner>,
}

impl ScreenScope {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                token: CancellationToken::new(),
                mounted: AtomicBool::new(true),
                timers: Mutex::new(Vec::new()),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.load(Ordering::Acquire) && !self.inner.token.is_cancelled()
    }

    /// First step of teardown: post-await code stops acting, timers still armed.
    pub fn mark_unmounted(&self) {
        self.inner.mounted.store(false, Ordering::Release);
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.inner.token.child_token()
    }

    /// Spawn a task that is dropped at its next await once the scope closes.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.inner.token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = task => {}
            }
        });

        let mut tasks = lock(&self.inner.tasks);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    pub fn schedule<F>(&self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let timer = ScopedTimer::schedule(&self.inner.token, delay, action);
        let mut timers = lock(&self.inner.timers);
        timers.retain(ScopedTimer::is_pending);
        timers.push(timer);
    }

    pub fn pending_timers(&self) -> usize {
        lock(&self.inner.timers)
            .iter()
            .filter(|timer| timer.is_pending())
            .count()
    }

    pub fn cancel_timers(&self) {
        let timers: Vec<ScopedTimer> = lock(&self.inner.timers).drain(..).collect();
        drop(timers);
    }

    /// Final teardown step: unmount, cancel timers, abort owned tasks.
    pub fn close(&self) {
        self.mark_unmounted();
        self.cancel_timers();
        self.inner.token.cancel();
        for task in lock(&self.inner.tasks).drain(..) {
            task.abort();
        }
    }
}

impl Default for ScreenScope {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
