use anyhow::{Context, Result};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct Timers<K> {
    deadlines: HashMap<K, Instant>,
    stopped: bool,
}

struct Shared<K> {
    timers: Mutex<Timers<K>>,
    wake: Condvar,
    window: Duration,
}

impl<K> Shared<K> {
    fn lock(&self) -> MutexGuard<'_, Timers<K>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Trailing-edge debouncer: each `schedule` for a key pushes that key's
/// deadline to `now + window`; the callback fires once per quiet window.
/// One worker thread serves every key.
pub struct Debouncer<K> {
    shared: Arc<Shared<K>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new<F>(window: Duration, on_fire: F) -> Result<Self>
    where
        F: Fn(K) + Send + 'static,
    {
        let shared = Arc::new(Shared {
            timers: Mutex::new(Timers {
                deadlines: HashMap::new(),
                stopped: false,
            }),
            wake: Condvar::new(),
            window,
        });
        let worker_state = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("roster-debounce".into())
            .spawn(move || worker_loop(&worker_state, on_fire))
            .context("failed to spawn debounce worker")?;
        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn window(&self) -> Duration {
        self.shared.window
    }

    /// (Re)arm the timer for `key`, replacing any pending deadline.
    pub fn schedule(&self, key: K) {
        let deadline = Instant::now() + self.shared.window;
        let mut timers = self.shared.lock();
        if timers.stopped {
            return;
        }
        timers.deadlines.insert(key, deadline);
        drop(timers);
        self.shared.wake.notify_one();
    }

    /// Disarm `key`. Returns whether a timer was pending.
    pub fn cancel(&self, key: &K) -> bool {
        self.shared.lock().deadlines.remove(key).is_some()
    }

    /// Stop the worker. Pending timers are dropped without firing.
    pub fn shutdown(&self) {
        {
            let mut timers = self.shared.lock();
            timers.stopped = true;
            timers.deadlines.clear();
        }
        self.shared.wake.notify_all();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };
        // A callback that shuts down its own debouncer cannot join itself.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!("debounce worker panicked");
        }
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        {
            let mut timers = self.shared.lock();
            timers.stopped = true;
        }
        self.shared.wake.notify_all();
    }
}

fn worker_loop<K, F>(shared: &Shared<K>, on_fire: F)
where
    K: Eq + Hash + Clone,
    F: Fn(K),
{
    let mut timers = shared.lock();
    loop {
        if timers.stopped {
            return;
        }
        let now = Instant::now();
        let due = timers
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        if !due.is_empty() {
            for key in &due {
                timers.deadlines.remove(key);
            }
            drop(timers);
            for key in due {
                on_fire(key);
            }
            timers = shared.lock();
            continue;
        }

        timers = match timers.deadlines.values().min().copied() {
            None => shared.wake.wait(timers).unwrap_or_else(PoisonError::into_inner),
            Some(next) => {
                shared
                    .wake
                    .wait_timeout(timers, next.saturating_duration_since(now))
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        };
    }
}
