//! Shared helpers for dispatcher integration tests.

#![allow(dead_code)]

use flux_dispatch::{DispatchToken, Dispatcher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub mod strategies;

/// Ordered record of handler activity, shared across handlers
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Arc<parking_lot::Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == entry).count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.lock().iter().position(|e| e == entry)
    }
}

/// Invocation counter for one handler
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Register a handler that appends `label` to `log` for every message
pub fn register_recorder<M>(dispatcher: &Dispatcher<M>, log: &EventLog, label: &str) -> DispatchToken
where
    M: Send + Sync + 'static,
{
    let log = log.clone();
    let label = label.to_string();
    dispatcher.register(move |_action| {
        let log = log.clone();
        let label = label.clone();
        async move {
            log.push(label);
            Ok(())
        }
    })
}

/// Register a handler that sleeps for `delay` and then appends `label` to `log`
pub fn register_slow_recorder<M>(
    dispatcher: &Dispatcher<M>,
    log: &EventLog,
    label: &str,
    delay: Duration,
) -> DispatchToken
where
    M: Send + Sync + 'static,
{
    let log = log.clone();
    let label = label.to_string();
    dispatcher.register(move |_action| {
        let log = log.clone();
        let label = label.clone();
        async move {
            tokio::time::sleep(delay).await;
            log.push(label);
            Ok(())
        }
    })
}

/// Register a handler that waits for `deps` and then appends `label` to `log`
pub fn register_waiter<M>(
    dispatcher: &Dispatcher<M>,
    log: &EventLog,
    label: &str,
    deps: Vec<DispatchToken>,
) -> DispatchToken
where
    M: Send + Sync + 'static,
{
    let log = log.clone();
    let label = label.to_string();
    dispatcher.register(move |action| {
        let log = log.clone();
        let label = label.clone();
        let deps = deps.clone();
        async move {
            action.wait_for(&deps).await?;
            log.push(label);
            Ok(())
        }
    })
}
