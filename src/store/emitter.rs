use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Listener = Arc<dyn Fn() + Send + Sync>;

/// Change notifier for a store
pub struct ChangeEmitter {
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

impl ChangeEmitter {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a listener; it stays attached until removed through the returned handle
    pub fn add_listener<F>(self: &Arc<Self>, listener: F) -> ListenerHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));
        ListenerHandle {
            emitter: Arc::downgrade(self),
            id,
        }
    }

    fn remove_listener(&self, id: u64) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Invoke every listener once
    ///
    /// Listeners run outside the lock, so they may add or remove listeners.
    pub fn emit(&self) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener();
        }
    }

    /// Get the number of attached listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl Default for ChangeEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChangeEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeEmitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Handle returned by `add_listener`, used to detach the listener
#[derive(Debug)]
pub struct ListenerHandle {
    emitter: Weak<ChangeEmitter>,
    id: u64,
}

impl ListenerHandle {
    /// Detach the listener. Returns false if it was already gone.
    pub fn remove(self) -> bool {
        self.emitter
            .upgrade()
            .is_some_and(|emitter| emitter.remove_listener(self.id))
    }
}
