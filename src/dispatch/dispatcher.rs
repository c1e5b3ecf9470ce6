//! # Dispatcher
//!
//! The single point every message passes through on its way to the
//! registered handlers.
//!
//! ## Overview
//!
//! `dispatch` snapshots the registry into a fresh execution context, starts
//! every handler concurrently in registration order and resolves once all of
//! them completed. Handlers may order themselves after others with
//! `wait_for`; each handler still runs at most once per message, and a
//! dependency cycle fails the dispatch with `CircularDependency` instead of
//! hanging.
//!
//! ## Usage
//!
//! ```rust
//! use flux_dispatch::Dispatcher;
//! use std::sync::{Arc, Mutex};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher: Dispatcher<&'static str> = Dispatcher::new();
//! let log = Arc::new(Mutex::new(Vec::new()));
//!
//! let first_log = log.clone();
//! let first = dispatcher.register(move |_action| {
//!     let log = first_log.clone();
//!     async move {
//!         log.lock().unwrap().push("1");
//!         Ok(())
//!     }
//! });
//!
//! let second_log = log.clone();
//! dispatcher.register(move |action| {
//!     let log = second_log.clone();
//!     async move {
//!         action.wait_for(&[first]).await?;
//!         log.lock().unwrap().push("2");
//!         Ok(())
//!     }
//! });
//!
//! dispatcher.dispatch("message").await?;
//! assert_eq!(*log.lock().unwrap(), vec!["1", "2"]);
//! # Ok(())
//! # }
//! ```

use super::context::{ExecutionContext, Resolution};
use super::{Action, DispatchToken};
use crate::config::DispatcherConfig;
use crate::error::Result;
use crate::logging::log_dispatch_operation;
use crate::registry::{DispatchHandler, HandlerRegistry};
use futures::future;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

struct DispatcherInner<M> {
    registry: HandlerRegistry<M>,
    config: DispatcherConfig,
    in_flight: AtomicUsize,
}

/// Broadcast coordinator for messages of type `M`.
///
/// Cloning is cheap and yields a handle to the same registry.
pub struct Dispatcher<M> {
    inner: Arc<DispatcherInner<M>>,
}

impl<M> Dispatcher<M>
where
    M: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                registry: HandlerRegistry::new(),
                config,
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// Register a closure as a handler.
    ///
    /// Registering while a dispatch is in flight is allowed; the new handler
    /// only sees messages dispatched afterwards.
    pub fn register<F, Fut>(&self, callback: F) -> DispatchToken
    where
        F: Fn(Action<M>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.inner.registry.register_fn(callback)
    }

    /// Register a handler trait object.
    pub fn register_handler(&self, handler: Arc<dyn DispatchHandler<M>>) -> DispatchToken {
        self.inner.registry.register(handler)
    }

    /// Remove a handler. Dispatches already in flight are unaffected.
    pub fn unregister(&self, token: DispatchToken) -> Result<()> {
        self.inner.registry.unregister(token)
    }

    /// Wait for `tokens` from inside the handler that received `action`.
    pub async fn wait_for(&self, tokens: &[DispatchToken], action: &Action<M>) -> Result<()> {
        action.wait_for(tokens).await
    }

    /// Broadcast `payload` to every registered handler.
    ///
    /// Resolves once every handler completed, or with the first failure.
    /// After a failure the remaining handlers keep running in the
    /// background; nothing they did is rolled back.
    pub async fn dispatch(&self, payload: M) -> Result<()> {
        let _in_flight = InFlight::enter(&self.inner.in_flight);
        let started = Instant::now();
        let context = ExecutionContext::new(payload, self.inner.registry.snapshot(), &self.inner.config);
        log_dispatch_operation("dispatch", context.id(), context.len(), "started", None);

        let mut pending = Vec::with_capacity(context.len());
        for token in context.tokens() {
            if let Resolution::Pending(outcome) = context.execute_callback(token, None)? {
                pending.push(outcome);
            }
        }

        let outcome = future::try_join_all(pending.iter().cloned()).await;
        match outcome {
            Ok(_) => {
                context.close();
                log_dispatch_operation(
                    "dispatch",
                    context.id(),
                    context.len(),
                    "completed",
                    Some(started.elapsed().as_millis() as u64),
                );
                Ok(())
            }
            Err(error) => {
                log_dispatch_operation(
                    "dispatch",
                    context.id(),
                    context.len(),
                    "failed",
                    Some(started.elapsed().as_millis() as u64),
                );
                let settling = Arc::clone(&context);
                tokio::spawn(async move {
                    future::join_all(pending).await;
                    settling.close();
                });
                Err(error)
            }
        }
    }

    /// Whether any `dispatch` call on this dispatcher is currently running
    pub fn is_dispatching(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire) > 0
    }

    pub fn is_registered(&self, token: DispatchToken) -> bool {
        self.inner.registry.contains(token)
    }

    /// Registered tokens in registration order
    pub fn tokens(&self) -> Vec<DispatchToken> {
        self.inner.registry.tokens()
    }

    pub fn len(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.registry.is_empty()
    }
}

impl<M> Clone for Dispatcher<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> Default for Dispatcher<M>
where
    M: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for Dispatcher<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.inner.registry)
            .field("config", &self.inner.config)
            .field("in_flight", &self.inner.in_flight.load(Ordering::Relaxed))
            .finish()
    }
}

/// Counts a running `dispatch` call for as long as it is alive
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
