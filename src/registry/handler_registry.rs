//! # Handler Registry
//!
//! Token-keyed storage for dispatch handlers.
//!
//! ## Overview
//!
//! The HandlerRegistry hands out a fresh `DispatchToken` for every handler it
//! stores and removes handlers on request. It never runs handlers itself: a
//! dispatch takes a [`snapshot`](HandlerRegistry::snapshot) and works from
//! that, so registry mutations made while a message is in flight only affect
//! later dispatches.
//!
//! ## Usage
//!
//! ```rust
//! use flux_dispatch::registry::HandlerRegistry;
//!
//! let registry: HandlerRegistry<u32> = HandlerRegistry::new();
//! let token = registry.register_fn(|_action| async { Ok(()) });
//! assert!(registry.contains(token));
//!
//! registry.unregister(token).unwrap();
//! assert!(registry.unregister(token).is_err());
//! ```

use crate::constants::FIRST_TOKEN_ID;
use crate::dispatch::{Action, DispatchToken};
use crate::error::{DispatchError, Result};
use crate::logging::log_registry_operation;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A unit of work invoked once per dispatched message
#[async_trait]
pub trait DispatchHandler<M>: Send + Sync {
    /// Handle one message. Errors fail the whole dispatch.
    async fn handle(&self, action: Action<M>) -> anyhow::Result<()>;

    /// Get handler name for identification in logs
    fn handler_name(&self) -> &str {
        "unnamed_handler"
    }
}

/// Adapts a closure returning a future into a `DispatchHandler`
pub struct FnHandler<F> {
    callback: F,
}

impl<F> FnHandler<F> {
    pub fn new<M, Fut>(callback: F) -> Self
    where
        F: Fn(Action<M>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        Self { callback }
    }
}

#[async_trait]
impl<M, F, Fut> DispatchHandler<M> for FnHandler<F>
where
    M: Send + Sync + 'static,
    F: Fn(Action<M>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, action: Action<M>) -> anyhow::Result<()> {
        (self.callback)(action).await
    }

    fn handler_name(&self) -> &str {
        "fn_handler"
    }
}

/// Registry for managing dispatch handlers
pub struct HandlerRegistry<M> {
    /// Map of token to handler; token order is registration order
    handlers: RwLock<BTreeMap<DispatchToken, Arc<dyn DispatchHandler<M>>>>,
    /// Next raw token value
    next_id: AtomicU64,
}

impl<M> HandlerRegistry<M>
where
    M: Send + Sync + 'static,
{
    /// Create a new, empty handler registry
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(FIRST_TOKEN_ID),
        }
    }

    /// Register a handler and return its freshly issued token
    pub fn register(&self, handler: Arc<dyn DispatchHandler<M>>) -> DispatchToken {
        let token = DispatchToken::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        let name = handler.handler_name().to_string();

        self.handlers.write().insert(token, handler);

        log_registry_operation("register", token, Some(&name), "registered");
        token
    }

    /// Register a closure as a handler
    pub fn register_fn<F, Fut>(&self, callback: F) -> DispatchToken
    where
        F: Fn(Action<M>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(Arc::new(FnHandler::new(callback)))
    }

    /// Remove a handler
    pub fn unregister(&self, token: DispatchToken) -> Result<()> {
        let removed = self.handlers.write().remove(&token);

        match removed {
            Some(handler) => {
                log_registry_operation(
                    "unregister",
                    token,
                    Some(handler.handler_name()),
                    "unregistered",
                );
                Ok(())
            }
            None => Err(DispatchError::UnknownHandler(token)),
        }
    }

    /// Check whether a token currently maps to a handler
    pub fn contains(&self, token: DispatchToken) -> bool {
        self.handlers.read().contains_key(&token)
    }

    /// Registered tokens in registration order
    pub fn tokens(&self) -> Vec<DispatchToken> {
        self.handlers.read().keys().copied().collect()
    }

    /// Copy of the current token/handler table, in registration order
    pub fn snapshot(&self) -> Vec<(DispatchToken, Arc<dyn DispatchHandler<M>>)> {
        self.handlers
            .read()
            .iter()
            .map(|(token, handler)| (*token, Arc::clone(handler)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl<M> Default for HandlerRegistry<M>
where
    M: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> std::fmt::Debug for HandlerRegistry<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("tokens", &self.handlers.read().keys().collect::<Vec<_>>())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}
