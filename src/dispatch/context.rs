//! Per-message execution state.
//!
//! One `ExecutionContext` exists per `dispatch` call. It snapshots the
//! handlers registered when the dispatch began and tracks, for this message
//! only, which of them have not started, are in flight, or have completed.
//! Handler outcomes are memoized as shared futures so every waiter of a
//! handler observes the single run of that handler.

use super::{Action, DispatchToken, HandlerState};
use crate::config::DispatcherConfig;
use crate::error::{DispatchError, Result};
use crate::logging::log_error;
use crate::registry::DispatchHandler;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Memoized outcome of one handler run
pub(crate) type Outcome = Shared<BoxFuture<'static, Result<()>>>;

/// Result of asking the context to execute a handler
pub(crate) enum Resolution {
    /// Handler already completed for this message
    Ready,
    /// Handler is running; await the outcome
    Pending(Outcome),
}

enum Slot {
    NotStarted,
    Awaiting(Outcome),
    Completed,
}

impl Slot {
    fn state(&self) -> HandlerState {
        match self {
            Self::NotStarted => HandlerState::NotStarted,
            Self::Awaiting(_) => HandlerState::Awaiting,
            Self::Completed => HandlerState::Completed,
        }
    }
}

enum Next<M> {
    Join(Outcome),
    Start(Arc<dyn DispatchHandler<M>>),
}

struct HandlerEntry<M> {
    handler: Arc<dyn DispatchHandler<M>>,
    slot: Slot,
}

struct ContextState<M> {
    entries: BTreeMap<DispatchToken, HandlerEntry<M>>,
    /// Waiter -> tokens it is currently blocked on
    waiting: HashMap<DispatchToken, Vec<DispatchToken>>,
}

impl<M> ContextState<M> {
    /// True if `from` is, directly or through other waiters, blocked on `target`.
    /// A token always reaches itself.
    fn reaches(&self, from: DispatchToken, target: DispatchToken) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();

        while let Some(token) = stack.pop() {
            if token == target {
                return true;
            }
            if seen.insert(token) {
                if let Some(next) = self.waiting.get(&token) {
                    stack.extend(next.iter().copied());
                }
            }
        }
        false
    }

    fn add_wait(&mut self, waiter: DispatchToken, target: DispatchToken) {
        self.waiting.entry(waiter).or_default().push(target);
    }

    fn remove_wait(&mut self, waiter: DispatchToken, target: DispatchToken) {
        if let Some(targets) = self.waiting.get_mut(&waiter) {
            if let Some(index) = targets.iter().position(|t| *t == target) {
                targets.swap_remove(index);
            }
            if targets.is_empty() {
                self.waiting.remove(&waiter);
            }
        }
    }
}

pub(crate) struct ExecutionContext<M> {
    id: Uuid,
    payload: Arc<M>,
    catch_panics: bool,
    slow_handler_threshold: Option<Duration>,
    state: Mutex<ContextState<M>>,
    closed: AtomicBool,
}

impl<M> ExecutionContext<M> {
    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn payload(&self) -> &Arc<M> {
        &self.payload
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop accepting dependency waits
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn status_of(&self, token: DispatchToken) -> Option<HandlerState> {
        self.state
            .lock()
            .entries
            .get(&token)
            .map(|entry| entry.slot.state())
    }

    /// Tokens taking part in this dispatch, in registration order
    pub(crate) fn tokens(&self) -> Vec<DispatchToken> {
        self.state.lock().entries.keys().copied().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    fn mark_completed(&self, token: DispatchToken) {
        if let Some(entry) = self.state.lock().entries.get_mut(&token) {
            entry.slot = Slot::Completed;
        }
    }
}

impl<M> ExecutionContext<M>
where
    M: Send + Sync + 'static,
{
    pub(crate) fn new(
        payload: M,
        handlers: Vec<(DispatchToken, Arc<dyn DispatchHandler<M>>)>,
        config: &DispatcherConfig,
    ) -> Arc<Self> {
        let entries = handlers
            .into_iter()
            .map(|(token, handler)| {
                (
                    token,
                    HandlerEntry {
                        handler,
                        slot: Slot::NotStarted,
                    },
                )
            })
            .collect();

        Arc::new(Self {
            id: Uuid::new_v4(),
            payload: Arc::new(payload),
            catch_panics: config.catch_panics,
            slow_handler_threshold: config.slow_handler_threshold(),
            state: Mutex::new(ContextState {
                entries,
                waiting: HashMap::new(),
            }),
            closed: AtomicBool::new(false),
        })
    }

    /// Start `token` if needed and hand back its memoized outcome.
    ///
    /// `waiter` is the handler asking, if any. When the requested handler is
    /// already in flight and transitively waiting on `waiter`, joining it
    /// could never finish, so this fails with `CircularDependency`. On
    /// `Pending` with a waiter, a wait edge `waiter -> token` is recorded
    /// and must be removed by the caller once the wait ends.
    pub(crate) fn execute_callback(
        self: &Arc<Self>,
        token: DispatchToken,
        waiter: Option<DispatchToken>,
    ) -> Result<Resolution> {
        let mut state = self.state.lock();

        let entry = state
            .entries
            .get(&token)
            .ok_or(DispatchError::UnknownHandler(token))?;
        let next = match &entry.slot {
            Slot::Completed => return Ok(Resolution::Ready),
            Slot::Awaiting(outcome) => Next::Join(outcome.clone()),
            Slot::NotStarted => Next::Start(Arc::clone(&entry.handler)),
        };

        if let Some(waiter) = waiter {
            if state.reaches(token, waiter) {
                warn!(
                    dispatch_id = %self.id,
                    waiter = %waiter,
                    handler = %token,
                    "Circular dependency detected"
                );
                return Err(DispatchError::CircularDependency(token));
            }
        }

        let (outcome, spawn) = match next {
            Next::Join(outcome) => (outcome, false),
            Next::Start(handler) => {
                let outcome = self.start(token, handler);
                if let Some(entry) = state.entries.get_mut(&token) {
                    entry.slot = Slot::Awaiting(outcome.clone());
                }
                (outcome, true)
            }
        };

        if let Some(waiter) = waiter {
            state.add_wait(waiter, token);
        }
        drop(state);

        if spawn {
            // Runs to completion even if every waiter is dropped.
            tokio::spawn(outcome.clone());
        }
        Ok(Resolution::Pending(outcome))
    }

    /// Wait for every handler in `tokens` on behalf of `waiter`.
    pub(crate) async fn wait_for(
        self: &Arc<Self>,
        waiter: Option<DispatchToken>,
        tokens: &[DispatchToken],
    ) -> Result<()> {
        let mut edges = WaitEdges {
            context: Arc::clone(self),
            waiter,
            targets: Vec::new(),
        };

        let mut pending = Vec::with_capacity(tokens.len());
        for &token in tokens {
            if let Resolution::Pending(outcome) = self.execute_callback(token, waiter)? {
                if waiter.is_some() {
                    edges.targets.push(token);
                }
                pending.push(outcome);
            }
        }

        future::try_join_all(pending).await?;
        Ok(())
    }

    fn start(self: &Arc<Self>, token: DispatchToken, handler: Arc<dyn DispatchHandler<M>>) -> Outcome {
        let context = Arc::clone(self);
        let action = Action::for_handler(Arc::clone(self), token);
        async move { context.run_handler(token, handler, action).await }
            .boxed()
            .shared()
    }

    async fn run_handler(
        self: Arc<Self>,
        token: DispatchToken,
        handler: Arc<dyn DispatchHandler<M>>,
        action: Action<M>,
    ) -> Result<()> {
        let name = handler.handler_name().to_string();
        let started = Instant::now();
        debug!(
            dispatch_id = %self.id,
            handler = %token,
            name = %name,
            "Invoking handler"
        );

        let invocation = async move { handler.handle(action).await };
        let result = if self.catch_panics {
            match AssertUnwindSafe(invocation).catch_unwind().await {
                Ok(result) => result.map_err(|e| DispatchError::from_handler(token, e)),
                Err(panic) => Err(DispatchError::HandlerPanicked {
                    token,
                    message: panic_message(panic.as_ref()),
                }),
            }
        } else {
            invocation
                .await
                .map_err(|e| DispatchError::from_handler(token, e))
        };

        let elapsed = started.elapsed();
        if let Some(threshold) = self.slow_handler_threshold {
            if elapsed > threshold {
                warn!(
                    dispatch_id = %self.id,
                    handler = %token,
                    name = %name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    threshold_ms = threshold.as_millis() as u64,
                    "Slow handler"
                );
            }
        }

        match result {
            Ok(()) => {
                self.mark_completed(token);
                debug!(
                    dispatch_id = %self.id,
                    handler = %token,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Handler completed"
                );
                Ok(())
            }
            Err(error) => {
                log_error(
                    "dispatcher",
                    "handle",
                    &error.to_string(),
                    Some(&format!("dispatch_id={} handler={token} name={name}", self.id)),
                );
                Err(error)
            }
        }
    }
}

/// Wait edges recorded for one `wait_for` call, removed when the wait ends
struct WaitEdges<M> {
    context: Arc<ExecutionContext<M>>,
    waiter: Option<DispatchToken>,
    targets: Vec<DispatchToken>,
}

impl<M> Drop for WaitEdges<M> {
    fn drop(&mut self) {
        let Some(waiter) = self.waiter else {
            return;
        };
        if self.targets.is_empty() {
            return;
        }
        let mut state = self.context.state.lock();
        for target in &self.targets {
            state.remove_wait(waiter, *target);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
