use super::emitter::{ChangeEmitter, ListenerHandle};
use crate::dispatch::{Action, DispatchToken, Dispatcher};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// State transition function of a store
///
/// `reduce` may call `action.wait_for(..)` with other stores' tokens to see
/// their state for the same message first.
#[async_trait]
pub trait Reducer<M>: Send + Sync + 'static {
    type State: Clone + PartialEq + Send + Sync + 'static;

    fn initial_state(&self) -> Self::State;

    async fn reduce(&self, state: Self::State, action: &Action<M>) -> anyhow::Result<Self::State>;

    /// Whether a reduction produced no change
    fn are_equal(&self, current: &Self::State, next: &Self::State) -> bool {
        current == next
    }
}

struct StoreInner<M, R: Reducer<M>> {
    reducer: R,
    state: RwLock<R::State>,
    changed: AtomicBool,
    emitter: Arc<ChangeEmitter>,
    _message: PhantomData<fn(M)>,
}

impl<M, R> StoreInner<M, R>
where
    M: Send + Sync + 'static,
    R: Reducer<M>,
{
    /// No lock is held across `reduce`, which may wait on other stores.
    /// Concurrent dispatches each reduce from the state they read; the last
    /// write wins.
    async fn on_dispatch(&self, action: Action<M>) -> anyhow::Result<()> {
        self.changed.store(false, Ordering::Release);

        let current = self.state.read().clone();
        let next = self.reducer.reduce(current.clone(), &action).await?;

        if !self.reducer.are_equal(&current, &next) {
            *self.state.write() = next;
            self.changed.store(true, Ordering::Release);
            debug!(dispatch_id = ?action.dispatch_id(), "Store state changed");
            self.emitter.emit();
        }
        Ok(())
    }
}

/// Reducer-backed state registered as one dispatcher handler
pub struct Store<M, R: Reducer<M>> {
    inner: Arc<StoreInner<M, R>>,
    dispatcher: Dispatcher<M>,
    token: DispatchToken,
}

impl<M, R> Store<M, R>
where
    M: Send + Sync + 'static,
    R: Reducer<M>,
{
    /// Create the store and register its handler with `dispatcher`
    pub fn register(dispatcher: &Dispatcher<M>, reducer: R) -> Self {
        let inner = Arc::new(StoreInner {
            state: RwLock::new(reducer.initial_state()),
            reducer,
            changed: AtomicBool::new(false),
            emitter: Arc::new(ChangeEmitter::new()),
            _message: PhantomData,
        });

        let handler_inner = Arc::clone(&inner);
        let token = dispatcher.register(move |action| {
            let inner = Arc::clone(&handler_inner);
            async move { inner.on_dispatch(action).await }
        });

        Self {
            inner,
            dispatcher: dispatcher.clone(),
            token,
        }
    }

    /// Current state
    pub fn state(&self) -> R::State {
        self.inner.state.read().clone()
    }

    pub fn reducer(&self) -> &R {
        &self.inner.reducer
    }

    pub fn dispatcher(&self) -> &Dispatcher<M> {
        &self.dispatcher
    }

    /// Token other handlers can wait for
    pub fn dispatch_token(&self) -> DispatchToken {
        self.token
    }

    /// Whether the most recent reduction changed the state
    pub fn has_changed(&self) -> bool {
        self.inner.changed.load(Ordering::Acquire)
    }

    /// Call `listener` after every reduction that changes the state
    pub fn add_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.emitter.add_listener(listener)
    }

    /// Drive the reducer with an action directly, bypassing the dispatcher
    pub async fn invoke(&self, action: Action<M>) -> anyhow::Result<()> {
        self.inner.on_dispatch(action).await
    }

    /// Remove the store's handler from the dispatcher
    pub fn unregister(self) -> Result<()> {
        self.dispatcher.unregister(self.token)
    }
}

impl<M, R> fmt::Debug for Store<M, R>
where
    R: Reducer<M>,
    R::State: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("token", &self.token)
            .field("state", &*self.inner.state.read())
            .field("changed", &self.inner.changed.load(Ordering::Relaxed))
            .finish()
    }
}
