use super::context::ExecutionContext;
use super::{DispatchToken, HandlerState};
use crate::error::{DispatchError, Result};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use uuid::Uuid;

/// The message as seen by one handler during one dispatch.
///
/// Besides the payload, an action carries the execution context of the
/// dispatch that produced it, which is what [`Action::wait_for`] resolves
/// dependencies against. Actions built with [`Action::new`] are detached:
/// they carry a payload but no context.
pub struct Action<M> {
    payload: Arc<M>,
    context: Option<Arc<ExecutionContext<M>>>,
    handler: Option<DispatchToken>,
}

impl<M> Action<M>
where
    M: Send + Sync + 'static,
{
    /// Detached action, useful for driving a handler outside of a dispatch.
    pub fn new(payload: M) -> Self {
        Self {
            payload: Arc::new(payload),
            context: None,
            handler: None,
        }
    }

    pub(crate) fn for_handler(context: Arc<ExecutionContext<M>>, token: DispatchToken) -> Self {
        Self {
            payload: Arc::clone(context.payload()),
            context: Some(context),
            handler: Some(token),
        }
    }

    pub fn payload(&self) -> &M {
        &self.payload
    }

    /// Token of the handler this action was handed to.
    pub fn handler_token(&self) -> Option<DispatchToken> {
        self.handler
    }

    /// Identifier of the dispatch this action belongs to.
    pub fn dispatch_id(&self) -> Option<Uuid> {
        self.context.as_ref().map(|context| context.id())
    }

    /// Whether the owning dispatch is still accepting dependency waits.
    pub fn is_dispatching(&self) -> bool {
        self.context
            .as_ref()
            .is_some_and(|context| !context.is_closed())
    }

    /// State of `token` for this message, `None` if it is not part of the dispatch.
    pub fn status_of(&self, token: DispatchToken) -> Option<HandlerState> {
        self.context.as_ref()?.status_of(token)
    }

    /// Run the handlers behind `tokens` to completion before returning.
    ///
    /// Handlers that already completed for this message are not run again.
    /// Fails with the first error among the waited handlers, or with
    /// `CircularDependency` if one of them is (transitively) waiting on the
    /// caller. Waiting through a detached or finished dispatch fails with
    /// `NotDispatching`.
    pub async fn wait_for(&self, tokens: &[DispatchToken]) -> Result<()> {
        match &self.context {
            Some(context) if !context.is_closed() => context.wait_for(self.handler, tokens).await,
            _ => Err(DispatchError::NotDispatching),
        }
    }
}

impl<M> Clone for Action<M> {
    fn clone(&self) -> Self {
        Self {
            payload: Arc::clone(&self.payload),
            context: self.context.clone(),
            handler: self.handler,
        }
    }
}

impl<M> Deref for Action<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.payload
    }
}

impl<M: fmt::Debug> fmt::Debug for Action<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("payload", &self.payload)
            .field("dispatch_id", &self.context.as_ref().map(|c| c.id()))
            .field("handler", &self.handler)
            .finish()
    }
}
