use std::fmt;
use std::sync::Arc;

use crate::dispatch::DispatchToken;

/// Errors surfaced by the dispatcher to `dispatch`, `wait_for` and `unregister` callers.
///
/// Cloneable so a single handler outcome can be handed to every handler that
/// waited on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("'{0}' does not map to a registered callback")]
    UnknownHandler(DispatchToken),

    #[error("Circular dependency detected while waiting for {0}")]
    CircularDependency(DispatchToken),

    #[error("wait_for must be invoked while dispatching")]
    NotDispatching,

    #[error("Handler {token} failed: {source}")]
    Handler {
        token: DispatchToken,
        #[source]
        source: HandlerFailure,
    },

    #[error("Handler {token} panicked: {message}")]
    HandlerPanicked {
        token: DispatchToken,
        message: String,
    },

    #[error("Invalid dispatch token: {0}")]
    InvalidToken(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl DispatchError {
    /// Convert a handler's own error into the error reported for `token`.
    ///
    /// Coordinator errors raised inside the handler (typically from a
    /// dependency wait) pass through untouched.
    pub(crate) fn from_handler(token: DispatchToken, error: anyhow::Error) -> Self {
        match error.downcast::<DispatchError>() {
            Ok(dispatch_error) => dispatch_error,
            Err(error) => Self::Handler {
                token,
                source: HandlerFailure::new(error),
            },
        }
    }

    /// The error a handler failed with, if this is a handler failure.
    pub fn handler_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Handler { source, .. } => Some(source.inner()),
            _ => None,
        }
    }

    /// Token of the handler this error is attributed to, if any.
    pub fn token(&self) -> Option<DispatchToken> {
        match self {
            Self::UnknownHandler(token)
            | Self::CircularDependency(token)
            | Self::Handler { token, .. }
            | Self::HandlerPanicked { token, .. } => Some(*token),
            Self::NotDispatching | Self::InvalidToken(_) | Self::Configuration(_) => None,
        }
    }

    pub fn is_circular_dependency(&self) -> bool {
        matches!(self, Self::CircularDependency(_))
    }

    pub fn is_unknown_handler(&self) -> bool {
        matches!(self, Self::UnknownHandler(_))
    }
}

/// A handler's own failure, shared between every waiter of that handler.
#[derive(Clone)]
pub struct HandlerFailure(Arc<anyhow::Error>);

impl HandlerFailure {
    pub fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// Downcast to the concrete error type the handler returned.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }
}

impl fmt::Debug for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for HandlerFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
