use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress of one handler for one dispatched message
///
/// Moves strictly `NotStarted -> Awaiting -> Completed`. A handler that fails
/// stays `Awaiting` for the rest of the dispatch and is never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerState {
    /// Handler has not been invoked for this message
    NotStarted,
    /// Handler invocation has begun and has not completed successfully
    Awaiting,
    /// Handler finished successfully; its outcome is cached
    Completed,
}

impl HandlerState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Check if the handler is currently in flight
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Awaiting)
    }

    /// Check if this handler satisfies a dependency wait
    pub fn satisfies_dependencies(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for HandlerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Awaiting => write!(f, "awaiting"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for HandlerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "awaiting" => Ok(Self::Awaiting),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid handler state: {s}")),
        }
    }
}
