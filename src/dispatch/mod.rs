//! # Dispatch Core
//!
//! Tokens, per-message handler state, the action handed to handlers and the
//! dispatcher that drives them.
//!
//! ```text
//! Dispatcher ── snapshot ──> ExecutionContext (one per message)
//!                              ├── NotStarted -> Awaiting -> Completed, per handler
//!                              └── wait-for edges between in-flight handlers
//! ```

pub mod action;
pub(crate) mod context;
pub mod dispatcher;
pub mod status;
pub mod token;

pub use action::Action;
pub use dispatcher::Dispatcher;
pub use status::HandlerState;
pub use token::DispatchToken;
