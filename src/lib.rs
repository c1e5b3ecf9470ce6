#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Flux Dispatch
//!
//! Async broadcast coordinator for application state changes.
//!
//! ## Overview
//!
//! Every state-change message in an application passes through one
//! [`Dispatcher`]. Each registered handler observes each message exactly
//! once; handlers may declare at invocation time that other handlers must
//! finish first, and dependency cycles are reported as errors instead of
//! deadlocking.
//!
//! ## Key Features
//!
//! - **Concurrent fan-out**: handlers of one message run concurrently on the tokio runtime
//! - **Lazy dependency resolution**: `wait_for` runs dependencies on demand, at most once per message
//! - **Cycle detection**: waits that would close a cycle fail with `CircularDependency`
//! - **Per-message isolation**: concurrent dispatches never share handler state
//! - **Stores**: reducer-backed state containers with change listeners
//!
//! ## Module Organization
//!
//! - [`dispatch`] - Tokens, actions, handler state and the dispatcher
//! - [`registry`] - Handler trait and token-keyed handler registry
//! - [`store`] - Reducer stores built on the dispatcher
//! - [`config`] - Dispatcher configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust
//! use flux_dispatch::{DispatchError, Dispatcher};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let dispatcher: Dispatcher<u32> = Dispatcher::new();
//!
//! let a = dispatcher.register(|action| async move {
//!     action.wait_for(&[action.handler_token().unwrap()]).await?;
//!     Ok(())
//! });
//!
//! let err = dispatcher.dispatch(1).await.unwrap_err();
//! assert!(matches!(err, DispatchError::CircularDependency(token) if token == a));
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod registry;
pub mod store;

pub use config::DispatcherConfig;
pub use dispatch::{Action, DispatchToken, Dispatcher, HandlerState};
pub use error::{DispatchError, HandlerFailure, Result};
pub use registry::{DispatchHandler, HandlerRegistry};
pub use store::{ListenerHandle, Reducer, Store};
