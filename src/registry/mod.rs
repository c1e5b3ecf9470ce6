//! # Registry Infrastructure
//!
//! Handler registration for the dispatcher.
//!
//! ## Overview
//!
//! The registry owns the token -> handler table that every dispatch snapshots.
//! It is append/remove only and decoupled from per-message execution state,
//! so registering or unregistering from inside a running handler is safe.
//!
//! ## Architecture
//!
//! ```text
//! Registry Infrastructure
//! ├── DispatchHandler   (async handler trait)
//! └── HandlerRegistry   (token issue, storage, removal)
//! ```

pub mod handler_registry;

pub use handler_registry::{DispatchHandler, FnHandler, HandlerRegistry};
