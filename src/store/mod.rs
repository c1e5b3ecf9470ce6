//! # Stores
//!
//! State containers that own one dispatcher registration each.
//!
//! A [`Store`] runs its [`Reducer`] for every dispatched message, keeps the
//! resulting state when it differs from the previous one and notifies its
//! change listeners. Stores add no coordination of their own: ordering
//! between stores is expressed with `action.wait_for(&[other.dispatch_token()])`
//! inside `reduce`.

pub mod emitter;
pub mod reduce_store;

pub use emitter::{ChangeEmitter, ListenerHandle};
pub use reduce_store::{Reducer, Store};
