#![warn(missing_docs)]

//! This crate constitutes a library of light weight helpers that are shared
//! across the access-control command crates: the error taxonomy, block
//! timestamps, byte newtypes and the synchronous key-value [Store] that the
//! host state machine hands to every command.

mod error;
pub use error::*;

mod bytes;
pub use bytes::*;

mod hash;
pub use hash::*;

pub mod time;
pub use time::{Duration, Timestamp};

pub mod store;
pub use store::{MemoryStore, Sequence, Store, StoreError, StoreOverlay};
