//! Policy command data model.
//!
//! A [`PolicyCmd`] is what an authenticated actor asks the command layer to
//! do to a policy. Most commands end up as calls on a [`RelationshipEngine`],
//! the external store of relationship facts; this crate defines that
//! interface and the records it exchanges, plus the module [`Params`].
//!
//! [`MemoryRelationshipEngine`] is an in-memory engine with ownership-only
//! authorization, suitable for hosts without a full permission evaluator and
//! for tests.

mod cmd;
pub use cmd::*;

mod engine;
pub use engine::*;

mod memory;
pub use memory::*;

mod params;
pub use params::*;

mod relationship;
pub use relationship::*;
