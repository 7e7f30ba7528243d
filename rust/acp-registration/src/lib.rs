//! Commit-reveal object registration.
//!
//! An actor that wants to claim objects without exposing them to front-running
//! first publishes a Merkle root over `(policy, actor, object)` leaves (see
//! [`generate_commitment`]). Later it reveals one object at a time with an
//! inclusion proof (see [`proof_for_object`] and [`verify_proof`]).
//!
//! [`CommitmentService`] is the stateful side: it persists commitments in the
//! host [`acp_common::Store`], expires them, validates openings and keeps the
//! amendment events written by reveals.

pub mod merkle;

mod commitment;
pub use commitment::*;

mod error;
pub use error::*;

mod repository;
pub use repository::*;

mod service;
pub use service::*;
