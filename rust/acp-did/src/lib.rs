//! Decentralized identifiers for command authentication.
//!
//! Every authentication strategy ends in an actor [`Did`]. This crate issues
//! DIDs from public keys ([`issue_did`]) and resolves DIDs back to
//! verification keys ([`Resolver`]). Only the `did:key` method is resolved
//! locally ([`KeyResolver`]); other methods can be plugged in by composing
//! resolvers with [`Resolver::or`].
//!
//! Supported key types are Ed25519 and secp256k1.

pub mod did;
pub mod error;
pub mod key;
pub mod resolver;

pub use did::*;
pub use error::*;
pub use key::*;
pub use resolver::*;
