//! Authentication of policy commands.
//!
//! A policy command reaches the module in one of three shapes, each with its
//! own way of establishing the acting DID:
//!
//! - [`DirectMsg`]: the actor is the transaction signer's key, as
//!   [`acp_did::issue_did`] names it. Trust comes from the ledger's own
//!   signature check.
//! - [`BearerMsg`]: the actor presents a self-issued [`BearerToken`] (a
//!   compact JWS) that authorizes one chain account to act on its behalf.
//! - [`SignedMsg`]: the actor signs the command itself as a
//!   [`SignedPolicyCmdPayload`], bounded in validity by block height.
//!
//! Every JWS is verified with the key found by resolving the DID named in
//! its payload, never with anything the JOSE header claims. See [`jws`].

mod account;
pub use account::*;

mod address;
pub use address::*;

mod authenticator;
pub use authenticator::*;

mod bearer;
pub use bearer::*;

mod error;
pub use error::*;

pub mod jws;

mod signed;
pub use signed::*;
