//! Execution of policy commands.
//!
//! A command message travels through three stages:
//!
//! 1. [`decode_msg`] turns wire JSON into an [`acp_auth::PolicyCmdMsg`],
//!    naming unknown command tags explicitly.
//! 2. The [`acp_auth::CmdAuthenticator`] establishes the acting DID.
//! 3. [`dispatch`] routes the command to the relationship engine or the
//!    commitment service and builds its typed result. On a reveal, an older
//!    commitment takes an object over from a later registration.
//!
//! [`Keeper`] ties the stages together for a host and scopes every command
//! in a [`acp_common::StoreOverlay`] so that a failed command writes
//! nothing.

mod dispatch;
pub use dispatch::*;

mod error;
pub use error::*;

mod keeper;
pub use keeper::*;

mod reveal;

mod wire;
pub use wire::*;
