use acp_auth::AuthError;
use acp_common::{Classify, ErrorKind, StoreError};
use acp_did::Did;
use acp_policy::{CmdDecodeError, EngineError, Object, ParamsError};
use acp_registration::RegistrationError;
use thiserror::Error;

/// Why a command message was not applied.
///
/// A failed command leaves no trace in the store or the engine.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The message is not a well-formed command message.
    #[error("malformed policy command message: {0}")]
    Message(#[source] serde_json::Error),

    /// The embedded command could not be decoded.
    #[error(transparent)]
    Cmd(#[from] CmdDecodeError),

    /// The actor could not be authenticated.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The relationship engine refused or failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The commitment service refused or failed.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// The host store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Module parameters are invalid.
    #[error(transparent)]
    Params(#[from] ParamsError),

    /// The reveal names a commitment of another policy.
    #[error("registrations commitment {id} belongs to policy {actual}, not {expected}")]
    CommitmentPolicyMismatch {
        /// Commitment id.
        id: u64,
        /// Policy named by the command.
        expected: String,
        /// Policy of the commitment.
        actual: String,
    },

    /// The proof does not open the commitment for this actor.
    #[error("proof for {object} does not open registrations commitment {commitment_id} for {actor}")]
    InvalidProof {
        /// Commitment id.
        commitment_id: u64,
        /// Revealed object.
        object: Object,
        /// Revealing actor.
        actor: Did,
    },

    /// Only the publisher of a commitment may use it to take over a
    /// registered object.
    #[error("actor {actor} did not publish registrations commitment {commitment_id}")]
    NotCommitmentOwner {
        /// Commitment id.
        commitment_id: u64,
        /// Revealing actor.
        actor: Did,
    },

    /// The object was registered no later than the commitment was made.
    #[error(
        "{object} was registered to {owner} at height {registered_height}, \
         not after commitment {commitment_id} at height {committed_height}"
    )]
    PriorClaim {
        /// Contested object.
        object: Object,
        /// Current owner.
        owner: Did,
        /// Commitment id.
        commitment_id: u64,
        /// Height the commitment was published at.
        committed_height: u64,
        /// Height of the existing registration.
        registered_height: u64,
    },
}

impl Classify for HandlerError {
    fn kind(&self) -> ErrorKind {
        match self {
            HandlerError::Message(_) | HandlerError::CommitmentPolicyMismatch { .. } => {
                ErrorKind::BadInput
            }
            HandlerError::Cmd(error) => error.kind(),
            HandlerError::Auth(error) => error.kind(),
            HandlerError::Engine(error) => error.kind(),
            HandlerError::Registration(error) => error.kind(),
            HandlerError::Store(error) => error.kind(),
            HandlerError::Params(error) => error.kind(),
            HandlerError::InvalidProof { .. } => ErrorKind::Unauthorized,
            HandlerError::NotCommitmentOwner { .. } | HandlerError::PriorClaim { .. } => {
                ErrorKind::OperationForbidden
            }
        }
    }
}
