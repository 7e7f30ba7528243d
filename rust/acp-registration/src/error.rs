use acp_common::{Classify, Duration, ErrorKind, StoreError, Timestamp};
use acp_did::Did;
use acp_policy::{EngineError, Object};
use thiserror::Error;

/// Errors of the stateless commitment functions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitmentError {
    /// A commitment needs at least one object.
    #[error("cannot commit to an empty set of objects")]
    NoObjects,

    /// An object with an empty resource or id.
    #[error("object {0} needs a resource and an id")]
    MalformedObject(Object),

    /// The leaf index lies outside the tree.
    #[error("leaf index {index} out of range for {count} leaves")]
    IndexOutOfRange {
        /// Requested index.
        index: u64,
        /// Number of leaves.
        count: u64,
    },

    /// The root is not a SHA-256 digest.
    #[error("commitment root must be {expected} bytes, got {actual}")]
    InvalidRootLength {
        /// Required length.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },
}

impl Classify for CommitmentError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::BadInput
    }
}

/// Errors of the commitment service.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Malformed commitment input.
    #[error(transparent)]
    Commitment(#[from] CommitmentError),

    /// The relationship engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The host store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The policy does not exist.
    #[error("policy {0} not found")]
    PolicyNotFound(String),

    /// A commitment may only cover unclaimed objects.
    #[error("object {object} is already registered to {owner}")]
    ObjectAlreadyRegistered {
        /// The claimed object.
        object: Object,
        /// Its owner.
        owner: Did,
    },

    /// No commitment has this id.
    #[error("registrations commitment {0} not found")]
    CommitmentNotFound(u64),

    /// The commitment's validity window has passed.
    #[error("registrations commitment {id} created at {created} with validity {validity} expired before {now}")]
    CommitmentExpired {
        /// Commitment id.
        id: u64,
        /// Commitment creation time.
        created: Timestamp,
        /// Commitment validity.
        validity: Duration,
        /// Time of the rejected opening.
        now: Timestamp,
    },

    /// No amendment event has this id.
    #[error("amendment event {0} not found")]
    EventNotFound(u64),

    /// The event belongs to another policy than the command.
    #[error("amendment event {id} belongs to policy {actual}, not {expected}")]
    EventPolicyMismatch {
        /// Event id.
        id: u64,
        /// Policy named by the command.
        expected: String,
        /// Policy of the event.
        actual: String,
    },

    /// The event registered a fresh object, so nobody lost ownership.
    #[error("amendment event {0} has no previous owner to dispute it")]
    NothingToDispute(u64),

    /// Only the previous owner may dispute an amendment.
    #[error("actor {actor} is not the previous owner in amendment event {id}")]
    NotPreviousOwner {
        /// Event id.
        id: u64,
        /// Acting DID.
        actor: Did,
    },
}

impl Classify for RegistrationError {
    fn kind(&self) -> ErrorKind {
        match self {
            RegistrationError::Commitment(error) => error.kind(),
            RegistrationError::Engine(error) => error.kind(),
            RegistrationError::Store(error) => error.kind(),
            RegistrationError::PolicyNotFound(_)
            | RegistrationError::CommitmentNotFound(_)
            | RegistrationError::EventNotFound(_) => ErrorKind::NotFound,
            RegistrationError::ObjectAlreadyRegistered { .. }
            | RegistrationError::EventPolicyMismatch { .. } => ErrorKind::BadInput,
            RegistrationError::CommitmentExpired { .. } | RegistrationError::NothingToDispute(_) => {
                ErrorKind::OperationForbidden
            }
            RegistrationError::NotPreviousOwner { .. } => ErrorKind::Unauthorized,
        }
    }
}
