use crate::{address::AddressError, jws::Algorithm};
use acp_common::{Classify, ErrorKind};
use acp_did::{Did, KeyError, ResolveError};
use acp_policy::CmdDecodeError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors reading, verifying or producing a compact JWS.
#[derive(Debug, Error)]
pub enum JwsError {
    /// The token uses the JSON serialization.
    #[error("JWS JSON serialization is not supported")]
    JsonSerializationUnsupported,

    /// The token is not a well-formed compact JWS.
    #[error("malformed JWS: {0}")]
    Malformed(String),

    /// The signer's DID could not be resolved to a key.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The signature does not verify under the signer's key.
    #[error("JWS signature does not verify with {algorithm} key of {signer}")]
    InvalidSignature {
        /// DID whose key was used.
        signer: Did,
        /// Algorithm implied by that key.
        algorithm: Algorithm,
    },

    /// Claims could not be encoded for signing.
    #[error("failed to encode JWS: {0}")]
    Encode(serde_json::Error),

    /// The signing key failed.
    #[error("failed to sign JWS: {0}")]
    Signing(String),
}

impl Classify for JwsError {
    fn kind(&self) -> ErrorKind {
        match self {
            JwsError::JsonSerializationUnsupported | JwsError::Malformed(_) => ErrorKind::BadInput,
            JwsError::Resolve(error) => error.kind(),
            JwsError::InvalidSignature { .. } => ErrorKind::Unauthenticated,
            JwsError::Encode(_) | JwsError::Signing(_) => ErrorKind::Internal,
        }
    }
}

/// Reasons a policy command fails authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// JWS parsing or verification failed.
    #[error(transparent)]
    Jws(#[from] JwsError),

    /// A required claim is absent from the token.
    #[error("bearer token is missing claim {0}")]
    MissingClaim(&'static str),

    /// The `iss` claim is not a DID.
    #[error("invalid bearer token issuer {issuer:?}: {reason}")]
    InvalidIssuer {
        /// Claim value.
        issuer: String,
        /// Parser message.
        reason: String,
    },

    /// The `authorized_account` claim is not a valid address.
    #[error("invalid authorized account {account:?}: {reason}")]
    InvalidAuthorizedAccount {
        /// Claim value.
        account: String,
        /// Parser message.
        reason: AddressError,
    },

    /// The token is structurally inconsistent.
    #[error("invalid bearer token: {0}")]
    InvalidBearerToken(String),

    /// The token's expiry lies before the current block time.
    #[error("bearer token expired: now {now}, expired at {expires_at}")]
    TokenExpired {
        /// Block time.
        now: DateTime<Utc>,
        /// Token expiry.
        expires_at: DateTime<Utc>,
    },

    /// The transaction signer is not the account the token authorizes.
    #[error("bearer token authorizes {authorized} but the message was signed by {signer}")]
    MsgUnauthorized {
        /// Account named by the token.
        authorized: String,
        /// Actual transaction signer.
        signer: String,
    },

    /// The signed payload is not a valid command payload.
    #[error("invalid signed command payload: {0}")]
    InvalidPayload(String),

    /// The signed payload's actor is not a DID.
    #[error("invalid signed command actor {actor:?}: {reason}")]
    InvalidActor {
        /// Payload value.
        actor: String,
        /// Parser message.
        reason: String,
    },

    /// The embedded command could not be decoded.
    #[error(transparent)]
    Cmd(#[from] CmdDecodeError),

    /// The requested validity window exceeds the module limit.
    #[error("expiration delta {delta} exceeds the maximum of {max} blocks")]
    ExpirationDeltaTooLarge {
        /// Requested delta.
        delta: u64,
        /// Module maximum.
        max: u64,
    },

    /// The signed command's validity window has passed.
    #[error("signed command issued at height {issued_height} with delta {delta} expired at height {height}")]
    CommandExpired {
        /// Issue height.
        issued_height: u64,
        /// Validity window in blocks.
        delta: u64,
        /// Current height.
        height: u64,
    },

    /// The transaction signer has no account.
    #[error("no account for signer {0}")]
    AccountNotFound(String),

    /// The signer's account has no public key on record.
    #[error("account {0} has no public key")]
    AccountWithoutKey(String),

    /// The account key cannot be used.
    #[error(transparent)]
    Key(#[from] KeyError),
}

impl Classify for AuthError {
    fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Jws(error) => error.kind(),
            AuthError::Cmd(error) => error.kind(),
            AuthError::Key(error) => error.kind(),
            AuthError::MissingClaim(_)
            | AuthError::InvalidIssuer { .. }
            | AuthError::InvalidAuthorizedAccount { .. }
            | AuthError::InvalidBearerToken(_)
            | AuthError::InvalidPayload(_)
            | AuthError::InvalidActor { .. }
            | AuthError::ExpirationDeltaTooLarge { .. } => ErrorKind::BadInput,
            AuthError::TokenExpired { .. }
            | AuthError::CommandExpired { .. }
            | AuthError::AccountWithoutKey(_) => ErrorKind::Unauthenticated,
            AuthError::MsgUnauthorized { .. } => ErrorKind::Unauthorized,
            AuthError::AccountNotFound(_) => ErrorKind::NotFound,
        }
    }
}

/// Errors building a signed token or payload.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A required field was never set.
    #[error("missing required field {0}")]
    MissingField(&'static str),

    /// The validity window does not fit the calendar.
    #[error("validity window overflows")]
    InvalidWindow,

    /// Signing failed.
    #[error(transparent)]
    Jws(#[from] JwsError),
}

impl Classify for BuildError {
    fn kind(&self) -> ErrorKind {
        match self {
            BuildError::MissingField(_) | BuildError::InvalidWindow => ErrorKind::BadInput,
            BuildError::Jws(error) => error.kind(),
        }
    }
}
