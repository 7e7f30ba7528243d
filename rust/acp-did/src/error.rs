//! Error types for DID parsing, key handling and resolution.

use crate::did::Did;
use acp_common::{Classify, ErrorKind};
use thiserror::Error;

/// Error when parsing a DID string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid DID: {0}")]
pub struct DidParseError(pub String);

impl Classify for DidParseError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::BadInput
    }
}

/// Errors produced while turning raw key material into a [`crate::PublicKey`]
/// or [`crate::SigningKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The key type is neither Ed25519 nor secp256k1.
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// The key bytes do not encode a valid key of the declared type.
    #[error("invalid {key_type} key: {reason}")]
    InvalidKey {
        /// Declared key type.
        key_type: &'static str,
        /// Decoder message.
        reason: String,
    },
}

impl Classify for KeyError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::BadInput
    }
}

/// Errors that can occur when decoding a `did:key` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DidKeyError {
    /// The DID does not use the `key` method.
    #[error("not a did:key: {0}")]
    NotDidKey(String),

    /// The base58 prefix 'z' is missing.
    #[error("missing base58 prefix 'z'")]
    MissingBase58Prefix,

    /// The base58 encoding is invalid.
    #[error("invalid base58 encoding")]
    InvalidBase58,

    /// The multicodec header names a key type this crate does not handle.
    #[error("unsupported multicodec header {0:#04x} {1:#04x}")]
    UnsupportedMulticodec(u8, u8),

    /// The key bytes are invalid.
    #[error(transparent)]
    InvalidKey(#[from] KeyError),
}

impl Classify for DidKeyError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::BadInput
    }
}

/// Error type for DID resolution.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The DID is syntactically a `did:key` but cannot be decoded.
    #[error("malformed did:key: {0}")]
    MalformedKey(#[from] DidKeyError),

    /// No resolver in the chain handles this DID method.
    #[error("unsupported DID method '{method}' for {did}")]
    UnsupportedMethod {
        /// The method that could not be resolved.
        method: String,
        /// The DID being resolved.
        did: Did,
    },

    /// The DID method is supported but the DID does not exist.
    #[error("DID not found: {0}")]
    NotFound(Did),

    /// The DID resolved to a document without any verification method.
    #[error("DID document for {0} has no verification method")]
    NoVerificationMethod(Did),

    /// The resolver could not be reached or failed.
    #[error("resolver unavailable for {did}: {reason}")]
    Unavailable {
        /// The DID being resolved.
        did: Did,
        /// Resolver message.
        reason: String,
    },
}

impl Classify for ResolveError {
    fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::MalformedKey(_) => ErrorKind::BadInput,
            ResolveError::UnsupportedMethod { .. }
            | ResolveError::NotFound(_)
            | ResolveError::NoVerificationMethod(_) => ErrorKind::NotFound,
            ResolveError::Unavailable { .. } => ErrorKind::External,
        }
    }
}
