//! Compact JSON Web Signatures without header trust.
//!
//! A token is read in two explicit steps:
//!
//! 1. [`Jws::extract_unverified_claims`] decodes the payload so the caller
//!    can learn which DID claims to have signed it;
//! 2. [`Unverified::resolve_and_verify`] resolves that DID, takes the first
//!    verification method of its document and checks the signature with the
//!    algorithm implied by the key type.
//!
//! Neither step reads `alg`, `kid` or `jwk` from the JOSE header. A header
//! edited after signing still changes the signing input, so the signature no
//! longer verifies.

use crate::error::JwsError;
use acp_did::{Did, KeyType, Resolver, SigningKey};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;

/// JWS algorithm names for the supported key types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Ed25519 signatures (RFC 8037).
    EdDsa,
    /// ECDSA over secp256k1 with SHA-256 (RFC 8812).
    Es256k,
}

impl Algorithm {
    /// The algorithm a key of `key_type` signs with.
    pub fn for_key(key_type: KeyType) -> Self {
        match key_type {
            KeyType::Ed25519 => Algorithm::EdDsa,
            KeyType::Secp256k1 => Algorithm::Es256k,
        }
    }

    /// Registered `alg` name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::EdDsa => "EdDSA",
            Algorithm::Es256k => "ES256K",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The protected header. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Declared algorithm.
    pub alg: String,
    /// Declared media type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

/// A parsed compact JWS whose signature has not been checked.
#[derive(Debug, Clone)]
pub struct Jws {
    header: Header,
    signing_input: String,
    payload: Vec<u8>,
    signature: Vec<u8>,
}

impl Jws {
    /// Parse `header.payload.signature`, each part base64url without padding.
    ///
    /// The JSON serialization is refused outright: it can carry unprotected
    /// headers, which this module has no use for.
    pub fn parse(token: &str) -> Result<Self, JwsError> {
        let token = token.trim();
        if token.starts_with('{') {
            return Err(JwsError::JsonSerializationUnsupported);
        }
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(JwsError::Malformed(
                "expected three dot-separated segments".into(),
            ));
        };

        let decode = |segment: &'static str, value: &str| {
            URL_SAFE_NO_PAD
                .decode(value)
                .map_err(|error| JwsError::Malformed(format!("{segment} is not base64url: {error}")))
        };
        let header_bytes = decode("header", header)?;
        let payload_bytes = decode("payload", payload)?;
        let signature_bytes = decode("signature", signature)?;
        let parsed_header: Header = serde_json::from_slice(&header_bytes)
            .map_err(|error| JwsError::Malformed(format!("invalid header: {error}")))?;

        Ok(Self {
            header: parsed_header,
            signing_input: format!("{header}.{payload}"),
            payload: payload_bytes,
            signature: signature_bytes,
        })
    }

    /// The header as sent. Never used for verification.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Decode the payload as `T` without checking the signature.
    pub fn extract_unverified_claims<T: DeserializeOwned>(self) -> Result<Unverified<T>, serde_json::Error> {
        let claims = serde_json::from_slice(&self.payload)?;
        Ok(Unverified { claims, jws: self })
    }
}

/// Claims read from a [`Jws`] whose signature is still unchecked.
#[derive(Debug, Clone)]
pub struct Unverified<T> {
    claims: T,
    jws: Jws,
}

impl<T> Unverified<T> {
    /// The claims, for deciding whose key to verify with.
    pub fn claims(&self) -> &T {
        &self.claims
    }

    /// Verify the signature with the first key of `signer`'s DID document and
    /// release the claims.
    pub fn resolve_and_verify<R: Resolver>(self, signer: &Did, resolver: &R) -> Result<T, JwsError> {
        let document = resolver.resolve(signer)?;
        let method = document.first_verification_method()?;
        let algorithm = Algorithm::for_key(method.public_key.key_type());
        method
            .public_key
            .verify(self.jws.signing_input.as_bytes(), &self.jws.signature)
            .map_err(|_| JwsError::InvalidSignature {
                signer: signer.clone(),
                algorithm,
            })?;
        tracing::trace!(%signer, %algorithm, "jws signature verified");
        Ok(self.claims)
    }
}

/// Sign `claims` as a compact JWS with `key`.
pub fn sign<T: Serialize>(claims: &T, key: &SigningKey) -> Result<String, JwsError> {
    let header = Header {
        alg: Algorithm::for_key(key.key_type()).as_str().to_string(),
        typ: Some("JWT".into()),
    };
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).map_err(JwsError::Encode)?);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).map_err(JwsError::Encode)?);
    let signing_input = format!("{header}.{payload}");
    let signature = key
        .sign(signing_input.as_bytes())
        .map_err(|error| JwsError::Signing(error.to_string()))?;
    Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
}
