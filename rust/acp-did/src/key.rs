//! Key types, did:key encoding and signing.

use crate::{
    did::Did,
    error::{DidKeyError, KeyError},
};
use base58::{FromBase58, ToBase58};
use std::{fmt, str::FromStr};

const ED25519_PUB: [u8; 2] = [0xed, 0x01];
const SECP256K1_PUB: [u8; 2] = [0xe7, 0x01];
const DID_KEY_PREFIX: &str = "did:key:";

/// The key types a DID can be issued from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// Ed25519 (EdDSA) keys.
    Ed25519,
    /// secp256k1 (ECDSA) keys, as held by ledger accounts.
    Secp256k1,
}

impl KeyType {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Ed25519 => "ed25519",
            KeyType::Secp256k1 => "secp256k1",
        }
    }

    fn multicodec(&self) -> [u8; 2] {
        match self {
            KeyType::Ed25519 => ED25519_PUB,
            KeyType::Secp256k1 => SECP256K1_PUB,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = KeyError;

    /// Accepts the plain key names as well as the ledger's public key type
    /// URLs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ed25519" | "Ed25519" | "/cosmos.crypto.ed25519.PubKey" => Ok(KeyType::Ed25519),
            "secp256k1" | "Secp256k1" | "/cosmos.crypto.secp256k1.PubKey" => {
                Ok(KeyType::Secp256k1)
            }
            other => Err(KeyError::UnsupportedKeyType(other.to_string())),
        }
    }
}

/// A public verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// Ed25519 verifying key.
    Ed25519(ed25519_dalek::VerifyingKey),
    /// secp256k1 ECDSA verifying key.
    Secp256k1(k256::ecdsa::VerifyingKey),
}

impl PublicKey {
    /// Build a key from its type name and raw bytes (32 bytes for Ed25519, a
    /// SEC1 point for secp256k1).
    pub fn from_parts(key_type: &str, bytes: &[u8]) -> Result<Self, KeyError> {
        Self::from_bytes(key_type.parse()?, bytes)
    }

    /// Build a key of a known type from raw bytes.
    pub fn from_bytes(key_type: KeyType, bytes: &[u8]) -> Result<Self, KeyError> {
        let invalid = |reason: String| KeyError::InvalidKey {
            key_type: key_type.as_str(),
            reason,
        };
        match key_type {
            KeyType::Ed25519 => {
                let raw: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| invalid(format!("expected 32 bytes, got {}", bytes.len())))?;
                ed25519_dalek::VerifyingKey::from_bytes(&raw)
                    .map(PublicKey::Ed25519)
                    .map_err(|e| invalid(e.to_string()))
            }
            KeyType::Secp256k1 => k256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
                .map(PublicKey::Secp256k1)
                .map_err(|e| invalid(e.to_string())),
        }
    }

    /// The type of this key.
    pub fn key_type(&self) -> KeyType {
        match self {
            PublicKey::Ed25519(_) => KeyType::Ed25519,
            PublicKey::Secp256k1(_) => KeyType::Secp256k1,
        }
    }

    /// Raw key bytes (compressed SEC1 for secp256k1).
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            PublicKey::Ed25519(key) => key.to_bytes().to_vec(),
            PublicKey::Secp256k1(key) => key.to_encoded_point(true).as_bytes().to_vec(),
        }
    }

    /// Verify `signature` over `message` with the algorithm this key type
    /// implies: EdDSA for Ed25519, ECDSA over SHA-256 (`ES256K`, 64-byte
    /// `r || s`) for secp256k1.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), signature::Error> {
        use signature::Verifier;

        match self {
            PublicKey::Ed25519(key) => {
                let signature = ed25519_dalek::Signature::from_slice(signature)?;
                key.verify(message, &signature)
            }
            PublicKey::Secp256k1(key) => {
                let signature = k256::ecdsa::Signature::from_slice(signature)?;
                key.verify(message, &signature)
            }
        }
    }

    /// Decode the public key embedded in a `did:key` string.
    pub fn from_did_key(did: &str) -> Result<Self, DidKeyError> {
        let encoded = did
            .strip_prefix(DID_KEY_PREFIX)
            .ok_or_else(|| DidKeyError::NotDidKey(did.to_string()))?;
        let b58 = encoded
            .strip_prefix('z')
            .ok_or(DidKeyError::MissingBase58Prefix)?;
        let decoded = b58.from_base58().map_err(|_| DidKeyError::InvalidBase58)?;

        let (header, key_bytes) = match decoded.as_slice() {
            [a, b, rest @ ..] => ([*a, *b], rest),
            _ => return Err(DidKeyError::InvalidBase58),
        };
        let key_type = match header {
            ED25519_PUB => KeyType::Ed25519,
            SECP256K1_PUB => KeyType::Secp256k1,
            [a, b] => return Err(DidKeyError::UnsupportedMulticodec(a, b)),
        };
        if key_type == KeyType::Secp256k1 && key_bytes.len() != 33 {
            return Err(KeyError::InvalidKey {
                key_type: key_type.as_str(),
                reason: format!("expected 33 compressed bytes, got {}", key_bytes.len()),
            }
            .into());
        }
        Ok(Self::from_bytes(key_type, key_bytes)?)
    }

    /// The `did:key` form of this key: multicodec header, key bytes, base58btc.
    pub fn to_did_key(&self) -> String {
        let mut raw = Vec::with_capacity(35);
        raw.extend_from_slice(&self.key_type().multicodec());
        raw.extend_from_slice(&self.to_bytes());
        format!("{DID_KEY_PREFIX}z{}", raw.to_base58())
    }
}

/// Issue the DID for a public key.
///
/// A pure function of the key type and key bytes: the same key always yields
/// the same `did:key`.
pub fn issue_did(public_key: &PublicKey) -> Did {
    Did::from_trusted(public_key.to_did_key())
}

/// Issue the DID for raw key material held by a ledger account.
///
/// Fails with [`KeyError::UnsupportedKeyType`] for anything other than
/// Ed25519 or secp256k1.
pub fn issue_did_from_parts(key_type: &str, bytes: &[u8]) -> Result<Did, KeyError> {
    Ok(issue_did(&PublicKey::from_parts(key_type, bytes)?))
}

/// A private signing key. Used by clients to sign bearer tokens and command
/// payloads, and by tests.
#[derive(Clone)]
pub enum SigningKey {
    /// Ed25519 signing key.
    Ed25519(ed25519_dalek::SigningKey),
    /// secp256k1 ECDSA signing key.
    Secp256k1(k256::ecdsa::SigningKey),
}

impl SigningKey {
    /// Generate a fresh random key of the given type.
    pub fn generate(key_type: KeyType) -> Self {
        let mut rng = rand::rngs::OsRng;
        match key_type {
            KeyType::Ed25519 => SigningKey::Ed25519(ed25519_dalek::SigningKey::generate(&mut rng)),
            KeyType::Secp256k1 => {
                SigningKey::Secp256k1(k256::ecdsa::SigningKey::random(&mut rng))
            }
        }
    }

    /// Import a key from 32 secret bytes (the Ed25519 seed or the secp256k1
    /// scalar).
    pub fn from_secret(key_type: KeyType, secret: &[u8; 32]) -> Result<Self, KeyError> {
        match key_type {
            KeyType::Ed25519 => Ok(SigningKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(
                secret,
            ))),
            KeyType::Secp256k1 => k256::ecdsa::SigningKey::from_slice(secret)
                .map(SigningKey::Secp256k1)
                .map_err(|e| KeyError::InvalidKey {
                    key_type: key_type.as_str(),
                    reason: e.to_string(),
                }),
        }
    }

    /// The type of this key.
    pub fn key_type(&self) -> KeyType {
        match self {
            SigningKey::Ed25519(_) => KeyType::Ed25519,
            SigningKey::Secp256k1(_) => KeyType::Secp256k1,
        }
    }

    /// The matching public key.
    pub fn public_key(&self) -> PublicKey {
        match self {
            SigningKey::Ed25519(key) => PublicKey::Ed25519(key.verifying_key()),
            SigningKey::Secp256k1(key) => PublicKey::Secp256k1(*key.verifying_key()),
        }
    }

    /// The DID of the matching public key.
    pub fn did(&self) -> Did {
        issue_did(&self.public_key())
    }

    /// Sign `message`. Ed25519 yields a 64-byte EdDSA signature; secp256k1
    /// yields a 64-byte low-S `r || s` ECDSA signature over SHA-256.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, signature::Error> {
        use signature::Signer;

        match self {
            SigningKey::Ed25519(key) => {
                let signature: ed25519_dalek::Signature = key.try_sign(message)?;
                Ok(signature.to_bytes().to_vec())
            }
            SigningKey::Secp256k1(key) => {
                let signature: k256::ecdsa::Signature = key.try_sign(message)?;
                Ok(signature.to_bytes().to_vec())
            }
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_type", &self.key_type())
            .field("did", &self.did())
            .finish_non_exhaustive()
    }
}
