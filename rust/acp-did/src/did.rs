//! DID (Decentralized Identifier) types.

use crate::error::DidParseError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A [Decentralized Identifier][spec] string.
///
/// Wraps a raw DID string like `did:key:z6Mk...` or `did:web:example.com`.
/// Use [`method()`][Did::method] to inspect the DID method at runtime.
///
/// [spec]: https://www.w3.org/TR/did-core/
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Did(String);

impl Did {
    /// Get the raw DID string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the DID method name (e.g. `"key"` for `did:key:...`).
    #[must_use]
    pub fn method(&self) -> &str {
        let after_did = &self.0["did:".len()..];
        after_did.split(':').next().unwrap_or_default()
    }

    /// Wraps a string produced by this crate's own encoders.
    pub(crate) fn from_trusted(did: String) -> Self {
        debug_assert!(did.parse::<Did>().is_ok(), "malformed DID: {did}");
        Did(did)
    }

    /// Returns the method-specific identifier (everything after the method).
    #[must_use]
    pub fn identifier(&self) -> &str {
        let after_did = &self.0["did:".len()..];
        after_did
            .split_once(':')
            .map(|(_, identifier)| identifier)
            .unwrap_or_default()
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Did {
    type Err = DidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(rest) = s.strip_prefix("did:") else {
            return Err(DidParseError(format!("expected did: prefix, got: {s}")));
        };
        let Some((method, identifier)) = rest.split_once(':') else {
            return Err(DidParseError(format!(
                "expected did:method:identifier, got: {s}"
            )));
        };
        if method.is_empty()
            || !method
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(DidParseError(format!("invalid DID method in: {s}")));
        }
        if identifier.is_empty() || identifier.chars().any(char::is_whitespace) {
            return Err(DidParseError(format!("invalid DID identifier in: {s}")));
        }
        Ok(Did(s.to_string()))
    }
}

impl TryFrom<String> for Did {
    type Error = DidParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

impl Serialize for Did {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
