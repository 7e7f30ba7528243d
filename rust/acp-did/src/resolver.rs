//! DID-to-key resolution.

use crate::{did::Did, error::ResolveError, key::PublicKey};
use std::collections::BTreeMap;

/// A public key published by a DID document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationMethod {
    /// Method id, usually `<did>#<fragment>`.
    pub id: String,
    /// The DID controlling this key.
    pub controller: Did,
    /// The key itself.
    pub public_key: PublicKey,
}

/// The resolved form of a DID: the keys it can be verified with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DidDocument {
    /// The DID this document describes.
    pub id: Did,
    /// Verification methods in document order.
    pub verification_methods: Vec<VerificationMethod>,
}

impl DidDocument {
    /// The first verification method of the document. Authentication always
    /// verifies against this key, never against key hints carried by the
    /// signed message itself.
    pub fn first_verification_method(&self) -> Result<&VerificationMethod, ResolveError> {
        self.verification_methods
            .first()
            .ok_or_else(|| ResolveError::NoVerificationMethod(self.id.clone()))
    }
}

/// Resolves a DID to its [`DidDocument`].
///
/// Resolution is synchronous: commands execute inside a deterministic state
/// machine step and never suspend. Methods that would need network I/O must
/// be served from state the host has already fetched.
pub trait Resolver {
    /// Resolve `did` to its document.
    fn resolve(&self, did: &Did) -> Result<DidDocument, ResolveError>;

    /// Combine with another resolver that handles different DID methods.
    ///
    /// ```ignore
    /// let resolver = KeyResolver.or(registry_resolver);
    /// ```
    fn or<R>(self, other: R) -> CompositeResolver<Self, R>
    where
        Self: Sized,
    {
        CompositeResolver(self, other)
    }
}

impl<R: Resolver + ?Sized> Resolver for &R {
    fn resolve(&self, did: &Did) -> Result<DidDocument, ResolveError> {
        (**self).resolve(did)
    }
}

/// Resolves `did:key` identifiers locally, without any I/O.
///
/// The document of a `did:key` has exactly one verification method: the key
/// encoded in the identifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyResolver;

impl Resolver for KeyResolver {
    fn resolve(&self, did: &Did) -> Result<DidDocument, ResolveError> {
        if did.method() != "key" {
            return Err(ResolveError::UnsupportedMethod {
                method: did.method().to_string(),
                did: did.clone(),
            });
        }
        let public_key = PublicKey::from_did_key(did.as_str())?;
        Ok(DidDocument {
            id: did.clone(),
            verification_methods: vec![VerificationMethod {
                id: format!("{did}#{}", did.identifier()),
                controller: did.clone(),
                public_key,
            }],
        })
    }
}

/// A resolver that asks the left resolver first and falls back to the right
/// one when the left does not handle the DID's method.
///
/// Built via [`Resolver::or`].
#[derive(Debug, Clone, Copy)]
pub struct CompositeResolver<L, R>(pub L, pub R);

impl<L: Resolver, R: Resolver> Resolver for CompositeResolver<L, R> {
    fn resolve(&self, did: &Did) -> Result<DidDocument, ResolveError> {
        match self.0.resolve(did) {
            Err(ResolveError::UnsupportedMethod { .. }) => self.1.resolve(did),
            result => result,
        }
    }
}

/// Serves pre-fetched DID documents for one or more methods from memory.
///
/// Hosts use it to make non-`did:key` identities resolvable inside a block
/// without I/O; tests use it to model documents with several keys.
#[derive(Debug, Clone, Default)]
pub struct DocumentResolver {
    documents: BTreeMap<Did, DidDocument>,
}

impl DocumentResolver {
    /// Register (or replace) a document.
    pub fn insert(&mut self, document: DidDocument) {
        self.documents.insert(document.id.clone(), document);
    }

    fn serves(&self, method: &str) -> bool {
        self.documents.keys().any(|did| did.method() == method)
    }
}

impl Resolver for DocumentResolver {
    fn resolve(&self, did: &Did) -> Result<DidDocument, ResolveError> {
        match self.documents.get(did) {
            Some(document) => Ok(document.clone()),
            None if self.serves(did.method()) => Err(ResolveError::NotFound(did.clone())),
            None => Err(ResolveError::UnsupportedMethod {
                method: did.method().to_string(),
                did: did.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{KeyType, SigningKey};
    use acp_common::{Classify, ErrorKind};
    use testresult::TestResult;

    fn web_document(did: &Did, keys: &[&SigningKey]) -> DidDocument {
        DidDocument {
            id: did.clone(),
            verification_methods: keys
                .iter()
                .enumerate()
                .map(|(i, key)| VerificationMethod {
                    id: format!("{did}#key-{i}"),
                    controller: did.clone(),
                    public_key: key.public_key(),
                })
                .collect(),
        }
    }

    #[test]
    fn key_resolver_yields_the_embedded_key() -> TestResult {
        let key = SigningKey::from_secret(KeyType::Secp256k1, &[5; 32])?;
        let document = KeyResolver.resolve(&key.did())?;

        assert_eq!(document.id, key.did());
        assert_eq!(document.first_verification_method()?.public_key, key.public_key());
        Ok(())
    }

    #[test]
    fn key_resolver_rejects_other_methods() -> TestResult {
        let did: Did = "did:web:example.com".parse()?;
        let error = KeyResolver.resolve(&did).unwrap_err();

        assert!(matches!(error, ResolveError::UnsupportedMethod { .. }));
        assert_eq!(error.kind(), ErrorKind::NotFound);
        Ok(())
    }

    #[test]
    fn malformed_did_key_is_bad_input() -> TestResult {
        let did: Did = "did:key:z111".parse()?;
        let error = KeyResolver.resolve(&did).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::BadInput);
        Ok(())
    }

    #[test]
    fn composite_resolver_falls_through_on_unsupported_method() -> TestResult {
        let first = SigningKey::from_secret(KeyType::Ed25519, &[1; 32])?;
        let second = SigningKey::from_secret(KeyType::Ed25519, &[2; 32])?;
        let web: Did = "did:web:example.com".parse()?;

        let mut documents = DocumentResolver::default();
        documents.insert(web_document(&web, &[&first, &second]));
        let resolver = KeyResolver.or(documents);

        let document = resolver.resolve(&web)?;
        assert_eq!(document.first_verification_method()?.public_key, first.public_key());

        let by_key = resolver.resolve(&second.did())?;
        assert_eq!(by_key.first_verification_method()?.public_key, second.public_key());

        let missing: Did = "did:web:missing.example.com".parse()?;
        assert!(matches!(resolver.resolve(&missing), Err(ResolveError::NotFound(_))));
        Ok(())
    }

    #[test]
    fn empty_document_has_no_first_method() -> TestResult {
        let did: Did = "did:web:empty.example.com".parse()?;
        let document = DidDocument {
            id: did,
            verification_methods: vec![],
        };
        assert!(matches!(
            document.first_verification_method(),
            Err(ResolveError::NoVerificationMethod(_))
        ));
        Ok(())
    }
}
