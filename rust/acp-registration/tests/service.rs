use acp_common::{Classify, Duration, ErrorKind, MemoryStore, Timestamp};
use acp_did::Did;
use acp_policy::{MemoryRelationshipEngine, Object, Params, RecordMetadata, RelationshipEngine};
use acp_registration::{CommitmentService, RegistrationError, proof_for_object};
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use testresult::TestResult;

const POLICY: &str = "policy-1";

fn at(height: u64) -> Timestamp {
    Timestamp::new(Utc.timestamp_opt(1_718_000_000 + 6 * height as i64, 0).unwrap(), height)
}

fn did(name: &str) -> Did {
    format!("did:example:{name}").parse().unwrap()
}

fn metadata(owner: &Did, height: u64) -> RecordMetadata {
    RecordMetadata {
        creation_ts: at(height),
        owner_did: owner.clone(),
        tx_signer: "source1signer".into(),
        tx_hash: None,
    }
}

fn params(validity_blocks: u64) -> Params {
    Params {
        registrations_commitment_validity: Duration::BlockCount(validity_blocks),
        ..Params::default()
    }
}

fn service() -> CommitmentService<MemoryStore, MemoryRelationshipEngine> {
    let mut engine = MemoryRelationshipEngine::default();
    engine.create_policy(POLICY);
    CommitmentService::new(MemoryStore::default(), engine)
}

#[test_log::test]
fn it_refuses_to_commit_over_claimed_objects() -> TestResult {
    let mut service = service();
    let (alice, bob) = (did("alice"), did("bob"));
    let taken = Object::new("file", "taken");
    service
        .engine_mut()
        .register_object(POLICY, &taken, metadata(&bob, 1))?;

    let error = service
        .build_commitment(POLICY, &alice, &[Object::new("file", "free"), taken])
        .unwrap_err();
    assert!(matches!(error, RegistrationError::ObjectAlreadyRegistered { .. }));
    assert_eq!(error.kind(), ErrorKind::BadInput);
    Ok(())
}

#[test_log::test]
fn it_validates_the_commitment_before_storing() -> TestResult {
    let mut service = service();
    let alice = did("alice");

    let short = service
        .set_new_commitment(POLICY, &[0u8; 31], &params(10), metadata(&alice, 1))
        .unwrap_err();
    assert_eq!(short.kind(), ErrorKind::BadInput);

    let missing = service
        .set_new_commitment("nope", &[0u8; 32], &params(10), metadata(&alice, 1))
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);

    let stored = service.set_new_commitment(POLICY, &[7u8; 32], &params(10), metadata(&alice, 1))?;
    assert_eq!(stored.id, 1);
    assert!(!stored.expired);
    assert_eq!(stored.validity, Duration::BlockCount(10));
    assert_eq!(service.commitments_by_root(&[7u8; 32])?, vec![stored]);
    Ok(())
}

#[test_log::test]
fn opening_checks_expiry_and_proof() -> TestResult {
    let mut service = service();
    let alice = did("alice");
    let objects = vec![Object::new("file", "a"), Object::new("file", "b")];
    let root = service.build_commitment(POLICY, &alice, &objects)?;
    let commitment = service.set_new_commitment(POLICY, root.as_ref(), &params(10), metadata(&alice, 10))?;
    let proof = proof_for_object(POLICY, &alice, 1, &objects)?;

    let (opened, valid) = service.validate_opening(commitment.id, &proof, &alice, &at(20))?;
    assert!(valid);
    assert_eq!(opened, commitment);

    let (_, valid) = service.validate_opening(commitment.id, &proof, &did("mallory"), &at(20))?;
    assert!(!valid);

    let expired = service
        .validate_opening(commitment.id, &proof, &alice, &at(21))
        .unwrap_err();
    assert!(matches!(expired, RegistrationError::CommitmentExpired { id: 1, .. }));
    assert_eq!(expired.kind(), ErrorKind::OperationForbidden);

    let missing = service
        .validate_opening(99, &proof, &alice, &at(20))
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
    Ok(())
}

#[test_log::test]
fn expiration_sweep_is_idempotent() -> TestResult {
    let mut service = service();
    let alice = did("alice");
    let short = service.set_new_commitment(POLICY, &[1u8; 32], &params(5), metadata(&alice, 10))?;
    let long = service.set_new_commitment(POLICY, &[2u8; 32], &params(50), metadata(&alice, 10))?;

    assert!(service.flag_expired_commitments(&at(15))?.is_empty());

    let flagged = service.flag_expired_commitments(&at(16))?;
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].id, short.id);
    assert!(flagged[0].expired);

    assert!(service.flag_expired_commitments(&at(16))?.is_empty());
    assert!(service.commitment(short.id)?.expired);
    assert!(!service.commitment(long.id)?.expired);
    Ok(())
}

#[test_log::test]
fn only_the_displaced_owner_may_flag_an_amendment() -> TestResult {
    let mut service = service();
    let (alice, bob) = (did("alice"), did("bob"));
    let object = Object::new("file", "a");
    let commitment = service.set_new_commitment(POLICY, &[3u8; 32], &params(10), metadata(&alice, 10))?;

    let amendment = service.record_amendment(&commitment, &object, Some(bob.clone()), metadata(&alice, 20))?;
    let fresh = service.record_amendment(&commitment, &Object::new("file", "b"), None, metadata(&alice, 20))?;

    let error = service
        .flag_hijack_attempt(POLICY, amendment.id, &alice)
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Unauthorized);

    let error = service
        .flag_hijack_attempt(POLICY, fresh.id, &bob)
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::OperationForbidden);

    let error = service
        .flag_hijack_attempt("policy-2", amendment.id, &bob)
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::BadInput);

    let flagged = service.flag_hijack_attempt(POLICY, amendment.id, &bob)?;
    assert!(flagged.hijack_flag);
    assert_eq!(service.flag_hijack_attempt(POLICY, amendment.id, &bob)?, flagged);
    assert_eq!(service.hijack_attempts(POLICY)?, vec![flagged]);

    let error = service.flag_hijack_attempt(POLICY, 42, &bob).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);
    Ok(())
}
