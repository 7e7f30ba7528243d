use acp_auth::{
    Address, BearerMsg, BearerToken, CmdAuthenticator, DirectMsg, MemoryAccountKeeper,
    PolicyCmdMsg, SignedMsg, SignedPolicyCmdPayload,
};
use acp_common::{Bytes, Classify, Duration, ErrorKind, MemoryStore, Timestamp};
use acp_did::{Did, KeyResolver, KeyType, SigningKey};
use acp_handler::{HandlerError, Keeper, TxContext};
use acp_policy::{
    ArchiveObjectResult, CommitRegistrationsCmd, DeleteRelationshipResult, EngineError,
    FlagHijackAttemptCmd, MemoryRelationshipEngine, Object, Params, PolicyCmd, PolicyCmdResult,
    RecordMetadata, RegisterObjectCmd, RegisterObjectResult, RegistrationProof,
    RegistrationsCommitment, Relationship, RelationshipEngine, RelationshipRecord,
    RevealRegistrationCmd, RevealRegistrationResult, SetRelationshipResult,
    UnarchiveObjectResult, UnregisterObjectResult,
};
use acp_registration::{RegistrationError, commitment_with_proofs};
use chrono::{TimeDelta, TimeZone, Utc};
use pretty_assertions::assert_eq;
use testresult::TestResult;

const POLICY: &str = "policy-1";

fn at(height: u64) -> Timestamp {
    Timestamp::new(Utc.timestamp_opt(1_718_632_800 + 6 * height as i64, 0).unwrap(), height)
}

/// The in-memory engine with a switch that makes every mutation fail.
#[derive(Debug, Default)]
struct FlakyEngine {
    inner: MemoryRelationshipEngine,
    fail_writes: bool,
}

impl FlakyEngine {
    fn check(&self) -> Result<(), EngineError> {
        if self.fail_writes {
            return Err(EngineError::Backend("disk full".into()));
        }
        Ok(())
    }
}

impl RelationshipEngine for FlakyEngine {
    fn policy_exists(&self, policy_id: &str) -> Result<bool, EngineError> {
        self.inner.policy_exists(policy_id)
    }

    fn set_relationship(
        &mut self,
        policy_id: &str,
        relationship: Relationship,
        metadata: RecordMetadata,
    ) -> Result<SetRelationshipResult, EngineError> {
        self.check()?;
        self.inner.set_relationship(policy_id, relationship, metadata)
    }

    fn delete_relationship(
        &mut self,
        policy_id: &str,
        relationship: &Relationship,
        actor: &Did,
    ) -> Result<DeleteRelationshipResult, EngineError> {
        self.check()?;
        self.inner.delete_relationship(policy_id, relationship, actor)
    }

    fn register_object(
        &mut self,
        policy_id: &str,
        object: &Object,
        metadata: RecordMetadata,
    ) -> Result<RegisterObjectResult, EngineError> {
        self.check()?;
        self.inner.register_object(policy_id, object, metadata)
    }

    fn unregister_object(
        &mut self,
        policy_id: &str,
        object: &Object,
        actor: &Did,
    ) -> Result<UnregisterObjectResult, EngineError> {
        self.check()?;
        self.inner.unregister_object(policy_id, object, actor)
    }

    fn archive_object(
        &mut self,
        policy_id: &str,
        object: &Object,
        actor: &Did,
    ) -> Result<ArchiveObjectResult, EngineError> {
        self.check()?;
        self.inner.archive_object(policy_id, object, actor)
    }

    fn unarchive_object(
        &mut self,
        policy_id: &str,
        object: &Object,
        actor: &Did,
    ) -> Result<UnarchiveObjectResult, EngineError> {
        self.check()?;
        self.inner.unarchive_object(policy_id, object, actor)
    }

    fn get_object_registration(
        &self,
        policy_id: &str,
        object: &Object,
    ) -> Result<Option<RelationshipRecord>, EngineError> {
        self.inner.get_object_registration(policy_id, object)
    }

    fn amend_registration(
        &mut self,
        policy_id: &str,
        object: &Object,
        metadata: RecordMetadata,
    ) -> Result<RelationshipRecord, EngineError> {
        self.check()?;
        self.inner.amend_registration(policy_id, object, metadata)
    }
}

type TestKeeper = Keeper<MemoryStore, FlakyEngine, KeyResolver, MemoryAccountKeeper>;

struct Party {
    key: SigningKey,
    address: Address,
}

impl Party {
    fn did(&self) -> Did {
        self.key.did()
    }

    fn tx(&self, height: u64) -> TxContext {
        TxContext {
            signer: self.address.clone(),
            now: at(height),
            tx_hash: Some(format!("{}-{height}", self.address)),
        }
    }
}

struct World {
    keeper: TestKeeper,
    alice: Party,
    bob: Party,
}

fn world(validity: Duration) -> World {
    let mut accounts = MemoryAccountKeeper::default();
    let mut party = |key_type, seed| {
        let key = SigningKey::from_secret(key_type, &[seed; 32]).unwrap();
        let address = accounts.insert_key("source", &key.public_key()).unwrap();
        Party { key, address }
    };
    let alice = party(KeyType::Secp256k1, 1);
    let bob = party(KeyType::Ed25519, 2);

    let mut engine = FlakyEngine::default();
    engine.inner.create_policy(POLICY);
    engine.inner.create_policy("policy-2");
    let params = Params {
        registrations_commitment_validity: validity,
        ..Params::default()
    };
    let keeper = Keeper::new(
        MemoryStore::default(),
        engine,
        CmdAuthenticator::new(KeyResolver, accounts),
        params,
    )
    .unwrap();
    World { keeper, alice, bob }
}

fn direct(policy_id: &str, cmd: PolicyCmd) -> PolicyCmdMsg {
    PolicyCmdMsg::Direct(DirectMsg {
        policy_id: policy_id.into(),
        cmd,
    })
}

fn register(object: &Object) -> PolicyCmd {
    PolicyCmd::RegisterObject(RegisterObjectCmd {
        object: object.clone(),
    })
}

fn reveal(commitment_id: u64, proof: &RegistrationProof) -> PolicyCmd {
    PolicyCmd::RevealRegistration(RevealRegistrationCmd {
        registrations_commitment_id: commitment_id,
        proof: proof.clone(),
    })
}

impl World {
    /// Publish a commitment over `objects` for `party` in `policy_id`,
    /// returning it with the openings.
    fn commit(
        &mut self,
        party: fn(&World) -> &Party,
        policy_id: &str,
        objects: &[Object],
        height: u64,
    ) -> Result<(RegistrationsCommitment, Vec<RegistrationProof>), HandlerError> {
        let (actor, tx) = {
            let party = party(self);
            (party.did(), party.tx(height))
        };
        let (root, proofs) = commitment_with_proofs(policy_id, &actor, objects)
            .map_err(RegistrationError::from)?;
        let result = self.keeper.handle(
            direct(
                policy_id,
                PolicyCmd::CommitRegistrations(CommitRegistrationsCmd {
                    commitment: Bytes::from_slice(root.as_ref()),
                }),
            ),
            &tx,
        )?;
        match result {
            PolicyCmdResult::CommitRegistrations(committed) => {
                Ok((committed.registrations_commitment, proofs))
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    fn reveal(
        &mut self,
        party: fn(&World) -> &Party,
        commitment_id: u64,
        proof: &RegistrationProof,
        height: u64,
    ) -> Result<RevealRegistrationResult, HandlerError> {
        let tx = party(self).tx(height);
        match self.keeper.handle(direct(POLICY, reveal(commitment_id, proof)), &tx)? {
            PolicyCmdResult::RevealRegistration(revealed) => Ok(revealed),
            other => panic!("unexpected result {other:?}"),
        }
    }
}

fn alice(world: &World) -> &Party {
    &world.alice
}

fn bob(world: &World) -> &Party {
    &world.bob
}

#[test_log::test]
fn an_older_commitment_takes_over_a_later_registration() -> TestResult {
    let mut world = world(Duration::BlockCount(100));
    let object = Object::new("file", "contested");

    let (commitment, proofs) = world.commit(alice, POLICY, &[object.clone()], 10)?;
    assert_eq!(world.keeper.commitment(commitment.id)?, commitment);
    world
        .keeper
        .handle(direct(POLICY, register(&object)), &world.bob.tx(15))?;
    assert_eq!(
        world.keeper.object_registration(POLICY, &object)?.unwrap().owner(),
        &world.bob.did()
    );

    let revealed = world.reveal(alice, commitment.id, &proofs[0], 20)?;
    assert_eq!(revealed.record.owner(), &world.alice.did());
    assert_eq!(revealed.record.metadata.creation_ts, at(10));
    assert_eq!(revealed.event.new_owner, world.alice.did());
    assert_eq!(revealed.event.previous_owner, Some(world.bob.did()));
    assert_eq!(revealed.event.commitment_id, commitment.id);
    assert_eq!(revealed.event.metadata.creation_ts, at(20));

    let stored = world.keeper.object_registration(POLICY, &object)?.unwrap();
    assert_eq!(stored, revealed.record);
    assert_eq!(world.keeper.amendment_event(revealed.event.id)?, revealed.event);
    Ok(())
}

#[test_log::test]
fn a_reveal_registers_an_unclaimed_object_as_of_the_commitment() -> TestResult {
    let mut world = world(Duration::BlockCount(100));
    let objects = [Object::new("file", "a"), Object::new("file", "b")];

    let (commitment, proofs) = world.commit(alice, POLICY, &objects, 10)?;
    let revealed = world.reveal(alice, commitment.id, &proofs[1], 12)?;
    assert_eq!(revealed.record.owner(), &world.alice.did());
    assert_eq!(revealed.record.metadata.creation_ts, at(10));
    assert_eq!(revealed.record.metadata.tx_signer, world.alice.address.as_str());
    assert_eq!(revealed.event.previous_owner, None);
    assert_eq!(world.keeper.object_registration(POLICY, &objects[0])?, None);
    Ok(())
}

#[test_log::test]
fn the_same_opening_cannot_be_revealed_twice() -> TestResult {
    let mut world = world(Duration::BlockCount(100));
    let object = Object::new("file", "once");

    let (commitment, proofs) = world.commit(alice, POLICY, &[object], 10)?;
    world.reveal(alice, commitment.id, &proofs[0], 11)?;

    let error = world.reveal(alice, commitment.id, &proofs[0], 12).unwrap_err();
    assert!(matches!(error, HandlerError::PriorClaim { .. }));
    assert_eq!(error.kind(), ErrorKind::OperationForbidden);
    Ok(())
}

#[test_log::test]
fn an_earlier_registration_wins_over_a_later_commitment() -> TestResult {
    let mut world = world(Duration::BlockCount(100));
    let object = Object::new("file", "early");
    world
        .keeper
        .handle(direct(POLICY, register(&object)), &world.bob.tx(5))?;

    let (commitment, proofs) = world.commit(alice, POLICY, &[object.clone()], 10)?;
    let error = world.reveal(alice, commitment.id, &proofs[0], 12).unwrap_err();
    assert!(matches!(
        error,
        HandlerError::PriorClaim {
            committed_height: 10,
            registered_height: 5,
            ..
        }
    ));
    assert_eq!(
        world.keeper.object_registration(POLICY, &object)?.unwrap().owner(),
        &world.bob.did()
    );
    assert!(matches!(
        world.keeper.amendment_event(1).unwrap_err(),
        HandlerError::Registration(RegistrationError::EventNotFound(1))
    ));
    Ok(())
}

#[test_log::test]
fn a_proof_must_open_the_commitment_of_the_named_policy() -> TestResult {
    let mut world = world(Duration::BlockCount(100));
    let (commitment, proofs) = world.commit(alice, POLICY, &[Object::new("file", "a")], 10)?;

    let mut forged = proofs[0].clone();
    forged.object = Object::new("file", "z");
    let error = world.reveal(alice, commitment.id, &forged, 11).unwrap_err();
    assert!(matches!(error, HandlerError::InvalidProof { .. }));
    assert_eq!(error.kind(), ErrorKind::Unauthorized);

    let error = world.reveal(bob, commitment.id, &proofs[0], 11).unwrap_err();
    assert!(matches!(error, HandlerError::InvalidProof { .. }));

    let (elsewhere, proofs) = world.commit(alice, "policy-2", &[Object::new("file", "a")], 10)?;
    let error = world.reveal(alice, elsewhere.id, &proofs[0], 11).unwrap_err();
    assert!(matches!(error, HandlerError::CommitmentPolicyMismatch { .. }));
    assert_eq!(error.kind(), ErrorKind::BadInput);
    Ok(())
}

#[test_log::test]
fn expired_commitments_are_swept_once_and_refused() -> TestResult {
    let mut world = world(Duration::BlockCount(10));
    let (commitment, proofs) = world.commit(alice, POLICY, &[Object::new("file", "late")], 10)?;

    assert!(world.keeper.end_block(&at(20))?.is_empty());
    let expired = world.keeper.end_block(&at(21))?;
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, commitment.id);
    assert!(world.keeper.end_block(&at(21))?.is_empty());
    assert!(world.keeper.commitment(commitment.id)?.expired);

    let error = world.reveal(alice, commitment.id, &proofs[0], 21).unwrap_err();
    assert!(matches!(
        error,
        HandlerError::Registration(RegistrationError::CommitmentExpired { .. })
    ));
    assert_eq!(error.kind(), ErrorKind::OperationForbidden);
    Ok(())
}

#[test_log::test]
fn a_displaced_owner_can_flag_the_amendment() -> TestResult {
    let mut world = world(Duration::BlockCount(100));
    let object = Object::new("file", "contested");
    let (commitment, proofs) = world.commit(alice, POLICY, &[object.clone()], 10)?;
    world
        .keeper
        .handle(direct(POLICY, register(&object)), &world.bob.tx(15))?;
    let revealed = world.reveal(alice, commitment.id, &proofs[0], 20)?;

    let flag = direct(
        POLICY,
        PolicyCmd::FlagHijackAttempt(FlagHijackAttemptCmd {
            event_id: revealed.event.id,
        }),
    );
    let error = world
        .keeper
        .handle(flag.clone(), &world.alice.tx(21))
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Unauthorized);

    let result = world.keeper.handle(flag, &world.bob.tx(21))?;
    let PolicyCmdResult::FlagHijackAttempt(flagged) = result else {
        panic!("unexpected result");
    };
    assert!(flagged.event.hijack_flag);
    assert_eq!(world.keeper.hijack_attempts(POLICY)?, vec![flagged.event]);
    assert!(world.keeper.hijack_attempts("policy-2")?.is_empty());
    Ok(())
}

#[test_log::test]
fn a_failed_command_writes_nothing() -> TestResult {
    let mut world = world(Duration::BlockCount(100));
    let (commitment, proofs) = world.commit(alice, POLICY, &[Object::new("file", "a")], 10)?;

    world.keeper.engine_mut().fail_writes = true;
    let error = world.reveal(alice, commitment.id, &proofs[0], 11).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Internal);
    assert!(world.keeper.amendment_event(1).is_err());

    world.keeper.engine_mut().fail_writes = false;
    let revealed = world.reveal(alice, commitment.id, &proofs[0], 12)?;
    assert_eq!(revealed.event.id, 1);
    Ok(())
}

#[test_log::test]
fn token_strategies_act_for_their_issuer() -> TestResult {
    let mut world = world(Duration::BlockCount(100));
    let carol = SigningKey::from_secret(KeyType::Ed25519, &[3; 32])?;

    let token = BearerToken::builder()
        .issuer(&carol)
        .authorized_account(world.alice.address.clone())
        .issued_at(at(30).wall)
        .valid_for(TimeDelta::minutes(5))
        .try_build()?;
    let bearer = PolicyCmdMsg::Bearer(BearerMsg {
        bearer_token: token,
        policy_id: POLICY.into(),
        cmd: register(&Object::new("file", "bearer")),
    });
    let error = world
        .keeper
        .handle(bearer.clone(), &world.bob.tx(30))
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Unauthorized);

    let PolicyCmdResult::RegisterObject(registered) = world.keeper.handle(bearer, &world.alice.tx(30))? else {
        panic!("unexpected result");
    };
    assert_eq!(registered.record.owner(), &carol.did());
    assert_eq!(registered.record.metadata.tx_signer, world.alice.address.as_str());

    let payload = SignedPolicyCmdPayload::builder()
        .actor(&carol)
        .policy_id(POLICY)
        .cmd(register(&Object::new("file", "signed")))
        .issued_at(at(30))
        .expiration_delta(10)
        .try_build()?;
    let PolicyCmdResult::RegisterObject(registered) = world
        .keeper
        .handle(PolicyCmdMsg::Signed(SignedMsg { payload }), &world.bob.tx(40))?
    else {
        panic!("unexpected result");
    };
    assert_eq!(registered.record.owner(), &carol.did());
    assert_eq!(registered.record.metadata.tx_signer, world.bob.address.as_str());
    Ok(())
}

#[test_log::test]
fn wire_messages_name_unknown_commands() {
    let mut world = world(Duration::BlockCount(100));
    let tx = world.alice.tx(1);
    let error = world
        .keeper
        .handle_json(
            br#"{"direct": {"policy_id": "policy-1", "cmd": {"transfer_object": {"object": {}}}}}"#,
            &tx,
        )
        .unwrap_err();
    assert!(matches!(
        error,
        HandlerError::Cmd(acp_policy::CmdDecodeError::UnknownVariant(_))
    ));
}

#[test_log::test]
fn generated_commitments_skip_claimed_objects() -> TestResult {
    let mut world = world(Duration::BlockCount(100));
    let taken = Object::new("file", "taken");
    world
        .keeper
        .handle(direct(POLICY, register(&taken)), &world.bob.tx(1))?;

    let error = world
        .keeper
        .generate_commitment(POLICY, &world.alice.did(), &[taken])
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::BadInput);

    let (root, proofs) =
        world
            .keeper
            .generate_commitment(POLICY, &world.alice.did(), &[Object::new("file", "free")])?;
    assert_eq!(proofs.len(), 1);
    let (commitment, _) = world.commit(alice, POLICY, &[Object::new("file", "free")], 2)?;
    assert_eq!(commitment.commitment, root);
    assert_eq!(world.keeper.commitments_by_root(root.as_ref())?, vec![commitment]);
    Ok(())
}

#[test_log::test]
fn invalid_params_are_refused() {
    let mut world = world(Duration::BlockCount(100));
    let error = world
        .keeper
        .set_params(Params {
            policy_command_max_expiration_delta: 0,
            ..Params::default()
        })
        .unwrap_err();
    assert!(matches!(error, HandlerError::Params(_)));
    assert_eq!(
        world.keeper.params().registrations_commitment_validity,
        Duration::BlockCount(100)
    );
}
