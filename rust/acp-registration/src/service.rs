use crate::{
    commitment::{commitment_with_proofs, generate_commitment, verify_proof},
    error::{CommitmentError, RegistrationError},
    repository::RegistrationRepository,
};
use acp_common::{SHA256_HASH_SIZE, Sha256Hash, Store, Timestamp};
use acp_did::Did;
use acp_policy::{
    AmendmentEvent, Object, Params, RecordMetadata, RegistrationProof, RegistrationsCommitment,
    RelationshipEngine,
};

/// Stateful side of the commit-reveal protocol.
///
/// Owns typed access to the host store and a handle on the relationship
/// engine, which it consults to keep commitments away from claimed objects.
/// The service never registers objects itself; the reveal path of the
/// dispatcher decides what a valid opening leads to.
#[derive(Debug)]
pub struct CommitmentService<S, E> {
    repository: RegistrationRepository<S>,
    engine: E,
}

impl<S: Store, E: RelationshipEngine> CommitmentService<S, E> {
    /// Build a service over a store and an engine.
    pub fn new(store: S, engine: E) -> Self {
        Self {
            repository: RegistrationRepository::new(store),
            engine,
        }
    }

    /// Release the store and the engine.
    pub fn into_parts(self) -> (S, E) {
        (self.repository.into_inner(), self.engine)
    }

    /// The relationship engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The relationship engine, mutably.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// The store and the engine, mutably, for scoping one command in a
    /// [`acp_common::StoreOverlay`].
    pub fn parts_mut(&mut self) -> (&mut S, &mut E) {
        (self.repository.store_mut(), &mut self.engine)
    }

    fn ensure_unclaimed(&self, policy_id: &str, objects: &[Object]) -> Result<(), RegistrationError> {
        if !self.engine.policy_exists(policy_id)? {
            return Err(RegistrationError::PolicyNotFound(policy_id.to_string()));
        }
        for object in objects {
            if let Some(record) = self.engine.get_object_registration(policy_id, object)? {
                return Err(RegistrationError::ObjectAlreadyRegistered {
                    object: object.clone(),
                    owner: record.owner().clone(),
                });
            }
        }
        Ok(())
    }

    /// Commitment root over objects that nobody has registered yet.
    pub fn build_commitment(
        &self,
        policy_id: &str,
        actor: &Did,
        objects: &[Object],
    ) -> Result<Sha256Hash, RegistrationError> {
        self.ensure_unclaimed(policy_id, objects)?;
        Ok(generate_commitment(policy_id, actor, objects)?)
    }

    /// Like [`Self::build_commitment`], also returning the opening of every
    /// object in input order.
    pub fn build_commitment_with_proofs(
        &self,
        policy_id: &str,
        actor: &Did,
        objects: &[Object],
    ) -> Result<(Sha256Hash, Vec<RegistrationProof>), RegistrationError> {
        self.ensure_unclaimed(policy_id, objects)?;
        Ok(commitment_with_proofs(policy_id, actor, objects)?)
    }

    /// Persist a commitment published by `metadata.owner_did`.
    pub fn set_new_commitment(
        &mut self,
        policy_id: &str,
        raw_commitment: &[u8],
        params: &Params,
        metadata: RecordMetadata,
    ) -> Result<RegistrationsCommitment, RegistrationError> {
        if !self.engine.policy_exists(policy_id)? {
            return Err(RegistrationError::PolicyNotFound(policy_id.to_string()));
        }
        let root = Sha256Hash::try_from(raw_commitment).map_err(|_| CommitmentError::InvalidRootLength {
            expected: SHA256_HASH_SIZE,
            actual: raw_commitment.len(),
        })?;
        let commitment = self.repository.create_commitment(
            policy_id,
            root,
            params.registrations_commitment_validity,
            metadata,
        )?;
        tracing::info!(
            policy_id,
            commitment_id = commitment.id,
            actor = %commitment.owner(),
            height = commitment.metadata.creation_ts.height,
            "registrations commitment created"
        );
        Ok(commitment)
    }

    /// Flag every active commitment whose validity window passed before
    /// `now`, returning the ones flagged by this call.
    ///
    /// Meant to run once per block. A second call at the same `now` finds
    /// nothing left to flag.
    pub fn flag_expired_commitments(
        &mut self,
        now: &Timestamp,
    ) -> Result<Vec<RegistrationsCommitment>, RegistrationError> {
        let mut expired = Vec::new();
        for mut commitment in self.repository.active_commitments()? {
            if commitment.is_expired_at(now) {
                self.repository.mark_expired(&mut commitment)?;
                tracing::debug!(
                    commitment_id = commitment.id,
                    policy_id = commitment.policy_id.as_str(),
                    height = now.height,
                    "registrations commitment expired"
                );
                expired.push(commitment);
            }
        }
        Ok(expired)
    }

    /// Load a commitment and check `proof` against it for `actor`.
    ///
    /// Expired commitments are refused. A proof that does not open the
    /// commitment is reported as `false`, not as an error. Nothing is
    /// written.
    pub fn validate_opening(
        &self,
        commitment_id: u64,
        proof: &RegistrationProof,
        actor: &Did,
        now: &Timestamp,
    ) -> Result<(RegistrationsCommitment, bool), RegistrationError> {
        let commitment = self.commitment(commitment_id)?;
        if commitment.expired || commitment.is_expired_at(now) {
            return Err(RegistrationError::CommitmentExpired {
                id: commitment.id,
                created: commitment.metadata.creation_ts,
                validity: commitment.validity,
                now: *now,
            });
        }
        let valid = verify_proof(
            commitment.commitment.as_ref(),
            &commitment.policy_id,
            actor,
            proof,
        )?;
        Ok((commitment, valid))
    }

    /// Persist the audit event of a successful reveal. The revealing actor,
    /// `metadata.owner_did`, is the new owner.
    pub fn record_amendment(
        &mut self,
        commitment: &RegistrationsCommitment,
        object: &Object,
        previous_owner: Option<Did>,
        metadata: RecordMetadata,
    ) -> Result<AmendmentEvent, RegistrationError> {
        let event = self.repository.create_event(
            &commitment.policy_id,
            object.clone(),
            metadata.owner_did.clone(),
            previous_owner,
            commitment.id,
            metadata,
        )?;
        tracing::info!(
            policy_id = event.policy_id.as_str(),
            event_id = event.id,
            commitment_id = event.commitment_id,
            %object,
            new_owner = %event.new_owner,
            previous_owner = ?event.previous_owner,
            "amendment event recorded"
        );
        Ok(event)
    }

    /// Mark an amendment event as disputed by the owner it displaced.
    pub fn flag_hijack_attempt(
        &mut self,
        policy_id: &str,
        event_id: u64,
        actor: &Did,
    ) -> Result<AmendmentEvent, RegistrationError> {
        let mut event = self
            .repository
            .event(event_id)?
            .ok_or(RegistrationError::EventNotFound(event_id))?;
        if event.policy_id != policy_id {
            return Err(RegistrationError::EventPolicyMismatch {
                id: event_id,
                expected: policy_id.to_string(),
                actual: event.policy_id,
            });
        }
        match &event.previous_owner {
            None => return Err(RegistrationError::NothingToDispute(event_id)),
            Some(previous) if previous != actor => {
                return Err(RegistrationError::NotPreviousOwner {
                    id: event_id,
                    actor: actor.clone(),
                });
            }
            Some(_) => {}
        }
        if !event.hijack_flag {
            self.repository.flag_event(&mut event)?;
            tracing::warn!(
                policy_id,
                event_id,
                actor = %actor,
                object = %event.object,
                "amendment flagged as hijack attempt"
            );
        }
        Ok(event)
    }

    /// A commitment by id.
    pub fn commitment(&self, id: u64) -> Result<RegistrationsCommitment, RegistrationError> {
        self.repository
            .commitment(id)?
            .ok_or(RegistrationError::CommitmentNotFound(id))
    }

    /// Commitments published with the given root bytes.
    pub fn commitments_by_root(&self, root: &[u8]) -> Result<Vec<RegistrationsCommitment>, RegistrationError> {
        let root = Sha256Hash::try_from(root).map_err(|_| CommitmentError::InvalidRootLength {
            expected: SHA256_HASH_SIZE,
            actual: root.len(),
        })?;
        Ok(self.repository.commitments_by_root(&root)?)
    }

    /// An amendment event by id.
    pub fn amendment_event(&self, id: u64) -> Result<AmendmentEvent, RegistrationError> {
        self.repository
            .event(id)?
            .ok_or(RegistrationError::EventNotFound(id))
    }

    /// Amendment events of a policy flagged as hijack attempts.
    pub fn hijack_attempts(&self, policy_id: &str) -> Result<Vec<AmendmentEvent>, RegistrationError> {
        Ok(self.repository.hijack_events(policy_id)?)
    }
}
