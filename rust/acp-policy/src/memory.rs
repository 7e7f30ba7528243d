use crate::{
    cmd::{
        ArchiveObjectResult, DeleteRelationshipResult, RegisterObjectResult, RegistrationResult,
        SetRelationshipResult, UnarchiveObjectResult, UnregisterObjectResult,
    },
    engine::{EngineError, RelationshipEngine},
    relationship::{OWNER_RELATION, Object, RecordMetadata, Relationship, RelationshipRecord, Subject},
};
use acp_did::Did;
use std::collections::{BTreeMap, BTreeSet};

/// An in-memory [`RelationshipEngine`] with ownership-only authorization.
///
/// The owner of an object may add and remove relationships on it, and only
/// the owner may unregister, archive or unarchive it. No permission
/// expressions are evaluated.
#[derive(Debug, Clone, Default)]
pub struct MemoryRelationshipEngine {
    policies: BTreeMap<String, BTreeMap<Relationship, RelationshipRecord>>,
}

impl MemoryRelationshipEngine {
    /// Create an empty policy. Returns `false` if it already existed.
    pub fn create_policy(&mut self, policy_id: impl Into<String>) -> bool {
        let policy_id = policy_id.into();
        if self.policies.contains_key(&policy_id) {
            return false;
        }
        self.policies.insert(policy_id, BTreeMap::new());
        true
    }

    /// Every record of a policy, in relationship order.
    pub fn records(&self, policy_id: &str) -> impl Iterator<Item = &RelationshipRecord> {
        self.policies.get(policy_id).into_iter().flat_map(|records| records.values())
    }

    fn policy(&self, policy_id: &str) -> Result<&BTreeMap<Relationship, RelationshipRecord>, EngineError> {
        self.policies
            .get(policy_id)
            .ok_or_else(|| EngineError::PolicyNotFound(policy_id.to_string()))
    }

    fn policy_mut(
        &mut self,
        policy_id: &str,
    ) -> Result<&mut BTreeMap<Relationship, RelationshipRecord>, EngineError> {
        self.policies
            .get_mut(policy_id)
            .ok_or_else(|| EngineError::PolicyNotFound(policy_id.to_string()))
    }

    fn registration(
        records: &BTreeMap<Relationship, RelationshipRecord>,
        object: &Object,
    ) -> Option<(Relationship, RelationshipRecord)> {
        records
            .iter()
            .find(|(relationship, _)| {
                relationship.object == *object && relationship.relation == OWNER_RELATION
            })
            .map(|(relationship, record)| (relationship.clone(), record.clone()))
    }

    /// The registration of `object`, which `actor` must own.
    fn owned_registration(
        &self,
        policy_id: &str,
        object: &Object,
        actor: &Did,
    ) -> Result<Option<(Relationship, RelationshipRecord)>, EngineError> {
        let records = self.policy(policy_id)?;
        match Self::registration(records, object) {
            Some((_, record)) if record.owner() != actor => Err(EngineError::NotOwner {
                object: object.clone(),
                actor: actor.clone(),
            }),
            found => Ok(found),
        }
    }

    /// Drop every non-owner relationship on `object`, returning how many.
    fn remove_relationships(
        records: &mut BTreeMap<Relationship, RelationshipRecord>,
        object: &Object,
    ) -> u64 {
        let before = records.len();
        records.retain(|relationship, _| {
            relationship.object != *object || relationship.relation == OWNER_RELATION
        });
        (before - records.len()) as u64
    }

    fn check_relationship(relationship: &Relationship) -> Result<(), EngineError> {
        if !relationship.object.is_well_formed() || relationship.relation.is_empty() {
            return Err(EngineError::InvalidRelationship(relationship.to_string()));
        }
        if relationship.relation == OWNER_RELATION {
            return Err(EngineError::InvalidRelationship(format!(
                "the {OWNER_RELATION} relation is managed through object registration"
            )));
        }
        match &relationship.subject {
            Subject::Object(object) | Subject::ActorSet { object, .. } if !object.is_well_formed() => {
                Err(EngineError::InvalidRelationship(relationship.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn check_object(object: &Object) -> Result<(), EngineError> {
        if object.is_well_formed() {
            Ok(())
        } else {
            Err(EngineError::InvalidRelationship(format!(
                "object {object} needs a resource and an id"
            )))
        }
    }
}

impl RelationshipEngine for MemoryRelationshipEngine {
    fn policy_exists(&self, policy_id: &str) -> Result<bool, EngineError> {
        Ok(self.policies.contains_key(policy_id))
    }

    fn set_relationship(
        &mut self,
        policy_id: &str,
        relationship: Relationship,
        metadata: RecordMetadata,
    ) -> Result<SetRelationshipResult, EngineError> {
        Self::check_relationship(&relationship)?;
        let registration = self.owned_registration(policy_id, &relationship.object, &metadata.owner_did)?;
        match registration {
            None => {
                return Err(EngineError::ObjectNotRegistered {
                    policy_id: policy_id.to_string(),
                    object: relationship.object,
                });
            }
            Some((_, record)) if record.archived => {
                return Err(EngineError::ObjectArchived(relationship.object));
            }
            Some(_) => {}
        }

        let records = self.policy_mut(policy_id)?;
        if let Some(existing) = records.get(&relationship) {
            return Ok(SetRelationshipResult {
                record_existed: true,
                record: existing.clone(),
            });
        }
        let record = RelationshipRecord {
            policy_id: policy_id.to_string(),
            relationship: relationship.clone(),
            archived: false,
            metadata,
        };
        records.insert(relationship, record.clone());
        Ok(SetRelationshipResult {
            record_existed: false,
            record,
        })
    }

    fn delete_relationship(
        &mut self,
        policy_id: &str,
        relationship: &Relationship,
        actor: &Did,
    ) -> Result<DeleteRelationshipResult, EngineError> {
        Self::check_relationship(relationship)?;
        if self.owned_registration(policy_id, &relationship.object, actor)?.is_none() {
            return Err(EngineError::ObjectNotRegistered {
                policy_id: policy_id.to_string(),
                object: relationship.object.clone(),
            });
        }
        let records = self.policy_mut(policy_id)?;
        Ok(DeleteRelationshipResult {
            record_found: records.remove(relationship).is_some(),
        })
    }

    fn register_object(
        &mut self,
        policy_id: &str,
        object: &Object,
        metadata: RecordMetadata,
    ) -> Result<RegisterObjectResult, EngineError> {
        Self::check_object(object)?;
        let records = self.policy_mut(policy_id)?;
        if let Some((relationship, mut record)) = Self::registration(records, object) {
            if record.owner() != &metadata.owner_did {
                return Err(EngineError::AlreadyRegistered {
                    object: object.clone(),
                    owner: record.owner().clone(),
                });
            }
            if !record.archived {
                return Ok(RegisterObjectResult {
                    result: RegistrationResult::NoOp,
                    record,
                });
            }
            record.archived = false;
            records.insert(relationship, record.clone());
            return Ok(RegisterObjectResult {
                result: RegistrationResult::Unarchived,
                record,
            });
        }

        let relationship = Relationship::owner(object.clone(), metadata.owner_did.clone());
        let record = RelationshipRecord {
            policy_id: policy_id.to_string(),
            relationship: relationship.clone(),
            archived: false,
            metadata,
        };
        records.insert(relationship, record.clone());
        Ok(RegisterObjectResult {
            result: RegistrationResult::Registered,
            record,
        })
    }

    fn unregister_object(
        &mut self,
        policy_id: &str,
        object: &Object,
        actor: &Did,
    ) -> Result<UnregisterObjectResult, EngineError> {
        let Some((registration, _)) = self.owned_registration(policy_id, object, actor)? else {
            return Ok(UnregisterObjectResult {
                found: false,
                relationships_removed: 0,
            });
        };
        let records = self.policy_mut(policy_id)?;
        let relationships_removed = Self::remove_relationships(records, object);
        records.remove(&registration);
        Ok(UnregisterObjectResult {
            found: true,
            relationships_removed,
        })
    }

    fn archive_object(
        &mut self,
        policy_id: &str,
        object: &Object,
        actor: &Did,
    ) -> Result<ArchiveObjectResult, EngineError> {
        let Some((registration, mut record)) = self.owned_registration(policy_id, object, actor)? else {
            return Ok(ArchiveObjectResult {
                found: false,
                relationships_removed: 0,
                record_modified: false,
            });
        };
        if record.archived {
            return Ok(ArchiveObjectResult {
                found: true,
                relationships_removed: 0,
                record_modified: false,
            });
        }
        let records = self.policy_mut(policy_id)?;
        let relationships_removed = Self::remove_relationships(records, object);
        record.archived = true;
        records.insert(registration, record);
        Ok(ArchiveObjectResult {
            found: true,
            relationships_removed,
            record_modified: true,
        })
    }

    fn unarchive_object(
        &mut self,
        policy_id: &str,
        object: &Object,
        actor: &Did,
    ) -> Result<UnarchiveObjectResult, EngineError> {
        let Some((registration, mut record)) = self.owned_registration(policy_id, object, actor)? else {
            return Err(EngineError::ObjectNotRegistered {
                policy_id: policy_id.to_string(),
                object: object.clone(),
            });
        };
        if !record.archived {
            return Ok(UnarchiveObjectResult {
                record,
                record_modified: false,
            });
        }
        record.archived = false;
        self.policy_mut(policy_id)?.insert(registration, record.clone());
        Ok(UnarchiveObjectResult {
            record,
            record_modified: true,
        })
    }

    fn get_object_registration(
        &self,
        policy_id: &str,
        object: &Object,
    ) -> Result<Option<RelationshipRecord>, EngineError> {
        Ok(Self::registration(self.policy(policy_id)?, object).map(|(_, record)| record))
    }

    fn amend_registration(
        &mut self,
        policy_id: &str,
        object: &Object,
        metadata: RecordMetadata,
    ) -> Result<RelationshipRecord, EngineError> {
        let records = self.policy_mut(policy_id)?;
        let Some((registration, previous)) = Self::registration(records, object) else {
            return Err(EngineError::ObjectNotRegistered {
                policy_id: policy_id.to_string(),
                object: object.clone(),
            });
        };
        records.remove(&registration);

        let relationship = Relationship::owner(object.clone(), metadata.owner_did.clone());
        let record = RelationshipRecord {
            policy_id: policy_id.to_string(),
            relationship: relationship.clone(),
            archived: previous.archived,
            metadata,
        };
        records.insert(relationship, record.clone());
        tracing::debug!(
            policy_id,
            %object,
            previous_owner = %previous.owner(),
            new_owner = %record.owner(),
            "amended registration"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acp_common::{Classify, ErrorKind, Timestamp};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    const POLICY: &str = "policy-1";

    fn did(name: &str) -> Did {
        format!("did:example:{name}").parse().unwrap()
    }

    fn metadata(owner: &Did, height: u64) -> RecordMetadata {
        RecordMetadata {
            creation_ts: Timestamp::new(Utc.timestamp_opt(1_700_000_000 + height as i64, 0).unwrap(), height),
            owner_did: owner.clone(),
            tx_signer: "source1signer".into(),
            tx_hash: None,
        }
    }

    fn engine() -> MemoryRelationshipEngine {
        let mut engine = MemoryRelationshipEngine::default();
        engine.create_policy(POLICY);
        engine
    }

    fn reader(object: &Object, subject: &Did) -> Relationship {
        Relationship::new(object.clone(), "reader", Subject::Actor(subject.clone()))
    }

    #[test]
    fn it_registers_once_per_owner() -> TestResult {
        let mut engine = engine();
        let alice = did("alice");
        let file = Object::new("file", "readme");

        let first = engine.register_object(POLICY, &file, metadata(&alice, 1))?;
        assert_eq!(first.result, RegistrationResult::Registered);

        let again = engine.register_object(POLICY, &file, metadata(&alice, 2))?;
        assert_eq!(again.result, RegistrationResult::NoOp);
        assert_eq!(again.record.metadata.creation_ts.height, 1);

        let error = engine
            .register_object(POLICY, &file, metadata(&did("bob"), 3))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::OperationForbidden);

        let record = engine.get_object_registration(POLICY, &file)?.ok_or("missing")?;
        assert_eq!(record.owner(), &alice);
        Ok(())
    }

    #[test]
    fn unknown_policy_is_not_found() {
        let mut engine = engine();
        let error = engine
            .register_object("nope", &Object::new("file", "a"), metadata(&did("alice"), 1))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn only_the_owner_may_add_relationships() -> TestResult {
        let mut engine = engine();
        let (alice, bob) = (did("alice"), did("bob"));
        let file = Object::new("file", "readme");
        engine.register_object(POLICY, &file, metadata(&alice, 1))?;

        let created = engine.set_relationship(POLICY, reader(&file, &bob), metadata(&alice, 2))?;
        assert!(!created.record_existed);
        let repeated = engine.set_relationship(POLICY, reader(&file, &bob), metadata(&alice, 3))?;
        assert!(repeated.record_existed);
        assert_eq!(repeated.record.metadata.creation_ts.height, 2);

        let error = engine
            .set_relationship(POLICY, reader(&file, &alice), metadata(&bob, 4))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Unauthorized);

        let error = engine
            .set_relationship(
                POLICY,
                Relationship::owner(file.clone(), bob.clone()),
                metadata(&alice, 5),
            )
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::BadInput);
        Ok(())
    }

    #[test]
    fn archive_drops_relationships_and_blocks_new_ones() -> TestResult {
        let mut engine = engine();
        let (alice, bob) = (did("alice"), did("bob"));
        let file = Object::new("file", "readme");
        engine.register_object(POLICY, &file, metadata(&alice, 1))?;
        engine.set_relationship(POLICY, reader(&file, &bob), metadata(&alice, 2))?;

        let archived = engine.archive_object(POLICY, &file, &alice)?;
        assert_eq!(
            archived,
            ArchiveObjectResult {
                found: true,
                relationships_removed: 1,
                record_modified: true,
            }
        );
        let error = engine
            .set_relationship(POLICY, reader(&file, &bob), metadata(&alice, 3))
            .unwrap_err();
        assert!(matches!(error, EngineError::ObjectArchived(_)));

        let again = engine.register_object(POLICY, &file, metadata(&alice, 4))?;
        assert_eq!(again.result, RegistrationResult::Unarchived);
        Ok(())
    }

    #[test]
    fn unarchive_is_idempotent() -> TestResult {
        let mut engine = engine();
        let alice = did("alice");
        let file = Object::new("file", "readme");
        engine.register_object(POLICY, &file, metadata(&alice, 1))?;
        engine.archive_object(POLICY, &file, &alice)?;

        assert!(engine.unarchive_object(POLICY, &file, &alice)?.record_modified);
        assert!(!engine.unarchive_object(POLICY, &file, &alice)?.record_modified);
        Ok(())
    }

    #[test]
    fn unregister_removes_everything() -> TestResult {
        let mut engine = engine();
        let (alice, bob) = (did("alice"), did("bob"));
        let file = Object::new("file", "readme");
        engine.register_object(POLICY, &file, metadata(&alice, 1))?;
        engine.set_relationship(POLICY, reader(&file, &bob), metadata(&alice, 2))?;

        assert!(engine.unregister_object(POLICY, &file, &bob).is_err());
        let removed = engine.unregister_object(POLICY, &file, &alice)?;
        assert_eq!(removed.relationships_removed, 1);
        assert_eq!(engine.records(POLICY).count(), 0);
        assert!(!engine.unregister_object(POLICY, &file, &alice)?.found);
        Ok(())
    }

    #[test]
    fn amend_rewrites_owner_and_time() -> TestResult {
        let mut engine = engine();
        let (alice, bob, carol) = (did("alice"), did("bob"), did("carol"));
        let file = Object::new("file", "readme");
        engine.register_object(POLICY, &file, metadata(&bob, 15))?;
        engine.set_relationship(POLICY, reader(&file, &carol), metadata(&bob, 16))?;

        let amended = engine.amend_registration(POLICY, &file, metadata(&alice, 10))?;
        assert_eq!(amended.owner(), &alice);
        assert_eq!(amended.metadata.creation_ts.height, 10);
        assert_eq!(
            engine.get_object_registration(POLICY, &file)?,
            Some(amended)
        );
        assert_eq!(engine.records(POLICY).count(), 2);
        assert!(
            engine
                .records(POLICY)
                .any(|record| record.relationship == reader(&file, &carol))
        );
        Ok(())
    }
}
