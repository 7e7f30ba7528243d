use crate::{
    cmd::{
        ArchiveObjectResult, DeleteRelationshipResult, RegisterObjectResult,
        SetRelationshipResult, UnarchiveObjectResult, UnregisterObjectResult,
    },
    relationship::{Object, RecordMetadata, Relationship, RelationshipRecord},
};
use acp_common::{Classify, ErrorKind};
use acp_did::Did;
use thiserror::Error;

/// Errors reported by a [`RelationshipEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The policy does not exist.
    #[error("policy {0} not found")]
    PolicyNotFound(String),

    /// The object has no registration in the policy.
    #[error("object {object} is not registered in policy {policy_id}")]
    ObjectNotRegistered {
        /// Policy searched.
        policy_id: String,
        /// Missing object.
        object: Object,
    },

    /// The object is owned by someone other than the actor.
    #[error("actor {actor} is not the owner of {object}")]
    NotOwner {
        /// The object acted on.
        object: Object,
        /// The acting DID.
        actor: Did,
    },

    /// The object is already registered to a different actor.
    #[error("object {object} is already registered to {owner}")]
    AlreadyRegistered {
        /// The contested object.
        object: Object,
        /// Current owner.
        owner: Did,
    },

    /// Relationships cannot be added to an archived object.
    #[error("object {0} is archived")]
    ObjectArchived(Object),

    /// The relationship or object is malformed.
    #[error("invalid relationship: {0}")]
    InvalidRelationship(String),

    /// The engine's own storage failed.
    #[error("relationship engine failure: {0}")]
    Backend(String),
}

impl Classify for EngineError {
    fn kind(&self) -> ErrorKind {
        match self {
            EngineError::PolicyNotFound(_) | EngineError::ObjectNotRegistered { .. } => {
                ErrorKind::NotFound
            }
            EngineError::NotOwner { .. } => ErrorKind::Unauthorized,
            EngineError::AlreadyRegistered { .. } | EngineError::ObjectArchived(_) => {
                ErrorKind::OperationForbidden
            }
            EngineError::InvalidRelationship(_) => ErrorKind::BadInput,
            EngineError::Backend(_) => ErrorKind::Internal,
        }
    }
}

/// The relationship store the command layer writes through.
///
/// Implementations own relationship storage and permission evaluation; the
/// command layer only stamps [`RecordMetadata`] and routes commands. For
/// mutating calls the acting DID is `metadata.owner_did` or the explicit
/// `actor` argument.
pub trait RelationshipEngine {
    /// Whether `policy_id` names an existing policy.
    fn policy_exists(&self, policy_id: &str) -> Result<bool, EngineError>;

    /// Create a relationship on behalf of `metadata.owner_did`.
    fn set_relationship(
        &mut self,
        policy_id: &str,
        relationship: Relationship,
        metadata: RecordMetadata,
    ) -> Result<SetRelationshipResult, EngineError>;

    /// Remove a relationship on behalf of `actor`.
    fn delete_relationship(
        &mut self,
        policy_id: &str,
        relationship: &Relationship,
        actor: &Did,
    ) -> Result<DeleteRelationshipResult, EngineError>;

    /// Register `object` to `metadata.owner_did`.
    fn register_object(
        &mut self,
        policy_id: &str,
        object: &Object,
        metadata: RecordMetadata,
    ) -> Result<RegisterObjectResult, EngineError>;

    /// Remove `object` and every relationship on it.
    fn unregister_object(
        &mut self,
        policy_id: &str,
        object: &Object,
        actor: &Did,
    ) -> Result<UnregisterObjectResult, EngineError>;

    /// Keep `object` registered but archived, dropping its relationships.
    fn archive_object(
        &mut self,
        policy_id: &str,
        object: &Object,
        actor: &Did,
    ) -> Result<ArchiveObjectResult, EngineError>;

    /// Reactivate an archived `object`.
    fn unarchive_object(
        &mut self,
        policy_id: &str,
        object: &Object,
        actor: &Did,
    ) -> Result<UnarchiveObjectResult, EngineError>;

    /// The registration record of `object`, if it is registered.
    fn get_object_registration(
        &self,
        policy_id: &str,
        object: &Object,
    ) -> Result<Option<RelationshipRecord>, EngineError>;

    /// Rewrite the owner and creation time of an existing registration.
    ///
    /// Used only by the reveal path. `metadata.owner_did` becomes the new
    /// owner and `metadata.creation_ts` the new creation time. The archived
    /// flag is preserved. Non-owner relationships on the object survive the
    /// amendment, including grants the previous owner made.
    fn amend_registration(
        &mut self,
        policy_id: &str,
        object: &Object,
        metadata: RecordMetadata,
    ) -> Result<RelationshipRecord, EngineError>;
}

impl<E: RelationshipEngine + ?Sized> RelationshipEngine for &mut E {
    fn policy_exists(&self, policy_id: &str) -> Result<bool, EngineError> {
        (**self).policy_exists(policy_id)
    }

    fn set_relationship(
        &mut self,
        policy_id: &str,
        relationship: Relationship,
        metadata: RecordMetadata,
    ) -> Result<SetRelationshipResult, EngineError> {
        (**self).set_relationship(policy_id, relationship, metadata)
    }

    fn delete_relationship(
        &mut self,
        policy_id: &str,
        relationship: &Relationship,
        actor: &Did,
    ) -> Result<DeleteRelationshipResult, EngineError> {
        (**self).delete_relationship(policy_id, relationship, actor)
    }

    fn register_object(
        &mut self,
        policy_id: &str,
        object: &Object,
        metadata: RecordMetadata,
    ) -> Result<RegisterObjectResult, EngineError> {
        (**self).register_object(policy_id, object, metadata)
    }

    fn unregister_object(
        &mut self,
        policy_id: &str,
        object: &Object,
        actor: &Did,
    ) -> Result<UnregisterObjectResult, EngineError> {
        (**self).unregister_object(policy_id, object, actor)
    }

    fn archive_object(
        &mut self,
        policy_id: &str,
        object: &Object,
        actor: &Did,
    ) -> Result<ArchiveObjectResult, EngineError> {
        (**self).archive_object(policy_id, object, actor)
    }

    fn unarchive_object(
        &mut self,
        policy_id: &str,
        object: &Object,
        actor: &Did,
    ) -> Result<UnarchiveObjectResult, EngineError> {
        (**self).unarchive_object(policy_id, object, actor)
    }

    fn get_object_registration(
        &self,
        policy_id: &str,
        object: &Object,
    ) -> Result<Option<RelationshipRecord>, EngineError> {
        (**self).get_object_registration(policy_id, object)
    }

    fn amend_registration(
        &mut self,
        policy_id: &str,
        object: &Object,
        metadata: RecordMetadata,
    ) -> Result<RelationshipRecord, EngineError> {
        (**self).amend_registration(policy_id, object, metadata)
    }
}
