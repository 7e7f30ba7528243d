use acp_common::Timestamp;
use acp_did::Did;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The relation name under which the engine records an object's owner.
pub const OWNER_RELATION: &str = "owner";

/// A policy object: a resource kind plus an identifier within it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Object {
    /// Resource name declared by the policy (e.g. `file`).
    pub resource: String,
    /// Object identifier within the resource.
    pub id: String,
}

impl Object {
    /// Shorthand constructor.
    pub fn new(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Both fields are non-empty.
    pub fn is_well_formed(&self) -> bool {
        !self.resource.is_empty() && !self.id.is_empty()
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.id)
    }
}

/// The subject side of a relationship.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    /// A single actor.
    Actor(Did),
    /// Another object.
    Object(Object),
    /// Every actor holding `relation` on `object`.
    ActorSet {
        /// The object whose relation is referenced.
        object: Object,
        /// The referenced relation.
        relation: String,
    },
    /// Every actor.
    AllActors,
}

/// One relationship fact: `object#relation@subject`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Relationship {
    /// The object the relation is held on.
    pub object: Object,
    /// Relation name.
    pub relation: String,
    /// Who holds the relation.
    pub subject: Subject,
}

impl Relationship {
    /// Shorthand constructor.
    pub fn new(object: Object, relation: impl Into<String>, subject: Subject) -> Self {
        Self {
            object,
            relation: relation.into(),
            subject,
        }
    }

    /// The ownership fact for `object`.
    pub fn owner(object: Object, owner: Did) -> Self {
        Self::new(object, OWNER_RELATION, Subject::Actor(owner))
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@", self.object, self.relation)?;
        match &self.subject {
            Subject::Actor(did) => write!(f, "{did}"),
            Subject::Object(object) => write!(f, "{object}"),
            Subject::ActorSet { object, relation } => write!(f, "{object}#{relation}"),
            Subject::AllActors => f.write_str("*"),
        }
    }
}

/// Provenance of a record: when and by whom it was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Creation time (block wall time and height).
    pub creation_ts: Timestamp,
    /// The actor that owns the record.
    pub owner_did: Did,
    /// Address of the transaction signer that carried the command.
    pub tx_signer: String,
    /// Hash of the carrying transaction, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

/// A relationship as stored by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    /// Owning policy.
    pub policy_id: String,
    /// The fact.
    pub relationship: Relationship,
    /// Archived records keep the object claimed but inert.
    pub archived: bool,
    /// Provenance.
    pub metadata: RecordMetadata,
}

impl RelationshipRecord {
    /// The record's owner for registration records.
    pub fn owner(&self) -> &Did {
        &self.metadata.owner_did
    }
}
