use crate::relationship::{Object, RecordMetadata, Relationship, RelationshipRecord};
use acp_common::{Bytes, Classify, Duration, ErrorKind, Sha256Hash, Timestamp};
use acp_did::Did;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A command an authenticated actor issues against a policy.
///
/// Serialized externally tagged with snake_case tags, e.g.
/// `{"register_object": {"object": {...}}}`. The set of variants is closed:
/// decoding through [`PolicyCmd::from_json`] rejects any other tag with
/// [`CmdDecodeError::UnknownVariant`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCmd {
    /// Create a relationship.
    SetRelationship(SetRelationshipCmd),
    /// Remove a relationship.
    DeleteRelationship(DeleteRelationshipCmd),
    /// Claim an object.
    RegisterObject(RegisterObjectCmd),
    /// Release an object and drop its relationships.
    UnregisterObject(UnregisterObjectCmd),
    /// Keep an object claimed but drop its relationships.
    ArchiveObject(ArchiveObjectCmd),
    /// Reactivate an archived object.
    UnarchiveObject(UnarchiveObjectCmd),
    /// Publish a commitment to future registrations.
    CommitRegistrations(CommitRegistrationsCmd),
    /// Open a commitment for one object.
    RevealRegistration(RevealRegistrationCmd),
    /// Dispute an amendment.
    FlagHijackAttempt(FlagHijackAttemptCmd),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetRelationshipCmd {
    pub relationship: Relationship,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteRelationshipCmd {
    pub relationship: Relationship,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterObjectCmd {
    pub object: Object,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnregisterObjectCmd {
    pub object: Object,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveObjectCmd {
    pub object: Object,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnarchiveObjectCmd {
    pub object: Object,
}

/// Carries the raw commitment root. Its length is checked by the commitment
/// service, not by the decoder, so that a wrong length surfaces as a
/// classified error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommitRegistrationsCmd {
    /// Merkle root over the committed registrations.
    pub commitment: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RevealRegistrationCmd {
    pub registrations_commitment_id: u64,
    pub proof: RegistrationProof,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagHijackAttemptCmd {
    pub event_id: u64,
}

/// An opening of one leaf of a registrations commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationProof {
    /// Sibling hashes from the leaf up to the root.
    pub merkle_proof: Vec<Sha256Hash>,
    /// The committed object.
    pub object: Object,
    /// Number of leaves in the committed tree.
    pub leaf_count: u64,
    /// Position of `object` among the leaves.
    pub leaf_index: u64,
}

/// Failure to decode a [`PolicyCmd`] from its JSON form.
#[derive(Debug, Error)]
pub enum CmdDecodeError {
    /// The tag does not name any command.
    #[error("unknown policy command variant: {0}")]
    UnknownVariant(String),

    /// The value is not an object with exactly one tag.
    #[error("policy command must carry exactly one variant, found {0}")]
    NotTagged(usize),

    /// The tag is known but its body is malformed.
    #[error("malformed {variant} command: {source}")]
    Malformed {
        /// Command tag.
        variant: String,
        /// Decoder error.
        source: serde_json::Error,
    },

    /// The input is not JSON.
    #[error("invalid policy command encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl Classify for CmdDecodeError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::BadInput
    }
}

impl PolicyCmd {
    /// Every command tag, in declaration order.
    pub const VARIANTS: [&'static str; 9] = [
        "set_relationship",
        "delete_relationship",
        "register_object",
        "unregister_object",
        "archive_object",
        "unarchive_object",
        "commit_registrations",
        "reveal_registration",
        "flag_hijack_attempt",
    ];

    /// The command's tag.
    pub fn name(&self) -> &'static str {
        match self {
            PolicyCmd::SetRelationship(_) => "set_relationship",
            PolicyCmd::DeleteRelationship(_) => "delete_relationship",
            PolicyCmd::RegisterObject(_) => "register_object",
            PolicyCmd::UnregisterObject(_) => "unregister_object",
            PolicyCmd::ArchiveObject(_) => "archive_object",
            PolicyCmd::UnarchiveObject(_) => "unarchive_object",
            PolicyCmd::CommitRegistrations(_) => "commit_registrations",
            PolicyCmd::RevealRegistration(_) => "reveal_registration",
            PolicyCmd::FlagHijackAttempt(_) => "flag_hijack_attempt",
        }
    }

    /// Decode a command, telling an unknown tag apart from a malformed body.
    pub fn from_json(value: Value) -> Result<Self, CmdDecodeError> {
        let tag = match &value {
            Value::Object(map) if map.len() == 1 => map.keys().next().cloned().unwrap_or_default(),
            Value::Object(map) => return Err(CmdDecodeError::NotTagged(map.len())),
            _ => return Err(CmdDecodeError::NotTagged(0)),
        };
        if !Self::VARIANTS.contains(&tag.as_str()) {
            return Err(CmdDecodeError::UnknownVariant(tag));
        }
        serde_json::from_value(value).map_err(|source| CmdDecodeError::Malformed {
            variant: tag,
            source,
        })
    }

    /// Decode a command from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CmdDecodeError> {
        Self::from_json(serde_json::from_slice(bytes)?)
    }
}

/// How a registration request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationResult {
    /// The actor already owned the active object.
    NoOp,
    /// A new registration was created.
    Registered,
    /// The actor's archived registration was reactivated.
    Unarchived,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRelationshipResult {
    pub record_existed: bool,
    pub record: RelationshipRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRelationshipResult {
    pub record_found: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterObjectResult {
    pub result: RegistrationResult,
    pub record: RelationshipRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregisterObjectResult {
    pub found: bool,
    pub relationships_removed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveObjectResult {
    pub found: bool,
    pub relationships_removed: u64,
    pub record_modified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnarchiveObjectResult {
    pub record: RelationshipRecord,
    pub record_modified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRegistrationsResult {
    pub registrations_commitment: RegistrationsCommitment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealRegistrationResult {
    pub record: RelationshipRecord,
    pub event: AmendmentEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagHijackAttemptResult {
    pub event: AmendmentEvent,
}

/// The typed outcome of a dispatched [`PolicyCmd`], one variant per command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCmdResult {
    SetRelationship(SetRelationshipResult),
    DeleteRelationship(DeleteRelationshipResult),
    RegisterObject(RegisterObjectResult),
    UnregisterObject(UnregisterObjectResult),
    ArchiveObject(ArchiveObjectResult),
    UnarchiveObject(UnarchiveObjectResult),
    CommitRegistrations(CommitRegistrationsResult),
    RevealRegistration(RevealRegistrationResult),
    FlagHijackAttempt(FlagHijackAttemptResult),
}

/// A persisted commitment to a set of future registrations.
///
/// Immutable once written except for `expired`, which the end-of-block sweep
/// sets. Commitments are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationsCommitment {
    /// Auto-increment id, starting at 1.
    pub id: u64,
    /// Policy the registrations belong to.
    pub policy_id: String,
    /// Merkle root.
    pub commitment: Sha256Hash,
    /// Set once the validity window has passed.
    pub expired: bool,
    /// Validity window, copied from the params at creation.
    pub validity: Duration,
    /// Creation time and owner.
    pub metadata: RecordMetadata,
}

impl RegistrationsCommitment {
    /// Whether the validity window has passed at `now`, regardless of the
    /// stored flag.
    pub fn is_expired_at(&self, now: &Timestamp) -> bool {
        self.metadata.creation_ts.expired_at(&self.validity, now)
    }

    /// The actor that created the commitment.
    pub fn owner(&self) -> &Did {
        &self.metadata.owner_did
    }
}

/// Audit record of a successful reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmendmentEvent {
    /// Auto-increment id, starting at 1.
    pub id: u64,
    /// Policy of the revealed object.
    pub policy_id: String,
    /// The revealed object.
    pub object: Object,
    /// Owner after the reveal.
    pub new_owner: Did,
    /// Owner before the reveal; absent when the reveal registered the object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_owner: Option<Did>,
    /// The opened commitment.
    pub commitment_id: u64,
    /// Set when the previous owner disputes the amendment.
    pub hijack_flag: bool,
    /// When and by whom the reveal was executed.
    pub metadata: RecordMetadata,
}
