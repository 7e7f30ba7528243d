//! Persistence of commitments and amendment events in the host [Store].
//!
//! Layout (all ids big-endian `u64`, so key order is id order):
//!
//! | key | value |
//! |---|---|
//! | `reg/commitment/seq` | last commitment id |
//! | `reg/commitment/id/<id>` | [RegistrationsCommitment] as JSON |
//! | `reg/commitment/expired/<0\|1>/<id>` | empty, index by expiry flag |
//! | `reg/commitment/root/<root>/<id>` | empty, index by root bytes |
//! | `reg/event/seq` | last event id |
//! | `reg/event/id/<id>` | [AmendmentEvent] as JSON |
//! | `reg/event/hijack/<len><policy>/<id>` | empty, flagged events per policy |

use acp_common::{Duration, Sequence, Sha256Hash, Store, StoreError, store::decode_json};
use acp_did::Did;
use acp_policy::{AmendmentEvent, Object, RecordMetadata, RegistrationsCommitment};

const COMMITMENT_SEQUENCE: Sequence = Sequence::new(b"reg/commitment/seq");
const COMMITMENT_RECORD: &[u8] = b"reg/commitment/id/";
const COMMITMENT_BY_EXPIRED: &[u8] = b"reg/commitment/expired/";
const COMMITMENT_BY_ROOT: &[u8] = b"reg/commitment/root/";

const EVENT_SEQUENCE: Sequence = Sequence::new(b"reg/event/seq");
const EVENT_RECORD: &[u8] = b"reg/event/id/";
const EVENT_BY_HIJACK: &[u8] = b"reg/event/hijack/";

fn key(prefix: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    let mut key = prefix.to_vec();
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

fn expired_prefix(expired: bool) -> Vec<u8> {
    key(COMMITMENT_BY_EXPIRED, &[&[u8::from(expired)], b"/"])
}

fn hijack_prefix(policy_id: &str) -> Vec<u8> {
    let len = (policy_id.len() as u32).to_be_bytes();
    key(EVENT_BY_HIJACK, &[&len, policy_id.as_bytes(), b"/"])
}

/// The id stored in the last eight bytes of an index key.
fn trailing_id(index_key: &[u8]) -> Result<u64, StoreError> {
    index_key
        .len()
        .checked_sub(8)
        .and_then(|start| <[u8; 8]>::try_from(&index_key[start..]).ok())
        .map(u64::from_be_bytes)
        .ok_or_else(|| StoreError::DecodeFailed {
            key: String::from_utf8_lossy(index_key).into_owned(),
            reason: "index key does not end with an id".into(),
        })
}

/// Typed access to registration state in a [Store].
///
/// Hand it `&mut StoreOverlay<_>` to batch the writes of one command.
#[derive(Debug)]
pub struct RegistrationRepository<S> {
    store: S,
}

impl<S: Store> RegistrationRepository<S> {
    /// Wrap a store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Release the store.
    pub fn into_inner(self) -> S {
        self.store
    }

    /// The wrapped store, mutably.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Persist a new, unexpired commitment under the next id.
    pub fn create_commitment(
        &mut self,
        policy_id: &str,
        commitment: Sha256Hash,
        validity: Duration,
        metadata: RecordMetadata,
    ) -> Result<RegistrationsCommitment, StoreError> {
        let id = COMMITMENT_SEQUENCE.next(&mut self.store)?;
        let record = RegistrationsCommitment {
            id,
            policy_id: policy_id.to_string(),
            commitment,
            expired: false,
            validity,
            metadata,
        };
        let id_bytes = id.to_be_bytes();
        self.store
            .set_json(key(COMMITMENT_RECORD, &[&id_bytes]), &record)?;
        self.store
            .set(key(&expired_prefix(false), &[&id_bytes]), Vec::new())?;
        self.store.set(
            key(COMMITMENT_BY_ROOT, &[commitment.as_ref(), b"/", &id_bytes]),
            Vec::new(),
        )?;
        Ok(record)
    }

    /// Load a commitment.
    pub fn commitment(&self, id: u64) -> Result<Option<RegistrationsCommitment>, StoreError> {
        self.store
            .get_json(&key(COMMITMENT_RECORD, &[&id.to_be_bytes()]))
    }

    fn commitments_in(&self, index_prefix: &[u8]) -> Result<Vec<RegistrationsCommitment>, StoreError> {
        let mut found = Vec::new();
        for (index_key, _) in self.store.scan(index_prefix)? {
            let id = trailing_id(&index_key)?;
            let record_key = key(COMMITMENT_RECORD, &[&id.to_be_bytes()]);
            match self.store.get(&record_key)? {
                Some(bytes) => found.push(decode_json(&record_key, &bytes)?),
                None => {
                    return Err(StoreError::DecodeFailed {
                        key: String::from_utf8_lossy(&index_key).into_owned(),
                        reason: format!("index points at missing commitment {id}"),
                    });
                }
            }
        }
        Ok(found)
    }

    /// Commitments not yet flagged as expired, in id order.
    pub fn active_commitments(&self) -> Result<Vec<RegistrationsCommitment>, StoreError> {
        self.commitments_in(&expired_prefix(false))
    }

    /// Commitments with the given root, in id order.
    pub fn commitments_by_root(&self, root: &Sha256Hash) -> Result<Vec<RegistrationsCommitment>, StoreError> {
        self.commitments_in(&key(COMMITMENT_BY_ROOT, &[root.as_ref(), b"/"]))
    }

    /// Flag a commitment as expired and move it across the expiry index.
    pub fn mark_expired(&mut self, commitment: &mut RegistrationsCommitment) -> Result<(), StoreError> {
        let id_bytes = commitment.id.to_be_bytes();
        commitment.expired = true;
        self.store
            .set_json(key(COMMITMENT_RECORD, &[&id_bytes]), commitment)?;
        self.store.delete(&key(&expired_prefix(false), &[&id_bytes]))?;
        self.store
            .set(key(&expired_prefix(true), &[&id_bytes]), Vec::new())?;
        Ok(())
    }

    /// Persist a new amendment event under the next id.
    pub fn create_event(
        &mut self,
        policy_id: &str,
        object: Object,
        new_owner: Did,
        previous_owner: Option<Did>,
        commitment_id: u64,
        metadata: RecordMetadata,
    ) -> Result<AmendmentEvent, StoreError> {
        let id = EVENT_SEQUENCE.next(&mut self.store)?;
        let event = AmendmentEvent {
            id,
            policy_id: policy_id.to_string(),
            object,
            new_owner,
            previous_owner,
            commitment_id,
            hijack_flag: false,
            metadata,
        };
        self.store
            .set_json(key(EVENT_RECORD, &[&id.to_be_bytes()]), &event)?;
        Ok(event)
    }

    /// Load an amendment event.
    pub fn event(&self, id: u64) -> Result<Option<AmendmentEvent>, StoreError> {
        self.store.get_json(&key(EVENT_RECORD, &[&id.to_be_bytes()]))
    }

    /// Set the hijack flag of an event and index it under its policy.
    pub fn flag_event(&mut self, event: &mut AmendmentEvent) -> Result<(), StoreError> {
        let id_bytes = event.id.to_be_bytes();
        event.hijack_flag = true;
        self.store
            .set_json(key(EVENT_RECORD, &[&id_bytes]), event)?;
        self.store
            .set(key(&hijack_prefix(&event.policy_id), &[&id_bytes]), Vec::new())?;
        Ok(())
    }

    /// Events of `policy_id` flagged as hijack attempts, in id order.
    pub fn hijack_events(&self, policy_id: &str) -> Result<Vec<AmendmentEvent>, StoreError> {
        let mut events = Vec::new();
        for (index_key, _) in self.store.scan(&hijack_prefix(policy_id))? {
            let id = trailing_id(&index_key)?;
            if let Some(event) = self.event(id)? {
                events.push(event);
            }
        }
        Ok(events)
    }
}
