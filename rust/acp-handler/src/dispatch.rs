use crate::{error::HandlerError, reveal::reveal_registration};
use acp_auth::Address;
use acp_common::{Store, Timestamp};
use acp_did::Did;
use acp_policy::{
    CommitRegistrationsResult, FlagHijackAttemptResult, Params, PolicyCmd, PolicyCmdResult,
    RecordMetadata, RelationshipEngine,
};
use acp_registration::CommitmentService;

/// What the ledger knows about the transaction carrying a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxContext {
    /// Verified transaction signer.
    pub signer: Address,
    /// Block the transaction executes in.
    pub now: Timestamp,
    /// Transaction hash, when the host exposes one.
    pub tx_hash: Option<String>,
}

impl TxContext {
    /// Metadata for a record created by `actor` in this transaction.
    pub fn metadata(&self, actor: &Did) -> RecordMetadata {
        RecordMetadata {
            creation_ts: self.now,
            owner_did: actor.clone(),
            tx_signer: self.signer.to_string(),
            tx_hash: self.tx_hash.clone(),
        }
    }
}

/// Execute an authenticated command.
///
/// Commands that only touch the relationship engine are forwarded with
/// metadata naming `actor` as owner and the transaction signer as
/// `tx_signer`. Every command performs at most one engine mutation, and
/// performs it last, so a store scoped in a [`acp_common::StoreOverlay`]
/// is only committed when the whole command succeeded.
#[tracing::instrument(
    skip_all,
    fields(cmd = cmd.name(), policy_id = policy_id, actor = %actor, height = tx.now.height)
)]
pub fn dispatch<S: Store, E: RelationshipEngine>(
    service: &mut CommitmentService<S, E>,
    params: &Params,
    actor: &Did,
    policy_id: &str,
    cmd: PolicyCmd,
    tx: &TxContext,
) -> Result<PolicyCmdResult, HandlerError> {
    let result = match cmd {
        PolicyCmd::SetRelationship(cmd) => PolicyCmdResult::SetRelationship(
            service
                .engine_mut()
                .set_relationship(policy_id, cmd.relationship, tx.metadata(actor))?,
        ),
        PolicyCmd::DeleteRelationship(cmd) => PolicyCmdResult::DeleteRelationship(
            service
                .engine_mut()
                .delete_relationship(policy_id, &cmd.relationship, actor)?,
        ),
        PolicyCmd::RegisterObject(cmd) => PolicyCmdResult::RegisterObject(
            service
                .engine_mut()
                .register_object(policy_id, &cmd.object, tx.metadata(actor))?,
        ),
        PolicyCmd::UnregisterObject(cmd) => PolicyCmdResult::UnregisterObject(
            service
                .engine_mut()
                .unregister_object(policy_id, &cmd.object, actor)?,
        ),
        PolicyCmd::ArchiveObject(cmd) => PolicyCmdResult::ArchiveObject(
            service
                .engine_mut()
                .archive_object(policy_id, &cmd.object, actor)?,
        ),
        PolicyCmd::UnarchiveObject(cmd) => PolicyCmdResult::UnarchiveObject(
            service
                .engine_mut()
                .unarchive_object(policy_id, &cmd.object, actor)?,
        ),
        PolicyCmd::CommitRegistrations(cmd) => {
            let registrations_commitment = service.set_new_commitment(
                policy_id,
                &cmd.commitment,
                params,
                tx.metadata(actor),
            )?;
            PolicyCmdResult::CommitRegistrations(CommitRegistrationsResult {
                registrations_commitment,
            })
        }
        PolicyCmd::RevealRegistration(cmd) => PolicyCmdResult::RevealRegistration(
            reveal_registration(service, actor, policy_id, &cmd, tx)?,
        ),
        PolicyCmd::FlagHijackAttempt(cmd) => {
            let event = service.flag_hijack_attempt(policy_id, cmd.event_id, actor)?;
            PolicyCmdResult::FlagHijackAttempt(FlagHijackAttemptResult { event })
        }
    };
    tracing::debug!("policy command applied");
    Ok(result)
}
