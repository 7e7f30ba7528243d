use crate::{dispatch::TxContext, error::HandlerError};
use acp_common::Store;
use acp_did::Did;
use acp_policy::{RecordMetadata, RelationshipEngine, RevealRegistrationCmd, RevealRegistrationResult};
use acp_registration::CommitmentService;

/// Claim an object through an opening of an earlier commitment.
///
/// An unregistered object is registered to `actor` as of the commitment's
/// creation time. A registered object changes hands only when the
/// commitment is strictly older (by height) than the registration and
/// `actor` published it. Either way an amendment event is written first and
/// the engine is touched last.
pub(crate) fn reveal_registration<S: Store, E: RelationshipEngine>(
    service: &mut CommitmentService<S, E>,
    actor: &Did,
    policy_id: &str,
    cmd: &RevealRegistrationCmd,
    tx: &TxContext,
) -> Result<RevealRegistrationResult, HandlerError> {
    let (commitment, opened) =
        service.validate_opening(cmd.registrations_commitment_id, &cmd.proof, actor, &tx.now)?;
    if commitment.policy_id != policy_id {
        return Err(HandlerError::CommitmentPolicyMismatch {
            id: commitment.id,
            expected: policy_id.to_string(),
            actual: commitment.policy_id,
        });
    }
    let object = &cmd.proof.object;
    if !opened {
        return Err(HandlerError::InvalidProof {
            commitment_id: commitment.id,
            object: object.clone(),
            actor: actor.clone(),
        });
    }

    let claim = RecordMetadata {
        creation_ts: commitment.metadata.creation_ts,
        ..tx.metadata(actor)
    };
    match service.engine().get_object_registration(policy_id, object)? {
        None => {
            let event = service.record_amendment(&commitment, object, None, tx.metadata(actor))?;
            let record = service
                .engine_mut()
                .register_object(policy_id, object, claim)?
                .record;
            Ok(RevealRegistrationResult { record, event })
        }
        Some(existing) => {
            if commitment.owner() != actor {
                return Err(HandlerError::NotCommitmentOwner {
                    commitment_id: commitment.id,
                    actor: actor.clone(),
                });
            }
            let committed_height = commitment.metadata.creation_ts.height;
            let registered_height = existing.metadata.creation_ts.height;
            if committed_height >= registered_height {
                return Err(HandlerError::PriorClaim {
                    object: object.clone(),
                    owner: existing.owner().clone(),
                    commitment_id: commitment.id,
                    committed_height,
                    registered_height,
                });
            }
            let previous = existing.owner().clone();
            tracing::info!(
                commitment_id = commitment.id,
                %object,
                previous_owner = %previous,
                committed_height,
                registered_height,
                "reveal takes over a later registration"
            );
            let event = service.record_amendment(&commitment, object, Some(previous), tx.metadata(actor))?;
            let record = service
                .engine_mut()
                .amend_registration(policy_id, object, claim)?;
            Ok(RevealRegistrationResult { record, event })
        }
    }
}
