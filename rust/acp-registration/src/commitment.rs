use crate::{error::CommitmentError, merkle};
use acp_common::{SHA256_HASH_SIZE, Sha256Hash};
use acp_did::Did;
use acp_policy::{Object, RegistrationProof};

/// Bytes of the leaf committing `actor` to registering `object` in
/// `policy_id`: the plain concatenation `policy_id || resource || id || actor`.
///
/// The encoding has no separators, so distinct tuples whose fields shift
/// characters across a boundary produce the same leaf. It is kept as is for
/// compatibility with existing commitments.
pub fn leaf_data(policy_id: &str, actor: &Did, object: &Object) -> Vec<u8> {
    [
        policy_id.as_bytes(),
        object.resource.as_bytes(),
        object.id.as_bytes(),
        actor.as_str().as_bytes(),
    ]
    .concat()
}

fn leaves(policy_id: &str, actor: &Did, objects: &[Object]) -> Result<Vec<Sha256Hash>, CommitmentError> {
    if objects.is_empty() {
        return Err(CommitmentError::NoObjects);
    }
    objects
        .iter()
        .map(|object| {
            check_object(object)?;
            Ok(merkle::leaf_hash(&leaf_data(policy_id, actor, object)))
        })
        .collect()
}

fn check_object(object: &Object) -> Result<(), CommitmentError> {
    if object.is_well_formed() {
        Ok(())
    } else {
        Err(CommitmentError::MalformedObject(object.clone()))
    }
}

/// Merkle root committing `actor` to registering `objects` in `policy_id`.
pub fn generate_commitment(
    policy_id: &str,
    actor: &Did,
    objects: &[Object],
) -> Result<Sha256Hash, CommitmentError> {
    merkle::root(&leaves(policy_id, actor, objects)?).ok_or(CommitmentError::NoObjects)
}

/// Opening of the object at `index` among the same `objects` used for
/// [`generate_commitment`].
pub fn proof_for_object(
    policy_id: &str,
    actor: &Did,
    index: usize,
    objects: &[Object],
) -> Result<RegistrationProof, CommitmentError> {
    let leaves = leaves(policy_id, actor, objects)?;
    let out_of_range = || CommitmentError::IndexOutOfRange {
        index: index as u64,
        count: objects.len() as u64,
    };
    let merkle_proof = merkle::inclusion_path(&leaves, index).ok_or_else(out_of_range)?;
    let object = objects.get(index).ok_or_else(out_of_range)?.clone();
    Ok(RegistrationProof {
        merkle_proof,
        object,
        leaf_count: objects.len() as u64,
        leaf_index: index as u64,
    })
}

/// Builds the commitment and the opening of every object in one pass.
pub fn commitment_with_proofs(
    policy_id: &str,
    actor: &Did,
    objects: &[Object],
) -> Result<(Sha256Hash, Vec<RegistrationProof>), CommitmentError> {
    let root = generate_commitment(policy_id, actor, objects)?;
    let proofs = (0..objects.len())
        .map(|index| proof_for_object(policy_id, actor, index, objects))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((root, proofs))
}

/// Checks that `proof` opens `root` for `actor` in `policy_id`.
///
/// A well-formed proof that does not lead to `root` yields `Ok(false)`. Only
/// malformed input is an error: a root that is not 32 bytes, an object with
/// an empty field, or a leaf index outside `0..leaf_count`.
pub fn verify_proof(
    root: &[u8],
    policy_id: &str,
    actor: &Did,
    proof: &RegistrationProof,
) -> Result<bool, CommitmentError> {
    let root = Sha256Hash::try_from(root).map_err(|_| CommitmentError::InvalidRootLength {
        expected: SHA256_HASH_SIZE,
        actual: root.len(),
    })?;
    check_object(&proof.object)?;
    if proof.leaf_count == 0 || proof.leaf_index >= proof.leaf_count {
        return Err(CommitmentError::IndexOutOfRange {
            index: proof.leaf_index,
            count: proof.leaf_count,
        });
    }
    let leaf = merkle::leaf_hash(&leaf_data(policy_id, actor, &proof.object));
    Ok(merkle::verify_inclusion(
        &leaf,
        proof.leaf_index,
        proof.leaf_count,
        &proof.merkle_proof,
        &root,
    ))
}
