use crate::{
    dispatch::{TxContext, dispatch},
    error::HandlerError,
    wire::decode_msg,
};
use acp_auth::{AccountKeeper, AuthContext, AuthenticatedCmd, Authenticator, CmdAuthenticator, PolicyCmdMsg};
use acp_common::{Sha256Hash, Store, StoreOverlay, Timestamp};
use acp_did::{Did, Resolver};
use acp_policy::{
    AmendmentEvent, Object, Params, PolicyCmd, PolicyCmdResult, RegistrationProof,
    RegistrationsCommitment, RelationshipEngine, RelationshipRecord,
};
use acp_registration::CommitmentService;

/// The module as the host state machine sees it.
///
/// Owns the module store, the relationship engine, the authenticator and
/// the current parameters. The host calls [`Keeper::handle`] once per
/// command message and [`Keeper::end_block`] once per block, never
/// concurrently.
#[derive(Debug)]
pub struct Keeper<S, E, R, K> {
    service: CommitmentService<S, E>,
    authenticator: CmdAuthenticator<R, K>,
    params: Params,
}

impl<S, E, R, K> Keeper<S, E, R, K>
where
    S: Store,
    E: RelationshipEngine,
    R: Resolver,
    K: AccountKeeper,
{
    /// Assemble a keeper; fails if `params` are invalid.
    pub fn new(
        store: S,
        engine: E,
        authenticator: CmdAuthenticator<R, K>,
        params: Params,
    ) -> Result<Self, HandlerError> {
        params.validate()?;
        Ok(Self {
            service: CommitmentService::new(store, engine),
            authenticator,
            params,
        })
    }

    /// Current module parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Replace the module parameters.
    pub fn set_params(&mut self, params: Params) -> Result<(), HandlerError> {
        params.validate()?;
        tracing::info!(?params, "module parameters updated");
        self.params = params;
        Ok(())
    }

    /// The relationship engine.
    pub fn engine(&self) -> &E {
        self.service.engine()
    }

    /// The relationship engine, mutably, for host-side policy management.
    pub fn engine_mut(&mut self) -> &mut E {
        self.service.engine_mut()
    }

    /// Release the store and the engine.
    pub fn into_parts(self) -> (S, E) {
        self.service.into_parts()
    }

    /// Authenticate a command message and execute it.
    #[tracing::instrument(
        skip_all,
        fields(strategy = msg.strategy(), signer = %tx.signer, height = tx.now.height)
    )]
    pub fn handle(&mut self, msg: PolicyCmdMsg, tx: &TxContext) -> Result<PolicyCmdResult, HandlerError> {
        let ctx = AuthContext {
            signer: &tx.signer,
            now: &tx.now,
            params: &self.params,
        };
        let AuthenticatedCmd { actor, policy_id, cmd } = self.authenticator.authenticate(msg, &ctx)?;
        self.execute(&actor, &policy_id, cmd, tx)
    }

    /// Decode a JSON command message, then [`Keeper::handle`] it.
    pub fn handle_json(&mut self, bytes: &[u8], tx: &TxContext) -> Result<PolicyCmdResult, HandlerError> {
        let msg = decode_msg(bytes)?;
        self.handle(msg, tx)
    }

    /// Execute a command for an already authenticated actor.
    ///
    /// Store writes are buffered and only reach the store if the command
    /// succeeds.
    pub fn execute(
        &mut self,
        actor: &Did,
        policy_id: &str,
        cmd: PolicyCmd,
        tx: &TxContext,
    ) -> Result<PolicyCmdResult, HandlerError> {
        let (store, engine) = self.service.parts_mut();
        let mut scoped = CommitmentService::new(StoreOverlay::new(store), engine);
        let result = dispatch(&mut scoped, &self.params, actor, policy_id, cmd, tx)?;
        let (overlay, _) = scoped.into_parts();
        overlay.commit()?;
        Ok(result)
    }

    /// Flag the commitments that expired before `now`.
    ///
    /// Meant to run once per block, after its transactions.
    pub fn end_block(&mut self, now: &Timestamp) -> Result<Vec<RegistrationsCommitment>, HandlerError> {
        let (store, engine) = self.service.parts_mut();
        let mut scoped = CommitmentService::new(StoreOverlay::new(store), engine);
        let expired = scoped.flag_expired_commitments(now)?;
        let (overlay, _) = scoped.into_parts();
        overlay.commit()?;
        if !expired.is_empty() {
            tracing::info!(height = now.height, count = expired.len(), "registrations commitments expired");
        }
        Ok(expired)
    }

    /// A commitment by id.
    pub fn commitment(&self, id: u64) -> Result<RegistrationsCommitment, HandlerError> {
        Ok(self.service.commitment(id)?)
    }

    /// Commitments published with the given root bytes.
    pub fn commitments_by_root(&self, root: &[u8]) -> Result<Vec<RegistrationsCommitment>, HandlerError> {
        Ok(self.service.commitments_by_root(root)?)
    }

    /// An amendment event by id.
    pub fn amendment_event(&self, id: u64) -> Result<AmendmentEvent, HandlerError> {
        Ok(self.service.amendment_event(id)?)
    }

    /// Amendment events of a policy flagged as hijack attempts.
    pub fn hijack_attempts(&self, policy_id: &str) -> Result<Vec<AmendmentEvent>, HandlerError> {
        Ok(self.service.hijack_attempts(policy_id)?)
    }

    /// The registration record of an object, if it is registered.
    pub fn object_registration(
        &self,
        policy_id: &str,
        object: &Object,
    ) -> Result<Option<RelationshipRecord>, HandlerError> {
        Ok(self.service.engine().get_object_registration(policy_id, object)?)
    }

    /// Commitment root and per-object openings for objects nobody has
    /// registered yet.
    pub fn generate_commitment(
        &self,
        policy_id: &str,
        actor: &Did,
        objects: &[Object],
    ) -> Result<(Sha256Hash, Vec<RegistrationProof>), HandlerError> {
        Ok(self
            .service
            .build_commitment_with_proofs(policy_id, actor, objects)?)
    }
}
