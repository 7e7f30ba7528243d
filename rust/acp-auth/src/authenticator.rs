use crate::{
    account::AccountKeeper,
    address::Address,
    bearer::authenticate_bearer_token,
    error::AuthError,
    signed::authenticate_signed_payload,
};
use acp_common::Timestamp;
use acp_did::{Did, Resolver, issue_did};
use acp_policy::{Params, PolicyCmd};
use serde::{Deserialize, Serialize};

/// What the ledger tells the module about the transaction carrying a
/// command.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext<'a> {
    /// Verified transaction signer.
    pub signer: &'a Address,
    /// Current block.
    pub now: &'a Timestamp,
    /// Module parameters.
    pub params: &'a Params,
}

/// A command whose actor has been established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedCmd {
    /// The acting DID.
    pub actor: Did,
    /// Target policy.
    pub policy_id: String,
    /// The command.
    pub cmd: PolicyCmd,
}

/// A command submitted by a signer acting as itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMsg {
    /// Target policy.
    pub policy_id: String,
    /// The command.
    pub cmd: PolicyCmd,
}

/// A command submitted on behalf of the issuer of a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerMsg {
    /// Compact JWS bearer token.
    pub bearer_token: String,
    /// Target policy.
    pub policy_id: String,
    /// The command.
    pub cmd: PolicyCmd,
}

/// A command signed by its actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMsg {
    /// Compact JWS of a [`crate::SignedPolicyCmdPayload`].
    pub payload: String,
}

/// Any of the three command messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCmdMsg {
    /// Acting as the transaction signer.
    Direct(DirectMsg),
    /// Acting through a bearer token.
    Bearer(BearerMsg),
    /// Acting through a signed payload.
    Signed(SignedMsg),
}

impl PolicyCmdMsg {
    /// Name of the authentication strategy.
    pub fn strategy(&self) -> &'static str {
        match self {
            PolicyCmdMsg::Direct(_) => "direct",
            PolicyCmdMsg::Bearer(_) => "bearer",
            PolicyCmdMsg::Signed(_) => "signed",
        }
    }
}

/// Establishes the acting DID of a command message of type `M`.
pub trait Authenticator<M> {
    /// Authenticate `msg` in the context of its transaction.
    fn authenticate(&self, msg: M, ctx: &AuthContext<'_>) -> Result<AuthenticatedCmd, AuthError>;
}

/// The module's authenticator: a DID resolver for token strategies and the
/// ledger's accounts for the direct one.
#[derive(Debug, Clone)]
pub struct CmdAuthenticator<R, K> {
    resolver: R,
    accounts: K,
}

impl<R: Resolver, K: AccountKeeper> CmdAuthenticator<R, K> {
    /// Combine a resolver and an account keeper.
    pub fn new(resolver: R, accounts: K) -> Self {
        Self { resolver, accounts }
    }

    /// The DID resolver.
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// The DID of the transaction signer's account key.
    pub fn signer_did(&self, signer: &Address) -> Result<Did, AuthError> {
        let account = self
            .accounts
            .account(signer)
            .ok_or_else(|| AuthError::AccountNotFound(signer.to_string()))?;
        let key = account
            .public_key
            .ok_or_else(|| AuthError::AccountWithoutKey(signer.to_string()))?;
        Ok(issue_did(&key.public_key()?))
    }
}

impl<R: Resolver, K: AccountKeeper> Authenticator<DirectMsg> for CmdAuthenticator<R, K> {
    fn authenticate(&self, msg: DirectMsg, ctx: &AuthContext<'_>) -> Result<AuthenticatedCmd, AuthError> {
        Ok(AuthenticatedCmd {
            actor: self.signer_did(ctx.signer)?,
            policy_id: msg.policy_id,
            cmd: msg.cmd,
        })
    }
}

impl<R: Resolver, K: AccountKeeper> Authenticator<BearerMsg> for CmdAuthenticator<R, K> {
    fn authenticate(&self, msg: BearerMsg, ctx: &AuthContext<'_>) -> Result<AuthenticatedCmd, AuthError> {
        let actor = authenticate_bearer_token(
            &msg.bearer_token,
            &self.resolver,
            ctx.signer,
            ctx.now.wall,
            ctx.params,
        )?;
        Ok(AuthenticatedCmd {
            actor,
            policy_id: msg.policy_id,
            cmd: msg.cmd,
        })
    }
}

impl<R: Resolver, K: AccountKeeper> Authenticator<SignedMsg> for CmdAuthenticator<R, K> {
    fn authenticate(&self, msg: SignedMsg, ctx: &AuthContext<'_>) -> Result<AuthenticatedCmd, AuthError> {
        let payload = authenticate_signed_payload(&msg.payload, &self.resolver, ctx.now, ctx.params)?;
        Ok(AuthenticatedCmd {
            actor: payload.actor,
            policy_id: payload.policy_id,
            cmd: payload.cmd,
        })
    }
}

impl<R: Resolver, K: AccountKeeper> Authenticator<PolicyCmdMsg> for CmdAuthenticator<R, K> {
    fn authenticate(&self, msg: PolicyCmdMsg, ctx: &AuthContext<'_>) -> Result<AuthenticatedCmd, AuthError> {
        let strategy = msg.strategy();
        let result = match msg {
            PolicyCmdMsg::Direct(msg) => Authenticator::<DirectMsg>::authenticate(self, msg, ctx),
            PolicyCmdMsg::Bearer(msg) => Authenticator::<BearerMsg>::authenticate(self, msg, ctx),
            PolicyCmdMsg::Signed(msg) => Authenticator::<SignedMsg>::authenticate(self, msg, ctx),
        };
        match &result {
            Ok(authenticated) => tracing::debug!(
                strategy,
                actor = %authenticated.actor,
                signer = %ctx.signer,
                "command authenticated"
            ),
            Err(error) => tracing::debug!(strategy, signer = %ctx.signer, %error, "authentication failed"),
        }
        result
    }
}
