use crate::{
    error::{AuthError, BuildError},
    jws::{self, Jws},
};
use acp_common::Timestamp;
use acp_did::{Did, Resolver, SigningKey};
use acp_policy::{Params, PolicyCmd};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A policy command signed by the acting DID itself.
///
/// Validity is bounded in blocks: the command may execute up to and
/// including height `issued_height + expiration_delta`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedPolicyCmdPayload {
    /// Target policy.
    pub policy_id: String,
    /// The acting DID; its key must have signed the payload.
    pub actor: Did,
    /// The command.
    pub cmd: PolicyCmd,
    /// Wall time the actor signed at.
    pub issued_at: DateTime<Utc>,
    /// Block height the actor signed at.
    pub issued_height: u64,
    /// Validity window, in blocks.
    pub expiration_delta: u64,
}

/// The payload as decoded before its signature and command are checked.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPayload {
    policy_id: String,
    actor: String,
    cmd: Value,
    issued_at: DateTime<Utc>,
    issued_height: u64,
    expiration_delta: u64,
}

impl SignedPolicyCmdPayload {
    /// Start building a signed payload.
    pub fn builder<'a>() -> SignedPolicyCmdBuilder<'a> {
        SignedPolicyCmdBuilder::new()
    }

    /// Last height at which the command may execute.
    pub fn last_valid_height(&self) -> u64 {
        self.issued_height.saturating_add(self.expiration_delta)
    }
}

/// Authenticate a signed command payload at block `now`.
///
/// The actor named in the payload is resolved and its first verification
/// key checks the signature. The validity window must not exceed the module
/// maximum and must not have passed at `now.height`.
pub fn authenticate_signed_payload<R: Resolver>(
    token: &str,
    resolver: &R,
    now: &Timestamp,
    params: &Params,
) -> Result<SignedPolicyCmdPayload, AuthError> {
    let unverified = Jws::parse(token)?
        .extract_unverified_claims::<RawPayload>()
        .map_err(|error| AuthError::InvalidPayload(error.to_string()))?;
    let actor_claim = &unverified.claims().actor;
    let actor = actor_claim
        .parse::<Did>()
        .map_err(|error| AuthError::InvalidActor {
            actor: actor_claim.clone(),
            reason: error.to_string(),
        })?;

    let raw = unverified.resolve_and_verify(&actor, resolver)?;
    let payload = SignedPolicyCmdPayload {
        policy_id: raw.policy_id,
        actor,
        cmd: PolicyCmd::from_json(raw.cmd)?,
        issued_at: raw.issued_at,
        issued_height: raw.issued_height,
        expiration_delta: raw.expiration_delta,
    };

    let max = params.policy_command_max_expiration_delta;
    if payload.expiration_delta > max {
        return Err(AuthError::ExpirationDeltaTooLarge {
            delta: payload.expiration_delta,
            max,
        });
    }
    if now.height > payload.last_valid_height() {
        return Err(AuthError::CommandExpired {
            issued_height: payload.issued_height,
            delta: payload.expiration_delta,
            height: now.height,
        });
    }
    tracing::debug!(
        actor = %payload.actor,
        policy_id = payload.policy_id.as_str(),
        cmd = payload.cmd.name(),
        height = now.height,
        "signed command accepted"
    );
    Ok(payload)
}

/// Builds and signs a [`SignedPolicyCmdPayload`].
#[derive(Debug, Default)]
pub struct SignedPolicyCmdBuilder<'a> {
    actor: Option<&'a SigningKey>,
    policy_id: Option<String>,
    cmd: Option<PolicyCmd>,
    issued_at: Option<Timestamp>,
    expiration_delta: Option<u64>,
}

impl<'a> SignedPolicyCmdBuilder<'a> {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// The key of the acting DID; it signs the payload.
    pub fn actor(mut self, key: &'a SigningKey) -> Self {
        self.actor = Some(key);
        self
    }

    /// Target policy.
    pub fn policy_id(mut self, policy_id: impl Into<String>) -> Self {
        self.policy_id = Some(policy_id.into());
        self
    }

    /// The command to sign.
    pub fn cmd(mut self, cmd: PolicyCmd) -> Self {
        self.cmd = Some(cmd);
        self
    }

    /// The block the payload is signed at.
    pub fn issued_at(mut self, at: Timestamp) -> Self {
        self.issued_at = Some(at);
        self
    }

    /// Validity window in blocks.
    pub fn expiration_delta(mut self, blocks: u64) -> Self {
        self.expiration_delta = Some(blocks);
        self
    }

    /// Sign the payload into its compact JWS form.
    pub fn try_build(self) -> Result<String, BuildError> {
        let key = self.actor.ok_or(BuildError::MissingField("actor"))?;
        let issued_at = self.issued_at.ok_or(BuildError::MissingField("issued_at"))?;
        let payload = SignedPolicyCmdPayload {
            policy_id: self.policy_id.ok_or(BuildError::MissingField("policy_id"))?,
            actor: key.did(),
            cmd: self.cmd.ok_or(BuildError::MissingField("cmd"))?,
            issued_at: issued_at.wall,
            issued_height: issued_at.height,
            expiration_delta: self
                .expiration_delta
                .ok_or(BuildError::MissingField("expiration_delta"))?,
        };
        Ok(jws::sign(&payload, key)?)
    }
}
