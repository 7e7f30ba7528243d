use crate::{
    address::Address,
    error::{AuthError, BuildError},
    jws::{self, Jws},
};
use acp_did::{Did, Resolver, SigningKey};
use acp_policy::Params;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// A self-issued token by which a DID lets one chain account submit commands
/// on its behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken {
    /// The DID granting authority (`iss`).
    pub issuer: Did,
    /// The only account allowed to present the token (`authorized_account`).
    pub authorized_account: Address,
    /// Issue time (`iat`).
    pub issued_at: DateTime<Utc>,
    /// Expiry (`exp`). The token is still valid at exactly this instant.
    pub expires_at: DateTime<Utc>,
}

/// The token as it appears on the wire. Every claim is optional here so that
/// a missing one is reported by name.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct BearerClaims {
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    authorized_account: Option<String>,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    exp: Option<i64>,
}

fn claim<T>(value: Option<T>, name: &'static str) -> Result<T, AuthError> {
    value.ok_or(AuthError::MissingClaim(name))
}

fn seconds(value: i64, name: &str) -> Result<DateTime<Utc>, AuthError> {
    DateTime::from_timestamp(value, 0)
        .ok_or_else(|| AuthError::InvalidBearerToken(format!("{name} {value} is out of range")))
}

impl BearerToken {
    /// Start building a signed token.
    pub fn builder<'a>() -> BearerTokenBuilder<'a> {
        BearerTokenBuilder::new()
    }

    fn from_claims(claims: &BearerClaims, params: &Params) -> Result<Self, AuthError> {
        let iss = claim(claims.iss.as_deref(), "iss")?;
        let account = claim(claims.authorized_account.as_deref(), "authorized_account")?;
        let iat = claim(claims.iat, "iat")?;
        let exp = claim(claims.exp, "exp")?;

        let issuer = iss.parse::<Did>().map_err(|error| AuthError::InvalidIssuer {
            issuer: iss.to_string(),
            reason: error.to_string(),
        })?;
        let authorized_account = Address::parse_with_prefix(account, &params.address_prefix)
            .map_err(|reason| AuthError::InvalidAuthorizedAccount {
                account: account.to_string(),
                reason,
            })?;
        let issued_at = seconds(iat, "iat")?;
        let expires_at = seconds(exp, "exp")?;
        if expires_at < issued_at {
            return Err(AuthError::InvalidBearerToken(format!(
                "exp {expires_at} precedes iat {issued_at}"
            )));
        }
        Ok(Self {
            issuer,
            authorized_account,
            issued_at,
            expires_at,
        })
    }

    fn to_claims(&self) -> BearerClaims {
        BearerClaims {
            iss: Some(self.issuer.to_string()),
            authorized_account: Some(self.authorized_account.to_string()),
            iat: Some(self.issued_at.timestamp()),
            exp: Some(self.expires_at.timestamp()),
        }
    }
}

/// Authenticate a bearer token presented by the transaction `signer` at block
/// time `now`, returning the issuer DID.
///
/// Checks run in a fixed order and stop at the first failure: JWS shape,
/// claim presence, claim syntax, signature under the issuer's resolved key,
/// expiry, and finally that `signer` is the authorized account.
pub fn authenticate_bearer_token<R: Resolver>(
    token: &str,
    resolver: &R,
    signer: &Address,
    now: DateTime<Utc>,
    params: &Params,
) -> Result<Did, AuthError> {
    let unverified = Jws::parse(token)?
        .extract_unverified_claims::<BearerClaims>()
        .map_err(|error| AuthError::InvalidBearerToken(error.to_string()))?;
    let bearer = BearerToken::from_claims(unverified.claims(), params)?;

    unverified.resolve_and_verify(&bearer.issuer, resolver)?;

    if now > bearer.expires_at {
        return Err(AuthError::TokenExpired {
            now,
            expires_at: bearer.expires_at,
        });
    }
    if signer != &bearer.authorized_account {
        return Err(AuthError::MsgUnauthorized {
            authorized: bearer.authorized_account.to_string(),
            signer: signer.to_string(),
        });
    }
    tracing::debug!(issuer = %bearer.issuer, account = %signer, "bearer token accepted");
    Ok(bearer.issuer)
}

/// Builds and signs a [`BearerToken`].
///
/// ```ignore
/// let token = BearerToken::builder()
///     .issuer(&key)
///     .authorized_account(address)
///     .issued_at(now)
///     .valid_for(TimeDelta::minutes(20))
///     .try_build()?;
/// ```
#[derive(Debug, Default)]
pub struct BearerTokenBuilder<'a> {
    issuer: Option<&'a SigningKey>,
    authorized_account: Option<Address>,
    issued_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    valid_for: Option<TimeDelta>,
}

impl<'a> BearerTokenBuilder<'a> {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// The key of the issuing DID; it signs the token.
    pub fn issuer(mut self, key: &'a SigningKey) -> Self {
        self.issuer = Some(key);
        self
    }

    /// The account allowed to present the token.
    pub fn authorized_account(mut self, account: Address) -> Self {
        self.authorized_account = Some(account);
        self
    }

    /// Issue time.
    pub fn issued_at(mut self, at: DateTime<Utc>) -> Self {
        self.issued_at = Some(at);
        self
    }

    /// Absolute expiry. Takes precedence over [`Self::valid_for`].
    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Expiry relative to the issue time.
    pub fn valid_for(mut self, window: TimeDelta) -> Self {
        self.valid_for = Some(window);
        self
    }

    /// Sign the token into its compact JWS form.
    pub fn try_build(self) -> Result<String, BuildError> {
        let key = self.issuer.ok_or(BuildError::MissingField("issuer"))?;
        let authorized_account = self
            .authorized_account
            .ok_or(BuildError::MissingField("authorized_account"))?;
        let issued_at = self.issued_at.ok_or(BuildError::MissingField("issued_at"))?;
        let expires_at = match (self.expires_at, self.valid_for) {
            (Some(at), _) => at,
            (None, Some(window)) => issued_at
                .checked_add_signed(window)
                .ok_or(BuildError::InvalidWindow)?,
            (None, None) => return Err(BuildError::MissingField("expires_at")),
        };
        let token = BearerToken {
            issuer: key.did(),
            authorized_account,
            issued_at,
            expires_at,
        };
        Ok(jws::sign(&token.to_claims(), key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acp_common::{Classify, ErrorKind};
    use acp_did::{KeyResolver, KeyType};
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use chrono::NaiveDateTime;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use testresult::TestResult;

    fn time(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .unwrap()
            .and_utc()
    }

    fn issuer() -> SigningKey {
        SigningKey::from_secret(KeyType::Secp256k1, &[11; 32]).unwrap()
    }

    fn account(seed: u8) -> Address {
        Address::new("source", &[seed; 20]).unwrap()
    }

    fn token(key: &SigningKey, account: &Address) -> String {
        BearerToken::builder()
            .issuer(key)
            .authorized_account(account.clone())
            .issued_at(time("2024-06-17 14:00:00"))
            .expires_at(time("2024-06-17 14:20:00"))
            .try_build()
            .unwrap()
    }

    fn raw_token(key: &SigningKey, claims: Value) -> String {
        jws::sign(&claims, key).unwrap()
    }

    fn authenticate(token: &str, signer: &Address, now: &str) -> Result<Did, AuthError> {
        authenticate_bearer_token(token, &KeyResolver, signer, time(now), &Params::default())
    }

    #[test]
    fn it_accepts_within_the_window() -> TestResult {
        let key = issuer();
        let signer = account(1);
        let actor = authenticate(&token(&key, &signer), &signer, "2024-06-17 14:10:00")?;
        assert_eq!(actor, key.did());
        Ok(())
    }

    #[test]
    fn expiry_is_inclusive_of_exp() -> TestResult {
        let key = issuer();
        let signer = account(1);
        let token = token(&key, &signer);

        authenticate(&token, &signer, "2024-06-17 14:20:00")?;
        let error = authenticate(&token, &signer, "2024-06-17 14:20:01").unwrap_err();
        assert!(matches!(error, AuthError::TokenExpired { .. }));

        let error = authenticate(&token, &signer, "2024-06-17 14:30:00").unwrap_err();
        match error {
            AuthError::TokenExpired { now, expires_at } => {
                assert_eq!(now, time("2024-06-17 14:30:00"));
                assert_eq!(expires_at, time("2024-06-17 14:20:00"));
            }
            other => panic!("unexpected error {other}"),
        }
        Ok(())
    }

    #[test]
    fn it_binds_the_token_to_one_account() {
        let key = issuer();
        let token = token(&key, &account(1));
        let error = authenticate(&token, &account(2), "2024-06-17 14:10:00").unwrap_err();
        assert!(matches!(error, AuthError::MsgUnauthorized { .. }));
        assert_eq!(error.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn it_names_the_missing_claim() {
        let key = issuer();
        let token = raw_token(
            &key,
            json!({ "iss": key.did(), "authorized_account": account(1), "iat": 0 }),
        );
        let error = authenticate(&token, &account(1), "2024-06-17 14:10:00").unwrap_err();
        assert!(matches!(error, AuthError::MissingClaim("exp")));
    }

    #[test]
    fn it_validates_claim_syntax_before_the_signature() {
        let key = issuer();
        let signer = account(1);
        let cases = [
            (
                json!({ "iss": "alice", "authorized_account": signer, "iat": 0, "exp": 10 }),
                "issuer",
            ),
            (
                json!({ "iss": key.did(), "authorized_account": "source1qqqq", "iat": 0, "exp": 10 }),
                "account",
            ),
            (
                json!({ "iss": key.did(), "authorized_account": Address::new("cosmos", &[1; 20]).unwrap(), "iat": 0, "exp": 10 }),
                "account",
            ),
            (
                json!({ "iss": key.did(), "authorized_account": signer, "iat": 10, "exp": 0 }),
                "window",
            ),
            (
                json!({ "iss": key.did(), "authorized_account": signer, "iat": 0, "exp": 10, "aud": "x" }),
                "window",
            ),
        ];
        for (claims, expected) in cases {
            let token = raw_token(&key, claims);
            let error = authenticate(&token, &signer, "1970-01-01 00:00:05").unwrap_err();
            let matched = match expected {
                "issuer" => matches!(error, AuthError::InvalidIssuer { .. }),
                "account" => matches!(error, AuthError::InvalidAuthorizedAccount { .. }),
                _ => matches!(error, AuthError::InvalidBearerToken(_)),
            };
            assert!(matched, "expected {expected} error, got {error}");
            assert_eq!(error.kind(), ErrorKind::BadInput);
        }
    }

    #[test]
    fn a_token_signed_by_someone_else_is_rejected() {
        let key = issuer();
        let forger = SigningKey::from_secret(KeyType::Ed25519, &[12; 32]).unwrap();
        let signer = account(1);
        let token = raw_token(
            &forger,
            json!({ "iss": key.did(), "authorized_account": signer, "iat": 0, "exp": 10 }),
        );
        let error = authenticate(&token, &signer, "1970-01-01 00:00:05").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Unauthenticated);
    }

    #[test]
    fn a_tampered_header_is_rejected() -> TestResult {
        let key = issuer();
        let signer = account(1);
        let token = token(&key, &signer);
        let (_, rest) = token.split_once('.').ok_or("not a jws")?;
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let tampered = format!("{header}.{rest}");

        let error = authenticate(&tampered, &signer, "2024-06-17 14:10:00").unwrap_err();
        assert!(matches!(error, AuthError::Jws(crate::JwsError::InvalidSignature { .. })));
        Ok(())
    }
}
