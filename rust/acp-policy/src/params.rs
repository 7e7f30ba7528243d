use acp_common::{Classify, Duration, ErrorKind, time::WallDuration};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default bound on a signed command's validity window, in blocks.
pub const DEFAULT_MAX_EXPIRATION_DELTA: u64 = 21_600;

/// Default validity of a registrations commitment: one day.
pub const DEFAULT_COMMITMENT_VALIDITY: Duration = Duration::Wall(WallDuration::from_secs(24 * 60 * 60));

/// Default bech32 prefix of chain addresses.
pub const DEFAULT_ADDRESS_PREFIX: &str = "source";

/// Failure to load or validate [`Params`].
#[derive(Debug, Error)]
pub enum ParamsError {
    /// The TOML document could not be parsed.
    #[error("failed to parse params: {0}")]
    Parse(#[from] toml::de::Error),

    /// The params could not be rendered as TOML.
    #[error("failed to encode params: {0}")]
    Encode(#[from] toml::ser::Error),

    /// The params file could not be read.
    #[error("failed to read params file: {0}")]
    Io(#[from] std::io::Error),

    /// A field holds a value the module cannot operate with.
    #[error("invalid params: {0}")]
    Invalid(String),
}

impl Classify for ParamsError {
    fn kind(&self) -> ErrorKind {
        match self {
            ParamsError::Io(_) => ErrorKind::Internal,
            _ => ErrorKind::BadInput,
        }
    }
}

/// Module parameters.
///
/// Missing fields take their defaults, so a params file only needs to name
/// what it overrides:
///
/// ```toml
/// policy_command_max_expiration_delta = 100
///
/// [registrations_commitment_validity]
/// block_count = 600
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Params {
    /// Prefix an `authorized_account` must carry.
    pub address_prefix: String,
    /// Largest `expiration_delta` a signed command may request, in blocks.
    pub policy_command_max_expiration_delta: u64,
    /// Validity window given to new registrations commitments.
    pub registrations_commitment_validity: Duration,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            address_prefix: DEFAULT_ADDRESS_PREFIX.to_string(),
            policy_command_max_expiration_delta: DEFAULT_MAX_EXPIRATION_DELTA,
            registrations_commitment_validity: DEFAULT_COMMITMENT_VALIDITY,
        }
    }
}

impl Params {
    /// Parse and validate params from a TOML document.
    pub fn from_toml(document: &str) -> Result<Self, ParamsError> {
        let params: Params = toml::from_str(document)?;
        params.validate()?;
        Ok(params)
    }

    /// Parse and validate params from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ParamsError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    /// Render params as a TOML document.
    pub fn to_toml(&self) -> Result<String, ParamsError> {
        Ok(toml::to_string(self)?)
    }

    /// Reject values the module cannot operate with.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.policy_command_max_expiration_delta == 0 {
            return Err(ParamsError::Invalid(
                "policy_command_max_expiration_delta must be positive".into(),
            ));
        }
        if self.registrations_commitment_validity.is_zero() {
            return Err(ParamsError::Invalid(
                "registrations_commitment_validity must be positive".into(),
            ));
        }
        if let Duration::Wall(window) = self.registrations_commitment_validity {
            if window.subsec_nanos() != 0 {
                return Err(ParamsError::Invalid(format!(
                    "registrations_commitment_validity must be whole seconds, got {window:?}"
                )));
            }
        }
        if self.address_prefix.is_empty()
            || !self
                .address_prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(ParamsError::Invalid(format!(
                "address_prefix must be lowercase alphanumeric, got {:?}",
                self.address_prefix
            )));
        }
        Ok(())
    }
}
