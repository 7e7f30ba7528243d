//! Bech32 chain account addresses (BIP-173).

use acp_did::PublicKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};
use thiserror::Error;

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const GENERATOR: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];
const CHECKSUM_LEN: usize = 6;
const MAX_LEN: usize = 90;

/// Length of the account hash carried by an address.
pub const ADDRESS_LEN: usize = 20;

/// Why a string is not a valid address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Upper and lower case characters are mixed.
    #[error("mixed case")]
    MixedCase,
    /// No `1` separates the prefix from the data.
    #[error("missing separator")]
    MissingSeparator,
    /// The string is too short or too long.
    #[error("invalid length {0}")]
    InvalidLength(usize),
    /// A character outside the bech32 alphabet.
    #[error("invalid character {0:?}")]
    InvalidChar(char),
    /// The checksum does not match.
    #[error("invalid checksum")]
    InvalidChecksum,
    /// Leftover bits after converting back to bytes.
    #[error("invalid padding")]
    InvalidPadding,
    /// The prefix differs from the expected one.
    #[error("expected prefix {expected}, got {actual}")]
    UnexpectedPrefix {
        /// Required prefix.
        expected: String,
        /// Prefix found.
        actual: String,
    },
}

/// A bech32 chain address: a human readable prefix plus account bytes.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    prefix: String,
    bytes: Vec<u8>,
    encoded: String,
}

impl Address {
    /// Encode `bytes` under `prefix`.
    pub fn new(prefix: &str, bytes: &[u8]) -> Result<Self, AddressError> {
        let prefix = prefix.to_ascii_lowercase();
        if prefix.is_empty() || prefix.bytes().any(|b| !(33..=126).contains(&b)) {
            return Err(AddressError::InvalidLength(prefix.len()));
        }
        let data = convert_bits(bytes, 8, 5, true)?;
        let checksum = create_checksum(&prefix, &data);
        let mut encoded = String::with_capacity(prefix.len() + 1 + data.len() + CHECKSUM_LEN);
        encoded.push_str(&prefix);
        encoded.push('1');
        encoded.extend(data.iter().chain(&checksum).map(|&d| CHARSET[d as usize] as char));
        if encoded.len() > MAX_LEN {
            return Err(AddressError::InvalidLength(encoded.len()));
        }
        Ok(Self {
            prefix,
            bytes: bytes.to_vec(),
            encoded,
        })
    }

    /// The address of the account holding `key`: the first twenty bytes of
    /// the SHA-256 of its compressed key bytes.
    pub fn for_public_key(prefix: &str, key: &PublicKey) -> Result<Self, AddressError> {
        let digest = Sha256::digest(key.to_bytes());
        Self::new(prefix, &digest[..ADDRESS_LEN])
    }

    /// Parse an address and require `prefix`.
    pub fn parse_with_prefix(encoded: &str, prefix: &str) -> Result<Self, AddressError> {
        let address: Address = encoded.parse()?;
        if address.prefix != prefix {
            return Err(AddressError::UnexpectedPrefix {
                expected: prefix.to_string(),
                actual: address.prefix,
            });
        }
        Ok(address)
    }

    /// Human readable prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Account bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Canonical lowercase encoding.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > MAX_LEN {
            return Err(AddressError::InvalidLength(s.len()));
        }
        let has_lower = s.bytes().any(|b| b.is_ascii_lowercase());
        let has_upper = s.bytes().any(|b| b.is_ascii_uppercase());
        if has_lower && has_upper {
            return Err(AddressError::MixedCase);
        }
        let s = s.to_ascii_lowercase();
        let separator = s.rfind('1').ok_or(AddressError::MissingSeparator)?;
        let (prefix, rest) = (&s[..separator], &s[separator + 1..]);
        if prefix.is_empty() || rest.len() < CHECKSUM_LEN {
            return Err(AddressError::InvalidLength(s.len()));
        }
        if let Some(c) = prefix.chars().find(|c| !(33..=126).contains(&(*c as u32))) {
            return Err(AddressError::InvalidChar(c));
        }
        let data = rest
            .chars()
            .map(|c| {
                CHARSET
                    .iter()
                    .position(|&b| b as char == c)
                    .map(|p| p as u8)
                    .ok_or(AddressError::InvalidChar(c))
            })
            .collect::<Result<Vec<u8>, _>>()?;
        if polymod(&[expand_prefix(prefix), data.clone()].concat()) != 1 {
            return Err(AddressError::InvalidChecksum);
        }
        let bytes = convert_bits(&data[..data.len() - CHECKSUM_LEN], 5, 8, false)?;
        Ok(Self {
            prefix: prefix.to_string(),
            bytes,
            encoded: s,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.encoded)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encoded)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

fn polymod(values: &[u8]) -> u32 {
    let mut checksum: u32 = 1;
    for &value in values {
        let top = checksum >> 25;
        checksum = ((checksum & 0x01ff_ffff) << 5) ^ u32::from(value);
        for (i, generator) in GENERATOR.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                checksum ^= generator;
            }
        }
    }
    checksum
}

fn expand_prefix(prefix: &str) -> Vec<u8> {
    let bytes = prefix.as_bytes();
    bytes
        .iter()
        .map(|b| b >> 5)
        .chain([0])
        .chain(bytes.iter().map(|b| b & 0x1f))
        .collect()
}

fn create_checksum(prefix: &str, data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let values = [expand_prefix(prefix), data.to_vec(), vec![0; CHECKSUM_LEN]].concat();
    let modulus = polymod(&values) ^ 1;
    let mut checksum = [0u8; CHECKSUM_LEN];
    for (i, slot) in checksum.iter_mut().enumerate() {
        *slot = ((modulus >> (5 * (5 - i))) & 0x1f) as u8;
    }
    checksum
}

fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Result<Vec<u8>, AddressError> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let max = (1u32 << to) - 1;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);
    for &value in data {
        let value = u32::from(value);
        if value >> from != 0 {
            return Err(AddressError::InvalidPadding);
        }
        acc = (acc << from) | value;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & max) as u8);
        }
    }
    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & max) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & max) != 0 {
        return Err(AddressError::InvalidPadding);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    #[test]
    fn it_accepts_bip173_vectors() -> TestResult {
        for valid in [
            "A12UEL5L",
            "a12uel5l",
            "abcdef1qpzry9x8gf2tvdw0s3jn54khce6mua7lmqqqxw",
            "split1checkupstagehandshakeupstreamerranterredcaperred2y9e3w",
        ] {
            let address: Address = valid.parse()?;
            assert_eq!(address.as_str(), valid.to_ascii_lowercase());
        }
        Ok(())
    }

    #[test]
    fn it_rejects_bad_checksums_and_case() {
        assert_eq!(
            "a12uel5m".parse::<Address>().unwrap_err(),
            AddressError::InvalidChecksum
        );
        assert_eq!(
            "A12uEL5L".parse::<Address>().unwrap_err(),
            AddressError::MixedCase
        );
        assert_eq!(
            "pzry9x0s0muk".parse::<Address>().unwrap_err(),
            AddressError::MissingSeparator
        );
        assert!(matches!(
            "x1b4n0q5v".parse::<Address>(),
            Err(AddressError::InvalidChar('b'))
        ));
    }

    #[test]
    fn it_round_trips_account_bytes() -> TestResult {
        let bytes: Vec<u8> = (0u8..20).collect();
        let address = Address::new("source", &bytes)?;
        let parsed = Address::parse_with_prefix(address.as_str(), "source")?;

        assert_eq!(parsed.as_bytes(), bytes.as_slice());
        assert_eq!(parsed, address);
        assert!(address.as_str().starts_with("source1"));
        Ok(())
    }

    #[test]
    fn it_enforces_the_prefix() -> TestResult {
        let address = Address::new("cosmos", &[1; 20])?;
        assert!(matches!(
            Address::parse_with_prefix(address.as_str(), "source"),
            Err(AddressError::UnexpectedPrefix { .. })
        ));
        Ok(())
    }

    #[test]
    fn a_flipped_character_breaks_the_checksum() -> TestResult {
        let address = Address::new("source", &[9; 20])?;
        let mut chars: Vec<char> = address.as_str().chars().collect();
        let i = "source1".len() + 3;
        chars[i] = if chars[i] == 'q' { 'p' } else { 'q' };
        let corrupted: String = chars.into_iter().collect();

        assert_eq!(
            corrupted.parse::<Address>().unwrap_err(),
            AddressError::InvalidChecksum
        );
        Ok(())
    }
}
