use crate::address::Address;
use acp_common::Bytes;
use acp_did::{KeyError, PublicKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The public key a ledger account signs with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountKey {
    /// Key type name or type URL, e.g. `/cosmos.crypto.secp256k1.PubKey`.
    pub algorithm: String,
    /// Compressed key bytes.
    pub bytes: Bytes,
}

impl AccountKey {
    /// Describe `key` under its plain type name.
    pub fn from_public_key(key: &PublicKey) -> Self {
        Self {
            algorithm: key.key_type().as_str().to_string(),
            bytes: Bytes::from(key.to_bytes()),
        }
    }

    /// Decode into a verification key.
    pub fn public_key(&self) -> Result<PublicKey, KeyError> {
        PublicKey::from_parts(&self.algorithm, &self.bytes)
    }
}

/// A ledger account as the module sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account address.
    pub address: Address,
    /// Key of the account; absent until the account has signed once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<AccountKey>,
    /// Ledger sequence number.
    #[serde(default)]
    pub sequence: u64,
}

/// Read access to the ledger's accounts.
pub trait AccountKeeper {
    /// The account at `address`, if one exists.
    fn account(&self, address: &Address) -> Option<Account>;
}

impl<K: AccountKeeper + ?Sized> AccountKeeper for &K {
    fn account(&self, address: &Address) -> Option<Account> {
        (**self).account(address)
    }
}

/// An [`AccountKeeper`] over a map, for hosts that mirror accounts in memory
/// and for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryAccountKeeper {
    accounts: BTreeMap<Address, Account>,
}

impl MemoryAccountKeeper {
    /// Add or replace an account.
    pub fn insert(&mut self, account: Account) {
        self.accounts.insert(account.address.clone(), account);
    }

    /// Add an account derived from `key` and return its address.
    pub fn insert_key(&mut self, prefix: &str, key: &PublicKey) -> Result<Address, crate::AddressError> {
        let address = Address::for_public_key(prefix, key)?;
        self.insert(Account {
            address: address.clone(),
            public_key: Some(AccountKey::from_public_key(key)),
            sequence: 0,
        });
        Ok(address)
    }
}

impl AccountKeeper for MemoryAccountKeeper {
    fn account(&self, address: &Address) -> Option<Account> {
        self.accounts.get(address).cloned()
    }
}
