//! Accounts
//!
//! An account tracks per-asset balances, the transaction nonce, self-stake,
//! and delegations to validators. The `code` and `storage` fields are
//! reserved for a future contract runtime and stay inert.

use crate::types::{Address, ASSET_GYDS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A chain account
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account address
    pub address: Address,
    /// Transaction nonce, monotonically non-decreasing
    pub nonce: u64,
    /// Per-asset balances
    pub balances: BTreeMap<String, u64>,
    /// Self-staked GYDS (encumbered, not spendable)
    pub staked: u64,
    /// Delegated GYDS per validator (encumbered, not spendable)
    pub delegated: BTreeMap<Address, u64>,
    /// Reserved for contract code
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code: Vec<u8>,
    /// Reserved for contract storage
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub storage: BTreeMap<String, Vec<u8>>,
    /// Creation timestamp (Unix seconds)
    pub created_at: i64,
    /// Last update timestamp (Unix seconds)
    pub updated_at: i64,
}

impl Account {
    /// Create a fresh account.
    ///
    /// Timestamps stay zeroed; accounts created inside the apply pipeline
    /// must hash identically on every node.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            nonce: 0,
            balances: BTreeMap::new(),
            staked: 0,
            delegated: BTreeMap::new(),
            code: Vec::new(),
            storage: BTreeMap::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Balance of one asset, zero when absent
    pub fn balance(&self, asset: &str) -> u64 {
        self.balances.get(asset).copied().unwrap_or(0)
    }

    /// Set the balance of one asset
    pub fn set_balance(&mut self, asset: &str, amount: u64) {
        self.balances.insert(asset.to_string(), amount);
    }

    /// Credit an asset balance
    pub fn add_balance(&mut self, asset: &str, amount: u64) {
        let entry = self.balances.entry(asset.to_string()).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Debit an asset balance; false (and unchanged) when insufficient
    pub fn sub_balance(&mut self, asset: &str, amount: u64) -> bool {
        let balance = self.balance(asset);
        if balance < amount {
            return false;
        }
        self.balances.insert(asset.to_string(), balance - amount);
        true
    }

    /// Increment the nonce
    pub fn increment_nonce(&mut self) {
        self.nonce += 1;
    }

    /// Move GYDS from the spendable balance into self-stake
    pub fn stake(&mut self, amount: u64) -> bool {
        if !self.sub_balance(ASSET_GYDS, amount) {
            return false;
        }
        self.staked = self.staked.saturating_add(amount);
        true
    }

    /// Move GYDS from self-stake back into the spendable balance
    pub fn unstake(&mut self, amount: u64) -> bool {
        if self.staked < amount {
            return false;
        }
        self.staked -= amount;
        self.add_balance(ASSET_GYDS, amount);
        true
    }

    /// Delegate GYDS to a validator
    pub fn delegate(&mut self, validator: &Address, amount: u64) -> bool {
        if !self.sub_balance(ASSET_GYDS, amount) {
            return false;
        }
        let entry = self.delegated.entry(validator.clone()).or_insert(0);
        *entry = entry.saturating_add(amount);
        true
    }

    /// Withdraw a delegation; empty entries are removed
    pub fn undelegate(&mut self, validator: &Address, amount: u64) -> bool {
        let Some(&current) = self.delegated.get(validator) else {
            return false;
        };
        if current < amount {
            return false;
        }

        if current == amount {
            self.delegated.remove(validator);
        } else {
            self.delegated.insert(validator.clone(), current - amount);
        }
        self.add_balance(ASSET_GYDS, amount);
        true
    }

    /// Delegation to one validator, zero when absent
    pub fn delegation(&self, validator: &Address) -> u64 {
        self.delegated.get(validator).copied().unwrap_or(0)
    }

    /// Sum of all outgoing delegations
    pub fn total_delegated(&self) -> u64 {
        self.delegated.values().sum()
    }

    /// True when contract code is present
    pub fn is_contract(&self) -> bool {
        !self.code.is_empty()
    }

    /// Canonical bytes for state-root hashing
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}
