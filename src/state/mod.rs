//! Replicated state database
//!
//! In-memory world state: accounts, assets, and stablecoin oracles behind a
//! single reader-writer lock. The state root is a Merkle commitment over the
//! canonical serialization of every account and asset, so two nodes that
//! apply the same ordered transactions to the same genesis derive
//! byte-identical roots.

pub mod account;
pub mod asset;

pub use account::Account;
pub use asset::{Asset, AssetError, AssetMetadata, AssetType, StablecoinOracle};

use crate::crypto::hash::{hash256, hash_multiple};
use crate::types::{compute_merkle_root, Address, ASSET_GYDS};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// World state behind one reader-writer lock
pub struct StateDB {
    inner: RwLock<StateInner>,
}

#[derive(Clone, Default)]
struct StateInner {
    accounts: BTreeMap<Address, Account>,
    assets: BTreeMap<String, Asset>,
    oracles: BTreeMap<String, StablecoinOracle>,
    dirty: HashSet<Address>,
    root: [u8; 32],
}

/// Deep copy of the state for revert
pub struct StateSnapshot {
    inner: StateInner,
}

impl StateDB {
    /// Create an empty state database
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StateInner::default()),
        }
    }

    /// Account by address, as a deep copy
    pub fn get_account(&self, address: &Address) -> Option<Account> {
        self.inner.read().accounts.get(address).cloned()
    }

    /// Insert or replace an account
    pub fn set_account(&self, address: &Address, account: Account) {
        let mut inner = self.inner.write();
        inner.accounts.insert(address.clone(), account);
        inner.dirty.insert(address.clone());
    }

    /// Remove an account
    pub fn delete_account(&self, address: &Address) {
        let mut inner = self.inner.write();
        inner.accounts.remove(address);
        inner.dirty.insert(address.clone());
    }

    /// Balance for an address and asset; zero for unknown accounts
    pub fn get_balance(&self, address: &Address, asset: &str) -> u64 {
        self.inner
            .read()
            .accounts
            .get(address)
            .map(|a| a.balance(asset))
            .unwrap_or(0)
    }

    /// Nonce for an address; zero for unknown accounts
    pub fn get_nonce(&self, address: &Address) -> u64 {
        self.inner
            .read()
            .accounts
            .get(address)
            .map(|a| a.nonce)
            .unwrap_or(0)
    }

    /// Move tokens between accounts.
    ///
    /// Creates the receiver when absent. Atomic: on error nothing changes.
    pub fn transfer(
        &self,
        from: &Address,
        to: &Address,
        asset: &str,
        amount: u64,
    ) -> Result<(), StateError> {
        let mut inner = self.inner.write();

        let sender = inner
            .accounts
            .get_mut(from)
            .ok_or(StateError::AccountNotFound)?;
        if !sender.sub_balance(asset, amount) {
            return Err(StateError::InsufficientBalance);
        }

        inner
            .accounts
            .entry(to.clone())
            .or_insert_with(|| Account::new(to.clone()))
            .add_balance(asset, amount);

        inner.dirty.insert(from.clone());
        inner.dirty.insert(to.clone());
        Ok(())
    }

    /// Move GYDS from an account's balance into its self-stake
    pub fn stake(&self, address: &Address, amount: u64) -> Result<(), StateError> {
        let mut inner = self.inner.write();
        let account = inner
            .accounts
            .get_mut(address)
            .ok_or(StateError::AccountNotFound)?;

        if !account.stake(amount) {
            return Err(StateError::InsufficientBalance);
        }
        inner.dirty.insert(address.clone());
        Ok(())
    }

    /// Release self-stake back into the balance
    pub fn unstake(&self, address: &Address, amount: u64) -> Result<(), StateError> {
        let mut inner = self.inner.write();
        let account = inner
            .accounts
            .get_mut(address)
            .ok_or(StateError::AccountNotFound)?;

        if !account.unstake(amount) {
            return Err(StateError::InsufficientStake);
        }
        inner.dirty.insert(address.clone());
        Ok(())
    }

    /// Delegate GYDS from an account to a validator
    pub fn delegate(
        &self,
        address: &Address,
        validator: &Address,
        amount: u64,
    ) -> Result<(), StateError> {
        let mut inner = self.inner.write();
        let account = inner
            .accounts
            .get_mut(address)
            .ok_or(StateError::AccountNotFound)?;

        if !account.delegate(validator, amount) {
            return Err(StateError::InsufficientBalance);
        }
        inner.dirty.insert(address.clone());
        Ok(())
    }

    /// Withdraw a delegation back into the balance
    pub fn undelegate(
        &self,
        address: &Address,
        validator: &Address,
        amount: u64,
    ) -> Result<(), StateError> {
        let mut inner = self.inner.write();
        let account = inner
            .accounts
            .get_mut(address)
            .ok_or(StateError::AccountNotFound)?;

        if !account.undelegate(validator, amount) {
            return Err(StateError::InsufficientStake);
        }
        inner.dirty.insert(address.clone());
        Ok(())
    }

    /// Asset by id, as a deep copy
    pub fn get_asset(&self, id: &str) -> Option<Asset> {
        self.inner.read().assets.get(id).cloned()
    }

    /// Insert or replace an asset
    pub fn set_asset(&self, asset: Asset) {
        self.inner.write().assets.insert(asset.id.clone(), asset);
    }

    /// Register a new asset; rejects duplicates
    pub fn create_asset(&self, asset: Asset) -> Result<(), StateError> {
        let mut inner = self.inner.write();
        if inner.assets.contains_key(&asset.id) {
            return Err(StateError::Asset(AssetError::AlreadyExists));
        }
        debug!(asset = %asset.id, "asset created");
        inner.assets.insert(asset.id.clone(), asset);
        Ok(())
    }

    /// Mint supply and credit it to an account
    pub fn mint(
        &self,
        asset_id: &str,
        to: &Address,
        amount: u64,
        now: i64,
    ) -> Result<(), StateError> {
        let mut inner = self.inner.write();

        inner
            .assets
            .get_mut(asset_id)
            .ok_or(StateError::AssetNotFound)?
            .mint(amount, now)?;

        inner
            .accounts
            .entry(to.clone())
            .or_insert_with(|| Account::new(to.clone()))
            .add_balance(asset_id, amount);
        inner.dirty.insert(to.clone());
        Ok(())
    }

    /// Burn supply out of an account's balance
    pub fn burn(
        &self,
        asset_id: &str,
        from: &Address,
        amount: u64,
        now: i64,
    ) -> Result<(), StateError> {
        let mut inner = self.inner.write();

        let account = inner
            .accounts
            .get(from)
            .ok_or(StateError::AccountNotFound)?;
        if account.balance(asset_id) < amount {
            return Err(StateError::InsufficientBalance);
        }

        inner
            .assets
            .get_mut(asset_id)
            .ok_or(StateError::AssetNotFound)?
            .burn(amount, now)?;

        if let Some(account) = inner.accounts.get_mut(from) {
            account.sub_balance(asset_id, amount);
        }
        inner.dirty.insert(from.clone());
        Ok(())
    }

    /// Record a stablecoin oracle price, creating the feed on first update
    pub fn update_oracle(&self, asset_id: &str, peg_currency: &str, price: f64, now: i64) {
        let mut inner = self.inner.write();
        inner
            .oracles
            .entry(asset_id.to_string())
            .or_insert_with(|| StablecoinOracle::new(asset_id, peg_currency, now))
            .update_price(price, now);
    }

    /// Oracle feed for an asset
    pub fn get_oracle(&self, asset_id: &str) -> Option<StablecoinOracle> {
        self.inner.read().oracles.get(asset_id).cloned()
    }

    /// Circulating supply of an asset summed over accounts.
    ///
    /// For GYDS this includes staked and delegated amounts, which are
    /// encumbered but not destroyed.
    pub fn total_supply(&self, asset: &str) -> u64 {
        let inner = self.inner.read();
        let mut total: u64 = 0;
        for account in inner.accounts.values() {
            total = total.saturating_add(account.balance(asset));
            if asset == ASSET_GYDS {
                total = total.saturating_add(account.staked);
                total = total.saturating_add(account.total_delegated());
            }
        }
        total
    }

    /// Deep copy of the whole state
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            inner: self.inner.read().clone(),
        }
    }

    /// Replace the state wholesale from a snapshot; clears the dirty set
    pub fn revert(&self, snapshot: StateSnapshot) {
        let mut inner = self.inner.write();
        *inner = snapshot.inner;
        inner.dirty.clear();
    }

    /// Compute and store the state root; clears the dirty set.
    ///
    /// Account leaves are ordered by the decoded 20-byte address hash,
    /// ascending lexicographic on the raw bytes; asset leaves by ascending
    /// id. Each leaf is the SHA-256 of the canonical JSON form, paired with
    /// the same single-SHA rule as the transaction root. The final root
    /// binds both trees: `sha256(accounts_root ‖ assets_root)`.
    pub fn commit(&self) -> [u8; 32] {
        let mut inner = self.inner.write();

        // The encoded string's Ord does not reproduce raw-byte order (the
        // charset is not monotonic), so the map order cannot be used here.
        let mut accounts: Vec<&Account> = inner.accounts.values().collect();
        accounts.sort_by_cached_key(|a| {
            (a.address.decode().unwrap_or([0u8; 20]), a.address.clone())
        });

        let account_leaves: Vec<[u8; 32]> = accounts
            .iter()
            .map(|a| hash256(&a.canonical_bytes()))
            .collect();
        let asset_leaves: Vec<[u8; 32]> = inner
            .assets
            .values()
            .map(|a| hash256(&a.canonical_bytes()))
            .collect();

        let accounts_root = compute_merkle_root(&account_leaves);
        let assets_root = compute_merkle_root(&asset_leaves);
        let root = hash_multiple(&[&accounts_root, &assets_root]);

        inner.root = root;
        inner.dirty.clear();
        root
    }

    /// Last committed state root
    pub fn root(&self) -> [u8; 32] {
        self.inner.read().root
    }

    /// Number of addresses marked dirty since the last commit
    pub fn dirty_count(&self) -> usize {
        self.inner.read().dirty.len()
    }

    /// Number of accounts
    pub fn account_count(&self) -> usize {
        self.inner.read().accounts.len()
    }

    /// Number of assets
    pub fn asset_count(&self) -> usize {
        self.inner.read().assets.len()
    }

    /// All account addresses
    pub fn all_accounts(&self) -> Vec<Address> {
        self.inner.read().accounts.keys().cloned().collect()
    }

    /// Export the full state as JSON
    pub fn export(&self) -> Vec<u8> {
        #[derive(Serialize)]
        struct Export<'a> {
            accounts: &'a BTreeMap<Address, Account>,
            assets: &'a BTreeMap<String, Asset>,
            root: String,
        }

        let inner = self.inner.read();
        serde_json::to_vec(&Export {
            accounts: &inner.accounts,
            assets: &inner.assets,
            root: hex::encode(inner.root),
        })
        .unwrap_or_default()
    }
}

impl Default for StateDB {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StateDB {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("StateDB")
            .field("accounts", &inner.accounts.len())
            .field("assets", &inner.assets.len())
            .field("root", &hex::encode(inner.root))
            .finish()
    }
}

/// State errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("account not found")]
    AccountNotFound,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("insufficient stake")]
    InsufficientStake,
    #[error("asset not found")]
    AssetNotFound,
    #[error("{0}")]
    Asset(#[from] AssetError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ASSET_GYD;

    fn addr(n: u8) -> Address {
        Address::from_hash(&[n; 20])
    }

    fn funded_state(balance: u64) -> StateDB {
        let state = StateDB::new();
        let mut account = Account::new(addr(1));
        account.add_balance(ASSET_GYDS, balance);
        state.set_account(&addr(1), account);
        state
    }

    #[test]
    fn test_get_account_returns_copy() {
        let state = funded_state(100);
        let mut copy = state.get_account(&addr(1)).unwrap();
        copy.add_balance(ASSET_GYDS, 1_000_000);

        // Mutating the copy must not leak into the store
        assert_eq!(state.get_balance(&addr(1), ASSET_GYDS), 100);
    }

    #[test]
    fn test_transfer() {
        let state = funded_state(100);
        state.transfer(&addr(1), &addr(2), ASSET_GYDS, 30).unwrap();

        assert_eq!(state.get_balance(&addr(1), ASSET_GYDS), 70);
        assert_eq!(state.get_balance(&addr(2), ASSET_GYDS), 30);
    }

    #[test]
    fn test_transfer_missing_sender() {
        let state = StateDB::new();
        assert_eq!(
            state.transfer(&addr(1), &addr(2), ASSET_GYDS, 1),
            Err(StateError::AccountNotFound)
        );
    }

    #[test]
    fn test_transfer_insufficient_is_atomic() {
        let state = funded_state(100);
        assert_eq!(
            state.transfer(&addr(1), &addr(2), ASSET_GYDS, 200),
            Err(StateError::InsufficientBalance)
        );
        assert_eq!(state.get_balance(&addr(1), ASSET_GYDS), 100);
        assert!(state.get_account(&addr(2)).is_none());
    }

    #[test]
    fn test_stake_and_unstake() {
        let state = funded_state(100);
        state.stake(&addr(1), 60).unwrap();

        let account = state.get_account(&addr(1)).unwrap();
        assert_eq!(account.balance(ASSET_GYDS), 40);
        assert_eq!(account.staked, 60);

        assert_eq!(state.stake(&addr(1), 50), Err(StateError::InsufficientBalance));

        state.unstake(&addr(1), 10).unwrap();
        assert_eq!(state.get_balance(&addr(1), ASSET_GYDS), 50);
    }

    #[test]
    fn test_delegate_and_undelegate() {
        let state = funded_state(100);
        let validator = addr(9);

        state.delegate(&addr(1), &validator, 80).unwrap();
        assert_eq!(state.get_balance(&addr(1), ASSET_GYDS), 20);

        assert_eq!(
            state.undelegate(&addr(1), &validator, 81),
            Err(StateError::InsufficientStake)
        );

        state.undelegate(&addr(1), &validator, 80).unwrap();
        assert_eq!(state.get_balance(&addr(1), ASSET_GYDS), 100);
    }

    #[test]
    fn test_total_supply_includes_encumbered_gyds() {
        let state = funded_state(100);
        state.stake(&addr(1), 30).unwrap();
        state.delegate(&addr(1), &addr(9), 20).unwrap();

        assert_eq!(state.total_supply(ASSET_GYDS), 100);
    }

    #[test]
    fn test_mint_and_burn_move_supply() {
        let state = StateDB::new();
        state.set_asset(Asset::stablecoin("GYD", "GYD Stablecoin", "GYD", addr(0), 0));

        state.mint(ASSET_GYD, &addr(1), 500, 1).unwrap();
        assert_eq!(state.get_balance(&addr(1), ASSET_GYD), 500);
        assert_eq!(state.get_asset(ASSET_GYD).unwrap().total_supply, 500);

        state.burn(ASSET_GYD, &addr(1), 200, 2).unwrap();
        assert_eq!(state.get_balance(&addr(1), ASSET_GYD), 300);
        assert_eq!(state.get_asset(ASSET_GYD).unwrap().total_supply, 300);
    }

    #[test]
    fn test_burn_more_than_balance_fails() {
        let state = StateDB::new();
        state.set_asset(Asset::stablecoin("GYD", "GYD Stablecoin", "GYD", addr(0), 0));
        state.mint(ASSET_GYD, &addr(1), 100, 1).unwrap();

        assert_eq!(
            state.burn(ASSET_GYD, &addr(1), 101, 2),
            Err(StateError::InsufficientBalance)
        );
        assert_eq!(state.get_balance(&addr(1), ASSET_GYD), 100);
    }

    #[test]
    fn test_create_asset_rejects_duplicate() {
        let state = StateDB::new();
        state
            .create_asset(Asset::fungible("TOK", "Token", "TOK", 8, addr(1), 0))
            .unwrap();
        assert_eq!(
            state.create_asset(Asset::fungible("TOK", "Token", "TOK", 8, addr(1), 0)),
            Err(StateError::Asset(AssetError::AlreadyExists))
        );
    }

    #[test]
    fn test_snapshot_and_revert() {
        let state = funded_state(100);
        state.commit();
        let before = state.export();

        let snap = state.snapshot();
        state.transfer(&addr(1), &addr(2), ASSET_GYDS, 50).unwrap();
        state.commit();

        state.revert(snap);
        assert_eq!(state.get_balance(&addr(1), ASSET_GYDS), 100);
        assert!(state.get_account(&addr(2)).is_none());
        assert_eq!(state.dirty_count(), 0);
        assert_eq!(state.export(), before);
    }

    #[test]
    fn test_commit_clears_dirty_and_changes_root() {
        let state = funded_state(100);
        assert!(state.dirty_count() > 0);

        let root1 = state.commit();
        assert_eq!(state.dirty_count(), 0);
        assert_ne!(root1, [0u8; 32]);

        state.transfer(&addr(1), &addr(2), ASSET_GYDS, 1).unwrap();
        let root2 = state.commit();
        assert_ne!(root1, root2);
    }

    #[test]
    fn test_state_root_orders_accounts_by_raw_address_bytes() {
        // 0x00… and 0x08… encode to strings that sort the other way around
        // ('q' vs 'p'), so this distinguishes raw-byte from string order.
        let mut low_hash = [0u8; 20];
        low_hash[19] = 1;
        let mut high_hash = [0u8; 20];
        high_hash[0] = 0x08;
        let low = Address::from_hash(&low_hash);
        let high = Address::from_hash(&high_hash);
        assert!(high < low, "counterexample requires inverted string order");

        let state = StateDB::new();
        let mut a = Account::new(low.clone());
        a.add_balance(ASSET_GYDS, 1);
        state.set_account(&low, a.clone());
        let mut b = Account::new(high.clone());
        b.add_balance(ASSET_GYDS, 2);
        state.set_account(&high, b.clone());

        // Leaves in ascending raw-byte order: 0x00… before 0x08…
        let accounts_root = compute_merkle_root(&[
            hash256(&a.canonical_bytes()),
            hash256(&b.canonical_bytes()),
        ]);
        let assets_root = compute_merkle_root(&[]);
        let expected = hash_multiple(&[&accounts_root, &assets_root]);

        assert_eq!(state.commit(), expected);
    }

    #[test]
    fn test_state_root_deterministic_across_instances() {
        let build = || {
            let state = StateDB::new();
            state.set_asset(Asset::fungible("GYDS", "GYDS Token", "GYDS", 8, Address::zero(), 7));
            let mut a = Account::new(addr(1));
            a.add_balance(ASSET_GYDS, 123);
            state.set_account(&addr(1), a);
            let mut b = Account::new(addr(2));
            b.add_balance(ASSET_GYDS, 456);
            state.set_account(&addr(2), b);
            state.commit()
        };

        assert_eq!(build(), build());
    }

    #[test]
    fn test_unstake_then_stake_leaves_totals_unchanged() {
        let state = funded_state(100);
        state.stake(&addr(1), 50).unwrap();
        let supply = state.total_supply(ASSET_GYDS);

        state.unstake(&addr(1), 50).unwrap();
        state.stake(&addr(1), 50).unwrap();

        let account = state.get_account(&addr(1)).unwrap();
        assert_eq!(account.staked, 50);
        assert_eq!(account.balance(ASSET_GYDS), 50);
        assert_eq!(state.total_supply(ASSET_GYDS), supply);
    }

    #[test]
    fn test_oracle_update() {
        let state = StateDB::new();
        state.update_oracle(ASSET_GYD, "USD", 0.99, 100);

        let oracle = state.get_oracle(ASSET_GYD).unwrap();
        assert_eq!(oracle.price, 0.99);
        assert_eq!(oracle.peg_currency, "USD");
    }
}
