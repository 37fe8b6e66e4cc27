//! Transaction mempool
//!
//! Pool of admitted, unconfirmed transactions. Admission validates the
//! transaction, enforces size and gas-price floors, tracks per-sender
//! nonces, and evicts the cheapest entry when full. Reaping returns
//! transactions in descending gas-price order with FIFO tie-breaks; entries
//! stay pooled until a confirmation removes them.

use crate::types::{Address, Transaction, TransactionError, TxHash};
use parking_lot::Mutex;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Mempool configuration
#[derive(Clone, Debug)]
pub struct MempoolConfig {
    /// Maximum number of pooled transactions
    pub max_size: usize,
    /// Maximum serialized transaction size in bytes
    pub max_tx_size: usize,
    /// Lifetime before a pooled transaction expires
    pub max_tx_age: Duration,
    /// Minimum accepted gas price (fee per serialized byte)
    pub min_gas_price: u64,
    /// Interval between expiry sweeps
    pub reap_interval: Duration,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            max_tx_size: 1024 * 1024,
            max_tx_age: Duration::from_secs(3600),
            min_gas_price: 1,
            reap_interval: Duration::from_secs(60),
        }
    }
}

/// A pooled transaction with admission metadata
#[derive(Clone, Debug)]
pub struct MempoolTx {
    pub tx: Transaction,
    pub hash: TxHash,
    pub added_at: Instant,
    pub gas_price: u64,
    seq: u64,
}

/// Priority-queue handle: highest gas price first, FIFO within a price
#[derive(Clone, Copy, PartialEq, Eq)]
struct PoolEntry {
    gas_price: u64,
    seq: u64,
    hash: TxHash,
}

impl Ord for PoolEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.gas_price
            .cmp(&other.gas_price)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for PoolEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

struct MempoolInner {
    txs: HashMap<TxHash, MempoolTx>,
    queue: BinaryHeap<PoolEntry>,
    /// Highest observed nonce + 1 per sender
    nonces: HashMap<Address, u64>,
    next_seq: u64,
}

/// The transaction mempool
pub struct Mempool {
    config: MempoolConfig,
    inner: Mutex<MempoolInner>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Mempool {
    /// Create a mempool with the given configuration
    pub fn new(config: MempoolConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            inner: Mutex::new(MempoolInner {
                txs: HashMap::new(),
                queue: BinaryHeap::new(),
                nonces: HashMap::new(),
                next_seq: 0,
            }),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Admit a transaction.
    ///
    /// Checks run in order: field verification, size cap, gas-price floor,
    /// duplicate hash, capacity (with cheapest-entry eviction), and the
    /// per-sender nonce floor.
    pub fn add(&self, tx: Transaction) -> Result<TxHash, MempoolError> {
        tx.verify()?;

        let size = tx.size();
        if size > self.config.max_tx_size {
            return Err(MempoolError::TxTooLarge);
        }

        let gas_price = tx.fee / size as u64;
        if gas_price < self.config.min_gas_price {
            return Err(MempoolError::GasPriceTooLow);
        }

        let hash = tx.hash();
        let mut inner = self.inner.lock();

        if inner.txs.contains_key(&hash) {
            return Err(MempoolError::DuplicateTx);
        }

        if inner.txs.len() >= self.config.max_size && !Self::evict_lowest(&mut inner, gas_price) {
            return Err(MempoolError::MempoolFull);
        }

        let floor = inner.nonces.get(&tx.from).copied().unwrap_or(0);
        if tx.nonce < floor {
            return Err(MempoolError::NonceTooLow);
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;

        inner.queue.push(PoolEntry {
            gas_price,
            seq,
            hash,
        });
        inner
            .nonces
            .insert(tx.from.clone(), floor.max(tx.nonce + 1));
        inner.txs.insert(
            hash,
            MempoolTx {
                tx,
                hash,
                added_at: Instant::now(),
                gas_price,
                seq,
            },
        );

        debug!(tx = %hash, gas_price, size = inner.txs.len(), "transaction admitted");
        Ok(hash)
    }

    /// Evict the lowest-gas-price entry, but only when it is strictly
    /// cheaper than the incoming transaction.
    fn evict_lowest(inner: &mut MempoolInner, incoming_gas_price: u64) -> bool {
        let Some(victim) = inner
            .txs
            .values()
            .min_by_key(|mtx| (mtx.gas_price, std::cmp::Reverse(mtx.seq)))
            .map(|mtx| mtx.hash)
        else {
            return false;
        };

        let victim_price = inner.txs[&victim].gas_price;
        if victim_price >= incoming_gas_price {
            return false;
        }

        inner.txs.remove(&victim);
        warn!(tx = %victim, gas_price = victim_price, "evicted for capacity");
        true
    }

    /// Remove a transaction by hash
    pub fn remove(&self, hash: &TxHash) -> Option<Transaction> {
        let mut inner = self.inner.lock();
        inner.txs.remove(hash).map(|mtx| mtx.tx)
    }

    /// Transaction by hash
    pub fn get(&self, hash: &TxHash) -> Option<Transaction> {
        self.inner.lock().txs.get(hash).map(|mtx| mtx.tx.clone())
    }

    /// True when the hash is pooled
    pub fn contains(&self, hash: &TxHash) -> bool {
        self.inner.lock().txs.contains_key(hash)
    }

    /// Take up to `max_txs` transactions for block building, best-paying
    /// first. Zero means no limit. Expired entries found along the way are
    /// dropped. Reaped transactions stay pooled until [`Mempool::update`]
    /// confirms them.
    pub fn reap_max_txs(&self, max_txs: usize) -> Vec<Transaction> {
        let limit = if max_txs == 0 {
            self.config.max_size
        } else {
            max_txs
        };

        let mut inner = self.inner.lock();
        let mut reaped = Vec::new();
        let mut keep = Vec::new();

        while reaped.len() < limit {
            let Some(entry) = inner.queue.pop() else {
                break;
            };

            let Some(mtx) = inner.txs.get(&entry.hash) else {
                continue; // stale heap entry
            };
            if mtx.seq != entry.seq {
                continue;
            }

            if mtx.added_at.elapsed() > self.config.max_tx_age {
                inner.txs.remove(&entry.hash);
                continue;
            }

            reaped.push(mtx.tx.clone());
            keep.push(entry);
        }

        // Reaped entries stay in the pool until confirmed
        for entry in keep {
            inner.queue.push(entry);
        }

        reaped
    }

    /// Drop confirmed transactions and restore the queue
    pub fn update(&self, confirmed: &[Transaction]) {
        let mut inner = self.inner.lock();
        for tx in confirmed {
            inner.txs.remove(&tx.hash());
        }
        Self::rebuild_queue(&mut inner);
    }

    /// Remove expired transactions; returns how many were dropped
    pub fn remove_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let max_age = self.config.max_tx_age;

        let before = inner.txs.len();
        inner.txs.retain(|_, mtx| mtx.added_at.elapsed() <= max_age);
        let removed = before - inner.txs.len();

        if removed > 0 {
            debug!(removed, "expired transactions swept");
        }
        Self::rebuild_queue(&mut inner);
        removed
    }

    fn rebuild_queue(inner: &mut MempoolInner) {
        inner.queue = inner
            .txs
            .values()
            .map(|mtx| PoolEntry {
                gas_price: mtx.gas_price,
                seq: mtx.seq,
                hash: mtx.hash,
            })
            .collect();
    }

    /// Pending transactions from one sender
    pub fn pending_for(&self, address: &Address) -> Vec<Transaction> {
        self.inner
            .lock()
            .txs
            .values()
            .filter(|mtx| &mtx.tx.from == address)
            .map(|mtx| mtx.tx.clone())
            .collect()
    }

    /// Number of pooled transactions
    pub fn size(&self) -> usize {
        self.inner.lock().txs.len()
    }

    /// True when nothing is pooled
    pub fn is_empty(&self) -> bool {
        self.inner.lock().txs.is_empty()
    }

    /// Approximate pooled bytes
    pub fn total_bytes(&self) -> usize {
        self.inner.lock().txs.values().map(|mtx| mtx.tx.size()).sum()
    }

    /// Spawn the periodic expiry sweep. The task runs until [`Mempool::stop`]
    /// signals shutdown; an in-flight sweep completes before the task exits.
    pub fn spawn_cleanup(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = Arc::clone(self);
        let mut shutdown = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pool.config.reap_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        pool.remove_expired();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Signal the cleanup task to stop
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl std::fmt::Debug for Mempool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mempool")
            .field("size", &self.size())
            .finish()
    }
}

/// Mempool admission errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MempoolError {
    #[error("transaction too large")]
    TxTooLarge,
    #[error("gas price too low")]
    GasPriceTooLow,
    #[error("duplicate transaction")]
    DuplicateTx,
    #[error("mempool full")]
    MempoolFull,
    #[error("nonce too low")]
    NonceTooLow,
    #[error("{0}")]
    Invalid(#[from] TransactionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::types::ASSET_GYDS;

    /// Build a signed transfer whose fee/size ratio is exactly `gas_price`.
    /// The fee feeds back into the serialized size, so it is fixed-pointed.
    fn tx_with_gas_price(seed: u8, nonce: u64, gas_price: u64) -> Transaction {
        let pair = KeyPair::from_seed([seed; 32]);
        let from = Address::from_public_key(&pair.public_key());
        let mut tx = Transaction::transfer(from, Address::from_hash(&[1u8; 20]), 5, ASSET_GYDS)
            .with_nonce(nonce);

        for _ in 0..8 {
            tx.sign(&pair);
            let fee = gas_price * tx.size() as u64;
            if tx.fee == fee {
                break;
            }
            tx.fee = fee;
        }

        assert_eq!(tx.fee / tx.size() as u64, gas_price);
        assert!(tx.verify().is_ok());
        tx
    }

    fn pool(max_size: usize) -> Mempool {
        Mempool::new(MempoolConfig {
            max_size,
            min_gas_price: 1,
            ..MempoolConfig::default()
        })
    }

    #[test]
    fn test_add_and_get() {
        let pool = pool(100);
        let tx = tx_with_gas_price(1, 0, 5);
        let hash = pool.add(tx.clone()).unwrap();

        assert!(pool.contains(&hash));
        assert_eq!(pool.get(&hash).unwrap().hash(), tx.hash());
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn test_duplicate_rejected() {
        let pool = pool(100);
        let tx = tx_with_gas_price(1, 0, 5);
        pool.add(tx.clone()).unwrap();

        assert_eq!(pool.add(tx), Err(MempoolError::DuplicateTx));
    }

    #[test]
    fn test_unsigned_rejected() {
        let pool = pool(100);
        let pair = KeyPair::from_seed([1u8; 32]);
        let from = Address::from_public_key(&pair.public_key());
        let tx = Transaction::transfer(from, Address::from_hash(&[1u8; 20]), 5, ASSET_GYDS);

        assert!(matches!(pool.add(tx), Err(MempoolError::Invalid(_))));
    }

    #[test]
    fn test_gas_price_floor() {
        let pool = Mempool::new(MempoolConfig {
            min_gas_price: 10,
            ..MempoolConfig::default()
        });
        let tx = tx_with_gas_price(1, 0, 9);
        assert_eq!(pool.add(tx), Err(MempoolError::GasPriceTooLow));
    }

    #[test]
    fn test_tx_too_large() {
        let pool = Mempool::new(MempoolConfig {
            max_tx_size: 64,
            ..MempoolConfig::default()
        });
        let tx = tx_with_gas_price(1, 0, 5);
        assert_eq!(pool.add(tx), Err(MempoolError::TxTooLarge));
    }

    #[test]
    fn test_nonce_too_low() {
        let pool = pool(100);
        pool.add(tx_with_gas_price(1, 3, 5)).unwrap();

        // Same sender, lower nonce
        assert_eq!(
            pool.add(tx_with_gas_price(1, 2, 6)),
            Err(MempoolError::NonceTooLow)
        );

        // Equal-or-higher nonces pass the floor
        pool.add(tx_with_gas_price(1, 4, 6)).unwrap();
    }

    #[test]
    fn test_reap_orders_by_gas_price() {
        let pool = pool(100);
        pool.add(tx_with_gas_price(1, 0, 3)).unwrap();
        pool.add(tx_with_gas_price(2, 0, 9)).unwrap();
        pool.add(tx_with_gas_price(3, 0, 6)).unwrap();

        let reaped = pool.reap_max_txs(0);
        let prices: Vec<u64> = reaped
            .iter()
            .map(|tx| tx.fee / tx.size() as u64)
            .collect();
        assert_eq!(prices, vec![9, 6, 3]);

        // Reaped entries stay pooled until confirmed
        assert_eq!(pool.size(), 3);
    }

    #[test]
    fn test_reap_fifo_on_equal_gas_price() {
        let pool = pool(100);
        let first = pool.add(tx_with_gas_price(1, 0, 5)).unwrap();
        let second = pool.add(tx_with_gas_price(2, 0, 5)).unwrap();

        let reaped = pool.reap_max_txs(0);
        assert_eq!(reaped[0].hash(), first);
        assert_eq!(reaped[1].hash(), second);
    }

    #[test]
    fn test_reap_respects_limit() {
        let pool = pool(100);
        for seed in 1..=5 {
            pool.add(tx_with_gas_price(seed, 0, seed as u64)).unwrap();
        }

        assert_eq!(pool.reap_max_txs(2).len(), 2);
    }

    #[test]
    fn test_eviction_at_capacity() {
        let pool = pool(2);

        let tx1 = pool.add(tx_with_gas_price(1, 0, 10)).unwrap();
        let tx2 = pool.add(tx_with_gas_price(2, 0, 5)).unwrap();

        // Higher-paying arrival evicts the cheapest entry
        let tx3 = pool.add(tx_with_gas_price(3, 0, 7)).unwrap();
        assert!(!pool.contains(&tx2));
        assert_eq!(pool.size(), 2);

        let reaped = pool.reap_max_txs(0);
        assert_eq!(reaped[0].hash(), tx1);
        assert_eq!(reaped[1].hash(), tx3);

        // Cheaper-than-everything arrival is refused
        assert_eq!(
            pool.add(tx_with_gas_price(4, 0, 3)),
            Err(MempoolError::MempoolFull)
        );
    }

    #[test]
    fn test_update_removes_confirmed() {
        let pool = pool(100);
        let tx1 = tx_with_gas_price(1, 0, 5);
        let tx2 = tx_with_gas_price(2, 0, 6);
        pool.add(tx1.clone()).unwrap();
        pool.add(tx2.clone()).unwrap();

        pool.update(&[tx1.clone()]);
        assert_eq!(pool.size(), 1);
        assert!(!pool.contains(&tx1.hash()));

        let reaped = pool.reap_max_txs(0);
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].hash(), tx2.hash());
    }

    #[test]
    fn test_expired_dropped_on_reap() {
        let pool = Mempool::new(MempoolConfig {
            max_tx_age: Duration::from_secs(0),
            ..MempoolConfig::default()
        });
        pool.add(tx_with_gas_price(1, 0, 5)).unwrap();

        std::thread::sleep(Duration::from_millis(5));
        assert!(pool.reap_max_txs(0).is_empty());
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn test_remove_expired_sweep() {
        let pool = Mempool::new(MempoolConfig {
            max_tx_age: Duration::from_secs(0),
            ..MempoolConfig::default()
        });
        pool.add(tx_with_gas_price(1, 0, 5)).unwrap();
        pool.add(tx_with_gas_price(2, 0, 6)).unwrap();

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(pool.remove_expired(), 2);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_pending_for_sender() {
        let pool = pool(100);
        let tx = tx_with_gas_price(1, 0, 5);
        let from = tx.from.clone();
        pool.add(tx).unwrap();
        pool.add(tx_with_gas_price(2, 0, 5)).unwrap();

        assert_eq!(pool.pending_for(&from).len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_task_stops_on_signal() {
        let pool = Arc::new(Mempool::new(MempoolConfig {
            max_tx_age: Duration::from_secs(0),
            reap_interval: Duration::from_millis(10),
            ..MempoolConfig::default()
        }));
        pool.add(tx_with_gas_price(1, 0, 5)).unwrap();

        let handle = pool.spawn_cleanup();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pool.is_empty());

        pool.stop();
        handle.await.unwrap();
    }
}
