//! Slashing keeper
//!
//! Tracks per-validator signing history over a rolling window and applies
//! penalties: a downtime slash with a temporary jail when too many blocks in
//! the window go unsigned, and a heavier double-sign slash with a permanent
//! tombstone on equivocation.
//!
//! Validators are resolved through the engine by address only; the keeper
//! never holds a validator reference of its own.

use super::engine::Engine;
use super::{ConsensusError, ConsensusResult, SlashReason};
use crate::types::Address;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Slashing parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashingParams {
    /// Double-sign penalty in basis points
    pub double_sign_penalty: u64,
    /// Downtime penalty in basis points
    pub downtime_penalty: u64,
    /// Misbehavior penalty in basis points
    pub misbehavior_penalty: u64,
    /// Minimum share of the window that must be signed, in percent
    pub min_signed_per_window: u64,
    /// Signing window size in blocks
    pub signed_blocks_window: u64,
    /// Jail duration after a downtime slash
    pub downtime_jail_duration: Duration,
    /// Jail duration after a double-sign slash
    pub double_sign_jail_duration: Duration,
}

impl Default for SlashingParams {
    fn default() -> Self {
        Self {
            double_sign_penalty: 500,
            downtime_penalty: 100,
            misbehavior_penalty: 200,
            min_signed_per_window: 50,
            signed_blocks_window: 1_000,
            downtime_jail_duration: Duration::from_secs(24 * 60 * 60),
            double_sign_jail_duration: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

impl SlashingParams {
    /// Misses beyond this count within the window trigger downtime handling
    fn missed_blocks_threshold(&self) -> u64 {
        let min_signed = self.signed_blocks_window * self.min_signed_per_window / 100;
        self.signed_blocks_window - min_signed
    }
}

/// Per-validator signing history
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SigningInfo {
    /// Validator address
    pub address: Address,
    /// Height at which tracking started
    pub start_height: u64,
    /// Jail expiry (Unix seconds), zero when not jailed
    pub jailed_until: i64,
    /// Permanently excluded from validation
    pub tombstoned: bool,
    /// Misses currently inside the window; always equals the number of
    /// unsigned slots in the bitmap
    pub missed_blocks_counter: u64,
    /// Ring bitmap over the window, indexed by `height mod window`.
    /// Starts all-signed so untracked history does not count as misses.
    pub signed_blocks_bitmap: Vec<bool>,
}

impl SigningInfo {
    fn new(address: Address, window: u64, start_height: u64) -> Self {
        Self {
            address,
            start_height,
            jailed_until: 0,
            tombstoned: false,
            missed_blocks_counter: 0,
            signed_blocks_bitmap: vec![true; window as usize],
        }
    }
}

/// A recorded slashing incident
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlashingEvent {
    pub validator_address: Address,
    pub height: u64,
    pub reason: SlashReason,
    pub amount: u64,
    pub timestamp: i64,
}

struct KeeperInner {
    signing_info: HashMap<Address, SigningInfo>,
    events: Vec<SlashingEvent>,
}

/// The slashing keeper
pub struct SlashingKeeper {
    engine: Arc<Engine>,
    params: SlashingParams,
    inner: Mutex<KeeperInner>,
}

impl SlashingKeeper {
    /// Create a keeper over the given engine
    pub fn new(engine: Arc<Engine>, params: SlashingParams) -> Self {
        Self {
            engine,
            params,
            inner: Mutex::new(KeeperInner {
                signing_info: HashMap::new(),
                events: Vec::new(),
            }),
        }
    }

    /// Current parameters
    pub fn params(&self) -> &SlashingParams {
        &self.params
    }

    /// Record whether a validator signed the block at `height`.
    ///
    /// The ring slot for the height is overwritten; a miss rolling off the
    /// window decrements the counter. Crossing the miss threshold triggers
    /// downtime handling for this validator.
    pub fn sign_block(&self, address: &Address, height: u64, signed: bool) -> ConsensusResult<()> {
        let window = self.params.signed_blocks_window;
        let mut inner = self.inner.lock();

        let info = inner
            .signing_info
            .entry(address.clone())
            .or_insert_with(|| SigningInfo::new(address.clone(), window, height));

        let index = (height % window) as usize;

        if !info.signed_blocks_bitmap[index] && info.missed_blocks_counter > 0 {
            info.missed_blocks_counter -= 1;
        }

        info.signed_blocks_bitmap[index] = signed;
        if !signed {
            info.missed_blocks_counter += 1;
        }

        if info.missed_blocks_counter > self.params.missed_blocks_threshold() {
            return self.downtime_locked(&mut inner, address, height);
        }

        Ok(())
    }

    /// Apply the downtime penalty to a validator
    pub fn handle_downtime(&self, address: &Address, height: u64) -> ConsensusResult<()> {
        let mut inner = self.inner.lock();
        // Ensure signing info exists so the jail timestamp can be recorded
        let window = self.params.signed_blocks_window;
        inner
            .signing_info
            .entry(address.clone())
            .or_insert_with(|| SigningInfo::new(address.clone(), window, height));
        self.downtime_locked(&mut inner, address, height)
    }

    fn downtime_locked(
        &self,
        inner: &mut KeeperInner,
        address: &Address,
        height: u64,
    ) -> ConsensusResult<()> {
        let now = crate::unix_now();

        let jailed_until = inner
            .signing_info
            .get(address)
            .map(|info| info.jailed_until)
            .unwrap_or(0);
        if jailed_until > now {
            return Ok(());
        }

        let handle = self
            .engine
            .handle(address)
            .ok_or_else(|| ConsensusError::ValidatorNotFound(address.clone()))?;

        let amount = {
            let mut validator = handle.write();
            let amount = validator.slash(
                self.params.downtime_penalty,
                SlashReason::Downtime,
                height,
                now,
            );
            validator.jail(self.params.downtime_jail_duration, now);
            amount
        };
        self.engine.refresh_active();

        if let Some(info) = inner.signing_info.get_mut(address) {
            info.jailed_until = now + self.params.downtime_jail_duration.as_secs() as i64;
        }

        warn!(validator = %address, height, amount, "downtime slash");
        inner.events.push(SlashingEvent {
            validator_address: address.clone(),
            height,
            reason: SlashReason::Downtime,
            amount,
            timestamp: now,
        });

        Ok(())
    }

    /// Apply the double-sign penalty: slash, jail, and tombstone.
    ///
    /// A tombstoned validator is never punished twice; the call becomes a
    /// no-op.
    pub fn handle_double_sign(&self, address: &Address, height: u64) -> ConsensusResult<()> {
        let window = self.params.signed_blocks_window;
        let mut inner = self.inner.lock();

        let info = inner
            .signing_info
            .entry(address.clone())
            .or_insert_with(|| SigningInfo::new(address.clone(), window, height));
        if info.tombstoned {
            return Ok(());
        }

        let now = crate::unix_now();
        let handle = self
            .engine
            .handle(address)
            .ok_or_else(|| ConsensusError::ValidatorNotFound(address.clone()))?;

        let amount = {
            let mut validator = handle.write();
            let amount = validator.slash(
                self.params.double_sign_penalty,
                SlashReason::DoubleSign,
                height,
                now,
            );
            validator.jail(self.params.double_sign_jail_duration, now);
            amount
        };
        self.engine.refresh_active();

        if let Some(info) = inner.signing_info.get_mut(address) {
            info.tombstoned = true;
            info.jailed_until = now + self.params.double_sign_jail_duration.as_secs() as i64;
        }

        warn!(validator = %address, height, amount, "double-sign slash, tombstoned");
        inner.events.push(SlashingEvent {
            validator_address: address.clone(),
            height,
            reason: SlashReason::DoubleSign,
            amount,
            timestamp: now,
        });

        Ok(())
    }

    /// Release a validator from jail.
    ///
    /// Fails while the jail period runs and always fails for tombstoned
    /// validators.
    pub fn unjail(&self, address: &Address) -> ConsensusResult<()> {
        let mut inner = self.inner.lock();

        let info = inner
            .signing_info
            .get_mut(address)
            .ok_or_else(|| ConsensusError::ValidatorNotFound(address.clone()))?;

        if info.tombstoned {
            return Err(ConsensusError::Tombstoned);
        }

        let now = crate::unix_now();
        if info.jailed_until > now {
            return Err(ConsensusError::StillJailed);
        }
        info.jailed_until = 0;

        let handle = self
            .engine
            .handle(address)
            .ok_or_else(|| ConsensusError::ValidatorNotFound(address.clone()))?;
        handle.write().unjail(now)?;
        self.engine.refresh_active();

        debug!(validator = %address, "validator unjailed");
        Ok(())
    }

    /// Signing history for a validator
    pub fn signing_info(&self, address: &Address) -> Option<SigningInfo> {
        self.inner.lock().signing_info.get(address).cloned()
    }

    /// True when the validator is permanently excluded
    pub fn is_tombstoned(&self, address: &Address) -> bool {
        self.inner
            .lock()
            .signing_info
            .get(address)
            .map(|info| info.tombstoned)
            .unwrap_or(false)
    }

    /// The most recent slashing events, oldest first
    pub fn events(&self, limit: usize) -> Vec<SlashingEvent> {
        let inner = self.inner.lock();
        let events = &inner.events;
        let limit = if limit == 0 || limit > events.len() {
            events.len()
        } else {
            limit
        };
        events[events.len() - limit..].to_vec()
    }
}

impl std::fmt::Debug for SlashingKeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SlashingKeeper")
            .field("tracked", &inner.signing_info.len())
            .field("events", &inner.events.len())
            .finish()
    }
}
