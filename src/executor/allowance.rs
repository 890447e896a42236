//! Process-local allowance cache
//!
//! Keyed by (owner, token, spender). Entries expire after a TTL; a miss or an
//! expired entry means "ask the chain". Unlimited approvals get a longer TTL.

use alloy_primitives::{Address, U256};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
pub const MAX_ALLOWANCE_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

type Key = (Address, Address, Address);

#[derive(Debug, Clone, Copy)]
struct Entry {
    amount: U256,
    inserted_at: Instant,
    expires_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
    pub max_entries: usize,
    pub default_ttl_secs: u64,
}

pub struct AllowanceCache {
    entries: Mutex<HashMap<Key, Entry>>,
    default_ttl: Duration,
    max_allowance_ttl: Duration,
    max_entries: usize,
}

impl Default for AllowanceCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, MAX_ALLOWANCE_TTL, DEFAULT_MAX_ENTRIES)
    }
}

impl AllowanceCache {
    pub fn new(default_ttl: Duration, max_allowance_ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
            max_allowance_ttl,
            max_entries: max_entries.max(1),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Key, Entry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Record an observed allowance with the default TTL
    pub fn set(&self, owner: Address, token: Address, spender: Address, amount: U256) {
        self.set_with_ttl(owner, token, spender, amount, self.default_ttl);
    }

    /// Record a confirmed approval; `U256::MAX` gets the long TTL
    pub fn record_approval(&self, owner: Address, token: Address, spender: Address, amount: U256) {
        let ttl = if amount == U256::MAX {
            self.max_allowance_ttl
        } else {
            self.default_ttl
        };
        self.set_with_ttl(owner, token, spender, amount, ttl);
    }

    pub fn set_with_ttl(
        &self,
        owner: Address,
        token: Address,
        spender: Address,
        amount: U256,
        ttl: Duration,
    ) {
        let key = (owner, token, spender);
        let now = Instant::now();
        let mut entries = self.entries();

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| *k);
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                debug!("Allowance cache full, evicted oldest entry");
            }
        }

        entries.insert(
            key,
            Entry {
                amount,
                inserted_at: now,
                expires_at: now + ttl,
            },
        );
    }

    /// Cached allowance, `None` on miss or expiry
    pub fn get(&self, owner: Address, token: Address, spender: Address) -> Option<U256> {
        let key = (owner, token, spender);
        let mut entries = self.entries();
        let entry = *entries.get(&key)?;
        if Instant::now() > entry.expires_at {
            entries.remove(&key);
            debug!("Allowance cache expired for {:?}", token);
            return None;
        }
        Some(entry.amount)
    }

    /// `Some(true|false)` from cache, `None` when unknown
    pub fn is_sufficient(
        &self,
        owner: Address,
        token: Address,
        spender: Address,
        required: U256,
    ) -> Option<bool> {
        self.get(owner, token, spender).map(|amount| amount >= required)
    }

    pub fn invalidate(&self, owner: Address, token: Address, spender: Address) {
        if self.entries().remove(&(owner, token, spender)).is_some() {
            debug!("Invalidated allowance cache for {:?}", token);
        }
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Drop expired entries, returning how many were removed
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| now <= e.expires_at);
        before - entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.entries();
        let expired = entries.values().filter(|e| now > e.expires_at).count();
        CacheStats {
            total_entries: entries.len(),
            expired_entries: expired,
            active_entries: entries.len() - expired,
            max_entries: self.max_entries,
            default_ttl_secs: self.default_ttl.as_secs(),
        }
    }
}
