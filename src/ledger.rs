/*!
 * The inventory ledger.
 *
 * Supply quantities are the only state shared between planning runs, so every change goes through
 * here. Updates are optimistic: read the value and its version, compute the new value, and commit
 * only if nobody else committed in between. On a conflict the whole read-modify-write is retried,
 * up to a limit.
 */

use crate::{
    error::{ReliefError, ReliefResult},
    resource::{Resource, ResourceKind},
};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

mod memory;
pub use memory::MemoryStore;
mod sqlite;
pub use sqlite::SqliteStore;

/// How many times an update is attempted before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Identifies one stock of supplies, a resource type at a facility.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerKey {
    pub facility_id: String,
    pub resource: ResourceKind,
}

impl LedgerKey {
    pub fn new<S: Into<String>>(facility_id: S, resource: ResourceKind) -> Self {
        LedgerKey {
            facility_id: facility_id.into(),
            resource,
        }
    }
}

impl From<&Resource> for LedgerKey {
    fn from(res: &Resource) -> Self {
        LedgerKey::new(res.facility_id.clone(), res.kind)
    }
}

impl Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{}/{}", self.facility_id, self.resource)
    }
}

/// A quantity and the version it was read at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Versioned {
    pub quantity: u32,
    /// Bumped on every committed write. A key that was never written is at version 0.
    pub version: u64,
}

/// Storage for the ledger.
///
/// Implementations only need a consistent versioned read and an atomic compare-and-swap, the
/// retry discipline lives in [Ledger].
pub trait LedgerStore: Send + Sync {
    /// Read the current value. Keys that don't exist read as quantity 0 at version 0.
    fn read(&self, key: &LedgerKey) -> ReliefResult<Versioned>;

    /// Store `quantity` only if the stored version is still `expected`.
    ///
    /// Returns `false` if somebody else got there first, nothing is written in that case.
    fn compare_and_swap(&self, key: &LedgerKey, expected: u64, quantity: u32)
        -> ReliefResult<bool>;

    /// Store `quantity` regardless of what is there now.
    fn put(&self, key: &LedgerKey, quantity: u32) -> ReliefResult<()>;

    /// Every stored key and quantity, sorted by key.
    fn entries(&self) -> ReliefResult<Vec<(LedgerKey, u32)>>;
}

/// Transactional view of the supply quantities at all facilities.
pub struct Ledger<S> {
    store: S,
    max_attempts: u32,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Ledger {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Set how many times an update is tried before reporting `ConcurrencyExhausted`.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Get access to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The live quantity for a key.
    pub fn read(&self, key: &LedgerKey) -> ReliefResult<u32> {
        Ok(self.store.read(key)?.quantity)
    }

    /// Overwrite the quantity for a key. Returns the new quantity.
    pub fn set(&self, key: &LedgerKey, quantity: u32) -> ReliefResult<u32> {
        self.store.put(key, quantity)?;
        log::debug!("set {} to {}", key, quantity);
        Ok(quantity)
    }

    /// Add to the quantity for a key. Returns the resulting quantity.
    pub fn add(&self, key: &LedgerKey, delta: u32) -> ReliefResult<u32> {
        let (_, after) = self.update(key, "add", |curr| curr.saturating_add(delta))?;
        Ok(after)
    }

    /// Subtract from the quantity for a key, stopping at zero. Returns the resulting quantity.
    pub fn subtract(&self, key: &LedgerKey, delta: u32) -> ReliefResult<u32> {
        let (_, after) = self.update(key, "subtract", |curr| curr.saturating_sub(delta))?;
        Ok(after)
    }

    /// Take up to `wanted` units, as many as are available.
    ///
    /// The amount taken and the decrement are decided in the same transaction, so the caller
    /// never gets credit for units another planner already took. Returns the number of units
    /// taken, which may be zero.
    pub fn reserve(&self, key: &LedgerKey, wanted: u32) -> ReliefResult<u32> {
        let (before, after) = self.update(key, "reserve", |curr| curr.saturating_sub(wanted))?;
        Ok(before - after)
    }

    /// Set the ledger from a snapshot of facility stocks.
    pub fn seed(&self, resources: &[Resource]) -> ReliefResult<()> {
        for res in resources {
            self.set(&LedgerKey::from(res), res.quantity)?;
        }

        log::info!("seeded ledger with {} stocks", resources.len());
        Ok(())
    }

    /// Optimistic read-modify-write. Returns the quantity before and after the update.
    fn update<F>(&self, key: &LedgerKey, op: &'static str, apply: F) -> ReliefResult<(u32, u32)>
    where
        F: Fn(u32) -> u32,
    {
        for attempt in 1..=self.max_attempts {
            let current = self.store.read(key)?;
            let next = apply(current.quantity);

            // Nothing to write, the read itself is the answer.
            if next == current.quantity {
                return Ok((current.quantity, next));
            }

            if self.store.compare_and_swap(key, current.version, next)? {
                log::debug!(
                    "{} on {}: {} -> {} (attempt {})",
                    op,
                    key,
                    current.quantity,
                    next,
                    attempt
                );
                return Ok((current.quantity, next));
            }

            log::debug!("{} on {} conflicted on attempt {}", op, key, attempt);
            std::thread::yield_now();
        }

        log::warn!(
            "{} on {} abandoned after {} attempts",
            op,
            key,
            self.max_attempts
        );

        Err(ReliefError::ConcurrencyExhausted {
            facility_id: key.facility_id.clone(),
            resource: key.resource,
            attempts: self.max_attempts,
        })
    }
}

static_assertions::assert_impl_all!(Ledger<MemoryStore>: Send, Sync);
static_assertions::assert_impl_all!(Ledger<SqliteStore>: Send, Sync);
