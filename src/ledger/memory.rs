use super::{LedgerKey, LedgerStore, Versioned};
use crate::error::ReliefResult;
use parking_lot::Mutex;
use rustc_hash::FxHashMap as HashMap;

/// A ledger store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    stocks: Mutex<HashMap<LedgerKey, Versioned>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryStore {
    fn read(&self, key: &LedgerKey) -> ReliefResult<Versioned> {
        Ok(self.stocks.lock().get(key).copied().unwrap_or(Versioned {
            quantity: 0,
            version: 0,
        }))
    }

    fn compare_and_swap(
        &self,
        key: &LedgerKey,
        expected: u64,
        quantity: u32,
    ) -> ReliefResult<bool> {
        let mut stocks = self.stocks.lock();

        let current = stocks.get(key).map(|v| v.version).unwrap_or(0);
        if current != expected {
            return Ok(false);
        }

        stocks.insert(
            key.clone(),
            Versioned {
                quantity,
                version: current + 1,
            },
        );

        Ok(true)
    }

    fn put(&self, key: &LedgerKey, quantity: u32) -> ReliefResult<()> {
        let mut stocks = self.stocks.lock();
        let entry = stocks.entry(key.clone()).or_insert(Versioned {
            quantity: 0,
            version: 0,
        });

        entry.quantity = quantity;
        entry.version += 1;

        Ok(())
    }

    fn entries(&self) -> ReliefResult<Vec<(LedgerKey, u32)>> {
        let mut entries: Vec<_> = self
            .stocks
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.quantity))
            .collect();

        entries.sort();
        Ok(entries)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resource::ResourceKind;

    #[test]
    fn test_versions() {
        let store = MemoryStore::new();
        let key = LedgerKey::new("wh-1", ResourceKind::Food);

        assert_eq!(
            store.read(&key).unwrap(),
            Versioned {
                quantity: 0,
                version: 0
            }
        );

        assert!(store.compare_and_swap(&key, 0, 10).unwrap());
        assert!(!store.compare_and_swap(&key, 0, 20).unwrap());
        assert_eq!(store.read(&key).unwrap().quantity, 10);

        store.put(&key, 5).unwrap();
        let v = store.read(&key).unwrap();
        assert_eq!(v.quantity, 5);
        assert_eq!(v.version, 2);

        // A put invalidates anybody who read before it.
        assert!(!store.compare_and_swap(&key, 1, 0).unwrap());
        assert!(store.compare_and_swap(&key, 2, 0).unwrap());
    }
}
