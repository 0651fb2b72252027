use super::{LedgerKey, LedgerStore, Versioned};
use crate::{
    error::{ReliefError, ReliefResult},
    resource::ResourceKind,
};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::{path::Path, str::FromStr};

/// A ledger store kept in a SQLite database.
///
/// Several processes may open the same file, the version column keeps their updates from
/// clobbering each other.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open, creating if needed, the ledger database at `path`.
    pub fn connect<P: AsRef<Path>>(path: P) -> ReliefResult<Self> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Self::initialize(conn)
    }

    /// A private database that disappears with the store.
    pub fn open_in_memory() -> ReliefResult<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> ReliefResult<Self> {
        // Writers only hold the lock for a single statement, waiting longer than this means
        // something is stuck.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(include_str!("create_ledger.sql"))?;

        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }
}

impl LedgerStore for SqliteStore {
    fn read(&self, key: &LedgerKey) -> ReliefResult<Versioned> {
        const QUERY: &str = r#"
            SELECT quantity, version FROM inventory
            WHERE facility_id = ?1 AND resource_type = ?2"#;

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(QUERY)?;

        let row = stmt
            .query_row(rusqlite::params![key.facility_id, key.resource.name()], |row| {
                let quantity: u32 = row.get(0)?;
                let version: i64 = row.get(1)?;
                Ok(Versioned {
                    quantity,
                    version: version as u64,
                })
            })
            .optional()?;

        Ok(row.unwrap_or(Versioned {
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
        const INSERT: &str = r#"
            INSERT OR IGNORE INTO inventory (facility_id, resource_type, quantity, version)
            VALUES (?1, ?2, ?3, 1)"#;
        const UPDATE: &str = r#"
            UPDATE inventory SET quantity = ?1, version = version + 1
            WHERE facility_id = ?2 AND resource_type = ?3 AND version = ?4"#;

        let conn = self.conn.lock();

        // Version 0 means the row didn't exist when it was read, so it has to still not exist.
        let changed = if expected == 0 {
            conn.prepare_cached(INSERT)?.execute(rusqlite::params![
                key.facility_id,
                key.resource.name(),
                quantity
            ])?
        } else {
            conn.prepare_cached(UPDATE)?.execute(rusqlite::params![
                quantity,
                key.facility_id,
                key.resource.name(),
                expected as i64
            ])?
        };

        Ok(changed == 1)
    }

    fn put(&self, key: &LedgerKey, quantity: u32) -> ReliefResult<()> {
        const QUERY: &str = r#"
            INSERT INTO inventory (facility_id, resource_type, quantity, version)
            VALUES (?1, ?2, ?3, 1)
            ON CONFLICT (facility_id, resource_type)
            DO UPDATE SET quantity = excluded.quantity, version = version + 1"#;

        let conn = self.conn.lock();
        conn.prepare_cached(QUERY)?.execute(rusqlite::params![
            key.facility_id,
            key.resource.name(),
            quantity
        ])?;

        Ok(())
    }

    fn entries(&self) -> ReliefResult<Vec<(LedgerKey, u32)>> {
        const QUERY: &str = "SELECT facility_id, resource_type, quantity FROM inventory";

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(QUERY)?;

        let rows = stmt.query_map([], |row| {
            let facility_id: String = row.get(0)?;
            let resource: String = row.get(1)?;
            let quantity: u32 = row.get(2)?;
            Ok((facility_id, resource, quantity))
        })?;

        let mut entries = vec![];
        for row in rows {
            let (facility_id, resource, quantity) = row?;
            let resource = ResourceKind::from_str(&resource).map_err(|_| {
                ReliefError::invalid(format!("unknown resource type in ledger: {}", resource))
            })?;

            entries.push((LedgerKey::new(facility_id, resource), quantity));
        }

        entries.sort();
        Ok(entries)
    }
}
