//! SQLite storage implementation
//!
//! A single database file holds the progress record, the fetched players and listings,
//! and pass history, so one `SqliteStore` implements every storage trait.

use crate::client::{Listing, PlayerRecord};
use crate::config::CrawlConfig;
use crate::state::CrawlPosition;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    PassRecorder, ProgressStore, ResultSink, StorageError, StorageResult,
};
use crate::storage::{PassRecord, PersistedState};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// SQLite storage backend
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gets a stored player record with its listings
    pub fn get_player(&self, player_id: u64) -> StorageResult<Option<PlayerRecord>> {
        let conn = self.conn();

        let name: Option<String> = conn
            .query_row(
                "SELECT name FROM players WHERE player_id = ?1",
                params![player_id as i64],
                |row| row.get(0),
            )
            .optional()?;

        let Some(name) = name else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT item_id, item_name, category, price, quantity, market_value
             FROM listings WHERE seller_id = ?1 ORDER BY slot",
        )?;
        let listings = stmt
            .query_map(params![player_id as i64], |row| {
                Ok(Listing {
                    item_id: row.get::<_, i64>(0)? as u64,
                    name: row.get(1)?,
                    category: row.get(2)?,
                    price: row.get::<_, i64>(3)? as u64,
                    quantity: row.get::<_, i64>(4)? as u32,
                    market_value: row.get::<_, i64>(5)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(PlayerRecord {
            player_id,
            name,
            listings,
        }))
    }

    /// Counts stored players
    pub fn count_players(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM players", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Counts stored listings
    pub fn count_listings(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Gets the most recent completed passes, newest first
    pub fn recent_passes(&self, limit: usize) -> StorageResult<Vec<PassRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT started_at, finished_at, ids_scanned, records_found, config_hash
             FROM pass_history ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut passes = Vec::new();
        for row in rows {
            let (started_at, finished_at, ids_scanned, records_found, config_hash) = row?;
            passes.push(PassRecord {
                started_at: parse_timestamp(&started_at)?,
                finished_at: parse_timestamp(&finished_at)?,
                ids_scanned: ids_scanned as u64,
                records_found: records_found as u64,
                config_hash,
            });
        }

        Ok(passes)
    }
}

impl ProgressStore for SqliteStore {
    fn load(&self) -> StorageResult<Option<(CrawlConfig, CrawlPosition)>> {
        let payload: Option<String> = self
            .conn()
            .query_row("SELECT payload FROM crawler_state WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        match payload {
            Some(payload) => {
                let state = PersistedState::decode(&payload)?;
                Ok(Some((state.config, state.position)))
            }
            None => Ok(None),
        }
    }

    fn save(&self, config: &CrawlConfig, position: &CrawlPosition) -> StorageResult<()> {
        let state = PersistedState::new(config.clone(), position.clone());
        let payload = state.encode()?;
        let now = Utc::now().to_rfc3339();

        // A single-row upsert is atomic for concurrent readers
        self.conn().execute(
            "INSERT INTO crawler_state (id, version, payload, updated_at)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                version = excluded.version,
                payload = excluded.payload,
                updated_at = excluded.updated_at",
            params![state.version, payload, now],
        )?;
        Ok(())
    }
}

impl ResultSink for SqliteStore {
    fn upsert(&self, id: u64, record: &PlayerRecord) -> StorageResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO players (player_id, name, listing_count) VALUES (?1, ?2, ?3)
             ON CONFLICT(player_id) DO UPDATE SET
                name = excluded.name,
                listing_count = excluded.listing_count",
            params![id as i64, record.name, record.listings.len() as i64],
        )?;

        // Replace the seller's listings wholesale; slots make the rewrite reproducible
        tx.execute("DELETE FROM listings WHERE seller_id = ?1", params![id as i64])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO listings
                    (seller_id, slot, item_id, item_name, category, price, quantity, market_value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for (slot, listing) in record.listings.iter().enumerate() {
                stmt.execute(params![
                    id as i64,
                    slot as i64,
                    listing.item_id as i64,
                    listing.name,
                    listing.category,
                    listing.price as i64,
                    listing.quantity as i64,
                    listing.market_value as i64,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

impl PassRecorder for SqliteStore {
    fn record_pass(&self, pass: &PassRecord) -> StorageResult<()> {
        self.conn().execute(
            "INSERT INTO pass_history
                (started_at, finished_at, ids_scanned, records_found, config_hash)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                pass.started_at.to_rfc3339(),
                pass.finished_at.to_rfc3339(),
                pass.ids_scanned as i64,
                pass.records_found as i64,
                pass.config_hash,
            ],
        )?;
        Ok(())
    }
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("bad timestamp '{}': {}", value, e)))
}
