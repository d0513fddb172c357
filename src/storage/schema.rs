//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the crawler database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Single versioned {config, position} record
CREATE TABLE IF NOT EXISTS crawler_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    payload TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- One row per player that returned a record
CREATE TABLE IF NOT EXISTS players (
    player_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    listing_count INTEGER NOT NULL DEFAULT 0
);

-- Bazaar listings, keyed by seller and position in the seller's bazaar
CREATE TABLE IF NOT EXISTS listings (
    seller_id INTEGER NOT NULL REFERENCES players(player_id),
    slot INTEGER NOT NULL,
    item_id INTEGER NOT NULL,
    item_name TEXT NOT NULL,
    category TEXT NOT NULL,
    price INTEGER NOT NULL,
    quantity INTEGER NOT NULL,
    market_value INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (seller_id, slot)
);

CREATE INDEX IF NOT EXISTS idx_listings_category ON listings(category);
CREATE INDEX IF NOT EXISTS idx_listings_item ON listings(item_id);

-- Completed passes over the ID range
CREATE TABLE IF NOT EXISTS pass_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    ids_scanned INTEGER NOT NULL,
    records_found INTEGER NOT NULL,
    config_hash TEXT NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
