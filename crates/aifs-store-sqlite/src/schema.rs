//! SQL schema for the AIFS SQLite metadata store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! schema revision so later migrations can be gated on it.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Asset records. Rows are never updated except to set deleted_at.
CREATE TABLE IF NOT EXISTS assets (
    asset_id       TEXT PRIMARY KEY,   -- hex content hash
    kind           TEXT NOT NULL,
    size           INTEGER NOT NULL,
    hash_algorithm TEXT NOT NULL,      -- 'sha256' | 'blake3'
    embedding      BLOB,               -- little-endian f32 array or NULL
    metadata       TEXT NOT NULL DEFAULT '{}',
    created_at     TEXT NOT NULL,      -- RFC 3339 UTC; server-assigned
    deleted_at     TEXT                -- tombstone; NULL while live
);

-- Lineage edges, parent -> child. rowid preserves submission order.
CREATE TABLE IF NOT EXISTS relationships (
    relationship_id  TEXT PRIMARY KEY,
    parent_id        TEXT NOT NULL REFERENCES assets(asset_id),
    child_id         TEXT NOT NULL REFERENCES assets(asset_id),
    kind             TEXT NOT NULL DEFAULT 'derived',
    transform_name   TEXT NOT NULL,
    transform_digest TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    metadata         TEXT NOT NULL DEFAULT '{}',
    CHECK (parent_id != child_id)
);

-- Snapshots are strictly append-only.
CREATE TABLE IF NOT EXISTS snapshots (
    snapshot_id TEXT PRIMARY KEY,
    namespace   TEXT NOT NULL,
    merkle_root TEXT NOT NULL,
    signature   TEXT NOT NULL,
    signer      TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    expires_at  TEXT,
    metadata    TEXT NOT NULL DEFAULT '{}'
);

-- Leaf order of each snapshot. No foreign key to assets: expired snapshots
-- may outlive the assets they list.
CREATE TABLE IF NOT EXISTS snapshot_assets (
    snapshot_id TEXT NOT NULL REFERENCES snapshots(snapshot_id),
    position    INTEGER NOT NULL,
    asset_id    TEXT NOT NULL,
    PRIMARY KEY (snapshot_id, position)
);

CREATE INDEX IF NOT EXISTS assets_kind_idx          ON assets(kind);
CREATE INDEX IF NOT EXISTS assets_created_idx       ON assets(created_at);
CREATE INDEX IF NOT EXISTS relationships_parent_idx ON relationships(parent_id);
CREATE INDEX IF NOT EXISTS relationships_child_idx  ON relationships(child_id);
CREATE INDEX IF NOT EXISTS snapshots_namespace_idx  ON snapshots(namespace);
CREATE INDEX IF NOT EXISTS snapshot_assets_idx      ON snapshot_assets(asset_id);

PRAGMA user_version = 1;
";
