// Relational backend on SQLite.
//
// Four tables mirror the four logical documents, plus one row of store
// info for the chunk size:
//
//   store_info(key PRIMARY KEY, value)
//   chunk_index(kind, chunk_id)          PRIMARY KEY (kind, chunk_id)
//   chunks(kind, chunk_id, payload)      PRIMARY KEY (kind, chunk_id)
//   paths(name PRIMARY KEY, payload)
//   metadata(key PRIMARY KEY, value)
//
// Index rewrites run in one transaction so a crash never leaves a half
// written index. The connection runs in WAL mode on disk so readers in
// other processes do not block the writer.
//
// See also: `sled_backend.rs` for the document layout of the same data.

use crate::backend::{ChunkBackend, MetadataMap, PathMap};
use crate::chunk::{ChunkId, ChunkIndex, ChunkKind};
use crate::error::{Result, StoreError};
use radar_nav_map::WorldPoint;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS store_info (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS chunk_index (
        kind     TEXT NOT NULL,
        chunk_id TEXT NOT NULL,
        PRIMARY KEY (kind, chunk_id)
    );
    CREATE TABLE IF NOT EXISTS chunks (
        kind     TEXT NOT NULL,
        chunk_id TEXT NOT NULL,
        payload  BLOB NOT NULL,
        PRIMARY KEY (kind, chunk_id)
    );
    CREATE TABLE IF NOT EXISTS paths (
        name    TEXT PRIMARY KEY,
        payload TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS metadata (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
"#;

/// SQLite-backed store for one owner (one database file).
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        // Journal mode is advisory; some file systems refuse WAL.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Self::with_connection(conn)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

impl ChunkBackend for SqliteBackend {
    fn load_index(&self) -> Result<Option<ChunkIndex>> {
        let chunk_size: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM store_info WHERE key = 'chunk_size'",
                [],
                |r| r.get(0),
            )
            .optional()?;
        let Some(chunk_size) = chunk_size else {
            return Ok(None);
        };
        let chunk_size: f64 = chunk_size
            .parse()
            .map_err(|_| StoreError::InvalidConfig(format!("stored chunk size {chunk_size:?}")))?;

        let mut index = ChunkIndex::new(chunk_size);
        let mut st = self.conn.prepare("SELECT kind, chunk_id FROM chunk_index")?;
        let rows = st.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;
        for row in rows {
            let (kind, id) = row?;
            let kind: ChunkKind = kind.parse()?;
            index.ids_mut(kind).insert(id.parse()?);
        }
        Ok(Some(index))
    }

    fn save_index(&self, index: &ChunkIndex) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO store_info (key, value) VALUES ('chunk_size', ?1)",
            [index.chunk_size.to_string()],
        )?;
        tx.execute("DELETE FROM chunk_index", [])?;
        {
            let mut insert =
                tx.prepare("INSERT INTO chunk_index (kind, chunk_id) VALUES (?1, ?2)")?;
            for kind in ChunkKind::ALL {
                for id in index.ids(kind) {
                    insert.execute(params![kind.as_str(), id.to_string()])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_chunk(&self, kind: ChunkKind, id: ChunkId) -> Result<Option<Vec<u8>>> {
        Ok(self
            .conn
            .query_row(
                "SELECT payload FROM chunks WHERE kind = ?1 AND chunk_id = ?2",
                params![kind.as_str(), id.to_string()],
                |r| r.get(0),
            )
            .optional()?)
    }

    fn save_chunk(&self, kind: ChunkKind, id: ChunkId, payload: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO chunks (kind, chunk_id, payload) VALUES (?1, ?2, ?3)",
            params![kind.as_str(), id.to_string(), payload],
        )?;
        Ok(())
    }

    fn delete_chunk(&self, kind: ChunkKind, id: ChunkId) -> Result<()> {
        self.conn.execute(
            "DELETE FROM chunks WHERE kind = ?1 AND chunk_id = ?2",
            params![kind.as_str(), id.to_string()],
        )?;
        Ok(())
    }

    fn load_paths(&self) -> Result<PathMap> {
        let mut st = self.conn.prepare("SELECT name, payload FROM paths")?;
        let rows = st.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;
        let mut paths = PathMap::new();
        for row in rows {
            let (name, payload) = row?;
            paths.insert(name, serde_json::from_str(&payload)?);
        }
        Ok(paths)
    }

    fn save_path(&self, name: &str, points: &[WorldPoint]) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO paths (name, payload) VALUES (?1, ?2)",
            params![name, serde_json::to_string(points)?],
        )?;
        Ok(())
    }

    fn load_metadata(&self) -> Result<MetadataMap> {
        let mut st = self.conn.prepare("SELECT key, value FROM metadata")?;
        let rows = st.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;
        let mut meta = MetadataMap::new();
        for row in rows {
            let (key, value) = row?;
            meta.insert(key, serde_json::from_str(&value)?);
        }
        Ok(meta)
    }

    fn save_metadata_entry(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value.to_string()],
        )?;
        Ok(())
    }

    fn storage_size(&self) -> Result<u64> {
        let total: i64 = self.conn.query_row(
            "SELECT
                (SELECT COALESCE(SUM(LENGTH(key) + LENGTH(value)), 0) FROM store_info)
              + (SELECT COALESCE(SUM(LENGTH(kind) + LENGTH(chunk_id)), 0) FROM chunk_index)
              + (SELECT COALESCE(SUM(LENGTH(kind) + LENGTH(chunk_id) + LENGTH(payload)), 0)
                 FROM chunks)
              + (SELECT COALESCE(SUM(LENGTH(name) + LENGTH(payload)), 0) FROM paths)
              + (SELECT COALESCE(SUM(LENGTH(key) + LENGTH(value)), 0) FROM metadata)",
            [],
            |r| r.get(0),
        )?;
        Ok(total.max(0) as u64)
    }

    fn flush(&self) -> Result<()> {
        // Every statement autocommits; nothing is buffered.
        Ok(())
    }
}
