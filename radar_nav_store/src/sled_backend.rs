// Document-store backend on sled.
//
// Each owner gets its own sled tree, and each logical document is one key:
//
//   index                    -> ChunkIndex as JSON
//   chunk:{kind}:{x}:{y}:{z} -> chunk payload
//   paths                    -> {name: [[x, y, z], ...]} as JSON
//   metadata                 -> {key: value} as JSON
//
// Paths and metadata are single documents, so updating one entry rewrites
// the whole document. Both stay small next to chunk payloads.
//
// See also: `sqlite_backend.rs` for the relational layout of the same data.

use crate::backend::{ChunkBackend, MetadataMap, PathMap};
use crate::chunk::{ChunkId, ChunkIndex, ChunkKind};
use crate::error::Result;
use radar_nav_map::WorldPoint;
use std::path::Path;

const INDEX_KEY: &str = "index";
const PATHS_KEY: &str = "paths";
const METADATA_KEY: &str = "metadata";

fn chunk_key(kind: ChunkKind, id: ChunkId) -> String {
    format!("chunk:{kind}:{id}")
}

/// sled-backed document store for one owner.
#[derive(Clone, Debug)]
pub struct SledBackend {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledBackend {
    /// Open (or create) a database at `path` and select `owner`'s tree.
    pub fn open(path: impl AsRef<Path>, owner: &str) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(db, owner)
    }

    /// A throwaway database removed when dropped.
    pub fn temporary(owner: &str) -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, owner)
    }

    /// Use an already-open database; several owners may share one.
    pub fn from_db(db: sled::Db, owner: &str) -> Result<Self> {
        let tree = db.open_tree(owner)?;
        Ok(Self { db, tree })
    }

    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    fn read_json<T: serde::de::DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        match self.tree.get(key)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(T::default()),
        }
    }

    fn write_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.tree.insert(key, serde_json::to_vec(value)?)?;
        Ok(())
    }
}

impl ChunkBackend for SledBackend {
    fn load_index(&self) -> Result<Option<ChunkIndex>> {
        match self.tree.get(INDEX_KEY)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save_index(&self, index: &ChunkIndex) -> Result<()> {
        self.write_json(INDEX_KEY, index)
    }

    fn load_chunk(&self, kind: ChunkKind, id: ChunkId) -> Result<Option<Vec<u8>>> {
        Ok(self.tree.get(chunk_key(kind, id))?.map(|v| v.to_vec()))
    }

    fn save_chunk(&self, kind: ChunkKind, id: ChunkId, payload: &[u8]) -> Result<()> {
        self.tree.insert(chunk_key(kind, id), payload)?;
        Ok(())
    }

    fn delete_chunk(&self, kind: ChunkKind, id: ChunkId) -> Result<()> {
        self.tree.remove(chunk_key(kind, id))?;
        Ok(())
    }

    fn load_paths(&self) -> Result<PathMap> {
        self.read_json(PATHS_KEY)
    }

    fn save_path(&self, name: &str, points: &[WorldPoint]) -> Result<()> {
        let mut paths: PathMap = self.read_json(PATHS_KEY)?;
        paths.insert(name.to_string(), points.to_vec());
        self.write_json(PATHS_KEY, &paths)
    }

    fn load_metadata(&self) -> Result<MetadataMap> {
        self.read_json(METADATA_KEY)
    }

    fn save_metadata_entry(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let mut meta: MetadataMap = self.read_json(METADATA_KEY)?;
        meta.insert(key.to_string(), value.clone());
        self.write_json(METADATA_KEY, &meta)
    }

    fn storage_size(&self) -> Result<u64> {
        let mut total = 0u64;
        for entry in self.tree.iter() {
            let (k, v) = entry?;
            total += (k.len() + v.len()) as u64;
        }
        Ok(total)
    }

    fn flush(&self) -> Result<()> {
        self.tree.flush()?;
        Ok(())
    }
}
