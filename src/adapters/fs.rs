//! Filesystem Adapters
//!
//! On-disk repository used by the CLI:
//!
//! ```text
//! <repo>/
//!   blocks/<cid>     raw canonical bytes, one file per block
//!   pins.json        sorted list of recursively retained roots
//! ```
//!
//! Writes go to a temporary file first and are renamed into place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::node::{Block, ContentId};
use crate::domain::ports::{DagService, RetentionManager};
use crate::error::{Error, Result};

const BLOCKS_DIR: &str = "blocks";
const PINS_FILE: &str = "pins.json";

/// Write `data` to `path` via a sibling temporary file.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp, data).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

// =============================================================================
// Block Store
// =============================================================================

/// Block store keeping one file per block.
#[derive(Debug, Clone)]
pub struct FsDagStore {
    blocks_dir: PathBuf,
}

impl FsDagStore {
    /// Open the block store under `repo`, creating it if needed.
    pub fn open(repo: impl AsRef<Path>) -> Result<Self> {
        let blocks_dir = repo.as_ref().join(BLOCKS_DIR);
        std::fs::create_dir_all(&blocks_dir)?;
        debug!(path = %blocks_dir.display(), "Opened block store");
        Ok(Self { blocks_dir })
    }

    fn path(&self, cid: &ContentId) -> PathBuf {
        self.blocks_dir.join(cid.as_str())
    }
}

#[async_trait]
impl DagService for FsDagStore {
    async fn get(&self, cid: &ContentId) -> Result<Block> {
        let data = match fs::read(self.path(cid)).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::BlockNotFound(cid.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        if !cid.matches(&data) {
            return Err(Error::CorruptBlock {
                cid: cid.clone(),
                reason: "content hash mismatch on disk".to_string(),
            });
        }
        Ok(Block {
            cid: cid.clone(),
            data: Bytes::from(data),
        })
    }

    async fn put(&self, block: Block) -> Result<ContentId> {
        if !block.cid.matches(&block.data) {
            return Err(Error::CorruptBlock {
                cid: block.cid,
                reason: "content hash mismatch".to_string(),
            });
        }
        let path = self.path(&block.cid);
        if !fs::try_exists(&path).await? {
            write_atomic(&path, &block.data).await?;
        }
        Ok(block.cid)
    }

    async fn has(&self, cid: &ContentId) -> Result<bool> {
        Ok(fs::try_exists(self.path(cid)).await?)
    }

    async fn remove(&self, cid: &ContentId) -> Result<()> {
        match fs::remove_file(self.path(cid)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// Pin Set
// =============================================================================

/// Recursive pin set persisted as a JSON list.
#[derive(Debug)]
pub struct FsPinSet {
    path: PathBuf,
    // serialises read-modify-write cycles on the pin file
    lock: Mutex<()>,
}

impl FsPinSet {
    /// Open the pin set under `repo`, creating the repository directory if needed.
    pub fn open(repo: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(repo.as_ref())?;
        Ok(Self {
            path: repo.as_ref().join(PINS_FILE),
            lock: Mutex::new(()),
        })
    }

    async fn load(&self) -> Result<Vec<ContentId>> {
        match fs::read(&self.path).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, mut pins: Vec<ContentId>) -> Result<()> {
        pins.sort();
        pins.dedup();
        write_atomic(&self.path, &serde_json::to_vec_pretty(&pins)?).await
    }
}

#[async_trait]
impl RetentionManager for FsPinSet {
    async fn add_recursive(&self, root: &ContentId) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut pins = self.load().await?;
        if pins.contains(root) {
            return Ok(());
        }
        pins.push(root.clone());
        self.store(pins).await?;
        info!(root = %root, "Pinned");
        Ok(())
    }

    async fn remove_recursive(&self, root: &ContentId) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut pins = self.load().await?;
        let before = pins.len();
        pins.retain(|p| p != root);
        if pins.len() == before {
            return Ok(false);
        }
        self.store(pins).await?;
        info!(root = %root, "Unpinned");
        Ok(true)
    }

    async fn is_retained(&self, root: &ContentId) -> Result<bool> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.contains(root))
    }

    async fn list(&self) -> Result<Vec<ContentId>> {
        let _guard = self.lock.lock().await;
        self.load().await
    }
}
