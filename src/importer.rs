//! File Importer
//!
//! Splits a byte stream into fixed-size chunks, stores each as a leaf and
//! builds a balanced tree of interior nodes above them. A single chunk is its
//! own root.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, instrument};

use crate::config::RecoveryConfig;
use crate::domain::node::{ContentId, DagNode, Link};
use crate::domain::ports::DagService;
use crate::error::{Error, Result};

/// Outcome of an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResult {
    pub root: ContentId,
    /// Blocks written, leaves and interior nodes
    pub blocks: usize,
    /// Payload bytes read
    pub bytes: u64,
}

/// Chunking importer
pub struct Importer {
    dag: Arc<dyn DagService>,
    chunk_size: usize,
    max_links: usize,
}

impl std::fmt::Debug for Importer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Importer")
            .field("chunk_size", &self.chunk_size)
            .field("max_links", &self.max_links)
            .finish_non_exhaustive()
    }
}

impl Importer {
    pub fn new(dag: Arc<dyn DagService>, chunk_size: usize, max_links: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".to_string()));
        }
        if max_links < 2 {
            return Err(Error::Config("max_links must be at least 2".to_string()));
        }
        Ok(Self {
            dag,
            chunk_size,
            max_links,
        })
    }

    pub fn from_config(dag: Arc<dyn DagService>, config: &RecoveryConfig) -> Result<Self> {
        Self::new(dag, config.chunk_size, config.max_links)
    }

    /// Import an in-memory buffer.
    pub async fn import_bytes(&self, data: &[u8]) -> Result<ImportResult> {
        self.import_reader(data).await
    }

    /// Import everything `reader` yields.
    #[instrument(skip(self, reader))]
    pub async fn import_reader<R>(&self, mut reader: R) -> Result<ImportResult>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut level: Vec<Link> = Vec::new();
        let mut blocks = 0;
        let mut bytes = 0u64;

        loop {
            let chunk = read_chunk(&mut reader, self.chunk_size).await?;
            if chunk.is_empty() && !level.is_empty() {
                break;
            }
            let last = chunk.len() < self.chunk_size;
            bytes += chunk.len() as u64;

            let block = self.dag.put_node(&DagNode::leaf(chunk)).await?;
            level.push(Link::to_block(level.len().to_string(), &block));
            blocks += 1;
            if last {
                break;
            }
        }

        while level.len() > 1 {
            let mut parents = Vec::with_capacity(level.len().div_ceil(self.max_links));
            for group in level.chunks(self.max_links) {
                let links = group
                    .iter()
                    .enumerate()
                    .map(|(i, l)| Link::new(i.to_string(), l.cid.clone(), l.size))
                    .collect();
                let block = self.dag.put_node(&DagNode::new(Vec::new(), links)).await?;
                parents.push(Link::to_block(parents.len().to_string(), &block));
                blocks += 1;
            }
            level = parents;
        }

        let root = level
            .pop()
            .map(|l| l.cid)
            .ok_or_else(|| Error::Internal("import produced no root".to_string()))?;
        debug!(root = %root, blocks, bytes, "Imported");
        Ok(ImportResult {
            root,
            blocks,
            bytes,
        })
    }
}

/// Read up to `size` bytes, returning fewer only at end of input.
async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R, size: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}
