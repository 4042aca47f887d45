//! Link-Walking Path Resolver
//!
//! Resolves `<cid>`, `/ipfs/<cid>` and `<cid>/<name>/<name>...` by following
//! named links from the root block.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::node::ContentId;
use crate::domain::ports::{DagService, PathResolver, ResolvedRoot};
use crate::error::{Error, Result};

const IPFS_PREFIX: &str = "/ipfs/";

/// Path resolver over a DAG service.
#[derive(Clone)]
pub struct LinkPathResolver {
    dag: Arc<dyn DagService>,
}

impl std::fmt::Debug for LinkPathResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkPathResolver").finish_non_exhaustive()
    }
}

impl LinkPathResolver {
    pub fn new(dag: Arc<dyn DagService>) -> Self {
        Self { dag }
    }
}

/// Split a path into its root identifier and the link names below it.
pub fn parse_path(path: &str) -> Result<(ContentId, Vec<&str>)> {
    let invalid = |reason: &str| Error::Resolution {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = path.trim();
    let rest = trimmed
        .strip_prefix(IPFS_PREFIX)
        .unwrap_or_else(|| trimmed.trim_start_matches('/'));
    let mut segments = rest.split('/').filter(|s| !s.is_empty());

    let root = segments.next().ok_or_else(|| invalid("empty path"))?;
    let cid: ContentId = root
        .parse()
        .map_err(|_| invalid(&format!("'{}' is not a content id", root)))?;
    Ok((cid, segments.collect()))
}

#[async_trait]
impl PathResolver for LinkPathResolver {
    async fn resolve(&self, path: &str, cancel: &CancellationToken) -> Result<ResolvedRoot> {
        let (mut cid, names) = parse_path(path)?;
        let not_found = |reason: String| Error::Resolution {
            path: path.to_string(),
            reason,
        };

        let mut depth = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled {
                    step: "resolving".to_string(),
                });
            }
            let node = match self.dag.get_node(&cid).await {
                Ok(node) => node,
                Err(Error::BlockNotFound(_)) => {
                    return Err(not_found(format!("block {} not found", cid)))
                }
                Err(e) => return Err(not_found(e.to_string())),
            };

            let Some(name) = names.get(depth) else {
                debug!(path, root = %cid, "Resolved path");
                return Ok(ResolvedRoot { cid, node });
            };
            cid = node
                .link(name)
                .map(|l| l.cid.clone())
                .ok_or_else(|| not_found(format!("no link named '{}' under {}", name, cid)))?;
            depth += 1;
        }
    }
}
