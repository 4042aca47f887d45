//! DAG Walker
//!
//! Drives a [`GroupCodec`] over a whole DAG. Encoding is post-order: every
//! interior node is re-emitted with links to its encoded children and a
//! recovery section whose parity covers those children. Leaves are reused
//! unchanged. Recovery walks the same structure top-down, rebuilding
//! whatever is missing from each group before descending.
//!
//! Coding groups range over a node's distinct children: a block linked from
//! several slots is one group member, so losing it costs the group one share.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::GroupCodec;
use crate::domain::node::{Block, ContentId, DagNode, Link, RecoveryGroup, RecoveryInfo};
use crate::domain::ports::{DagService, ErasureStrategy, RecoveryReport, StrategyKind};
use crate::error::{Error, Result};

/// Fetch a block unless the operation is cancelled first.
async fn fetch(
    dag: &dyn DagService,
    cid: &ContentId,
    cancel: &CancellationToken,
    step: &str,
) -> Result<Block> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled { step: step.to_string() }),
        block = dag.get(cid) => block,
    }
}

/// Fetch a block, mapping absence to `None`.
async fn fetch_optional(
    dag: &dyn DagService,
    cid: &ContentId,
    cancel: &CancellationToken,
) -> Result<Option<Block>> {
    match fetch(dag, cid, cancel, "recovery").await {
        Ok(block) => Ok(Some(block)),
        Err(Error::BlockNotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Bytes of the index tag that prefixes every parity block.
const PARITY_TAG_LEN: usize = 4;

/// Parity block for shard `index` of a group. The tag keeps equal shards in
/// separate blocks so one lost block never costs a group two shares.
fn parity_node(index: usize, shard: &[u8]) -> DagNode {
    let mut data = Vec::with_capacity(PARITY_TAG_LEN + shard.len());
    data.extend_from_slice(&(index as u32).to_be_bytes());
    data.extend_from_slice(shard);
    DagNode::leaf(data)
}

/// Strip and check the index tag of a parity block.
fn parity_shard(block: &Block, index: usize) -> Result<Vec<u8>> {
    let node = DagNode::from_block(block)?;
    let corrupt = |reason: &str| Error::CorruptBlock {
        cid: block.cid.clone(),
        reason: reason.to_string(),
    };
    if node.data.len() < PARITY_TAG_LEN {
        return Err(corrupt("parity block too short"));
    }
    let (tag, shard) = node.data.split_at(PARITY_TAG_LEN);
    if tag != &(index as u32).to_be_bytes()[..] {
        return Err(corrupt("parity index mismatch"));
    }
    Ok(shard.to_vec())
}

/// Children of a node in first-appearance order, one entry per ContentId.
fn distinct_members(links: &[Link]) -> Vec<&Link> {
    let mut seen = HashSet::new();
    links.iter().filter(|l| seen.insert(&l.cid)).collect()
}

/// Generic erasure strategy over a per-group codec.
#[derive(Debug, Clone)]
pub struct DagCodecStrategy<C> {
    codec: C,
}

impl<C: GroupCodec> DagCodecStrategy<C> {
    pub fn new(codec: C) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Compute and store parity for `members`, one recovery group per planned range.
    async fn protect(
        &self,
        dag: &dyn DagService,
        members: &[Bytes],
        recoverability: u32,
    ) -> Result<Vec<RecoveryGroup>> {
        let plan = self.codec.plan_groups(members.len(), recoverability)?;
        let mut groups = Vec::with_capacity(plan.len());

        for range in plan {
            let (shard_len, parity) = self.codec.protect(&members[range.clone()], recoverability)?;
            let mut redundant = Vec::with_capacity(parity.len());
            for (j, shard) in parity.into_iter().enumerate() {
                let block = dag.put_node(&parity_node(j, &shard)).await?;
                redundant.push(Link::to_block(format!("r{}", j), &block));
            }
            groups.push(RecoveryGroup {
                start: range.start,
                len: range.len(),
                shard_len,
                redundant,
            });
        }

        Ok(groups)
    }

    /// Encode an interior node and its subtree, returning the stored block.
    fn encode_node<'a>(
        &'a self,
        dag: &'a dyn DagService,
        node: DagNode,
        recoverability: u32,
        cancel: &'a CancellationToken,
        memo: &'a mut HashMap<ContentId, Block>,
    ) -> BoxFuture<'a, Result<Block>> {
        async move {
            let mut links = Vec::with_capacity(node.links.len());
            let mut members = Vec::with_capacity(node.links.len());
            let mut seen = HashSet::new();

            for link in &node.links {
                let encoded = match memo.get(&link.cid).cloned() {
                    Some(block) => block,
                    None => {
                        let block = fetch(dag, &link.cid, cancel, "encoding").await?;
                        let child = DagNode::from_block(&block)?;
                        let encoded = if child.is_leaf() {
                            block
                        } else {
                            self.encode_node(dag, child, recoverability, cancel, memo)
                                .await?
                        };
                        memo.insert(link.cid.clone(), encoded.clone());
                        encoded
                    }
                };

                links.push(Link::to_block(link.name.clone(), &encoded));
                if seen.insert(encoded.cid.clone()) {
                    members.push(encoded.data);
                }
            }

            let groups = self.protect(dag, &members, recoverability).await?;
            let encoded = DagNode::new(node.data, links).with_recovery(RecoveryInfo {
                strategy: self.codec.kind(),
                recoverability,
                wrapped: false,
                groups,
            });

            dag.put_node(&encoded).await
        }
        .boxed()
    }

    /// Rebuild the missing members and parity of one group.
    async fn repair_group(
        &self,
        dag: &dyn DagService,
        node: &DagNode,
        info: &RecoveryInfo,
        group: &RecoveryGroup,
        cancel: &CancellationToken,
    ) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        let distinct = distinct_members(&node.links);
        let member_links = distinct.get(group.range()).ok_or_else(|| {
            Error::EcReconstructionFailed(format!(
                "group {:?} exceeds {} distinct links",
                group.range(),
                distinct.len()
            ))
        })?;

        let mut members: Vec<Option<Vec<u8>>> = Vec::with_capacity(member_links.len());
        for link in member_links {
            let shard = match fetch_optional(dag, &link.cid, cancel).await? {
                Some(block) => Some(pad(&block.data, group.shard_len, &link.cid)?),
                None => None,
            };
            members.push(shard);
        }

        let mut parity: Vec<Option<Vec<u8>>> = Vec::with_capacity(group.redundant.len());
        for (j, link) in group.redundant.iter().enumerate() {
            let shard = match fetch_optional(dag, &link.cid, cancel).await? {
                Some(block) => Some(parity_shard(&block, j)?),
                None => None,
            };
            parity.push(shard);
        }

        let missing_members: Vec<usize> = (0..members.len())
            .filter(|&i| members[i].is_none())
            .collect();
        let missing_parity: Vec<usize> = (0..parity.len())
            .filter(|&i| parity[i].is_none())
            .collect();
        report.intact =
            members.len() + parity.len() - missing_members.len() - missing_parity.len();

        if missing_members.is_empty() && missing_parity.is_empty() {
            return Ok(report);
        }

        debug!(
            missing_members = missing_members.len(),
            missing_parity = missing_parity.len(),
            "Repairing recovery group"
        );

        let first_lost = missing_members.first().map(|&i| member_links[i].cid.clone());
        self.codec
            .repair(&mut members, &mut parity, info.recoverability)
            .map_err(|e| match (e, first_lost) {
                (e @ Error::InsufficientShards { .. }, Some(cid)) => Error::Unrecoverable {
                    cid,
                    reason: e.to_string(),
                },
                (other, _) => other,
            })?;

        for i in missing_members {
            let link = &member_links[i];
            let shard = members[i].as_ref().ok_or_else(|| Error::Unrecoverable {
                cid: link.cid.clone(),
                reason: "codec left member missing".to_string(),
            })?;
            let size = link.size as usize;
            debug_assert!(size <= shard.len(), "members are never longer than their shard");
            // An oversized link falls through to the content id check below.
            let data = shard.get(..size).unwrap_or(shard.as_slice());
            let block = Block::new(Bytes::copy_from_slice(data));
            if block.cid != link.cid {
                return Err(Error::Unrecoverable {
                    cid: link.cid.clone(),
                    reason: "rebuilt bytes do not match content id".to_string(),
                });
            }
            dag.put(block).await?;
            report.restored.push(link.cid.clone());
        }

        for i in missing_parity {
            let link = &group.redundant[i];
            let Some(shard) = parity[i].take() else {
                warn!(cid = %link.cid, "Parity block could not be rebuilt");
                continue;
            };
            let block = parity_node(i, &shard).to_block()?;
            if block.cid != link.cid {
                return Err(Error::Unrecoverable {
                    cid: link.cid.clone(),
                    reason: "rebuilt parity does not match content id".to_string(),
                });
            }
            dag.put(block).await?;
            report.restored.push(link.cid.clone());
        }

        Ok(report)
    }

    /// Repair an encoded node's groups, then descend into its children.
    fn recover_node<'a>(
        &'a self,
        dag: &'a dyn DagService,
        node: DagNode,
        cancel: &'a CancellationToken,
        visited: &'a mut HashSet<ContentId>,
    ) -> BoxFuture<'a, Result<RecoveryReport>> {
        async move {
            let mut report = RecoveryReport::default();
            let Some(info) = node.recovery.clone() else {
                return Ok(report);
            };
            if info.strategy != self.codec.kind() {
                return Err(Error::EcReconstructionFailed(format!(
                    "node encoded with {} cannot be recovered by {}",
                    info.strategy,
                    self.codec.kind()
                )));
            }

            for group in &info.groups {
                report.merge(self.repair_group(dag, &node, &info, group, cancel).await?);
            }

            for link in &node.links {
                if !visited.insert(link.cid.clone()) {
                    continue;
                }
                let block = fetch(dag, &link.cid, cancel, "recovery").await?;
                let child = DagNode::from_block(&block)?;
                if child.is_encoded() {
                    report.merge(self.recover_node(dag, child, cancel, visited).await?);
                }
            }

            Ok(report)
        }
        .boxed()
    }
}

/// Pad a member block to its group's shard length, rejecting oversized blocks.
fn pad(data: &[u8], shard_len: usize, cid: &ContentId) -> Result<Vec<u8>> {
    crate::ec::encoder::pad_shard(data, shard_len).map_err(|_| Error::CorruptBlock {
        cid: cid.clone(),
        reason: format!("{} bytes exceed group shard length {}", data.len(), shard_len),
    })
}

#[async_trait]
impl<C: GroupCodec> ErasureStrategy for DagCodecStrategy<C> {
    fn kind(&self) -> StrategyKind {
        self.codec.kind()
    }

    fn tolerated_losses(&self, recoverability: u32, group_len: usize) -> usize {
        self.codec.tolerated_losses(recoverability, group_len)
    }

    #[instrument(skip(self, dag, root, cancel), fields(strategy = %self.codec.kind()))]
    async fn encode(
        &self,
        dag: &dyn DagService,
        root: &DagNode,
        recoverability: u32,
        cancel: &CancellationToken,
    ) -> Result<DagNode> {
        if recoverability == 0 {
            return Err(Error::InvalidRecoverability(recoverability));
        }

        let mut memo = HashMap::new();
        let block = if root.is_leaf() {
            // A lone leaf has no parent to protect it, so wrap it in one.
            let leaf = root.to_block()?;
            let links = vec![Link::to_block("", &leaf)];
            let groups = self
                .protect(dag, std::slice::from_ref(&leaf.data), recoverability)
                .await?;
            let wrapper = DagNode::new(Vec::new(), links).with_recovery(RecoveryInfo {
                strategy: self.codec.kind(),
                recoverability,
                wrapped: true,
                groups,
            });
            dag.put_node(&wrapper).await?
        } else {
            self.encode_node(dag, root.clone(), recoverability, cancel, &mut memo)
                .await?
        };

        debug!(
            encoded = %block.cid,
            reused = memo.len(),
            "Encoded DAG"
        );
        DagNode::from_block(&block)
    }

    #[instrument(skip(self, dag, cancel), fields(strategy = %self.codec.kind()))]
    async fn recover(
        &self,
        dag: &dyn DagService,
        root: &ContentId,
        cancel: &CancellationToken,
    ) -> Result<RecoveryReport> {
        let node = DagNode::from_block(&fetch(dag, root, cancel, "recovery").await?)?;
        if !node.is_encoded() {
            return Err(Error::EcReconstructionFailed(format!(
                "{} is not an encoded root",
                root
            )));
        }

        let mut visited = HashSet::new();
        visited.insert(root.clone());
        self.recover_node(dag, node, cancel, &mut visited).await
    }
}
