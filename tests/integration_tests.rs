//! Integration Tests
//!
//! End-to-end tests of the encode pipeline: scenarios, retention safety,
//! strategy gating and loss recovery.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use dagrecovery::adapters::{
    FsDagStore, FsPinSet, InMemoryEventCollector, LinkPathResolver, MemoryDagStore, MemoryPinSet,
};
use dagrecovery::domain::events::DomainEvent;
use dagrecovery::domain::node::{Block, ContentId, DagNode, Link};
use dagrecovery::domain::ports::{
    DagService, ErasureStrategy, PathResolver, RecoveryReport, ResolvedRoot, RetentionManager,
    StrategyKind,
};
use dagrecovery::importer::Importer;
use dagrecovery::strategy::{DagCodecStrategy, ReedSolomonCodec, StrategyRegistry};
use dagrecovery::{EncodeOrchestrator, EncodeRequest, Error, RecoveryConfig, Result};

// =============================================================================
// Fixtures
// =============================================================================

struct Repo {
    dag: Arc<MemoryDagStore>,
    pins: Arc<MemoryPinSet>,
    events: Arc<InMemoryEventCollector>,
    orchestrator: EncodeOrchestrator,
}

fn repo() -> Repo {
    let dag = Arc::new(MemoryDagStore::new());
    let pins = Arc::new(MemoryPinSet::new());
    let events = Arc::new(InMemoryEventCollector::new());
    let resolver = Arc::new(LinkPathResolver::new(dag.clone()));
    let orchestrator =
        EncodeOrchestrator::new(dag.clone(), resolver, pins.clone(), RecoveryConfig::default())
            .expect("Failed to build orchestrator")
            .with_events(events.clone());
    Repo {
        dag,
        pins,
        events,
        orchestrator,
    }
}

/// Import `data` with small chunks and pin it, returning the root.
async fn add(repo: &Repo, data: &[u8]) -> ContentId {
    let importer = Importer::new(repo.dag.clone(), 8, 4).expect("Failed to build importer");
    let root = importer
        .import_bytes(data)
        .await
        .expect("Failed to import")
        .root;
    repo.pins
        .add_recursive(&root)
        .await
        .expect("Failed to pin");
    root
}

/// Leaf payloads below `root`, in order.
async fn read_file(dag: &dyn DagService, root: &ContentId) -> Vec<u8> {
    let mut out = Vec::new();
    let mut stack = vec![root.clone()];
    while let Some(cid) = stack.pop() {
        let node = dag.get_node(&cid).await.expect("Missing block");
        if node.is_leaf() {
            out.extend_from_slice(&node.data);
        } else {
            stack.extend(node.links.iter().rev().map(|l| l.cid.clone()));
        }
    }
    out
}

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

// =============================================================================
// Scenarios
// =============================================================================

mod scenario_tests {
    use super::*;

    /// Single-leaf DAG "hello", recoverability 3, reed-solomon.
    #[tokio::test]
    async fn test_single_block_dag() {
        let repo = repo();
        let leaf = repo
            .dag
            .put_node(&DagNode::leaf(b"hello".to_vec()))
            .await
            .unwrap();
        repo.pins.add_recursive(&leaf.cid).await.unwrap();

        let result = repo
            .orchestrator
            .encode(
                EncodeRequest::new(leaf.cid.to_string())
                    .recoverability(3)
                    .strategy("reed-solomon"),
                &CancellationToken::new(),
            )
            .await
            .expect("Encode failed");

        assert_ne!(result.encoded_root, leaf.cid);
        assert_eq!(result.original_root, leaf.cid);
        assert_eq!(repo.pins.list().await.unwrap(), vec![result.encoded_root.clone()]);

        // the leaf survives from any one of its four shares
        let encoded = repo.dag.get_node(&result.encoded_root).await.unwrap();
        let info = encoded.recovery.clone().unwrap();
        assert!(info.wrapped);
        repo.dag.remove(&leaf.cid).await.unwrap();
        repo.dag.remove(&info.groups[0].redundant[0].cid).await.unwrap();
        repo.dag.remove(&info.groups[0].redundant[2].cid).await.unwrap();

        let report = repo
            .orchestrator
            .recover(&result.encoded_root, &CancellationToken::new())
            .await
            .expect("Recover failed");
        assert_eq!(report.restored.len(), 3);
        assert_eq!(
            repo.dag.get_node(&leaf.cid).await.unwrap(),
            DagNode::leaf(b"hello".to_vec())
        );
    }

    /// Path that resolves to nothing.
    #[tokio::test]
    async fn test_unresolvable_path() {
        let repo = repo();
        let root = add(&repo, b"some content").await;
        let before = repo.dag.len();
        let missing = ContentId::for_bytes(b"never added");

        let err = repo
            .orchestrator
            .encode(
                EncodeRequest::new(format!("/ipfs/{}", missing)),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_matches!(err, Error::Resolution { ref path, .. } if path.contains(missing.as_str()));
        assert_eq!(repo.dag.len(), before);
        assert_eq!(repo.pins.list().await.unwrap(), vec![root]);
    }

    /// A block read fails halfway through the walk.
    #[tokio::test]
    async fn test_io_failure_mid_traversal() {
        let inner = Arc::new(MemoryDagStore::new());
        let importer = Importer::new(inner.clone(), 8, 4).unwrap();
        let root = importer.import_bytes(&sample(200)).await.unwrap().root;
        let victim = inner
            .get_node(&root)
            .await
            .unwrap()
            .links
            .last()
            .unwrap()
            .cid
            .clone();

        let dag = Arc::new(FlakyDag {
            inner,
            broken: victim,
        });
        let pins = Arc::new(MemoryPinSet::with_pins([root.clone()]));
        let resolver = Arc::new(LinkPathResolver::new(dag.clone()));
        let orchestrator =
            EncodeOrchestrator::new(dag, resolver, pins.clone(), RecoveryConfig::default())
                .unwrap();

        let err = orchestrator
            .encode(
                EncodeRequest::new(root.to_string()).strategy("entangle"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_matches!(
            err,
            Error::Encoding { ref strategy, root: ref failed, ref source }
                if strategy == "entangle" && *failed == root && matches!(**source, Error::Io(_))
        );
        assert_eq!(pins.list().await.unwrap(), vec![root]);
    }

    struct FlakyDag {
        inner: Arc<MemoryDagStore>,
        broken: ContentId,
    }

    #[async_trait]
    impl DagService for FlakyDag {
        async fn get(&self, cid: &ContentId) -> Result<Block> {
            if *cid == self.broken {
                return Err(Error::Io(std::io::Error::other("checksum error on read")));
            }
            self.inner.get(cid).await
        }

        async fn put(&self, block: Block) -> Result<ContentId> {
            self.inner.put(block).await
        }

        async fn has(&self, cid: &ContentId) -> Result<bool> {
            self.inner.has(cid).await
        }

        async fn remove(&self, cid: &ContentId) -> Result<()> {
            self.inner.remove(cid).await
        }
    }
}

// =============================================================================
// Retention Safety
// =============================================================================

mod retention_tests {
    use super::*;

    /// Strategy that always fails after touching the DAG.
    struct BrokenStrategy;

    #[async_trait]
    impl ErasureStrategy for BrokenStrategy {
        fn kind(&self) -> StrategyKind {
            StrategyKind::ReedSolomon
        }

        fn tolerated_losses(&self, recoverability: u32, _group_len: usize) -> usize {
            recoverability as usize
        }

        async fn encode(
            &self,
            dag: &dyn DagService,
            root: &DagNode,
            _recoverability: u32,
            _cancel: &CancellationToken,
        ) -> Result<DagNode> {
            dag.put_node(&DagNode::leaf(b"half-written".to_vec())).await?;
            Err(Error::EcEncodingFailed(format!(
                "gave up on {} links",
                root.links.len()
            )))
        }

        async fn recover(
            &self,
            _dag: &dyn DagService,
            _root: &ContentId,
            _cancel: &CancellationToken,
        ) -> Result<RecoveryReport> {
            Ok(RecoveryReport::default())
        }
    }

    #[tokio::test]
    async fn test_no_premature_loss() {
        let repo = repo();
        let root = add(&repo, &sample(100)).await;
        let mut registry = StrategyRegistry::new();
        registry.register("broken", Arc::new(BrokenStrategy));
        let orchestrator = EncodeOrchestrator::new(
            repo.dag.clone(),
            Arc::new(LinkPathResolver::new(repo.dag.clone())),
            repo.pins.clone(),
            RecoveryConfig::default(),
        )
        .unwrap()
        .with_registry(registry);

        let err = orchestrator
            .encode(
                EncodeRequest::new(root.to_string()).strategy("broken"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_matches!(err, Error::Encoding { .. });
        assert!(!err.is_retryable_swap());
        assert!(repo.pins.is_retained(&root).await.unwrap());

        // nothing the failed encode wrote survives a collection, the original does
        repo.dag.collect_garbage(&*repo.pins).await.unwrap();
        assert_eq!(read_file(&*repo.dag, &root).await, sample(100));
    }

    #[tokio::test]
    async fn test_strategy_gating() {
        struct Tripwire(AtomicUsize);

        #[async_trait]
        impl PathResolver for Tripwire {
            async fn resolve(&self, path: &str, _cancel: &CancellationToken) -> Result<ResolvedRoot> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(Error::Resolution {
                    path: path.to_string(),
                    reason: "should not be called".to_string(),
                })
            }
        }

        let dag = Arc::new(MemoryDagStore::new());
        let pins = Arc::new(MemoryPinSet::new());
        let resolver = Arc::new(Tripwire(AtomicUsize::new(0)));
        let orchestrator = EncodeOrchestrator::new(
            dag.clone(),
            resolver.clone(),
            pins.clone(),
            RecoveryConfig::default(),
        )
        .unwrap();

        for name in ["", "reedsolomon", "Entangle", "xor"] {
            let err = orchestrator
                .encode(
                    EncodeRequest::new("/ipfs/anything").strategy(name),
                    &CancellationToken::new(),
                )
                .await
                .unwrap_err();
            assert_matches!(err, Error::UnknownStrategy(ref n) if n == name);
        }

        assert_eq!(resolver.0.load(Ordering::SeqCst), 0);
        assert!(dag.is_empty());
        assert!(pins.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_after_swap_failure_is_idempotent() {
        let repo = repo();
        let root = add(&repo, &sample(64)).await;

        // what a crashed swap leaves behind: encoded and retained, original still pinned
        let strategy = repo.orchestrator.registry().get("reed-solomon").unwrap();
        let original = repo.dag.get_node(&root).await.unwrap();
        let encoded = strategy
            .encode(&*repo.dag, &original, 2, &CancellationToken::new())
            .await
            .unwrap()
            .cid()
            .unwrap();
        repo.pins.add_recursive(&encoded).await.unwrap();

        for attempt in 0..3 {
            let was_retained = repo
                .orchestrator
                .swap_retention(&encoded, &root)
                .await
                .expect("Retry failed");
            assert_eq!(was_retained, attempt == 0);
            assert_eq!(repo.pins.list().await.unwrap(), vec![encoded.clone()]);
        }

        assert_eq!(repo.events.events_of_type("RetentionSwapped").len(), 3);
    }

    #[tokio::test]
    async fn test_only_original_root_unpinned() {
        let repo = repo();
        let first = add(&repo, b"first file contents").await;
        let second = add(&repo, b"second file contents").await;

        let result = repo
            .orchestrator
            .encode(EncodeRequest::new(first.to_string()), &CancellationToken::new())
            .await
            .unwrap();

        let pins = repo.pins.list().await.unwrap();
        assert!(pins.contains(&second));
        assert!(pins.contains(&result.encoded_root));
        assert!(!pins.contains(&first));
    }

    #[tokio::test]
    async fn test_cancellation_leaves_retention_intact() {
        let repo = repo();
        let root = add(&repo, &sample(300)).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = repo
            .orchestrator
            .encode(EncodeRequest::new(root.to_string()), &cancel)
            .await
            .unwrap_err();

        assert_matches!(err, Error::Cancelled { .. });
        assert_eq!(repo.pins.list().await.unwrap(), vec![root]);
        let failed = repo.events.events_of_type("EncodeFailed");
        assert_matches!(
            &failed[..],
            [DomainEvent::EncodeFailed { error_kind, .. }] if error_kind == "cancelled"
        );
    }
}

// =============================================================================
// Recovery
// =============================================================================

mod recovery_tests {
    use super::*;

    /// Encode, drop `lose` leaves from the first coding group, then recover.
    async fn roundtrip(strategy: &str, recoverability: u32, lose: usize) -> Result<RecoveryReport> {
        let repo = repo();
        let data = sample(120);
        let root = add(&repo, &data).await;

        let result = repo
            .orchestrator
            .encode(
                EncodeRequest::new(root.to_string())
                    .strategy(strategy)
                    .recoverability(recoverability),
                &CancellationToken::new(),
            )
            .await?;

        let encoded = repo.dag.get_node(&result.encoded_root).await?;
        let first_child = repo.dag.get_node(&encoded.links[0].cid).await?;
        for link in first_child.links.iter().take(lose) {
            repo.dag.remove(&link.cid).await?;
        }

        let report = repo
            .orchestrator
            .recover(&result.encoded_root, &CancellationToken::new())
            .await?;
        assert_eq!(read_file(&*repo.dag, &result.encoded_root).await, data);
        Ok(report)
    }

    #[tokio::test]
    async fn test_reed_solomon_roundtrip() {
        let report = roundtrip("reed-solomon", 2, 2).await.unwrap();
        assert_eq!(report.restored.len(), 2);
    }

    #[tokio::test]
    async fn test_entanglement_roundtrip() {
        let report = roundtrip("entangle", 3, 3).await.unwrap();
        assert_eq!(report.restored.len(), 3);
    }

    #[tokio::test]
    async fn test_too_many_losses() {
        let err = roundtrip("reed-solomon", 1, 2).await.unwrap_err();
        assert_matches!(err, Error::Unrecoverable { .. });
    }

    #[tokio::test]
    async fn test_lost_interior_node() {
        let repo = repo();
        let data = sample(200);
        let root = add(&repo, &data).await;
        let result = repo
            .orchestrator
            .encode(EncodeRequest::new(root.to_string()), &CancellationToken::new())
            .await
            .unwrap();

        // drop an encoded interior node together with its first child
        let encoded = repo.dag.get_node(&result.encoded_root).await.unwrap();
        let interior = encoded.links[1].cid.clone();
        let grandchild = repo.dag.get_node(&interior).await.unwrap().links[0].cid.clone();
        repo.dag.remove(&interior).await.unwrap();
        repo.dag.remove(&grandchild).await.unwrap();

        let report = repo
            .orchestrator
            .recover(&result.encoded_root, &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.restored.contains(&interior));
        assert!(report.restored.contains(&grandchild));
        assert_eq!(read_file(&*repo.dag, &result.encoded_root).await, data);
    }

    #[tokio::test]
    async fn test_repeated_chunk_is_one_group_member() {
        let repo = repo();
        let mut data = vec![0u8; 64];
        data.extend_from_slice(b"tail");
        let importer = Importer::new(repo.dag.clone(), 16, 8).expect("Failed to build importer");
        let root = importer.import_bytes(&data).await.unwrap().root;
        repo.pins.add_recursive(&root).await.unwrap();

        let result = repo
            .orchestrator
            .encode(
                EncodeRequest::new(root.to_string())
                    .strategy("reed-solomon")
                    .recoverability(3),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        // four links share the zero chunk, so the group holds two members
        let encoded = repo.dag.get_node(&result.encoded_root).await.unwrap();
        assert_eq!(encoded.links.len(), 5);
        let groups = encoded.recovery.as_ref().unwrap().groups.clone();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len, 2);

        let zeros = encoded.links[0].cid.clone();
        repo.dag.remove(&zeros).await.unwrap();

        let report = repo
            .orchestrator
            .recover(&result.encoded_root, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.restored, vec![zeros]);
        assert_eq!(read_file(&*repo.dag, &result.encoded_root).await, data);
    }

    /// Redundancy monotonicity: with group size G, raising recoverability
    /// never shrinks the set of survivable loss patterns.
    #[tokio::test]
    async fn test_reed_solomon_monotonic() {
        const G: usize = 4;
        let strategy = DagCodecStrategy::new(ReedSolomonCodec::new(G));

        let mut previous = 0;
        for r in 1..=3u32 {
            let tolerated = strategy.tolerated_losses(r, G);
            assert!(tolerated >= previous);
            previous = tolerated;

            for lost in 0..=tolerated {
                let dag = MemoryDagStore::new();
                let mut links = Vec::new();
                for i in 0..G {
                    let block = dag
                        .put_node(&DagNode::leaf(format!("member-{}-{}", r, i).into_bytes()))
                        .await
                        .unwrap();
                    links.push(Link::to_block(i.to_string(), &block));
                }
                let encoded = strategy
                    .encode(&dag, &DagNode::new(Vec::new(), links.clone()), r, &CancellationToken::new())
                    .await
                    .unwrap();
                let encoded_root = encoded.cid().unwrap();
                for link in links.iter().take(lost) {
                    dag.remove(&link.cid).await.unwrap();
                }

                let report = strategy
                    .recover(&dag, &encoded_root, &CancellationToken::new())
                    .await
                    .unwrap_or_else(|e| panic!("r={} lost={} failed: {}", r, lost, e));
                assert_eq!(report.restored.len(), lost);
            }
        }
    }
}

// =============================================================================
// Filesystem Repository
// =============================================================================

mod fs_tests {
    use super::*;

    #[tokio::test]
    async fn test_encode_on_disk_repository() {
        let dir = tempfile::tempdir().unwrap();
        let data = sample(1000);

        let root = {
            let dag = Arc::new(FsDagStore::open(dir.path()).unwrap());
            let pins = FsPinSet::open(dir.path()).unwrap();
            let root = Importer::new(dag, 64, 8)
                .unwrap()
                .import_bytes(&data)
                .await
                .unwrap()
                .root;
            pins.add_recursive(&root).await.unwrap();
            root
        };

        // reopen as a fresh process would
        let dag = Arc::new(FsDagStore::open(dir.path()).unwrap());
        let pins = Arc::new(FsPinSet::open(dir.path()).unwrap());
        let resolver = Arc::new(LinkPathResolver::new(dag.clone()));
        let orchestrator =
            EncodeOrchestrator::new(dag.clone(), resolver, pins.clone(), RecoveryConfig::default())
                .unwrap();

        let result = orchestrator
            .encode(
                EncodeRequest::new(format!("/ipfs/{}", root)).strategy("entanglement"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.strategy, StrategyKind::Entanglement);
        assert_eq!(pins.list().await.unwrap(), vec![result.encoded_root.clone()]);

        let encoded = dag.get_node(&result.encoded_root).await.unwrap();
        let child = dag.get_node(&encoded.links[0].cid).await.unwrap();
        dag.remove(&child.links[2].cid).await.unwrap();

        let report = orchestrator
            .recover(&result.encoded_root, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.restored.len(), 1);
        assert_eq!(read_file(&*dag, &result.encoded_root).await, data);
    }
}
