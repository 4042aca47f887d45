//! Encode Orchestrator
//!
//! Turns a path into an encoded DAG and moves retention onto it, sequenced
//! so the original stays pinned until the replacement is verified.
//!
//! # Safety Guarantees
//!
//! 1. The original root's retention is NEVER removed before the encoded root
//!    is retrievable and retained
//! 2. Any failure up to and including encoding leaves retention untouched
//! 3. Only the resolved original root's retention is removed
//! 4. Once the retention swap starts it runs to completion regardless of
//!    cancellation
//!
//! ```text
//! Start ─▶ Resolving ─▶ StrategySelected ─▶ Encoding ─▶ Encoded ─▶ RetentionRemoved
//!   │          │               │               │           │
//!   └──────────┴───────────────┴───────────────┴───────────┴─────▶ Failed
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::LoggingEventPublisher;
use crate::config::RecoveryConfig;
use crate::domain::events::DomainEvent;
use crate::domain::node::ContentId;
use crate::domain::ports::{
    DagService, ErasureStrategy, EventPublisher, PathResolver, RecoveryReport, ResolvedRoot,
    RetentionManager, StrategyKind,
};
use crate::error::{Error, Result};
use crate::metrics::{RecoveryMetrics, STATUS_FAILED, STATUS_SUCCESS};
use crate::strategy::StrategyRegistry;

// =============================================================================
// Request
// =============================================================================

/// A request to make the DAG at `target_path` recoverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeRequest {
    /// Path resolving to the DAG root to encode
    pub target_path: String,

    /// Number of tolerated losses, at least 1
    pub recoverability: u32,

    /// Registered strategy name
    pub strategy: String,
}

impl EncodeRequest {
    /// Request with the default recoverability and strategy.
    pub fn new(target_path: impl Into<String>) -> Self {
        Self::with_config(target_path, &RecoveryConfig::default())
    }

    /// Request with the defaults from `config`.
    pub fn with_config(target_path: impl Into<String>, config: &RecoveryConfig) -> Self {
        Self {
            target_path: target_path.into(),
            recoverability: config.default_recoverability,
            strategy: config.default_strategy.clone(),
        }
    }

    pub fn recoverability(mut self, recoverability: u32) -> Self {
        self.recoverability = recoverability;
        self
    }

    pub fn strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }
}

// =============================================================================
// Encode State Machine
// =============================================================================

/// States in the encode pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EncodeState {
    /// Request received
    Start,
    /// Resolving the target path
    Resolving,
    /// Strategy bound to the resolved root
    StrategySelected,
    /// Strategy walking the DAG
    Encoding,
    /// Encoded root stored and retained
    Encoded,
    /// Original root's retention removed
    RetentionRemoved,
    /// Pipeline failed
    Failed,
}

impl std::fmt::Display for EncodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeState::Start => write!(f, "Start"),
            EncodeState::Resolving => write!(f, "Resolving"),
            EncodeState::StrategySelected => write!(f, "StrategySelected"),
            EncodeState::Encoding => write!(f, "Encoding"),
            EncodeState::Encoded => write!(f, "Encoded"),
            EncodeState::RetentionRemoved => write!(f, "RetentionRemoved"),
            EncodeState::Failed => write!(f, "Failed"),
        }
    }
}

/// A step in the encode pipeline
#[derive(Debug, Clone, Serialize)]
pub struct EncodeStep {
    pub state: EncodeState,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub duration_ms: Option<u64>,
}

/// Step log for one encode, kept whether or not it succeeds.
#[derive(Debug)]
struct Progress {
    state: EncodeState,
    start_time: DateTime<Utc>,
    steps: Vec<EncodeStep>,
}

impl Progress {
    fn new() -> Self {
        let mut progress = Self {
            state: EncodeState::Start,
            start_time: Utc::now(),
            steps: Vec::new(),
        };
        progress.transition(EncodeState::Start, "Encode requested");
        progress
    }

    /// Record a state transition
    fn transition(&mut self, state: EncodeState, message: &str) {
        let now = Utc::now();
        let last_step_time = self
            .steps
            .last()
            .map(|s| s.timestamp)
            .unwrap_or(self.start_time);
        let duration_ms = (now - last_step_time).num_milliseconds().max(0) as u64;

        debug!(state = %state, "{}", message);
        self.state = state;
        self.steps.push(EncodeStep {
            state,
            timestamp: now,
            message: message.to_string(),
            duration_ms: Some(duration_ms),
        });
    }

    /// Mark as failed, returning the state the failure happened in.
    fn fail(&mut self, error: &Error) -> EncodeState {
        let failed_in = self.state;
        self.transition(EncodeState::Failed, &error.to_string());
        failed_in
    }
}

/// Result of a successful encode
#[derive(Debug, Clone, Serialize)]
pub struct EncodeResult {
    pub operation_id: Uuid,

    /// Root of the encoded DAG, now retained
    pub encoded_root: ContentId,

    /// Root the path resolved to, no longer retained
    pub original_root: ContentId,

    pub strategy: StrategyKind,

    pub recoverability: u32,

    /// Whether the original root was retained before the swap
    pub original_was_retained: bool,

    pub start_time: DateTime<Utc>,

    pub end_time: DateTime<Utc>,

    pub duration: Duration,

    /// Step-by-step log
    pub steps: Vec<EncodeStep>,
}

impl EncodeResult {
    pub fn state(&self) -> EncodeState {
        self.steps
            .last()
            .map(|s| s.state)
            .unwrap_or(EncodeState::Start)
    }
}

/// Everything the pipeline learns before the retention swap.
struct Encoded {
    original: ResolvedRoot,
    encoded_root: ContentId,
    kind: StrategyKind,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Runs encode requests against a DAG service, resolver and retention set.
///
/// Holds no per-request state, so one instance can serve concurrent
/// requests behind an `Arc`.
pub struct EncodeOrchestrator {
    dag: Arc<dyn DagService>,
    resolver: Arc<dyn PathResolver>,
    retention: Arc<dyn RetentionManager>,
    registry: StrategyRegistry,
    events: Arc<dyn EventPublisher>,
    metrics: RecoveryMetrics,
    config: RecoveryConfig,
}

impl std::fmt::Debug for EncodeOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodeOrchestrator")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EncodeOrchestrator {
    /// Create an orchestrator with the default strategies, a logging event
    /// publisher and a fresh metrics registry.
    pub fn new(
        dag: Arc<dyn DagService>,
        resolver: Arc<dyn PathResolver>,
        retention: Arc<dyn RetentionManager>,
        config: RecoveryConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            dag,
            resolver,
            retention,
            registry: StrategyRegistry::with_defaults(config.group_size),
            events: Arc::new(LoggingEventPublisher::info_level()),
            metrics: RecoveryMetrics::new()?,
            config,
        })
    }

    /// Replace the strategy registry.
    pub fn with_registry(mut self, registry: StrategyRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the event publisher.
    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }

    /// Replace the metrics sink.
    pub fn with_metrics(mut self, metrics: RecoveryMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &RecoveryMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Encode the DAG at `request.target_path` and move retention onto the
    /// encoded root.
    #[instrument(
        skip(self, request, cancel),
        fields(
            path = %request.target_path,
            strategy = %request.strategy,
            recoverability = request.recoverability,
        )
    )]
    pub async fn encode(
        &self,
        request: EncodeRequest,
        cancel: &CancellationToken,
    ) -> Result<EncodeResult> {
        let operation_id = Uuid::new_v4();
        let started = Instant::now();
        let mut progress = Progress::new();

        let outcome = self
            .run(operation_id, &request, cancel, &mut progress)
            .await;

        match outcome {
            Ok((encoded, original_was_retained)) => {
                let elapsed = started.elapsed();
                info!(
                    original = %encoded.original.cid,
                    encoded = %encoded.encoded_root,
                    duration_ms = elapsed.as_millis() as u64,
                    "Encode completed"
                );
                self.metrics
                    .record_encode(encoded.kind.as_str(), STATUS_SUCCESS, elapsed.as_secs_f64());
                self.emit(DomainEvent::encode_completed(
                    operation_id,
                    &encoded.original.cid,
                    &encoded.encoded_root,
                    encoded.kind,
                    elapsed,
                ))
                .await;

                Ok(EncodeResult {
                    operation_id,
                    encoded_root: encoded.encoded_root,
                    original_root: encoded.original.cid,
                    strategy: encoded.kind,
                    recoverability: request.recoverability,
                    original_was_retained,
                    start_time: progress.start_time,
                    end_time: Utc::now(),
                    duration: elapsed,
                    steps: progress.steps,
                })
            }
            Err(e) => {
                let failed_in = progress.fail(&e);
                warn!(step = %failed_in, error = %e, "Encode failed");

                let label = self
                    .registry
                    .get(&request.strategy)
                    .map(|s| s.kind().as_str())
                    .unwrap_or("unknown");
                self.metrics.record_encode(label, STATUS_FAILED, 0.0);
                self.emit(DomainEvent::encode_failed(
                    operation_id,
                    request.target_path.clone(),
                    failed_in.to_string(),
                    e.kind(),
                    e.to_string(),
                ))
                .await;

                Err(e)
            }
        }
    }

    async fn run(
        &self,
        operation_id: Uuid,
        request: &EncodeRequest,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<(Encoded, bool)> {
        if request.recoverability < 1 {
            return Err(Error::InvalidRecoverability(request.recoverability));
        }
        // Pure lookup: an unknown name must not touch any collaborator.
        let strategy = self.registry.get(&request.strategy)?;
        let kind = strategy.kind();

        self.emit(DomainEvent::encode_started(
            operation_id,
            request.target_path.clone(),
            kind,
            request.recoverability,
        ))
        .await;

        // =====================================================================
        // Phase 1: Resolve
        // =====================================================================
        progress.transition(
            EncodeState::Resolving,
            &format!("Resolving {}", request.target_path),
        );
        let original = self.resolve(&request.target_path, cancel).await?;

        progress.transition(
            EncodeState::StrategySelected,
            &format!("Selected {} for {}", kind, original.cid),
        );

        // =====================================================================
        // Phase 2: Encode
        // =====================================================================
        if cancel.is_cancelled() {
            return Err(Error::Cancelled {
                step: "encoding".to_string(),
            });
        }
        progress.transition(
            EncodeState::Encoding,
            &format!(
                "Encoding {} with recoverability {}",
                original.cid, request.recoverability
            ),
        );
        let encoded_root = self
            .encode_with(strategy.as_ref(), &original, request.recoverability, cancel)
            .await?;

        // =====================================================================
        // Phase 3: Retention Swap (not cancellable)
        // =====================================================================
        let original_was_retained = self
            .swap(&encoded_root, &original.cid, Some(progress))
            .await?;

        Ok((
            Encoded {
                original,
                encoded_root,
                kind,
            },
            original_was_retained,
        ))
    }

    async fn resolve(&self, path: &str, cancel: &CancellationToken) -> Result<ResolvedRoot> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled {
                step: "resolving".to_string(),
            });
        }

        let resolve_timeout = self.config.resolve_timeout();
        match timeout(resolve_timeout, self.resolver.resolve(path, cancel)).await {
            Ok(Ok(resolved)) => Ok(resolved),
            Ok(Err(e @ Error::Cancelled { .. })) | Ok(Err(e @ Error::Resolution { .. })) => Err(e),
            Ok(Err(e)) => Err(Error::Resolution {
                path: path.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(Error::Resolution {
                path: path.to_string(),
                reason: format!("timed out after {}s", resolve_timeout.as_secs()),
            }),
        }
    }

    async fn encode_with(
        &self,
        strategy: &dyn ErasureStrategy,
        original: &ResolvedRoot,
        recoverability: u32,
        cancel: &CancellationToken,
    ) -> Result<ContentId> {
        let wrap = |source: Error| Error::Encoding {
            strategy: strategy.kind().to_string(),
            root: original.cid.clone(),
            source: Box::new(source),
        };

        let encoded = match strategy
            .encode(self.dag.as_ref(), &original.node, recoverability, cancel)
            .await
        {
            Ok(node) => node,
            Err(e @ Error::Cancelled { .. }) => return Err(e),
            Err(e) => return Err(wrap(e)),
        };

        // Last point at which cancellation is honoured.
        if cancel.is_cancelled() {
            return Err(Error::Cancelled {
                step: "encoding".to_string(),
            });
        }

        encoded.cid().map_err(wrap)
    }

    /// Move retention from `original` to `encoded` without re-encoding.
    ///
    /// Safe to call repeatedly after an [`Error::RetentionSwap`]. Returns
    /// whether `original` was still retained.
    #[instrument(skip(self))]
    pub async fn swap_retention(&self, encoded: &ContentId, original: &ContentId) -> Result<bool> {
        self.swap(encoded, original, None).await
    }

    async fn swap(
        &self,
        encoded: &ContentId,
        original: &ContentId,
        mut progress: Option<&mut Progress>,
    ) -> Result<bool> {
        let outcome = async {
            self.grant(encoded, original).await?;
            if let Some(progress) = progress.as_deref_mut() {
                progress.transition(
                    EncodeState::Encoded,
                    &format!("Encoded root {} retained", encoded),
                );
            }

            let was_retained = self.retention.remove_recursive(original).await?;
            if let Some(progress) = progress.as_deref_mut() {
                progress.transition(
                    EncodeState::RetentionRemoved,
                    &format!("Released retention on {}", original),
                );
            }
            Ok::<_, Error>(was_retained)
        }
        .await;

        match outcome {
            Ok(was_retained) => {
                info!(
                    original = %original,
                    encoded = %encoded,
                    original_was_retained = was_retained,
                    "Retention swapped"
                );
                self.metrics.record_swap(STATUS_SUCCESS);
                self.emit(DomainEvent::retention_swapped(original, encoded, was_retained))
                    .await;
                Ok(was_retained)
            }
            Err(e) => {
                let reason = match e {
                    Error::RetentionSwap { reason, .. } => reason,
                    other => other.to_string(),
                };
                warn!(
                    original = %original,
                    encoded = %encoded,
                    reason = %reason,
                    "Retention swap failed, original still retained"
                );
                self.metrics.record_swap(STATUS_FAILED);
                self.emit(DomainEvent::retention_swap_failed(
                    original,
                    encoded,
                    reason.clone(),
                ))
                .await;
                Err(Error::RetentionSwap {
                    encoded: encoded.clone(),
                    original: original.clone(),
                    reason,
                })
            }
        }
    }

    /// Verify the encoded root and make sure it is retained.
    async fn grant(&self, encoded: &ContentId, original: &ContentId) -> Result<()> {
        if self.config.verify_encoded_root && !self.dag.has(encoded).await? {
            return Err(Error::RetentionSwap {
                encoded: encoded.clone(),
                original: original.clone(),
                reason: format!("encoded root {} is not retrievable", encoded),
            });
        }

        self.retention.add_recursive(encoded).await?;
        if !self.retention.is_retained(encoded).await? {
            return Err(Error::RetentionSwap {
                encoded: encoded.clone(),
                original: original.clone(),
                reason: format!("retention on {} was not recorded", encoded),
            });
        }
        Ok(())
    }

    /// Rebuild missing blocks below an encoded root with the strategy it
    /// was encoded with.
    #[instrument(skip(self, cancel))]
    pub async fn recover(
        &self,
        root: &ContentId,
        cancel: &CancellationToken,
    ) -> Result<RecoveryReport> {
        let started = Instant::now();
        let node = self.dag.get_node(root).await?;
        let info = node.recovery.as_ref().ok_or_else(|| {
            Error::EcReconstructionFailed(format!("{} is not an encoded root", root))
        })?;
        let strategy = self.registry.get(info.strategy.as_str())?;

        let report = strategy.recover(self.dag.as_ref(), root, cancel).await?;

        info!(
            restored = report.restored.len(),
            intact = report.intact,
            "Recovery finished"
        );
        self.metrics.record_recovered(report.restored.len());
        self.emit(DomainEvent::blocks_recovered(
            root,
            report.restored.len(),
            report.intact,
            started.elapsed(),
        ))
        .await;
        Ok(report)
    }

    async fn emit(&self, event: DomainEvent) {
        let event_type = event.event_type();
        if let Err(e) = self.events.publish(event).await {
            warn!(event_type, error = %e, "Failed to publish domain event");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
