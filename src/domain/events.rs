//! Domain Events
//!
//! Immutable records of what happened during encode, retention swap and
//! recovery. Published through the [`EventPublisher`](super::ports::EventPublisher)
//! port for audit logging.
//!
//! # Example
//!
//! ```ignore
//! let event = DomainEvent::encode_started(op_id, "/ipfs/b3...", StrategyKind::ReedSolomon, 3);
//! event_publisher.publish(event).await?;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::node::ContentId;
use super::ports::StrategyKind;

/// Domain event representing a significant occurrence in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    // =========================================================================
    // Encode Events
    // =========================================================================
    /// An encode request passed validation and began.
    EncodeStarted {
        operation_id: Uuid,
        path: String,
        strategy: String,
        recoverability: u32,
        timestamp: DateTime<Utc>,
    },

    /// An encode finished, including the retention swap.
    EncodeCompleted {
        operation_id: Uuid,
        original_root: String,
        encoded_root: String,
        strategy: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// An encode reached a terminal failure.
    EncodeFailed {
        operation_id: Uuid,
        path: String,
        step: String,
        error_kind: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Retention Events
    // =========================================================================
    /// Retention moved from the original root to the encoded root.
    RetentionSwapped {
        original_root: String,
        encoded_root: String,
        original_was_retained: bool,
        timestamp: DateTime<Utc>,
    },

    /// Encoded root exists but the original is still retained.
    RetentionSwapFailed {
        original_root: String,
        encoded_root: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Recovery Events
    // =========================================================================
    /// Missing blocks below an encoded root were rebuilt.
    BlocksRecovered {
        root: String,
        restored: usize,
        intact: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::EncodeStarted { timestamp, .. } => *timestamp,
            DomainEvent::EncodeCompleted { timestamp, .. } => *timestamp,
            DomainEvent::EncodeFailed { timestamp, .. } => *timestamp,
            DomainEvent::RetentionSwapped { timestamp, .. } => *timestamp,
            DomainEvent::RetentionSwapFailed { timestamp, .. } => *timestamp,
            DomainEvent::BlocksRecovered { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::EncodeStarted { .. } => "EncodeStarted",
            DomainEvent::EncodeCompleted { .. } => "EncodeCompleted",
            DomainEvent::EncodeFailed { .. } => "EncodeFailed",
            DomainEvent::RetentionSwapped { .. } => "RetentionSwapped",
            DomainEvent::RetentionSwapFailed { .. } => "RetentionSwapFailed",
            DomainEvent::BlocksRecovered { .. } => "BlocksRecovered",
        }
    }

    /// Get the encode operation ID if applicable.
    pub fn operation_id(&self) -> Option<Uuid> {
        match self {
            DomainEvent::EncodeStarted { operation_id, .. } => Some(*operation_id),
            DomainEvent::EncodeCompleted { operation_id, .. } => Some(*operation_id),
            DomainEvent::EncodeFailed { operation_id, .. } => Some(*operation_id),
            _ => None,
        }
    }
}

// =============================================================================
// Event Builders
// =============================================================================

impl DomainEvent {
    pub fn encode_started(
        operation_id: Uuid,
        path: impl Into<String>,
        strategy: StrategyKind,
        recoverability: u32,
    ) -> Self {
        DomainEvent::EncodeStarted {
            operation_id,
            path: path.into(),
            strategy: strategy.to_string(),
            recoverability,
            timestamp: Utc::now(),
        }
    }

    pub fn encode_completed(
        operation_id: Uuid,
        original_root: &ContentId,
        encoded_root: &ContentId,
        strategy: StrategyKind,
        duration: Duration,
    ) -> Self {
        DomainEvent::EncodeCompleted {
            operation_id,
            original_root: original_root.to_string(),
            encoded_root: encoded_root.to_string(),
            strategy: strategy.to_string(),
            duration_ms: duration.as_millis() as u64,
            timestamp: Utc::now(),
        }
    }

    pub fn encode_failed(
        operation_id: Uuid,
        path: impl Into<String>,
        step: impl Into<String>,
        error_kind: &str,
        reason: impl Into<String>,
    ) -> Self {
        DomainEvent::EncodeFailed {
            operation_id,
            path: path.into(),
            step: step.into(),
            error_kind: error_kind.to_string(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn retention_swapped(
        original_root: &ContentId,
        encoded_root: &ContentId,
        original_was_retained: bool,
    ) -> Self {
        DomainEvent::RetentionSwapped {
            original_root: original_root.to_string(),
            encoded_root: encoded_root.to_string(),
            original_was_retained,
            timestamp: Utc::now(),
        }
    }

    pub fn retention_swap_failed(
        original_root: &ContentId,
        encoded_root: &ContentId,
        reason: impl Into<String>,
    ) -> Self {
        DomainEvent::RetentionSwapFailed {
            original_root: original_root.to_string(),
            encoded_root: encoded_root.to_string(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn blocks_recovered(
        root: &ContentId,
        restored: usize,
        intact: usize,
        duration: Duration,
    ) -> Self {
        DomainEvent::BlocksRecovered {
            root: root.to_string(),
            restored,
            intact,
            duration_ms: duration.as_millis() as u64,
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
