//! dagrecovery - Erasure-Coded Recoverability for Merkle-DAGs
//!
//! Makes content in a content-addressed block store survive the loss of
//! some of its blocks. A DAG is re-emitted with parity blocks attached to
//! every interior node, and retention (pinning) is moved from the original
//! root to the encoded one without ever leaving the content unpinned.
//!
//! # Architecture
//!
//! ```text
//! CLI ─▶ EncodeOrchestrator ─▶ PathResolver ─▶ ErasureStrategy ─▶ RetentionManager
//!                                    │               │
//!                                    └── DagService ─┘
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - In-memory and filesystem implementations of the ports
//! - [`config`] - Pipeline configuration
//! - [`domain`] - Node model, ports and events
//! - [`ec`] - Reed-Solomon and entanglement block codecs
//! - [`error`] - Error types
//! - [`importer`] - Chunk files into DAGs
//! - [`metrics`] - Prometheus counters
//! - [`orchestrator`] - The encode pipeline and retention swap
//! - [`response`] - CLI output rendering
//! - [`strategy`] - DAG-level erasure-coding strategies

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ec;
pub mod error;
pub mod importer;
pub mod metrics;
pub mod orchestrator;
pub mod response;
pub mod strategy;

// Re-export commonly used types
pub use config::RecoveryConfig;
pub use domain::{ContentId, DagNode};
pub use error::{Error, Result};
pub use orchestrator::{EncodeOrchestrator, EncodeRequest, EncodeResult, EncodeState};
pub use strategy::StrategyRegistry;
