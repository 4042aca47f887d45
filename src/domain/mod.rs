//! Domain Layer
//!
//! Content-addressed node model, the ports the encode pipeline depends on,
//! and the events it emits.
//!
//! # Usage
//!
//! ```ignore
//! use dagrecovery::domain::ports::{DagService, RetentionManager};
//!
//! async fn unpin_if_encoded<D, R>(dag: &D, pins: &R, cid: &ContentId) -> Result<bool>
//! where
//!     D: DagService,
//!     R: RetentionManager,
//! {
//!     let node = dag.get_node(cid).await?;
//!     // ...
//! }
//! ```

pub mod events;
pub mod node;
pub mod ports;

pub use events::DomainEvent;
pub use node::{Block, ContentId, DagNode, Link, RecoveryGroup, RecoveryInfo};
pub use ports::{
    DagService, ErasureStrategy, EventPublisher, PathResolver, RecoveryReport, ResolvedRoot,
    RetentionManager, StrategyKind,
};
