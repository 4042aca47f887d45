//! Infrastructure Adapters
//!
//! This module contains adapter implementations for the domain ports,
//! following the Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │  DagService │ PathResolver │ RetentionManager │ Events     │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ MemoryDagStore │ MemoryPinSet │ FsDagStore │ FsPinSet     │ │
//! │  │ LinkPathResolver │ LoggingEventPublisher                   │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dagrecovery::adapters::{FsDagStore, FsPinSet, LinkPathResolver};
//! use dagrecovery::domain::ports::PathResolver;
//!
//! let dag = Arc::new(FsDagStore::open(".dagrecovery")?);
//! let resolver = LinkPathResolver::new(dag.clone());
//!
//! let root = resolver.resolve("/ipfs/b3...", &cancel).await?;
//! ```

mod event_publisher;
mod fs;
mod memory;
mod resolver;

pub use event_publisher::{InMemoryEventCollector, LoggingEventPublisher};
pub use fs::{FsDagStore, FsPinSet};
pub use memory::{MemoryDagStore, MemoryPinSet};
pub use resolver::{parse_path, LinkPathResolver};
