//! Error types for DAG recovery

use thiserror::Error;

use crate::domain::node::ContentId;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while encoding, recovering or re-pinning a DAG
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Pipeline Errors
    // =========================================================================
    /// Path did not resolve to a DAG root
    #[error("Failed to resolve path '{path}': {reason}")]
    Resolution { path: String, reason: String },

    /// Strategy name is not registered
    #[error("Invalid recovery strategy: {0}")]
    UnknownStrategy(String),

    /// Recoverability below the minimum of 1
    #[error("Recoverability must be at least 1, got {0}")]
    InvalidRecoverability(u32),

    /// Strategy failed while walking or encoding the DAG
    #[error("Encoding {root} with {strategy} failed: {source}")]
    Encoding {
        strategy: String,
        root: ContentId,
        #[source]
        source: Box<Error>,
    },

    /// Encoding succeeded but retention could not be moved
    #[error(
        "Encoded {encoded} but failed to move retention off {original} (still pinned): {reason}"
    )]
    RetentionSwap {
        encoded: ContentId,
        original: ContentId,
        reason: String,
    },

    /// Operation was cancelled before it could complete
    #[error("Operation cancelled during {step}")]
    Cancelled { step: String },

    // =========================================================================
    // Block Store Errors
    // =========================================================================
    /// Block is not present in the store
    #[error("Block not found: {0}")]
    BlockNotFound(ContentId),

    /// Content identifier could not be parsed
    #[error("Invalid content id '{0}'")]
    InvalidContentId(String),

    /// Block bytes do not decode or do not match their identifier
    #[error("Corrupt block {cid}: {reason}")]
    CorruptBlock { cid: ContentId, reason: String },

    // =========================================================================
    // Erasure Coding Errors
    // =========================================================================
    /// Invalid EC configuration
    #[error("Invalid EC configuration: {0}")]
    InvalidEcConfig(String),

    /// EC encoding failed
    #[error("EC encoding failed: {0}")]
    EcEncodingFailed(String),

    /// EC reconstruction failed
    #[error("EC reconstruction failed: {0}")]
    EcReconstructionFailed(String),

    /// Insufficient shards for reconstruction
    #[error("Insufficient shards for reconstruction: have {available}, need {required}")]
    InsufficientShards { available: usize, required: usize },

    /// Block could not be rebuilt from the surviving shares
    #[error("Block {cid} is unrecoverable: {reason}")]
    Unrecoverable { cid: ContentId, reason: String },

    // =========================================================================
    // Ambient Errors
    // =========================================================================
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for the one failure where re-running only the retention swap is safe.
    pub fn is_retryable_swap(&self) -> bool {
        matches!(self, Error::RetentionSwap { .. })
    }

    /// Short machine-readable kind, used for metrics labels and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Resolution { .. } => "resolution",
            Error::UnknownStrategy(_) => "unknown_strategy",
            Error::InvalidRecoverability(_) => "invalid_recoverability",
            Error::Encoding { .. } => "encoding",
            Error::RetentionSwap { .. } => "retention_swap",
            Error::Cancelled { .. } => "cancelled",
            Error::BlockNotFound(_) => "block_not_found",
            Error::InvalidContentId(_) => "invalid_cid",
            Error::CorruptBlock { .. } => "corrupt_block",
            Error::InvalidEcConfig(_) => "invalid_ec_config",
            Error::EcEncodingFailed(_) => "ec_encoding",
            Error::EcReconstructionFailed(_) => "ec_reconstruction",
            Error::InsufficientShards { .. } => "insufficient_shards",
            Error::Unrecoverable { .. } => "unrecoverable",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::Internal(_) => "internal",
        }
    }
}
