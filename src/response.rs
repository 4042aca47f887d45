//! Command Responses
//!
//! What the CLI prints on success, in text or JSON form. Failures are never
//! rendered here; they leave through the error path with no partial output.

use serde::{Deserialize, Serialize};

use crate::domain::node::ContentId;
use crate::error::Result;

/// Output encoding selected with `--enc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// A response that can be printed in either output format.
pub trait Render: Serialize {
    /// Human-readable single line, without trailing newline.
    fn text(&self) -> String;

    fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Text => Ok(self.text()),
            OutputFormat::Json => Ok(serde_json::to_string(self)?),
        }
    }
}

/// Reply to `encode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeResponse {
    #[serde(rename = "Cid")]
    pub cid: String,
}

impl EncodeResponse {
    pub fn new(cid: &ContentId) -> Self {
        Self {
            cid: cid.to_string(),
        }
    }
}

impl Render for EncodeResponse {
    fn text(&self) -> String {
        format!("Encoded: {}", self.cid)
    }
}

/// Reply to `add`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddResponse {
    #[serde(rename = "Cid")]
    pub cid: String,
    #[serde(rename = "Size")]
    pub size: u64,
}

impl Render for AddResponse {
    fn text(&self) -> String {
        format!("Added: {}", self.cid)
    }
}

/// Reply to `recover`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverResponse {
    #[serde(rename = "Restored")]
    pub restored: Vec<String>,
    #[serde(rename = "Intact")]
    pub intact: usize,
}

impl Render for RecoverResponse {
    fn text(&self) -> String {
        format!("Recovered: {} blocks", self.restored.len())
    }
}

/// Reply to `swap-retention`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapResponse {
    #[serde(rename = "Pinned")]
    pub pinned: String,
    #[serde(rename = "Unpinned")]
    pub unpinned: Option<String>,
}

impl Render for SwapResponse {
    fn text(&self) -> String {
        match &self.unpinned {
            Some(original) => format!("Pinned: {} (unpinned {})", self.pinned, original),
            None => format!("Pinned: {}", self.pinned),
        }
    }
}
