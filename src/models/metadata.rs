//! Metadata documents and run statistics.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

/// Prefix for content ids referenced from metadata documents.
pub const IPFS_PREFIX: &str = "ipfs://ipfs/";

/// Build an `ipfs://ipfs/<cid>` URI.
pub fn ipfs_uri(cid: &str) -> String {
    format!("{IPFS_PREFIX}{cid}")
}

/// JSON metadata document pinned for a class or an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub animation_url: Option<String>,
}

impl MetadataDocument {
    /// Create a document from already pinned media.
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        image_cid: Option<&str>,
        video_cid: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.filter(|d| !d.is_empty()),
            image: image_cid.map(ipfs_uri),
            animation_url: video_cid.map(ipfs_uri),
        }
    }

    /// Document body for pinning. Absent optional fields are left out.
    pub fn to_json(&self) -> serde_json::Value {
        let mut doc = serde_json::Map::new();
        doc.insert("name".to_string(), json!(self.name));
        let optional = [
            ("description", &self.description),
            ("image", &self.image),
            ("animation_url", &self.animation_url),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                doc.insert(key.to_string(), json!(value));
            }
        }
        serde_json::Value::Object(doc)
    }
}

/// Pipeline stage reached by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Init,
    Validated,
    ClassEnsured,
    ClassMetadataSet,
    SecretsGenerated,
    InstancesMinted,
    ImagesPinned,
    InstanceMetadataSet,
    FundsSent,
    Finalized,
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Validated => "validated",
            Self::ClassEnsured => "class ensured",
            Self::ClassMetadataSet => "class metadata set",
            Self::SecretsGenerated => "secrets generated",
            Self::InstancesMinted => "instances minted",
            Self::ImagesPinned => "images pinned",
            Self::InstanceMetadataSet => "instance metadata set",
            Self::FundsSent => "funds sent",
            Self::Finalized => "finalized",
        };
        write!(f, "{name}")
    }
}

/// Statistics for a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    /// Last stage completed
    pub stage: WorkflowStage,

    /// Records in the configured range
    pub records: usize,

    /// Secrets generated this run
    pub secrets_generated: usize,

    /// Rows whose metadata was pinned this run
    pub metadata_pinned: usize,

    /// Ledger batches submitted this run
    pub batches_submitted: usize,

    /// Whether this run was a dry run
    pub dry_run: bool,

    /// Total runtime in seconds
    pub runtime_secs: f64,
}

impl RunStats {
    pub fn new(records: usize, dry_run: bool) -> Self {
        Self {
            stage: WorkflowStage::Init,
            records,
            secrets_generated: 0,
            metadata_pinned: 0,
            batches_submitted: 0,
            dry_run,
            runtime_secs: 0.0,
        }
    }
}
