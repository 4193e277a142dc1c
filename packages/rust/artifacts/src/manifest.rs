//! `manifest.json`: what one `run` produced and how.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use policytag_shared::{PolicyTagError, Result};

use crate::write_json;

pub const MANIFEST_FILE: &str = "manifest.json";

/// Schema version for forward compatibility.
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Record of one end-to-end run over a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    /// Time-ordered run identifier.
    pub run_id: Uuid,
    pub tool_version: String,
    pub file_name: String,
    /// SHA-256 of the source bytes, when the source was read from disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_sha256: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub page_count: usize,
    pub chunk_count: usize,
    /// Chunks whose final tag came from the classifier.
    pub llm_used: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub llm_policy: String,
    pub label_set: String,
}

impl RunManifest {
    /// Start a manifest with a fresh run id; counts are filled in later.
    pub fn begin(tool_version: &str, file_name: &str) -> Self {
        let now = Utc::now();
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            run_id: Uuid::now_v7(),
            tool_version: tool_version.to_string(),
            file_name: file_name.to_string(),
            source_sha256: None,
            started_at: now,
            finished_at: now,
            page_count: 0,
            chunk_count: 0,
            llm_used: 0,
            cache_hits: 0,
            cache_misses: 0,
            llm_policy: String::new(),
            label_set: String::new(),
        }
    }
}

/// Write `manifest.json` into `dir`, stamping `finished_at`.
pub fn write_manifest(dir: &Path, manifest: &mut RunManifest) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| PolicyTagError::io(dir, e))?;
    manifest.finished_at = Utc::now();
    let path = dir.join(MANIFEST_FILE);
    write_json(&path, manifest)?;
    Ok(path)
}

/// Read and version-check a manifest.
pub fn read_manifest(dir: &Path) -> Result<RunManifest> {
    let path = dir.join(MANIFEST_FILE);
    let content = std::fs::read_to_string(&path).map_err(|e| PolicyTagError::io(&path, e))?;
    let manifest: RunManifest = serde_json::from_str(&content)
        .map_err(|e| PolicyTagError::validation(format!("invalid manifest.json: {e}")))?;

    if manifest.schema_version != MANIFEST_SCHEMA_VERSION {
        return Err(PolicyTagError::validation(format!(
            "unsupported schema_version: {} (expected {MANIFEST_SCHEMA_VERSION})",
            manifest.schema_version
        )));
    }
    Ok(manifest)
}
