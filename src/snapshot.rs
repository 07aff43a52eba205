use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EtlError, Result};
use crate::stats_api::ApiRequest;

/// An upstream response exactly as received, tagged with the request that
/// produced it. Written once and never touched again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub endpoint: String,
    pub params: BTreeMap<String, String>,
    pub captured_at: String,
    pub response: Value,
}

impl RawSnapshot {
    pub fn capture(request: &ApiRequest, response: Value, at: DateTime<Utc>) -> Self {
        Self {
            endpoint: request.endpoint.to_string(),
            params: request
                .params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            captured_at: at.to_rfc3339(),
            response,
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| EtlError::Snapshot {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// `{stem}_{YYYYmmdd_HHMMSS}.json`
pub fn snapshot_file_name(stem: &str, at: DateTime<Utc>) -> String {
    format!("{stem}_{}.json", at.format("%Y%m%d_%H%M%S"))
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|source| EtlError::Snapshot {
            path: self.dir.clone(),
            source,
        })
    }

    /// Writes through a sibling temp file and a rename: the final file is
    /// either complete or absent. Never replaces an existing capture.
    pub fn write(&self, file_name: &str, snapshot: &RawSnapshot) -> Result<PathBuf> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let path = self.free_path(file_name);
        let tmp = path.with_extension("json.tmp");
        if let Err(source) = fs::write(&tmp, &json).and_then(|_| fs::rename(&tmp, &path)) {
            let _ = fs::remove_file(&tmp);
            return Err(EtlError::Snapshot { path, source });
        }
        Ok(path)
    }

    fn free_path(&self, file_name: &str) -> PathBuf {
        let candidate = self.dir.join(file_name);
        if !candidate.exists() {
            return candidate;
        }
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name);
        (1u32..)
            .map(|n| self.dir.join(format!("{stem}_{n}.json")))
            .find(|p| !p.exists())
            .unwrap_or(candidate)
    }
}
