//! Persisted store of qualified companies.
//!
//! The store is a single JSON array file. It is read once at the start of a
//! territory run and rewritten once at the end. Entries are held as raw JSON
//! objects so fields added by other tools survive a rewrite.
//!
//! **Access rules:** single process, single run. Concurrent runs against the
//! same file race on the final write.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use icpqualifier_shared::{QualifiedCompany, QualifierError, Result};

/// The result store handle: file path plus in-memory entries.
#[derive(Debug, Clone)]
pub struct ResultStore {
    path: PathBuf,
    entries: Vec<Value>,
}

impl ResultStore {
    /// Empty store that will be written to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    /// Load the store at `path`.
    ///
    /// A missing, unreadable or malformed file yields an empty store. This
    /// never fails: a fresh start is always possible.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no result store yet, starting fresh");
                return Self::empty(path);
            }
            Err(e) => {
                warn!(error = %e, "result store unreadable, starting fresh");
                return Self::empty(path);
            }
        };

        if raw.trim().is_empty() {
            return Self::empty(path);
        }

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(entries)) => {
                debug!(entries = entries.len(), "result store loaded");
                Self {
                    path: path.to_path_buf(),
                    entries,
                }
            }
            Ok(other) => {
                warn!(kind = json_kind(&other), "result store is not a JSON array, starting fresh");
                Self::empty(path)
            }
            Err(e) => {
                warn!(error = %e, "result store is corrupt, starting fresh");
                Self::empty(path)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw entries in file order.
    pub fn entries(&self) -> &[Value] {
        &self.entries
    }

    /// Names of all entries that carry a string `name`.
    pub fn names(&self) -> HashSet<String> {
        self.entries
            .iter()
            .filter_map(entry_name)
            .map(str::to_string)
            .collect()
    }

    /// Exact, case-sensitive name lookup.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| entry_name(e) == Some(name))
    }

    /// Entries that parse as [`QualifiedCompany`]; others are skipped.
    pub fn companies(&self) -> Vec<QualifiedCompany> {
        self.entries
            .iter()
            .filter_map(|e| serde_json::from_value(e.clone()).ok())
            .collect()
    }

    /// Append every company whose name is not already present.
    ///
    /// Returns how many were added.
    pub fn merge(&mut self, companies: &[QualifiedCompany]) -> Result<usize> {
        let mut known = self.names();
        let mut added = 0;

        for company in companies {
            if !known.insert(company.name.clone()) {
                debug!(name = %company.name, "already stored, skipping");
                continue;
            }
            let value = serde_json::to_value(company).map_err(|e| {
                QualifierError::Storage(format!("failed to encode {}: {e}", company.name))
            })?;
            self.entries.push(value);
            added += 1;
        }

        Ok(added)
    }

    /// Write the store as pretty JSON.
    ///
    /// The content goes to a sibling temp file first and is then renamed over
    /// the target, so a crash never leaves a half-written store.
    #[instrument(skip_all, fields(path = %self.path.display(), entries = self.entries.len()))]
    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| QualifierError::io(parent, e))?;
        }

        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| QualifierError::Storage(format!("failed to encode result store: {e}")))?;

        let tmp = temp_path(&self.path);
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| QualifierError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| QualifierError::io(&self.path, e))?;

        info!("result store saved");
        Ok(())
    }
}

fn entry_name(entry: &Value) -> Option<&str> {
    entry.get("name").and_then(Value::as_str)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "results.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
