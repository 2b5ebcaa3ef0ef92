//! Named workflow persistence.
//!
//! The manager stores each workflow as one JSON document (`<name>.json`
//! under its root directory) holding the IR together with sidecar metadata.
//! Writes go through a temp file in the same directory followed by an atomic
//! rename, so readers never observe a torn document. The name is the storage
//! key only; it never appears inside the IR body.

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

use crate::ir::WorkflowIr;
use crate::utils::json_ext::deep_merge;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").expect("valid regex"));

const MAX_NAME_CHARS: usize = 50;

/// Names that collide with CLI verbs and may not be used for workflows.
const RESERVED_NAMES: &[&str] = &["new", "list", "run", "delete", "help"];

/// Sidecar metadata stored alongside a workflow's IR.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub execution_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution_success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution_duration_ms: Option<u64>,
}

impl WorkflowMetadata {
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            description: description.into(),
            created_at: now,
            updated_at: now,
            execution_count: 0,
            last_execution_at: None,
            last_execution_success: None,
            last_execution_duration_ms: None,
        }
    }
}

/// One row of [`WorkflowManager::list_all`].
#[derive(Clone, Debug, Serialize)]
pub struct WorkflowSummary {
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub execution_count: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredWorkflow {
    ir: WorkflowIr,
    metadata: WorkflowMetadata,
}

/// Errors from workflow persistence operations.
#[derive(Debug, Error, Diagnostic)]
pub enum ManagerError {
    #[error("invalid workflow name `{name}`: {reason}")]
    #[diagnostic(
        code(pflow::manager::invalid_name),
        help("Names are kebab-case, at most 50 characters, and must avoid reserved words.")
    )]
    InvalidName { name: String, reason: String },

    #[error("workflow `{name}` not found")]
    #[diagnostic(code(pflow::manager::not_found))]
    NotFound { name: String },

    #[error("workflow `{name}` already exists")]
    #[diagnostic(
        code(pflow::manager::already_exists),
        help("Pass `force` to overwrite the existing workflow.")
    )]
    AlreadyExists { name: String },

    #[error("storage error: {0}")]
    #[diagnostic(code(pflow::manager::io))]
    Io(#[from] std::io::Error),

    #[error("corrupt workflow document: {0}")]
    #[diagnostic(code(pflow::manager::serde))]
    Serde(#[from] serde_json::Error),
}

/// Directory-backed store of named workflows.
#[derive(Debug)]
pub struct WorkflowManager {
    root: PathBuf,
}

impl WorkflowManager {
    /// Open (creating if needed) a manager over `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ManagerError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Store a new workflow. Fails on an existing name unless `force`.
    pub fn save(
        &self,
        name: &str,
        ir: &WorkflowIr,
        metadata: WorkflowMetadata,
        force: bool,
    ) -> Result<(), ManagerError> {
        validate_name(name)?;
        let path = self.path_for(name);
        if path.exists() && !force {
            return Err(ManagerError::AlreadyExists {
                name: name.to_string(),
            });
        }
        self.write_atomic(
            &path,
            &StoredWorkflow {
                ir: ir.clone(),
                metadata,
            },
        )
    }

    /// Load a workflow's IR and metadata.
    pub fn load(&self, name: &str) -> Result<(WorkflowIr, WorkflowMetadata), ManagerError> {
        let stored = self.read(name)?;
        Ok((stored.ir, stored.metadata))
    }

    /// Load only the IR.
    pub fn load_ir(&self, name: &str) -> Result<WorkflowIr, ManagerError> {
        Ok(self.read(name)?.ir)
    }

    /// Summaries of every stored workflow, sorted by name.
    pub fn list_all(&self) -> Result<Vec<WorkflowSummary>, ManagerError> {
        let mut summaries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            // Skip foreign files rather than failing the whole listing.
            let Ok(stored) = self.read(name) else {
                tracing::warn!(?path, "skipping unreadable workflow document");
                continue;
            };
            summaries.push(WorkflowSummary {
                name: name.to_string(),
                description: stored.metadata.description,
                created_at: stored.metadata.created_at,
                updated_at: stored.metadata.updated_at,
                execution_count: stored.metadata.execution_count,
            });
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(summaries)
    }

    /// Replace a workflow's IR, preserving its metadata.
    pub fn update_ir(&self, name: &str, ir: &WorkflowIr) -> Result<(), ManagerError> {
        let mut stored = self.read(name)?;
        stored.ir = ir.clone();
        stored.metadata.updated_at = Utc::now();
        self.write_atomic(&self.path_for(name), &stored)
    }

    /// Merge a JSON patch into a workflow's metadata.
    ///
    /// Objects merge recursively; scalars and arrays replace. Unknown keys
    /// in the patch are dropped when the merged document is re-decoded.
    pub fn update_metadata(&self, name: &str, patch: &Value) -> Result<(), ManagerError> {
        let mut stored = self.read(name)?;
        let current = serde_json::to_value(&stored.metadata)?;
        let merged = deep_merge(&current, patch);
        stored.metadata = serde_json::from_value(merged)?;
        stored.metadata.updated_at = Utc::now();
        self.write_atomic(&self.path_for(name), &stored)
    }

    /// Record one execution: bump the counter, stamp the last-run fields.
    pub fn record_execution(
        &self,
        name: &str,
        success: bool,
        duration: Duration,
    ) -> Result<(), ManagerError> {
        let mut stored = self.read(name)?;
        stored.metadata.execution_count += 1;
        stored.metadata.last_execution_at = Some(Utc::now());
        stored.metadata.last_execution_success = Some(success);
        stored.metadata.last_execution_duration_ms = Some(duration.as_millis() as u64);
        stored.metadata.updated_at = Utc::now();
        self.write_atomic(&self.path_for(name), &stored)
    }

    /// Remove a stored workflow.
    pub fn delete(&self, name: &str) -> Result<(), ManagerError> {
        validate_name(name)?;
        let path = self.path_for(name);
        if !path.exists() {
            return Err(ManagerError::NotFound {
                name: name.to_string(),
            });
        }
        fs::remove_file(path)?;
        Ok(())
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    fn read(&self, name: &str) -> Result<StoredWorkflow, ManagerError> {
        validate_name(name)?;
        let path = self.path_for(name);
        let raw = fs::read_to_string(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                ManagerError::NotFound {
                    name: name.to_string(),
                }
            } else {
                ManagerError::Io(err)
            }
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Temp file + rename in the same directory: readers see either the old
    /// or the new document, never a partial one.
    fn write_atomic(&self, path: &Path, stored: &StoredWorkflow) -> Result<(), ManagerError> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        serde_json::to_writer_pretty(&mut tmp, stored)?;
        tmp.flush()?;
        tmp.persist(path).map_err(|err| ManagerError::Io(err.error))?;
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), ManagerError> {
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(ManagerError::InvalidName {
            name: name.to_string(),
            reason: format!("longer than {MAX_NAME_CHARS} characters"),
        });
    }
    if !NAME_RE.is_match(name) {
        return Err(ManagerError::InvalidName {
            name: name.to_string(),
            reason: "must be kebab-case (lowercase letters, digits, dashes)".to_string(),
        });
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(ManagerError::InvalidName {
            name: name.to_string(),
            reason: "reserved word".to_string(),
        });
    }
    Ok(())
}
