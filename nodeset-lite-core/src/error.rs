use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::NodeKind;

/// Fatal errors. Any of these aborts the batch that raised it.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unresolved reference in {namespace}: {node} -> {target} ({role})")]
    UnresolvedReference {
        namespace: String,
        node: String,
        target: String,
        role: &'static str,
    },

    #[error("dangling reference in {namespace}: record {record} -> {target} ({role})")]
    DanglingReference {
        namespace: String,
        record: String,
        target: String,
        role: &'static str,
    },

    #[error("type conflict in {namespace}: {node} is a {existing}, requested as {requested}")]
    TypeConflict {
        namespace: String,
        node: String,
        existing: NodeKind,
        requested: NodeKind,
    },

    #[error("missing dependency for {namespace}: {}", missing.join(", "))]
    MissingDependency {
        namespace: String,
        missing: Vec<String>,
    },

    #[error("placeholder registration failed in {namespace}: {node}")]
    PlaceholderRegistrationFailure { namespace: String, node: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("store: {0}")]
    Store(String),

    #[error("format: {0}")]
    Format(#[from] std::fmt::Error),
}

impl ModelError {
    /// Stable code for the error class, used in diagnostics and CLI exit output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnresolvedReference { .. } => "unresolved_reference",
            Self::DanglingReference { .. } => "dangling_reference",
            Self::TypeConflict { .. } => "type_conflict",
            Self::MissingDependency { .. } => "missing_dependency",
            Self::PlaceholderRegistrationFailure { .. } => "placeholder_registration_failure",
            Self::Parse(_) => "parse",
            Self::InvalidDocument(_) => "invalid_document",
            Self::Store(_) => "store",
            Self::Format(_) => "format",
        }
    }

    /// Data problems come from the source documents or records; the rest
    /// indicate a bug or an infrastructure failure.
    pub fn is_data_error(&self) -> bool {
        !matches!(
            self,
            Self::PlaceholderRegistrationFailure { .. } | Self::Store(_) | Self::Format(_)
        )
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Parse(format!("JSON error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;

// ── Warnings ─────────────────────────────────────────────────

/// Non-fatal findings collected per batch and returned with its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchWarning {
    VersionMismatch {
        namespace: String,
        requested: Option<DateTime<Utc>>,
        selected: Option<DateTime<Utc>>,
        selected_version: Option<String>,
    },
    ParentConflict {
        namespace: String,
        node: String,
        kept: String,
        rejected: String,
    },
    UnsupportedNode {
        namespace: String,
        node: String,
        element: String,
    },
    DuplicateNode {
        namespace: String,
        node: String,
    },
    /// `ParentNodeId` names a node the builder cannot reach; the parent is
    /// then taken from child references alone.
    UnresolvedParent {
        namespace: String,
        node: String,
        parent: String,
    },
    DuplicateDocument {
        namespace: String,
        publication_date: Option<DateTime<Utc>>,
    },
    SchemaVersion {
        namespace: String,
        version: String,
    },
}

impl std::fmt::Display for BatchWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VersionMismatch {
                namespace,
                requested,
                selected,
                selected_version,
            } => write!(
                f,
                "version mismatch for {}: requested {}, using {} ({})",
                namespace,
                fmt_date(requested),
                fmt_date(selected),
                selected_version.as_deref().unwrap_or("unversioned")
            ),
            Self::ParentConflict {
                namespace,
                node,
                kept,
                rejected,
            } => write!(
                f,
                "parent conflict in {}: {} keeps parent {}, ignoring {}",
                namespace, node, kept, rejected
            ),
            Self::UnsupportedNode {
                namespace,
                node,
                element,
            } => write!(f, "unsupported {} {} in {} skipped", element, node, namespace),
            Self::DuplicateNode { namespace, node } => {
                write!(f, "duplicate node {} in {}", node, namespace)
            }
            Self::UnresolvedParent {
                namespace,
                node,
                parent,
            } => write!(
                f,
                "parent {} of {} in {} not found, ParentNodeId ignored",
                parent, node, namespace
            ),
            Self::DuplicateDocument {
                namespace,
                publication_date,
            } => write!(
                f,
                "namespace {} ({}) supplied more than once, later copies ignored",
                namespace,
                fmt_date(publication_date)
            ),
            Self::SchemaVersion { namespace, version } => write!(
                f,
                "version '{}' of {} is not numeric, exported as 1.0.0",
                version, namespace
            ),
        }
    }
}

fn fmt_date(date: &Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "any".to_string())
}

/// Per-batch warning sink. Every warning is logged when it is recorded.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    warnings: Vec<BatchWarning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, warning: BatchWarning) {
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[BatchWarning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.warnings.extend(other.warnings);
    }

    pub fn into_warnings(self) -> Vec<BatchWarning> {
        self.warnings
    }
}
