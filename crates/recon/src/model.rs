use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::RecordId;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Which input column supplied a row's project identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdSource {
    #[serde(rename = "ProjectID")]
    ProjectId,
    #[serde(rename = "GrantID")]
    GrantId,
}

impl std::fmt::Display for IdSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProjectId => write!(f, "ProjectID"),
            Self::GrantId => write!(f, "GrantID"),
        }
    }
}

/// One CSV data line. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputRow {
    /// 1-based data-row index (header excluded).
    pub line: usize,
    pub project_id: String,
    pub doi: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_source: Option<IdSource>,
    /// Every input column in header order, echoed back on export.
    #[serde(skip)]
    pub fields: Vec<String>,
}

impl InputRow {
    pub fn new(line: usize, project_id: impl Into<String>, doi: impl Into<String>) -> Self {
        Self {
            line,
            project_id: project_id.into(),
            doi: doi.into(),
            id_source: Some(IdSource::ProjectId),
            fields: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Identifier schemes
// ---------------------------------------------------------------------------

/// Registry field a ProjectID can be matched against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemeField {
    /// The registry's own record key (Pure UUID).
    NativeKey,
    /// A classified identifier of the given type.
    Identifier { type_uri: String },
}

/// A named, site-configured identifier scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierScheme {
    pub label: String,
    pub field: SchemeField,
}

impl IdentifierScheme {
    pub fn native(label: impl Into<String>) -> Self {
        Self { label: label.into(), field: SchemeField::NativeKey }
    }

    pub fn identifier(label: impl Into<String>, type_uri: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            field: SchemeField::Identifier { type_uri: type_uri.into() },
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectMatch {
    pub record_id: RecordId,
    pub matched_scheme: IdentifierScheme,
    pub raw_value: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicationMatch {
    pub record_id: RecordId,
    /// Normalized DOI the record matched on.
    pub doi: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationState {
    Absent,
    AlreadyLinked,
    /// The project has relations, none of them to the target publication.
    LinkedToOtherUnrelatedEntity,
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "Matched-Applied")]
    MatchedApplied,
    #[serde(rename = "Matched-DryRun")]
    MatchedDryRun,
    #[serde(rename = "AlreadyLinked")]
    AlreadyLinked,
    #[serde(rename = "Ambiguous-Project")]
    AmbiguousProject,
    #[serde(rename = "Ambiguous-Publication")]
    AmbiguousPublication,
    #[serde(rename = "Unresolved-Project")]
    UnresolvedProject,
    #[serde(rename = "Unresolved-Publication")]
    UnresolvedPublication,
    #[serde(rename = "Skipped-Error")]
    SkippedError,
}

impl Outcome {
    pub const ALL: [Outcome; 8] = [
        Self::MatchedApplied,
        Self::MatchedDryRun,
        Self::AlreadyLinked,
        Self::AmbiguousProject,
        Self::AmbiguousPublication,
        Self::UnresolvedProject,
        Self::UnresolvedPublication,
        Self::SkippedError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MatchedApplied => "Matched-Applied",
            Self::MatchedDryRun => "Matched-DryRun",
            Self::AlreadyLinked => "AlreadyLinked",
            Self::AmbiguousProject => "Ambiguous-Project",
            Self::AmbiguousPublication => "Ambiguous-Publication",
            Self::UnresolvedProject => "Unresolved-Project",
            Self::UnresolvedPublication => "Unresolved-Publication",
            Self::SkippedError => "Skipped-Error",
        }
    }

    /// Rows a human has to look at before the next run.
    pub fn needs_review(&self) -> bool {
        matches!(
            self,
            Self::AmbiguousProject
                | Self::AmbiguousPublication
                | Self::UnresolvedProject
                | Self::UnresolvedPublication
        )
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal audit artifact for one input row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub row: InputRow,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_scheme: Option<String>,
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication: Option<PublicationMatch>,
    /// Distinct project records the ProjectID resolved to.
    pub project_candidates: usize,
    /// Ambiguous candidates already holding the relation (opt-in inspection).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidate_relations: Vec<RecordId>,
}

impl Decision {
    pub(crate) fn new(row: &InputRow, outcome: Outcome, notes: impl Into<String>) -> Self {
        Self {
            row: row.clone(),
            outcome,
            matched_scheme: None,
            notes: notes.into(),
            project: None,
            publication: None,
            project_candidates: 0,
            candidate_relations: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Writeback log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritebackAction {
    AddRelation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WritebackLogEntry {
    pub timestamp: DateTime<Utc>,
    pub project_record_id: RecordId,
    pub publication_record_id: RecordId,
    pub action: WritebackAction,
    pub dry_run: bool,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total_rows: usize,
    pub applied: usize,
    pub dry_run_matched: usize,
    pub already_linked: usize,
    pub ambiguous: usize,
    pub unresolved: usize,
    pub skipped_errors: usize,
    pub outcome_counts: BTreeMap<String, usize>,
}

impl BatchSummary {
    pub fn needs_review(&self) -> bool {
        self.ambiguous > 0 || self.unresolved > 0
    }

    pub fn has_errors(&self) -> bool {
        self.skipped_errors > 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub engine_version: String,
    pub run_at: String,
    pub dry_run: bool,
    pub jobs: usize,
    pub schemes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_blake3: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub meta: RunMeta,
    pub summary: BatchSummary,
    pub decisions: Vec<Decision>,
}
