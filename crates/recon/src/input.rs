//! CSV input loading.
//!
//! Headers are matched case-insensitively after trimming. Either `ProjectID`
//! or `GrantID` (or both) must be present alongside `DOI`; a non-empty
//! ProjectID wins per row. Every value is kept as text.

use crate::error::ReconError;
use crate::model::{IdSource, InputRow};

pub const PROJECT_ID_COLUMN: &str = "projectid";
pub const GRANT_ID_COLUMN: &str = "grantid";
pub const DOI_COLUMN: &str = "doi";

/// A loaded input file.
#[derive(Debug, Clone)]
pub struct InputBatch {
    /// Header names as written in the file.
    pub headers: Vec<String>,
    pub separator: u8,
    pub rows: Vec<InputRow>,
    /// `blake3:<hex>` of the raw content.
    pub fingerprint: String,
}

/// `,` unless `;` occurs strictly more often.
pub fn detect_separator(content: &str) -> u8 {
    let commas = content.matches(',').count();
    let semicolons = content.matches(';').count();
    if commas >= semicolons {
        b','
    } else {
        b';'
    }
}

/// Compute blake3 hash of bytes (with algorithm prefix).
pub fn hash_bytes(data: &[u8]) -> String {
    format!("blake3:{}", blake3::hash(data).to_hex())
}

pub fn normalize_header(h: &str) -> String {
    h.trim().to_lowercase()
}

/// Parse CSV content into input rows. Missing required columns abort the
/// whole batch before any row is looked at.
pub fn load_csv_rows(content: &str) -> Result<InputBatch, ReconError> {
    let fingerprint = hash_bytes(content.as_bytes());
    let content = content.trim_start_matches('\u{feff}');
    let separator = detect_separator(content);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(separator)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ReconError::InputParse(e.to_string()))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let idx = |name: &str| headers.iter().position(|h| normalize_header(h) == name);

    let doi_idx = idx(DOI_COLUMN).ok_or_else(|| ReconError::MissingColumn {
        column: "DOI".into(),
    })?;
    let project_idx = idx(PROJECT_ID_COLUMN);
    let grant_idx = idx(GRANT_ID_COLUMN);
    if project_idx.is_none() && grant_idx.is_none() {
        return Err(ReconError::MissingColumn {
            column: "ProjectID (or GrantID)".into(),
        });
    }

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| ReconError::InputParse(e.to_string()))?;
        let cell = |col: Option<usize>| -> String {
            col.and_then(|c| record.get(c)).unwrap_or("").trim().to_string()
        };

        let project = cell(project_idx);
        let grant = cell(grant_idx);
        let (project_id, id_source) = if !project.is_empty() {
            (project, Some(IdSource::ProjectId))
        } else if !grant.is_empty() {
            (grant, Some(IdSource::GrantId))
        } else {
            (String::new(), None)
        };

        let fields = (0..headers.len())
            .map(|c| record.get(c).unwrap_or("").to_string())
            .collect();

        rows.push(InputRow {
            line: i + 1,
            project_id,
            doi: cell(Some(doi_idx)),
            id_source,
            fields,
        });
    }

    Ok(InputBatch {
        headers,
        separator,
        rows,
        fingerprint,
    })
}
