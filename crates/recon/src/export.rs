//! Annotated CSV output.
//!
//! Echoes every input column in order, then appends the decision columns.
//! Input columns that carry a decision column's name (a re-uploaded result
//! file) are dropped so each run writes exactly one set of annotations.

use std::io::Write;

use crate::error::ReconError;
use crate::input::normalize_header;
use crate::model::Decision;

pub const ANNOTATION_COLUMNS: [&str; 8] = [
    "outcome",
    "matched_scheme",
    "notes",
    "project_uuid",
    "publication_uuid",
    "project_title",
    "publication_title",
    "input_id_source",
];

/// Write `decisions` (already in input order) as CSV using `separator`.
pub fn write_decisions_csv<W: Write>(
    out: W,
    headers: &[String],
    separator: u8,
    decisions: &[Decision],
) -> Result<(), ReconError> {
    let kept: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !ANNOTATION_COLUMNS.contains(&normalize_header(h).as_str()))
        .map(|(i, _)| i)
        .collect();

    let mut writer = csv::WriterBuilder::new().delimiter(separator).from_writer(out);

    let mut header_row: Vec<&str> = kept.iter().map(|&i| headers[i].as_str()).collect();
    header_row.extend(ANNOTATION_COLUMNS);
    writer.write_record(&header_row)?;

    for d in decisions {
        let mut record: Vec<String> = kept
            .iter()
            .map(|&i| d.row.fields.get(i).cloned().unwrap_or_default())
            .collect();
        record.push(d.outcome.to_string());
        record.push(d.matched_scheme.clone().unwrap_or_default());
        record.push(d.notes.clone());
        record.push(d.project.as_ref().map(|p| p.record_id.to_string()).unwrap_or_default());
        record.push(d.publication.as_ref().map(|p| p.record_id.to_string()).unwrap_or_default());
        record.push(d.project.as_ref().map(|p| p.title.clone()).unwrap_or_default());
        record.push(d.publication.as_ref().map(|p| p.title.clone()).unwrap_or_default());
        record.push(d.row.id_source.map(|s| s.to_string()).unwrap_or_default());
        writer.write_record(&record)?;
    }

    writer.flush().map_err(|e| ReconError::Io(e.to_string()))?;
    Ok(())
}
