//! CSV import and export
//!
//! Format: UTF-8, comma separated, no quoting, one row per exercise under a
//! fixed 12-column header. Commas inside values are written as semicolons so
//! every row splits cleanly without quotes.
//!
//! Import groups rows by phase name, then by (phase, session), both in
//! first-seen order, and resolves each description against the catalog.
//! Rows that do not resolve are kept in the tree and listed in the report.

use std::collections::{HashMap, HashSet};

use csv::{QuoteStyle, ReaderBuilder, StringRecord, WriterBuilder};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::ExerciseCatalog;
use crate::plan::{new_id, order, Exercise, Phase, PlanTree, Session};

pub const PHASE_NAME: &str = "PhaseName";
pub const SESSION_NAME: &str = "SessionName";
pub const EXERCISE_ORDER: &str = "ExerciseOrder";
pub const EXERCISE_DESCRIPTION: &str = "ExerciseDescription";
pub const SETS_MIN: &str = "SetsMin";
pub const SETS_MAX: &str = "SetsMax";
pub const REPS_MIN: &str = "RepsMin";
pub const REPS_MAX: &str = "RepsMax";
pub const TEMPO: &str = "Tempo";
pub const REST_MIN: &str = "RestMin";
pub const REST_MAX: &str = "RestMax";
pub const CUSTOMIZATIONS: &str = "Customizations";

/// Column order used by export
pub const HEADER: [&str; 12] = [
    PHASE_NAME,
    SESSION_NAME,
    EXERCISE_ORDER,
    EXERCISE_DESCRIPTION,
    SETS_MIN,
    SETS_MAX,
    REPS_MIN,
    REPS_MAX,
    TEMPO,
    REST_MIN,
    REST_MAX,
    CUSTOMIZATIONS,
];

#[derive(Debug, Error)]
pub enum CsvError {
    /// Header is not exactly the expected column set
    #[error("invalid header: expected {expected}, found {found}")]
    Header { expected: String, found: String },

    #[error("line {line}: expected {expected} fields, found {found}")]
    RowLength {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: {column} must be a whole number, found '{value}'")]
    InvalidNumber {
        line: u64,
        column: &'static str,
        value: String,
    },

    #[error("line {line}: {column} is required")]
    MissingValue { line: u64, column: &'static str },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to write csv: {0}")]
    Write(String),
}

/// Imported row whose description matched no catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedRow {
    pub line: u64,
    pub phase: String,
    pub session: String,
    pub description: String,
    pub exercise_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub tree: PlanTree,
    pub unresolved: Vec<UnresolvedRow>,
}

impl ImportReport {
    pub fn rows(&self) -> usize {
        self.tree.exercise_count()
    }
}

// =============================================================================
// Export
// =============================================================================

/// Render the tree, one row per exercise in sort order
pub fn export(tree: &PlanTree) -> Result<String, CsvError> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Never)
        .from_writer(Vec::new());
    writer.write_record(HEADER)?;

    let sorted = tree.sorted();
    for phase in &sorted.phases {
        for session in &phase.sessions {
            for exercise in &session.exercises {
                writer.write_record(export_row(&phase.name, &session.name, exercise))?;
            }
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CsvError::Write(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CsvError::Write(e.to_string()))
}

fn export_row(phase: &str, session: &str, exercise: &Exercise) -> [String; 12] {
    let number = |v: Option<u32>| v.map(|n| n.to_string()).unwrap_or_default();
    let text = |v: &Option<String>| v.as_deref().map(sanitize).unwrap_or_default();
    [
        sanitize(phase),
        sanitize(session),
        sanitize(&exercise.order_marker),
        sanitize(&exercise.description),
        number(exercise.sets_min),
        number(exercise.sets_max),
        number(exercise.reps_min),
        number(exercise.reps_max),
        text(&exercise.tempo),
        number(exercise.rest_min),
        number(exercise.rest_max),
        text(&exercise.customizations),
    ]
}

/// Unquoted cells cannot carry delimiters or line breaks
fn sanitize(value: &str) -> String {
    value
        .replace(',', ";")
        .replace(['\r', '\n'], " ")
}

// =============================================================================
// Import
// =============================================================================

/// Column positions taken from the file's own header
struct Columns(HashMap<&'static str, usize>);

impl Columns {
    fn from_header(header: &StringRecord) -> Result<Self, CsvError> {
        let found: Vec<&str> = header.iter().map(str::trim).collect();
        let expected: HashSet<&str> = HEADER.iter().copied().collect();
        let unique: HashSet<&str> = found.iter().copied().collect();

        if unique != expected || found.len() != HEADER.len() {
            return Err(CsvError::Header {
                expected: HEADER.join(","),
                found: found.join(","),
            });
        }

        let positions = HEADER
            .iter()
            .filter_map(|name| found.iter().position(|f| f == name).map(|i| (*name, i)))
            .collect();
        Ok(Self(positions))
    }

    fn get<'r>(&self, record: &'r StringRecord, column: &'static str) -> &'r str {
        self.0
            .get(column)
            .and_then(|&i| record.get(i))
            .map(str::trim)
            .unwrap_or("")
    }

    fn text(&self, record: &StringRecord, column: &'static str) -> Option<String> {
        let value = self.get(record, column);
        (!value.is_empty()).then(|| value.to_string())
    }

    fn required(&self, record: &StringRecord, column: &'static str, line: u64) -> Result<String, CsvError> {
        self.text(record, column)
            .ok_or(CsvError::MissingValue { line, column })
    }

    fn number(&self, record: &StringRecord, column: &'static str, line: u64) -> Result<Option<u32>, CsvError> {
        let value = self.get(record, column);
        if value.is_empty() {
            return Ok(None);
        }
        value
            .parse()
            .map(Some)
            .map_err(|_| CsvError::InvalidNumber {
                line,
                column,
                value: value.to_string(),
            })
    }
}

/// Parse `text` into a fresh tree with new ids
pub fn import(text: &str, catalog: &ExerciseCatalog) -> Result<ImportReport, CsvError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .quoting(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns = Columns::from_header(reader.headers()?)?;

    let mut phases: Vec<Phase> = Vec::new();
    let mut phase_index: HashMap<String, usize> = HashMap::new();
    let mut session_index: HashMap<(String, String), (usize, usize)> = HashMap::new();
    let mut unresolved = Vec::new();

    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        if record.len() != HEADER.len() {
            return Err(CsvError::RowLength {
                line,
                expected: HEADER.len(),
                found: record.len(),
            });
        }

        let phase_name = columns.required(&record, PHASE_NAME, line)?;
        let session_name = columns.required(&record, SESSION_NAME, line)?;

        let p = *phase_index.entry(phase_name.clone()).or_insert_with(|| {
            let mut phase = Phase::new(new_id(), phase_name.clone());
            phase.order_number = phases.len() as i64;
            phases.push(phase);
            phases.len() - 1
        });
        let (p, s) = *session_index
            .entry((phase_name.clone(), session_name.clone()))
            .or_insert_with(|| {
                let phase = &mut phases[p];
                let mut session = Session::new(new_id(), phase.id.clone(), session_name.clone());
                session.order_number = phase.sessions.len() as i64;
                phase.sessions.push(session);
                (p, phase.sessions.len() - 1)
            });
        let session = &mut phases[p].sessions[s];

        let marker = columns.text(&record, EXERCISE_ORDER).unwrap_or_else(|| {
            order::next_marker(session.exercises.iter().map(|e| e.order_marker.as_str()))
        });
        let mut exercise = Exercise::new(new_id(), session.id.clone(), marker);
        exercise.description = columns.get(&record, EXERCISE_DESCRIPTION).to_string();
        exercise.sets_min = columns.number(&record, SETS_MIN, line)?;
        exercise.sets_max = columns.number(&record, SETS_MAX, line)?;
        exercise.reps_min = columns.number(&record, REPS_MIN, line)?;
        exercise.reps_max = columns.number(&record, REPS_MAX, line)?;
        exercise.tempo = columns.text(&record, TEMPO);
        exercise.rest_min = columns.number(&record, REST_MIN, line)?;
        exercise.rest_max = columns.number(&record, REST_MAX, line)?;
        exercise.customizations = columns.text(&record, CUSTOMIZATIONS);

        match catalog.resolve(&exercise.description) {
            Some(entry) => {
                exercise.exercise_catalog_id = Some(entry.catalog_id.clone());
                exercise.motion = entry.motion.clone();
                exercise.target_area = entry.target_area.clone();
            }
            None => {
                debug!(line, description = %exercise.description, "Unresolved import row");
                unresolved.push(UnresolvedRow {
                    line,
                    phase: phase_name,
                    session: session_name,
                    description: exercise.description.clone(),
                    exercise_id: exercise.id.clone(),
                });
            }
        }
        session.exercises.push(exercise);
    }

    if let Some(first) = phases.first_mut() {
        first.is_active = true;
    }

    let tree = PlanTree::new(phases);
    info!(
        phases = tree.phases.len(),
        exercises = tree.exercise_count(),
        unresolved = unresolved.len(),
        "CSV imported"
    );
    Ok(ImportReport { tree, unresolved })
}
