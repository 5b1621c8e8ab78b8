//! Change tracking against the last synced snapshot
//!
//! The tree is flattened into one row per entity holding only the tracked
//! fields (as JSON values) plus the parent reference. Diffs compare rows by
//! id: rows only in the current tree are added, rows only in the baseline
//! are deleted, and rows whose tracked values differ are updated.
//!
//! UI-only state (`is_expanded`) and the exercise description are not in the
//! allow-lists and never produce an update record.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::Value;

use crate::plan::{EntityKind, Exercise, Phase, PlanTree, Session};

/// Tracked fields per level
pub const PHASE_FIELDS: &[&str] = &["name", "is_active", "order_number"];
pub const SESSION_FIELDS: &[&str] = &["name", "order_number", "duration_minutes"];
pub const EXERCISE_FIELDS: &[&str] = &[
    "order_marker",
    "motion",
    "target_area",
    "exercise_catalog_id",
    "sets_min",
    "sets_max",
    "reps_min",
    "reps_max",
    "tempo",
    "tut",
    "rest_min",
    "rest_max",
    "customizations",
    "notes",
];

/// One changed entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateRecord {
    pub id: String,
    /// Owning phase or session; `None` for phases
    pub parent_id: Option<String>,
    /// Changed tracked fields with their current values
    pub changes: BTreeMap<String, Value>,
}

/// Differences for one level of the tree
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LevelDiff {
    pub added: Vec<String>,
    pub updated: Vec<UpdateRecord>,
    pub deleted: Vec<String>,
}

impl LevelDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.deleted.len()
    }
}

/// Differences across all three levels
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSet {
    pub phases: LevelDiff,
    pub sessions: LevelDiff,
    pub exercises: LevelDiff,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty() && self.sessions.is_empty() && self.exercises.is_empty()
    }

    /// Total number of changed entities
    pub fn len(&self) -> usize {
        self.phases.len() + self.sessions.len() + self.exercises.len()
    }

    pub fn level(&self, kind: EntityKind) -> &LevelDiff {
        match kind {
            EntityKind::Phase => &self.phases,
            EntityKind::Session => &self.sessions,
            EntityKind::Exercise => &self.exercises,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct FlatRow {
    id: String,
    parent_id: Option<String>,
    fields: BTreeMap<&'static str, Value>,
}

/// Rows of one level in tree order
type FlatLevel = Vec<FlatRow>;

#[derive(Debug, Clone, Default, PartialEq)]
struct Flattened {
    phases: FlatLevel,
    sessions: FlatLevel,
    exercises: FlatLevel,
}

impl Flattened {
    fn from_tree(tree: &PlanTree) -> Self {
        let mut flat = Self::default();
        for phase in &tree.phases {
            flat.phases.push(phase_row(phase));
            for session in &phase.sessions {
                flat.sessions.push(session_row(session));
                for exercise in &session.exercises {
                    flat.exercises.push(exercise_row(exercise));
                }
            }
        }
        flat
    }

    fn level(&self, kind: EntityKind) -> &FlatLevel {
        match kind {
            EntityKind::Phase => &self.phases,
            EntityKind::Session => &self.sessions,
            EntityKind::Exercise => &self.exercises,
        }
    }
}

macro_rules! tracked {
    ($entity:expr; $($field:ident),+ $(,)?) => {{
        let mut fields = BTreeMap::new();
        $(
            fields.insert(
                stringify!($field),
                serde_json::to_value(&$entity.$field).unwrap_or(Value::Null),
            );
        )+
        fields
    }};
}

fn phase_row(phase: &Phase) -> FlatRow {
    FlatRow {
        id: phase.id.clone(),
        parent_id: None,
        fields: tracked!(phase; name, is_active, order_number),
    }
}

fn session_row(session: &Session) -> FlatRow {
    FlatRow {
        id: session.id.clone(),
        parent_id: Some(session.phase_id.clone()),
        fields: tracked!(session; name, order_number, duration_minutes),
    }
}

fn exercise_row(exercise: &Exercise) -> FlatRow {
    FlatRow {
        id: exercise.id.clone(),
        parent_id: Some(exercise.session_id.clone()),
        fields: tracked!(
            exercise;
            order_marker,
            motion,
            target_area,
            exercise_catalog_id,
            sets_min,
            sets_max,
            reps_min,
            reps_max,
            tempo,
            tut,
            rest_min,
            rest_max,
            customizations,
            notes,
        ),
    }
}

fn diff_level(baseline: &FlatLevel, current: &FlatLevel) -> LevelDiff {
    let before: HashMap<&str, &FlatRow> = baseline.iter().map(|r| (r.id.as_str(), r)).collect();
    let after: HashMap<&str, &FlatRow> = current.iter().map(|r| (r.id.as_str(), r)).collect();

    let mut diff = LevelDiff::default();
    for row in current {
        let Some(old) = before.get(row.id.as_str()) else {
            diff.added.push(row.id.clone());
            continue;
        };
        let changes: BTreeMap<String, Value> = row
            .fields
            .iter()
            .filter(|(name, value)| old.fields.get(*name) != Some(*value))
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        if !changes.is_empty() {
            diff.updated.push(UpdateRecord {
                id: row.id.clone(),
                parent_id: row.parent_id.clone(),
                changes,
            });
        }
    }
    diff.deleted = baseline
        .iter()
        .filter(|r| !after.contains_key(r.id.as_str()))
        .map(|r| r.id.clone())
        .collect();
    diff
}

/// Baseline snapshot plus the latest tree
#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    baseline: Flattened,
    current: PlanTree,
}

impl ChangeTracker {
    pub fn new(baseline: &PlanTree) -> Self {
        let mut tracker = Self::default();
        tracker.reset(baseline);
        tracker
    }

    /// Make `tree` both the baseline and the current state
    pub fn reset(&mut self, tree: &PlanTree) {
        self.baseline = Flattened::from_tree(tree);
        self.current = tree.clone();
    }

    /// Record the latest tree; diffs are computed on demand
    pub fn update_current_state(&mut self, tree: &PlanTree) {
        self.current = tree.clone();
    }

    pub fn current(&self) -> &PlanTree {
        &self.current
    }

    pub fn diff(&self, kind: EntityKind) -> LevelDiff {
        let current = Flattened::from_tree(&self.current);
        diff_level(self.baseline.level(kind), current.level(kind))
    }

    pub fn change_set(&self) -> ChangeSet {
        let current = Flattened::from_tree(&self.current);
        ChangeSet {
            phases: diff_level(&self.baseline.phases, &current.phases),
            sessions: diff_level(&self.baseline.sessions, &current.sessions),
            exercises: diff_level(&self.baseline.exercises, &current.exercises),
        }
    }

    pub fn has_changes(&self) -> bool {
        self.baseline != Flattened::from_tree(&self.current)
    }
}
