//! Plan tree data model
//!
//! A plan is a three-level hierarchy:
//! ```text
//! Phase (at most one active)
//! └── Session (duration = sum of exercise durations)
//!     └── Exercise (ordered by marker, e.g. "A1", "A2", "B1")
//! ```
//!
//! Child rows carry their parent's id (`phase_id`, `session_id`) so the
//! flattened rows produced for diffing can be routed without the tree.

use serde::{Deserialize, Serialize};

use super::order;
use crate::constants::plan::DEFAULT_EXERCISE_MINUTES;

/// Entity level inside the plan tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Phase,
    Session,
    Exercise,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Phase => write!(f, "phase"),
            EntityKind::Session => write!(f, "session"),
            EntityKind::Exercise => write!(f, "exercise"),
        }
    }
}

/// A single exercise prescription within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: String,
    pub session_id: String,
    /// Catalog reference; `None` until the description resolves
    #[serde(default)]
    pub exercise_catalog_id: Option<String>,
    /// Human-facing order label ("A1", "B2")
    #[serde(default)]
    pub order_marker: String,
    /// Codec output of `order_marker`, never shown to users
    #[serde(default)]
    pub order_number: i64,
    /// Exercise text as entered or imported
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub motion: Option<String>,
    #[serde(default)]
    pub target_area: Option<String>,
    #[serde(default)]
    pub sets_min: Option<u32>,
    #[serde(default)]
    pub sets_max: Option<u32>,
    #[serde(default)]
    pub reps_min: Option<u32>,
    #[serde(default)]
    pub reps_max: Option<u32>,
    #[serde(default)]
    pub tempo: Option<String>,
    #[serde(default)]
    pub rest_min: Option<u32>,
    #[serde(default)]
    pub rest_max: Option<u32>,
    /// Time under tension, derived from tempo, sets and reps
    #[serde(default)]
    pub tut: Option<u32>,
    #[serde(default)]
    pub customizations: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    /// UI-only
    #[serde(default)]
    pub is_expanded: bool,
}

impl Exercise {
    /// Create an empty, unresolved exercise under `session_id`
    pub fn new(
        id: impl Into<String>,
        session_id: impl Into<String>,
        order_marker: impl Into<String>,
    ) -> Self {
        let order_marker = order_marker.into();
        Self {
            id: id.into(),
            session_id: session_id.into(),
            exercise_catalog_id: None,
            order_number: order::encode(&order_marker),
            order_marker,
            description: String::new(),
            motion: None,
            target_area: None,
            sets_min: None,
            sets_max: None,
            reps_min: None,
            reps_max: None,
            tempo: None,
            rest_min: None,
            rest_max: None,
            tut: None,
            customizations: None,
            notes: None,
            duration_minutes: None,
            is_expanded: false,
        }
    }

    /// Whether the exercise carries a usable catalog reference
    pub fn is_resolved(&self) -> bool {
        self.exercise_catalog_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty())
    }

    /// Duration used for session totals
    pub fn effective_minutes(&self) -> u32 {
        self.duration_minutes.unwrap_or(DEFAULT_EXERCISE_MINUTES)
    }

    /// Recompute fields derived from other inputs
    pub(crate) fn recompute(&mut self) {
        self.order_number = order::encode(&self.order_marker);
        self.tut = time_under_tension(self.tempo.as_deref(), self.sets_max, self.reps_max);
    }
}

/// (sum of tempo digits) × max sets × max reps
///
/// Tempo strings look like `3-1-2-0` or `3120`; any non-digit is ignored.
/// Returns `None` when an input is missing or the tempo has no digits.
pub fn time_under_tension(tempo: Option<&str>, sets_max: Option<u32>, reps_max: Option<u32>) -> Option<u32> {
    let tempo = tempo?;
    let mut saw_digit = false;
    let per_rep: u32 = tempo
        .chars()
        .filter_map(|c| c.to_digit(10))
        .inspect(|_| saw_digit = true)
        .sum();
    if !saw_digit {
        return None;
    }
    per_rep.checked_mul(sets_max?)?.checked_mul(reps_max?)
}

/// A training session within a phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub phase_id: String,
    pub name: String,
    /// Always the sum of child exercise durations
    #[serde(default)]
    pub duration_minutes: u32,
    #[serde(default)]
    pub order_number: i64,
    #[serde(default)]
    pub exercises: Vec<Exercise>,
    /// UI-only
    #[serde(default)]
    pub is_expanded: bool,
}

impl Session {
    pub fn new(id: impl Into<String>, phase_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            phase_id: phase_id.into(),
            name: name.into(),
            duration_minutes: 0,
            order_number: 0,
            exercises: Vec::new(),
            is_expanded: false,
        }
    }

    pub(crate) fn recompute(&mut self) {
        for exercise in &mut self.exercises {
            exercise.recompute();
        }
        self.duration_minutes = self.exercises.iter().map(Exercise::effective_minutes).sum();
    }
}

/// A training phase (block of sessions)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub order_number: i64,
    #[serde(default)]
    pub sessions: Vec<Session>,
    /// UI-only
    #[serde(default)]
    pub is_expanded: bool,
}

impl Phase {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_active: false,
            order_number: 0,
            sessions: Vec::new(),
            is_expanded: false,
        }
    }
}

/// The whole plan owned by one client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanTree {
    pub phases: Vec<Phase>,
}

impl PlanTree {
    pub fn new(phases: Vec<Phase>) -> Self {
        let mut tree = Self { phases };
        tree.recompute();
        tree
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Refresh every derived field (order numbers, TUT, session durations)
    pub fn recompute(&mut self) {
        for phase in &mut self.phases {
            for session in &mut phase.sessions {
                session.recompute();
            }
        }
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.phases.iter().flat_map(|p| &p.sessions)
    }

    pub fn exercises(&self) -> impl Iterator<Item = &Exercise> {
        self.sessions().flat_map(|s| &s.exercises)
    }

    pub fn exercise_count(&self) -> usize {
        self.exercises().count()
    }

    pub fn active_phase(&self) -> Option<&Phase> {
        self.phases.iter().find(|p| p.is_active)
    }

    pub fn find_phase(&self, id: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.id == id)
    }

    pub fn find_session(&self, id: &str) -> Option<&Session> {
        self.sessions().find(|s| s.id == id)
    }

    pub fn find_exercise(&self, id: &str) -> Option<&Exercise> {
        self.exercises().find(|e| e.id == id)
    }

    pub(crate) fn find_phase_mut(&mut self, id: &str) -> Option<&mut Phase> {
        self.phases.iter_mut().find(|p| p.id == id)
    }

    pub(crate) fn find_session_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.phases
            .iter_mut()
            .flat_map(|p| &mut p.sessions)
            .find(|s| s.id == id)
    }

    pub(crate) fn find_exercise_mut(&mut self, id: &str) -> Option<&mut Exercise> {
        self.phases
            .iter_mut()
            .flat_map(|p| &mut p.sessions)
            .flat_map(|s| &mut s.exercises)
            .find(|e| e.id == id)
    }

    /// Copy with every sibling set ordered by its sort key
    ///
    /// Exercises tie-break on the marker text so equal codec values (e.g.
    /// two unparseable markers) still order deterministically.
    pub fn sorted(&self) -> PlanTree {
        let mut tree = self.clone();
        tree.phases.sort_by_key(|p| p.order_number);
        for phase in &mut tree.phases {
            phase.sessions.sort_by_key(|s| s.order_number);
            for session in &mut phase.sessions {
                session.exercises.sort_by(|a, b| {
                    a.order_number
                        .cmp(&b.order_number)
                        .then_with(|| a.order_marker.cmp(&b.order_marker))
                });
            }
        }
        tree
    }
}
