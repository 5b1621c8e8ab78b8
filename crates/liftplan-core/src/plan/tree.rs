//! Pure plan tree operations
//!
//! Every operation takes the current tree by reference and returns a new
//! tree, leaving the input untouched. Any state container (or none) can keep
//! the old values around for undo/redo.
//!
//! Derived fields are refreshed on every returned tree, so callers never need
//! to recompute session durations or TUT themselves.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::model::{EntityKind, Exercise, Phase, PlanTree, Session};
use super::order;

/// Errors from tree operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// Referenced entity does not exist in the tree
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },
}

impl PlanError {
    fn not_found(kind: EntityKind, id: &str) -> Self {
        PlanError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type PlanResult<T> = Result<T, PlanError>;

/// Fresh entity id
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Default names for new entities
pub const NEW_PHASE_NAME: &str = "New Phase";
pub const NEW_SESSION_NAME: &str = "New Session";

/// Suffix appended to duplicated entity names
pub const COPY_SUFFIX: &str = " (Copy)";

/// Field changes for a phase; `None` leaves a field alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhasePatch {
    pub name: Option<String>,
}

/// Field changes for a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPatch {
    pub name: Option<String>,
}

/// Field changes for an exercise
///
/// Optional numeric fields use `Option<Option<_>>`: the outer `Some` means
/// "change", the inner value may clear the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExercisePatch {
    pub order_marker: Option<String>,
    pub description: Option<String>,
    pub exercise_catalog_id: Option<Option<String>>,
    pub motion: Option<Option<String>>,
    pub target_area: Option<Option<String>>,
    pub sets_min: Option<Option<u32>>,
    pub sets_max: Option<Option<u32>>,
    pub reps_min: Option<Option<u32>>,
    pub reps_max: Option<Option<u32>>,
    pub tempo: Option<Option<String>>,
    pub rest_min: Option<Option<u32>>,
    pub rest_max: Option<Option<u32>>,
    pub customizations: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub duration_minutes: Option<Option<u32>>,
}

impl ExercisePatch {
    fn apply(self, exercise: &mut Exercise) {
        if let Some(marker) = self.order_marker {
            exercise.order_marker = marker.trim().to_string();
        }
        if let Some(description) = self.description {
            exercise.description = description;
        }
        if let Some(v) = self.exercise_catalog_id {
            exercise.exercise_catalog_id = v;
        }
        if let Some(v) = self.motion {
            exercise.motion = v;
        }
        if let Some(v) = self.target_area {
            exercise.target_area = v;
        }
        if let Some(v) = self.sets_min {
            exercise.sets_min = v;
        }
        if let Some(v) = self.sets_max {
            exercise.sets_max = v;
        }
        if let Some(v) = self.reps_min {
            exercise.reps_min = v;
        }
        if let Some(v) = self.reps_max {
            exercise.reps_max = v;
        }
        if let Some(v) = self.tempo {
            exercise.tempo = v;
        }
        if let Some(v) = self.rest_min {
            exercise.rest_min = v;
        }
        if let Some(v) = self.rest_max {
            exercise.rest_max = v;
        }
        if let Some(v) = self.customizations {
            exercise.customizations = v;
        }
        if let Some(v) = self.notes {
            exercise.notes = v;
        }
        if let Some(v) = self.duration_minutes {
            exercise.duration_minutes = v;
        }
    }
}

fn next_order<I: IntoIterator<Item = i64>>(siblings: I) -> i64 {
    siblings.into_iter().max().map_or(0, |max| max + 1)
}

fn finish(mut tree: PlanTree) -> PlanTree {
    tree.recompute();
    tree
}

impl PlanTree {
    // =========================================================================
    // Add
    // =========================================================================

    /// Append a new inactive phase; returns the new tree and phase id
    pub fn add_phase(&self, name: Option<&str>) -> (PlanTree, String) {
        let mut tree = self.clone();
        let id = new_id();
        let mut phase = Phase::new(id.clone(), name.unwrap_or(NEW_PHASE_NAME));
        phase.order_number = next_order(tree.phases.iter().map(|p| p.order_number));
        tree.phases.push(phase);
        (finish(tree), id)
    }

    /// Append a new session to `phase_id`
    pub fn add_session(&self, phase_id: &str, name: Option<&str>) -> PlanResult<(PlanTree, String)> {
        let mut tree = self.clone();
        let phase = tree
            .find_phase_mut(phase_id)
            .ok_or_else(|| PlanError::not_found(EntityKind::Phase, phase_id))?;
        let id = new_id();
        let mut session = Session::new(id.clone(), phase_id, name.unwrap_or(NEW_SESSION_NAME));
        session.order_number = next_order(phase.sessions.iter().map(|s| s.order_number));
        phase.sessions.push(session);
        Ok((finish(tree), id))
    }

    /// Append a new, unresolved exercise to `session_id`
    ///
    /// The marker is chosen so the new row sorts after every sibling.
    pub fn add_exercise(&self, session_id: &str) -> PlanResult<(PlanTree, String)> {
        let mut tree = self.clone();
        let session = tree
            .find_session_mut(session_id)
            .ok_or_else(|| PlanError::not_found(EntityKind::Session, session_id))?;
        let id = new_id();
        let marker = order::next_marker(session.exercises.iter().map(|e| e.order_marker.as_str()));
        session.exercises.push(Exercise::new(id.clone(), session_id, marker));
        Ok((finish(tree), id))
    }

    // =========================================================================
    // Update
    // =========================================================================

    pub fn update_phase(&self, phase_id: &str, patch: PhasePatch) -> PlanResult<PlanTree> {
        let mut tree = self.clone();
        let phase = tree
            .find_phase_mut(phase_id)
            .ok_or_else(|| PlanError::not_found(EntityKind::Phase, phase_id))?;
        if let Some(name) = patch.name {
            phase.name = name;
        }
        Ok(finish(tree))
    }

    pub fn update_session(&self, session_id: &str, patch: SessionPatch) -> PlanResult<PlanTree> {
        let mut tree = self.clone();
        let session = tree
            .find_session_mut(session_id)
            .ok_or_else(|| PlanError::not_found(EntityKind::Session, session_id))?;
        if let Some(name) = patch.name {
            session.name = name;
        }
        Ok(finish(tree))
    }

    pub fn update_exercise(&self, exercise_id: &str, patch: ExercisePatch) -> PlanResult<PlanTree> {
        let mut tree = self.clone();
        let exercise = tree
            .find_exercise_mut(exercise_id)
            .ok_or_else(|| PlanError::not_found(EntityKind::Exercise, exercise_id))?;
        patch.apply(exercise);
        Ok(finish(tree))
    }

    /// Toggle the UI-only expansion flag
    pub fn set_expanded(&self, kind: EntityKind, id: &str, expanded: bool) -> PlanResult<PlanTree> {
        let mut tree = self.clone();
        let flag = match kind {
            EntityKind::Phase => tree.find_phase_mut(id).map(|p| &mut p.is_expanded),
            EntityKind::Session => tree.find_session_mut(id).map(|s| &mut s.is_expanded),
            EntityKind::Exercise => tree.find_exercise_mut(id).map(|e| &mut e.is_expanded),
        }
        .ok_or_else(|| PlanError::not_found(kind, id))?;
        *flag = expanded;
        Ok(tree)
    }

    // =========================================================================
    // Delete (cascading)
    // =========================================================================

    /// Remove a phase with all of its sessions and exercises
    pub fn delete_phase(&self, phase_id: &str) -> PlanResult<PlanTree> {
        if self.find_phase(phase_id).is_none() {
            return Err(PlanError::not_found(EntityKind::Phase, phase_id));
        }
        let mut tree = self.clone();
        tree.phases.retain(|p| p.id != phase_id);
        Ok(finish(tree))
    }

    /// Remove a session with all of its exercises
    pub fn delete_session(&self, session_id: &str) -> PlanResult<PlanTree> {
        if self.find_session(session_id).is_none() {
            return Err(PlanError::not_found(EntityKind::Session, session_id));
        }
        let mut tree = self.clone();
        for phase in &mut tree.phases {
            phase.sessions.retain(|s| s.id != session_id);
        }
        Ok(finish(tree))
    }

    pub fn delete_exercise(&self, exercise_id: &str) -> PlanResult<PlanTree> {
        if self.find_exercise(exercise_id).is_none() {
            return Err(PlanError::not_found(EntityKind::Exercise, exercise_id));
        }
        let mut tree = self.clone();
        for phase in &mut tree.phases {
            for session in &mut phase.sessions {
                session.exercises.retain(|e| e.id != exercise_id);
            }
        }
        Ok(finish(tree))
    }

    // =========================================================================
    // Duplicate (deep clone with fresh ids)
    // =========================================================================

    /// Deep-copy a phase and its whole subtree, appended last
    ///
    /// The copy is never active, so the single-active-phase invariant holds.
    pub fn duplicate_phase(&self, phase_id: &str) -> PlanResult<(PlanTree, String)> {
        let source = self
            .find_phase(phase_id)
            .ok_or_else(|| PlanError::not_found(EntityKind::Phase, phase_id))?;

        let new_phase_id = new_id();
        let mut copy = source.clone();
        copy.id = new_phase_id.clone();
        copy.name = format!("{}{}", source.name, COPY_SUFFIX);
        copy.is_active = false;
        copy.order_number = next_order(self.phases.iter().map(|p| p.order_number));
        for session in &mut copy.sessions {
            reidentify_session(session, &new_phase_id);
        }

        let mut tree = self.clone();
        tree.phases.push(copy);
        Ok((finish(tree), new_phase_id))
    }

    /// Deep-copy a session and its exercises into the same phase
    pub fn duplicate_session(&self, session_id: &str) -> PlanResult<(PlanTree, String)> {
        let source = self
            .find_session(session_id)
            .ok_or_else(|| PlanError::not_found(EntityKind::Session, session_id))?;
        let phase_id = source.phase_id.clone();

        let mut copy = source.clone();
        reidentify_session(&mut copy, &phase_id);
        copy.name = format!("{}{}", source.name, COPY_SUFFIX);
        let new_session_id = copy.id.clone();

        let mut tree = self.clone();
        let phase = tree
            .find_phase_mut(&phase_id)
            .ok_or_else(|| PlanError::not_found(EntityKind::Phase, &phase_id))?;
        copy.order_number = next_order(phase.sessions.iter().map(|s| s.order_number));
        phase.sessions.push(copy);
        Ok((finish(tree), new_session_id))
    }

    // =========================================================================
    // Activation
    // =========================================================================

    /// Make `phase_id` the only active phase
    pub fn toggle_activation(&self, phase_id: &str) -> PlanResult<PlanTree> {
        if self.find_phase(phase_id).is_none() {
            return Err(PlanError::not_found(EntityKind::Phase, phase_id));
        }
        let mut tree = self.clone();
        for phase in &mut tree.phases {
            phase.is_active = phase.id == phase_id;
        }
        Ok(tree)
    }
}

/// Give a session and its exercises fresh ids under `phase_id`
fn reidentify_session(session: &mut Session, phase_id: &str) {
    session.id = new_id();
    session.phase_id = phase_id.to_string();
    for exercise in &mut session.exercises {
        exercise.id = new_id();
        exercise.session_id = session.id.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> (PlanTree, String, String) {
        let (tree, phase_id) = PlanTree::default().add_phase(Some("Hypertrophy"));
        let (tree, session_id) = tree.add_session(&phase_id, Some("Push")).unwrap();
        let (tree, _) = tree.add_exercise(&session_id).unwrap();
        let (tree, _) = tree.add_exercise(&session_id).unwrap();
        (tree, phase_id, session_id)
    }

    #[test]
    fn test_add_assigns_increasing_order_numbers() {
        let (tree, a) = PlanTree::default().add_phase(None);
        let (tree, b) = tree.add_phase(None);
        assert_eq!(tree.find_phase(&a).unwrap().order_number, 0);
        assert_eq!(tree.find_phase(&b).unwrap().order_number, 1);
        assert_eq!(tree.find_phase(&a).unwrap().name, NEW_PHASE_NAME);

        let (_, _, session_id) = sample_tree();
        assert!(!session_id.is_empty());
    }

    #[test]
    fn test_new_exercises_sort_last_and_default_duration() {
        let (tree, _, session_id) = sample_tree();
        let session = tree.find_session(&session_id).unwrap();
        let markers: Vec<&str> = session.exercises.iter().map(|e| e.order_marker.as_str()).collect();
        assert_eq!(markers, vec!["A1", "B1"]);
        assert!(session.exercises[0].order_number < session.exercises[1].order_number);
        assert_eq!(session.duration_minutes, 16);
        assert!(!session.exercises[0].is_resolved());
    }

    #[test]
    fn test_add_under_missing_parent_fails() {
        let err = PlanTree::default().add_session("nope", None).unwrap_err();
        assert_eq!(
            err,
            PlanError::NotFound {
                kind: EntityKind::Phase,
                id: "nope".to_string()
            }
        );
    }

    #[test]
    fn test_operations_leave_input_untouched() {
        let (tree, phase_id, _) = sample_tree();
        let before = tree.clone();
        let _ = tree.delete_phase(&phase_id).unwrap();
        let _ = tree.duplicate_phase(&phase_id).unwrap();
        assert_eq!(tree, before);
    }

    #[test]
    fn test_delete_phase_cascades() {
        let (tree, phase_id, session_id) = sample_tree();
        let tree = tree.delete_phase(&phase_id).unwrap();
        assert!(tree.find_session(&session_id).is_none());
        assert_eq!(tree.exercise_count(), 0);
    }

    #[test]
    fn test_delete_session_cascades() {
        let (tree, phase_id, session_id) = sample_tree();
        let tree = tree.delete_session(&session_id).unwrap();
        assert!(tree.find_phase(&phase_id).unwrap().sessions.is_empty());
        assert_eq!(tree.exercise_count(), 0);
    }

    #[test]
    fn test_duplicate_phase_reparents_every_level() {
        let (tree, phase_id, session_id) = sample_tree();
        let tree = tree.toggle_activation(&phase_id).unwrap();
        let original_exercise_ids: Vec<String> =
            tree.exercises().map(|e| e.id.clone()).collect();

        let (dup, copy_id) = tree.duplicate_phase(&phase_id).unwrap();
        assert_ne!(copy_id, phase_id);

        let copy = dup.find_phase(&copy_id).unwrap();
        assert_eq!(copy.name, "Hypertrophy (Copy)");
        assert_eq!(copy.order_number, 1);
        assert!(!copy.is_active);
        assert_eq!(copy.sessions.len(), 1);

        let copied_session = &copy.sessions[0];
        assert_ne!(copied_session.id, session_id);
        assert_eq!(copied_session.phase_id, copy_id);
        assert_eq!(copied_session.exercises.len(), 2);
        for exercise in &copied_session.exercises {
            assert!(!original_exercise_ids.contains(&exercise.id));
            assert_eq!(exercise.session_id, copied_session.id);
        }

        // originals unchanged
        let original = dup.find_phase(&phase_id).unwrap();
        assert_eq!(original.sessions[0].id, session_id);
        let kept: Vec<String> = original.sessions[0].exercises.iter().map(|e| e.id.clone()).collect();
        assert_eq!(kept, original_exercise_ids);
    }

    #[test]
    fn test_duplicate_session_stays_in_phase() {
        let (tree, phase_id, session_id) = sample_tree();
        let (tree, copy_id) = tree.duplicate_session(&session_id).unwrap();
        let phase = tree.find_phase(&phase_id).unwrap();
        assert_eq!(phase.sessions.len(), 2);

        let copy = tree.find_session(&copy_id).unwrap();
        assert_eq!(copy.name, "Push (Copy)");
        assert_eq!(copy.phase_id, phase_id);
        assert_eq!(copy.order_number, 1);
        assert!(copy.exercises.iter().all(|e| e.session_id == copy_id));
    }

    #[test]
    fn test_toggle_activation_leaves_exactly_one_active() {
        let mut tree = PlanTree::default();
        let mut ids = Vec::new();
        for _ in 0..5 {
            let (next, id) = tree.add_phase(None);
            tree = next;
            ids.push(id);
        }
        let tree = tree.toggle_activation(&ids[0]).unwrap();
        let tree = tree.toggle_activation(&ids[3]).unwrap();

        let active: Vec<&str> = tree
            .phases
            .iter()
            .filter(|p| p.is_active)
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(active, vec![ids[3].as_str()]);
    }

    #[test]
    fn test_update_exercise_recomputes_derived_fields() {
        let (tree, _, session_id) = sample_tree();
        let exercise_id = tree.find_session(&session_id).unwrap().exercises[0].id.clone();

        let tree = tree
            .update_exercise(
                &exercise_id,
                ExercisePatch {
                    order_marker: Some("C2".to_string()),
                    tempo: Some(Some("3-0-1-0".to_string())),
                    sets_max: Some(Some(4)),
                    reps_max: Some(Some(10)),
                    duration_minutes: Some(Some(10)),
                    ..Default::default()
                },
            )
            .unwrap();

        let exercise = tree.find_exercise(&exercise_id).unwrap();
        assert_eq!(exercise.order_number, 202);
        assert_eq!(exercise.tut, Some(160));
        assert_eq!(tree.find_session(&session_id).unwrap().duration_minutes, 18);
    }

    #[test]
    fn test_set_expanded_only_touches_flag() {
        let (tree, phase_id, _) = sample_tree();
        let expanded = tree.set_expanded(EntityKind::Phase, &phase_id, true).unwrap();
        assert!(expanded.find_phase(&phase_id).unwrap().is_expanded);
        assert!(tree.set_expanded(EntityKind::Session, "missing", true).is_err());
    }
}
