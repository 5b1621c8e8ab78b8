//! Save-time validation
//!
//! Runs in a fixed order and stops at the first violation: phase names,
//! session names, exercise descriptions, then catalog references.

use super::error::ValidationError;
use crate::plan::{EntityKind, PlanTree};

pub fn validate(tree: &PlanTree) -> Result<(), ValidationError> {
    if let Some(phase) = tree.phases.iter().find(|p| p.name.trim().is_empty()) {
        return Err(ValidationError::new(
            EntityKind::Phase,
            &phase.id,
            "phase name is required",
        ));
    }

    if let Some(session) = tree.sessions().find(|s| s.name.trim().is_empty()) {
        return Err(ValidationError::new(
            EntityKind::Session,
            &session.id,
            "session name is required",
        ));
    }

    if let Some(exercise) = tree.exercises().find(|e| e.description.trim().is_empty()) {
        return Err(ValidationError::new(
            EntityKind::Exercise,
            &exercise.id,
            "exercise description is required",
        ));
    }

    if let Some(exercise) = tree.exercises().find(|e| !e.is_resolved()) {
        return Err(ValidationError::new(
            EntityKind::Exercise,
            &exercise.id,
            format!(
                "'{}' is not linked to a catalog exercise",
                exercise.description.trim()
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ExercisePatch, PhasePatch};

    fn tree_with_exercise() -> (PlanTree, String, String) {
        let (tree, phase_id) = PlanTree::default().add_phase(Some("Base"));
        let (tree, session_id) = tree.add_session(&phase_id, Some("Upper")).unwrap();
        let (tree, exercise_id) = tree.add_exercise(&session_id).unwrap();
        (tree, phase_id, exercise_id)
    }

    #[test]
    fn test_empty_tree_is_valid() {
        assert!(validate(&PlanTree::default()).is_ok());
    }

    #[test]
    fn test_phase_name_checked_before_exercises() {
        let (tree, phase_id, _) = tree_with_exercise();
        let tree = tree
            .update_phase(&phase_id, PhasePatch { name: Some("  ".to_string()) })
            .unwrap();

        let err = validate(&tree).unwrap_err();
        assert_eq!(err.kind, EntityKind::Phase);
        assert_eq!(err.id, phase_id);
    }

    #[test]
    fn test_description_then_catalog_reference() {
        let (tree, _, exercise_id) = tree_with_exercise();
        let err = validate(&tree).unwrap_err();
        assert_eq!(err.message, "exercise description is required");

        let tree = tree
            .update_exercise(
                &exercise_id,
                ExercisePatch {
                    description: Some("Row".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        let err = validate(&tree).unwrap_err();
        assert_eq!(err.kind, EntityKind::Exercise);
        assert!(err.message.contains("catalog"));

        let tree = tree
            .update_exercise(
                &exercise_id,
                ExercisePatch {
                    exercise_catalog_id: Some(Some("c9".to_string())),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(validate(&tree).is_ok());
    }
}
