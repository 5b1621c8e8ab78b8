//! Workout plan tree
//!
//! Phases → Sessions → Exercises, edited through pure operations:
//! - `model`: the entity types and derived-field rules
//! - `tree`: add / update / delete / duplicate / activation operations
//! - `order`: order marker codec ("A1" → sort integer)

mod model;
pub mod order;
mod tree;

pub use model::{time_under_tension, EntityKind, Exercise, Phase, PlanTree, Session};
pub use tree::{
    new_id, ExercisePatch, PhasePatch, PlanError, PlanResult, SessionPatch, COPY_SUFFIX,
    NEW_PHASE_NAME, NEW_SESSION_NAME,
};
