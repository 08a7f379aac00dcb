//! Prescription planner for the upcoming session.
//!
//! Turns a list of exercises plus the reconciled progression map into the
//! rep range, effort target, rest and starting load for each exercise. The
//! planner is pure: identical inputs always give identical prescriptions.

use crate::meta::{self, DEFAULT_SETS_PLANNED};
use crate::{
    Catalog, ExerciseInput, ExerciseMeta, ExercisePrescription, ProgressionMap, ProgressionRule,
    RirRange,
};

const RIR_TARGET_COMPOUND: RirRange = RirRange { min: 1, max: 2 };
const RIR_TARGET_ISOLATION: RirRange = RirRange { min: 0, max: 1 };

/// Effort target for an exercise: compounds stop further from failure
pub fn rir_target(meta: &ExerciseMeta) -> RirRange {
    if meta.is_compound {
        RIR_TARGET_COMPOUND
    } else {
        RIR_TARGET_ISOLATION
    }
}

/// Prescribe every requested exercise
///
/// The load comes from the progression state's recommendation, falling back
/// to the last load used, and is `None` for exercises never trained.
pub fn plan(
    exercises: &[ExerciseInput],
    progression: &ProgressionMap,
    catalog: &Catalog,
) -> Vec<ExercisePrescription> {
    exercises
        .iter()
        .map(|exercise| {
            let meta = meta::resolve(exercise, catalog.get(&exercise.exercise_id));
            let rir = rir_target(&meta);

            let load_recommendation = progression
                .get(&exercise.exercise_id)
                .and_then(|state| state.recommended_load.or(state.last_load));

            tracing::debug!(
                "Prescribing {}: {}-{} reps, load {:?}",
                meta.id,
                meta.rep_range.min,
                meta.rep_range.max,
                load_recommendation
            );

            ExercisePrescription {
                exercise_id: exercise.exercise_id.clone(),
                sets_planned: exercise
                    .sets_planned
                    .or(meta.default_sets)
                    .unwrap_or(DEFAULT_SETS_PLANNED),
                rep_range: meta.rep_range,
                rir_target: rir,
                rest_sec: meta.rest_sec,
                load_recommendation,
                progression_rule: ProgressionRule::DoubleProgression,
                notes: format!(
                    "Raise the load once every set reaches {} reps at RIR ~{}-{}.",
                    meta.rep_range.max, rir.min, rir.max
                ),
            }
        })
        .collect()
}
