//! Adapter from recorded session shapes to the canonical session log.
//!
//! Workout records reach us in a few shapes: a `workSets` list with optional
//! `feederSets` (warm-ups, ignored for progression), or an older single
//! `sets` list. Loads may be called `load`, `loadKg` or `kg`, technique may be
//! `null`, and in-progress records carry a `done` flag per set. Everything is
//! normalized here so the engine only ever sees [`SetLog`] lists.

use crate::{ExerciseInput, ExerciseSessionLog, Result, SetLog, TechniqueFlag, WorkoutSessionLog};
use serde::Deserialize;

/// A set as recorded by any client version
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSetLog {
    #[serde(default)]
    set_index: Option<u32>,
    reps: u32,
    #[serde(default, alias = "loadKg", alias = "kg")]
    load: f64,
    #[serde(default)]
    rir: Option<u32>,
    #[serde(default)]
    technique: Option<TechniqueFlag>,
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    done: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExerciseSessionLog {
    #[serde(flatten)]
    exercise: ExerciseInput,
    #[serde(default)]
    work_sets: Option<Vec<RawSetLog>>,
    #[serde(default)]
    sets: Option<Vec<RawSetLog>>,
    #[serde(default)]
    created_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWorkoutSessionLog {
    workout_id: String,
    #[serde(alias = "dateISO")]
    date: String,
    exercises: Vec<RawExerciseSessionLog>,
    #[serde(default)]
    duration_sec: Option<u32>,
}

impl From<RawExerciseSessionLog> for ExerciseSessionLog {
    fn from(raw: RawExerciseSessionLog) -> Self {
        let created_at = raw.created_at.unwrap_or(0);
        // Work sets win over the legacy single list
        let recorded = raw.work_sets.or(raw.sets).unwrap_or_default();

        let sets = recorded
            .into_iter()
            .filter(|set| set.done != Some(false))
            .enumerate()
            .map(|(position, set)| SetLog {
                set_index: set.set_index.unwrap_or(position as u32),
                reps: set.reps,
                load: set.load,
                rir: set.rir,
                technique: set.technique.unwrap_or_default(),
                created_at: set.created_at.unwrap_or(created_at),
            })
            .collect();

        ExerciseSessionLog {
            exercise: raw.exercise,
            sets,
            created_at,
        }
    }
}

impl From<RawWorkoutSessionLog> for WorkoutSessionLog {
    fn from(raw: RawWorkoutSessionLog) -> Self {
        WorkoutSessionLog {
            workout_id: raw.workout_id,
            date: raw.date,
            exercises: raw.exercises.into_iter().map(Into::into).collect(),
            duration_sec: raw.duration_sec,
        }
    }
}

/// Parse a workout record in any accepted shape
pub fn parse_workout_log(json: &str) -> Result<WorkoutSessionLog> {
    let raw: RawWorkoutSessionLog = serde_json::from_str(json)?;
    let log = WorkoutSessionLog::from(raw);
    tracing::debug!(
        "Normalized workout {} with {} exercises",
        log.workout_id,
        log.exercises.len()
    );
    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_sets_preferred_and_feeders_ignored() {
        let json = r#"{
            "workoutId": "push-a",
            "dateISO": "2024-03-10",
            "exercises": [{
                "exerciseId": "bench-press",
                "feederSets": [{"reps": 5, "loadKg": 40, "rir": null, "technique": null}],
                "workSets": [
                    {"setIndex": 0, "reps": 10, "loadKg": 80, "rir": 2, "technique": "ok", "createdAt": 5},
                    {"setIndex": 1, "reps": 9, "loadKg": 80, "rir": 1, "technique": null, "createdAt": 6}
                ],
                "sets": [{"reps": 1, "loadKg": 1}],
                "createdAt": 4
            }]
        }"#;

        let log = parse_workout_log(json).unwrap();
        assert_eq!(log.date, "2024-03-10");
        let exercise = &log.exercises[0];
        assert_eq!(exercise.exercise_id(), "bench-press");
        assert_eq!(exercise.sets.len(), 2);
        assert_eq!(exercise.sets[0].load, 80.0);
        assert_eq!(exercise.sets[1].technique, TechniqueFlag::Unset);
        assert_eq!(exercise.sets[1].rir, Some(1));
    }

    #[test]
    fn test_legacy_single_list_with_kg_and_done() {
        let json = r#"{
            "workoutId": "legs",
            "date": "2024-03-11T07:00:00Z",
            "exercises": [{
                "exerciseId": "back-squat",
                "repsRange": "5-8",
                "tags": ["principal", "quads"],
                "sets": [
                    {"kg": 100, "reps": 8, "done": true},
                    {"kg": 100, "reps": 7, "done": true},
                    {"kg": 100, "reps": 0, "done": false}
                ],
                "createdAt": 42
            }]
        }"#;

        let log = parse_workout_log(json).unwrap();
        let exercise = &log.exercises[0];
        assert_eq!(exercise.sets.len(), 2);
        assert_eq!(exercise.sets[1].set_index, 1);
        assert_eq!(exercise.sets[1].created_at, 42);
        assert_eq!(exercise.sets[0].rir, None);
        assert_eq!(exercise.exercise.rep_range_text.as_deref(), Some("5-8"));
        assert_eq!(exercise.exercise.tags.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_exercise_without_sets_normalizes_to_empty() {
        let json = r#"{"workoutId": "w", "date": "2024-03-11", "exercises": [{"exerciseId": "curl"}]}"#;
        let log = parse_workout_log(json).unwrap();
        assert!(log.exercises[0].sets.is_empty());
    }

    #[test]
    fn test_malformed_record_is_an_error() {
        assert!(parse_workout_log(r#"{"workoutId": "w"}"#).is_err());
        assert!(parse_workout_log("not json").is_err());
    }
}
