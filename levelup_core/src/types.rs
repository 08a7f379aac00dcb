//! Core domain types for the LevelUp progression system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Exercise metadata and the inputs it is resolved from
//! - Logged sets and workout sessions
//! - Per-exercise progression state and its rolling summary
//! - Recommendations and prescriptions handed back to the caller
//!
//! Field names serialize in camelCase so exported snapshots stay readable by
//! the mobile client. Aliases accept the older `...Kg` / `...ISO` spellings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Ranges and Flags
// ============================================================================

/// Inclusive target repetition range
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepRange {
    pub min: u32,
    pub max: u32,
}

impl RepRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }
}

/// Inclusive repetitions-in-reserve target
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RirRange {
    pub min: u32,
    pub max: u32,
}

/// Self-reported technique quality for a set
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TechniqueFlag {
    Ok,
    Bad,
    #[default]
    Unset,
}

// ============================================================================
// Exercise Metadata
// ============================================================================

/// Fully resolved descriptive metadata for an exercise
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseMeta {
    pub id: String,
    pub name: String,
    pub primary_muscles: Vec<String>,
    #[serde(default)]
    pub secondary_muscles: Option<Vec<String>>,
    pub is_compound: bool,
    #[serde(alias = "defaultRepRange")]
    pub rep_range: RepRange,
    #[serde(alias = "defaultRestSec")]
    pub rest_sec: u32,
    #[serde(default)]
    pub equipment_tags: Option<Vec<String>>,
    #[serde(default, alias = "defaultSets")]
    pub default_sets: Option<u32>,
    #[serde(default, alias = "microIncrementOverrideKg")]
    pub micro_increment_override: Option<f64>,
}

/// Caller-supplied description of an exercise; every field is optional
/// except the id and is filled in by [`crate::meta::resolve`].
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseInput {
    pub exercise_id: String,
    #[serde(default, alias = "exerciseName")]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub rep_range: Option<RepRange>,
    #[serde(default, alias = "repsRangeText", alias = "repsRange")]
    pub rep_range_text: Option<String>,
    #[serde(default)]
    pub rest_sec: Option<u32>,
    #[serde(default)]
    pub sets_planned: Option<u32>,
    #[serde(default)]
    pub is_compound: Option<bool>,
    #[serde(default)]
    pub equipment_tags: Option<Vec<String>>,
    #[serde(default)]
    pub primary_muscles: Option<Vec<String>>,
    #[serde(default)]
    pub secondary_muscles: Option<Vec<String>>,
}

impl ExerciseInput {
    /// Input carrying nothing but the exercise id
    pub fn new(exercise_id: impl Into<String>) -> Self {
        Self {
            exercise_id: exercise_id.into(),
            ..Default::default()
        }
    }
}

/// Lookup table of known exercises
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    pub exercises: BTreeMap<String, ExerciseMeta>,
}

impl Catalog {
    pub fn get(&self, exercise_id: &str) -> Option<&ExerciseMeta> {
        self.exercises.get(exercise_id)
    }

    pub fn insert(&mut self, meta: ExerciseMeta) {
        self.exercises.insert(meta.id.clone(), meta);
    }
}

// ============================================================================
// Session Logs
// ============================================================================

/// One logged working set
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SetLog {
    pub set_index: u32,
    pub reps: u32,
    pub load: f64,
    pub rir: Option<u32>,
    pub technique: TechniqueFlag,
    pub created_at: i64,
}

/// Canonical per-exercise log of a session. Legacy shapes are converted by
/// [`crate::legacy`] before reaching the engine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseSessionLog {
    pub exercise: ExerciseInput,
    pub sets: Vec<SetLog>,
    pub created_at: i64,
}

impl ExerciseSessionLog {
    pub fn exercise_id(&self) -> &str {
        &self.exercise.exercise_id
    }
}

/// A completed workout
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutSessionLog {
    pub workout_id: String,
    /// Calendar date (`YYYY-MM-DD`) or RFC 3339 timestamp
    pub date: String,
    pub exercises: Vec<ExerciseSessionLog>,
    #[serde(default)]
    pub duration_sec: Option<u32>,
}

// ============================================================================
// Progression State
// ============================================================================

/// One row of the rolling per-exercise history
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionSummaryEntry {
    #[serde(alias = "dateISO")]
    pub date: String,
    pub top_set_reps: u32,
    #[serde(alias = "topSetLoadKg")]
    pub top_set_load: f64,
    #[serde(alias = "avgRir")]
    pub average_rir: Option<f64>,
    pub technique_ok_rate: Option<f64>,
}

/// Progression state for a single exercise
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionState {
    pub exercise_id: String,
    #[serde(default, alias = "lastLoadKg")]
    pub last_load: Option<f64>,
    #[serde(default)]
    pub last_completed_at: i64,
    #[serde(default)]
    pub last_rep_best: Option<u32>,
    #[serde(default)]
    pub last_was_deload: bool,
    #[serde(default)]
    pub last_n_workouts_summary: Vec<ProgressionSummaryEntry>,
    #[serde(default, alias = "recommendedLoadKg")]
    pub recommended_load: Option<f64>,
    #[serde(default = "default_micro_increment", alias = "microIncrementKg")]
    pub micro_increment: f64,
    #[serde(default)]
    pub stall_counter: u32,
    #[serde(default, alias = "deloadUntilDateISO")]
    pub deload_until: Option<String>,
}

fn default_micro_increment() -> f64 {
    1.0
}

/// Progression state keyed by exercise id. Ordered so serialized output is
/// stable across runs.
pub type ProgressionMap = BTreeMap<String, ProgressionState>;

// ============================================================================
// Recommendations and Prescriptions
// ============================================================================

/// Load decision for the next session
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Increase,
    Maintain,
    Reduce,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::Increase => "increase",
            Action::Maintain => "maintain",
            Action::Reduce => "reduce",
        };
        f.write_str(label)
    }
}

/// Why the engine chose an action
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    DefineInitialLoad,
    RepsBelowMinimum,
    TechniqueFlagged,
    EffortTooHigh,
    TopOfRangeReached,
    TopNotReachedOnAllSets,
    ProgressingWithinRange,
    DeloadActive,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Reason::DefineInitialLoad => "Set a starting load to receive recommendations.",
            Reason::RepsBelowMinimum => "Reps fell below the minimum on more than half of the sets.",
            Reason::TechniqueFlagged => "Technique was flagged as bad.",
            Reason::EffortTooHigh => "Effort too high (RIR below target).",
            Reason::TopOfRangeReached => "Top of the rep range reached on every set at a suitable RIR.",
            Reason::TopNotReachedOnAllSets => "Top of the rep range not yet reached on every set.",
            Reason::ProgressingWithinRange => "Reps/load progressing within the range. Holding.",
            Reason::DeloadActive => "Deload active: hold the load and focus on execution.",
        };
        f.write_str(message)
    }
}

/// Compact view of the session that produced a recommendation
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationSummary {
    pub top_set_reps: u32,
    pub top_set_load: f64,
    pub average_rir: Option<f64>,
}

/// Engine output for one exercise
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseRecommendation {
    pub exercise_id: String,
    pub action: Action,
    pub recommended_load: Option<f64>,
    pub reason: Reason,
    pub summary: RecommendationSummary,
}

/// Progression policy tag attached to prescriptions
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressionRule {
    DoubleProgression,
}

/// What to do for an exercise in the upcoming session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExercisePrescription {
    pub exercise_id: String,
    pub sets_planned: u32,
    pub rep_range: RepRange,
    pub rir_target: RirRange,
    pub rest_sec: u32,
    pub load_recommendation: Option<f64>,
    pub progression_rule: ProgressionRule,
    pub notes: String,
}
