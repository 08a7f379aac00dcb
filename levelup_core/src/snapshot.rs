//! The persisted application snapshot and its export/import format.
//!
//! Only the sections the progression core reasons about are typed. Every
//! other section the client stores is kept verbatim in `extra` so a
//! round-trip through this crate never drops data.

use crate::{ProgressionMap, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Current snapshot schema version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Milliseconds since the epoch, the unit of every snapshot timestamp
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Account-level gamification block (level, XP, streak)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountProgression {
    pub account_level: u32,
    pub xp: u32,
    pub xp_to_next: u32,
    pub streak_days: u32,
    pub shields: u32,
    pub multiplier: f64,
}

impl Default for AccountProgression {
    fn default() -> Self {
        Self {
            account_level: 1,
            xp: 0,
            xp_to_next: 500,
            streak_days: 0,
            shields: 0,
            multiplier: 1.0,
        }
    }
}

/// Record of a finished workout
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutCompleted {
    pub workout_id: String,
    pub timestamp: String,
    #[serde(default)]
    pub total_volume: f64,
}

/// Per-exercise snapshot of the working sets of one session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseSnapshot {
    pub exercise_id: String,
    pub workout_id: String,
    #[serde(default)]
    pub reps_range: String,
    pub work_sets: Vec<SetSnapshot>,
    pub timestamp: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct SetSnapshot {
    pub kg: f64,
    pub reps: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeighIn {
    pub date: String,
    pub weight: f64,
    pub updated_at: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Bodyweight {
    #[serde(default)]
    pub entries: Vec<WeighIn>,
}

/// Whole-document application state shared between device and remote
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSnapshot {
    pub version: u32,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub progression_by_exercise_id: ProgressionMap,
    #[serde(default)]
    pub progression: AccountProgression,
    #[serde(default)]
    pub nutrition: Value,
    #[serde(default)]
    pub workout_history: Vec<WorkoutCompleted>,
    #[serde(default)]
    pub exercise_history: BTreeMap<String, Vec<ExerciseSnapshot>>,
    #[serde(default)]
    pub bodyweight: Bodyweight,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AppSnapshot {
    /// Canonical starting document for a brand-new account
    pub fn new_user(now: i64) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            updated_at: now,
            progression_by_exercise_id: ProgressionMap::new(),
            progression: AccountProgression::default(),
            nutrition: json!({
                "targets": {"kcal": 2050, "protein": 160, "carbs": 200, "fats": 65},
                "dailyLogs": {}
            }),
            workout_history: Vec::new(),
            exercise_history: BTreeMap::new(),
            bodyweight: Bodyweight::default(),
            extra: Map::new(),
        }
    }

    /// Whether the document records real use: a completed workout, logged
    /// exercise history, or a weigh-in
    pub fn has_history(&self) -> bool {
        !self.workout_history.is_empty()
            || !self.exercise_history.is_empty()
            || !self.bodyweight.entries.is_empty()
    }
}

/// Why an import payload was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImportError {
    #[error("could not parse JSON: {0}")]
    InvalidJson(String),

    #[error("invalid format: missing numeric version")]
    MissingVersion,

    #[error("invalid format: incomplete data (progression and nutrition are required)")]
    IncompleteData,

    #[error("invalid format: {0}")]
    InvalidShape(String),
}

/// Serialize a snapshot as a self-describing JSON document
pub fn export_snapshot(snapshot: &AppSnapshot) -> Result<String> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

/// Validate and parse an exported document, stamping `updated_at`
///
/// Accepts only documents with a numeric `version` and both `progression`
/// and `nutrition` objects.
pub fn import_snapshot(text: &str, now: i64) -> std::result::Result<AppSnapshot, ImportError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ImportError::InvalidJson(e.to_string()))?;

    let version_ok = value
        .get("version")
        .and_then(Value::as_u64)
        .is_some_and(|v| v > 0);
    if !version_ok {
        return Err(ImportError::MissingVersion);
    }

    let has_section = |key: &str| value.get(key).is_some_and(Value::is_object);
    if !has_section("progression") || !has_section("nutrition") {
        return Err(ImportError::IncompleteData);
    }

    let mut snapshot: AppSnapshot =
        serde_json::from_value(value).map_err(|e| ImportError::InvalidShape(e.to_string()))?;
    snapshot.updated_at = now;
    Ok(snapshot)
}
