//! Default catalog of exercise metadata.
//!
//! The built-in entries cover the common lifts. Users can layer their own
//! exercises on top with a JSON file (see [`load_catalog`]).

use crate::types::*;
use crate::Result;
use once_cell::sync::Lazy;
use std::path::Path;

/// Cached default catalog - built once and reused across all operations
static DEFAULT_CATALOG: Lazy<Catalog> = Lazy::new(build_default_catalog_internal);

/// Get a reference to the cached default catalog
pub fn get_default_catalog() -> &'static Catalog {
    &DEFAULT_CATALOG
}

/// Builds the default catalog
///
/// **Note**: prefer `get_default_catalog()` outside of tests; this is kept
/// for callers that need an owned catalog to extend.
pub fn build_default_catalog() -> Catalog {
    build_default_catalog_internal()
}

fn lift(
    id: &str,
    name: &str,
    primary: &[&str],
    is_compound: bool,
    rep_range: RepRange,
    rest_sec: u32,
    equipment: &[&str],
) -> ExerciseMeta {
    ExerciseMeta {
        id: id.into(),
        name: name.into(),
        primary_muscles: primary.iter().map(|m| m.to_string()).collect(),
        secondary_muscles: None,
        is_compound,
        rep_range,
        rest_sec,
        equipment_tags: Some(equipment.iter().map(|e| e.to_string()).collect()),
        default_sets: Some(3),
        micro_increment_override: None,
    }
}

fn build_default_catalog_internal() -> Catalog {
    let mut catalog = Catalog::default();

    // Barbell compounds
    catalog.insert(lift(
        "bench-press",
        "Barbell Bench Press",
        &["chest", "triceps"],
        true,
        RepRange::new(6, 10),
        120,
        &["barbell", "bench"],
    ));
    catalog.insert(lift(
        "back-squat",
        "Barbell Back Squat",
        &["quads", "glutes"],
        true,
        RepRange::new(5, 8),
        180,
        &["barbell", "rack"],
    ));
    catalog.insert(lift(
        "deadlift",
        "Conventional Deadlift",
        &["hamstrings", "glutes", "back"],
        true,
        RepRange::new(3, 6),
        180,
        &["barbell"],
    ));
    catalog.insert(lift(
        "bent-over-row",
        "Barbell Bent-Over Row",
        &["back", "biceps"],
        true,
        RepRange::new(6, 10),
        120,
        &["barbell"],
    ));
    catalog.insert(lift(
        "overhead-press",
        "Standing Overhead Press",
        &["shoulders", "triceps"],
        true,
        RepRange::new(5, 8),
        150,
        &["barbell"],
    ));

    // Machine / dumbbell work
    catalog.insert(lift(
        "leg-press",
        "Leg Press",
        &["quads"],
        true,
        RepRange::new(8, 12),
        120,
        &["machine"],
    ));
    catalog.insert(lift(
        "lat-pulldown",
        "Lat Pulldown",
        &["back"],
        true,
        RepRange::new(8, 12),
        90,
        &["cable"],
    ));
    catalog.insert(lift(
        "lateral-raise",
        "Dumbbell Lateral Raise",
        &["shoulders"],
        false,
        RepRange::new(12, 15),
        60,
        &["dumbbell"],
    ));

    let mut curl = lift(
        "biceps-curl",
        "Dumbbell Biceps Curl",
        &["biceps"],
        false,
        RepRange::new(10, 12),
        60,
        &["dumbbell"],
    );
    // Fixed-weight dumbbell racks usually jump by 2 kg
    curl.micro_increment_override = Some(2.0);
    catalog.insert(curl);

    catalog
}

/// Default catalog extended with user-defined exercises from a JSON array
/// of [`ExerciseMeta`]. User entries replace built-ins with the same id.
///
/// Returns the default catalog when the file doesn't exist.
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let mut catalog = build_default_catalog();
    if !path.exists() {
        tracing::debug!("No user catalog at {:?}", path);
        return Ok(catalog);
    }

    let contents = std::fs::read_to_string(path)?;
    let user: Vec<ExerciseMeta> = serde_json::from_str(&contents)?;
    tracing::info!("Loaded {} user exercises from {:?}", user.len(), path);
    for meta in user {
        catalog.insert(meta);
    }
    Ok(catalog)
}

impl Catalog {
    /// Validate catalog integrity
    ///
    /// Returns a list of validation errors (empty if valid)
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (id, meta) in &self.exercises {
            if id != &meta.id {
                errors.push(format!(
                    "Exercise key '{}' doesn't match id '{}'",
                    id, meta.id
                ));
            }
            if meta.name.is_empty() {
                errors.push(format!("Exercise '{}' has empty name", id));
            }
            if meta.rep_range.min > meta.rep_range.max {
                errors.push(format!(
                    "Exercise '{}': min reps {} > max {}",
                    id, meta.rep_range.min, meta.rep_range.max
                ));
            }
            if meta.rest_sec == 0 {
                errors.push(format!("Exercise '{}' has zero rest", id));
            }
            if let Some(step) = meta.micro_increment_override {
                if step <= 0.0 || !step.is_finite() {
                    errors.push(format!(
                        "Exercise '{}': micro-increment override {} must be positive",
                        id, step
                    ));
                }
            }
        }

        errors
    }
}
