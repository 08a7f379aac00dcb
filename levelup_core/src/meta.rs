//! Exercise metadata resolution.
//!
//! Every field of [`ExerciseMeta`] is resolved by walking an ordered chain of
//! pure resolvers (explicit input, then catalog entry) and falling back to an
//! inferred default when none of them produce a value.

use crate::{ExerciseInput, ExerciseMeta, ProgressionState, RepRange};

pub const DEFAULT_REP_RANGE: RepRange = RepRange::new(6, 10);
pub const DEFAULT_REST_COMPOUND_SEC: u32 = 120;
pub const DEFAULT_REST_ISOLATION_SEC: u32 = 90;
pub const DEFAULT_SETS_PLANNED: u32 = 3;

/// Load step for barbell-style apparatus
pub const BARBELL_MICRO_INCREMENT: f64 = 2.5;
/// Load step when nothing more specific is known
pub const DEFAULT_MICRO_INCREMENT: f64 = 1.0;

/// Exercises loaded on a barbell even when their metadata carries no
/// equipment tags
const BARBELL_EXERCISE_IDS: &[&str] = &[
    "bench-press",
    "back-squat",
    "deadlift",
    "bent-over-row",
    "overhead-press",
    "front-squat",
    "romanian-deadlift",
];

/// Tag marking a main (compound) lift
const MAIN_MARKERS: &[&str] = &["main", "principal"];
/// Tags marking an accessory (isolation) lift
const ACCESSORY_MARKERS: &[&str] = &["accessory", "acessorio", "acessório"];

/// Everything a field value can be taken from
struct Sources<'a> {
    input: &'a ExerciseInput,
    catalog: Option<&'a ExerciseMeta>,
}

type Resolver<T> = for<'a, 'b> fn(&'a Sources<'b>) -> Option<T>;

fn resolve_field<T>(
    sources: &Sources<'_>,
    chain: &[Resolver<T>],
    inferred: impl FnOnce() -> T,
) -> T {
    chain
        .iter()
        .find_map(|resolver| resolver(sources))
        .unwrap_or_else(inferred)
}

fn explicit_name(s: &Sources<'_>) -> Option<String> {
    s.input.name.clone()
}

fn catalog_name(s: &Sources<'_>) -> Option<String> {
    s.catalog.map(|m| m.name.clone())
}

fn explicit_rep_range(s: &Sources<'_>) -> Option<RepRange> {
    s.input.rep_range
}

fn catalog_rep_range(s: &Sources<'_>) -> Option<RepRange> {
    s.catalog.map(|m| m.rep_range)
}

fn explicit_compound(s: &Sources<'_>) -> Option<bool> {
    s.input.is_compound
}

fn catalog_compound(s: &Sources<'_>) -> Option<bool> {
    s.catalog.map(|m| m.is_compound)
}

fn explicit_rest(s: &Sources<'_>) -> Option<u32> {
    s.input.rest_sec
}

fn catalog_rest(s: &Sources<'_>) -> Option<u32> {
    s.catalog.map(|m| m.rest_sec)
}

fn explicit_sets(s: &Sources<'_>) -> Option<u32> {
    s.input.sets_planned
}

fn catalog_sets(s: &Sources<'_>) -> Option<u32> {
    s.catalog.and_then(|m| m.default_sets)
}

fn explicit_primary(s: &Sources<'_>) -> Option<Vec<String>> {
    s.input.primary_muscles.clone()
}

fn catalog_primary(s: &Sources<'_>) -> Option<Vec<String>> {
    s.catalog.map(|m| m.primary_muscles.clone())
}

fn explicit_secondary(s: &Sources<'_>) -> Option<Vec<String>> {
    s.input.secondary_muscles.clone()
}

fn catalog_secondary(s: &Sources<'_>) -> Option<Vec<String>> {
    s.catalog.and_then(|m| m.secondary_muscles.clone())
}

fn explicit_equipment(s: &Sources<'_>) -> Option<Vec<String>> {
    s.input.equipment_tags.clone()
}

fn catalog_equipment(s: &Sources<'_>) -> Option<Vec<String>> {
    s.catalog.and_then(|m| m.equipment_tags.clone())
}

/// Resolve full metadata for an exercise
///
/// Precedence per field: explicit input > catalog entry > inferred default.
pub fn resolve(input: &ExerciseInput, catalog: Option<&ExerciseMeta>) -> ExerciseMeta {
    let sources = Sources { input, catalog };

    let rep_range = resolve_field(&sources, &[explicit_rep_range, catalog_rep_range], || {
        parse_rep_range(input.rep_range_text.as_deref())
    });

    let is_compound = resolve_field(&sources, &[explicit_compound, catalog_compound], || {
        let tags = input
            .tags
            .as_deref()
            .or_else(|| catalog.map(|m| m.primary_muscles.as_slice()));
        infer_is_compound(tags)
    });

    let rest_sec = resolve_field(&sources, &[explicit_rest, catalog_rest], || {
        if is_compound {
            DEFAULT_REST_COMPOUND_SEC
        } else {
            DEFAULT_REST_ISOLATION_SEC
        }
    });

    ExerciseMeta {
        id: input.exercise_id.clone(),
        name: resolve_field(&sources, &[explicit_name, catalog_name], || {
            input.exercise_id.clone()
        }),
        primary_muscles: resolve_field(&sources, &[explicit_primary, catalog_primary], || {
            infer_primary_muscles(input.tags.as_deref())
        }),
        secondary_muscles: [explicit_secondary as Resolver<Vec<String>>, catalog_secondary]
            .iter()
            .find_map(|resolver| resolver(&sources)),
        is_compound,
        rep_range,
        rest_sec,
        equipment_tags: [explicit_equipment as Resolver<Vec<String>>, catalog_equipment]
            .iter()
            .find_map(|resolver| resolver(&sources)),
        default_sets: Some(resolve_field(&sources, &[explicit_sets, catalog_sets], || {
            DEFAULT_SETS_PLANNED
        })),
        micro_increment_override: catalog.and_then(|m| m.micro_increment_override),
    }
}

/// Smallest load step for an exercise
///
/// Order: positive override on the metadata, positive step already stored on
/// the progression state, barbell heuristic, default step.
pub fn resolve_micro_increment(meta: &ExerciseMeta, state: Option<&ProgressionState>) -> f64 {
    if let Some(step) = meta.micro_increment_override.filter(|s| *s > 0.0) {
        return step;
    }
    if let Some(step) = state.map(|s| s.micro_increment).filter(|s| *s > 0.0) {
        return step;
    }
    if is_barbell(meta) {
        return BARBELL_MICRO_INCREMENT;
    }
    DEFAULT_MICRO_INCREMENT
}

fn is_barbell(meta: &ExerciseMeta) -> bool {
    let tagged = meta
        .equipment_tags
        .as_ref()
        .is_some_and(|tags| tags.iter().any(|t| t.eq_ignore_ascii_case("barbell")));
    tagged || BARBELL_EXERCISE_IDS.contains(&meta.id.as_str())
}

/// Parse a free-text rep hint such as `"8-12"` or `"10 reps"`
///
/// The first two integers form the range, a single integer gives `[n, n]`,
/// and anything else falls back to [`DEFAULT_REP_RANGE`].
pub fn parse_rep_range(text: Option<&str>) -> RepRange {
    let Some(text) = text else {
        return DEFAULT_REP_RANGE;
    };

    let numbers: Vec<u32> = text
        .split(|c: char| !c.is_ascii_digit())
        .filter(|chunk| !chunk.is_empty())
        .filter_map(|chunk| chunk.parse().ok())
        .take(2)
        .collect();

    match numbers.as_slice() {
        [min, max] => RepRange::new(*min, *max),
        [n] => RepRange::new(*n, *n),
        _ => DEFAULT_REP_RANGE,
    }
}

fn has_marker(tags: &[String], markers: &[&str]) -> bool {
    tags.iter()
        .any(|t| markers.iter().any(|m| t.to_lowercase() == *m))
}

/// Tags without a main/accessory marker count as compound
fn infer_is_compound(tags: Option<&[String]>) -> bool {
    let Some(tags) = tags else {
        return true;
    };
    if !has_marker(tags, MAIN_MARKERS) && !has_marker(tags, ACCESSORY_MARKERS) {
        return true;
    }
    has_marker(tags, MAIN_MARKERS)
}

fn infer_primary_muscles(tags: Option<&[String]>) -> Vec<String> {
    let muscles: Vec<String> = tags
        .unwrap_or_default()
        .iter()
        .map(|t| t.to_lowercase())
        .filter(|t| {
            !MAIN_MARKERS.contains(&t.as_str()) && !ACCESSORY_MARKERS.contains(&t.as_str())
        })
        .collect();

    if muscles.is_empty() {
        vec!["unknown".to_string()]
    } else {
        muscles
    }
}
