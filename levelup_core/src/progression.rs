//! Progression engine: turns a completed workout into the next load.
//!
//! Policy is double progression. Every set has to reach the top of the rep
//! range at an acceptable effort before the load goes up; clear regressions
//! (most sets under the minimum, effort beyond target, bad technique) bring
//! it down by one micro-increment; everything else holds the load.
//!
//! The engine never fails. Missing inputs (no RIR reported, no prior
//! session, no usable load) degrade to `None` and a maintain decision with
//! a specific [`Reason`].

use crate::meta::{self, resolve_micro_increment};
use crate::prescription::rir_target;
use crate::{
    Action, Catalog, Error, ExerciseMeta, ExerciseRecommendation, ProgressionMap,
    ProgressionState, ProgressionSummaryEntry, Reason, RecommendationSummary, RepRange, Result,
    RirRange, SetLog, TechniqueFlag, WorkoutSessionLog,
};
use chrono::{DateTime, NaiveDate, Utc};

/// Number of sessions kept in the rolling summary
pub const MAX_SUMMARY_ENTRIES: usize = 8;

/// Smallest load ever recommended
pub const MIN_LOAD: f64 = 0.5;

/// Allowed shortfall below the RIR target before effort counts as too high
const RIR_TOLERANCE: f64 = 0.5;

/// Result of applying a workout to the progression map
#[derive(Clone, Debug, PartialEq)]
pub struct WorkoutOutcome {
    pub progression_by_exercise_id: ProgressionMap,
    pub recommendations: Vec<ExerciseRecommendation>,
}

/// How a user-chosen starting load felt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadFeel {
    Easy,
    Ok,
    Hard,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct TopSet {
    reps: u32,
    load: f64,
}

/// Metrics derived from one exercise's logged sets
#[derive(Clone, Debug)]
struct SessionMetrics {
    top_set: TopSet,
    average_rir: Option<f64>,
    technique_ok_rate: Option<f64>,
    any_bad_technique: bool,
    majority_below_min: bool,
    all_at_or_above_top: bool,
}

struct Decision {
    action: Action,
    recommended_load: Option<f64>,
    stall_counter: u32,
    reason: Reason,
}

/// Round to two decimals and clamp to [`MIN_LOAD`]
pub fn normalize_load(value: f64) -> f64 {
    round_to(value, 2).max(MIN_LOAD)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Parse a session or deload date into epoch milliseconds
///
/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC).
pub fn date_to_millis(value: &str) -> Option<i64> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc).timestamp_millis());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

fn top_set(sets: &[SetLog]) -> Option<TopSet> {
    let first = sets.first()?;
    let start = TopSet {
        reps: first.reps,
        load: first.load,
    };
    Some(sets.iter().fold(start, |best, set| {
        if set.reps > best.reps || (set.reps == best.reps && set.load > best.load) {
            TopSet {
                reps: set.reps,
                load: set.load,
            }
        } else {
            best
        }
    }))
}

fn average_rir(sets: &[SetLog]) -> Option<f64> {
    let reported: Vec<f64> = sets.iter().filter_map(|s| s.rir).map(f64::from).collect();
    if reported.is_empty() {
        return None;
    }
    let mean = reported.iter().sum::<f64>() / reported.len() as f64;
    Some(round_to(mean, 2))
}

fn technique_ok_rate(sets: &[SetLog]) -> Option<f64> {
    if sets.is_empty() {
        return None;
    }
    let bad = sets
        .iter()
        .filter(|s| s.technique == TechniqueFlag::Bad)
        .count();
    let ok = sets.len() - bad;
    Some(round_to(ok as f64 / sets.len() as f64 * 100.0, 1))
}

fn session_metrics(sets: &[SetLog], rep_range: RepRange) -> Option<SessionMetrics> {
    let top_set = top_set(sets)?;
    let below_min = sets.iter().filter(|s| s.reps < rep_range.min).count();

    Some(SessionMetrics {
        top_set,
        average_rir: average_rir(sets),
        technique_ok_rate: technique_ok_rate(sets),
        any_bad_technique: sets.iter().any(|s| s.technique == TechniqueFlag::Bad),
        majority_below_min: below_min * 2 > sets.len(),
        all_at_or_above_top: sets.iter().all(|s| s.reps >= rep_range.max),
    })
}

/// True when the session beat the most recent summary entry, by load first
/// and by reps at equal load. A first session always counts as progress.
fn improved_on(previous: Option<&ProgressionSummaryEntry>, top: TopSet) -> bool {
    let Some(prev) = previous else {
        return true;
    };
    top.load > prev.top_set_load || (top.load == prev.top_set_load && top.reps > prev.top_set_reps)
}

fn decide(
    metrics: &SessionMetrics,
    session_load: Option<f64>,
    in_deload: bool,
    rir: RirRange,
    micro_increment: f64,
    existing: Option<&ProgressionState>,
) -> Decision {
    let stall = existing.map(|s| s.stall_counter).unwrap_or(0);
    let effort_floor = f64::from(rir.min) - RIR_TOLERANCE;

    let Some(load) = session_load else {
        return Decision {
            action: Action::Maintain,
            recommended_load: None,
            stall_counter: 0,
            reason: Reason::DefineInitialLoad,
        };
    };

    let effort_too_high = metrics.average_rir.is_some_and(|avg| avg < effort_floor);

    let mut decision =
        if metrics.majority_below_min || effort_too_high || metrics.any_bad_technique {
            let reason = if metrics.majority_below_min {
                Reason::RepsBelowMinimum
            } else if metrics.any_bad_technique {
                Reason::TechniqueFlagged
            } else {
                Reason::EffortTooHigh
            };
            Decision {
                action: Action::Reduce,
                recommended_load: Some(normalize_load(load - micro_increment)),
                stall_counter: stall + 1,
                reason,
            }
        } else if metrics.all_at_or_above_top
            && !in_deload
            && metrics.average_rir.map_or(true, |avg| avg >= effort_floor)
            && !metrics.any_bad_technique
        {
            Decision {
                action: Action::Increase,
                recommended_load: Some(normalize_load(load + micro_increment)),
                stall_counter: 0,
                reason: Reason::TopOfRangeReached,
            }
        } else {
            let previous = existing.and_then(|s| s.last_n_workouts_summary.first());
            let (stall_counter, reason) = if improved_on(previous, metrics.top_set) {
                (stall, Reason::ProgressingWithinRange)
            } else if in_deload {
                (stall, Reason::TopNotReachedOnAllSets)
            } else {
                (stall + 1, Reason::TopNotReachedOnAllSets)
            };
            Decision {
                action: Action::Maintain,
                recommended_load: Some(normalize_load(load)),
                stall_counter,
                reason,
            }
        };

    // Deload freezes stall accumulation on maintain; reduce is left alone
    if in_deload && decision.action == Action::Maintain {
        decision.stall_counter = 0;
        decision.reason = Reason::DeloadActive;
    }

    decision
}

fn updated_summary(
    entry: ProgressionSummaryEntry,
    existing: Option<&ProgressionState>,
) -> Vec<ProgressionSummaryEntry> {
    let mut summary = Vec::with_capacity(MAX_SUMMARY_ENTRIES + 1);
    if let Some(state) = existing {
        summary.extend(state.last_n_workouts_summary.iter().cloned());
    }

    // The new entry goes ahead of everything not strictly newer than it. An
    // undated session is the latest one logged and always goes first.
    let position = match date_to_millis(&entry.date) {
        Some(ts) => summary
            .iter()
            .position(|e| date_to_millis(&e.date).map_or(true, |d| d <= ts))
            .unwrap_or(summary.len()),
        None => 0,
    };
    summary.insert(position, entry);
    summary.truncate(MAX_SUMMARY_ENTRIES);
    summary
}

/// Apply a completed workout to the progression map
///
/// Exercises with no logged sets are skipped. Exercises in `current` that
/// were not trained are carried over unchanged. The function is pure:
/// identical inputs produce identical outputs.
pub fn apply_workout_result(
    log: &WorkoutSessionLog,
    current: &ProgressionMap,
    catalog: &Catalog,
) -> WorkoutOutcome {
    let mut updated = current.clone();
    let mut recommendations = Vec::new();
    let session_ts = date_to_millis(&log.date);

    if session_ts.is_none() {
        tracing::warn!("Unparseable session date '{}' in workout {}", log.date, log.workout_id);
    }

    for exercise_log in &log.exercises {
        let exercise_id = exercise_log.exercise_id();
        let existing = current.get(exercise_id);

        let meta = meta::resolve(&exercise_log.exercise, catalog.get(exercise_id));
        let rir = rir_target(&meta);
        let micro_increment = resolve_micro_increment(&meta, existing);

        let Some(metrics) = session_metrics(&exercise_log.sets, meta.rep_range) else {
            tracing::debug!("No sets logged for {}, skipping", exercise_id);
            continue;
        };

        let in_deload = match (
            session_ts,
            existing
                .and_then(|s| s.deload_until.as_deref())
                .and_then(date_to_millis),
        ) {
            (Some(session), Some(until)) => session <= until,
            _ => false,
        };

        let session_load = Some(metrics.top_set.load)
            .filter(|load| *load > 0.0)
            .or_else(|| existing.and_then(|s| s.last_load).filter(|load| *load > 0.0));

        let decision = decide(&metrics, session_load, in_deload, rir, micro_increment, existing);

        tracing::debug!(
            "{}: top set {}x{}, avg RIR {:?}, deload {} -> {} ({:?})",
            exercise_id,
            metrics.top_set.reps,
            metrics.top_set.load,
            metrics.average_rir,
            in_deload,
            decision.action,
            decision.recommended_load
        );

        let entry = ProgressionSummaryEntry {
            date: log.date.clone(),
            top_set_reps: metrics.top_set.reps,
            top_set_load: metrics.top_set.load,
            average_rir: metrics.average_rir,
            technique_ok_rate: metrics.technique_ok_rate,
        };

        let state = ProgressionState {
            exercise_id: exercise_id.to_string(),
            last_load: session_load,
            last_completed_at: session_ts
                .or_else(|| existing.map(|s| s.last_completed_at))
                .unwrap_or(0),
            last_rep_best: Some(metrics.top_set.reps),
            last_was_deload: in_deload,
            last_n_workouts_summary: updated_summary(entry, existing),
            recommended_load: decision.recommended_load,
            micro_increment,
            stall_counter: decision.stall_counter,
            deload_until: existing.and_then(|s| s.deload_until.clone()),
        };

        recommendations.push(ExerciseRecommendation {
            exercise_id: exercise_id.to_string(),
            action: decision.action,
            recommended_load: decision.recommended_load,
            reason: decision.reason,
            summary: RecommendationSummary {
                top_set_reps: metrics.top_set.reps,
                top_set_load: metrics.top_set.load,
                average_rir: metrics.average_rir,
            },
        });
        updated.insert(exercise_id.to_string(), state);
    }

    tracing::info!(
        "Applied workout {} ({}): {} recommendations",
        log.workout_id,
        log.date,
        recommendations.len()
    );

    WorkoutOutcome {
        progression_by_exercise_id: updated,
        recommendations,
    }
}

/// Set a user-chosen starting load for an exercise
///
/// An easy feel starts one micro-increment higher, a hard feel one lower.
/// History, completion time and deload window are preserved.
pub fn seed_initial_load(
    existing: Option<&ProgressionState>,
    meta: &ExerciseMeta,
    load: f64,
    feel: LoadFeel,
) -> Result<ProgressionState> {
    if !load.is_finite() || load <= 0.0 {
        return Err(Error::State(format!(
            "Starting load for {} must be positive, got {}",
            meta.id, load
        )));
    }

    let micro_increment = resolve_micro_increment(meta, existing);
    let recommended = match feel {
        LoadFeel::Easy => load + micro_increment,
        LoadFeel::Ok => load,
        LoadFeel::Hard => load - micro_increment,
    };

    tracing::info!(
        "Seeded {} at {} ({:?}), next {}",
        meta.id,
        load,
        feel,
        normalize_load(recommended)
    );

    Ok(ProgressionState {
        exercise_id: meta.id.clone(),
        last_load: Some(normalize_load(load)),
        last_completed_at: existing.map(|s| s.last_completed_at).unwrap_or(0),
        last_rep_best: existing.and_then(|s| s.last_rep_best),
        last_was_deload: existing.is_some_and(|s| s.last_was_deload),
        last_n_workouts_summary: existing
            .map(|s| s.last_n_workouts_summary.clone())
            .unwrap_or_default(),
        recommended_load: Some(normalize_load(recommended)),
        micro_increment,
        stall_counter: 0,
        deload_until: existing.and_then(|s| s.deload_until.clone()),
    })
}

/// Open a deload window lasting through `until` (inclusive)
pub fn start_deload(state: &mut ProgressionState, until: NaiveDate) {
    state.deload_until = Some(until.format("%Y-%m-%d").to_string());
    tracing::info!("Deload for {} until {}", state.exercise_id, until);
}

/// Close any deload window
pub fn end_deload(state: &mut ProgressionState) {
    state.deload_until = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_default_catalog, ExerciseInput, ExerciseSessionLog};

    const BENCH: &str = "bench-press";

    fn sets(values: &[(u32, f64, Option<u32>)]) -> Vec<SetLog> {
        values
            .iter()
            .enumerate()
            .map(|(idx, (reps, load, rir))| SetLog {
                set_index: idx as u32,
                reps: *reps,
                load: *load,
                rir: *rir,
                technique: TechniqueFlag::Ok,
                created_at: 1_700_000_000_000,
            })
            .collect()
    }

    fn workout(date: &str, exercise_id: &str, sets: Vec<SetLog>) -> WorkoutSessionLog {
        WorkoutSessionLog {
            workout_id: "w1".into(),
            date: date.into(),
            exercises: vec![ExerciseSessionLog {
                exercise: ExerciseInput::new(exercise_id),
                sets,
                created_at: 1_700_000_000_000,
            }],
            duration_sec: None,
        }
    }

    fn prior(last_load: Option<f64>) -> ProgressionMap {
        let mut map = ProgressionMap::new();
        map.insert(
            BENCH.into(),
            ProgressionState {
                exercise_id: BENCH.into(),
                last_load,
                last_completed_at: 1_709_000_000_000,
                last_rep_best: None,
                last_was_deload: false,
                last_n_workouts_summary: vec![],
                recommended_load: last_load,
                micro_increment: 2.5,
                stall_counter: 0,
                deload_until: None,
            },
        );
        map
    }

    fn at_80(reps: &[u32], rir: &[u32]) -> Vec<SetLog> {
        let values: Vec<_> = reps
            .iter()
            .zip(rir)
            .map(|(r, i)| (*r, 80.0, Some(*i)))
            .collect();
        sets(&values)
    }

    fn run(
        log: &WorkoutSessionLog,
        map: &ProgressionMap,
    ) -> (ExerciseRecommendation, ProgressionState) {
        let outcome = apply_workout_result(log, map, &build_default_catalog());
        let rec = outcome.recommendations[0].clone();
        let state = outcome.progression_by_exercise_id[&rec.exercise_id].clone();
        (rec, state)
    }

    #[test]
    fn test_top_of_range_on_every_set_increases() {
        let log = workout("2024-03-10", BENCH, at_80(&[10, 10, 10], &[1, 1, 2]));
        let (rec, state) = run(&log, &prior(Some(80.0)));

        assert_eq!(rec.action, Action::Increase);
        assert_eq!(rec.recommended_load, Some(82.5));
        assert_eq!(rec.reason, Reason::TopOfRangeReached);
        assert_eq!(state.stall_counter, 0);
        assert_eq!(state.last_load, Some(80.0));
        assert_eq!(rec.summary.average_rir, Some(1.33));
    }

    #[test]
    fn test_top_not_reached_on_every_set_maintains() {
        let log = workout("2024-03-10", BENCH, at_80(&[8, 8, 7], &[1, 1, 2]));
        let (rec, state) = run(&log, &prior(Some(80.0)));

        assert_eq!(rec.action, Action::Maintain);
        assert_eq!(rec.recommended_load, Some(80.0));
        assert_eq!(rec.reason, Reason::ProgressingWithinRange);
        assert_eq!(state.stall_counter, 0);
    }

    #[test]
    fn test_majority_below_minimum_reduces() {
        let log = workout("2024-03-10", BENCH, at_80(&[5, 5, 6], &[0, 0, 0]));
        let (rec, state) = run(&log, &prior(Some(80.0)));

        assert_eq!(rec.action, Action::Reduce);
        assert_eq!(rec.recommended_load, Some(77.5));
        assert_eq!(rec.reason, Reason::RepsBelowMinimum);
        assert_eq!(state.stall_counter, 1);
    }

    #[test]
    fn test_exactly_half_below_minimum_holds() {
        let log = workout("2024-03-10", BENCH, at_80(&[5, 5, 10, 10], &[2, 2, 2, 2]));
        let (rec, state) = run(&log, &prior(Some(80.0)));

        assert_eq!(rec.action, Action::Maintain);
        assert_eq!(rec.recommended_load, Some(80.0));
        assert_eq!(rec.reason, Reason::ProgressingWithinRange);
        assert_eq!(state.stall_counter, 0);
    }

    #[test]
    fn test_first_session_uses_barbell_increment() {
        let log = workout("2024-03-10", BENCH, at_80(&[10, 10, 10], &[2, 2, 2]));
        let (rec, state) = run(&log, &ProgressionMap::new());

        assert_eq!(rec.recommended_load, Some(82.5));
        assert_eq!(state.micro_increment, 2.5);
        assert_eq!(state.last_n_workouts_summary.len(), 1);
    }

    #[test]
    fn test_missing_load_maintains_without_recommendation() {
        let log = workout("2024-03-10", BENCH, at_80(&[10, 10, 10], &[2, 2, 2]))
            .tap_loads(0.0);
        for map in [ProgressionMap::new(), prior(None), prior(Some(0.0))] {
            let (rec, state) = run(&log, &map);
            assert_eq!(rec.action, Action::Maintain);
            assert_eq!(rec.recommended_load, None);
            assert_eq!(rec.reason, Reason::DefineInitialLoad);
            assert_eq!(state.stall_counter, 0);
            assert_eq!(state.last_load, None);
        }
    }

    #[test]
    fn test_zero_top_set_load_falls_back_to_last_load() {
        let log = workout("2024-03-10", BENCH, at_80(&[10, 10, 10], &[2, 2, 2]))
            .tap_loads(0.0);
        let (rec, state) = run(&log, &prior(Some(60.0)));

        assert_eq!(rec.action, Action::Increase);
        assert_eq!(rec.recommended_load, Some(62.5));
        assert_eq!(state.last_load, Some(60.0));
    }

    #[test]
    fn test_reason_priority_on_reduce() {
        let mut flagged = at_80(&[8, 8, 8], &[2, 2, 2]);
        flagged[1].technique = TechniqueFlag::Bad;
        let (rec, _) = run(&workout("2024-03-10", BENCH, flagged), &prior(Some(80.0)));
        assert_eq!(rec.reason, Reason::TechniqueFlagged);
        assert_eq!(rec.action, Action::Reduce);

        let (rec, _) = run(
            &workout("2024-03-10", BENCH, at_80(&[10, 10, 10], &[0, 0, 0])),
            &prior(Some(80.0)),
        );
        assert_eq!(rec.reason, Reason::EffortTooHigh);
        assert_eq!(rec.recommended_load, Some(77.5));

        let mut everything = at_80(&[4, 4, 4], &[0, 0, 0]);
        everything[0].technique = TechniqueFlag::Bad;
        let (rec, _) = run(&workout("2024-03-10", BENCH, everything), &prior(Some(80.0)));
        assert_eq!(rec.reason, Reason::RepsBelowMinimum);
    }

    #[test]
    fn test_reduce_never_drops_to_zero() {
        let log = workout("2024-03-10", "lateral-raise", sets(&[(5, 1.0, None); 3]));
        let (rec, _) = run(&log, &ProgressionMap::new());

        assert_eq!(rec.action, Action::Reduce);
        assert_eq!(rec.recommended_load, Some(MIN_LOAD));
    }

    #[test]
    fn test_stall_counter_grows_without_improvement() {
        let map = prior(Some(80.0));
        let first = apply_workout_result(
            &workout("2024-03-10", BENCH, at_80(&[8, 8, 7], &[1, 1, 1])),
            &map,
            &build_default_catalog(),
        );
        let second = apply_workout_result(
            &workout("2024-03-13", BENCH, at_80(&[8, 7, 7], &[1, 1, 1])),
            &first.progression_by_exercise_id,
            &build_default_catalog(),
        );

        let rec = &second.recommendations[0];
        assert_eq!(rec.action, Action::Maintain);
        assert_eq!(rec.reason, Reason::TopNotReachedOnAllSets);
        assert_eq!(second.progression_by_exercise_id[BENCH].stall_counter, 1);

        let third = apply_workout_result(
            &workout("2024-03-16", BENCH, at_80(&[9, 8, 8], &[1, 1, 1])),
            &second.progression_by_exercise_id,
            &build_default_catalog(),
        );
        assert_eq!(third.recommendations[0].reason, Reason::ProgressingWithinRange);
        assert_eq!(third.progression_by_exercise_id[BENCH].stall_counter, 1);
    }

    #[test]
    fn test_deload_blocks_increase_and_resets_stall() {
        let mut map = prior(Some(80.0));
        let state = map.get_mut(BENCH).unwrap();
        state.stall_counter = 3;
        start_deload(state, NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());

        let log = workout("2024-03-10", BENCH, at_80(&[10, 10, 10], &[2, 2, 2]));
        let (rec, state) = run(&log, &map);

        assert_eq!(rec.action, Action::Maintain);
        assert_eq!(rec.reason, Reason::DeloadActive);
        assert_eq!(rec.recommended_load, Some(80.0));
        assert_eq!(state.stall_counter, 0);
        assert!(state.last_was_deload);
        assert_eq!(state.deload_until.as_deref(), Some("2024-03-10"));
    }

    #[test]
    fn test_deload_does_not_soften_reduce() {
        let mut map = prior(Some(80.0));
        let state = map.get_mut(BENCH).unwrap();
        state.stall_counter = 2;
        start_deload(state, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());

        let log = workout("2024-03-10", BENCH, at_80(&[4, 4, 4], &[1, 1, 1]));
        let (rec, state) = run(&log, &map);

        assert_eq!(rec.action, Action::Reduce);
        assert_eq!(rec.reason, Reason::RepsBelowMinimum);
        assert_eq!(state.stall_counter, 3);
    }

    #[test]
    fn test_session_after_deload_window_can_increase() {
        let mut map = prior(Some(80.0));
        start_deload(map.get_mut(BENCH).unwrap(), NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());

        let log = workout("2024-03-10T18:30:00Z", BENCH, at_80(&[10, 10, 10], &[2, 2, 2]));
        let (rec, state) = run(&log, &map);

        assert_eq!(rec.action, Action::Increase);
        assert!(!state.last_was_deload);
    }

    #[test]
    fn test_summary_capped_and_newest_first() {
        let catalog = build_default_catalog();
        let mut map = prior(Some(80.0));
        for day in 1..=12 {
            let date = format!("2024-03-{:02}", day);
            map = apply_workout_result(
                &workout(&date, BENCH, at_80(&[8, 8, 8], &[2, 2, 2])),
                &map,
                &catalog,
            )
            .progression_by_exercise_id;
        }
        // A late entry for an older date must not jump ahead of newer rows
        map = apply_workout_result(
            &workout("2024-03-08", BENCH, at_80(&[8, 8, 8], &[2, 2, 2])),
            &map,
            &catalog,
        )
        .progression_by_exercise_id;

        let summary = &map[BENCH].last_n_workouts_summary;
        assert_eq!(summary.len(), MAX_SUMMARY_ENTRIES);
        assert_eq!(summary[0].date, "2024-03-12");
        let stamps: Vec<_> = summary.iter().map(|e| date_to_millis(&e.date)).collect();
        assert!(stamps.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_undated_session_kept_at_head_of_full_summary() {
        let catalog = build_default_catalog();
        let mut map = prior(Some(80.0));
        for day in 1..=8 {
            let date = format!("2024-03-{:02}", day);
            map = apply_workout_result(
                &workout(&date, BENCH, at_80(&[8, 8, 8], &[2, 2, 2])),
                &map,
                &catalog,
            )
            .progression_by_exercise_id;
        }
        assert_eq!(map[BENCH].last_n_workouts_summary.len(), MAX_SUMMARY_ENTRIES);

        let log = workout("10/03/2024", BENCH, sets(&[(9, 82.5, Some(2)); 3]));
        map = apply_workout_result(&log, &map, &catalog).progression_by_exercise_id;

        let summary = &map[BENCH].last_n_workouts_summary;
        assert_eq!(summary.len(), MAX_SUMMARY_ENTRIES);
        assert_eq!(summary[0].date, "10/03/2024");
        assert_eq!(summary[0].top_set_load, 82.5);
        assert_eq!(summary[1].date, "2024-03-08");
        assert_eq!(summary[7].date, "2024-03-02");

        // The next session is compared against the undated one
        let log = workout("2024-03-12", BENCH, sets(&[(9, 82.5, Some(2)); 3]));
        let (rec, state) = run(&log, &map);
        assert_eq!(rec.reason, Reason::TopNotReachedOnAllSets);
        assert_eq!(state.stall_counter, map[BENCH].stall_counter + 1);
    }

    #[test]
    fn test_metrics_with_unreported_rir_and_bad_technique() {
        let mut logged = sets(&[
            (10, 50.0, None),
            (10, 50.0, None),
            (9, 50.0, None),
            (8, 50.0, None),
        ]);
        logged[3].technique = TechniqueFlag::Bad;
        let metrics = session_metrics(&logged, RepRange::new(8, 12)).unwrap();

        assert_eq!(metrics.average_rir, None);
        assert_eq!(metrics.technique_ok_rate, Some(75.0));
        assert!(metrics.any_bad_technique);
        assert!(!metrics.majority_below_min);
        assert!(!metrics.all_at_or_above_top);
        assert!(session_metrics(&[], RepRange::new(8, 12)).is_none());
    }

    #[test]
    fn test_top_set_ties_broken_by_load() {
        let logged = sets(&[(8, 60.0, None), (10, 55.0, None), (10, 57.5, None)]);
        assert_eq!(top_set(&logged), Some(TopSet { reps: 10, load: 57.5 }));
    }

    #[test]
    fn test_untrained_exercises_carried_over() {
        let mut map = prior(Some(80.0));
        let mut deadlift = map[BENCH].clone();
        deadlift.exercise_id = "deadlift".into();
        map.insert("deadlift".into(), deadlift);
        let mut log = workout("2024-03-10", BENCH, at_80(&[8, 8, 8], &[1, 1, 1]));
        log.exercises.push(ExerciseSessionLog {
            exercise: ExerciseInput::new("back-squat"),
            sets: vec![],
            created_at: 0,
        });

        let outcome = apply_workout_result(&log, &map, &build_default_catalog());
        assert_eq!(outcome.recommendations.len(), 1);
        assert_eq!(outcome.progression_by_exercise_id["deadlift"], map["deadlift"]);
        assert!(!outcome.progression_by_exercise_id.contains_key("back-squat"));
    }

    #[test]
    fn test_apply_is_deterministic() {
        let map = prior(Some(80.0));
        let log = workout("not a date", BENCH, at_80(&[10, 9, 9], &[1, 2, 2]));
        let catalog = build_default_catalog();

        let first = apply_workout_result(&log, &map, &catalog);
        let second = apply_workout_result(&log, &map, &catalog);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first.progression_by_exercise_id).unwrap(),
            serde_json::to_string(&second.progression_by_exercise_id).unwrap()
        );
        // Unparseable date keeps the previous completion time
        assert_eq!(first.progression_by_exercise_id[BENCH].last_completed_at, 1_709_000_000_000);
    }

    #[test]
    fn test_recommended_load_positive_and_two_decimals() {
        let catalog = build_default_catalog();
        for load in [0.3, 1.0, 2.4, 33.333, 80.0] {
            for reps in [[4, 4, 4], [8, 8, 8], [12, 12, 12]] {
                let values: Vec<_> = reps.iter().map(|r| (*r, load, Some(1))).collect();
                let log = workout("2024-03-10", "lat-pulldown", sets(&values));
                let outcome = apply_workout_result(&log, &ProgressionMap::new(), &catalog);
                let recommended = outcome.recommendations[0].recommended_load.unwrap();
                assert!(recommended > 0.0);
                assert!((recommended * 100.0 - (recommended * 100.0).round()).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_seed_initial_load() {
        let catalog = build_default_catalog();
        let meta = meta::resolve(&ExerciseInput::new(BENCH), catalog.get(BENCH));

        let easy = seed_initial_load(None, &meta, 60.0, LoadFeel::Easy).unwrap();
        assert_eq!(easy.recommended_load, Some(62.5));
        assert_eq!(easy.last_load, Some(60.0));

        let existing = prior(Some(80.0));
        let mut with_history = existing[BENCH].clone();
        with_history.stall_counter = 4;
        let hard = seed_initial_load(Some(&with_history), &meta, 2.0, LoadFeel::Hard).unwrap();
        assert_eq!(hard.recommended_load, Some(MIN_LOAD));
        assert_eq!(hard.stall_counter, 0);
        assert_eq!(hard.last_completed_at, with_history.last_completed_at);

        assert!(seed_initial_load(None, &meta, 0.0, LoadFeel::Ok).is_err());
    }

    #[test]
    fn test_end_deload_clears_window() {
        let mut state = prior(Some(80.0))[BENCH].clone();
        start_deload(&mut state, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
        end_deload(&mut state);
        assert!(state.deload_until.is_none());
    }

    trait TapLoads {
        fn tap_loads(self, load: f64) -> Self;
    }

    impl TapLoads for WorkoutSessionLog {
        fn tap_loads(mut self, load: f64) -> Self {
            for exercise in &mut self.exercises {
                for set in &mut exercise.sets {
                    set.load = load;
                }
            }
            self
        }
    }
}
