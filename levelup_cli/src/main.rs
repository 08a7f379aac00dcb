use chrono::{Days, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use levelup_core::snapshot::{ExerciseSnapshot, SetSnapshot, WorkoutCompleted};
use levelup_core::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "levelup")]
#[command(about = "Strength progression tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Prescribe the next session for the given exercises
    Plan {
        /// Exercise ids (defaults to every exercise with progression)
        exercises: Vec<String>,

        /// Print prescriptions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record a completed workout from a JSON file ('-' for stdin)
    Log {
        file: PathBuf,

        /// Sync with the remote right after logging
        #[arg(long)]
        sync: bool,
    },

    /// Set the starting load for an exercise
    Seed {
        exercise: String,
        load: f64,

        /// How the load felt
        #[arg(long, value_enum, default_value_t = Feel::Ok)]
        feel: Feel,
    },

    /// Start or end a deload window for an exercise
    Deload {
        exercise: String,

        /// Last day of the deload (YYYY-MM-DD)
        #[arg(long, conflicts_with_all = ["days", "end"])]
        until: Option<NaiveDate>,

        /// Deload length in days from today
        #[arg(long, default_value_t = 7)]
        days: u64,

        /// End the current deload
        #[arg(long)]
        end: bool,
    },

    /// Show stored progression
    Status,

    /// Reconcile local state with the remote copy
    Sync,

    /// Write the full local state as JSON
    Export {
        /// Output file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Replace local state with a previously exported document
    Import { file: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum Feel {
    Easy,
    Ok,
    Hard,
}

impl From<Feel> for LoadFeel {
    fn from(feel: Feel) -> Self {
        match feel {
            Feel::Easy => LoadFeel::Easy,
            Feel::Ok => LoadFeel::Ok,
            Feel::Hard => LoadFeel::Hard,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    levelup_core::logging::init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    tracing::debug!("Using data directory {:?}", data_dir);
    let local = Arc::new(LocalState::new(FileStore::new(&data_dir)));

    match cli.command {
        Commands::Plan { exercises, json } => cmd_plan(&data_dir, &local, exercises, json),
        Commands::Log { file, sync } => {
            cmd_log(&data_dir, &local, &file)?;
            if sync {
                cmd_sync(local, &config).await;
            }
            Ok(())
        }
        Commands::Seed {
            exercise,
            load,
            feel,
        } => cmd_seed(&data_dir, &local, &exercise, load, feel.into()),
        Commands::Deload {
            exercise,
            until,
            days,
            end,
        } => cmd_deload(&local, &exercise, until, days, end),
        Commands::Status => cmd_status(&local),
        Commands::Sync => {
            cmd_sync(local, &config).await;
            Ok(())
        }
        Commands::Export { output } => cmd_export(&local, output.as_deref()),
        Commands::Import { file } => cmd_import(&local, &file),
    }
}

type Local = LocalState<FileStore>;

/// Built-in catalog merged with `<data_dir>/catalog.json`
fn load_validated_catalog(data_dir: &Path) -> Result<Catalog> {
    let catalog = load_catalog(&data_dir.join("catalog.json"))?;
    let errors = catalog.validate();
    if !errors.is_empty() {
        eprintln!("Catalog validation errors:");
        for error in errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::CatalogValidation("Invalid catalog".into()));
    }
    Ok(catalog)
}

fn cmd_plan(data_dir: &Path, local: &Local, exercises: Vec<String>, json: bool) -> Result<()> {
    let catalog = load_validated_catalog(data_dir)?;
    let snapshot = local.load()?;

    let ids: Vec<String> = if exercises.is_empty() {
        snapshot.progression_by_exercise_id.keys().cloned().collect()
    } else {
        exercises
    };
    if ids.is_empty() {
        println!("No exercises to plan. Name some, e.g. `levelup plan bench-press`.");
        return Ok(());
    }

    let inputs: Vec<ExerciseInput> = ids.into_iter().map(ExerciseInput::new).collect();
    let prescriptions = plan(&inputs, &snapshot.progression_by_exercise_id, &catalog);

    if json {
        println!("{}", serde_json::to_string_pretty(&prescriptions)?);
        return Ok(());
    }

    for p in &prescriptions {
        let load = p
            .load_recommendation
            .map(|l| format!("{} kg", l))
            .unwrap_or_else(|| "set a starting load".to_string());
        println!(
            "{}: {} x {}-{} reps @ RIR {}-{}, rest {}s, load {}",
            p.exercise_id,
            p.sets_planned,
            p.rep_range.min,
            p.rep_range.max,
            p.rir_target.min,
            p.rir_target.max,
            p.rest_sec,
            load
        );
        println!("  {}", p.notes);
    }
    Ok(())
}

fn read_input(file: &Path) -> Result<String> {
    if file == Path::new("-") {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        Ok(std::fs::read_to_string(file)?)
    }
}

fn cmd_log(data_dir: &Path, local: &Local, file: &Path) -> Result<()> {
    let catalog = load_validated_catalog(data_dir)?;
    let log = parse_workout_log(&read_input(file)?)?;

    // A workout without a single logged set is not history
    if log.exercises.iter().all(|e| e.sets.is_empty()) {
        println!("No sets logged in workout {}, nothing recorded", log.workout_id);
        return Ok(());
    }

    let mut recommendations = Vec::new();
    local.update(|snapshot| {
        let outcome = apply_workout_result(&log, &snapshot.progression_by_exercise_id, &catalog);
        snapshot.progression_by_exercise_id = outcome.progression_by_exercise_id;
        recommendations = outcome.recommendations;

        let mut total_volume = 0.0;
        for exercise in log.exercises.iter().filter(|e| !e.sets.is_empty()) {
            let meta = meta::resolve(&exercise.exercise, catalog.get(exercise.exercise_id()));
            let work_sets: Vec<SetSnapshot> = exercise
                .sets
                .iter()
                .map(|set| SetSnapshot {
                    kg: set.load,
                    reps: set.reps,
                })
                .collect();
            total_volume += work_sets.iter().map(|s| s.kg * s.reps as f64).sum::<f64>();

            snapshot
                .exercise_history
                .entry(exercise.exercise_id().to_string())
                .or_default()
                .push(ExerciseSnapshot {
                    exercise_id: exercise.exercise_id().to_string(),
                    workout_id: log.workout_id.clone(),
                    reps_range: format!("{}-{}", meta.rep_range.min, meta.rep_range.max),
                    work_sets,
                    timestamp: log.date.clone(),
                });
        }

        snapshot.workout_history.push(WorkoutCompleted {
            workout_id: log.workout_id.clone(),
            timestamp: log.date.clone(),
            total_volume,
        });
        Ok(())
    })?;

    println!("✓ Logged workout {} ({})", log.workout_id, log.date);
    for rec in &recommendations {
        let load = rec
            .recommended_load
            .map(|l| format!("{} kg", l))
            .unwrap_or_else(|| "-".to_string());
        println!("  {}: {} → {} ({})", rec.exercise_id, rec.action, load, rec.reason);
    }
    Ok(())
}

fn cmd_seed(data_dir: &Path, local: &Local, exercise: &str, load: f64, feel: LoadFeel) -> Result<()> {
    let catalog = load_validated_catalog(data_dir)?;
    let meta = meta::resolve(&ExerciseInput::new(exercise), catalog.get(exercise));

    let snapshot = local.update(|snapshot| {
        let seeded = seed_initial_load(
            snapshot.progression_by_exercise_id.get(exercise),
            &meta,
            load,
            feel,
        )?;
        snapshot
            .progression_by_exercise_id
            .insert(exercise.to_string(), seeded);
        Ok(())
    })?;

    if let Some(state) = snapshot.progression_by_exercise_id.get(exercise) {
        println!(
            "✓ {} starts at {} kg next session (step {} kg)",
            exercise,
            state.recommended_load.unwrap_or(load),
            state.micro_increment
        );
    }
    Ok(())
}

fn cmd_deload(
    local: &Local,
    exercise: &str,
    until: Option<NaiveDate>,
    days: u64,
    end: bool,
) -> Result<()> {
    let until = match until {
        Some(date) => date,
        None => Utc::now()
            .date_naive()
            .checked_add_days(Days::new(days))
            .ok_or_else(|| Error::Other(format!("Deload of {} days is out of range", days)))?,
    };

    local.update(|snapshot| {
        let state = snapshot
            .progression_by_exercise_id
            .get_mut(exercise)
            .ok_or_else(|| Error::State(format!("No progression recorded for {}", exercise)))?;
        if end {
            progression::end_deload(state);
        } else {
            progression::start_deload(state, until);
        }
        Ok(())
    })?;

    if end {
        println!("✓ Deload ended for {}", exercise);
    } else {
        println!("✓ Deload for {} until {}", exercise, until);
    }
    Ok(())
}

fn cmd_status(local: &Local) -> Result<()> {
    let snapshot = local.load()?;
    println!(
        "Workouts logged: {}  (updated {})",
        snapshot.workout_history.len(),
        snapshot.updated_at
    );

    if snapshot.progression_by_exercise_id.is_empty() {
        println!("No progression recorded yet.");
        return Ok(());
    }

    for (id, state) in &snapshot.progression_by_exercise_id {
        let fmt_load = |l: Option<f64>| l.map(|l| format!("{} kg", l)).unwrap_or_else(|| "-".into());
        print!(
            "{}: last {}, next {}, stalls {}",
            id,
            fmt_load(state.last_load),
            fmt_load(state.recommended_load),
            state.stall_counter
        );
        if let Some(until) = &state.deload_until {
            print!(", deload until {}", until);
        }
        println!();
    }
    Ok(())
}

async fn cmd_sync(local: Arc<Local>, config: &Config) {
    // Without a user id there is no remote document to address
    let remote_dir = config
        .sync
        .user_id
        .as_ref()
        .and(config.sync.remote_dir.clone());
    let coordinator = SyncCoordinator::new(
        local,
        Arc::new(DirRemoteStore::new(remote_dir)),
        config.sync.user_id.clone().unwrap_or_default(),
        config.sync.debounce(),
    );

    let report = coordinator.force_sync().await;
    println!("Sync {}: {}", report.status, report.message);
}

fn cmd_export(local: &Local, output: Option<&Path>) -> Result<()> {
    let text = local.export()?;
    match output {
        Some(path) => {
            std::fs::write(path, text)?;
            println!("✓ Exported to {}", path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn cmd_import(local: &Local, file: &Path) -> Result<()> {
    let imported = local.import(&read_input(file)?)?;
    println!(
        "✓ Imported {} exercises, {} workouts",
        imported.progression_by_exercise_id.len(),
        imported.workout_history.len()
    );
    Ok(())
}
