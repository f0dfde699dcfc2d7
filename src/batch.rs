//! Parallel batch processing
//!
//! Games are independent, so a batch fans them out over a rayon pool. Each
//! worker owns its own database connection and writes each game in a
//! single transaction; a failing game is reported and the rest continue.

use crate::data::sources::load_game_file;
use crate::data::{Database, GameInput, SourceFormat};
use crate::pipeline::{process_game_checked, GameOutput};
use crate::{Config, CourtsideError, GameId, GameRecord, GameStatus, Result};
use chrono::Utc;
use rayon::prelude::*;
use std::fmt;
use std::time::{Duration, Instant};

/// Options for one `process` run
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Force a feed format instead of detecting it per file
    pub source: Option<SourceFormat>,
    /// Run the pipeline and checks but write nothing
    pub dry_run: bool,
    /// Reprocess games that are already stored
    pub full_rebuild: bool,
}

/// What happened to one game
#[derive(Debug, Clone, PartialEq)]
pub enum GameOutcome {
    Processed {
        game_id: GameId,
        warnings: usize,
        flagged: bool,
    },
    Skipped {
        game_id: GameId,
    },
    Failed {
        game_id: GameId,
        reason: String,
    },
}

impl GameOutcome {
    pub fn game_id(&self) -> &GameId {
        match self {
            GameOutcome::Processed { game_id, .. }
            | GameOutcome::Skipped { game_id }
            | GameOutcome::Failed { game_id, .. } => game_id,
        }
    }
}

/// Per-game outcomes of a run, in input order
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub outcomes: Vec<GameOutcome>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, GameOutcome::Processed { .. }))
            .count()
    }

    pub fn flagged(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, GameOutcome::Processed { flagged: true, .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, GameOutcome::Skipped { .. }))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&GameId, &str)> {
        self.outcomes.iter().filter_map(|o| match o {
            GameOutcome::Failed { game_id, reason } => Some((game_id, reason.as_str())),
            _ => None,
        })
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    /// 0 when every game succeeded or was skipped, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.failed() > 0 {
            1
        } else {
            0
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed ({} flagged), {} skipped, {} failed in {:.1}s",
            self.processed(),
            self.flagged(),
            self.skipped(),
            self.failed(),
            self.elapsed.as_secs_f64()
        )
    }
}

/// Process a set of games in parallel
///
/// Returns `Err` only for run-level problems (unusable database, pool
/// construction); per-game failures are recorded in the summary.
pub fn run_batch(config: &Config, games: &[GameInput], options: &BatchOptions) -> Result<RunSummary> {
    let started = Instant::now();
    let db_path = config.data.database_path.as_str();
    let timeout = Duration::from_secs(config.pipeline.game_timeout_secs);

    // Surface connection problems once, before any worker starts
    if !options.dry_run {
        Database::open(db_path).map_err(|e| {
            CourtsideError::Config(format!("cannot open database {}: {}", db_path, e))
        })?;
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.pipeline.workers)
        .build()
        .map_err(|e| CourtsideError::Config(format!("cannot start worker pool: {}", e)))?;

    log::info!(
        "Processing {} games on {} workers{}",
        games.len(),
        pool.current_num_threads(),
        if options.dry_run { " (dry run)" } else { "" }
    );

    let outcomes: Vec<GameOutcome> = pool.install(|| {
        games
            .par_iter()
            .map_init(
                || {
                    if options.dry_run {
                        None
                    } else {
                        Some(Database::open(db_path))
                    }
                },
                |db, input| match db {
                    None => process_one(None, input, options, timeout),
                    Some(Ok(db)) => process_one(Some(db), input, options, timeout),
                    Some(Err(e)) => GameOutcome::Failed {
                        game_id: input.game_id.clone(),
                        reason: format!("worker could not open database: {}", e),
                    },
                },
            )
            .collect()
    });

    let summary = RunSummary {
        outcomes,
        elapsed: started.elapsed(),
    };
    log::info!("{}", summary);
    Ok(summary)
}

/// Parse, reconstruct and store one game
pub fn process_one(
    db: Option<&mut Database>,
    input: &GameInput,
    options: &BatchOptions,
    timeout: Duration,
) -> GameOutcome {
    let game_id = input.game_id.clone();
    let failed = |reason: String| {
        log::error!("{}: {}", input.game_id, reason);
        GameOutcome::Failed {
            game_id: input.game_id.clone(),
            reason,
        }
    };

    if let Some(db) = db.as_deref() {
        if !options.full_rebuild {
            match db.is_processed(&game_id) {
                Ok(true) => {
                    log::debug!("{}: already processed, skipping", game_id);
                    return GameOutcome::Skipped { game_id };
                }
                Ok(false) => {}
                Err(e) => return failed(e.to_string()),
            }
        }
    }

    let started = Instant::now();
    let (format, output) = match reconstruct(input, options.source) {
        Ok(result) => result,
        Err(e) => return failed(e.to_string()),
    };

    if started.elapsed() > timeout {
        return failed(format!(
            "took {:.1}s, over the {}s budget; nothing written",
            started.elapsed().as_secs_f64(),
            timeout.as_secs()
        ));
    }

    for warning in &output.warnings {
        log::debug!("{}: {}", game_id, warning);
    }
    let flagged = output.is_flagged();
    let warnings = output.warnings.len();

    if let Some(db) = db {
        let record = GameRecord {
            game_id: game_id.clone(),
            game_date: Some(input.game_date),
            source: format.as_str().to_string(),
            teams: output.teams,
            final_score: output.final_score,
            is_final: output.is_final,
            status: if flagged {
                GameStatus::Flagged
            } else {
                GameStatus::Ok
            },
            warning_count: warnings,
            processed_at: Utc::now(),
        };
        if let Err(e) = db.replace_game(&record, &output) {
            return failed(format!("write failed, game rolled back: {}", e));
        }
    }

    log::info!(
        "{}: {} events, {} possessions, {} lineups, score {}-{}{}",
        game_id,
        output.events.len(),
        output.possessions.len(),
        output.lineups.len(),
        output.final_score.0,
        output.final_score.1,
        if flagged { " [flagged]" } else { "" }
    );

    GameOutcome::Processed {
        game_id,
        warnings,
        flagged,
    }
}

fn reconstruct(
    input: &GameInput,
    source: Option<SourceFormat>,
) -> Result<(SourceFormat, GameOutput)> {
    let (format, raw) = load_game_file(&input.path, &input.game_id, source)?;
    let output = process_game_checked(&input.game_id, raw)?;
    Ok((format, output))
}
