//! Courtside CLI
//!
//! Reconstructs possessions, lineups and plus/minus from NBA play-by-play
//! files and answers point-in-time questions about the results.

use clap::{Parser, Subcommand};
use courtside::{Config, CourtsideError, Result};

#[derive(Parser)]
#[command(name = "courtside")]
#[command(about = "Possession and plus/minus reconstruction for NBA play-by-play", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and create the database
    Init,
    /// Reconstruct games from the input directory
    Process {
        /// Process a single game
        #[arg(long, conflicts_with = "date_range", required_unless_present = "date_range")]
        game_id: Option<String>,
        /// Process all games dated in a range, e.g. 2024-01-01..2024-01-31
        #[arg(long)]
        date_range: Option<String>,
        /// Feed format (canonical, espn, nba-api); detected per file if omitted
        #[arg(long)]
        source: Option<String>,
        /// Run every check but write nothing
        #[arg(long)]
        dry_run: bool,
        /// Reprocess games that are already stored
        #[arg(long)]
        full_rebuild: bool,
    },
    /// Show database status
    Status {
        /// List flagged games
        #[arg(long)]
        flagged: bool,
    },
    /// A player's plus/minus at a moment
    PlayerState {
        /// Player id
        #[arg(long)]
        player: i64,
        /// Game to look in (not needed with --wall-clock)
        #[arg(long, required_unless_present = "wall_clock")]
        game_id: Option<String>,
        /// Seconds since tip-off
        #[arg(long, conflicts_with_all = ["period", "wall_clock"])]
        elapsed: Option<f64>,
        /// Period number, used with --clock
        #[arg(long, requires = "clock")]
        period: Option<u8>,
        /// Countdown clock within --period, e.g. 5:32
        #[arg(long, requires = "period")]
        clock: Option<String>,
        /// RFC 3339 timestamp, searched across all games
        #[arg(long)]
        wall_clock: Option<String>,
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// Lineups ranked by net rating
    Leaderboard {
        /// Rank lineups from one game
        #[arg(long, conflicts_with = "date_range", required_unless_present = "date_range")]
        game_id: Option<String>,
        /// Rank lineups over a date range
        #[arg(long)]
        date_range: Option<String>,
        /// Minimum offensive plus defensive possessions
        #[arg(long, default_value = "0")]
        min_possessions: u32,
        /// Rows to show
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// List a game's events in a time window
    Events {
        /// Game id
        #[arg(long)]
        game_id: String,
        /// Window start, elapsed seconds
        #[arg(long, default_value = "0")]
        from: f64,
        /// Window end, elapsed seconds
        #[arg(long)]
        to: Option<f64>,
        /// Only this event type, e.g. made_shot
        #[arg(long)]
        kind: Option<String>,
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {}. Use table, json, or csv.", s)),
        }
    }
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config, falling back to defaults, then apply environment overrides
    let config = if std::path::Path::new(&cli.config).exists() {
        Config::load(&cli.config)
    } else {
        Ok(Config::default())
    }
    .and_then(Config::with_env_overrides);
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(2);
        }
    };

    // Run command
    let result = match cli.command {
        Commands::Init => commands::init(&cli.config, &config).map(|_| 0),
        Commands::Process {
            game_id,
            date_range,
            source,
            dry_run,
            full_rebuild,
        } => commands::process(&config, game_id, date_range, source, dry_run, full_rebuild),
        Commands::Status { flagged } => commands::status(&config, flagged).map(|_| 0),
        Commands::PlayerState {
            player,
            game_id,
            elapsed,
            period,
            clock,
            wall_clock,
            format,
        } => commands::player_state(
            &config, player, game_id, elapsed, period, clock, wall_clock, format,
        )
        .map(|_| 0),
        Commands::Leaderboard {
            game_id,
            date_range,
            min_possessions,
            limit,
            format,
        } => commands::leaderboard(&config, game_id, date_range, min_possessions, limit, format)
            .map(|_| 0),
        Commands::Events {
            game_id,
            from,
            to,
            kind,
            format,
        } => commands::events(&config, &game_id, from, to, kind, format).map(|_| 0),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(exit_code_for(&e));
        }
    }
}

/// 2 for configuration and connection problems, 1 for everything else
fn exit_code_for(e: &CourtsideError) -> i32 {
    if e.is_fatal() {
        2
    } else {
        1
    }
}

mod commands {
    use super::*;
    use courtside::batch::{run_batch, BatchOptions};
    use courtside::clock;
    use courtside::data::{Database, DateRange, InputDir, SourceFormat};
    use courtside::query::{LeaderboardScope, Moment, PlayerState, Queries};
    use courtside::{EventKind, GameId, PlayerId};
    use chrono::{DateTime, Utc};

    pub fn init(config_path: &str, config: &Config) -> Result<()> {
        config.save(config_path)?;
        println!("Created config at {}", config_path);

        std::fs::create_dir_all(&config.data.input_dir)?;
        Database::open(&config.data.database_path)?;
        println!("Created {} and {}", config.data.input_dir, config.data.database_path);

        println!("\nNext steps:");
        println!(
            "  1. Put game files under {}/<YYYY-MM-DD>/<game_id>.json",
            config.data.input_dir
        );
        println!("  2. Run 'courtside process --date-range 2024-01-01..2024-01-31'");
        println!("  3. Run 'courtside leaderboard --date-range 2024-01-01..2024-01-31'");

        Ok(())
    }

    pub fn process(
        config: &Config,
        game_id: Option<String>,
        date_range: Option<String>,
        source: Option<String>,
        dry_run: bool,
        full_rebuild: bool,
    ) -> Result<i32> {
        let source: Option<SourceFormat> = source.map(|s| s.parse()).transpose()?;
        let input = InputDir::open(&config.data.input_dir)?;

        let games = match (game_id, date_range) {
            (Some(id), _) => vec![input.find_game(&GameId::new(id))?],
            (None, Some(range)) => {
                let range: DateRange = range.parse()?;
                input.games_in_range(range)?
            }
            (None, None) => {
                return Err(CourtsideError::Config(
                    "pass --game-id or --date-range".to_string(),
                ))
            }
        };

        if games.is_empty() {
            println!("No games found in {}", input.root().display());
            return Ok(0);
        }

        let options = BatchOptions {
            source,
            dry_run,
            full_rebuild,
        };
        let summary = run_batch(config, &games, &options)?;

        println!("Processing Summary");
        println!("───────────────────────────────");
        println!("  Games:     {}", games.len());
        println!("  Processed: {}", summary.processed());
        println!("  Flagged:   {}", summary.flagged());
        println!("  Skipped:   {}", summary.skipped());
        println!("  Failed:    {}", summary.failed());
        println!("  Time:      {:.1}s", summary.elapsed.as_secs_f64());
        if dry_run {
            println!("  (dry run, nothing written)");
        }
        for (game_id, reason) in summary.failures() {
            println!("  ✗ {}: {}", game_id, reason);
        }

        Ok(summary.exit_code())
    }

    pub fn status(config: &Config, flagged: bool) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let stats = db.get_stats()?;

        println!("Database Status");
        println!("───────────────────────────────");
        println!("  Path:        {}", config.data.database_path);
        println!("  Games:       {}", stats.game_count);
        println!("  Flagged:     {}", stats.flagged_count);
        println!("  Events:      {}", stats.event_count);
        println!("  Possessions: {}", stats.possession_count);
        println!("  Lineups:     {}", stats.lineup_count);
        println!("  +/- rows:    {}", stats.plus_minus_count);
        if let (Some(earliest), Some(latest)) = (stats.earliest_game, stats.latest_game) {
            println!("  Range:       {} to {}", earliest, latest);
        }

        if flagged {
            println!("\nFlagged games");
            println!("───────────────────────────────");
            for game in db.get_games()? {
                if game.status == courtside::GameStatus::Flagged {
                    println!(
                        "  {} {} ({} warnings)",
                        game.game_date.map(|d| d.to_string()).unwrap_or_default(),
                        game.game_id,
                        game.warning_count
                    );
                }
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn player_state(
        config: &Config,
        player: i64,
        game_id: Option<String>,
        elapsed: Option<f64>,
        period: Option<u8>,
        clock_text: Option<String>,
        wall_clock: Option<String>,
        format: OutputFormat,
    ) -> Result<()> {
        let moment = match (wall_clock, game_id, elapsed, period, clock_text) {
            (Some(ts), _, _, _, _) => {
                let at = DateTime::parse_from_rfc3339(&ts)
                    .map_err(|e| CourtsideError::Parse(format!("bad timestamp '{}': {}", ts, e)))?
                    .with_timezone(&Utc);
                Moment::WallClock(at)
            }
            (None, Some(id), Some(seconds), _, _) => Moment::Elapsed {
                game_id: GameId::new(id),
                seconds,
            },
            (None, Some(id), None, Some(period), Some(text)) => Moment::GameClock {
                game_id: GameId::new(id),
                period,
                clock_seconds: clock::parse_clock(&text)
                    .ok_or_else(|| CourtsideError::Parse(format!("bad clock '{}'", text)))?,
            },
            _ => {
                return Err(CourtsideError::Parse(
                    "pass --wall-clock, or --game-id with --elapsed or --period/--clock"
                        .to_string(),
                ))
            }
        };

        let db = Database::open(&config.data.database_path)?;
        let queries = Queries::new(&db);
        let state = queries.player_state_at(PlayerId(player), &moment)?;

        match (format, state) {
            (OutputFormat::Json, PlayerState::Known(s)) => {
                println!("{}", serde_json::to_string_pretty(&s)?);
            }
            (OutputFormat::Json, PlayerState::NotYetOnCourt) => {
                println!("{}", serde_json::json!({ "player_id": player, "state": "not_yet_on_court" }));
            }
            (OutputFormat::Csv, PlayerState::Known(s)) => {
                println!("game_id,player_id,team_id,elapsed_seconds,on_court,plus_minus,possession_number");
                println!(
                    "{},{},{},{:.1},{},{},{}",
                    s.game_id,
                    s.player_id.0,
                    s.team_id.0,
                    s.elapsed_seconds,
                    s.on_court,
                    s.plus_minus,
                    s.possession_number.map(|n| n.to_string()).unwrap_or_default()
                );
            }
            (OutputFormat::Csv, PlayerState::NotYetOnCourt) => {
                println!("game_id,player_id,team_id,elapsed_seconds,on_court,plus_minus,possession_number");
            }
            (OutputFormat::Table, PlayerState::Known(s)) => {
                println!("Player {}", player);
                println!("───────────────────────────────");
                println!("  Game:       {}", s.game_id);
                println!("  Team:       {}", s.team_id);
                println!(
                    "  As of:      P{} {} ({:.1}s elapsed)",
                    clock::period_at(s.elapsed_seconds),
                    format_clock(clock::clock_at(clock::period_at(s.elapsed_seconds), s.elapsed_seconds)),
                    s.elapsed_seconds
                );
                println!("  On court:   {}", if s.on_court { "yes" } else { "no" });
                println!("  Plus/minus: {:+}", s.plus_minus);
                if let Some(n) = s.possession_number {
                    println!("  Possession: {}", n);
                }
            }
            (OutputFormat::Table, PlayerState::NotYetOnCourt) => {
                println!("Player {} has not been on court yet at that moment", player);
            }
        }

        Ok(())
    }

    pub fn leaderboard(
        config: &Config,
        game_id: Option<String>,
        date_range: Option<String>,
        min_possessions: u32,
        limit: usize,
        format: OutputFormat,
    ) -> Result<()> {
        let scope = match (game_id, date_range) {
            (Some(id), _) => LeaderboardScope::Game(GameId::new(id)),
            (None, Some(range)) => LeaderboardScope::Dates(range.parse()?),
            (None, None) => {
                return Err(CourtsideError::Parse(
                    "pass --game-id or --date-range".to_string(),
                ))
            }
        };

        let db = Database::open(&config.data.database_path)?;
        let ratings = Queries::new(&db).lineup_leaderboard(&scope, min_possessions)?;
        let shown = &ratings[..ratings.len().min(limit)];

        match format {
            OutputFormat::Table => {
                println!("Lineup Leaderboard ({})", scope);
                println!("─────────────────────────────────────────────────────────────────────");
                println!(
                    "  {:<4} {:<10} {:<36} {:>5} {:>7} {:>7} {:>7}",
                    "#", "Team", "Lineup", "Poss", "ORtg", "DRtg", "Net"
                );
                for (i, r) in shown.iter().enumerate() {
                    println!(
                        "  {:<4} {:<10} {:<36} {:>5} {:>7.1} {:>7.1} {:>+7.1}",
                        i + 1,
                        r.team_id.0,
                        r.lineup_hash,
                        r.possessions(),
                        r.offensive_rating,
                        r.defensive_rating,
                        r.net_rating
                    );
                }
                if ratings.len() > shown.len() {
                    println!("  ... {} more", ratings.len() - shown.len());
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(shown)?);
            }
            OutputFormat::Csv => {
                println!("team_id,lineup_hash,games,seconds,off_poss,def_poss,points_for,points_against,ortg,drtg,net");
                for r in shown {
                    println!(
                        "{},{},{},{:.0},{},{},{},{},{:.1},{:.1},{:.1}",
                        r.team_id.0,
                        r.lineup_hash,
                        r.games,
                        r.seconds_on_court,
                        r.offensive_possessions,
                        r.defensive_possessions,
                        r.points_for,
                        r.points_against,
                        r.offensive_rating,
                        r.defensive_rating,
                        r.net_rating
                    );
                }
            }
        }

        Ok(())
    }

    pub fn events(
        config: &Config,
        game_id: &str,
        from: f64,
        to: Option<f64>,
        kind: Option<String>,
        format: OutputFormat,
    ) -> Result<()> {
        let kind: Option<EventKind> = kind.map(|k| k.parse()).transpose()?;
        let db = Database::open(&config.data.database_path)?;
        let queries = Queries::new(&db).with_page_size(config.pipeline.page_size);
        let range = queries.events_in_range(&GameId::new(game_id), from, to.unwrap_or(f64::MAX), kind)?;

        match format {
            OutputFormat::Table => {
                println!(
                    "  {:>5} {:>3} {:>7} {:>8} {:<18} {:>12} {:>10} {:>3}",
                    "Seq", "P", "Clock", "Elapsed", "Type", "Team", "Player", "Pts"
                );
                println!("─────────────────────────────────────────────────────────────────────────────");
            }
            OutputFormat::Csv => {
                println!("sequence,period,game_clock_seconds,elapsed_seconds,event_type,team_id,player_id,points_scored");
            }
            OutputFormat::Json => {}
        }

        let mut count = 0;
        for event in &range {
            let e = event?;
            count += 1;
            match format {
                OutputFormat::Table => println!(
                    "  {:>5} {:>3} {:>7} {:>8.1} {:<18} {:>12} {:>10} {:>3}",
                    e.sequence,
                    e.period,
                    format_clock(e.game_clock_seconds),
                    e.elapsed_game_seconds,
                    e.kind.as_str(),
                    e.team_id.map(|t| t.0.to_string()).unwrap_or_default(),
                    e.player_id.map(|p| p.0.to_string()).unwrap_or_default(),
                    e.points_scored
                ),
                // One object per line so large ranges stream
                OutputFormat::Json => println!("{}", serde_json::to_string(&e)?),
                OutputFormat::Csv => println!(
                    "{},{},{},{},{},{},{},{}",
                    e.sequence,
                    e.period,
                    e.game_clock_seconds,
                    e.elapsed_game_seconds,
                    e.kind.as_str(),
                    e.team_id.map(|t| t.0.to_string()).unwrap_or_default(),
                    e.player_id.map(|p| p.0.to_string()).unwrap_or_default(),
                    e.points_scored
                ),
            }
        }

        if let OutputFormat::Table = format {
            println!("\n  {} events", count);
        }

        Ok(())
    }

    fn format_clock(seconds: f64) -> String {
        let whole = seconds.max(0.0);
        let minutes = (whole / 60.0).floor() as u32;
        let rest = whole - minutes as f64 * 60.0;
        // Tenths only show under a minute, as on the arena clock
        if minutes == 0 && rest.fract() != 0.0 {
            format!("0:{:04.1}", rest)
        } else {
            format!("{}:{:02}", minutes, rest.floor() as u32)
        }
    }
}
