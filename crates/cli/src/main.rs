use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use cli::rule_args::RuleArgs;
use cli::{logging, render};
use reclaim_core::catalog::MovieCatalog;
use reclaim_core::clock::{Clock, SystemClock};
use reclaim_core::config::{self, AppConfig};
use reclaim_core::pipeline;
use reclaim_core::rules;
use reclaim_core::scheduler::{self, TickOutcome};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use storage::models::{GeneralSettings, SyncKind};
use storage::Database;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let cfg = config::load(cli.config.as_deref())?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command {
        Commands::Serve => run_serve(cfg, clock).await,
        Commands::Sync { full, json } => run_sync(cfg, clock, full, json).await,
        Commands::Reap { json } => run_reap(cfg, clock, json).await,
        Commands::Movies { view, json } => run_movies(cfg, clock, view, json).await,
        Commands::Ignore { id } => run_ignore(cfg, clock, id, true).await,
        Commands::Unignore { id } => run_ignore(cfg, clock, id, false).await,
        Commands::Rules { command } => run_rules(cfg, clock, command).await,
        Commands::Tags { json } => run_tags(cfg, json).await,
        Commands::Syncs { limit, json } => run_syncs(cfg, limit, json).await,
        Commands::Settings { command } => run_settings(cfg, command).await,
    }
}

#[derive(Parser)]
#[command(name = "reclaimarr")]
#[command(about = "Rule-based movie retention for Radarr and Tautulli", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the hourly sync scheduler and the stuck-run reaper until Ctrl-C
    Serve,
    /// Run one sync now
    Sync {
        /// Also delete movies matched by enabled rules
        #[arg(long, default_value_t = false)]
        full: bool,
        /// Output JSON report
        #[arg(long)]
        json: bool,
    },
    /// Force-finish syncs that have been running for more than twelve hours
    Reap {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// List movies
    Movies {
        /// Which movies to list
        #[arg(value_enum, default_value_t = MovieView::Monitored)]
        view: MovieView,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Exclude a movie from every rule
    Ignore { id: i64 },
    /// Make an ignored movie eligible again
    Unignore { id: i64 },
    /// Manage retention rules
    Rules {
        #[command(subcommand)]
        command: RuleCommands,
    },
    /// List tags mirrored from the media manager
    Tags {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// List recent sync runs
    Syncs {
        /// Number of runs to show
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or change the general sync settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MovieView {
    /// Soft-matched by an enabled rule, soonest deletion first
    Monitored,
    /// Live movies outside the monitored set
    Ignored,
    /// Live, not ignored by the user and matched by no enabled rule
    Unmonitored,
    /// Deleted by a sync or gone upstream
    Deleted,
    /// Everything, including deleted movies
    All,
}

#[derive(Subcommand)]
enum RuleCommands {
    /// List rules in creation order
    List {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a rule
    Add(RuleArgs),
    /// Replace every field of a rule
    Update {
        id: i64,
        #[command(flatten)]
        rule: RuleArgs,
    },
    /// Delete a rule
    Remove { id: i64 },
    Enable { id: i64 },
    Disable { id: i64 },
    /// Create or replace rules from the *.toml files in a directory
    Import { dir: PathBuf },
    /// Movies a rule matches right now
    Matches {
        id: i64,
        /// Include movies whose age predicates have not passed yet
        #[arg(long, default_value_t = false)]
        soft: bool,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    Show {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Change the given fields and keep the rest
    Set {
        #[arg(long)]
        enabled: Option<bool>,
        /// Days between FULL syncs
        #[arg(long)]
        sync_days: Option<i64>,
        /// Local hour (0-23) at which a FULL sync may start
        #[arg(long)]
        sync_hour: Option<u32>,
    },
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_serve(cfg: AppConfig, clock: Arc<dyn Clock>) -> Result<()> {
    let db = pipeline::bootstrap(&cfg).await?;
    let scheduler = pipeline::build_scheduler(&cfg, db, clock)?;
    info!(dry_run = cfg.safety.dry_run, "Scheduler started");
    scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "could not listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}

async fn run_sync(cfg: AppConfig, clock: Arc<dyn Clock>, full: bool, json: bool) -> Result<()> {
    let db = pipeline::bootstrap(&cfg).await?;
    let scheduler = pipeline::build_scheduler(&cfg, db, clock)?;
    let kind = if full { SyncKind::Full } else { SyncKind::Partial };
    match scheduler.run_now(kind).await? {
        TickOutcome::Skipped { running } => {
            anyhow::bail!("sync already running: {:?}", running);
        }
        TickOutcome::Completed(report) => {
            if json {
                return print_json(&report);
            }
            println!(
                "{} sync {}: {} tags, {} movies ({} without file, {} removed), {} watch matches",
                report.kind,
                report.sync_id,
                report.tags.upserted,
                report.movies.upserted,
                report.movies.skipped_without_file,
                report.movies.removed,
                report.history.matched
            );
            if let Some(deletion) = &report.deletion {
                println!(
                    "deleted {} movie(s), skipped {} (dry run)",
                    deletion.deleted.len(),
                    deletion.skipped.len()
                );
            }
        }
    }
    Ok(())
}

async fn run_reap(cfg: AppConfig, clock: Arc<dyn Clock>, json: bool) -> Result<()> {
    let db = pipeline::open_database(&cfg).await?;
    let reaped = scheduler::reap_stale(&db, clock.now_utc()).await?;
    if json {
        return print_json(&reaped);
    }
    println!("stopped {} long running sync(s)", reaped.len());
    Ok(())
}

async fn run_movies(cfg: AppConfig, clock: Arc<dyn Clock>, view: MovieView, json: bool) -> Result<()> {
    let db = pipeline::open_database(&cfg).await?;
    let catalog = MovieCatalog::new(db, clock);
    if let MovieView::Monitored = view {
        let movies = catalog.monitored().await?;
        if json {
            return print_json(&movies);
        }
        for m in &movies {
            println!("{}", render::monitored(m));
        }
        return Ok(());
    }
    let movies = match view {
        MovieView::Ignored => catalog.ignored().await?,
        MovieView::Unmonitored => catalog.unmonitored().await?,
        MovieView::Deleted => catalog.deleted().await?,
        MovieView::All | MovieView::Monitored => catalog.all().await?,
    };
    if json {
        return print_json(&movies);
    }
    for m in &movies {
        println!("{}", render::movie(m));
    }
    Ok(())
}

async fn run_ignore(cfg: AppConfig, clock: Arc<dyn Clock>, id: i64, ignored: bool) -> Result<()> {
    let db = pipeline::open_database(&cfg).await?;
    let catalog = MovieCatalog::new(db, clock);
    if !catalog.set_ignored(id, ignored).await? {
        anyhow::bail!("no movie with id {id}");
    }
    println!("movie {id} {}", if ignored { "ignored" } else { "no longer ignored" });
    Ok(())
}

async fn rule_by_id(db: &Database, id: i64) -> Result<storage::models::Rule> {
    db.rules()
        .get(id)
        .await?
        .with_context(|| format!("no rule with id {id}"))
}

async fn set_rule_enabled(db: &Database, id: i64, enabled: bool) -> Result<()> {
    if !db.rules().set_enabled(id, enabled).await? {
        anyhow::bail!("no rule with id {id}");
    }
    println!("{}", render::rule(&rule_by_id(db, id).await?));
    Ok(())
}

async fn run_rules(cfg: AppConfig, clock: Arc<dyn Clock>, command: RuleCommands) -> Result<()> {
    let db = pipeline::open_database(&cfg).await?;
    let repo = db.rules();
    match command {
        RuleCommands::List { json } => {
            let rules = repo.all().await?;
            if json {
                return print_json(&rules);
            }
            for r in &rules {
                println!("{}", render::rule(r));
            }
        }
        RuleCommands::Add(args) => {
            let input = args.into_input(&db.tags().all().await?)?;
            let rule = repo.create(input).await?;
            println!("{}", render::rule(&rule));
        }
        RuleCommands::Update { id, rule } => {
            let input = rule.into_input(&db.tags().all().await?)?;
            let rule = repo
                .update(id, input)
                .await?
                .with_context(|| format!("no rule with id {id}"))?;
            println!("{}", render::rule(&rule));
        }
        RuleCommands::Remove { id } => {
            if !repo.delete(id).await? {
                anyhow::bail!("no rule with id {id}");
            }
            println!("rule {id} removed");
        }
        RuleCommands::Enable { id } => set_rule_enabled(&db, id, true).await?,
        RuleCommands::Disable { id } => set_rule_enabled(&db, id, false).await?,
        RuleCommands::Import { dir } => {
            let summary = rules::import_rules(&db, &dir).await?;
            println!("{} created, {} updated", summary.created, summary.updated);
        }
        RuleCommands::Matches { id, soft, json } => {
            let rule = rule_by_id(&db, id).await?;
            let movies = MovieCatalog::new(db, clock).for_rule(&rule, soft).await?;
            if json {
                return print_json(&movies);
            }
            for m in &movies {
                println!("{}", render::movie(m));
            }
        }
    }
    Ok(())
}

async fn run_tags(cfg: AppConfig, json: bool) -> Result<()> {
    let db = pipeline::open_database(&cfg).await?;
    let tags = db.tags().all().await?;
    if json {
        return print_json(&tags);
    }
    for t in &tags {
        println!("{:>4}  {}", t.id, t.name);
    }
    Ok(())
}

async fn run_syncs(cfg: AppConfig, limit: i64, json: bool) -> Result<()> {
    let db = pipeline::open_database(&cfg).await?;
    let runs = db.syncs().recent(limit).await?;
    if json {
        return print_json(&runs);
    }
    for s in &runs {
        println!("{}", render::sync_run(s));
    }
    Ok(())
}

async fn run_settings(cfg: AppConfig, command: SettingsCommands) -> Result<()> {
    let db = pipeline::open_database(&cfg).await?;
    let store = db.settings();
    match command {
        SettingsCommands::Show { json } => {
            let settings = store.general().await?;
            if json {
                return print_json(&settings);
            }
            println!("{}", render::settings(&settings));
        }
        SettingsCommands::Set {
            enabled,
            sync_days,
            sync_hour,
        } => {
            let current = store.general().await?;
            let updated = GeneralSettings {
                enabled: enabled.unwrap_or(current.enabled),
                sync_days: sync_days.unwrap_or(current.sync_days),
                sync_hour: sync_hour.unwrap_or(current.sync_hour),
            };
            store.update_general(&updated).await?;
            println!("{}", render::settings(&updated));
        }
    }
    Ok(())
}
