//! Changeflow - workflow lifecycle engine for business-change requests.
//!
//! Command-line front end over the request store, the stage gate, and the
//! generation collaborators.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use changeflow::ai::StreamDecoder;
use changeflow::workflow::{
    available_transitions, compute_sla, Complexity, DocumentKind, ImpactAssessment, Priority,
    RequestDraft, ScoreBreakdown, Stage, TRANSITIONS,
};
use changeflow::{Actor, App, Config, Role};

/// Workflow lifecycle engine for business-change requests
#[derive(Parser)]
#[command(name = "changeflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Act as this person (defaults to the configured actor)
    #[arg(long, global = true)]
    actor: Option<String>,

    /// Act in this role (defaults to the configured role)
    #[arg(long, global = true)]
    role: Option<Role>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the stage transition table (only the given --role's edges, if set)
    Transitions,

    /// Compute an SLA
    Sla {
        /// Request complexity (simple, medium, complex)
        #[arg(short, long, default_value = "medium")]
        complexity: Complexity,

        /// Creation date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        created: DateTime<Utc>,

        /// Evaluate as of this date (YYYY-MM-DD), defaults to today
        #[arg(long, value_parser = parse_date)]
        now: Option<DateTime<Utc>>,
    },

    /// Decode a captured generation stream and print its JSON
    Decode {
        /// File holding the raw response body
        file: PathBuf,

        /// Minimum content length before the output counts as empty
        #[arg(long, default_value_t = 5)]
        min_len: usize,
    },

    /// List requests by impact
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Submit a new request
    Submit {
        /// Short title
        title: String,

        /// What is being asked for
        #[arg(short, long, default_value = "")]
        description: String,

        /// Business priority (high, medium, low)
        #[arg(short, long, default_value = "medium")]
        priority: Priority,
    },

    /// Move a request to another stage
    Advance {
        /// Request id
        id: String,

        /// Target stage (e.g. "ready-for-dev")
        stage: Stage,

        /// Note, required when sending work back
        #[arg(short, long)]
        note: Option<String>,
    },

    /// Clear a request's intake alert
    Dismiss {
        /// Request id
        id: String,
    },

    /// Override a request's impact score
    Score {
        /// Request id
        id: String,

        #[arg(long)]
        revenue: f64,

        #[arg(long)]
        reach: f64,

        #[arg(long)]
        strategic: f64,

        #[arg(long)]
        urgency: f64,

        #[arg(long)]
        quick_win: f64,

        /// Why the score changed
        #[arg(short, long)]
        justification: String,
    },

    /// Generate the scoping documents for a request
    Generate {
        /// Request id
        id: String,
    },

    /// Approve one generated document
    Approve {
        /// Request id
        id: String,

        /// Document kind (prd, user-stories, technical-spec)
        kind: DocumentKind,
    },

    /// Show configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("warn") };

    tracing_subscriber::registry().with(fmt::layer().with_target(false)).with(filter).init();

    match cli.command {
        Commands::Transitions => cmd_transitions(cli.role),
        Commands::Sla { complexity, created, now } => cmd_sla(complexity, created, now)?,
        Commands::Decode { file, min_len } => cmd_decode(&file, min_len)?,
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Config { path } => cmd_config(path)?,
        command => {
            let app = load_app(cli.actor, cli.role)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_store_command(&app, command))?;
        }
    }

    Ok(())
}

fn parse_date(value: &str) -> Result<DateTime<Utc>, String> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))?;
    let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(|| "invalid date".to_string())?;
    Ok(Utc.from_utc_datetime(&midnight))
}

fn load_app(actor: Option<String>, role: Option<Role>) -> Result<App> {
    let config = Config::load().context("Failed to load configuration")?;
    let name = actor.unwrap_or_else(|| config.general.actor.clone());
    let role = role.unwrap_or(config.general.role);
    Ok(App::new(config)?.with_actor(Actor::new(name, role)))
}

/// Print the transition table.
fn cmd_transitions(for_role: Option<Role>) {
    for stage in Stage::ALL {
        let edges: Vec<_> = match for_role {
            Some(role) => available_transitions(role, stage),
            None => TRANSITIONS.iter().filter(|t| t.from == stage).collect(),
        };
        for edge in edges {
            println!("{} -> {} [{}] {}", edge.from, edge.to, edge.role, edge.label);
        }
    }
}

fn cmd_sla(
    complexity: Complexity,
    created: DateTime<Utc>,
    now: Option<DateTime<Utc>>,
) -> Result<()> {
    let sla = compute_sla(created, Some(complexity), now.unwrap_or_else(Utc::now));
    println!("{}", serde_json::to_string_pretty(&sla)?);
    Ok(())
}

fn cmd_decode(file: &Path, min_len: usize) -> Result<()> {
    const CHUNK: usize = 4096;

    let body = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let mut decoder = StreamDecoder::new(min_len);
    for chunk in body.chunks(CHUNK) {
        decoder.push(chunk)?;
        if decoder.is_done() {
            break;
        }
    }

    let value = decoder.finish()?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, changeflow::APP_NAME, &mut io::stdout());
}

fn cmd_config(show_path: bool) -> Result<()> {
    if show_path {
        match Config::config_dir() {
            Some(dir) => println!("{}", dir.join("config.toml").display()),
            None => println!("No config directory available"),
        }
        return Ok(());
    }

    let config = Config::load()?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

async fn run_store_command(app: &App, command: Commands) -> Result<()> {
    app.refresh().await?;
    let now = Utc::now();
    let store = app.store();

    match command {
        Commands::List { format } => print_dashboard(app, &format)?,
        Commands::Submit { title, description, priority } => {
            let draft = RequestDraft::new(title, description, priority, app.actor.name.clone());
            if !app.has_provider() {
                eprintln!("No generation provider configured, submitting unassessed");
            }
            let request = app.submit(draft, now).await?;
            println!("{} -> {}", request.id, request.owner);
        }
        Commands::Advance { id, stage, note } => {
            store.update_stage(&id, stage, note.as_deref(), &app.actor).await?;
            println!("{id} moved to {stage}");
        }
        Commands::Dismiss { id } => {
            store.dismiss_alert(&id).await?;
            println!("Alert cleared for {id}");
        }
        Commands::Score { id, revenue, reach, strategic, urgency, quick_win, justification } => {
            let breakdown = ScoreBreakdown::new(revenue, reach, strategic, urgency, quick_win);
            let assessment =
                ImpactAssessment::manual_override(breakdown, justification, &app.actor.name, now);
            let total = assessment.total_score;
            store.adjust_impact_score(&id, assessment, &app.actor).await?;
            println!("{id} scored {total:.0}");
        }
        Commands::Generate { id } => {
            app.generate_documents(&id, now, |p| {
                eprint!("\r[{}/{}] {} ({} chars)", p.step, p.total, p.kind.title(), p.received);
            })
            .await?;
            eprintln!();
            println!("Documents generated for {id}");
        }
        Commands::Approve { id, kind } => {
            store.approve_document(&id, kind, &app.actor).await?;
            println!("{} approved for {id}", kind.title());
        }
        Commands::Transitions
        | Commands::Sla { .. }
        | Commands::Decode { .. }
        | Commands::Config { .. }
        | Commands::Completions { .. } => {}
    }
    Ok(())
}

fn print_dashboard(app: &App, format: &str) -> Result<()> {
    let rows = app.dashboard(Utc::now());

    match format {
        "json" => {
            let requests: Vec<_> = rows.iter().map(|row| &row.request).collect();
            println!("{}", serde_json::to_string_pretty(&requests)?);
        }
        _ => {
            for row in &rows {
                let score = row
                    .request
                    .impact_score()
                    .map_or_else(|| "  -".to_string(), |s| format!("{s:>3.0}"));
                println!(
                    "{score} {:<7} {:<8} {:<14} {}{}",
                    format!("{:?}", row.badge).to_lowercase(),
                    row.sla.status.as_str(),
                    row.request.stage.as_str(),
                    row.request.title,
                    if row.quick_win { " (quick win)" } else { "" }
                );
            }
            println!("\nTotal: {} requests", rows.len());
        }
    }

    Ok(())
}
