use ai_session_tracker::report;
use ai_session_tracker::{
    Config, FunctionChange, Result, SessionTracker, StatisticsEngine, TrackerError,
};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log filter env var, e.g. AI_SESSIONS_LOG=debug
const LOG_ENV: &str = "AI_SESSIONS_LOG";

#[derive(Parser, Debug)]
#[command(name = "ai-session-tracker")]
#[command(author, version, about = "Track AI-assisted work sessions and measure their ROI")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Storage directory (overrides config and AI_OUTPUT_DIR)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log lifecycle events to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a session (closes any active session in the same context)
    Start {
        /// Short description of the work
        name: String,

        /// Task type, e.g. code_generation, debugging, human_review
        #[arg(short, long)]
        task_type: String,

        /// Model doing the work
        #[arg(short, long, default_value = "unknown")]
        model: String,

        /// Human effort estimate in minutes (15, 30, 60, 120, 240, 480, 960, 2400, 4800)
        #[arg(short, long)]
        estimate: f64,

        /// Where the estimate came from
        #[arg(long, default_value = "manual")]
        estimate_source: String,

        /// Defaults to the configured developer, then $USER
        #[arg(long)]
        developer: Option<String>,

        /// Defaults to AI_PROJECT_ID, then the current directory name
        #[arg(long)]
        project: Option<String>,

        /// foreground or background
        #[arg(short, long, default_value = "foreground")]
        context: String,
    },

    /// Log one prompt/response exchange
    Log {
        session_id: String,

        #[arg(short, long)]
        prompt: String,

        #[arg(short, long)]
        summary: String,

        /// Effectiveness 1-5 (out-of-range values are clamped)
        #[arg(short, long, allow_hyphen_values = true)]
        rating: i64,

        #[arg(short, long)]
        iterations: Option<i64>,

        /// Tool used during the exchange (repeatable)
        #[arg(long = "tool")]
        tools: Vec<String>,
    },

    /// Flag a problem in a session
    Flag {
        session_id: String,

        /// e.g. hallucination, incorrect_output, tool_failure
        #[arg(short = 't', long = "type")]
        issue_type: String,

        #[arg(short, long)]
        description: String,

        /// low, medium, high or critical
        #[arg(short, long)]
        severity: String,
    },

    /// End a session
    End {
        session_id: String,

        /// success, partial or failed
        #[arg(short, long)]
        outcome: String,

        /// Revised human estimate in minutes
        #[arg(short, long)]
        final_estimate: Option<f64>,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// List active sessions
    Active,

    /// Attach code metrics for functions changed in one file
    Metrics {
        session_id: String,

        /// Source file to scan
        #[arg(short, long)]
        file: PathBuf,

        /// JSON array: [{"name": "f", "modification_type": "added", "lines_added": 10}]
        #[arg(long)]
        functions: String,
    },

    /// Close every active session (e.g. before shutting down)
    CloseAll {
        #[arg(short, long, default_value = "shutdown")]
        reason: String,
    },

    /// Summary report: ROI, effectiveness, gaps, issues
    Report {
        /// Limit the report to one session
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,

    /// Generate shell completions
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("{} ({}): {}", "Error".red().bold(), e.kind(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .try_init();
}

fn run(args: Args) -> Result<()> {
    let mut config = Config::load();
    if let Some(dir) = args.dir {
        config.storage.dir = Some(dir);
    }
    let tracker = SessionTracker::from_config(&config);
    let json = args.json;

    match args.command {
        Command::Start {
            name,
            task_type,
            model,
            estimate,
            estimate_source,
            developer,
            project,
            context,
        } => {
            let developer = developer.unwrap_or_else(|| config.developer());
            let project = project.unwrap_or_else(|| config.project());
            let started = tracker.start_session(
                &name,
                &task_type,
                &model,
                estimate,
                &estimate_source,
                &developer,
                &project,
                &context,
            )?;
            if json {
                return print_json(&started);
            }
            for closed in &started.auto_closed_sessions {
                println!("{} {}", "Auto-closed".yellow(), closed);
            }
            println!("{} {}", "Started".green(), started.session_id);
        }

        Command::Log {
            session_id,
            prompt,
            summary,
            rating,
            iterations,
            tools,
        } => {
            let tools = (!tools.is_empty()).then_some(tools);
            let logged =
                tracker.log_interaction(&session_id, &prompt, &summary, rating, iterations, tools)?;
            if json {
                return print_json(&logged);
            }
            println!(
                "{} interaction {} (rating {}, session avg {:.2})",
                "Logged".green(),
                logged.total_interactions,
                logged.effectiveness_rating,
                logged.avg_effectiveness
            );
        }

        Command::Flag {
            session_id,
            issue_type,
            description,
            severity,
        } => {
            let issue = tracker.flag_issue(&session_id, &issue_type, &description, &severity)?;
            if json {
                return print_json(&issue);
            }
            println!("{} {} [{}]", "Flagged".yellow(), issue.issue_type, issue.severity);
        }

        Command::End {
            session_id,
            outcome,
            final_estimate,
            notes,
        } => {
            let ended =
                tracker.end_session(&session_id, &outcome, final_estimate, notes.as_deref())?;
            if json {
                return print_json(&ended);
            }
            println!(
                "{} {} ({}, {:.1} min, {} interactions, {} issues)",
                "Ended".green(),
                ended.session_id,
                ended.outcome,
                ended.duration_minutes,
                ended.total_interactions,
                ended.issues_count
            );
            if ended.duration_capped {
                println!(
                    "{}",
                    format!(
                        "Duration capped at {:.1}h",
                        config.session.max_duration_hours
                    )
                    .yellow()
                );
            }
        }

        Command::Active => {
            let active = tracker.get_active_sessions();
            if json {
                return print_json(&active);
            }
            if active.is_empty() {
                println!("No active sessions.");
            }
            for session in active {
                println!(
                    "{}  {:<10}  {}  {}",
                    session.id.cyan(),
                    session.execution_context,
                    session.start_time.format("%Y-%m-%d %H:%M"),
                    session.name
                );
            }
        }

        Command::Metrics {
            session_id,
            file,
            functions,
        } => {
            let changes: Vec<FunctionChange> = serde_json::from_str(&functions).map_err(|e| {
                TrackerError::Validation(format!("--functions is not valid JSON: {}", e))
            })?;
            let logged = tracker.log_code_metrics(&session_id, &file, &changes)?;
            if json {
                return print_json(&logged);
            }
            println!(
                "{} {} function(s) in {} (complexity {:.1}, doc {:.0}/100, effort {:.1})",
                "Analyzed".green(),
                logged.functions_analyzed,
                logged.file_path,
                logged.average_complexity,
                logged.average_doc_quality,
                logged.total_effort_score
            );
            for name in &logged.functions_skipped {
                println!("{} {} (not found)", "Skipped".yellow(), name);
            }
        }

        Command::CloseAll { reason } => {
            let closed = tracker.close_active_sessions(&reason)?;
            if json {
                return print_json(&closed);
            }
            println!("Closed {} session(s)", closed.len());
        }

        Command::Report { session } => {
            let engine = StatisticsEngine::from_config(&config);
            let report = engine.session_report(tracker.store(), session.as_deref())?;
            if json {
                return print_json(&report);
            }
            report::write_text(&mut io::stdout().lock(), &report)?;
        }

        Command::Config => {
            let text = toml::to_string_pretty(&config)
                .map_err(|e| TrackerError::Config(e.to_string()))?;
            print!("{}", text);
        }

        Command::Completion { shell } => {
            clap_complete::generate(
                shell,
                &mut Args::command(),
                "ai-session-tracker",
                &mut io::stdout(),
            );
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
