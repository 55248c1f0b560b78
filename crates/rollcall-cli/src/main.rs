use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;

use config::Config;
use engine::AttendanceEngine;
use rollcall_capture::{JsonlFeed, PreEncoded, SystemClock};
use rollcall_store::{AttendanceDb, ReportRow, DEFAULT_SESSION_MINUTES};

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new identity from a pre-encoded capture feed
    Register {
        /// Display name for the identity
        #[arg(short, long)]
        name: String,
        /// JSONL capture feed (one frame of detected faces per line)
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Create a session; its marking window opens now
    Session {
        /// Session name (e.g., "morning")
        #[arg(short, long)]
        name: String,
        /// Subject the session belongs to
        #[arg(short, long)]
        subject: String,
        /// Marking window in minutes
        #[arg(short, long, default_value_t = DEFAULT_SESSION_MINUTES)]
        minutes: i64,
    },
    /// Take attendance for a session from a capture feed
    Attend {
        /// Session name
        #[arg(long)]
        session: String,
        /// Subject the session belongs to
        #[arg(long)]
        subject: String,
        /// JSONL capture feed (one frame of detected faces per line)
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Print the attendance report, most recent marks first
    Report {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let db = AttendanceDb::open(&config.db_path)?;
    let mut engine = AttendanceEngine::new(db, SystemClock, config.match_threshold)?;

    match cli.command {
        Commands::Register { name, input } => {
            let mut source = JsonlFeed::open(&input)?;
            let mut encoder = PreEncoded;
            let entry = engine.register(
                &name,
                &mut source,
                &mut encoder,
                config.frames_per_register,
            )?;
            println!("Registered {} (id {})", entry.name, entry.id);
        }
        Commands::Session {
            name,
            subject,
            minutes,
        } => {
            let session = engine.create_session(&name, &subject, minutes)?;
            println!(
                "Session '{}' for subject '{}' created at {}; window closes after {} minutes",
                session.name,
                session.subject,
                session.started_at.format("%H:%M:%S"),
                session.duration_minutes
            );
        }
        Commands::Attend {
            session,
            subject,
            input,
        } => {
            let mut source = JsonlFeed::open(&input)?;
            let mut encoder = PreEncoded;
            let summary = engine.take_attendance(&session, &subject, &mut source, &mut encoder)?;

            for (id, name) in &summary.marked {
                println!("{name} (id {id}) marked present");
            }
            println!(
                "{} frames, {} faces: {} marked, {} already marked, {} past window, {} unknown",
                summary.frames,
                summary.faces,
                summary.marked.len(),
                summary.duplicate,
                summary.expired,
                summary.unknown
            );
        }
        Commands::Report { json } => {
            let report = engine.report()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if report.is_empty() {
                println!("No attendance recorded");
            } else {
                print_report_table(&report);
            }
        }
    }

    Ok(())
}

fn print_report_table(rows: &[ReportRow]) {
    let name_w = column_width("name", rows.iter().map(|r| r.name.len()));
    let session_w = column_width("session", rows.iter().map(|r| r.session.len()));
    let subject_w = column_width("subject", rows.iter().map(|r| r.subject.len()));

    println!(
        "{:<name_w$}  {:<session_w$}  {:<subject_w$}  {:<10}  {:<8}  status",
        "name", "session", "subject", "date", "time"
    );
    for row in rows {
        println!(
            "{:<name_w$}  {:<session_w$}  {:<subject_w$}  {:<10}  {:<8}  {}",
            row.name, row.session, row.subject, row.date, row.time, row.status
        );
    }
}

fn column_width(header: &str, cells: impl Iterator<Item = usize>) -> usize {
    cells.chain(std::iter::once(header.len())).max().unwrap_or(0)
}
