use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod assess;
mod config;
mod db;
mod error;
mod menu;
mod models;
mod prompt;
mod report;
mod risk;

use crate::assess::AssessmentClient;
use crate::config::AssessConfig;
use crate::db::{Persisted, Session};
use crate::models::{validate_marks_and_attendance, Record, RecordUpdate, NUM_SUBJECTS};
use crate::prompt::{LinePrompter, TermPrompter};

#[derive(Parser)]
#[command(name = "student-records")]
#[command(about = "Student record store with AI risk and career assessment", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Binary student database file
    #[arg(long, env = "STUDENT_DB", default_value = "students.dat", global = true)]
    db: PathBuf,

    /// Base URL of the OpenAI-compatible assessment service
    #[arg(long, env = "OPENAI_BASE_URL", default_value = config::DEFAULT_BASE_URL, global = true)]
    ai_base_url: String,

    /// Model used for assessments
    #[arg(long, env = "OPENAI_MODEL", default_value = config::DEFAULT_MODEL, global = true)]
    ai_model: String,

    #[arg(long, default_value_t = config::DEFAULT_TIMEOUT_SECS, global = true)]
    ai_timeout_secs: u64,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the interactive menu
    Menu,
    /// Add a student
    Add {
        #[arg(long)]
        roll: i32,
        #[arg(long)]
        name: String,
        /// Five comma-separated marks: maths, physics, chemistry, computer science, english
        #[arg(long, value_delimiter = ',')]
        marks: Vec<f64>,
        #[arg(long)]
        attendance: f64,
    },
    /// Update fields of an existing student
    Update {
        #[arg(long)]
        roll: i32,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_delimiter = ',')]
        marks: Option<Vec<f64>>,
        #[arg(long)]
        attendance: Option<f64>,
    },
    /// Delete a student by roll number
    Delete {
        #[arg(long)]
        roll: i32,
    },
    /// Find a student by roll number or exact name
    #[command(group(
        ArgGroup::new("key")
            .args(["roll", "name"])
            .required(true)
            .multiple(false)
    ))]
    Search {
        #[arg(long)]
        roll: Option<i32>,
        #[arg(long)]
        name: Option<String>,
    },
    /// List all students ordered by roll number
    List,
    /// Assess risk and suggest a career for a student
    Analyze {
        #[arg(long)]
        roll: i32,
    },
    /// Load sample students
    Seed,
    /// Import students from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_marks(values: &[f64]) -> anyhow::Result<[f64; NUM_SUBJECTS]> {
    <[f64; NUM_SUBJECTS]>::try_from(values).map_err(|_| {
        anyhow::anyhow!(
            "expected {NUM_SUBJECTS} marks, got {}",
            values.len()
        )
    })
}

fn announce(persisted: Persisted, message: &str) {
    if let Some(warning) = persisted.warning() {
        println!("{warning}");
    }
    println!("{message}");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = AssessConfig {
        base_url: cli.ai_base_url,
        model: cli.ai_model,
        timeout: Duration::from_secs(cli.ai_timeout_secs),
        ..AssessConfig::default()
    };
    let mut session = Session::open(&cli.db)
        .with_context(|| format!("failed to load database {}", cli.db.display()))?;

    match cli.command {
        Commands::Menu => {
            let client = AssessmentClient::new(config)?;
            let stdin = std::io::stdin();
            if stdin.is_terminal() {
                menu::Menu::new(session, &client, TermPrompter::new(), std::io::stdout())
                    .run()
                    .await?;
            } else {
                let prompter = LinePrompter::new(stdin.lock(), std::io::stdout());
                menu::Menu::new(session, &client, prompter, std::io::stdout())
                    .run()
                    .await?;
            }
        }
        Commands::Add {
            roll,
            name,
            marks,
            attendance,
        } => {
            let marks = parse_marks(&marks)?;
            validate_marks_and_attendance(&marks, attendance)?;
            let persisted = session.add(Record::new(&name, roll, marks, attendance))?;
            announce(persisted, "Student added successfully.");
        }
        Commands::Update {
            roll,
            name,
            marks,
            attendance,
        } => {
            let current = session.store().get(roll)?.clone();
            let marks = marks.as_deref().map(parse_marks).transpose()?;
            validate_marks_and_attendance(
                &marks.unwrap_or(current.marks),
                attendance.unwrap_or(current.attendance),
            )?;
            let persisted = session.update(
                roll,
                RecordUpdate {
                    name,
                    marks,
                    attendance,
                },
            )?;
            announce(persisted, "Student updated successfully.");
        }
        Commands::Delete { roll } => {
            let persisted = session.delete(roll)?;
            announce(persisted, "Student deleted.");
        }
        Commands::Search { roll, name } => {
            let found = match (roll, name.as_deref()) {
                (Some(roll), _) => session.store().get(roll),
                (None, Some(name)) => session.store().get_by_name(name),
                (None, None) => anyhow::bail!("search needs --roll or --name"),
            };
            match found {
                Ok(record) => println!("{record}"),
                Err(err) => {
                    debug!(error = %err, "search miss");
                    println!("Not found.");
                }
            }
        }
        Commands::List => match session.store().list_sorted_by_roll() {
            Some(records) => {
                for record in records {
                    println!("{record}");
                }
            }
            None => println!("No student records available."),
        },
        Commands::Analyze { roll } => {
            let record = session.store().get(roll)?;
            let client = AssessmentClient::new(config)?;
            let result = client.assess(record).await;
            info!(roll, risk = %result.risk, fallback = result.is_fallback(), "assessment complete");
            println!("AI Analysis for {} (Roll {}):", record.name, record.roll);
            println!("{result}");
        }
        Commands::Seed => {
            let inserted = db::seed(&mut session)?;
            println!("Seeded {inserted} students.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&mut session, &csv)?;
            println!("Inserted {inserted} students from {}.", csv.display());
        }
        Commands::Report { out } => {
            let report = report::build_report(session.store(), chrono::Local::now().date_naive());
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
