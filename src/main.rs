use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::mpsc;
use uuid::Uuid;

mod aggregate;
mod console;
mod currency;
mod db;
mod engine;
mod identity;
mod logging;
mod models;
mod report;
mod session;
mod settings;
mod store;
mod window;

use crate::console::ConsoleCommand;
use crate::engine::AggregationEngine;
use crate::identity::{IdentityProvider, SessionIdentity};
use crate::models::{ApprovalDecision, ClinicId};
use crate::session::ReportSession;
use crate::settings::Settings;
use crate::store::PgRecordStore;
use crate::window::TimeWindow;

#[derive(Parser)]
#[command(name = "clinic-portal")]
#[command(about = "Clinic portal: consultant approvals and booking metrics", long_about = None)]
struct Cli {
    /// Clinic to act for; defaults to the `clinic_email` setting
    #[arg(long, global = true)]
    clinic_email: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo clinic with consultants and bookings
    Seed,
    /// Import bookings from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Write a markdown booking report
    Report {
        #[arg(long, value_enum)]
        window: Option<TimeWindow>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        /// Print the window's metrics as JSON instead
        #[arg(long)]
        json: bool,
    },
    /// Follow booking metrics live
    Watch {
        #[arg(long, value_enum)]
        window: Option<TimeWindow>,
    },
    /// Review consultant applications
    Consultants {
        #[command(subcommand)]
        action: ConsultantAction,
    },
    /// Show the clinic profile
    Profile,
}

#[derive(Subcommand)]
enum ConsultantAction {
    /// List applications awaiting review
    Pending,
    /// Accept an application
    Accept {
        id: Uuid,
        /// Hourly rate in minor currency units
        #[arg(long)]
        hourly_rate: Option<u64>,
    },
    /// Reject an application
    Reject { id: Uuid },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load()?;
    logging::init(&settings.log_filter);

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let clinic_email = cli.clinic_email.or_else(|| settings.clinic_email.clone());

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} bookings from {}.", csv.display());
        }
        Commands::Report { window, out, json } => {
            let clinic_id = require_clinic(&pool, clinic_email.as_deref()).await?;
            let window = window.unwrap_or(settings.default_window);
            let bookings = db::fetch_bookings(&pool, clinic_id)
                .await
                .context("failed to load bookings")?;
            let now = Local::now();
            let metrics = aggregate::summarize_window(&bookings, window, &now);

            if json {
                println!("{}", serde_json::to_string_pretty(&metrics)?);
                return Ok(());
            }

            let clinic_name = db::clinic_name(&pool, clinic_id).await?;
            let by_window = aggregate::summarize_all(&bookings, &now);
            let report = report::build_report(
                &report::ReportInput {
                    clinic_name: &clinic_name,
                    window,
                    cutoff: window.cutoff(&now),
                    metrics,
                    by_window: &by_window,
                    bookings: &bookings,
                },
                &settings.currency,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Watch { window } => {
            let window = window.unwrap_or(settings.default_window);
            watch(pool, &settings, clinic_email, window).await?;
        }
        Commands::Consultants { action } => {
            let clinic_id = require_clinic(&pool, clinic_email.as_deref()).await?;
            match action {
                ConsultantAction::Pending => {
                    let consultants = db::pending_consultants(&pool, clinic_id).await?;
                    if consultants.is_empty() {
                        println!("There are no pending consultant applications at this time.");
                        return Ok(());
                    }

                    println!("Pending consultant applications:");
                    for consultant in consultants {
                        println!(
                            "- {} {} ({}, {}) applied {}",
                            consultant.id,
                            consultant.name,
                            consultant.specialty,
                            consultant.email,
                            consultant.applied_at.format("%Y-%m-%d")
                        );
                    }
                }
                ConsultantAction::Accept { id, hourly_rate } => {
                    db::decide_consultant(
                        &pool,
                        clinic_id,
                        id,
                        ApprovalDecision::Accept { hourly_rate },
                    )
                    .await?;
                    match hourly_rate {
                        Some(rate) => println!(
                            "Consultant application has been accepted at {} per hour.",
                            settings.currency.format_minor_units(rate)
                        ),
                        None => println!("Consultant application has been accepted."),
                    }
                }
                ConsultantAction::Reject { id } => {
                    db::decide_consultant(&pool, clinic_id, id, ApprovalDecision::Reject).await?;
                    println!("Consultant application has been rejected.");
                }
            }
        }
        Commands::Profile => {
            let clinic_id = require_clinic(&pool, clinic_email.as_deref()).await?;
            let profile = db::clinic_profile(&pool, clinic_id).await?;
            println!("Clinic: {} ({})", profile.clinic_name, profile.id);
            println!("Address: {}", profile.address_line());
            println!("Email: {}", profile.email_line());
        }
    }

    Ok(())
}

async fn require_clinic(pool: &PgPool, email: Option<&str>) -> anyhow::Result<ClinicId> {
    let email = email.context("pass --clinic-email or set clinic_email in the configuration")?;
    db::find_clinic_by_email(pool, email)
        .await?
        .with_context(|| format!("no clinic registered with {email}"))
}

async fn watch(
    pool: PgPool,
    settings: &Settings,
    clinic_email: Option<String>,
    window: TimeWindow,
) -> anyhow::Result<()> {
    let identity = Arc::new(SessionIdentity::signed_out());
    if let Some(email) = clinic_email.as_deref() {
        match db::find_clinic_by_email(&pool, email).await? {
            Some(clinic_id) => identity.sign_in(clinic_id),
            None => println!("No clinic registered with {email}."),
        }
    }
    if identity.current_clinic_id().is_none() {
        println!("Not signed in; use `sign-in <email>`.");
    }

    let store = Arc::new(PgRecordStore::new(pool.clone()));
    let engine = AggregationEngine::new(window);
    let mut view = engine.subscribe();
    let (window_tx, window_rx) = mpsc::channel(8);
    let session = ReportSession::new(identity.clone(), store, engine);

    let currency = settings.currency.clone();
    let display = tokio::spawn(async move {
        while view.changed().await.is_ok() {
            let line = console::render_view(&view.borrow_and_update(), &currency);
            println!("{line}");
        }
    });

    println!("{}", console::HELP);
    let console = tokio::spawn(run_console(pool, identity, window_tx));

    tokio::select! {
        _ = session.run(window_rx) => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
    }

    console.abort();
    display.await?;
    Ok(())
}

async fn run_console(
    pool: PgPool,
    identity: Arc<SessionIdentity>,
    windows: mpsc::Sender<TimeWindow>,
) {
    let mut lines = stdin_lines();

    while let Some(line) = lines.recv().await {
        if line.trim().is_empty() {
            continue;
        }

        match console::parse_command(&line) {
            Ok(ConsoleCommand::Window(window)) => {
                if windows.send(window).await.is_err() {
                    return;
                }
            }
            Ok(ConsoleCommand::SignIn(email)) => {
                match db::find_clinic_by_email(&pool, &email).await {
                    Ok(Some(clinic_id)) => identity.sign_in(clinic_id),
                    Ok(None) => println!("No clinic registered with {email}."),
                    Err(err) => tracing::error!(error = %err, "Clinic lookup failed"),
                }
            }
            Ok(ConsoleCommand::SignOut) => identity.sign_out(),
            Ok(ConsoleCommand::Quit) => return,
            Err(help) => println!("{help}"),
        }
    }
}

// Plain thread: a blocked stdin read must not hold up runtime shutdown.
fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}
