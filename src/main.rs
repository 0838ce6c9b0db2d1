use std::path::PathBuf;

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod config;
mod dates;
mod db;
mod escalation;
mod models;
mod notify;
mod reconcile;
mod report;

use models::StaffDefaults;

#[derive(Parser)]
#[command(name = "carehome-compliance")]
#[command(about = "Training compliance reminders and bulk uploads for care home staff", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Reconcile a CSV of training records against the store
    Upload {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = "system")]
        uploaded_by: String,
        /// JSON file of profile defaults applied to newly created staff
        #[arg(long)]
        defaults: Option<PathBuf>,
        /// Write the full upload result as JSON
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run the daily reminder escalation scan
    RemindScan,
    /// List training that expires soonest
    Expiring {
        #[arg(long, default_value_t = 30)]
        within_days: i64,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
    /// Generate a markdown compliance report
    Report {
        #[arg(long)]
        site: Option<String>,
        #[arg(long, default_value = "compliance-report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Upload {
            csv,
            uploaded_by,
            defaults,
            out,
        } => {
            let rows = reconcile::read_rows(&csv)?;
            let staff_defaults = match defaults {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path).with_context(|| {
                        format!("failed to read defaults file {}", path.display())
                    })?;
                    serde_json::from_str::<StaffDefaults>(&raw).with_context(|| {
                        format!("failed to parse defaults file {}", path.display())
                    })?
                }
                None => StaffDefaults::default(),
            };

            let result =
                reconcile::process_bulk_upload(&pool, &rows, &uploaded_by, &staff_defaults).await;

            println!(
                "Processed {} rows: {} new, {} updated, {} skipped ({}% success).",
                result.processing_details.total_rows,
                result.new_records,
                result.updated_records,
                result.skipped_rows,
                result.processing_details.success_rate
            );
            for error in &result.errors {
                println!(
                    "- row {} [{}]: {} ({})",
                    error.row, error.column, error.issue, error.suggestion
                );
            }

            if let Some(out) = out {
                std::fs::write(&out, serde_json::to_string_pretty(&result)?)?;
                println!("Result written to {}.", out.display());
            }

            if !result.success {
                anyhow::bail!("upload failed to commit; no changes were applied");
            }
        }
        Commands::RemindScan => {
            let delivery = notify::Delivery::from_config(config::DeliveryConfig::from_env())?;
            let summary = escalation::run_daily_scan(&pool, &delivery).await?;
            println!(
                "Scanned {} records, fired {} reminders, persisted {} notifications, created {} tasks.",
                summary.scanned, summary.fired, summary.notifications_persisted, summary.tasks_created
            );
        }
        Commands::Expiring { within_days, limit } => {
            let today = Utc::now().date_naive();
            let window_end = today + Duration::days(within_days);
            let records = db::fetch_expiring_records(&pool, window_end, limit).await?;

            if records.is_empty() {
                println!("No training expires in the next {within_days} days.");
                return Ok(());
            }

            println!("Training expiring within {within_days} days:");
            for record in &records {
                let Some(expiry) = record.expiry_date else {
                    continue;
                };
                let days_left = (expiry - today).num_days();
                let state = if days_left < 0 {
                    format!("expired {} days ago", -days_left)
                } else {
                    format!("{days_left} days left")
                };
                let reminded = match record.last_reminder_date {
                    Some(stamp) => format!("last reminded {}", stamp.date_naive()),
                    None => "never reminded".to_string(),
                };
                println!(
                    "- {} / {}: {} ({}, {} reminders sent, {})",
                    record.staff_name,
                    record.course_title,
                    expiry,
                    state,
                    record.reminders_sent,
                    reminded
                );
            }
        }
        Commands::Report { site, out } => {
            let records = db::fetch_all_records(&pool).await?;
            let body =
                report::build_compliance_report(&records, Utc::now().date_naive(), site.as_deref());
            std::fs::write(&out, body)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
