use clap::{Parser, Subcommand};
use uuid::Uuid;

use pulse_core::JobStatus;

mod enrich;
mod inspect;
#[cfg(test)]
mod tests;

use inspect::{DbCommands, JobCommands, RecordCommands};

#[derive(Debug, Parser)]
#[command(name = "pulse")]
#[command(about = "Social-media enrichment pipeline CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run an enrichment batch over ingested records
    Enrich {
        /// Comma-separated stage list, in dispatch order
        #[arg(long, default_value = "sentiment,location,entity,keyword")]
        stages: String,

        /// Maximum cohort size when no explicit records are given
        #[arg(long, default_value_t = 100)]
        limit: i64,

        /// Enrich a specific record instead of loading a cohort (repeatable)
        #[arg(long = "record")]
        records: Vec<Uuid>,

        /// Gate each stage on the previous stage completing per record
        #[arg(long)]
        chained: bool,

        /// Overwrite existing results instead of skipping completed stages
        #[arg(long)]
        reprocess: bool,
    },
    /// Inspect batch jobs
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Inspect per-record progress and stored results
    Record {
        #[command(subcommand)]
        command: RecordCommands,
    },
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Enrich {
            stages,
            limit,
            records,
            chained,
            reprocess,
        }) => enrich::run_enrich(&stages, limit, &records, chained, reprocess).await,
        Some(Commands::Job { command }) => inspect::run_job(command).await,
        Some(Commands::Record { command }) => inspect::run_record(command).await,
        Some(Commands::Db { command }) => inspect::run_db(command).await,
        None => {
            println!("pulse: no command given; try `pulse --help`");
            Ok(())
        }
    }
}

/// Attempt to mark a batch job as failed, logging any secondary error.
async fn fail_job_best_effort(pool: &sqlx::PgPool, job_id: Uuid, message: &str) {
    tracing::error!(%job_id, message, "enrichment job failed");
    if let Err(mark_err) =
        pulse_db::finish_batch_job(pool, job_id, JobStatus::Failed, 0, 0, &[]).await
    {
        tracing::error!(
            %job_id,
            error = %mark_err,
            "failed to mark batch job as failed"
        );
    }
}
