//! Read-side command handlers: batch jobs, per-record status, stored
//! results, and database maintenance.

use clap::Subcommand;
use uuid::Uuid;

use pulse_core::Stage;

/// Sub-commands available under `job`.
#[derive(Debug, Subcommand)]
pub enum JobCommands {
    /// List recent batch jobs, newest first
    List {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show one job, including its error log
    Status { id: Uuid },
}

/// Sub-commands available under `record`.
#[derive(Debug, Subcommand)]
pub enum RecordCommands {
    /// Show per-stage progress for a record
    Status {
        id: Uuid,

        /// Restrict to a single stage
        #[arg(long)]
        stage: Option<Stage>,
    },
    /// Print a stored analysis result as JSON
    Result {
        id: Uuid,

        #[arg(long)]
        stage: Stage,
    },
}

/// Sub-commands available under `db`.
#[derive(Debug, Subcommand)]
pub enum DbCommands {
    /// Apply pending schema migrations
    Migrate,
    /// Verify database connectivity
    Ping,
}

pub(crate) async fn run_job(command: JobCommands) -> anyhow::Result<()> {
    let pool = pulse_db::connect_pool_from_env().await?;
    match command {
        JobCommands::List { limit } => {
            let jobs = pulse_db::list_batch_jobs(&pool, limit).await?;
            if jobs.is_empty() {
                println!("no batch jobs recorded");
                return Ok(());
            }
            println!(
                "{:<36}  {:<12}  {:<22}  {:>6}  {:>9}  {:>6}",
                "id", "type", "status", "total", "processed", "failed"
            );
            for job in jobs {
                println!(
                    "{:<36}  {:<12}  {:<22}  {:>6}  {:>9}  {:>6}",
                    job.id,
                    job.job_type,
                    job.status,
                    job.total_records,
                    job.processed_records,
                    job.failed_records
                );
            }
        }
        JobCommands::Status { id } => {
            let job = pulse_db::get_batch_job(&pool, id).await?;
            println!("job {}", job.id);
            println!("  type:      {}", job.job_type);
            println!("  status:    {}", job.status);
            println!(
                "  records:   {} total, {} processed, {} failed",
                job.total_records, job.processed_records, job.failed_records
            );
            if let Some(t) = job.started_at {
                println!("  started:   {t}");
            }
            if let Some(t) = job.completed_at {
                println!("  completed: {t}");
            }
            let errors = job.errors()?;
            if !errors.is_empty() {
                println!("  errors:");
                for err in errors {
                    println!("    {} {}: {}", err.record_id, err.stage, err.message);
                }
            }
        }
    }
    Ok(())
}

pub(crate) async fn run_record(command: RecordCommands) -> anyhow::Result<()> {
    let pool = pulse_db::connect_pool_from_env().await?;
    match command {
        RecordCommands::Status { id, stage } => {
            let stages: Vec<Stage> = stage.map_or_else(|| Stage::ALL.to_vec(), |s| vec![s]);
            for stage in stages {
                match pulse_db::get_status(&pool, id, stage).await? {
                    Some(status) => {
                        let detail = status
                            .error_message
                            .map(|m| format!(" ({m})"))
                            .unwrap_or_default();
                        println!(
                            "{:<9}  {:<12}  retries {}{}",
                            stage.as_str(),
                            status.status.as_str(),
                            status.retry_count,
                            detail
                        );
                    }
                    None => println!("{:<9}  not attempted", stage.as_str()),
                }
            }
        }
        RecordCommands::Result { id, stage } => {
            match pulse_db::get_result(&pool, id, stage).await? {
                Some(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                None => anyhow::bail!("no {stage} result stored for record {id}"),
            }
        }
    }
    Ok(())
}

pub(crate) async fn run_db(command: DbCommands) -> anyhow::Result<()> {
    let pool = pulse_db::connect_pool_from_env().await?;
    match command {
        DbCommands::Migrate => {
            let applied = pulse_db::run_migrations(&pool).await?;
            println!("migrations applied: {applied}");
        }
        DbCommands::Ping => {
            pulse_db::ping(&pool).await?;
            println!("database reachable");
        }
    }
    Ok(())
}
