//! Enrichment batch command handler.
//!
//! Loads the cohort, builds the processor registry from config, runs the
//! batch through the supervisor against the Postgres ledger, and mirrors the
//! job lifecycle into `batch_jobs` so completed runs survive the process.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use pulse_core::{AppConfig, JobConfig, Stage};
use pulse_db::{PgLedger, PgResultStore, PoolConfig};
use pulse_enrich::{
    processors::{
        InferenceClient, LexiconSentimentProcessor, RemoteEntityProcessor, RemoteKeywordProcessor,
        RemoteLocationProcessor,
    },
    BatchSupervisor, ProcessorRegistry,
};

use crate::fail_job_best_effort;

pub(crate) async fn run_enrich(
    stages_arg: &str,
    limit: i64,
    records: &[Uuid],
    chained: bool,
    reprocess: bool,
) -> anyhow::Result<()> {
    let config = pulse_core::load_app_config()?;
    let pool = pulse_db::connect_pool(
        &config.database_url,
        PoolConfig {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        },
    )
    .await?;

    let stages = parse_stages(stages_arg)?;
    let registry = build_registry(&config, &stages)?;

    let cohort = if records.is_empty() {
        pulse_db::list_enrichment_cohort(&pool, stages[0], limit).await?
    } else {
        pulse_db::list_records_by_ids(&pool, records).await?
    };
    if cohort.is_empty() {
        println!("no records eligible for enrichment; nothing to do");
        return Ok(());
    }

    let job_config = JobConfig {
        stages,
        max_retries: config.max_retries,
        backoff_base_ms: config.backoff_base_ms,
        stage_timeout_secs: config.stage_timeout_secs,
        fast_workers: config.fast_workers,
        slow_workers: config.slow_workers,
        chained,
        reprocess,
        ..JobConfig::default()
    };

    let ledger = Arc::new(PgLedger::new(pool.clone()));
    let results = Arc::new(PgResultStore::new(pool.clone()));
    let supervisor = Arc::new(BatchSupervisor::new(ledger, results, registry));

    let total = i32::try_from(cohort.len()).unwrap_or(i32::MAX);
    let job_id = supervisor.submit("enrichment", cohort, job_config.clone())?;
    tracing::info!(%job_id, total, "enrichment job submitted");

    pulse_db::create_batch_job(&pool, job_id, "enrichment", total, &job_config).await?;
    if let Err(e) = pulse_db::start_batch_job(&pool, job_id).await {
        fail_job_best_effort(&pool, job_id, &format!("{e:#}")).await;
        return Err(e.into());
    }

    let snapshot = match supervisor.wait(job_id).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            fail_job_best_effort(&pool, job_id, &format!("{e:#}")).await;
            return Err(e.into());
        }
    };

    pulse_db::finish_batch_job(
        &pool,
        job_id,
        snapshot.status,
        i32::try_from(snapshot.processed_records).unwrap_or(i32::MAX),
        i32::try_from(snapshot.failed_records).unwrap_or(i32::MAX),
        &snapshot.errors,
    )
    .await?;

    println!(
        "job {job_id} {}: {}/{} records processed, {} failed",
        snapshot.status.as_str(),
        snapshot.processed_records,
        snapshot.total_records,
        snapshot.failed_records
    );
    for err in &snapshot.errors {
        println!("  {} {}: {}", err.record_id, err.stage, err.message);
    }

    Ok(())
}

/// Parse a comma-separated stage list, preserving the given order.
fn parse_stages(arg: &str) -> anyhow::Result<Vec<Stage>> {
    let mut stages = Vec::new();
    for part in arg.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        stages.push(part.parse::<Stage>()?);
    }
    if stages.is_empty() {
        anyhow::bail!("no stages given");
    }
    Ok(stages)
}

/// Build the processor registry for the requested stages.
///
/// The sentiment stage runs in-process on the lexicon scorer. All other
/// stages call the external inference service, so requesting one of them
/// without `PULSE_INFERENCE_URL` set is an error.
fn build_registry(config: &AppConfig, stages: &[Stage]) -> anyhow::Result<ProcessorRegistry> {
    let mut registry = ProcessorRegistry::new();

    if stages.contains(&Stage::Sentiment) {
        registry.register(Arc::new(LexiconSentimentProcessor));
    }

    let remote: Vec<Stage> = stages
        .iter()
        .copied()
        .filter(|s| *s != Stage::Sentiment)
        .collect();
    if !remote.is_empty() {
        let url = config.inference_url.as_deref().ok_or_else(|| {
            let names: Vec<&str> = remote.iter().map(|s| s.as_str()).collect();
            anyhow::anyhow!(
                "PULSE_INFERENCE_URL must be set for remote stages: {}",
                names.join(", ")
            )
        })?;
        let client = Arc::new(InferenceClient::new(
            url,
            Duration::from_secs(config.inference_timeout_secs),
        )?);
        for stage in remote {
            match stage {
                Stage::Location => {
                    registry.register(Arc::new(RemoteLocationProcessor::new(Arc::clone(&client))));
                }
                Stage::Entity => {
                    registry.register(Arc::new(RemoteEntityProcessor::new(Arc::clone(&client))));
                }
                Stage::Keyword => {
                    registry.register(Arc::new(RemoteKeywordProcessor::new(Arc::clone(&client))));
                }
                Stage::Sentiment => {}
            }
        }
    }

    Ok(registry)
}
