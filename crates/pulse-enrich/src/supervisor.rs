//! Batch supervisor: drives a cohort of records through the configured
//! stages and tracks the job durably.
//!
//! Dispatch is stage-major in declared order. Per stage, eligible records
//! are admitted through the ledger's claim and run on a bounded
//! `buffer_unordered` pool sized by the stage's latency class. Failures go
//! through the retry policy; retries are re-armed and parked on a due-time
//! queue, never executed inline.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use pulse_core::{
    ClaimOutcome, JobConfig, JobError, JobSnapshot, JobStatus, LatencyClass, ResultStore,
    ScrapedRecord, Stage, StageStatus, StatusLedger,
};

use crate::error::EnrichError;
use crate::processor::{ProcessorRegistry, StageError, StageProcessor};
use crate::retry::{RetryDecision, RetryPolicy};

/// Poll interval when a claim is owned by another worker (benign conflict).
const CLAIM_POLL: Duration = Duration::from_millis(250);

const JOB_RUNNING: u8 = 0;
const JOB_COMPLETED: u8 = 1;
const JOB_COMPLETED_WITH_ERRORS: u8 = 2;
const JOB_FAILED: u8 = 3;

fn decode_job_status(raw: u8) -> JobStatus {
    match raw {
        JOB_COMPLETED => JobStatus::Completed,
        JOB_COMPLETED_WITH_ERRORS => JobStatus::CompletedWithErrors,
        JOB_FAILED => JobStatus::Failed,
        _ => JobStatus::Running,
    }
}

/// Live state of one job. The supervisor's driver task is the only writer
/// to the aggregate counters; reads are safe at any time.
struct JobState {
    id: Uuid,
    job_type: String,
    config: JobConfig,
    total: u32,
    status: AtomicU8,
    processed: AtomicU32,
    failed: AtomicU32,
    errors: Mutex<Vec<JobError>>,
    failed_records: Mutex<HashSet<Uuid>>,
    cancelled: AtomicBool,
    started_at: DateTime<Utc>,
    completed_at: Mutex<Option<DateTime<Utc>>>,
}

impl JobState {
    fn new(job_type: &str, total: u32, config: JobConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.to_string(),
            config,
            total,
            status: AtomicU8::new(JOB_RUNNING),
            processed: AtomicU32::new(0),
            failed: AtomicU32::new(0),
            errors: Mutex::new(Vec::new()),
            failed_records: Mutex::new(HashSet::new()),
            cancelled: AtomicBool::new(false),
            started_at: Utc::now(),
            completed_at: Mutex::new(None),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Record a terminal stage failure for `record_id`. The error log is
    /// append-only; the failed-record counter increments once per record.
    fn record_failure(&self, record_id: Uuid, stage: Stage, message: String) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(JobError {
                record_id,
                stage,
                message,
            });
        let mut failed = self
            .failed_records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if failed.insert(record_id) {
            self.failed.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn is_failed_record(&self, record_id: Uuid) -> bool {
        self.failed_records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&record_id)
    }

    fn finalize(&self, status: JobStatus) {
        let raw = match status {
            JobStatus::Completed => JOB_COMPLETED,
            JobStatus::CompletedWithErrors => JOB_COMPLETED_WITH_ERRORS,
            _ => JOB_FAILED,
        };
        self.status.store(raw, Ordering::Release);
        *self
            .completed_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
    }

    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            job_type: self.job_type.clone(),
            status: decode_job_status(self.status.load(Ordering::Acquire)),
            total_records: self.total,
            processed_records: self.processed.load(Ordering::Acquire),
            failed_records: self.failed.load(Ordering::Acquire),
            errors: self
                .errors
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            config: self.config.clone(),
            started_at: Some(self.started_at),
            completed_at: *self
                .completed_at
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}

pub struct BatchSupervisor {
    ledger: Arc<dyn StatusLedger>,
    results: Arc<dyn ResultStore>,
    registry: ProcessorRegistry,
    jobs: RwLock<HashMap<Uuid, Arc<JobState>>>,
    handles: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl BatchSupervisor {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn StatusLedger>,
        results: Arc<dyn ResultStore>,
        registry: ProcessorRegistry,
    ) -> Self {
        Self {
            ledger,
            results,
            registry,
            jobs: RwLock::new(HashMap::new()),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Submit a cohort for enrichment. Validates the job up front and fails
    /// fast before any record is touched; on success the job runs on a
    /// spawned driver task and the job id is returned immediately.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::JobConfig`] for an invalid config, an empty
    /// cohort, or duplicate record ids, and [`EnrichError::UnknownStage`]
    /// when a requested stage has no registered processor.
    pub fn submit(
        self: &Arc<Self>,
        job_type: &str,
        cohort: Vec<ScrapedRecord>,
        config: JobConfig,
    ) -> Result<Uuid, EnrichError> {
        config
            .validate()
            .map_err(|e| EnrichError::JobConfig(e.to_string()))?;
        if cohort.is_empty() {
            return Err(EnrichError::JobConfig("cohort is empty".to_string()));
        }
        let mut ids: HashSet<Uuid> = HashSet::new();
        for record in &cohort {
            if !ids.insert(record.id) {
                return Err(EnrichError::JobConfig(format!(
                    "duplicate record in cohort: {}",
                    record.id
                )));
            }
        }
        for stage in &config.stages {
            if self.registry.get(*stage).is_none() {
                return Err(EnrichError::UnknownStage(*stage));
            }
        }

        let total = u32::try_from(cohort.len())
            .map_err(|_| EnrichError::JobConfig("cohort too large".to_string()))?;
        let state = Arc::new(JobState::new(job_type, total, config));
        let job_id = state.id;

        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id, Arc::clone(&state));

        tracing::info!(
            job_id = %job_id,
            job_type,
            records = cohort.len(),
            stages = ?state.config.stages,
            "batch job submitted"
        );

        let supervisor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            supervisor.run_job(&state, &cohort).await;
        });
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id, handle);

        Ok(job_id)
    }

    /// Consistent snapshot of a job, safe to call concurrently with the
    /// run.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::JobNotFound`] for an unknown job id.
    pub fn status(&self, job_id: Uuid) -> Result<JobSnapshot, EnrichError> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .map(|state| state.snapshot())
            .ok_or(EnrichError::JobNotFound(job_id))
    }

    /// Wait for a job's driver task to finish and return the terminal
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::JobNotFound`] for an unknown job id.
    pub async fn wait(&self, job_id: Uuid) -> Result<JobSnapshot, EnrichError> {
        let handle = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id);
        if let Some(handle) = handle {
            // A panicked driver still leaves a readable (non-terminal) snapshot.
            handle.await.ok();
        }
        self.status(job_id)
    }

    /// Cancel a running job: no new (record, stage) work is dispatched, but
    /// in-flight stage calls run to completion and their results persist.
    /// The job finalizes as terminal `failed`.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::JobNotFound`] for an unknown job id.
    pub fn cancel(&self, job_id: Uuid) -> Result<(), EnrichError> {
        let state = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .cloned()
            .ok_or(EnrichError::JobNotFound(job_id))?;
        state.cancelled.store(true, Ordering::Release);
        tracing::warn!(job_id = %job_id, "batch job cancelled");
        Ok(())
    }

    async fn run_job(&self, state: &Arc<JobState>, cohort: &[ScrapedRecord]) {
        let policy = RetryPolicy {
            max_retries: state.config.max_retries,
            backoff_base_ms: state.config.backoff_base_ms,
            max_backoff_ms: state.config.max_backoff_ms,
        };

        for (position, stage) in state.config.stages.iter().copied().enumerate() {
            if state.is_cancelled() {
                break;
            }
            let Some(processor) = self.registry.get(stage) else {
                // Unreachable after submit-time validation.
                continue;
            };
            let gate = if state.config.chained && position > 0 {
                Some(state.config.stages[position - 1])
            } else {
                None
            };
            self.run_stage(state, cohort, stage, gate, &processor, &policy)
                .await;
        }

        if state.is_cancelled() {
            state.finalize(JobStatus::Failed);
        } else {
            for record in cohort {
                if !state.is_failed_record(record.id) {
                    state.processed.fetch_add(1, Ordering::AcqRel);
                }
            }
            let failed = state.failed.load(Ordering::Acquire);
            state.finalize(if failed == 0 {
                JobStatus::Completed
            } else {
                JobStatus::CompletedWithErrors
            });
        }

        let snapshot = state.snapshot();
        tracing::info!(
            job_id = %state.id,
            status = %snapshot.status,
            processed = snapshot.processed_records,
            failed = snapshot.failed_records,
            "batch job finished"
        );
    }

    /// Drive one stage across the cohort until every in-scope pair is
    /// terminal (or the job is cancelled).
    async fn run_stage(
        &self,
        state: &Arc<JobState>,
        cohort: &[ScrapedRecord],
        stage: Stage,
        gate: Option<Stage>,
        processor: &Arc<dyn StageProcessor>,
        policy: &RetryPolicy,
    ) {
        let width = pool_width(&state.config, processor.latency_class());

        // (cohort index, earliest dispatch time)
        let mut queue: Vec<(usize, Instant)> = Vec::with_capacity(cohort.len());
        for (idx, record) in cohort.iter().enumerate() {
            if let Some(gate_stage) = gate {
                if !self.gate_open(state, record.id, gate_stage).await {
                    continue;
                }
            }
            queue.push((idx, Instant::now()));
        }

        while !queue.is_empty() && !state.is_cancelled() {
            let now = Instant::now();
            let earliest = queue.iter().map(|(_, due)| *due).min().unwrap_or(now);
            if earliest > now {
                tokio::time::sleep_until(earliest).await;
                continue;
            }

            let (ready, waiting): (Vec<_>, Vec<_>) =
                queue.into_iter().partition(|(_, due)| *due <= now);
            queue = waiting;

            let mut claimed: Vec<usize> = Vec::with_capacity(ready.len());
            for (idx, _) in ready {
                let record_id = cohort[idx].id;
                match self.claim(state, record_id, stage, policy).await {
                    Admission::Run => claimed.push(idx),
                    Admission::Terminal => {}
                    Admission::PollLater => queue.push((idx, now + CLAIM_POLL)),
                    Admission::RetryNow => queue.push((idx, now)),
                }
            }

            let outcomes: Vec<(usize, UnitOutcome)> = stream::iter(claimed)
                .map(|idx| {
                    let record = &cohort[idx];
                    async move {
                        (idx, self.process_unit(state, record, stage, processor, policy).await)
                    }
                })
                .buffer_unordered(width)
                .collect()
                .await;

            for (idx, outcome) in outcomes {
                match outcome {
                    UnitOutcome::Terminal => {}
                    UnitOutcome::RetryAfter(delay) => {
                        queue.push((idx, Instant::now() + delay));
                    }
                }
            }
        }
    }

    /// Whether the gating stage completed for this record. A record whose
    /// gate stage is not `completed` is skipped for this stage.
    async fn gate_open(&self, state: &Arc<JobState>, record_id: Uuid, gate: Stage) -> bool {
        match self.ledger.status_of(record_id, gate).await {
            Ok(Some(status)) => status.status == StageStatus::Completed,
            Ok(None) => false,
            Err(e) => {
                tracing::error!(job_id = %state.id, record_id = %record_id, error = %e, "gate check failed");
                false
            }
        }
    }

    /// Admit one (record, stage) pair through the ledger claim.
    async fn claim(
        &self,
        state: &Arc<JobState>,
        record_id: Uuid,
        stage: Stage,
        policy: &RetryPolicy,
    ) -> Admission {
        match self.ledger.try_claim(record_id, stage).await {
            Ok(ClaimOutcome::Claimed) => Admission::Run,
            Ok(ClaimOutcome::AlreadyCompleted) => Admission::Terminal,
            Ok(ClaimOutcome::AlreadyInProgress) => {
                // Either another worker owns the pair, or it is parked in
                // `failed` from an earlier run and needs a re-arm.
                match self.ledger.status_of(record_id, stage).await {
                    Ok(Some(status)) if status.status == StageStatus::Failed => {
                        if status.retry_count < policy.max_retries {
                            match self.ledger.rearm(record_id, stage).await {
                                Ok(true) => Admission::RetryNow,
                                Ok(false) => Admission::PollLater,
                                Err(e) => {
                                    state.record_failure(record_id, stage, e.to_string());
                                    Admission::Terminal
                                }
                            }
                        } else {
                            let message = status
                                .error_message
                                .unwrap_or_else(|| "retry budget exhausted".to_string());
                            state.record_failure(record_id, stage, message);
                            Admission::Terminal
                        }
                    }
                    Ok(_) => Admission::PollLater,
                    Err(e) => {
                        state.record_failure(record_id, stage, e.to_string());
                        Admission::Terminal
                    }
                }
            }
            Err(e) => {
                state.record_failure(record_id, stage, e.to_string());
                Admission::Terminal
            }
        }
    }

    /// Execute one claimed (record, stage) pair: run the processor under
    /// the per-call timeout, persist on success, route failures through the
    /// retry policy.
    async fn process_unit(
        &self,
        state: &Arc<JobState>,
        record: &ScrapedRecord,
        stage: Stage,
        processor: &Arc<dyn StageProcessor>,
        policy: &RetryPolicy,
    ) -> UnitOutcome {
        let timeout = Duration::from_secs(state.config.stage_timeout_secs);
        let call = tokio::time::timeout(timeout, processor.process(record)).await;

        let stage_result = match call {
            Ok(result) => result,
            Err(_) => Err(StageError::Transient(format!(
                "stage call timed out after {}s",
                state.config.stage_timeout_secs
            ))),
        };

        match stage_result {
            Ok(result) => {
                if let Err(e) = self
                    .results
                    .save(record.id, stage, &result, state.config.reprocess)
                    .await
                {
                    return self
                        .handle_failure(state, record.id, stage, &e.to_string(), policy)
                        .await;
                }
                if let Err(e) = self.ledger.mark_completed(record.id, stage).await {
                    tracing::error!(
                        job_id = %state.id,
                        record_id = %record.id,
                        stage = %stage,
                        error = %e,
                        "failed to mark stage completed"
                    );
                    state.record_failure(record.id, stage, e.to_string());
                }
                UnitOutcome::Terminal
            }
            Err(err) => {
                let message = err.to_string();
                let class = err.class();
                if let Err(e) = self.ledger.mark_failed(record.id, stage, &message).await {
                    state.record_failure(record.id, stage, e.to_string());
                    return UnitOutcome::Terminal;
                }
                let retry_count = self.retry_count(record.id, stage).await;
                match policy.decide(retry_count, class) {
                    RetryDecision::Retry { delay } => {
                        match self.ledger.rearm(record.id, stage).await {
                            Ok(true) => {
                                tracing::debug!(
                                    job_id = %state.id,
                                    record_id = %record.id,
                                    stage = %stage,
                                    retry = retry_count + 1,
                                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                                    error = %message,
                                    "transient stage failure, re-armed for retry"
                                );
                                UnitOutcome::RetryAfter(delay)
                            }
                            Ok(false) | Err(_) => {
                                state.record_failure(record.id, stage, message);
                                UnitOutcome::Terminal
                            }
                        }
                    }
                    RetryDecision::Abandon => {
                        tracing::warn!(
                            job_id = %state.id,
                            record_id = %record.id,
                            stage = %stage,
                            retry_count,
                            error = %message,
                            "stage failed terminally"
                        );
                        state.record_failure(record.id, stage, message);
                        UnitOutcome::Terminal
                    }
                }
            }
        }
    }

    async fn handle_failure(
        &self,
        state: &Arc<JobState>,
        record_id: Uuid,
        stage: Stage,
        message: &str,
        policy: &RetryPolicy,
    ) -> UnitOutcome {
        if self
            .ledger
            .mark_failed(record_id, stage, message)
            .await
            .is_err()
        {
            state.record_failure(record_id, stage, message.to_string());
            return UnitOutcome::Terminal;
        }
        let retry_count = self.retry_count(record_id, stage).await;
        match policy.decide(retry_count, crate::processor::ErrorClass::Transient) {
            RetryDecision::Retry { delay } => match self.ledger.rearm(record_id, stage).await {
                Ok(true) => UnitOutcome::RetryAfter(delay),
                Ok(false) | Err(_) => {
                    state.record_failure(record_id, stage, message.to_string());
                    UnitOutcome::Terminal
                }
            },
            RetryDecision::Abandon => {
                state.record_failure(record_id, stage, message.to_string());
                UnitOutcome::Terminal
            }
        }
    }

    async fn retry_count(&self, record_id: Uuid, stage: Stage) -> u32 {
        match self.ledger.status_of(record_id, stage).await {
            Ok(Some(status)) => status.retry_count,
            _ => 0,
        }
    }
}

fn pool_width(config: &JobConfig, class: LatencyClass) -> usize {
    match class {
        LatencyClass::Fast => config.fast_workers.max(1),
        LatencyClass::Slow => config.slow_workers.max(1),
    }
}

enum Admission {
    /// Claim won; run the processor.
    Run,
    /// Pair is terminal for this job (completed, or failure recorded).
    Terminal,
    /// Owned elsewhere; check again shortly.
    PollLater,
    /// Re-armed from a prior failure; claimable immediately.
    RetryNow,
}

enum UnitOutcome {
    Terminal,
    RetryAfter(Duration),
}
