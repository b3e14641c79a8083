//! Task dispatch
//!
//! The [`Dispatcher`] drives the tasks of one run to a terminal status:
//!
//! 1. Ready tasks (pending, every dependency succeeded) are started in plan
//!    order, up to `max_concurrency` at a time, each on a [`JoinSet`] worker.
//! 2. Workers get immutable copies of their dependency outputs and call the
//!    matching capability under the [`RetryPolicy`]. They never touch the run
//!    state; results come back through the join set and retry notices through
//!    an mpsc channel.
//! 3. The dispatch loop is the only writer of task status. After every
//!    failure, pending tasks downstream of it are failed without running.
//!
//! On cancellation the join set is shut down, in-flight results are dropped
//! and every unfinished task is marked cancelled.

use crate::capabilities::{split_sentences, CapabilityError, CapabilitySet, Summary, SummaryConstraints};
use crate::research::citation::format_citations;
use crate::research::retry::{Attempted, RetryNotice, RetryPolicy};
use crate::research::store::RunHandle;
use crate::research::task::{
    ClaimVerdict, SourceDocument, TaskFailure, TaskId, TaskKind, TaskOutput, Translation,
};
use crate::utils::toml_config::{SageConfig, TimeoutConfig};
use chrono::Utc;
use futures::future::try_join_all;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a call to [`Dispatcher::drive`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    /// No task can make further progress
    Completed,
    /// The cancellation token fired; unfinished tasks are cancelled
    Cancelled,
}

/// Executes the tasks of a run against a [`CapabilitySet`].
#[derive(Clone)]
pub struct Dispatcher {
    capabilities: CapabilitySet,
    retry: RetryPolicy,
    timeouts: TimeoutConfig,
    max_concurrency: usize,
    max_claims: usize,
}

/// Everything a worker needs, owned.
struct Job {
    id: TaskId,
    kind: TaskKind,
    inputs: Vec<TaskOutput>,
}

impl Dispatcher {
    pub fn new(capabilities: CapabilitySet, config: &SageConfig) -> Self {
        Self {
            capabilities,
            retry: RetryPolicy::from(&config.orchestration.retry),
            timeouts: config.orchestration.timeouts.clone(),
            max_concurrency: config.orchestration.max_concurrency.max(1),
            max_claims: config.capabilities.fact_check.max_claims.max(1),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Run every task of an executing run until none can make progress.
    pub async fn drive(&self, run: &RunHandle, cancel: CancellationToken) -> DriveOutcome {
        let run_id = run.id();
        let (notice_tx, mut notice_rx) = mpsc::unbounded_channel::<(TaskId, RetryNotice)>();
        let mut workers: JoinSet<Attempted<TaskOutput>> = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, TaskId> = HashMap::new();

        loop {
            if cancel.is_cancelled() {
                return self.abort(run, &mut workers).await;
            }

            let capacity = self.max_concurrency.saturating_sub(workers.len());
            for job in self.claim_ready(run, capacity) {
                debug!(run_id = %run_id, task_id = %job.id, kind = %job.kind.stage(), "Task started");
                let id = job.id.clone();
                let handle = workers.spawn(self.clone().execute(job, cancel.clone(), notice_tx.clone()));
                in_flight.insert(handle.id(), id);
            }

            if workers.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    return self.abort(run, &mut workers).await;
                }

                Some((id, notice)) = notice_rx.recv() => {
                    let applied = run.update(|state| {
                        state.record_retry(
                            &id,
                            notice.attempt,
                            notice.delay.as_millis() as u64,
                            notice.error.to_string(),
                        )
                    });
                    if let Err(e) = applied {
                        warn!(run_id = %run_id, task_id = %id, error = %e, "Dropped retry notice");
                    }
                }

                Some(joined) = workers.join_next_with_id() => {
                    let (id, outcome) = match joined {
                        Ok((task_handle, outcome)) => (in_flight.remove(&task_handle), outcome),
                        Err(join_error) => {
                            error!(run_id = %run_id, error = %join_error, "Task worker panicked");
                            (
                                in_flight.remove(&join_error.id()),
                                Attempted::Failed {
                                    error: CapabilityError::Unavailable("task worker panicked".to_string()),
                                    attempts: 1,
                                },
                            )
                        }
                    };
                    if let Some(id) = id {
                        self.apply(run, &id, outcome);
                    }
                }
            }
        }

        // Results of notices still queued are superseded by the final task states.
        DriveOutcome::Completed
    }

    /// Mark ready tasks running and package their inputs.
    fn claim_ready(&self, run: &RunHandle, capacity: usize) -> Vec<Job> {
        if capacity == 0 {
            return Vec::new();
        }

        run.update(|state| {
            let mut jobs = Vec::new();
            for id in state.ready_tasks().into_iter().take(capacity) {
                let inputs = match state.dependency_outputs(&id) {
                    Ok(inputs) => inputs,
                    Err(e) => {
                        error!(task_id = %id, error = %e, "Cannot collect task inputs");
                        continue;
                    }
                };
                let Some(kind) = state.task(&id).map(|t| t.kind.clone()) else {
                    continue;
                };
                if let Err(e) = state.mark_running(&id) {
                    error!(task_id = %id, error = %e, "Cannot start task");
                    continue;
                }
                jobs.push(Job { id, kind, inputs });
            }
            jobs
        })
    }

    /// Record a worker's result. The dispatch loop is the only caller.
    fn apply(&self, run: &RunHandle, id: &TaskId, outcome: Attempted<TaskOutput>) {
        let run_id = run.id();
        let result = run.update(|state| match outcome {
            Attempted::Succeeded { value, attempts } => {
                info!(run_id = %run_id, task_id = %id, attempts, "Task succeeded");
                state.mark_succeeded(id, value, attempts).map(|_| Vec::new())
            }
            Attempted::Failed { error, attempts } => {
                warn!(run_id = %run_id, task_id = %id, attempts, error = %error, "Task failed");
                state
                    .mark_failed(id, TaskFailure::Capability { error }, attempts)
                    .map(|_| state.propagate_failures())
            }
            // Only produced after the token fired; the next loop turn aborts.
            Attempted::Cancelled => Ok(Vec::new()),
        });

        match result {
            Ok(skipped) if !skipped.is_empty() => {
                let skipped: Vec<&str> = skipped.iter().map(TaskId::as_str).collect();
                warn!(run_id = %run_id, task_id = %id, skipped = ?skipped, "Downstream tasks failed without running");
            }
            Ok(_) => {}
            Err(e) => error!(run_id = %run_id, task_id = %id, error = %e, "Cannot record task result"),
        }
    }

    async fn abort(&self, run: &RunHandle, workers: &mut JoinSet<Attempted<TaskOutput>>) -> DriveOutcome {
        workers.shutdown().await;
        let cancelled = run.update(|state| state.cancel_unfinished());
        info!(run_id = %run.id(), cancelled = cancelled.len(), "Run cancelled");
        DriveOutcome::Cancelled
    }

    // ============= Workers =============

    async fn execute(
        self,
        job: Job,
        cancel: CancellationToken,
        notices: mpsc::UnboundedSender<(TaskId, RetryNotice)>,
    ) -> Attempted<TaskOutput> {
        let Job { id, kind, inputs } = job;
        let timeout = self.timeouts.for_stage(kind.stage());
        let on_retry = |notice: RetryNotice| {
            let _ = notices.send((id.clone(), notice));
        };

        match kind {
            TaskKind::Scrape { target } => {
                let caps = &self.capabilities;
                let target = &target;
                self.retry
                    .run(timeout, &cancel, on_retry, move || async move {
                        let document = caps.fetcher.fetch(target).await?;
                        let text = caps.extractor.extract(&document).await?;
                        Ok::<_, CapabilityError>(TaskOutput::Source(SourceDocument {
                            url: document.url,
                            title: document.title,
                            source_type: target.source_type(),
                            text,
                            retrieved_at: Utc::now(),
                        }))
                    })
                    .await
            }

            TaskKind::Summarize { max_bullets } => {
                let summarizer = &self.capabilities.summarizer;
                let text = &source_text(&inputs);
                let constraints = &SummaryConstraints { max_bullets };
                self.retry
                    .run(timeout, &cancel, on_retry, move || async move {
                        summarizer
                            .summarize(text, constraints)
                            .await
                            .map(TaskOutput::Summary)
                    })
                    .await
            }

            TaskKind::FactCheck => {
                let Some(summary) = summary_input(&inputs) else {
                    return missing_input("fact check", "a summary");
                };
                let claims: Vec<String> = summary
                    .bullets
                    .iter()
                    .flat_map(|bullet| split_sentences(bullet))
                    .take(self.max_claims)
                    .collect();
                if claims.is_empty() {
                    return missing_input("fact check", "claims in the summary");
                }

                let checker = &self.capabilities.fact_checker;
                let claims = &claims;
                self.retry
                    .run(timeout, &cancel, on_retry, move || async move {
                        let verdicts = try_join_all(claims.iter().map(|claim| checker.verify(claim))).await?;
                        Ok::<_, CapabilityError>(TaskOutput::FactCheck(
                            claims
                                .iter()
                                .zip(verdicts)
                                .map(|(claim, verdict)| ClaimVerdict {
                                    claim: claim.clone(),
                                    verdict,
                                })
                                .collect(),
                        ))
                    })
                    .await
            }

            TaskKind::Translate { language } => {
                let Some(summary) = summary_input(&inputs) else {
                    return missing_input("translation", "a summary");
                };
                let translator = &self.capabilities.translator;
                let text = &summary.text();
                let language = &language;
                self.retry
                    .run(timeout, &cancel, on_retry, move || async move {
                        let text = translator.translate(text, language).await?;
                        Ok::<_, CapabilityError>(TaskOutput::Translation(Translation {
                            language: language.clone(),
                            text,
                        }))
                    })
                    .await
            }

            TaskKind::Sentiment => {
                let scorer = &self.capabilities.sentiment;
                let text = &source_text(&inputs);
                self.retry
                    .run(timeout, &cancel, on_retry, move || async move {
                        scorer.score(text).await.map(TaskOutput::Sentiment)
                    })
                    .await
            }

            TaskKind::Cite { style } => {
                let sources = inputs.iter().filter_map(|output| match output {
                    TaskOutput::Source(doc) => Some(doc),
                    _ => None,
                });
                Attempted::Succeeded {
                    value: TaskOutput::Citations(format_citations(sources, style)),
                    attempts: 1,
                }
            }
        }
    }
}

/// Extracted text of every source input, in dependency order.
fn source_text(inputs: &[TaskOutput]) -> String {
    inputs
        .iter()
        .filter_map(|output| match output {
            TaskOutput::Source(doc) => Some(doc.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn summary_input(inputs: &[TaskOutput]) -> Option<&Summary> {
    inputs.iter().find_map(|output| match output {
        TaskOutput::Summary(summary) => Some(summary),
        _ => None,
    })
}

fn missing_input(task: &str, what: &str) -> Attempted<TaskOutput> {
    Attempted::Failed {
        error: CapabilityError::InvalidInput(format!("{} needs {}", task, what)),
        attempts: 0,
    }
}
