//! Run state: the complete mutable record of one research request.
//!
//! Every mutation goes through a method on [`RunState`] that checks the
//! phase machine or the task lifecycle first, so illegal transitions are
//! reported as [`OrchestrationError`]s instead of silently applied.

use crate::research::error::{OrchestrationError, OrchestrationResult};
use crate::research::planner::TaskGraph;
use crate::research::query::Query;
use crate::research::report::Report;
use crate::research::task::{
    Task, TaskFailure, TaskId, TaskOutput, TaskStatus, TaskSummary,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

pub type RunId = Uuid;

/// Lifecycle phase of a research run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Accepted,
    Planning,
    Executing,
    Aggregating,
    Done,
    Rejected,
    Failed,
    Cancelled,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Accepted => "accepted",
            RunPhase::Planning => "planning",
            RunPhase::Executing => "executing",
            RunPhase::Aggregating => "aggregating",
            RunPhase::Done => "done",
            RunPhase::Rejected => "rejected",
            RunPhase::Failed => "failed",
            RunPhase::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunPhase::Done | RunPhase::Rejected | RunPhase::Failed | RunPhase::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        use RunPhase::*;
        match (*self, next) {
            (Accepted, Planning)
            | (Planning, Executing)
            | (Executing, Aggregating)
            | (Aggregating, Done)
            | (Accepted | Planning, Rejected) => true,
            (from, Failed | Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============= Events =============

/// One entry of a run's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: RunEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEventKind {
    PhaseChanged { from: RunPhase, to: RunPhase },
    TaskStarted { task: TaskId },
    TaskRetrying {
        task: TaskId,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    TaskSucceeded { task: TaskId, attempts: u32 },
    TaskFailed { task: TaskId, reason: String },
    TaskCancelled { task: TaskId },
}

// ============= Summaries =============

/// Number of tasks in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TaskCounts {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Snapshot of a run returned by status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RunSummary {
    #[schema(value_type = String, format = Uuid)]
    pub run_id: RunId,
    pub query: String,
    pub phase: RunPhase,
    pub counts: TaskCounts,
    pub tasks: Vec<TaskSummary>,
    /// Why the run was rejected or failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub report_ready: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

// ============= Run State =============

#[derive(Debug, Clone)]
pub struct RunState {
    id: RunId,
    query: Query,
    phase: RunPhase,
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
    events: Vec<RunEvent>,
    report: Option<Arc<Report>>,
    reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn new(id: RunId, query: Query) -> Self {
        let now = Utc::now();
        Self {
            id,
            query,
            phase: RunPhase::Accepted,
            tasks: Vec::new(),
            index: HashMap::new(),
            events: Vec::new(),
            report: None,
            reason: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Tasks in plan (topological) order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    pub fn report(&self) -> Option<Arc<Report>> {
        self.report.clone()
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    fn push_event(&mut self, kind: RunEventKind) {
        let now = Utc::now();
        self.updated_at = now;
        self.events.push(RunEvent { at: now, kind });
    }

    /// Move the run to `next`, rejecting transitions the phase machine forbids.
    pub fn advance(&mut self, next: RunPhase) -> OrchestrationResult<()> {
        if !self.phase.can_transition_to(next) {
            return Err(OrchestrationError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }

        let from = self.phase;
        self.phase = next;
        self.push_event(RunEventKind::PhaseChanged { from, to: next });
        if next.is_terminal() {
            self.finished_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Reject the run during intake or planning.
    pub fn reject(&mut self, reason: impl Into<String>) -> OrchestrationResult<()> {
        self.advance(RunPhase::Rejected)?;
        self.reason = Some(reason.into());
        Ok(())
    }

    /// Fail the run on an aggregation or internal error. Tasks that have not
    /// finished are cancelled first.
    pub fn fail(&mut self, reason: impl Into<String>) -> OrchestrationResult<()> {
        if self.phase.is_terminal() {
            return Err(OrchestrationError::InvalidTransition {
                from: self.phase,
                to: RunPhase::Failed,
            });
        }
        self.cancel_unfinished();
        self.advance(RunPhase::Failed)?;
        self.reason = Some(reason.into());
        Ok(())
    }

    /// Install the planned tasks. Only allowed while planning.
    pub fn install_plan(&mut self, graph: TaskGraph) -> OrchestrationResult<()> {
        if self.phase != RunPhase::Planning {
            return Err(OrchestrationError::InvalidTransition {
                from: self.phase,
                to: RunPhase::Executing,
            });
        }
        self.tasks = graph.into_tasks();
        self.index = self
            .tasks
            .iter()
            .enumerate()
            .map(|(i, task)| (task.id.clone(), i))
            .collect();
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Attach the final report and finish the run.
    pub fn complete(&mut self, report: Report) -> OrchestrationResult<()> {
        self.advance(RunPhase::Done)?;
        self.report = Some(Arc::new(report));
        Ok(())
    }

    fn position(&self, id: &TaskId) -> OrchestrationResult<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| OrchestrationError::UnknownTask(id.clone()))
    }

    fn transition_error(task: &Task, to: TaskStatus) -> OrchestrationError {
        OrchestrationError::InvalidTaskTransition {
            task: task.id.clone(),
            from: task.status.as_str(),
            to: to.as_str(),
        }
    }

    /// Pending tasks whose dependencies have all succeeded, in plan order.
    pub fn ready_tasks(&self) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Pending)
            .filter(|task| {
                task.depends_on.iter().all(|dep| {
                    self.task(dep)
                        .map(|d| d.status == TaskStatus::Succeeded)
                        .unwrap_or(false)
                })
            })
            .map(|task| task.id.clone())
            .collect()
    }

    /// Start a task. Fails unless it is pending and every dependency succeeded.
    pub fn mark_running(&mut self, id: &TaskId) -> OrchestrationResult<()> {
        let pos = self.position(id)?;
        let task = &self.tasks[pos];
        if task.status != TaskStatus::Pending {
            return Err(Self::transition_error(task, TaskStatus::Running));
        }
        for dep in &task.depends_on {
            let satisfied = self
                .task(dep)
                .map(|d| d.status == TaskStatus::Succeeded)
                .unwrap_or(false);
            if !satisfied {
                return Err(OrchestrationError::DependencyNotSatisfied {
                    task: id.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        let task = &mut self.tasks[pos];
        task.status = TaskStatus::Running;
        task.started_at = Some(Utc::now());
        self.push_event(RunEventKind::TaskStarted { task: id.clone() });
        Ok(())
    }

    /// Record a retry scheduled by a worker.
    pub fn record_retry(
        &mut self,
        id: &TaskId,
        attempt: u32,
        delay_ms: u64,
        error: String,
    ) -> OrchestrationResult<()> {
        let pos = self.position(id)?;
        let task = &mut self.tasks[pos];
        if task.status != TaskStatus::Running {
            return Err(Self::transition_error(task, TaskStatus::Running));
        }
        task.attempts = attempt;
        self.push_event(RunEventKind::TaskRetrying {
            task: id.clone(),
            attempt,
            delay_ms,
            error,
        });
        Ok(())
    }

    pub fn mark_succeeded(
        &mut self,
        id: &TaskId,
        output: TaskOutput,
        attempts: u32,
    ) -> OrchestrationResult<()> {
        let pos = self.position(id)?;
        let task = &mut self.tasks[pos];
        if task.status != TaskStatus::Running {
            return Err(Self::transition_error(task, TaskStatus::Succeeded));
        }
        task.status = TaskStatus::Succeeded;
        task.attempts = attempts;
        task.output = Some(output);
        task.finished_at = Some(Utc::now());
        self.push_event(RunEventKind::TaskSucceeded {
            task: id.clone(),
            attempts,
        });
        Ok(())
    }

    /// Fail a running task, or a pending one that can never run.
    pub fn mark_failed(
        &mut self,
        id: &TaskId,
        failure: TaskFailure,
        attempts: u32,
    ) -> OrchestrationResult<()> {
        let pos = self.position(id)?;
        let task = &mut self.tasks[pos];
        if task.is_terminal() {
            return Err(Self::transition_error(task, TaskStatus::Failed));
        }
        let reason = failure.to_string();
        task.status = TaskStatus::Failed;
        task.attempts = attempts;
        task.failure = Some(failure);
        task.finished_at = Some(Utc::now());
        self.push_event(RunEventKind::TaskFailed {
            task: id.clone(),
            reason,
        });
        Ok(())
    }

    /// Fail every pending task that has a failed or cancelled dependency.
    ///
    /// Returns the ids of the tasks that were failed.
    pub fn propagate_failures(&mut self) -> Vec<TaskId> {
        let mut failed = Vec::new();
        loop {
            let next = self.tasks.iter().find_map(|task| {
                if task.status != TaskStatus::Pending {
                    return None;
                }
                task.depends_on
                    .iter()
                    .find(|dep| {
                        self.task(dep)
                            .map(|d| {
                                matches!(d.status, TaskStatus::Failed | TaskStatus::Cancelled)
                            })
                            .unwrap_or(true)
                    })
                    .map(|dep| (task.id.clone(), dep.clone()))
            });

            let Some((id, dependency)) = next else {
                break;
            };
            if self
                .mark_failed(&id, TaskFailure::UpstreamFailed { dependency }, 0)
                .is_ok()
            {
                failed.push(id);
            }
        }
        failed
    }

    /// Cancel every task that has not finished. Returns the cancelled ids.
    pub fn cancel_unfinished(&mut self) -> Vec<TaskId> {
        let now = Utc::now();
        let ids: Vec<TaskId> = self
            .tasks
            .iter_mut()
            .filter(|task| !task.is_terminal())
            .map(|task| {
                task.status = TaskStatus::Cancelled;
                task.finished_at = Some(now);
                task.id.clone()
            })
            .collect();
        for id in &ids {
            self.push_event(RunEventKind::TaskCancelled { task: id.clone() });
        }
        ids
    }

    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks.iter().all(Task::is_terminal)
    }

    /// Copies of the outputs of a task's dependencies, in dependency order.
    pub fn dependency_outputs(&self, id: &TaskId) -> OrchestrationResult<Vec<TaskOutput>> {
        let pos = self.position(id)?;
        Ok(self.tasks[pos]
            .depends_on
            .iter()
            .filter_map(|dep| self.task(dep).and_then(|d| d.output.clone()))
            .collect())
    }

    pub fn counts(&self) -> TaskCounts {
        let mut counts = TaskCounts {
            total: self.tasks.len(),
            ..TaskCounts::default()
        };
        for task in &self.tasks {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Succeeded => counts.succeeded += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.id,
            query: self.query.text().to_string(),
            phase: self.phase,
            counts: self.counts(),
            tasks: self.tasks.iter().map(TaskSummary::from).collect(),
            reason: self.reason.clone(),
            report_ready: self.report.is_some(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            finished_at: self.finished_at,
        }
    }
}
