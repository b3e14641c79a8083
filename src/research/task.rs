//! Tasks: the unit of orchestrated work inside a research run.

use crate::capabilities::{CapabilityError, FetchTarget, SentimentLabel, Summary, Verdict};
use crate::research::query::{CitationStyle, SourceType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Deterministic task identifier such as `scrape-2` or `translate-fr`.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Pipeline stage a task belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Scrape,
    Summarize,
    FactCheck,
    Translate,
    Sentiment,
    Cite,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Scrape,
        Stage::Summarize,
        Stage::FactCheck,
        Stage::Translate,
        Stage::Sentiment,
        Stage::Cite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Scrape => "scrape",
            Stage::Summarize => "summarize",
            Stage::FactCheck => "fact_check",
            Stage::Translate => "translate",
            Stage::Sentiment => "sentiment",
            Stage::Cite => "cite",
        }
    }

    /// Stages this stage depends on when the pipeline does not say otherwise.
    pub fn default_dependencies(&self) -> &'static [Stage] {
        match self {
            Stage::Scrape => &[],
            Stage::Summarize => &[Stage::Scrape],
            Stage::FactCheck => &[Stage::Summarize],
            Stage::Translate => &[Stage::Summarize],
            Stage::Sentiment => &[Stage::Scrape],
            Stage::Cite => &[Stage::Scrape],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s.trim())
            .ok_or_else(|| s.to_string())
    }
}

/// What a task does, together with the inputs fixed at planning time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    Scrape { target: FetchTarget },
    Summarize { max_bullets: usize },
    FactCheck,
    Translate { language: String },
    Sentiment,
    Cite { style: CitationStyle },
}

impl TaskKind {
    pub fn stage(&self) -> Stage {
        match self {
            TaskKind::Scrape { .. } => Stage::Scrape,
            TaskKind::Summarize { .. } => Stage::Summarize,
            TaskKind::FactCheck => Stage::FactCheck,
            TaskKind::Translate { .. } => Stage::Translate,
            TaskKind::Sentiment => Stage::Sentiment,
            TaskKind::Cite { .. } => Stage::Cite,
        }
    }

    /// Name of the [`TaskOutput`] variant this kind must produce.
    pub fn expected_output(&self) -> &'static str {
        match self {
            TaskKind::Scrape { .. } => "source",
            TaskKind::Summarize { .. } => "summary",
            TaskKind::FactCheck => "fact_check",
            TaskKind::Translate { .. } => "translation",
            TaskKind::Sentiment => "sentiment",
            TaskKind::Cite { .. } => "citations",
        }
    }
}

/// Lifecycle status of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============= Task Outputs =============

/// Text retrieved and extracted by a scrape task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SourceDocument {
    pub url: String,
    pub title: Option<String>,
    pub source_type: SourceType,
    pub text: String,
    pub retrieved_at: DateTime<Utc>,
}

/// Verdict for one claim taken from the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClaimVerdict {
    pub claim: String,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Translation {
    pub language: String,
    pub text: String,
}

/// Result produced by a succeeded task. One variant per [`TaskKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TaskOutput {
    Source(SourceDocument),
    Summary(Summary),
    FactCheck(Vec<ClaimVerdict>),
    Translation(Translation),
    Sentiment(SentimentLabel),
    Citations(Vec<String>),
}

impl TaskOutput {
    pub fn variant_name(&self) -> &'static str {
        match self {
            TaskOutput::Source(_) => "source",
            TaskOutput::Summary(_) => "summary",
            TaskOutput::FactCheck(_) => "fact_check",
            TaskOutput::Translation(_) => "translation",
            TaskOutput::Sentiment(_) => "sentiment",
            TaskOutput::Citations(_) => "citations",
        }
    }
}

/// Why a task ended in [`TaskStatus::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TaskFailure {
    /// The capability call failed on the last attempt (or was not retryable)
    Capability { error: CapabilityError },
    /// A dependency failed, so this task never ran
    UpstreamFailed { dependency: TaskId },
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Capability { error } => write!(f, "{}", error),
            TaskFailure::UpstreamFailed { dependency } => {
                write!(f, "upstream task '{}' failed", dependency)
            }
        }
    }
}

// ============= Task =============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub depends_on: Vec<TaskId>,
    pub status: TaskStatus,
    pub attempts: u32,
    pub output: Option<TaskOutput>,
    pub failure: Option<TaskFailure>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, kind: TaskKind, depends_on: Vec<TaskId>) -> Self {
        Self {
            id: id.into(),
            kind,
            depends_on,
            status: TaskStatus::Pending,
            attempts: 0,
            output: None,
            failure: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.kind.stage()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Per-task view returned by status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TaskSummary {
    pub id: TaskId,
    pub stage: Stage,
    pub status: TaskStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            stage: task.stage(),
            status: task.status,
            attempts: task.attempts,
            error: task.failure.as_ref().map(|f| f.to_string()),
        }
    }
}
