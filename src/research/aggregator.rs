//! Report synthesis from a finished run
//!
//! The aggregator reads a [`RunState`] whose tasks have all reached a terminal
//! status and produces a [`Report`]. Section order is fixed; a section exists
//! when its stage was planned. Failed tasks never abort aggregation: they mark
//! their section degraded with `"<task id>: <reason>"`.

use crate::research::citation::format_citations;
use crate::research::error::AggregationError;
use crate::research::query::CitationStyle;
use crate::research::report::{Report, Section, SectionContent, SourceEntry};
use crate::research::run::{RunPhase, RunState};
use crate::research::task::{SourceDocument, Stage, Task, TaskKind, TaskOutput, TaskStatus};
use chrono::Utc;

/// Builds [`Report`]s from finished runs.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    /// Style used when citations are formatted here instead of by a cite task
    default_style: CitationStyle,
}

impl ResultAggregator {
    pub fn new(default_style: CitationStyle) -> Self {
        Self { default_style }
    }

    pub fn aggregate(&self, run: &RunState) -> Result<Report, AggregationError> {
        if !matches!(run.phase(), RunPhase::Executing | RunPhase::Aggregating) {
            return Err(AggregationError::WrongPhase(run.phase()));
        }
        for task in run.tasks() {
            check_task(task)?;
        }

        let tasks = run.tasks();
        let planned = |stage: Stage| tasks.iter().any(|t| t.stage() == stage);
        let mut sections = Vec::new();

        // Summary
        if planned(Stage::Summarize) {
            let mut bullets = Vec::new();
            for task in of_stage(tasks, Stage::Summarize) {
                if let Some(TaskOutput::Summary(summary)) = &task.output {
                    bullets.extend(summary.bullets.iter().cloned());
                }
            }
            sections.push(Section::new(
                SectionContent::Summary { bullets },
                failures(tasks, &[Stage::Summarize]),
            ));
        }

        // Fact check
        if planned(Stage::FactCheck) {
            let mut verdicts = Vec::new();
            for task in of_stage(tasks, Stage::FactCheck) {
                if let Some(TaskOutput::FactCheck(v)) = &task.output {
                    verdicts.extend(v.iter().cloned());
                }
            }
            sections.push(Section::new(
                SectionContent::FactCheck { verdicts },
                failures(tasks, &[Stage::FactCheck]),
            ));
        }

        // Translations, sorted by language
        if planned(Stage::Translate) {
            let mut items: Vec<_> = of_stage(tasks, Stage::Translate)
                .filter_map(|task| match &task.output {
                    Some(TaskOutput::Translation(t)) => Some(t.clone()),
                    _ => None,
                })
                .collect();
            items.sort_by(|a, b| a.language.cmp(&b.language));
            sections.push(Section::new(
                SectionContent::Translations { items },
                failures(tasks, &[Stage::Translate]),
            ));
        }

        // Sentiment
        if planned(Stage::Sentiment) {
            let label = of_stage(tasks, Stage::Sentiment).find_map(|task| match &task.output {
                Some(TaskOutput::Sentiment(label)) => Some(*label),
                _ => None,
            });
            sections.push(Section::new(
                SectionContent::Sentiment { label },
                failures(tasks, &[Stage::Sentiment]),
            ));
        }

        let sources: Vec<&SourceDocument> = of_stage(tasks, Stage::Scrape)
            .filter_map(|task| match &task.output {
                Some(TaskOutput::Source(doc)) => Some(doc),
                _ => None,
            })
            .collect();

        // Citations
        if planned(Stage::Scrape) || planned(Stage::Cite) {
            let cite = of_stage(tasks, Stage::Cite).next();
            let (style, entries) = match cite {
                Some(Task {
                    kind: TaskKind::Cite { style },
                    output: Some(TaskOutput::Citations(entries)),
                    ..
                }) => (*style, entries.clone()),
                Some(Task {
                    kind: TaskKind::Cite { style },
                    ..
                }) => (*style, format_citations(sources.iter().copied(), *style)),
                _ => {
                    let style = run
                        .query()
                        .constraints()
                        .citation_style
                        .unwrap_or(self.default_style);
                    (style, format_citations(sources.iter().copied(), style))
                }
            };
            sections.push(Section::new(
                SectionContent::Citations { style, entries },
                failures(tasks, &[Stage::Cite, Stage::Scrape]),
            ));
        }

        // Sources, in plan order
        if planned(Stage::Scrape) {
            let items = sources
                .iter()
                .map(|doc| SourceEntry {
                    url: doc.url.clone(),
                    title: doc.title.clone(),
                    source_type: doc.source_type,
                })
                .collect();
            sections.push(Section::new(
                SectionContent::Sources { items },
                failures(tasks, &[Stage::Scrape]),
            ));
        }

        Ok(Report {
            run_id: run.id(),
            query: run.query().text().to_string(),
            generated_at: Utc::now(),
            sections,
        })
    }
}

fn check_task(task: &Task) -> Result<(), AggregationError> {
    if !task.is_terminal() {
        return Err(AggregationError::TaskNotTerminal(task.id.clone()));
    }
    match (&task.status, &task.output) {
        (TaskStatus::Succeeded, None) => Err(AggregationError::MissingOutput(task.id.clone())),
        (_, Some(output)) if output.variant_name() != task.kind.expected_output() => {
            Err(AggregationError::OutputMismatch {
                task: task.id.clone(),
                expected: task.kind.expected_output(),
                found: output.variant_name(),
            })
        }
        _ => Ok(()),
    }
}

fn of_stage(tasks: &[Task], stage: Stage) -> impl Iterator<Item = &Task> {
    tasks.iter().filter(move |t| t.stage() == stage)
}

/// `"<task id>: <reason>"` for every unsuccessful task of the given stages,
/// in stage then plan order.
fn failures(tasks: &[Task], stages: &[Stage]) -> Vec<String> {
    stages
        .iter()
        .flat_map(|stage| of_stage(tasks, *stage))
        .filter_map(|task| match task.status {
            TaskStatus::Failed => Some(format!(
                "{}: {}",
                task.id,
                task.failure
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "failed".to_string())
            )),
            TaskStatus::Cancelled => Some(format!("{}: cancelled", task.id)),
            _ => None,
        })
        .collect()
}
