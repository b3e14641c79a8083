//! Task Graph Builder
//!
//! Turns a [`Query`] and the `[pipeline]` configuration into a validated,
//! acyclic [`TaskGraph`]. Planning is pure: the same query and the same
//! configuration always produce the same tasks, ids, order and edges.

use crate::capabilities::FetchTarget;
use crate::research::error::ConfigurationError;
use crate::research::query::{Query, SourceType};
use crate::research::task::{Stage, Task, TaskId, TaskKind};
use crate::utils::toml_config::PipelineConfig;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// An enabled stage with its resolved stage-level dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStage {
    pub stage: Stage,
    pub depends_on: Vec<Stage>,
}

/// Validate the pipeline's stage table and order the enabled stages.
///
/// Stages missing from the table use their defaults. The result is in
/// topological order, ties broken by the canonical stage order.
pub fn resolve_stages(pipeline: &PipelineConfig) -> Result<Vec<ResolvedStage>, ConfigurationError> {
    let mut configured = BTreeMap::new();
    for (name, stage_config) in &pipeline.stages {
        let stage = name
            .parse::<Stage>()
            .map_err(ConfigurationError::UnknownStage)?;
        configured.insert(stage, stage_config);
    }

    let mut enabled: BTreeMap<Stage, Vec<Stage>> = BTreeMap::new();
    for stage in Stage::ALL {
        let stage_config = configured.get(&stage);
        if !stage_config.map(|c| c.enabled).unwrap_or(true) {
            continue;
        }

        let depends_on = match stage_config.and_then(|c| c.depends_on.as_ref()) {
            Some(names) => {
                let mut deps = Vec::with_capacity(names.len());
                for name in names {
                    let dep = name
                        .parse::<Stage>()
                        .map_err(ConfigurationError::UnknownStage)?;
                    if !deps.contains(&dep) {
                        deps.push(dep);
                    }
                }
                deps
            }
            None => stage.default_dependencies().to_vec(),
        };

        if depends_on.contains(&stage) {
            return Err(ConfigurationError::SelfDependency(stage.to_string()));
        }
        enabled.insert(stage, depends_on);
    }

    for (stage, deps) in &enabled {
        if let Some(dep) = deps.iter().find(|dep| !enabled.contains_key(dep)) {
            return Err(ConfigurationError::DisabledDependency {
                stage: stage.to_string(),
                dependency: dep.to_string(),
            });
        }
    }

    topological_stages(&enabled)
}

/// Kahn's algorithm over the enabled stages.
fn topological_stages(
    graph: &BTreeMap<Stage, Vec<Stage>>,
) -> Result<Vec<ResolvedStage>, ConfigurationError> {
    let mut in_degree: BTreeMap<Stage, usize> =
        graph.iter().map(|(stage, deps)| (*stage, deps.len())).collect();

    let mut ready: BTreeSet<Stage> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(stage, _)| *stage)
        .collect();

    let mut order = Vec::with_capacity(graph.len());
    while let Some(stage) = ready.pop_first() {
        order.push(ResolvedStage {
            stage,
            depends_on: graph[&stage].clone(),
        });
        for (dependent, deps) in graph {
            if deps.contains(&stage) {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }
    }

    if order.len() < graph.len() {
        let placed: BTreeSet<Stage> = order.iter().map(|r| r.stage).collect();
        let remaining: BTreeSet<Stage> = graph
            .keys()
            .filter(|stage| !placed.contains(stage))
            .copied()
            .collect();
        return Err(ConfigurationError::Cycle(find_cycle(graph, &remaining)));
    }

    Ok(order)
}

/// Every stage left over by Kahn's algorithm has a dependency that is also
/// left over, so walking dependencies from any of them must revisit a stage.
fn find_cycle(graph: &BTreeMap<Stage, Vec<Stage>>, remaining: &BTreeSet<Stage>) -> Vec<String> {
    let Some(&start) = remaining.iter().next() else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut current = start;
    loop {
        let next = graph[&current]
            .iter()
            .copied()
            .find(|dep| remaining.contains(dep));
        let Some(next) = next else {
            break;
        };
        if let Some(pos) = path.iter().position(|s| *s == next) {
            // Dependencies point backwards; report the cycle in execution order.
            let mut cycle: Vec<String> = path[pos..].iter().rev().map(|s| s.to_string()).collect();
            if let Some(first) = cycle.first().cloned() {
                cycle.push(first);
            }
            return cycle;
        }
        path.push(next);
        current = next;
    }

    remaining.iter().map(|s| s.to_string()).collect()
}

/// A validated, acyclic set of tasks in topological order.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskGraph {
    tasks: Vec<Task>,
}

impl TaskGraph {
    /// Wrap tasks that are already in dependency order.
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn topological_order(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }

    /// True when every dependency appears earlier in the task list.
    pub fn is_topologically_sorted(&self) -> bool {
        let positions: HashMap<&TaskId, usize> = self
            .tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (&t.id, i))
            .collect();
        self.tasks.iter().enumerate().all(|(i, task)| {
            task.depends_on
                .iter()
                .all(|dep| positions.get(dep).map(|&p| p < i).unwrap_or(false))
        })
    }
}

/// Builds task graphs from a pipeline configuration.
pub struct TaskGraphBuilder<'a> {
    pipeline: &'a PipelineConfig,
}

impl<'a> TaskGraphBuilder<'a> {
    pub fn new(pipeline: &'a PipelineConfig) -> Self {
        Self { pipeline }
    }

    pub fn build(&self, query: &Query) -> Result<TaskGraph, ConfigurationError> {
        query.validate()?;
        let stages = resolve_stages(self.pipeline)?;

        let mut tasks = Vec::new();
        let mut stage_tasks: HashMap<Stage, Vec<TaskId>> = HashMap::new();

        for resolved in &stages {
            let depends_on: Vec<TaskId> = resolved
                .depends_on
                .iter()
                .flat_map(|dep| stage_tasks.get(dep).cloned().unwrap_or_default())
                .collect();

            let planned: Vec<(TaskId, TaskKind)> = self.expand(resolved.stage, query);
            let ids: Vec<TaskId> = planned.iter().map(|(id, _)| id.clone()).collect();
            tasks.extend(
                planned
                    .into_iter()
                    .map(|(id, kind)| Task::new(id, kind, depends_on.clone())),
            );
            stage_tasks.insert(resolved.stage, ids);
        }

        if tasks.is_empty() {
            return Err(ConfigurationError::EmptyPlan);
        }

        Ok(TaskGraph { tasks })
    }

    fn expand(&self, stage: Stage, query: &Query) -> Vec<(TaskId, TaskKind)> {
        let constraints = query.constraints();
        match stage {
            Stage::Scrape => {
                let explicit = constraints
                    .sources
                    .iter()
                    .map(|url| FetchTarget::Url { url: url.clone() });

                let source_types = effective_source_types(self.pipeline, query);
                let mut seen = BTreeSet::new();
                let searched = source_types
                    .iter()
                    .filter(|st| seen.insert(**st))
                    .flat_map(|source_type| {
                        (1..=self.pipeline.sources_per_type).map(|rank| FetchTarget::Search {
                            query: query.text().to_string(),
                            rank,
                            source_type: *source_type,
                        })
                    })
                    .collect::<Vec<_>>();

                explicit
                    .chain(searched)
                    .enumerate()
                    .map(|(i, target)| {
                        (
                            TaskId::new(format!("scrape-{}", i + 1)),
                            TaskKind::Scrape { target },
                        )
                    })
                    .collect()
            }
            Stage::Summarize => vec![(
                TaskId::new("summarize"),
                TaskKind::Summarize {
                    max_bullets: constraints
                        .summary_bullets
                        .unwrap_or(self.pipeline.summary_bullets),
                },
            )],
            Stage::FactCheck => vec![(TaskId::new("fact-check"), TaskKind::FactCheck)],
            Stage::Translate => {
                let languages: BTreeSet<&String> = constraints.languages.iter().collect();
                languages
                    .into_iter()
                    .map(|lang| {
                        (
                            TaskId::new(format!("translate-{}", lang)),
                            TaskKind::Translate {
                                language: lang.clone(),
                            },
                        )
                    })
                    .collect()
            }
            Stage::Sentiment => vec![(TaskId::new("sentiment"), TaskKind::Sentiment)],
            Stage::Cite => vec![(
                TaskId::new("cite"),
                TaskKind::Cite {
                    style: constraints
                        .citation_style
                        .unwrap_or(self.pipeline.citation_style),
                },
            )],
        }
    }
}

/// Source channels a query will search, after defaults are applied.
pub fn effective_source_types<'a>(
    pipeline: &'a PipelineConfig,
    query: &'a Query,
) -> &'a [SourceType] {
    if query.constraints().source_types.is_empty() {
        &pipeline.default_source_types
    } else {
        &query.constraints().source_types
    }
}
