//! Research Run Coordination
//!
//! This module turns a [`query::Query`] into a [`report::Report`] by planning a
//! dependency graph of capability tasks and executing it with bounded
//! concurrency, retries and cancellation.
//!
//! # Architecture
//!
//! - [`planner::TaskGraphBuilder`] - Expands a query into a task graph from `[pipeline]`
//! - [`run::RunState`] - Phase and task state machine, the only writer of run state
//! - [`dispatcher::Dispatcher`] - Runs ready tasks against the capability set
//! - [`aggregator::ResultAggregator`] - Assembles the report from a finished run
//! - [`coordinator::ResearchCoordinator`] - Owns runs from submission to report
//!
//! # Usage
//!
//! ```ignore
//! use sage::research::coordinator::ResearchCoordinator;
//! use sage::research::query::Query;
//!
//! let coordinator = ResearchCoordinator::new(store, capabilities, config_manager);
//! let (run_id, summary, report) = coordinator
//!     .research(Query::new("climate change 2024 impacts").with_language("fr"))
//!     .await?;
//!
//! if let Some(report) = report {
//!     println!("{}", report.to_markdown());
//! }
//! ```
//!
//! # Run Lifecycle
//!
//! 1. **Accepted** - The run is stored and its driver spawned
//! 2. **Planning** - The query is validated and the task graph built
//! 3. **Executing** - Tasks run once every dependency has succeeded
//! 4. **Aggregating** - Task outputs are assembled into report sections
//! 5. **Done** - The report is available; failed tasks degrade their sections
//!
//! A run can end early as **Rejected** (invalid query or pipeline),
//! **Cancelled** (user abort) or **Failed** (aggregation error, or a driver
//! that errored or panicked).

pub mod aggregator;
pub mod citation;
/// Run submission, status, cancellation and reports.
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod planner;
pub mod query;
pub mod report;
pub mod retry;
pub mod run;
pub mod store;
pub mod task;
