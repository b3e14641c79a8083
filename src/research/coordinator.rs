use crate::capabilities::CapabilitySet;
use crate::research::aggregator::ResultAggregator;
use crate::research::dispatcher::{DriveOutcome, Dispatcher};
use crate::research::error::{OrchestrationError, OrchestrationResult};
use crate::research::planner::TaskGraphBuilder;
use crate::research::query::Query;
use crate::research::report::Report;
use crate::research::run::{RunId, RunPhase, RunState, RunSummary};
use crate::research::store::{RunHandle, RunStore};
use crate::utils::toml_config::{SageConfig, SageConfigManager};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Owns research runs from submission to report.
///
/// Each submitted query gets its own [`RunState`] in the shared [`RunStore`]
/// and its own spawned driver task, which plans the task graph, hands it to
/// the [`Dispatcher`] and aggregates the finished state into a [`Report`].
/// The configuration is snapshotted when a run is submitted, so a reload
/// never changes a run in flight.
#[derive(Clone)]
pub struct ResearchCoordinator {
    store: Arc<RunStore>,
    capabilities: CapabilitySet,
    config: SageConfigManager,
}

impl ResearchCoordinator {
    pub fn new(store: Arc<RunStore>, capabilities: CapabilitySet, config: SageConfigManager) -> Self {
        Self {
            store,
            capabilities,
            config,
        }
    }

    pub fn store(&self) -> &Arc<RunStore> {
        &self.store
    }

    /// Accept a query and start driving it in the background.
    pub fn submit(&self, query: Query) -> RunId {
        let run_id = Uuid::new_v4();
        let handle = self.store.insert(RunState::new(run_id, query));
        let config = self.config.config();
        let dispatcher = Dispatcher::new(self.capabilities.clone(), &config);

        info!(run_id = %run_id, "Research run accepted");
        let driver_handle = handle.clone();
        let driver = tokio::spawn(async move {
            let cancel = driver_handle.cancel_token().clone();
            drive_run(&driver_handle, &config, &dispatcher, cancel).await
        });
        tokio::spawn(supervise(handle, driver));

        run_id
    }

    pub fn status(&self, run_id: RunId) -> OrchestrationResult<RunSummary> {
        Ok(self.handle(run_id)?.summary())
    }

    /// The finished report; `NotReady` until the run is done.
    pub fn report(&self, run_id: RunId) -> OrchestrationResult<Arc<Report>> {
        let handle = self.handle(run_id)?;
        handle.read(|state| match state.report() {
            Some(report) if state.phase() == RunPhase::Done => Ok(report),
            _ => Err(OrchestrationError::NotReady {
                phase: state.phase(),
            }),
        })
    }

    /// Cancel a run and wait until its driver has stopped.
    pub async fn cancel(&self, run_id: RunId) -> OrchestrationResult<RunSummary> {
        let handle = self.handle(run_id)?;
        let phase = handle.phase();
        if phase.is_terminal() {
            return Err(OrchestrationError::AlreadyTerminal { phase });
        }

        info!(run_id = %run_id, phase = %phase, "Cancelling research run");
        handle.cancel_token().cancel();
        Self::wait_terminal(&handle).await
    }

    /// Resolve once the run reaches a terminal phase.
    pub async fn wait(&self, run_id: RunId) -> OrchestrationResult<RunSummary> {
        let handle = self.handle(run_id)?;
        Self::wait_terminal(&handle).await
    }

    /// Submit a query and wait for it to finish.
    pub async fn research(
        &self,
        query: Query,
    ) -> OrchestrationResult<(RunId, RunSummary, Option<Arc<Report>>)> {
        let run_id = self.submit(query);
        let summary = self.wait(run_id).await?;
        let report = self.report(run_id).ok();
        Ok((run_id, summary, report))
    }

    pub fn active_runs(&self) -> usize {
        self.store.active_count()
    }

    fn handle(&self, run_id: RunId) -> OrchestrationResult<RunHandle> {
        self.store
            .get(&run_id)
            .ok_or(OrchestrationError::NotFound(run_id))
    }

    async fn wait_terminal(handle: &RunHandle) -> OrchestrationResult<RunSummary> {
        let mut phases = handle.subscribe();
        // the sender lives as long as the handle, so this only ends on a terminal phase
        let _ = phases.wait_for(|phase| phase.is_terminal()).await;
        Ok(handle.summary())
    }
}

/// Wait for a run's driver and fail the run if the driver errored or panicked
/// before reaching a terminal phase.
async fn supervise(handle: RunHandle, driver: JoinHandle<OrchestrationResult<()>>) {
    let reason = match driver.await {
        Ok(Ok(())) => return,
        Ok(Err(e)) => format!("internal error: {}", e),
        Err(e) if e.is_panic() => "research driver panicked".to_string(),
        Err(e) => format!("research driver stopped: {}", e),
    };

    let run_id = handle.id();
    error!(run_id = %run_id, reason = %reason, "Research run aborted");
    handle.cancel_token().cancel();
    handle.update(|state| {
        if state.phase().is_terminal() {
            return;
        }
        if let Err(e) = state.fail(reason) {
            warn!(run_id = %run_id, error = %e, "Could not mark run as failed");
        }
    });
}

/// Plan, dispatch and aggregate one run.
async fn drive_run(
    handle: &RunHandle,
    config: &SageConfig,
    dispatcher: &Dispatcher,
    cancel: CancellationToken,
) -> OrchestrationResult<()> {
    let run_id = handle.id();

    if cancel.is_cancelled() {
        return handle.update(|state| state.advance(RunPhase::Cancelled));
    }
    handle.update(|state| state.advance(RunPhase::Planning))?;

    let query = handle.read(|state| state.query().clone());
    let graph = match TaskGraphBuilder::new(&config.pipeline).build(&query) {
        Ok(graph) => graph,
        Err(e) => {
            warn!(run_id = %run_id, error = %e, "Research run rejected");
            return handle.update(|state| state.reject(e.to_string()));
        }
    };

    let tasks = graph.len();
    handle.update(|state| {
        state.install_plan(graph)?;
        state.advance(RunPhase::Executing)
    })?;
    info!(run_id = %run_id, tasks, "Research plan installed");

    if dispatcher.drive(handle, cancel.clone()).await == DriveOutcome::Cancelled {
        return handle.update(|state| state.advance(RunPhase::Cancelled));
    }

    handle.update(|state| state.advance(RunPhase::Aggregating))?;
    let aggregator = ResultAggregator::new(config.pipeline.citation_style);
    let aggregated = handle.read(|state| aggregator.aggregate(state));

    handle.update(|state| {
        // a cancel that lands during aggregation still wins
        if cancel.is_cancelled() {
            state.cancel_unfinished();
            return state.advance(RunPhase::Cancelled);
        }
        match aggregated {
            Ok(report) => {
                let degraded = report.is_degraded();
                state.complete(report)?;
                info!(run_id = %run_id, degraded, "Research run complete");
                Ok(())
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Aggregation failed");
                state.fail(e.to_string())
            }
        }
    })
}
