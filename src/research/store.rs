//! In-memory run storage
//!
//! A [`RunStore`] owns every [`RunState`] by id. Each run lives in a
//! [`RunEntry`] together with its cancellation token and a watch channel that
//! publishes phase changes. Locks are only held for short synchronous
//! sections, never across an `.await`.

use crate::research::run::{RunId, RunPhase, RunState, RunSummary};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Shared handle to one stored run.
pub type RunHandle = Arc<RunEntry>;

/// A run plus the signals used to observe and stop it.
pub struct RunEntry {
    id: RunId,
    state: RwLock<RunState>,
    cancel: CancellationToken,
    phase: watch::Sender<RunPhase>,
}

impl RunEntry {
    pub fn new(state: RunState) -> Self {
        let (phase, _) = watch::channel(state.phase());
        Self {
            id: state.id(),
            state: RwLock::new(state),
            cancel: CancellationToken::new(),
            phase,
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    /// Read the run state under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&RunState) -> R) -> R {
        f(&*self.state.read())
    }

    /// Mutate the run state under the lock and publish any phase change.
    pub fn update<R>(&self, f: impl FnOnce(&mut RunState) -> R) -> R {
        let (result, phase) = {
            let mut state = self.state.write();
            let result = f(&mut *state);
            (result, state.phase())
        };
        self.phase.send_if_modified(|current| {
            if *current == phase {
                false
            } else {
                *current = phase;
                true
            }
        });
        result
    }

    pub fn summary(&self) -> RunSummary {
        self.read(RunState::summary)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Receiver that observes every phase change from now on.
    pub fn subscribe(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }
}

/// Runs keyed by id. Finished runs beyond `max_retained` are evicted oldest first.
pub struct RunStore {
    runs: RwLock<HashMap<RunId, RunHandle>>,
    max_retained: usize,
}

impl RunStore {
    pub fn new(max_retained: usize) -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            max_retained: max_retained.max(1),
        }
    }

    /// Store a new run and return its handle.
    pub fn insert(&self, state: RunState) -> RunHandle {
        let entry = Arc::new(RunEntry::new(state));
        let mut runs = self.runs.write();
        runs.insert(entry.id(), Arc::clone(&entry));
        Self::prune(&mut runs, self.max_retained);
        entry
    }

    pub fn get(&self, id: &RunId) -> Option<RunHandle> {
        self.runs.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.runs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.read().is_empty()
    }

    /// Number of runs that have not reached a terminal phase.
    pub fn active_count(&self) -> usize {
        self.runs
            .read()
            .values()
            .filter(|entry| !entry.phase().is_terminal())
            .count()
    }

    /// Summaries of all stored runs, newest first.
    pub fn summaries(&self) -> Vec<RunSummary> {
        let handles: Vec<RunHandle> = self.runs.read().values().cloned().collect();
        let mut summaries: Vec<RunSummary> = handles.iter().map(|h| h.summary()).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    fn prune(runs: &mut HashMap<RunId, RunHandle>, max_retained: usize) {
        if runs.len() <= max_retained {
            return;
        }

        let mut finished: Vec<_> = runs
            .values()
            .filter_map(|entry| entry.read(|s| s.finished_at().map(|at| (at, s.id()))))
            .collect();
        finished.sort();

        let excess = runs.len() - max_retained;
        for (_, id) in finished.into_iter().take(excess) {
            runs.remove(&id);
        }
    }
}
