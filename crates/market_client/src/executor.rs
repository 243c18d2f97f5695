use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use market_core::{ClientError, QueryState};
use market_logging::market_trace;

use crate::lock;

struct Control {
    generation: u64,
    token: CancellationToken,
    torn_down: bool,
}

struct Shared<T> {
    control: Mutex<Control>,
    state: watch::Sender<QueryState<T>>,
}

/// Runs async operations whose results feed one observable [`QueryState`].
///
/// Every `execute` supersedes the previous invocation: the previous token is
/// cancelled and its result, whenever it arrives, is discarded. The state only
/// ever reflects the last dispatched invocation.
pub struct QueryExecutor<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Default for QueryExecutor<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> QueryExecutor<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_state(QueryState::idle())
    }

    /// Executor of a query that runs as soon as its owner mounts.
    pub fn immediate() -> Self {
        Self::with_state(QueryState::loading())
    }

    fn with_state(state: QueryState<T>) -> Self {
        let (state, _) = watch::channel(state);
        Self {
            shared: Arc::new(Shared {
                control: Mutex::new(Control {
                    generation: 0,
                    token: CancellationToken::new(),
                    torn_down: false,
                }),
                state,
            }),
        }
    }

    pub fn state(&self) -> QueryState<T> {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryState<T>> {
        self.shared.state.subscribe()
    }

    /// Dispatches `operation`, superseding any invocation in flight.
    ///
    /// `loading` is raised before this returns. The operation is raced against
    /// its cancellation token and dropped when the token fires, which aborts
    /// the underlying request where the transport allows it. A superseded or
    /// cancelled invocation resolves to `Err(ClientError::Cancelled)` and never
    /// touches the state.
    pub fn execute<F>(&self, operation: F) -> impl Future<Output = Result<T, ClientError>>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        let dispatched = {
            let mut control = lock(&self.shared.control);
            if control.torn_down {
                None
            } else {
                control.token.cancel();
                control.generation += 1;
                control.token = CancellationToken::new();
                self.shared.state.send_modify(QueryState::begin);
                Some((control.generation, control.token.clone()))
            }
        };
        let shared = Arc::clone(&self.shared);

        async move {
            let Some((generation, token)) = dispatched else {
                return Err(ClientError::Cancelled);
            };

            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(ClientError::Cancelled),
                result = operation => result,
            };

            let control = lock(&shared.control);
            if control.torn_down || control.generation != generation || token.is_cancelled() {
                market_trace!("query generation {generation} superseded, result dropped");
                return Err(ClientError::Cancelled);
            }
            shared.state.send_modify(|state| state.settle(result.clone()));
            result
        }
    }
}

impl<T> QueryExecutor<T> {
    /// Cancels the invocation in flight. The state records the cancellation.
    pub fn cancel(&self) {
        let control = lock(&self.shared.control);
        if control.torn_down || control.token.is_cancelled() {
            return;
        }
        control.token.cancel();
        self.shared.state.send_if_modified(|state| {
            if state.is_loading() {
                state.cancel();
                true
            } else {
                false
            }
        });
    }

    /// Ends the owner's lifecycle: cancels the invocation in flight and freezes
    /// the state for good.
    pub fn teardown(&self) {
        let mut control = lock(&self.shared.control);
        control.torn_down = true;
        control.token.cancel();
    }

    pub fn is_torn_down(&self) -> bool {
        lock(&self.shared.control).torn_down
    }
}

impl<T> Drop for QueryExecutor<T> {
    fn drop(&mut self) {
        self.teardown();
    }
}
