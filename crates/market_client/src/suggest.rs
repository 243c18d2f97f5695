use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use market_core::{update, ClientError, SuggestEffect, SuggestMsg, SuggestState, SuggestionView};
use market_logging::{market_debug, market_warn};

use crate::config::SuggestionSettings;
use crate::executor::QueryExecutor;
use crate::lock;

/// Backend lookup used by [`SuggestionFetcher`].
#[async_trait::async_trait]
pub trait SuggestionSource<S>: Send + Sync {
    async fn suggest(&self, query: &str) -> Result<Vec<S>, ClientError>;
}

struct Inner<S> {
    settings: SuggestionSettings,
    source: Arc<dyn SuggestionSource<S>>,
    executor: QueryExecutor<Vec<S>>,
    state: Mutex<SuggestState<S>>,
    /// Debounce of the scheduled lookup that has not been dispatched yet.
    pending: Mutex<Option<CancellationToken>>,
    view: watch::Sender<SuggestionView<S>>,
}

/// Debounced autocomplete over a [`SuggestionSource`].
///
/// Must be used from within a tokio runtime.
pub struct SuggestionFetcher<S> {
    inner: Arc<Inner<S>>,
}

impl<S> SuggestionFetcher<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(source: Arc<dyn SuggestionSource<S>>, settings: SuggestionSettings) -> Self {
        let (view, _) = watch::channel(SuggestionView::default());
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SuggestState::new(settings.min_chars)),
                settings,
                source,
                executor: QueryExecutor::new(),
                pending: Mutex::new(None),
                view,
            }),
        }
    }

    pub fn view(&self) -> SuggestionView<S> {
        self.inner.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SuggestionView<S>> {
        self.inner.view.subscribe()
    }

    pub fn on_input_change(&self, text: impl Into<String>) {
        let effects = self.inner.apply(SuggestMsg::InputChanged(text.into()));
        self.run(effects);
    }

    /// Drops the input, the list and any scheduled lookup.
    pub fn clear(&self) {
        let effects = self.inner.apply(SuggestMsg::Cleared);
        self.run(effects);
    }

    fn run(&self, effects: Vec<SuggestEffect>) {
        for effect in effects {
            match effect {
                SuggestEffect::CancelPending => {
                    self.inner.cancel_pending();
                    self.inner.executor.cancel();
                }
                SuggestEffect::Schedule { generation, query } => {
                    self.schedule(generation, query);
                }
            }
        }
    }

    fn schedule(&self, generation: u64, query: String) {
        let debounce = CancellationToken::new();
        if let Some(previous) = lock(&self.inner.pending).replace(debounce.clone()) {
            previous.cancel();
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = debounce.cancelled() => return,
                _ = tokio::time::sleep(inner.settings.debounce) => {}
            }
            if debounce.is_cancelled() {
                return;
            }

            market_debug!("suggestion lookup generation={generation} query={query:?}");
            inner.apply(SuggestMsg::FetchStarted { generation });
            let source = Arc::clone(&inner.source);
            let result = inner
                .executor
                .execute(async move { source.suggest(&query).await })
                .await;
            match &result {
                Err(ClientError::Cancelled) => return,
                Err(err) => market_warn!("suggestion lookup failed: {err}"),
                Ok(_) => {}
            }
            inner.apply(SuggestMsg::FetchCompleted { generation, result });
        });
    }
}

impl<S> Inner<S>
where
    S: Clone,
{
    fn apply(&self, msg: SuggestMsg<S>) -> Vec<SuggestEffect> {
        let mut state = lock(&self.state);
        let (next, effects) = update(std::mem::take(&mut *state), msg);
        *state = next;
        self.view.send_replace(state.view());
        effects
    }

    fn cancel_pending(&self) {
        if let Some(pending) = lock(&self.pending).take() {
            pending.cancel();
        }
    }
}

impl<S> Drop for SuggestionFetcher<S> {
    fn drop(&mut self) {
        if let Some(pending) = lock(&self.inner.pending).take() {
            pending.cancel();
        }
        self.inner.executor.teardown();
    }
}
