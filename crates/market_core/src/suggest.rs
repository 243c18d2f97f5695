use crate::ClientError;

/// Inputs shorter than this never trigger a lookup.
pub const DEFAULT_MIN_CHARS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestMsg<S> {
    /// User edited the search input.
    InputChanged(String),
    /// The debounce window of `generation` elapsed and its request went out.
    FetchStarted { generation: u64 },
    /// The request of `generation` settled.
    FetchCompleted {
        generation: u64,
        result: Result<Vec<S>, ClientError>,
    },
    /// User picked a suggestion or dismissed the list.
    Cleared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestEffect {
    /// Drop any scheduled lookup that has not been dispatched yet.
    CancelPending,
    /// Replace any scheduled lookup with one for `query` after the quiet period.
    Schedule { generation: u64, query: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestState<S> {
    min_chars: usize,
    input: String,
    generation: u64,
    suggestions: Vec<S>,
    loading: bool,
    empty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionView<S> {
    pub input: String,
    pub suggestions: Vec<S>,
    pub loading: bool,
    /// The last lookup finished without anything to show.
    pub empty: bool,
}

impl<S> Default for SuggestionView<S> {
    fn default() -> Self {
        Self {
            input: String::new(),
            suggestions: Vec::new(),
            loading: false,
            empty: false,
        }
    }
}

impl<S> Default for SuggestState<S> {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CHARS)
    }
}

impl<S> SuggestState<S> {
    pub fn new(min_chars: usize) -> Self {
        Self {
            min_chars,
            input: String::new(),
            generation: 0,
            suggestions: Vec::new(),
            loading: false,
            empty: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn reset_results(&mut self) {
        self.suggestions.clear();
        self.loading = false;
        self.empty = false;
    }
}

impl<S: Clone> SuggestState<S> {
    pub fn view(&self) -> SuggestionView<S> {
        SuggestionView {
            input: self.input.clone(),
            suggestions: self.suggestions.clone(),
            loading: self.loading,
            empty: self.empty,
        }
    }
}

/// Pure update function: applies a message to state and returns any effects.
pub fn update<S>(mut state: SuggestState<S>, msg: SuggestMsg<S>) -> (SuggestState<S>, Vec<SuggestEffect>) {
    let effects = match msg {
        SuggestMsg::InputChanged(text) => {
            state.generation += 1;
            let query = text.trim().to_string();
            state.input = text;
            if query.chars().count() < state.min_chars {
                state.reset_results();
                vec![SuggestEffect::CancelPending]
            } else {
                vec![SuggestEffect::Schedule {
                    generation: state.generation,
                    query,
                }]
            }
        }
        SuggestMsg::FetchStarted { generation } => {
            if generation == state.generation {
                state.loading = true;
            }
            Vec::new()
        }
        SuggestMsg::FetchCompleted { generation, result } => {
            if generation != state.generation {
                return (state, Vec::new());
            }
            state.loading = false;
            match result {
                Ok(suggestions) => {
                    state.empty = suggestions.is_empty();
                    state.suggestions = suggestions;
                }
                Err(_) => {
                    state.suggestions.clear();
                    state.empty = true;
                }
            }
            Vec::new()
        }
        SuggestMsg::Cleared => {
            state.generation += 1;
            state.input.clear();
            state.reset_results();
            vec![SuggestEffect::CancelPending]
        }
    };

    (state, effects)
}
