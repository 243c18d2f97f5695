use crate::ClientError;

/// Observable state of a query: `data` and `error` are never both present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryState<T> {
    data: Option<T>,
    loading: bool,
    error: Option<ClientError>,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }
}

impl<T> QueryState<T> {
    /// State of a query that has never run.
    pub fn idle() -> Self {
        Self::default()
    }

    /// State of a query mounted with immediate execution.
    pub fn loading() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&ClientError> {
        self.error.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// A new invocation was dispatched. Previous data stays visible until it settles.
    pub fn begin(&mut self) {
        self.loading = true;
        self.error = None;
    }

    /// Terminal settlement of the current invocation.
    pub fn settle(&mut self, result: Result<T, ClientError>) {
        self.loading = false;
        match result {
            Ok(data) => {
                self.data = Some(data);
                self.error = None;
            }
            Err(err) => {
                self.data = None;
                self.error = Some(err);
            }
        }
    }

    /// The consumer explicitly cancelled the current invocation.
    pub fn cancel(&mut self) {
        self.settle(Err(ClientError::Cancelled));
    }
}
