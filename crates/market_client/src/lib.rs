//! Market client: async orchestration over the marketplace REST backend.
mod api;
mod config;
mod credentials;
mod executor;
mod form;
mod gateway;
mod message;
mod request;
mod suggest;
mod upload;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use api::{
    decode_envelope, expect_success, Listing, ListingDraft, ListingPage, ListingQuery,
    LocationSuggestion, MarketApi,
};
pub use config::{
    ClientSettings, MessageSettings, OrchestratorSettings, SuggestionSettings, ENV_API_URL,
    ENV_CONNECT_TIMEOUT, ENV_REQUEST_TIMEOUT,
};
pub use credentials::{CredentialProvider, NoCredentials, StaticToken, TokenStore};
pub use executor::QueryExecutor;
pub use form::submit;
pub use gateway::{FailureKind, Gateway, ProgressFn, RequestError, ReqwestGateway};
pub use message::MessageStore;
pub use request::{
    encode_query, parse_query, path_segment, FilePart, Method, MultipartForm, RequestBody, RequestDescriptor,
};
pub use suggest::{SuggestionFetcher, SuggestionSource};
pub use upload::{
    read_image, FileProgress, ProgressSink, UploadEvent, UploadOrchestrator, Uploader,
};

pub use market_core::{
    ClientError, FieldErrors, FormErrors, FormValues, ImageFile, MessageKind, QueryState, Rule,
    RuleSet, SuggestionView, TransientMessage, UploadBatchResult, UploadFailure, UploadOutcome,
    UploadTask, UploadedImage,
};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
