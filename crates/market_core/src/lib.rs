//! Market core: pure state machines and the data model of the client layer.
mod error;
mod message;
mod query;
mod suggest;
mod upload;
mod validation;

pub use error::ClientError;
pub use message::{MessageKind, MessageSlot, TransientMessage};
pub use query::QueryState;
pub use suggest::{
    update, SuggestEffect, SuggestMsg, SuggestState, SuggestionView, DEFAULT_MIN_CHARS,
};
pub use upload::{
    check_file, ImageBoard, ImageFile, UploadBatchResult, UploadFailure, UploadOutcome,
    UploadTask, UploadedImage,
};
pub use validation::{validate, FieldErrors, FormErrors, FormValues, Rule, RuleSet};
