use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use thiserror::Error;

use market_core::ClientError;
use market_logging::{market_debug, market_trace};

use crate::config::ClientSettings;
use crate::credentials::CredentialProvider;
use crate::request::{encode_query, Method, MultipartForm, RequestBody, RequestDescriptor};

const UPLOAD_CHUNK: usize = 64 * 1024;

/// Receives `(bytes_sent, bytes_total)` while a request body is streamed.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request could not be built; nothing was sent.
    InvalidRequest,
    /// No response arrived.
    Transport,
    /// No response arrived within the configured timeout.
    Timeout,
    /// A response arrived with a non-success status.
    Status,
}

/// Failure of a single gateway call. `status` is `None` when no response arrived.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RequestError {
    pub kind: FailureKind,
    pub status: Option<u16>,
    pub message: String,
}

impl RequestError {
    pub fn network() -> Self {
        Self {
            kind: FailureKind::Transport,
            status: None,
            message: "network error".to_string(),
        }
    }

    pub fn timeout() -> Self {
        Self {
            kind: FailureKind::Timeout,
            status: None,
            message: "request timed out".to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::InvalidRequest,
            status: None,
            message: message.into(),
        }
    }

    /// Builds the error of a non-success response from its raw body.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<Value>(body)
            .ok()
            .and_then(|value| error_message(&value))
            .unwrap_or_else(|| format!("HTTP {status}"));
        Self {
            kind: FailureKind::Status,
            status: Some(status),
            message,
        }
    }
}

fn error_message(body: &Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .filter_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|message| !message.is_empty())
        .map(ToOwned::to_owned)
}

impl From<RequestError> for ClientError {
    fn from(err: RequestError) -> Self {
        match (err.kind, err.status) {
            (FailureKind::InvalidRequest, _) => ClientError::InvalidRequest(err.message),
            (FailureKind::Status, Some(status)) => ClientError::Http {
                status,
                message: err.message,
            },
            _ => ClientError::Network(err.message),
        }
    }
}

/// Issues one request and parses the JSON body. No retries.
#[async_trait::async_trait]
pub trait Gateway: Send + Sync {
    async fn send(&self, request: RequestDescriptor) -> Result<Value, RequestError>;

    /// Like `send`, reporting upload progress of multipart file parts.
    async fn send_tracked(
        &self,
        request: RequestDescriptor,
        progress: ProgressFn,
    ) -> Result<Value, RequestError> {
        let _ = progress;
        self.send(request).await
    }
}

pub struct ReqwestGateway {
    client: reqwest::Client,
    settings: ClientSettings,
    credentials: Arc<dyn CredentialProvider>,
}

impl ReqwestGateway {
    pub fn new(
        settings: ClientSettings,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, RequestError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|err| RequestError::invalid(format!("cannot build http client: {err}")))?;
        Ok(Self {
            client,
            settings,
            credentials,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Defaults, then the bearer credential, then caller headers; later
    /// entries replace earlier ones of the same name.
    pub fn merged_headers(&self, caller: &[(String, String)]) -> Result<HeaderMap, RequestError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.settings.default_headers {
            insert_header(&mut headers, name, value)?;
        }
        if let Some(token) = self.credentials.bearer_token() {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| invalid_header("Authorization"))?;
            headers.insert(AUTHORIZATION, value);
        }
        for (name, value) in caller {
            insert_header(&mut headers, name, value)?;
        }
        Ok(headers)
    }

    fn url_for(&self, path: &str, query: &[(String, String)]) -> Result<reqwest::Url, RequestError> {
        let joined = format!(
            "{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let mut url = reqwest::Url::parse(&joined)
            .map_err(|err| RequestError::invalid(format!("invalid url {joined}: {err}")))?;
        if !query.is_empty() {
            url.set_query(Some(&encode_query(query)));
        }
        Ok(url)
    }

    async fn dispatch(
        &self,
        request: RequestDescriptor,
        progress: Option<ProgressFn>,
    ) -> Result<Value, RequestError> {
        let (method, path, query, body, caller_headers) = request.into_parts();
        let url = self.url_for(&path, &query)?;
        let headers = self.merged_headers(&caller_headers)?;
        market_debug!("{} {}", method.as_str(), url);

        let mut builder = self
            .client
            .request(reqwest_method(method), url)
            .headers(headers);
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(form) => builder.multipart(multipart_form(form, progress)?),
        };

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        market_trace!("{} {} -> {}", method.as_str(), path, status);

        if !status.is_success() {
            return Err(RequestError::from_response(status.as_u16(), &bytes));
        }
        Ok(parse_body(&bytes))
    }
}

#[async_trait::async_trait]
impl Gateway for ReqwestGateway {
    async fn send(&self, request: RequestDescriptor) -> Result<Value, RequestError> {
        self.dispatch(request, None).await
    }

    async fn send_tracked(
        &self,
        request: RequestDescriptor,
        progress: ProgressFn,
    ) -> Result<Value, RequestError> {
        self.dispatch(request, Some(progress)).await
    }
}

/// Empty bodies become `null`; bodies that are not JSON are kept as a string
/// and rejected by the typed decoders.
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), RequestError> {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid_header(name))?;
    let header_value = HeaderValue::from_str(value).map_err(|_| invalid_header(name))?;
    headers.insert(header_name, header_value);
    Ok(())
}

fn invalid_header(name: &str) -> RequestError {
    RequestError::invalid(format!("invalid header {name}"))
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

struct ProgressTracker {
    sent: AtomicU64,
    total: u64,
    callback: ProgressFn,
}

impl ProgressTracker {
    fn advance(&self, len: usize) {
        let sent = self.sent.fetch_add(len as u64, Ordering::Relaxed) + len as u64;
        (self.callback)(sent.min(self.total), self.total);
    }
}

fn multipart_form(
    form: MultipartForm,
    progress: Option<ProgressFn>,
) -> Result<reqwest::multipart::Form, RequestError> {
    let tracker = progress.map(|callback| {
        Arc::new(ProgressTracker {
            sent: AtomicU64::new(0),
            total: form.file_bytes(),
            callback,
        })
    });

    let mut multipart = reqwest::multipart::Form::new();
    for (name, value) in form.text {
        multipart = multipart.text(name, value);
    }
    for part in form.files {
        let len = part.bytes.len() as u64;
        let chunks = chunk(part.bytes);
        let tracker = tracker.clone();
        let stream = futures_util::stream::iter(chunks.into_iter().map(move |chunk| {
            if let Some(tracker) = &tracker {
                tracker.advance(chunk.len());
            }
            Ok::<Bytes, std::io::Error>(chunk)
        }));
        let file_part =
            reqwest::multipart::Part::stream_with_length(reqwest::Body::wrap_stream(stream), len)
                .file_name(part.file_name)
                .mime_str(&part.mime_type)
                .map_err(|err| {
                    RequestError::invalid(format!("invalid mime type {}: {err}", part.mime_type))
                })?;
        multipart = multipart.part(part.field, file_part);
    }
    Ok(multipart)
}

fn chunk(bytes: Bytes) -> Vec<Bytes> {
    let mut chunks = Vec::with_capacity(bytes.len() / UPLOAD_CHUNK + 1);
    let mut start = 0;
    while start < bytes.len() {
        let end = (start + UPLOAD_CHUNK).min(bytes.len());
        chunks.push(bytes.slice(start..end));
        start = end;
    }
    chunks
}

fn map_reqwest_error(err: reqwest::Error) -> RequestError {
    if err.is_timeout() {
        return RequestError::timeout();
    }
    if err.is_builder() {
        return RequestError::invalid(err.to_string());
    }
    if let Some(status) = err.status() {
        return RequestError::from_response(status.as_u16(), &[]);
    }
    RequestError::network()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_message_is_preferred() {
        let err = RequestError::from_response(422, br#"{"success":false,"message":"Title is required"}"#);
        assert_eq!(err.status, Some(422));
        assert_eq!(err.message, "Title is required");

        let err = RequestError::from_response(401, br#"{"error":"Token expired"}"#);
        assert_eq!(err.message, "Token expired");
    }

    #[test]
    fn unparsable_error_body_falls_back_to_status() {
        assert_eq!(RequestError::from_response(502, b"<html>bad gateway</html>").message, "HTTP 502");
        assert_eq!(RequestError::from_response(500, br#"{"message":"  "}"#).message, "HTTP 500");
    }

    #[test]
    fn request_error_maps_to_client_error() {
        assert_eq!(
            ClientError::from(RequestError::network()),
            ClientError::Network("network error".into())
        );
        assert_eq!(
            ClientError::from(RequestError::timeout()).to_string(),
            "request timed out"
        );
        assert_eq!(
            ClientError::from(invalid_header("X Bad")),
            ClientError::InvalidRequest("invalid header X Bad".into())
        );
        let err: ClientError = RequestError::from_response(404, b"").into();
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn chunking_covers_all_bytes() {
        let bytes = Bytes::from(vec![7u8; UPLOAD_CHUNK * 2 + 10]);
        let chunks = chunk(bytes);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().map(Bytes::len).sum::<usize>(), UPLOAD_CHUNK * 2 + 10);
        assert!(chunk(Bytes::new()).is_empty());
    }

    #[test]
    fn bodies_parse_leniently() {
        assert_eq!(parse_body(b""), Value::Null);
        assert_eq!(parse_body(b"{\"a\":1}")["a"], 1);
        assert_eq!(parse_body(b"ok"), Value::String("ok".into()));
    }
}
