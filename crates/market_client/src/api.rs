use std::sync::Arc;

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use market_core::{ClientError, ImageFile, UploadedImage};

use crate::gateway::{Gateway, ProgressFn};
use crate::request::{path_segment, MultipartForm, RequestDescriptor};
use crate::suggest::SuggestionSource;
use crate::upload::{FileProgress, Uploader};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    #[serde(alias = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub images: Vec<UploadedImage>,
    #[serde(default)]
    pub seller_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Fields a seller submits when creating or editing a listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingDraft {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub location: String,
    pub images: Vec<UploadedImage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPage {
    pub listings: Vec<Listing>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub pages: u32,
}

/// Filters of the listings browser. Absent fields are not sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl ListingQuery {
    fn apply(&self, request: RequestDescriptor) -> RequestDescriptor {
        request
            .query_opt("page", self.page)
            .query_opt("limit", self.limit)
            .query_opt("search", self.search.as_deref().filter(|s| !s.trim().is_empty()))
            .query_opt("category", self.category.as_deref())
            .query_opt("location", self.location.as_deref())
            .query_opt("minPrice", self.min_price)
            .query_opt("maxPrice", self.max_price)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSuggestion {
    #[serde(alias = "display_name")]
    pub label: String,
    #[serde(default)]
    pub place_id: Option<String>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default = "Option::default")]
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

/// Unwraps `{success, data, message}` into the endpoint's payload type.
pub fn decode_envelope<T: DeserializeOwned>(body: Value) -> Result<T, ClientError> {
    let envelope = parse_envelope::<T>(body)?;
    envelope
        .data
        .ok_or_else(|| ClientError::Decode("response has no data".to_string()))
}

/// Checks an envelope whose payload is irrelevant to the caller.
pub fn expect_success(body: Value) -> Result<(), ClientError> {
    parse_envelope::<IgnoredAny>(body).map(|_| ())
}

fn parse_envelope<T: DeserializeOwned>(body: Value) -> Result<Envelope<T>, ClientError> {
    let envelope: Envelope<T> =
        serde_json::from_value(body).map_err(|err| ClientError::Decode(err.to_string()))?;
    if !envelope.success {
        return Err(ClientError::Api(
            envelope
                .message
                .unwrap_or_else(|| "request failed".to_string()),
        ));
    }
    Ok(envelope)
}

/// Typed marketplace endpoints over an injected [`Gateway`].
#[derive(Clone)]
pub struct MarketApi {
    gateway: Arc<dyn Gateway>,
}

impl MarketApi {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestDescriptor) -> Result<T, ClientError> {
        let body = self.gateway.send(request).await?;
        decode_envelope(body)
    }

    async fn call_unit(&self, request: RequestDescriptor) -> Result<(), ClientError> {
        let body = self.gateway.send(request).await?;
        expect_success(body)
    }

    pub async fn list_listings(&self, query: &ListingQuery) -> Result<ListingPage, ClientError> {
        self.call(query.apply(RequestDescriptor::get("/listings")))
            .await
    }

    pub async fn get_listing(&self, id: &str) -> Result<Listing, ClientError> {
        let id = path_segment(id)?;
        self.call(RequestDescriptor::get(format!("/listings/{id}")))
            .await
    }

    /// Listings of the signed-in seller.
    pub async fn my_listings(&self) -> Result<Vec<Listing>, ClientError> {
        self.call(RequestDescriptor::get("/listings/mine")).await
    }

    pub async fn create_listing(&self, draft: &ListingDraft) -> Result<Listing, ClientError> {
        self.call(RequestDescriptor::post("/listings").json(draft)?)
            .await
    }

    pub async fn update_listing(&self, id: &str, draft: &ListingDraft) -> Result<Listing, ClientError> {
        let id = path_segment(id)?;
        self.call(RequestDescriptor::put(format!("/listings/{id}")).json(draft)?)
            .await
    }

    pub async fn delete_listing(&self, id: &str) -> Result<(), ClientError> {
        let id = path_segment(id)?;
        self.call_unit(RequestDescriptor::delete(format!("/listings/{id}")))
            .await
    }

    /// Multipart upload of one image.
    pub async fn upload_image(
        &self,
        file: &ImageFile,
        folder: &str,
        progress: Option<ProgressFn>,
    ) -> Result<UploadedImage, ClientError> {
        let form = MultipartForm::new().text("folder", folder).file("image", file);
        let request = RequestDescriptor::post("/upload/image").multipart(form);
        let body = match progress {
            Some(progress) => self.gateway.send_tracked(request, progress).await?,
            None => self.gateway.send(request).await?,
        };
        decode_envelope(body)
    }

    /// Lets the backend fetch an image from a remote URL.
    pub async fn upload_image_url(&self, url: &str, folder: &str) -> Result<UploadedImage, ClientError> {
        self.call(
            RequestDescriptor::post("/upload/image-url").json(&json!({ "url": url, "folder": folder }))?,
        )
        .await
    }

    pub async fn delete_image(&self, public_id: &str) -> Result<(), ClientError> {
        self.call_unit(
            RequestDescriptor::delete("/upload/image").json(&json!({ "publicId": public_id }))?,
        )
        .await
    }

    pub async fn suggest_locations(&self, text: &str) -> Result<Vec<LocationSuggestion>, ClientError> {
        self.call(RequestDescriptor::get("/locations/suggest").query("q", text))
            .await
    }
}

#[async_trait::async_trait]
impl Uploader for MarketApi {
    async fn upload(
        &self,
        file: &ImageFile,
        folder: &str,
        progress: FileProgress,
    ) -> Result<UploadedImage, ClientError> {
        let report: ProgressFn = Arc::new(move |sent, total| progress.report_bytes(sent, total));
        self.upload_image(file, folder, Some(report)).await
    }

    async fn delete(&self, image: &UploadedImage) -> Result<(), ClientError> {
        self.delete_image(&image.public_id).await
    }
}

#[async_trait::async_trait]
impl SuggestionSource<LocationSuggestion> for MarketApi {
    async fn suggest(&self, query: &str) -> Result<Vec<LocationSuggestion>, ClientError> {
        self.suggest_locations(query).await
    }
}
