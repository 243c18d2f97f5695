use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;

use market_core::{
    check_file, ClientError, ImageBoard, ImageFile, UploadBatchResult, UploadOutcome, UploadTask,
    UploadedImage,
};
use market_logging::{market_debug, market_info, market_warn};

use crate::config::OrchestratorSettings;
use crate::lock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    Progress { index: usize, percent: u8 },
    Settled { index: usize, outcome: UploadOutcome },
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: UploadEvent);
}

/// Progress reporter handed to an [`Uploader`] for one file of a batch.
#[derive(Clone)]
pub struct FileProgress {
    index: usize,
    sink: Arc<dyn ProgressSink>,
}

impl FileProgress {
    pub fn new(index: usize, sink: Arc<dyn ProgressSink>) -> Self {
        Self { index, sink }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn report(&self, percent: u8) {
        self.sink.emit(UploadEvent::Progress {
            index: self.index,
            percent: percent.min(100),
        });
    }

    pub fn report_bytes(&self, sent: u64, total: u64) {
        let percent = if total == 0 {
            100
        } else {
            (sent.min(total) * 100 / total) as u8
        };
        self.report(percent);
    }
}

/// Reads an image from disk, guessing the MIME type from the extension.
pub async fn read_image(path: &Path) -> io::Result<ImageFile> {
    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    Ok(ImageFile::new(name, mime_for(path), bytes))
}

fn mime_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

#[async_trait::async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(
        &self,
        file: &ImageFile,
        folder: &str,
        progress: FileProgress,
    ) -> Result<UploadedImage, ClientError>;

    async fn delete(&self, image: &UploadedImage) -> Result<(), ClientError>;
}

struct Inner {
    settings: OrchestratorSettings,
    uploader: Arc<dyn Uploader>,
    board: Mutex<ImageBoard>,
    /// One unbounded queue per subscriber, so a slow reader never loses a
    /// settlement. Closed receivers are pruned on the next publish.
    subscribers: Mutex<Vec<mpsc::UnboundedSender<UploadEvent>>>,
    batch_gate: tokio::sync::Mutex<()>,
}

impl ProgressSink for Inner {
    fn emit(&self, event: UploadEvent) {
        if let UploadEvent::Progress { index, percent } = event {
            let stored = lock(&self.board).set_progress(index, percent);
            if let Some(percent) = stored {
                self.publish(UploadEvent::Progress { index, percent });
            }
        }
    }
}

impl Inner {
    fn publish(&self, event: UploadEvent) {
        lock(&self.subscribers).retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn settle(&self, index: usize, result: Result<UploadedImage, String>) {
        let outcome = match &result {
            Ok(image) => UploadOutcome::Succeeded(image.clone()),
            Err(reason) => UploadOutcome::Failed(reason.clone()),
        };
        if lock(&self.board).settle(index, result) {
            self.publish(UploadEvent::Settled { index, outcome });
        }
    }

    async fn upload_one(self: Arc<Self>, index: usize, file: &ImageFile, folder: &str) {
        market_debug!("uploading {} ({} bytes) to {folder}", file.name, file.size());
        let progress = FileProgress::new(index, self.clone());
        let result = self
            .uploader
            .upload(file, folder, progress)
            .await
            .map_err(|err| {
                market_warn!("upload of {} failed: {err}", file.name);
                err.to_string()
            });
        self.settle(index, result);
    }
}

/// Uploads batches of images and keeps the ordered list of accepted images.
///
/// Files of a batch are uploaded concurrently and settle independently; the
/// batch resolves once every file is terminal. Batches run one at a time.
pub struct UploadOrchestrator {
    inner: Arc<Inner>,
}

impl UploadOrchestrator {
    pub fn new(uploader: Arc<dyn Uploader>, settings: OrchestratorSettings) -> Self {
        Self::with_existing(uploader, settings, Vec::new())
    }

    /// Orchestrator for a listing that already owns `images`.
    pub fn with_existing(
        uploader: Arc<dyn Uploader>,
        settings: OrchestratorSettings,
        images: Vec<UploadedImage>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                board: Mutex::new(ImageBoard::with_images(settings.max_images, images)),
                settings,
                uploader,
                subscribers: Mutex::new(Vec::new()),
                batch_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Event feed of every batch from now on. Events queue until read.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<UploadEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        lock(&self.inner.subscribers).push(sender);
        receiver
    }

    pub fn images(&self) -> Vec<UploadedImage> {
        lock(&self.inner.board).images().to_vec()
    }

    pub fn tasks(&self) -> Vec<UploadTask> {
        lock(&self.inner.board).tasks().to_vec()
    }

    /// Progress of the latest batch by file index.
    pub fn progress(&self) -> BTreeMap<usize, u8> {
        lock(&self.inner.board).progress()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.inner.board).remaining()
    }

    /// Uploads `files` into `folder`.
    ///
    /// Fails with [`ClientError::Capacity`] before anything is sent when the
    /// batch would exceed the image limit. Otherwise always returns the batch
    /// summary, listing the files that did not make it.
    pub async fn upload_batch(
        &self,
        files: Vec<ImageFile>,
        folder: &str,
    ) -> Result<UploadBatchResult, ClientError> {
        let _batch = self.inner.batch_gate.lock().await;
        lock(&self.inner.board).begin_batch(&files, folder)?;
        market_info!("upload batch of {} files to {folder}", files.len());

        let mut accepted = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            match check_file(file, self.inner.settings.max_file_bytes) {
                Ok(()) => accepted.push((index, file)),
                Err(reason) => {
                    market_warn!("skipping {}: {reason}", file.name);
                    self.inner.settle(index, Err(reason));
                }
            }
        }

        let jobs = accepted
            .into_iter()
            .map(|(index, file)| Arc::clone(&self.inner).upload_one(index, file, folder));
        match self.inner.settings.max_concurrent_uploads {
            None => {
                futures_util::future::join_all(jobs).await;
            }
            Some(limit) => {
                stream::iter(jobs)
                    .buffer_unordered(limit.max(1))
                    .collect::<Vec<()>>()
                    .await;
            }
        }

        // Every task was settled above, either by its upload or by the file check.
        let result = lock(&self.inner.board).finish_batch().unwrap_or_default();
        market_info!(
            "upload batch finished: {} succeeded, {} failed",
            result.succeeded.len(),
            result.failed.len()
        );
        Ok(result)
    }

    /// Removes the accepted image at `position`. The remote copy is deleted on
    /// a best-effort basis; the image leaves the local list either way.
    pub async fn remove_uploaded(&self, position: usize) -> Option<UploadedImage> {
        let image = lock(&self.inner.board).remove(position)?;
        if let Err(err) = self.inner.uploader.delete(&image).await {
            market_warn!("remote delete of {} failed: {err}", image.public_id);
        }
        Some(image)
    }

    /// Moves an accepted image without uploading it again.
    pub fn reorder(&self, from: usize, to: usize) -> bool {
        lock(&self.inner.board).move_image(from, to)
    }
}
