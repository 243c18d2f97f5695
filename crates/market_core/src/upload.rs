use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::ClientError;

/// A file picked by the user, held in memory until it is uploaded.
///
/// Clones share the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl ImageFile {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// An image stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub url: String,
    pub public_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Pending,
    Succeeded(UploadedImage),
    Failed(String),
}

impl UploadOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UploadOutcome::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub index: usize,
    pub file_name: String,
    pub folder: String,
    pub progress: u8,
    pub outcome: UploadOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub index: usize,
    pub file_name: String,
    pub reason: String,
}

/// Terminal summary of a batch; both lists follow input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadBatchResult {
    pub succeeded: Vec<UploadedImage>,
    pub failed: Vec<UploadFailure>,
}

impl UploadBatchResult {
    /// Some but not all files made it.
    pub fn is_partial(&self) -> bool {
        !self.succeeded.is_empty() && !self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Checks a file before dispatch. Returns the failure reason for files that
/// must not be sent.
pub fn check_file(file: &ImageFile, max_bytes: u64) -> Result<(), String> {
    if !file.mime_type.to_ascii_lowercase().starts_with("image/") {
        return Err(format!("{} is not an image ({})", file.name, file.mime_type));
    }
    if file.size() > max_bytes {
        return Err(format!(
            "{} is too large ({} bytes, max {} bytes)",
            file.name,
            file.size(),
            max_bytes
        ));
    }
    Ok(())
}

/// Accepted images of the edited listing plus the tasks of the latest batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBoard {
    max_images: usize,
    images: Vec<UploadedImage>,
    tasks: Vec<UploadTask>,
}

impl ImageBoard {
    pub fn new(max_images: usize) -> Self {
        Self {
            max_images,
            images: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn with_images(max_images: usize, images: Vec<UploadedImage>) -> Self {
        Self {
            images,
            ..Self::new(max_images)
        }
    }

    pub fn images(&self) -> &[UploadedImage] {
        &self.images
    }

    pub fn tasks(&self) -> &[UploadTask] {
        &self.tasks
    }

    pub fn max_images(&self) -> usize {
        self.max_images
    }

    pub fn remaining(&self) -> usize {
        self.max_images.saturating_sub(self.images.len())
    }

    pub fn check_capacity(&self, requested: usize) -> Result<(), ClientError> {
        if self.images.len() + requested > self.max_images {
            return Err(ClientError::Capacity {
                requested,
                accepted: self.images.len(),
                max: self.max_images,
            });
        }
        Ok(())
    }

    /// Replaces the task list with one pending task per file.
    pub fn begin_batch(&mut self, files: &[ImageFile], folder: &str) -> Result<(), ClientError> {
        self.check_capacity(files.len())?;
        self.tasks = files
            .iter()
            .enumerate()
            .map(|(index, file)| UploadTask {
                index,
                file_name: file.name.clone(),
                folder: folder.to_string(),
                progress: 0,
                outcome: UploadOutcome::Pending,
            })
            .collect();
        Ok(())
    }

    /// Records progress for a pending task. Progress never moves backwards and
    /// is clamped to 100. Returns the stored value when it changed.
    pub fn set_progress(&mut self, index: usize, percent: u8) -> Option<u8> {
        let task = self.tasks.get_mut(index)?;
        if task.outcome.is_terminal() {
            return None;
        }
        let percent = percent.min(100);
        if percent <= task.progress {
            return None;
        }
        task.progress = percent;
        Some(percent)
    }

    /// Moves a pending task to its terminal outcome. Siblings are untouched.
    pub fn settle(&mut self, index: usize, result: Result<UploadedImage, String>) -> bool {
        let Some(task) = self.tasks.get_mut(index) else {
            return false;
        };
        if task.outcome.is_terminal() {
            return false;
        }
        task.outcome = match result {
            Ok(image) => {
                task.progress = 100;
                UploadOutcome::Succeeded(image)
            }
            Err(reason) => UploadOutcome::Failed(reason),
        };
        true
    }

    pub fn is_settled(&self) -> bool {
        self.tasks.iter().all(|task| task.outcome.is_terminal())
    }

    /// Builds the batch summary and accepts the successful images, in input
    /// order. Returns `None` while any task is still pending.
    pub fn finish_batch(&mut self) -> Option<UploadBatchResult> {
        if !self.is_settled() {
            return None;
        }
        let mut result = UploadBatchResult::default();
        for task in &self.tasks {
            match &task.outcome {
                UploadOutcome::Succeeded(image) => result.succeeded.push(image.clone()),
                UploadOutcome::Failed(reason) => result.failed.push(UploadFailure {
                    index: task.index,
                    file_name: task.file_name.clone(),
                    reason: reason.clone(),
                }),
                UploadOutcome::Pending => {}
            }
        }
        self.images.extend(result.succeeded.iter().cloned());
        Some(result)
    }

    pub fn progress(&self) -> BTreeMap<usize, u8> {
        self.tasks
            .iter()
            .map(|task| (task.index, task.progress))
            .collect()
    }

    pub fn remove(&mut self, position: usize) -> Option<UploadedImage> {
        if position < self.images.len() {
            Some(self.images.remove(position))
        } else {
            None
        }
    }

    /// Moves an accepted image from `from` to `to`, shifting the ones between.
    pub fn move_image(&mut self, from: usize, to: usize) -> bool {
        let len = self.images.len();
        if from >= len || to >= len {
            return false;
        }
        let image = self.images.remove(from);
        self.images.insert(to, image);
        true
    }
}
