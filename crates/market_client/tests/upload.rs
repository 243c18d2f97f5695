use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use market_client::{
    read_image, ClientError, FileProgress, ImageFile, OrchestratorSettings, UploadEvent,
    UploadOrchestrator, UploadOutcome, UploadedImage, Uploader,
};
use pretty_assertions::assert_eq;

#[derive(Default)]
struct FakeUploader {
    failing: HashSet<&'static str>,
    delays: HashMap<&'static str, u64>,
    fail_deletes: AtomicBool,
    uploads: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    deleted: Mutex<Vec<String>>,
}

impl FakeUploader {
    fn failing(names: &[&'static str]) -> Self {
        Self {
            failing: names.iter().copied().collect(),
            ..Self::default()
        }
    }
}

fn image(name: &str) -> UploadedImage {
    UploadedImage {
        url: format!("https://cdn.example.com/{name}"),
        public_id: format!("listings/{name}"),
    }
}

fn photo(name: &str) -> ImageFile {
    ImageFile::new(name, "image/jpeg", vec![0; 64])
}

#[async_trait::async_trait]
impl Uploader for FakeUploader {
    async fn upload(
        &self,
        file: &ImageFile,
        _folder: &str,
        progress: FileProgress,
    ) -> Result<UploadedImage, ClientError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        progress.report(50);
        let delay = self.delays.get(file.name.as_str()).copied().unwrap_or(20);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(file.name.as_str()) {
            return Err(ClientError::Http {
                status: 500,
                message: format!("could not store {}", file.name),
            });
        }
        Ok(image(&file.name))
    }

    async fn delete(&self, image: &UploadedImage) -> Result<(), ClientError> {
        self.deleted.lock().unwrap().push(image.public_id.clone());
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ClientError::Network("offline".into()));
        }
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn one_failure_does_not_abort_siblings() {
    let uploader = Arc::new(FakeUploader::failing(&["b.jpg"]));
    let orchestrator = UploadOrchestrator::new(uploader.clone(), OrchestratorSettings::default());

    let result = orchestrator
        .upload_batch(vec![photo("a.jpg"), photo("b.jpg"), photo("c.jpg")], "listings")
        .await
        .expect("batch accepted");

    assert_eq!(result.succeeded, vec![image("a.jpg"), image("c.jpg")]);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].index, 1);
    assert_eq!(result.failed[0].reason, "could not store b.jpg");
    assert_eq!(result.total(), 3);
    assert!(result.is_partial());
    assert_eq!(uploader.uploads.load(Ordering::SeqCst), 3);
    assert_eq!(orchestrator.images(), vec![image("a.jpg"), image("c.jpg")]);
}

#[tokio::test(start_paused = true)]
async fn batch_waits_for_slowest_file() {
    let uploader = Arc::new(FakeUploader {
        delays: HashMap::from([("slow.jpg", 5_000), ("fast.jpg", 10)]),
        ..FakeUploader::default()
    });
    let orchestrator = UploadOrchestrator::new(uploader.clone(), OrchestratorSettings::default());

    let started = tokio::time::Instant::now();
    let result = orchestrator
        .upload_batch(vec![photo("slow.jpg"), photo("fast.jpg")], "listings")
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(5_000));
    assert_eq!(result.succeeded, vec![image("slow.jpg"), image("fast.jpg")]);
    assert_eq!(uploader.max_in_flight.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn capacity_is_checked_before_dispatch() {
    let uploader = Arc::new(FakeUploader::default());
    let settings = OrchestratorSettings {
        max_images: 2,
        ..OrchestratorSettings::default()
    };
    let orchestrator =
        UploadOrchestrator::with_existing(uploader.clone(), settings, vec![image("x"), image("y")]);

    let err = orchestrator
        .upload_batch(vec![photo("z.jpg")], "listings")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ClientError::Capacity {
            requested: 1,
            accepted: 2,
            max: 2
        }
    );
    assert_eq!(uploader.uploads.load(Ordering::SeqCst), 0);
    assert_eq!(orchestrator.images().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn oversized_and_non_image_files_fail_before_dispatch() {
    let uploader = Arc::new(FakeUploader::default());
    let settings = OrchestratorSettings {
        max_file_bytes: 100,
        ..OrchestratorSettings::default()
    };
    let orchestrator = UploadOrchestrator::new(uploader.clone(), settings);

    let files = vec![
        photo("ok.jpg"),
        ImageFile::new("huge.jpg", "image/jpeg", vec![0; 101]),
        ImageFile::new("notes.pdf", "application/pdf", vec![0; 10]),
    ];
    let result = orchestrator.upload_batch(files, "listings").await.unwrap();

    assert_eq!(result.succeeded, vec![image("ok.jpg")]);
    let failed: Vec<usize> = result.failed.iter().map(|f| f.index).collect();
    assert_eq!(failed, vec![1, 2]);
    assert_eq!(uploader.uploads.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn bounded_concurrency_limits_in_flight_uploads() {
    let uploader = Arc::new(FakeUploader::default());
    let settings = OrchestratorSettings {
        max_concurrent_uploads: Some(2),
        ..OrchestratorSettings::default()
    };
    let orchestrator = UploadOrchestrator::new(uploader.clone(), settings);

    let files = (0..5).map(|i| photo(&format!("{i}.jpg"))).collect();
    let result = orchestrator.upload_batch(files, "listings").await.unwrap();

    assert_eq!(result.succeeded.len(), 5);
    assert_eq!(uploader.max_in_flight.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn progress_is_observable_as_events_and_map() {
    let uploader = Arc::new(FakeUploader::failing(&["b.jpg"]));
    let orchestrator = UploadOrchestrator::new(uploader, OrchestratorSettings::default());
    let mut events = orchestrator.subscribe();

    orchestrator
        .upload_batch(vec![photo("a.jpg"), photo("b.jpg")], "listings")
        .await
        .unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    assert!(received.contains(&UploadEvent::Progress { index: 0, percent: 50 }));
    assert!(received.contains(&UploadEvent::Progress { index: 1, percent: 50 }));
    assert!(received.contains(&UploadEvent::Settled {
        index: 0,
        outcome: UploadOutcome::Succeeded(image("a.jpg")),
    }));
    assert!(received.iter().any(|event| matches!(
        event,
        UploadEvent::Settled {
            index: 1,
            outcome: UploadOutcome::Failed(_)
        }
    )));

    let progress: Vec<(usize, u8)> = orchestrator.progress().into_iter().collect();
    assert_eq!(progress, vec![(0, 100), (1, 50)]);
    let tasks = orchestrator.tasks();
    assert!(tasks.iter().all(|task| task.outcome.is_terminal()));
}

/// Reports every percent step before finishing; `quick.jpg` finishes at once.
struct SteppingUploader;

#[async_trait::async_trait]
impl Uploader for SteppingUploader {
    async fn upload(
        &self,
        file: &ImageFile,
        _folder: &str,
        progress: FileProgress,
    ) -> Result<UploadedImage, ClientError> {
        if file.name != "quick.jpg" {
            for percent in 1..=99 {
                progress.report(percent);
                tokio::task::yield_now().await;
            }
        }
        Ok(image(&file.name))
    }

    async fn delete(&self, _image: &UploadedImage) -> Result<(), ClientError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn idle_subscriber_still_sees_every_settlement() {
    let orchestrator =
        UploadOrchestrator::new(Arc::new(SteppingUploader), OrchestratorSettings::default());
    let mut events = orchestrator.subscribe();

    let mut files = vec![photo("quick.jpg")];
    files.extend((1..10).map(|i| photo(&format!("{i}.jpg"))));
    let result = orchestrator.upload_batch(files, "listings").await.unwrap();
    assert_eq!(result.succeeded.len(), 10);

    let mut settled = Vec::new();
    let mut progress_events = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            UploadEvent::Settled { index, .. } => settled.push(index),
            UploadEvent::Progress { .. } => progress_events += 1,
        }
    }
    settled.sort_unstable();
    assert_eq!(settled, (0..10).collect::<Vec<_>>());
    assert_eq!(progress_events, 9 * 99);
}

#[tokio::test(start_paused = true)]
async fn dropped_subscriber_does_not_block_others() {
    let orchestrator =
        UploadOrchestrator::new(Arc::new(FakeUploader::default()), OrchestratorSettings::default());
    drop(orchestrator.subscribe());
    let mut events = orchestrator.subscribe();

    orchestrator
        .upload_batch(vec![photo("a.jpg")], "listings")
        .await
        .unwrap();

    let mut settled = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, UploadEvent::Settled { .. }) {
            settled += 1;
        }
    }
    assert_eq!(settled, 1);
}

#[tokio::test(start_paused = true)]
async fn remove_is_local_even_when_remote_delete_fails() {
    let uploader = Arc::new(FakeUploader::default());
    uploader.fail_deletes.store(true, Ordering::SeqCst);
    let orchestrator = UploadOrchestrator::with_existing(
        uploader.clone(),
        OrchestratorSettings::default(),
        vec![image("a"), image("b")],
    );

    let removed = orchestrator.remove_uploaded(0).await;
    assert_eq!(removed, Some(image("a")));
    assert_eq!(orchestrator.images(), vec![image("b")]);
    assert_eq!(*uploader.deleted.lock().unwrap(), vec!["listings/a".to_string()]);

    assert_eq!(orchestrator.remove_uploaded(3).await, None);
    assert_eq!(uploader.deleted.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn reorder_moves_without_uploading() {
    let uploader = Arc::new(FakeUploader::default());
    let orchestrator = UploadOrchestrator::with_existing(
        uploader.clone(),
        OrchestratorSettings::default(),
        vec![image("a"), image("b"), image("c")],
    );

    assert!(orchestrator.reorder(2, 0));
    assert_eq!(orchestrator.images(), vec![image("c"), image("a"), image("b")]);
    assert!(!orchestrator.reorder(0, 9));
    assert_eq!(uploader.uploads.load(Ordering::SeqCst), 0);
    assert_eq!(orchestrator.remaining(), 7);
}

#[tokio::test]
async fn read_image_guesses_mime_type() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("Front.JPG");
    std::fs::write(&path, b"jpeg-bytes").unwrap();

    let file = read_image(&path).await.unwrap();
    assert_eq!(file.name, "Front.JPG");
    assert_eq!(file.mime_type, "image/jpeg");
    assert_eq!(&file.bytes[..], b"jpeg-bytes");

    assert!(read_image(&dir.path().join("missing.png")).await.is_err());
}
