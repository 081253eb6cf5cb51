//! JobHub registry behaviour.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_test::assert_ok;

use adflow_models::{JobErrorKind, JobId, JobKind, JobStatus};
use adflow_tracker::{JobHub, ResumeOutcome, SourceFactory, TrackerConfig, TrackerError};

use super::common::{job, FakeBackend, Step};

fn hub(backend: &Arc<FakeBackend>) -> JobHub {
    let config = TrackerConfig::default().with_push_kinds(Vec::<JobKind>::new());
    let factory = SourceFactory::new(backend.clone(), config);
    JobHub::new(backend.clone(), factory)
}

#[tokio::test(start_paused = true)]
async fn test_track_same_id_shares_one_source() {
    let backend = FakeBackend::new();
    let hub = hub(&backend);
    let id = JobId::from("c-1");

    let mut first = hub.track(id.clone(), JobKind::Composition);
    let second = hub.track(id.clone(), JobKind::Composition);
    tokio::time::sleep(Duration::from_secs(5)).await;

    // One loop: fetches at 0s, 2s and 4s.
    assert_eq!(backend.calls("c-1"), 3);
    assert_eq!(hub.tracked(), vec![id]);
    assert!(first.has_changed().unwrap());
    assert_eq!(*first.borrow_and_update(), *second.borrow());
}

#[tokio::test(start_paused = true)]
async fn test_submit_tracks_new_job() {
    let backend = FakeBackend::new();
    backend.next_submission("gen-7");
    backend.script(
        "gen-7",
        vec![Step::Ok(job("gen-7", JobKind::VideoGeneration, JobStatus::Processing, 35))],
    );
    let hub = hub(&backend);

    let id = hub
        .submit(JobKind::VideoGeneration, json!({"scenes": []}))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(id, JobId::from("gen-7"));
    assert_eq!(hub.current(&id).unwrap().progress_percent, 35);
    assert!(hub.subscribe(&id).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_stop_and_stop_all() {
    let backend = FakeBackend::new();
    let hub = hub(&backend);

    let rx = hub.track(JobId::from("a"), JobKind::Composition);
    hub.track(JobId::from("b"), JobKind::Composition);
    hub.track(JobId::from("c"), JobKind::Composition);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(hub.stop(&JobId::from("a")));
    assert!(!hub.stop(&JobId::from("a")));
    assert_eq!(*rx.borrow(), None);

    hub.stop_all();
    assert!(hub.tracked().is_empty());
    tokio::time::sleep(Duration::from_secs(10)).await;

    for id in ["a", "b", "c"] {
        assert_eq!(backend.calls(id), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_resume_unknown_is_not_kept() {
    let backend = FakeBackend::new();
    backend.script("lost", vec![Step::NotFound]);
    let hub = hub(&backend);

    let outcome = hub.resume(JobId::from("lost"), JobKind::Composition).await;
    assert_eq!(outcome, ResumeOutcome::Cleared);
    assert!(hub.tracked().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_retry_moves_resubmitted_job() {
    let backend = FakeBackend::new();
    backend.next_submission("c-1");
    backend.next_submission("c-2");
    backend.script(
        "c-1",
        vec![Step::Ok(job("c-1", JobKind::Composition, JobStatus::Failed, 80))],
    );
    let hub = hub(&backend);

    let first = hub.submit(JobKind::Composition, json!({"clips": ["a"]})).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(
        hub.current(&first).unwrap().failure(),
        Some(JobErrorKind::JobFailed)
    );

    let second = assert_ok!(hub.retry(&first).await);
    assert_eq!(second, JobId::from("c-2"));
    assert_eq!(hub.tracked(), vec![second.clone()]);
    assert!(hub.current(&first).is_none());

    assert!(matches!(
        hub.retry(&JobId::from("unknown")).await,
        Err(TrackerError::NothingToRetry)
    ));
    assert!(hub.dismiss(&second));
    assert!(hub.tracked().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_track_during_resume_shares_the_resumed_tracker() {
    let backend = FakeBackend::new();
    backend.script(
        "r-1",
        vec![
            Step::Slow(
                Duration::from_secs(5),
                job("r-1", JobKind::Composition, JobStatus::Processing, 20),
            ),
            Step::Ok(job("r-1", JobKind::Composition, JobStatus::Processing, 40)),
            Step::Ok(job("r-1", JobKind::Composition, JobStatus::Processing, 60)),
        ],
    );
    let hub = hub(&backend);
    let id = JobId::from("r-1");

    let (outcome, mut rx) = tokio::join!(hub.resume(id.clone(), JobKind::Composition), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        hub.track(id.clone(), JobKind::Composition)
    });
    assert_eq!(outcome, ResumeOutcome::Attached);

    // Verification at 0s, then one loop fetching at 5s and 7s.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(backend.calls("r-1"), 3);
    assert_eq!(hub.tracked(), vec![id.clone()]);

    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().as_ref().unwrap().progress_percent, 60);
    assert_eq!(hub.current(&id).unwrap().progress_percent, 60);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_resume_leaves_nothing_running() {
    let backend = FakeBackend::new();
    backend.script(
        "r-2",
        vec![Step::Slow(
            Duration::from_secs(5),
            job("r-2", JobKind::Composition, JobStatus::Processing, 20),
        )],
    );
    let hub = hub(&backend);
    let id = JobId::from("r-2");

    let (outcome, stopped) = tokio::join!(hub.resume(id.clone(), JobKind::Composition), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        hub.stop(&id)
    });
    assert!(stopped);
    assert_eq!(outcome, ResumeOutcome::Cleared);
    assert!(hub.tracked().is_empty());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(backend.calls("r-2"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_retry_is_honoured() {
    let backend = FakeBackend::new();
    backend.next_submission("c-1");
    backend.next_submission("c-2");
    backend.script(
        "c-1",
        vec![Step::Ok(job("c-1", JobKind::Composition, JobStatus::Failed, 80))],
    );
    let hub = hub(&backend);

    let first = hub.submit(JobKind::Composition, json!({"clips": ["a"]})).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    backend.slow_submissions(Duration::from_secs(5));

    let (retried, stopped) = tokio::join!(hub.retry(&first), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        hub.stop(&first)
    });
    assert!(stopped);
    assert_eq!(assert_ok!(retried), JobId::from("c-2"));
    assert!(hub.tracked().is_empty());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(backend.calls("c-2"), 0);
}
