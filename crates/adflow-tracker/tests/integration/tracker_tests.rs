//! JobTracker behaviour over scripted polling and feed delivery.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use adflow_client::ApiError;
use adflow_models::{JobErrorKind, JobId, JobKind, JobStatus};
use adflow_tracker::{
    BroadcastFeed, JobTracker, ResumeOutcome, SourceFactory, SourceState, TrackerConfig,
    TrackerError,
};

use super::common::{completed_with_clips, job, polling_factory, settle, FakeBackend, Step};

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

fn feed_factory(backend: &Arc<FakeBackend>, feed: &Arc<BroadcastFeed>) -> Arc<SourceFactory> {
    Arc::new(SourceFactory::new(backend.clone(), TrackerConfig::default()).with_feed(feed.clone()))
}

#[tokio::test(start_paused = true)]
async fn test_back_to_back_attach_keeps_one_polling_loop() {
    let backend = FakeBackend::new();
    let mut tracker = JobTracker::new(polling_factory(&backend));

    tracker.attach(JobId::from("a"), JobKind::Composition);
    tracker.attach(JobId::from("b"), JobKind::Composition);
    advance(9).await;

    assert_eq!(backend.calls("a"), 0);
    assert_eq!(backend.calls("b"), 5);
    assert_eq!(tracker.job_id(), Some(JobId::from("b")));
}

#[tokio::test]
async fn test_back_to_back_attach_keeps_one_subscription() {
    let backend = FakeBackend::new();
    let feed = Arc::new(BroadcastFeed::default());
    let mut tracker = JobTracker::new(feed_factory(&backend, &feed));
    let (a, b) = (JobId::from("img-a"), JobId::from("img-b"));

    tracker.attach(a.clone(), JobKind::ImageGeneration);
    settle().await;
    assert_eq!(feed.subscriber_count(JobKind::ImageGeneration, &a), 1);

    tracker.attach(b.clone(), JobKind::ImageGeneration);
    settle().await;
    assert_eq!(feed.subscriber_count(JobKind::ImageGeneration, &a), 0);
    assert_eq!(feed.subscriber_count(JobKind::ImageGeneration, &b), 1);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_snapshot_stops_polling() {
    let backend = FakeBackend::new();
    backend.script(
        "c-1",
        vec![
            Step::Ok(job("c-1", JobKind::Composition, JobStatus::Processing, 50)),
            Step::Ok(job("c-1", JobKind::Composition, JobStatus::Completed, 100)),
            Step::Ok(job("c-1", JobKind::Composition, JobStatus::Processing, 10)),
        ],
    );
    let mut tracker = JobTracker::new(polling_factory(&backend));

    tracker.attach(JobId::from("c-1"), JobKind::Composition);
    advance(20).await;

    assert_eq!(backend.calls("c-1"), 2);
    let current = tracker.current().unwrap();
    assert_eq!(current.status, JobStatus::Completed);
    assert_eq!(current.progress_percent, 100);
    assert_eq!(tracker.source_state(), SourceState::Stopped);
}

#[tokio::test]
async fn test_feed_writes_after_terminal_are_ignored() {
    let backend = FakeBackend::new();
    let feed = Arc::new(BroadcastFeed::default());
    let mut tracker = JobTracker::new(feed_factory(&backend, &feed));

    tracker.attach(JobId::from("img-1"), JobKind::ImageGeneration);
    settle().await;
    feed.publish(&job("img-1", JobKind::ImageGeneration, JobStatus::Completed, 100));
    settle().await;
    feed.publish(&job("img-1", JobKind::ImageGeneration, JobStatus::Processing, 5));
    settle().await;

    let current = tracker.current().unwrap();
    assert_eq!(current.status, JobStatus::Completed);
    assert_eq!(tracker.source_state(), SourceState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_not_found_is_not_retried() {
    let backend = FakeBackend::new();
    backend.script("gone", vec![Step::NotFound]);
    let mut tracker = JobTracker::new(polling_factory(&backend));

    tracker.attach(JobId::from("gone"), JobKind::VideoGeneration);
    advance(30).await;

    assert_eq!(backend.calls("gone"), 1);
    assert_eq!(tracker.job_id(), None);
    let current = tracker.current().unwrap();
    assert_eq!(current.failure(), Some(JobErrorKind::JobNotFound));
    assert_eq!(current.error.as_deref(), Some("This job no longer exists"));

    match tracker.retry().await {
        Err(TrackerError::NotRetryable(JobErrorKind::JobNotFound)) => {}
        other => panic!("Expected NotRetryable, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_success_resets_failure_count() {
    let backend = FakeBackend::new();
    backend.script(
        "v-1",
        vec![
            Step::Fail,
            Step::Fail,
            Step::Ok(job("v-1", JobKind::VideoGeneration, JobStatus::Processing, 20)),
            Step::Fail,
            Step::Fail,
            Step::Fail,
        ],
    );
    let mut tracker = JobTracker::new(polling_factory(&backend));
    tracker.attach(JobId::from("v-1"), JobKind::VideoGeneration);

    // Fetches land at 0s, 3s, 6s, 9s, 12s and 15s.
    advance(10).await;
    assert_eq!(backend.calls("v-1"), 4);
    assert_eq!(tracker.source_state(), SourceState::Polling);
    assert_eq!(tracker.current().unwrap().status, JobStatus::Processing);

    advance(3).await;
    assert_eq!(backend.calls("v-1"), 5);
    assert_eq!(tracker.source_state(), SourceState::Polling);

    advance(3).await;
    assert_eq!(backend.calls("v-1"), 6);
    let current = tracker.current().unwrap();
    assert_eq!(current.failure(), Some(JobErrorKind::PollingExhausted));
    assert_eq!(current.progress_percent, 20);
    assert_eq!(tracker.source_state(), SourceState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_detach_is_idempotent() {
    let backend = FakeBackend::new();
    let mut tracker = JobTracker::new(polling_factory(&backend));

    tracker.detach();
    assert_eq!(tracker.source_state(), SourceState::Idle);

    tracker.attach(JobId::from("c-1"), JobKind::Composition);
    advance(1).await;
    tracker.detach();
    tracker.detach();
    advance(10).await;

    assert_eq!(backend.calls("c-1"), 1);
    assert_eq!(tracker.current(), None);
    assert_eq!(tracker.job_id(), None);
}

#[tokio::test(start_paused = true)]
async fn test_response_after_detach_is_discarded() {
    let backend = FakeBackend::new();
    backend.script(
        "c-1",
        vec![Step::Slow(
            Duration::from_secs(5),
            job("c-1", JobKind::Composition, JobStatus::Completed, 100),
        )],
    );
    let mut tracker = JobTracker::new(polling_factory(&backend));

    tracker.attach(JobId::from("c-1"), JobKind::Composition);
    advance(1).await;
    assert_eq!(backend.calls("c-1"), 1);
    tracker.detach();
    advance(10).await;

    assert_eq!(tracker.current(), None);
}

#[tokio::test(start_paused = true)]
async fn test_response_for_replaced_job_is_discarded() {
    let backend = FakeBackend::new();
    backend.script(
        "old",
        vec![Step::Slow(
            Duration::from_secs(5),
            job("old", JobKind::Composition, JobStatus::Completed, 100),
        )],
    );
    backend.script(
        "new",
        vec![Step::Ok(job("new", JobKind::Composition, JobStatus::Processing, 15))],
    );
    let mut tracker = JobTracker::new(polling_factory(&backend));

    tracker.attach(JobId::from("old"), JobKind::Composition);
    advance(1).await;
    tracker.attach(JobId::from("new"), JobKind::Composition);
    advance(1).await;
    advance(6).await;

    let current = tracker.current().unwrap();
    assert_eq!(current.id, JobId::from("new"));
    assert_eq!(current.status, JobStatus::Processing);
}

#[tokio::test(start_paused = true)]
async fn test_resume_unknown_job_clears() {
    let backend = FakeBackend::new();
    backend.script("stale", vec![Step::NotFound]);
    let mut tracker = JobTracker::new(polling_factory(&backend));

    let outcome = tracker.resume(JobId::from("stale"), JobKind::VideoGeneration).await;
    advance(30).await;

    assert_eq!(outcome, ResumeOutcome::Cleared);
    assert_eq!(tracker.current(), None);
    assert_eq!(tracker.job_id(), None);
    assert_eq!(tracker.source_state(), SourceState::Idle);
    assert_eq!(backend.calls("stale"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_resume_finished_job_does_not_poll() {
    let backend = FakeBackend::new();
    backend.script(
        "done",
        vec![Step::Ok(completed_with_clips("done", JobKind::VideoGeneration, 2))],
    );
    let mut tracker = JobTracker::new(polling_factory(&backend));

    let outcome = tracker.resume(JobId::from("done"), JobKind::VideoGeneration).await;
    advance(30).await;

    match outcome {
        ResumeOutcome::Finished(job) => assert_eq!(job.completed_sub_items(), 2),
        other => panic!("Expected Finished, got {other:?}"),
    }
    assert_eq!(backend.calls("done"), 1);
    assert_eq!(tracker.current().unwrap().status, JobStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_resume_attaches_when_check_fails() {
    let backend = FakeBackend::new();
    backend.script(
        "v-2",
        vec![
            Step::Fail,
            Step::Ok(job("v-2", JobKind::VideoGeneration, JobStatus::Processing, 30)),
        ],
    );
    let mut tracker = JobTracker::new(polling_factory(&backend));

    let outcome = tracker.resume(JobId::from("v-2"), JobKind::VideoGeneration).await;
    advance(1).await;

    assert_eq!(outcome, ResumeOutcome::Attached);
    assert_eq!(tracker.current().unwrap().progress_percent, 30);
    assert_eq!(tracker.source_state(), SourceState::Polling);
}

#[tokio::test]
async fn test_resume_pushed_job_from_latest_snapshot() {
    let backend = FakeBackend::new();
    let feed = Arc::new(BroadcastFeed::default());
    feed.publish(&job("img-9", JobKind::ImageGeneration, JobStatus::Processing, 40));
    let mut tracker = JobTracker::new(feed_factory(&backend, &feed));

    let outcome = tracker.resume(JobId::from("img-9"), JobKind::ImageGeneration).await;
    assert_eq!(outcome, ResumeOutcome::Attached);
    assert_eq!(tracker.current().unwrap().progress_percent, 40);

    settle().await;
    feed.publish(&job("img-9", JobKind::ImageGeneration, JobStatus::Completed, 100));
    settle().await;
    assert_eq!(tracker.current().unwrap().status, JobStatus::Completed);

    let unknown = tracker.resume(JobId::from("img-0"), JobKind::ImageGeneration).await;
    assert_eq!(unknown, ResumeOutcome::Cleared);
    assert_eq!(backend.calls("img-9"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_generation_scenario_recovers_after_lost_contact() {
    let backend = FakeBackend::new();
    backend.next_submission("gen-42");
    backend.script(
        "gen-42",
        vec![
            Step::Ok(job("gen-42", JobKind::VideoGeneration, JobStatus::Processing, 10)),
            Step::Ok(job("gen-42", JobKind::VideoGeneration, JobStatus::Processing, 55)),
            Step::Fail,
            Step::Fail,
            Step::Fail,
            Step::Ok(completed_with_clips("gen-42", JobKind::VideoGeneration, 3)),
        ],
    );
    let mut tracker = JobTracker::new(polling_factory(&backend)).with_submitter(backend.clone());
    let mut rx = tracker.subscribe();

    let job_id = tracker
        .submit(JobKind::VideoGeneration, json!({"scenes": [1, 2, 3]}))
        .await
        .unwrap();
    assert_eq!(job_id, JobId::from("gen-42"));
    assert_eq!(rx.borrow_and_update().as_ref().unwrap().status, JobStatus::Pending);

    advance(1).await;
    assert_eq!(tracker.current().unwrap().progress_percent, 10);

    advance(3).await;
    assert_eq!(tracker.current().unwrap().progress_percent, 55);

    // First two failed polls are absorbed.
    advance(6).await;
    let current = tracker.current().unwrap();
    assert_eq!(current.status, JobStatus::Processing);
    assert_eq!(current.progress_percent, 55);

    advance(3).await;
    let current = tracker.current().unwrap();
    assert_eq!(current.failure(), Some(JobErrorKind::PollingExhausted));
    assert_eq!(current.error.as_deref(), Some("We lost contact with the job"));
    assert!(rx.has_changed().unwrap());

    let retried = tracker.retry().await.unwrap();
    assert_eq!(retried, job_id);

    // Observers see the job retrying before the first fetch lands.
    let retrying = rx.borrow_and_update().clone().unwrap();
    assert_eq!(retrying.status, JobStatus::Processing);
    assert_eq!(retrying.failure(), None);
    assert_eq!(retrying.progress_percent, 55);

    advance(1).await;

    let current = tracker.current().unwrap();
    assert_eq!(current.status, JobStatus::Completed);
    assert_eq!(current.progress_percent, 100);
    assert_eq!(current.completed_sub_items(), 3);
    assert_eq!(tracker.source_state(), SourceState::Stopped);
    assert_eq!(backend.submitted().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_job_failure_resubmits() {
    let backend = FakeBackend::new();
    backend.next_submission("gen-1");
    backend.next_submission("gen-2");
    let mut failed = job("gen-1", JobKind::VideoGeneration, JobStatus::Failed, 50);
    failed.error = Some("No scenes were successfully generated".into());
    backend.script("gen-1", vec![Step::Ok(failed)]);
    backend.script(
        "gen-2",
        vec![Step::Ok(completed_with_clips("gen-2", JobKind::VideoGeneration, 1))],
    );

    let mut tracker = JobTracker::new(polling_factory(&backend)).with_submitter(backend.clone());
    let request = json!({"scenes": [{"scene_number": 1}]});
    tracker.submit(JobKind::VideoGeneration, request.clone()).await.unwrap();
    advance(1).await;

    let current = tracker.current().unwrap();
    assert_eq!(current.failure(), Some(JobErrorKind::JobFailed));
    assert_eq!(current.error.as_deref(), Some("No scenes were successfully generated"));

    let new_id = tracker.retry().await.unwrap();
    assert_eq!(new_id, JobId::from("gen-2"));
    advance(1).await;

    assert_eq!(tracker.current().unwrap().status, JobStatus::Completed);
    let submitted = backend.submitted();
    assert_eq!(submitted.len(), 2);
    assert_eq!(submitted[1], (JobKind::VideoGeneration, request));
}

#[tokio::test]
async fn test_submission_error_is_returned_not_tracked() {
    let backend = FakeBackend::new();
    let mut tracker = JobTracker::new(polling_factory(&backend)).with_submitter(backend.clone());

    let err = tracker
        .submit(JobKind::Composition, json!({"clips": []}))
        .await
        .unwrap_err();

    match err {
        TrackerError::Submission(ApiError::SubmissionRejected(message)) => {
            assert_eq!(message, "Failed to start composition job");
        }
        other => panic!("Expected submission error, got {other:?}"),
    }
    assert_eq!(tracker.current(), None);
    assert_eq!(tracker.source_state(), SourceState::Idle);
}

#[tokio::test]
async fn test_submit_without_submitter() {
    let backend = FakeBackend::new();
    let mut tracker = JobTracker::new(polling_factory(&backend));
    assert!(matches!(
        tracker.submit(JobKind::Composition, json!({})).await,
        Err(TrackerError::NoSubmitter)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_dismiss_clears_failure() {
    let backend = FakeBackend::new();
    backend.script(
        "c-9",
        vec![Step::Ok(job("c-9", JobKind::Composition, JobStatus::Failed, 0))],
    );
    let mut tracker = JobTracker::new(polling_factory(&backend));

    tracker.attach(JobId::from("c-9"), JobKind::Composition);
    advance(1).await;
    assert_eq!(tracker.current().unwrap().failure(), Some(JobErrorKind::JobFailed));

    tracker.dismiss();
    assert_eq!(tracker.current(), None);
    assert!(matches!(tracker.retry().await, Err(TrackerError::NothingToRetry)));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_tracker_stops_source() {
    let backend = FakeBackend::new();
    let tracker_factory = polling_factory(&backend);
    {
        let mut tracker = JobTracker::new(tracker_factory);
        tracker.attach(JobId::from("c-5"), JobKind::Composition);
        advance(1).await;
    }
    advance(10).await;
    assert_eq!(backend.calls("c-5"), 1);
}
