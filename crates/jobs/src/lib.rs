/// Video generation job manager
///
/// Submission, status polling, durable recovery and cancellation for
/// backend video jobs. One poll task per prompt id, a fixed polling
/// interval, and events delivered over a crossbeam channel so callers
/// can drain them from any thread.
use chrono::Utc;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use api_client::{ApiClient, ApiError, ModelRef, RawJobStatus};

pub mod store;

pub use store::{app_data_dir, JsonFileStore, MemoryStore, PendingEntry, PendingStore, StoreError};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Lifecycle state of a generation job as seen by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Submitted,
    InProgress,
    Completed,
    Failed,
    NotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobEventKind {
    Submitted,
    InProgress,
    Completed { video_url: String },
    Failed { reason: String },
    NotFound,
    /// Polling gave up without a verdict from the backend; the pending
    /// entry is kept so a later recovery pass can pick the job up again.
    Stalled { reason: String },
}

impl JobEventKind {
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Submitted => JobStatus::Submitted,
            Self::InProgress | Self::Stalled { .. } => JobStatus::InProgress,
            Self::Completed { .. } => JobStatus::Completed,
            Self::Failed { .. } => JobStatus::Failed,
            Self::NotFound => JobStatus::NotFound,
        }
    }

    /// Whether this event ends the job's poll loop.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Submitted | Self::InProgress)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobEvent {
    pub prompt_id: String,
    pub kind: JobEventKind,
}

/// Polling parameters.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between status checks
    pub interval: Duration,
    /// Give up after this many checks; `None` polls until a verdict
    pub max_attempts: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

/// A job handed back from `submit`.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub prompt_id: String,
    pub prompt: String,
    pub model_id: i64,
    pub model_name: String,
}

/// What a recovery pass did with the cached pending entries.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Entries still in progress, poll loops restarted
    pub resumed: Vec<String>,
    /// Entries the backend had already resolved or forgotten
    pub discarded: Vec<String>,
    /// Entries kept because the backend was unreachable
    pub kept: Vec<String>,
    /// Entries skipped because a poll loop was already running
    pub already_active: Vec<String>,
}

/// Manages submitted jobs and their poll loops.
///
/// Cancellation flags live in `active`; a poll loop checks its flag
/// before every status request and again before applying a late result,
/// so a cancelled job never surfaces a terminal event.
pub struct JobRunner {
    client: Arc<ApiClient>,
    store: Arc<dyn PendingStore>,
    poll: PollConfig,
    active: Arc<Mutex<HashMap<String, Arc<AtomicBool>>>>,
    tx: Sender<JobEvent>,
    rx: Receiver<JobEvent>,
}

impl JobRunner {
    pub fn new(client: Arc<ApiClient>, store: Arc<dyn PendingStore>, poll: PollConfig) -> Self {
        let (tx, rx) = unbounded();
        Self {
            client,
            store,
            poll,
            active: Arc::new(Mutex::new(HashMap::new())),
            tx,
            rx,
        }
    }

    /// Event stream; clone freely, every receiver competes for events.
    pub fn events(&self) -> Receiver<JobEvent> {
        self.rx.clone()
    }

    pub fn is_active(&self, prompt_id: &str) -> bool {
        self.active.lock().contains_key(prompt_id)
    }

    /// Submit a generation request and start polling it.
    ///
    /// The prompt must be non-empty and a completed model must be
    /// selected before anything is sent to the backend.
    pub async fn submit(
        &self,
        prompt: &str,
        model: Option<&ModelRef>,
    ) -> Result<GenerationJob, JobError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(JobError::Validation("prompt must not be empty".into()));
        }
        let model = model.ok_or_else(|| JobError::Validation("no model selected".into()))?;
        if !model.is_completed() {
            return Err(JobError::Validation(format!(
                "model {:?} is not ready for generation",
                model.name
            )));
        }

        let prompt_id = self.client.start_video(prompt, model.id).await?;
        info!(%prompt_id, "video job submitted");

        self.store.set(
            &prompt_id,
            PendingEntry {
                prompt: prompt.to_string(),
                model_id: model.id,
                model_name: model.name.clone(),
                created_at: Utc::now(),
            },
        )?;
        self.emit(&prompt_id, JobEventKind::Submitted);
        self.spawn_poll(&prompt_id, true);

        Ok(GenerationJob {
            prompt_id,
            prompt: prompt.to_string(),
            model_id: model.id,
            model_name: model.name.clone(),
        })
    }

    /// Reconcile cached pending entries against the backend after a
    /// restart. Jobs that resolved while we were away are dropped
    /// silently; only jobs still running get their poll loops back.
    pub async fn recover(&self) -> Result<RecoveryReport, JobError> {
        let mut report = RecoveryReport::default();
        for (prompt_id, entry) in self.store.all()? {
            if self.is_active(&prompt_id) {
                report.already_active.push(prompt_id);
                continue;
            }
            match self.client.video_status(&prompt_id).await {
                Ok(RawJobStatus::InProgress) => {
                    debug!(%prompt_id, prompt = %entry.prompt, "resuming poll");
                    self.spawn_poll(&prompt_id, false);
                    report.resumed.push(prompt_id);
                }
                Ok(RawJobStatus::Done) | Ok(RawJobStatus::Failed) | Err(ApiError::NotFound) => {
                    self.store.delete(&prompt_id)?;
                    report.discarded.push(prompt_id);
                }
                Err(e) if e.is_transient() => {
                    warn!(%prompt_id, "backend unreachable during recovery: {e}");
                    report.kept.push(prompt_id);
                }
                Err(e) => {
                    warn!(%prompt_id, "dropping unrecoverable pending entry: {e}");
                    self.store.delete(&prompt_id)?;
                    report.discarded.push(prompt_id);
                }
            }
        }
        Ok(report)
    }

    /// Stop polling a job. The backend keeps running it; we just stop
    /// watching. Returns whether a poll loop was actually cancelled.
    pub fn cancel(&self, prompt_id: &str) -> bool {
        match self.active.lock().get(prompt_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for flag in self.active.lock().values() {
            flag.store(true, Ordering::SeqCst);
        }
    }

    fn emit(&self, prompt_id: &str, kind: JobEventKind) {
        let _ = self.tx.send(JobEvent {
            prompt_id: prompt_id.to_string(),
            kind,
        });
    }

    /// Start a poll loop for `prompt_id` unless one is already running.
    /// `fresh` marks a loop born from a new submission rather than
    /// recovery; a fresh loop stalls on the first transient error while
    /// a recovered loop keeps trying.
    fn spawn_poll(&self, prompt_id: &str, fresh: bool) -> bool {
        let cancel = Arc::new(AtomicBool::new(false));
        {
            let mut active = self.active.lock();
            if active.contains_key(prompt_id) {
                return false;
            }
            active.insert(prompt_id.to_string(), cancel.clone());
        }

        let client = self.client.clone();
        let store = self.store.clone();
        let poll = self.poll.clone();
        let active = self.active.clone();
        let tx = self.tx.clone();
        let prompt_id = prompt_id.to_string();

        tokio::spawn(async move {
            poll_loop(&client, &*store, &poll, &tx, &prompt_id, fresh, &cancel).await;
            active.lock().remove(&prompt_id);
        });
        true
    }
}

async fn poll_loop(
    client: &ApiClient,
    store: &dyn PendingStore,
    poll: &PollConfig,
    tx: &Sender<JobEvent>,
    prompt_id: &str,
    fresh: bool,
    cancel: &AtomicBool,
) {
    let emit = |kind: JobEventKind| {
        let _ = tx.send(JobEvent {
            prompt_id: prompt_id.to_string(),
            kind,
        });
    };
    let mut attempts = 0u32;

    loop {
        if cancel.load(Ordering::SeqCst) {
            debug!(%prompt_id, "poll cancelled");
            return;
        }
        if let Some(max) = poll.max_attempts {
            if attempts >= max {
                emit(JobEventKind::Stalled {
                    reason: format!("no verdict after {max} status checks"),
                });
                return;
            }
        }
        attempts += 1;

        match client.video_status(prompt_id).await {
            Ok(RawJobStatus::InProgress) => {
                emit(JobEventKind::InProgress);
            }
            Ok(RawJobStatus::Done) => {
                // Fetch the result before surfacing completion; a job
                // without a result URL is not done from the caller's
                // point of view.
                match client.video_result(prompt_id).await {
                    Ok(video_url) => {
                        if cancel.load(Ordering::SeqCst) {
                            debug!(%prompt_id, "poll cancelled, dropping late result");
                            return;
                        }
                        if let Err(e) = store.delete(prompt_id) {
                            warn!(%prompt_id, "failed to clear pending entry: {e}");
                        }
                        info!(%prompt_id, %video_url, "video job completed");
                        emit(JobEventKind::Completed { video_url });
                        return;
                    }
                    Err(e) if e.is_transient() => {
                        warn!(%prompt_id, "result fetch failed, will retry: {e}");
                    }
                    Err(e) => {
                        if let Err(e) = store.delete(prompt_id) {
                            warn!(%prompt_id, "failed to clear pending entry: {e}");
                        }
                        emit(JobEventKind::Failed {
                            reason: format!("result fetch failed: {e}"),
                        });
                        return;
                    }
                }
            }
            Ok(RawJobStatus::Failed) => {
                if let Err(e) = store.delete(prompt_id) {
                    warn!(%prompt_id, "failed to clear pending entry: {e}");
                }
                emit(JobEventKind::Failed {
                    reason: "backend reported failure".to_string(),
                });
                return;
            }
            Err(ApiError::NotFound) => {
                if let Err(e) = store.delete(prompt_id) {
                    warn!(%prompt_id, "failed to clear pending entry: {e}");
                }
                emit(JobEventKind::NotFound);
                return;
            }
            Err(e) if e.is_transient() => {
                if fresh {
                    // A job we just submitted has nothing cached worth
                    // protecting; stall now and let recovery retry.
                    emit(JobEventKind::Stalled {
                        reason: e.to_string(),
                    });
                    return;
                }
                warn!(%prompt_id, "status check failed, will retry: {e}");
            }
            Err(e) => {
                if let Err(e) = store.delete(prompt_id) {
                    warn!(%prompt_id, "failed to clear pending entry: {e}");
                }
                emit(JobEventKind::Failed {
                    reason: e.to_string(),
                });
                return;
            }
        }

        tokio::time::sleep(poll.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::ApiConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn runner_for(server: &MockServer, store: Arc<dyn PendingStore>) -> JobRunner {
        let client = Arc::new(ApiClient::new(ApiConfig::new(server.uri())).unwrap());
        let poll = PollConfig {
            interval: Duration::from_millis(30),
            max_attempts: Some(50),
        };
        JobRunner::new(client, store, poll)
    }

    fn completed_model() -> ModelRef {
        serde_json::from_str(r#"{"id": 7, "name": "iu", "status": "completed"}"#).unwrap()
    }

    async fn mount_start(server: &MockServer, prompt_id: &str) {
        Mock::given(method("POST"))
            .and(path("/api/video/start"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"promptId": prompt_id})),
            )
            .mount(server)
            .await;
    }

    fn drain_until_terminal(rx: &Receiver<JobEvent>, timeout: Duration) -> Vec<JobEvent> {
        let deadline = std::time::Instant::now() + timeout;
        let mut events = Vec::new();
        while std::time::Instant::now() < deadline {
            if let Ok(ev) = rx.recv_timeout(Duration::from_millis(50)) {
                let terminal = ev.kind.is_terminal();
                events.push(ev);
                if terminal {
                    break;
                }
            }
        }
        events
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn submit_polls_to_completion() {
        let server = MockServer::start().await;
        mount_start(&server, "abc123").await;
        // Two in-progress responses, then done; exhausted mocks fall
        // through to the next matching one.
        Mock::given(method("GET"))
            .and(path("/api/video/status/abc123"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "processing"})),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/video/status/abc123"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "done"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/video/result/abc123"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!("https://x/abc123.mp4")),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let runner = runner_for(&server, store.clone());
        let rx = runner.events();

        let job = runner
            .submit("sunset over the ocean", Some(&completed_model()))
            .await
            .unwrap();
        assert_eq!(job.prompt_id, "abc123");
        assert_eq!(store.all().unwrap().len(), 1);

        let events = drain_until_terminal(&rx, Duration::from_secs(5));
        assert_eq!(events[0].kind, JobEventKind::Submitted);
        let terminal: Vec<_> = events
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    JobEventKind::Completed { .. } | JobEventKind::Failed { .. }
                )
            })
            .collect();
        assert_eq!(terminal.len(), 1);
        assert_eq!(
            terminal[0].kind,
            JobEventKind::Completed {
                video_url: "https://x/abc123.mp4".to_string()
            }
        );
        // Entry cleared once the result landed
        assert!(store.all().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn submit_rejects_bad_input_without_touching_backend() {
        let server = MockServer::start().await;
        let runner = runner_for(&server, Arc::new(MemoryStore::new()));

        assert!(matches!(
            runner.submit("   ", Some(&completed_model())).await,
            Err(JobError::Validation(_))
        ));
        assert!(matches!(
            runner.submit("sunset", None).await,
            Err(JobError::Validation(_))
        ));

        let training: ModelRef =
            serde_json::from_str(r#"{"id": 2, "name": "wip", "status": "training"}"#).unwrap();
        assert!(matches!(
            runner.submit("sunset", Some(&training)).await,
            Err(JobError::Validation(_))
        ));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_job_clears_entry_and_reports_once() {
        let server = MockServer::start().await;
        mount_start(&server, "bad1").await;
        Mock::given(method("GET"))
            .and(path("/api/video/status/bad1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "failed"})),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let runner = runner_for(&server, store.clone());
        let rx = runner.events();
        runner.submit("sunset", Some(&completed_model())).await.unwrap();

        let events = drain_until_terminal(&rx, Duration::from_secs(5));
        assert!(matches!(
            events.last().unwrap().kind,
            JobEventKind::Failed { .. }
        ));
        assert_eq!(events.last().unwrap().kind.status(), JobStatus::Failed);
        assert!(store.all().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn forgotten_job_surfaces_not_found() {
        let server = MockServer::start().await;
        mount_start(&server, "gone1").await;
        Mock::given(method("GET"))
            .and(path("/api/video/status/gone1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let runner = runner_for(&server, store.clone());
        let rx = runner.events();
        runner.submit("sunset", Some(&completed_model())).await.unwrap();

        let events = drain_until_terminal(&rx, Duration::from_secs(5));
        assert_eq!(events.last().unwrap().kind, JobEventKind::NotFound);
        assert!(store.all().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_stops_polling_without_terminal_event() {
        let server = MockServer::start().await;
        mount_start(&server, "slow1").await;
        Mock::given(method("GET"))
            .and(path("/api/video/status/slow1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "running"})),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let runner = runner_for(&server, store.clone());
        let rx = runner.events();
        runner.submit("sunset", Some(&completed_model())).await.unwrap();
        assert!(runner.is_active("slow1"));
        assert!(runner.cancel("slow1"));

        // Loop exits on its next flag check; wait for it to deregister.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while runner.is_active("slow1") && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!runner.is_active("slow1"));

        // Pending entry survives a cancel; only verdicts clear it.
        assert_eq!(store.all().unwrap().len(), 1);
        while let Ok(ev) = rx.try_recv() {
            assert!(matches!(
                ev.kind,
                JobEventKind::Submitted | JobEventKind::InProgress
            ));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn recovery_resumes_running_and_discards_resolved() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/video/status/live1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "running"})),
            )
            .up_to_n_times(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/video/status/live1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "done"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/video/result/live1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!("https://x/live1.mp4")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/video/status/done1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "done"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/video/status/lost1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        for id in ["live1", "done1", "lost1"] {
            store
                .set(
                    id,
                    PendingEntry {
                        prompt: "sunset".into(),
                        model_id: 7,
                        model_name: "iu".into(),
                        created_at: Utc::now(),
                    },
                )
                .unwrap();
        }

        let runner = runner_for(&server, store.clone());
        let rx = runner.events();
        let report = runner.recover().await.unwrap();
        assert_eq!(report.resumed, vec!["live1"]);
        let mut discarded = report.discarded.clone();
        discarded.sort();
        assert_eq!(discarded, vec!["done1", "lost1"]);

        // Resolved-while-away jobs vanish without completion events;
        // the resumed one polls through to its result.
        let events = drain_until_terminal(&rx, Duration::from_secs(5));
        for ev in &events {
            assert_eq!(ev.prompt_id, "live1");
        }
        assert_eq!(
            events.last().unwrap().kind,
            JobEventKind::Completed {
                video_url: "https://x/live1.mp4".to_string()
            }
        );
        assert!(store.all().unwrap().is_empty());
    }

    fn pending(prompt: &str) -> PendingEntry {
        PendingEntry {
            prompt: prompt.to_string(),
            model_id: 7,
            model_name: "iu".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fresh_transport_error_stalls_and_keeps_entry() {
        let server = MockServer::start().await;
        mount_start(&server, "stall1").await;
        // Status response arrives after the client timeout, so the poll
        // sees a transport error on a freshly submitted job.
        Mock::given(method("GET"))
            .and(path("/api/video/status/stall1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "running"}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client =
            Arc::new(ApiClient::new(ApiConfig::new(server.uri()).with_timeout(1)).unwrap());
        let store = Arc::new(MemoryStore::new());
        let poll = PollConfig {
            interval: Duration::from_millis(30),
            max_attempts: Some(50),
        };
        let runner = JobRunner::new(client, store.clone(), poll);
        let rx = runner.events();
        runner.submit("sunset", Some(&completed_model())).await.unwrap();

        let events = drain_until_terminal(&rx, Duration::from_secs(10));
        assert!(matches!(
            events.last().unwrap().kind,
            JobEventKind::Stalled { .. }
        ));
        // The entry survives so a later recovery pass can retry.
        assert_eq!(store.all().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn recovered_job_keeps_polling_through_transport_errors() {
        let server = MockServer::start().await;
        // First check belongs to recover(), the second times out, the
        // third resolves; exhausted mocks fall through in mount order.
        Mock::given(method("GET"))
            .and(path("/api/video/status/flaky1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "running"})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/video/status/flaky1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "running"}))
                    .set_delay(Duration::from_secs(5)),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/video/status/flaky1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "done"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/video/result/flaky1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!("https://x/flaky1.mp4")),
            )
            .mount(&server)
            .await;

        let client =
            Arc::new(ApiClient::new(ApiConfig::new(server.uri()).with_timeout(1)).unwrap());
        let store = Arc::new(MemoryStore::new());
        store.set("flaky1", pending("sunset")).unwrap();
        let poll = PollConfig {
            interval: Duration::from_millis(30),
            max_attempts: Some(50),
        };
        let runner = JobRunner::new(client, store.clone(), poll);
        let rx = runner.events();

        let report = runner.recover().await.unwrap();
        assert_eq!(report.resumed, vec!["flaky1"]);

        // The transport error does not stall a recovered job; it rides
        // it out and still reaches the verdict.
        let events = drain_until_terminal(&rx, Duration::from_secs(10));
        assert!(events
            .iter()
            .all(|e| !matches!(e.kind, JobEventKind::Stalled { .. })));
        assert_eq!(
            events.last().unwrap().kind,
            JobEventKind::Completed {
                video_url: "https://x/flaky1.mp4".to_string()
            }
        );
        assert!(store.all().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn recovery_keeps_entries_when_backend_unreachable() {
        // Bind then drop a listener so the port refuses connections.
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let client = Arc::new(
            ApiClient::new(ApiConfig::new(format!("http://{addr}")).with_timeout(1)).unwrap(),
        );
        let store = Arc::new(MemoryStore::new());
        store.set("dark1", pending("sunset")).unwrap();
        let runner = JobRunner::new(client, store.clone(), PollConfig::default());

        let report = runner.recover().await.unwrap();
        assert_eq!(report.kept, vec!["dark1"]);
        assert!(report.resumed.is_empty());
        assert!(report.discarded.is_empty());
        assert!(!runner.is_active("dark1"));
        // The entry waits for a pass that can actually reach the backend.
        assert_eq!(store.all().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn recovery_is_idempotent_per_prompt_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/video/status/live2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "running"})),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        store
            .set(
                "live2",
                PendingEntry {
                    prompt: "sunset".into(),
                    model_id: 7,
                    model_name: "iu".into(),
                    created_at: Utc::now(),
                },
            )
            .unwrap();

        let runner = runner_for(&server, store.clone());
        let first = runner.recover().await.unwrap();
        assert_eq!(first.resumed, vec!["live2"]);

        let second = runner.recover().await.unwrap();
        assert!(second.resumed.is_empty());
        assert_eq!(second.already_active, vec!["live2"]);

        runner.cancel_all();
    }
}
