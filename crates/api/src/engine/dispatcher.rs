//! Job dispatcher: the single owner of the queue and the correlator.
//!
//! Every mutation of the queue, the status channels and the parked stream
//! receivers happens under one `Mutex`. Critical sections only touch those
//! maps and push onto unbounded channels; scoring, digesting and file I/O
//! run with the lock released.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use testu_core::agents::AgentRoster;
use testu_core::collaborators::{Digester, JobBuilder, Scorer};
use testu_core::correlator::{status_channel, Correlator, StatusReceiver};
use testu_core::error::CoreError;
use testu_core::job::{Job, JobId, JobOutcome, JobRequest, JobState};
use testu_core::queue::JobQueue;
use testu_core::report::Report;
use testu_core::status::{StatusEvent, StatusKind};
use testu_pipeline::{ScriptMerger, SummaryDigester, TallyScorer};
use testu_store::ReportStore;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::task::TaskTracker;

use crate::error::{AppError, AppResult};

/// Reason attached to the replayed terminal event of a failed job.
const FAILED_REPLAY_REASON: &str = "processing of the report failed";

/// What a submitter gets back after a successful submission.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub job_id: JobId,
    pub status_url: String,
    pub digest_url: String,
}

/// A report that passed validation and matches an assigned job.
///
/// Produced by [`Dispatcher::accept_report`] and consumed by
/// [`Dispatcher::process_report`].
#[derive(Debug)]
pub struct AcceptedReport {
    job_id: JobId,
    report: Report,
}

impl AcceptedReport {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn report(&self) -> &Report {
        &self.report
    }
}

/// Point-in-time counters, reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub pending: usize,
    pub assigned: usize,
    pub completed: usize,
    pub failed: usize,
    pub open_channels: usize,
    pub parked_streams: usize,
}

#[derive(Debug, Default)]
struct DispatchState {
    queue: JobQueue,
    correlator: Correlator,
    /// Receivers created at submission, held until the submitter opens the
    /// status stream.
    parked: HashMap<JobId, StatusReceiver>,
    /// Jobs whose report is being processed.
    reporting: HashSet<JobId>,
}

impl DispatchState {
    /// Push a status event; a missing or disconnected submitter is logged
    /// and otherwise ignored.
    fn notify(&mut self, job_id: JobId, kind: StatusKind) {
        let event = StatusEvent::new(job_id, kind);
        let name = event.event_name();
        match self.correlator.notify(job_id, event) {
            Ok(()) => tracing::debug!(%job_id, event = name, "Status event pushed"),
            Err(CoreError::ChannelGone(_)) => {
                tracing::info!(%job_id, event = name, "Submitter disconnected, status event skipped");
            }
            Err(e) => tracing::debug!(%job_id, event = name, error = %e, "Status event skipped"),
        }
    }

    /// Push the terminal event, release the channel and move the job to its
    /// terminal state.
    fn finish(
        &mut self,
        job_id: JobId,
        kind: StatusKind,
        outcome: JobOutcome,
    ) -> Result<(), CoreError> {
        self.notify(job_id, kind);
        if let Err(e) = self.correlator.close(job_id) {
            tracing::debug!(%job_id, error = %e, "No status channel to close");
        }
        self.parked.remove(&job_id);
        self.reporting.remove(&job_id);
        self.queue.mark_terminal(job_id, outcome).map(|_| ())
    }
}

/// Owns the dispatch state and drives reports through the pipeline.
pub struct Dispatcher {
    state: Mutex<DispatchState>,
    agents: AgentRoster,
    builder: Arc<dyn JobBuilder>,
    scorer: Arc<dyn Scorer>,
    digester: Arc<dyn Digester>,
    store: Arc<dyn ReportStore>,
    app_url: String,
    /// Background report processing, drained at shutdown.
    tasks: TaskTracker,
}

impl Dispatcher {
    /// Create a dispatcher with the stand-in pipeline collaborators.
    ///
    /// `app_url` is the public base URL (no trailing `/`) used for the links
    /// handed to agents and submitters.
    pub fn new(agents: AgentRoster, app_url: impl Into<String>, store: Arc<dyn ReportStore>) -> Self {
        let app_url = app_url.into();
        let builder = ScriptMerger::with_default_script(format!("{app_url}/api/report"));
        Self {
            state: Mutex::new(DispatchState::default()),
            agents,
            builder: Arc::new(builder),
            scorer: Arc::new(TallyScorer),
            digester: Arc::new(SummaryDigester),
            store,
            app_url,
            tasks: TaskTracker::new(),
        }
    }

    /// Replace the batch+merge step.
    pub fn with_builder(mut self, builder: Arc<dyn JobBuilder>) -> Self {
        self.builder = builder;
        self
    }

    /// Replace the scoring step.
    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Replace the digest step.
    pub fn with_digester(mut self, digester: Arc<dyn Digester>) -> Self {
        self.digester = digester;
        self
    }

    async fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().await
    }

    pub fn digest_url(&self, job_id: JobId) -> String {
        format!("{}/reports/{job_id}.html", self.app_url)
    }

    pub fn status_url(&self, job_id: JobId) -> String {
        format!("{}/status?jobID={job_id}", self.app_url)
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Enqueue a job and open its status channel.
    ///
    /// The job body is built with the lock released. The channel's receiver
    /// is parked until the submitter calls [`open_stream`](Self::open_stream),
    /// so no event is lost in between.
    pub async fn submit(&self, request: JobRequest) -> Result<Submission, CoreError> {
        request.validate()?;

        let (job_id, created_at) = self.lock().await.queue.reserve_id();
        let body = self.builder.build(job_id, &request, created_at)?;

        let mut state = self.lock().await;
        state.queue.enqueue(job_id, request, body, created_at);
        let (sink, receiver) = status_channel();
        state.correlator.register(job_id, sink)?;
        state.parked.insert(job_id, receiver);
        state.notify(job_id, StatusKind::Received);
        let pending = state.queue.pending_count();
        drop(state);

        tracing::info!(%job_id, pending, "Job submitted");
        Ok(Submission {
            job_id,
            status_url: self.status_url(job_id),
            digest_url: self.digest_url(job_id),
        })
    }

    // -----------------------------------------------------------------------
    // Agent protocol
    // -----------------------------------------------------------------------

    /// Hand the oldest pending job to `agent`.
    ///
    /// `Ok(None)` means there is nothing to do. Never waits for work.
    pub async fn poll(&self, agent: &str) -> Result<Option<Job>, CoreError> {
        if let Err(e) = self.agents.authorize(agent) {
            tracing::warn!(agent, "Job request made by unauthorized agent");
            return Err(e);
        }
        tracing::debug!(agent, "Job request received");

        let mut state = self.lock().await;
        let Some(job) = state.queue.take_next(agent) else {
            return Ok(None);
        };
        state.notify(
            job.id,
            StatusKind::Assigned {
                agent: agent.to_string(),
            },
        );
        drop(state);

        tracing::info!(job_id = %job.id, agent, "Job assigned to agent");
        Ok(Some(job))
    }

    /// Validate a raw report and claim its job for processing.
    ///
    /// Fails with `InvalidReport` when a required field is missing and with
    /// `UnknownJob` when the id does not name an assigned job that is not
    /// already being processed. Neither failure has side effects.
    pub async fn accept_report(&self, value: serde_json::Value) -> Result<AcceptedReport, CoreError> {
        let mut report = Report::from_value(value)?;
        let job_id = report.job_id()?;

        let mut state = self.lock().await;
        if !state.queue.is_assigned(job_id) || !state.reporting.insert(job_id) {
            return Err(CoreError::UnknownJob(job_id.to_string()));
        }
        drop(state);

        // Stored files and digest links use the canonical id form.
        report.insert("id", json!(job_id));
        tracing::info!(
            %job_id,
            agent = report.agent().unwrap_or("unknown"),
            "Valid report received",
        );
        Ok(AcceptedReport { job_id, report })
    }

    /// Score, persist and digest an accepted report, pushing each step to
    /// the submitter, then close the channel and finish the job.
    ///
    /// Persistence still completes when the submitter has gone away.
    pub async fn process_report(&self, accepted: AcceptedReport) -> AppResult<()> {
        let AcceptedReport { job_id, mut report } = accepted;
        self.lock().await.notify(job_id, StatusKind::ReportReceived);

        match self.run_pipeline(job_id, &mut report).await {
            Ok(digest_url) => {
                self.lock()
                    .await
                    .finish(job_id, StatusKind::Digested { digest_url }, JobOutcome::Completed)?;
                tracing::info!(%job_id, "Job completed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(%job_id, error = %e, "Report processing failed");
                let reason = e.to_string();
                if let Err(mark) = self.lock().await.finish(
                    job_id,
                    StatusKind::Failed { reason },
                    JobOutcome::Failed,
                ) {
                    tracing::warn!(%job_id, error = %mark, "Could not mark job failed");
                }
                Err(e)
            }
        }
    }

    /// Validate and fully process a report in one call.
    pub async fn report(&self, value: serde_json::Value) -> AppResult<JobId> {
        let accepted = self.accept_report(value).await?;
        let job_id = accepted.job_id();
        self.process_report(accepted).await?;
        Ok(job_id)
    }

    /// Process an accepted report on a tracked background task.
    ///
    /// Failures are logged and pushed to the submitter by
    /// [`process_report`](Self::process_report).
    pub fn spawn_processing(self: &Arc<Self>, accepted: AcceptedReport) {
        let dispatcher = Arc::clone(self);
        self.tasks.spawn(async move {
            let _ = dispatcher.process_report(accepted).await;
        });
    }

    /// Stop tracking new work and wait for in-flight report processing.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn drain_processing(&self, timeout: Duration) -> bool {
        self.tasks.close();
        let in_flight = self.tasks.len();
        if in_flight > 0 {
            tracing::info!(in_flight, "Waiting for report processing to finish");
        }
        tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok()
    }

    async fn run_pipeline(&self, job_id: JobId, report: &mut Report) -> Result<String, AppError> {
        self.scorer.score(report)?;
        self.store.save_report(report).await?;
        self.lock().await.notify(job_id, StatusKind::Scored);

        let digest = self.digester.digest(report).await?;
        self.store.save_digest(&job_id.to_string(), &digest).await?;
        Ok(self.digest_url(job_id))
    }

    // -----------------------------------------------------------------------
    // Status streams
    // -----------------------------------------------------------------------

    /// Attach the submitter to the job's status events.
    ///
    /// - The receiver parked at submission is handed out once.
    /// - A second attach while that stream is open is a
    ///   `DuplicateRegistration`.
    /// - After a disconnect, a fresh channel replays the current state.
    /// - A finished job yields a stream with only its terminal event.
    pub async fn open_stream(&self, job_id: JobId) -> Result<StatusReceiver, CoreError> {
        let mut state = self.lock().await;
        if let Some(receiver) = state.parked.remove(&job_id) {
            return Ok(receiver);
        }

        let job = state
            .queue
            .get(job_id)
            .ok_or_else(|| CoreError::UnknownJob(job_id.to_string()))?;
        let job_state = job.state;
        let agent = job.agent.clone();

        match job_state {
            JobState::Pending | JobState::Assigned => {
                let (sink, receiver) = status_channel();
                state.correlator.register(job_id, sink)?;
                state.notify(job_id, StatusKind::Received);
                if let Some(agent) = agent {
                    state.notify(job_id, StatusKind::Assigned { agent });
                }
                tracing::info!(%job_id, "Status stream reattached");
                Ok(receiver)
            }
            JobState::Completed | JobState::Failed => {
                drop(state);
                let kind = if job_state == JobState::Completed {
                    StatusKind::Digested {
                        digest_url: self.digest_url(job_id),
                    }
                } else {
                    StatusKind::Failed {
                        reason: FAILED_REPLAY_REASON.to_string(),
                    }
                };
                let (sink, receiver) = status_channel();
                // The receiver is held here, so this send cannot fail.
                let _ = sink.send(StatusEvent::new(job_id, kind));
                Ok(receiver)
            }
        }
    }

    /// Drop channels whose submitter disconnected. Returns how many.
    pub async fn reap_closed_channels(&self) -> usize {
        let reaped = self.lock().await.correlator.reap_closed();
        for job_id in &reaped {
            tracing::debug!(%job_id, "Released status channel of disconnected submitter");
        }
        reaped.len()
    }

    /// Release every channel and parked receiver so open streams end.
    pub async fn close_all_channels(&self) -> usize {
        let mut state = self.lock().await;
        state.parked.clear();
        let count = state.correlator.close_all();
        tracing::info!(count, "Closed all status channels");
        count
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn job(&self, job_id: JobId) -> Option<Job> {
        self.lock().await.queue.get(job_id).cloned()
    }

    pub async fn stats(&self) -> DispatchStats {
        let state = self.lock().await;
        DispatchStats {
            pending: state.queue.pending_count(),
            assigned: state.queue.assigned_count(),
            completed: state.queue.finished_count(JobOutcome::Completed),
            failed: state.queue.finished_count(JobOutcome::Failed),
            open_channels: state.correlator.len(),
            parked_streams: state.parked.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{OnceLock, Weak};

    use super::*;
    use assert_matches::assert_matches;
    use testu_core::status::{
        EVENT_ASSIGNED, EVENT_DIGESTED, EVENT_FAILED, EVENT_RECEIVED, EVENT_REPORT_RECEIVED,
        EVENT_SCORED,
    };
    use testu_store::FsReportStore;

    const APP_URL: &str = "http://localhost:3008/testu";

    struct FailingDigester;

    #[async_trait::async_trait]
    impl Digester for FailingDigester {
        async fn digest(&self, _report: &Report) -> Result<String, CoreError> {
            Err(CoreError::Internal("digest template missing".into()))
        }
    }

    fn dispatcher(dir: &tempfile::TempDir) -> Dispatcher {
        let store = Arc::new(FsReportStore::new(dir.path()));
        Dispatcher::new(AgentRoster::default(), APP_URL, store)
    }

    fn request() -> JobRequest {
        JobRequest::new("http://example.com", "Example home")
    }

    /// The report an agent would send back for `job`.
    fn report_for(job: &Job) -> serde_json::Value {
        let mut report = job.body.clone();
        report["jobData"] = json!({"agent": job.agent, "endTime": "2026-10-17T10:00:00Z"});
        report["acts"] = json!([{"type": "test", "result": {"totals": [1, 2, 0, 0]}}]);
        report
    }

    async fn drain(receiver: &mut StatusReceiver) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Some(event) = receiver.recv().await {
            names.push(event.event_name());
        }
        names
    }

    // -- submission --

    #[tokio::test]
    async fn submit_returns_links_and_parks_a_stream() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(&dir);

        let submission = dispatcher.submit(request()).await.unwrap();
        let id = submission.job_id;

        assert_eq!(
            submission.status_url,
            format!("{APP_URL}/status?jobID={id}")
        );
        assert_eq!(
            submission.digest_url,
            format!("{APP_URL}/reports/{id}.html")
        );
        let stats = dispatcher.stats().await;
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.open_channels, 1);
        assert_eq!(stats.parked_streams, 1);
    }

    #[tokio::test]
    async fn invalid_submission_is_rejected_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(&dir);

        assert_matches!(
            dispatcher
                .submit(JobRequest::new("ftp://example.com", "x"))
                .await,
            Err(CoreError::InvalidSubmission(_))
        );
        assert_eq!(dispatcher.stats().await.pending, 0);
        assert_eq!(dispatcher.stats().await.open_channels, 0);
    }

    // -- polling --

    #[tokio::test]
    async fn unauthorized_agent_gets_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(&dir);
        dispatcher.submit(request()).await.unwrap();

        assert_matches!(
            dispatcher.poll("guestAgent").await,
            Err(CoreError::Unauthorized { .. })
        );
        assert_eq!(dispatcher.stats().await.pending, 1);
    }

    #[tokio::test]
    async fn empty_queue_polls_none() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(&dir);
        assert!(dispatcher.poll("TXRIWin").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oldest_job_is_assigned_first() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(&dir);
        let first = dispatcher.submit(request()).await.unwrap().job_id;
        let second = dispatcher.submit(request()).await.unwrap().job_id;

        assert_eq!(dispatcher.poll("TXRIWin").await.unwrap().unwrap().id, first);
        assert_eq!(dispatcher.poll("RIWSMac").await.unwrap().unwrap().id, second);
        assert!(dispatcher.poll("PoolMac").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_polls_never_share_a_job() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Arc::new(dispatcher(&dir));
        dispatcher.submit(request()).await.unwrap();

        let a = tokio::spawn({
            let d = Arc::clone(&dispatcher);
            async move { d.poll("TXRIWin").await.unwrap() }
        });
        let b = tokio::spawn({
            let d = Arc::clone(&dispatcher);
            async move { d.poll("RIWSMac").await.unwrap() }
        });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert_eq!(a.is_some() as u8 + b.is_some() as u8, 1);
        assert_eq!(dispatcher.stats().await.assigned, 1);
    }

    // -- reports --

    #[tokio::test]
    async fn full_flow_pushes_every_step_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(&dir);
        let id = dispatcher.submit(request()).await.unwrap().job_id;
        let mut receiver = dispatcher.open_stream(id).await.unwrap();

        let job = dispatcher.poll("TXRIWin").await.unwrap().unwrap();
        assert_eq!(dispatcher.report(report_for(&job)).await.unwrap(), id);

        assert_eq!(
            drain(&mut receiver).await,
            vec![
                EVENT_RECEIVED,
                EVENT_ASSIGNED,
                EVENT_REPORT_RECEIVED,
                EVENT_SCORED,
                EVENT_DIGESTED,
            ]
        );
        let stats = dispatcher.stats().await;
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.open_channels, 0);
        assert!(dir.path().join(format!("{id}.json")).is_file());
        assert!(dir.path().join(format!("{id}.html")).is_file());
    }

    #[tokio::test]
    async fn invalid_report_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(&dir);
        let id = dispatcher.submit(request()).await.unwrap().job_id;
        let job = dispatcher.poll("TXRIWin").await.unwrap().unwrap();

        let mut report = report_for(&job);
        report.as_object_mut().unwrap().remove("acts");
        assert_matches!(
            dispatcher.accept_report(report).await,
            Err(CoreError::InvalidReport { missing }) if missing == vec!["acts".to_string()]
        );

        assert_eq!(dispatcher.job(id).await.unwrap().state, JobState::Assigned);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn report_for_unassigned_job_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(&dir);
        dispatcher.submit(request()).await.unwrap();
        let job = dispatcher.poll("TXRIWin").await.unwrap().unwrap();

        let mut report = report_for(&job);
        report["id"] = json!("12345");
        assert_matches!(
            dispatcher.accept_report(report).await,
            Err(CoreError::UnknownJob(_))
        );
    }

    #[tokio::test]
    async fn second_report_for_a_job_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(&dir);
        dispatcher.submit(request()).await.unwrap();
        let job = dispatcher.poll("TXRIWin").await.unwrap().unwrap();

        let accepted = dispatcher.accept_report(report_for(&job)).await.unwrap();
        assert_matches!(
            dispatcher.accept_report(report_for(&job)).await,
            Err(CoreError::UnknownJob(_))
        );
        dispatcher.process_report(accepted).await.unwrap();
        assert_matches!(
            dispatcher.accept_report(report_for(&job)).await,
            Err(CoreError::UnknownJob(_))
        );
    }

    #[tokio::test]
    async fn processing_completes_after_submitter_disconnects() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(&dir);
        let id = dispatcher.submit(request()).await.unwrap().job_id;
        drop(dispatcher.open_stream(id).await.unwrap());

        let job = dispatcher.poll("TXRIWin").await.unwrap().unwrap();
        dispatcher.report(report_for(&job)).await.unwrap();

        assert_eq!(dispatcher.job(id).await.unwrap().state, JobState::Completed);
        assert!(dir.path().join(format!("{id}.html")).is_file());
        assert_eq!(dispatcher.stats().await.open_channels, 0);
    }

    #[tokio::test]
    async fn pipeline_failure_pushes_failed_and_marks_job() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(&dir).with_digester(Arc::new(FailingDigester));
        let id = dispatcher.submit(request()).await.unwrap().job_id;
        let mut receiver = dispatcher.open_stream(id).await.unwrap();

        let job = dispatcher.poll("TXRIWin").await.unwrap().unwrap();
        assert!(dispatcher.report(report_for(&job)).await.is_err());

        assert_eq!(
            drain(&mut receiver).await,
            vec![
                EVENT_RECEIVED,
                EVENT_ASSIGNED,
                EVENT_REPORT_RECEIVED,
                EVENT_SCORED,
                EVENT_FAILED,
            ]
        );
        assert_eq!(dispatcher.job(id).await.unwrap().state, JobState::Failed);
    }

    // -- streams --

    #[tokio::test]
    async fn second_attach_while_open_is_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(&dir);
        let id = dispatcher.submit(request()).await.unwrap().job_id;

        let _receiver = dispatcher.open_stream(id).await.unwrap();
        assert_matches!(
            dispatcher.open_stream(id).await,
            Err(CoreError::DuplicateRegistration(_))
        );
    }

    #[tokio::test]
    async fn reattach_replays_current_state() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(&dir);
        let id = dispatcher.submit(request()).await.unwrap().job_id;
        drop(dispatcher.open_stream(id).await.unwrap());
        dispatcher.poll("RIWSMac").await.unwrap().unwrap();

        let mut receiver = dispatcher.open_stream(id).await.unwrap();
        let received = receiver.recv().await.unwrap();
        let assigned = receiver.recv().await.unwrap();
        assert_eq!(received.kind, StatusKind::Received);
        assert_eq!(
            assigned.kind,
            StatusKind::Assigned {
                agent: "RIWSMac".into()
            }
        );
    }

    #[tokio::test]
    async fn finished_job_stream_holds_only_the_terminal_event() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(&dir);
        let id = dispatcher.submit(request()).await.unwrap().job_id;
        let job = dispatcher.poll("TXRIWin").await.unwrap().unwrap();
        dispatcher.report(report_for(&job)).await.unwrap();

        let mut receiver = dispatcher.open_stream(id).await.unwrap();
        assert_eq!(drain(&mut receiver).await, vec![EVENT_DIGESTED]);
    }

    #[tokio::test]
    async fn unknown_job_stream_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(&dir);
        assert_matches!(
            dispatcher.open_stream("42".parse().unwrap()).await,
            Err(CoreError::UnknownJob(_))
        );
    }

    #[tokio::test]
    async fn close_all_ends_parked_and_open_streams() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(&dir);
        let first = dispatcher.submit(request()).await.unwrap().job_id;
        dispatcher.submit(request()).await.unwrap();
        let mut receiver = dispatcher.open_stream(first).await.unwrap();

        assert_eq!(dispatcher.close_all_channels().await, 2);
        assert_eq!(drain(&mut receiver).await, vec![EVENT_RECEIVED]);
        assert_eq!(dispatcher.stats().await.parked_streams, 0);
    }

    // -- background processing --

    #[tokio::test]
    async fn drain_waits_for_accepted_reports() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Arc::new(dispatcher(&dir));
        let id = dispatcher.submit(request()).await.unwrap().job_id;
        let job = dispatcher.poll("PoolMac").await.unwrap().unwrap();

        let accepted = dispatcher.accept_report(report_for(&job)).await.unwrap();
        dispatcher.spawn_processing(accepted);

        assert!(dispatcher.drain_processing(Duration::from_secs(5)).await);
        assert_eq!(dispatcher.job(id).await.unwrap().state, JobState::Completed);
        assert!(dir.path().join(format!("{id}.json")).is_file());
        assert!(dir.path().join(format!("{id}.html")).is_file());
    }

    #[tokio::test]
    async fn drain_with_nothing_in_flight_returns_at_once() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = dispatcher(&dir);
        assert!(dispatcher.drain_processing(Duration::from_millis(10)).await);
    }

    // -- locking --

    /// Records whether the dispatcher lock was free while the body was built.
    struct LockObservingBuilder {
        dispatcher: Arc<OnceLock<Weak<Dispatcher>>>,
        lock_was_free: Arc<AtomicBool>,
    }

    impl JobBuilder for LockObservingBuilder {
        fn build(
            &self,
            id: JobId,
            _request: &JobRequest,
            _created_at: testu_core::types::Timestamp,
        ) -> Result<serde_json::Value, CoreError> {
            let dispatcher = self
                .dispatcher
                .get()
                .and_then(Weak::upgrade)
                .ok_or_else(|| CoreError::Internal("dispatcher gone".into()))?;
            let free = dispatcher.state.try_lock().is_ok();
            self.lock_was_free.store(free, Ordering::SeqCst);
            Ok(json!({"id": id}))
        }
    }

    #[tokio::test]
    async fn job_body_is_built_without_holding_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let slot = Arc::new(OnceLock::new());
        let lock_was_free = Arc::new(AtomicBool::new(false));
        let builder = LockObservingBuilder {
            dispatcher: Arc::clone(&slot),
            lock_was_free: Arc::clone(&lock_was_free),
        };
        let dispatcher = Arc::new(dispatcher(&dir).with_builder(Arc::new(builder)));
        slot.set(Arc::downgrade(&dispatcher)).unwrap();

        dispatcher.submit(request()).await.unwrap();
        assert!(lock_was_free.load(Ordering::SeqCst));
        assert_eq!(dispatcher.stats().await.pending, 1);
    }
}
