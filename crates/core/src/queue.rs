//! In-memory job queue.
//!
//! Pending jobs are kept in a `BTreeMap` keyed by [`JobId`], so the oldest
//! submission is always the first entry. Assigned jobs are never moved back
//! to pending: there is no lease expiry or redelivery, and an agent that
//! never reports holds its job forever.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use serde_json::Value;

use crate::collaborators::JobBuilder;
use crate::error::CoreError;
use crate::job::{Job, JobId, JobIdGenerator, JobOutcome, JobRequest, JobState};
use crate::types::Timestamp;

#[derive(Debug, Default)]
pub struct JobQueue {
    ids: JobIdGenerator,
    pending: BTreeMap<JobId, Job>,
    assigned: HashMap<JobId, Job>,
    finished: HashMap<JobId, Job>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending job for `request` and return its id.
    ///
    /// The body handed to agents comes from `builder`; if it fails nothing
    /// is enqueued.
    pub fn submit(
        &mut self,
        request: JobRequest,
        builder: &dyn JobBuilder,
    ) -> Result<JobId, CoreError> {
        let (id, created_at) = self.reserve_id();
        let body = builder.build(id, &request, created_at)?;
        self.enqueue(id, request, body, created_at);
        Ok(id)
    }

    /// Allocate the id of a job about to be built.
    ///
    /// Together with [`enqueue`](Self::enqueue) this lets the caller build
    /// the body without holding whatever guards the queue. Pending order is
    /// by id, so a job enqueued late still sorts by its reservation time.
    pub fn reserve_id(&mut self) -> (JobId, Timestamp) {
        let created_at = Utc::now();
        (self.ids.next(created_at), created_at)
    }

    /// Store a built job as pending under a reserved id.
    pub fn enqueue(&mut self, id: JobId, request: JobRequest, body: Value, created_at: Timestamp) {
        self.pending
            .insert(id, Job::new(id, request, body, created_at));
    }

    /// Hand the oldest pending job to `agent`.
    ///
    /// Returns `None` when nothing is pending.
    pub fn take_next(&mut self, agent: &str) -> Option<Job> {
        let (id, mut job) = self.pending.pop_first()?;
        job.state = JobState::Assigned;
        job.agent = Some(agent.to_string());
        job.assigned_at = Some(Utc::now());
        self.assigned.insert(id, job.clone());
        Some(job)
    }

    /// Move an assigned job to its terminal state.
    ///
    /// The body is released: finished jobs keep only their bookkeeping.
    pub fn mark_terminal(&mut self, id: JobId, outcome: JobOutcome) -> Result<&Job, CoreError> {
        let mut job = self
            .assigned
            .remove(&id)
            .ok_or_else(|| CoreError::UnknownJob(id.to_string()))?;
        job.state = outcome.into();
        job.finished_at = Some(Utc::now());
        job.body = Value::Null;
        Ok(self.finished.entry(id).or_insert(job))
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.pending
            .get(&id)
            .or_else(|| self.assigned.get(&id))
            .or_else(|| self.finished.get(&id))
    }

    pub fn state_of(&self, id: JobId) -> Option<JobState> {
        self.get(id).map(|job| job.state)
    }

    pub fn is_assigned(&self, id: JobId) -> bool {
        self.assigned.contains_key(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }

    pub fn finished_count(&self, outcome: JobOutcome) -> usize {
        let state = JobState::from(outcome);
        self.finished.values().filter(|j| j.state == state).count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
