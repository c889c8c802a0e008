//! Submission correlator: maps a job id to the submitter's status channel.
//!
//! Each job has at most one open sink. A sink is released exactly once, by
//! [`Correlator::close`], by a failed [`Correlator::notify`] on a dropped
//! receiver, or by [`Correlator::reap_closed`].

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::job::JobId;
use crate::status::StatusEvent;

/// Sending half of a submitter's status channel.
pub type StatusSink = mpsc::UnboundedSender<StatusEvent>;

/// Receiving half of a submitter's status channel.
pub type StatusReceiver = mpsc::UnboundedReceiver<StatusEvent>;

/// Create a connected sink/receiver pair.
pub fn status_channel() -> (StatusSink, StatusReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Default)]
pub struct Correlator {
    channels: HashMap<JobId, StatusSink>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `sink` to `job_id`.
    ///
    /// A sink whose receiver is gone is stale and gets replaced; an open one
    /// is never overwritten.
    pub fn register(&mut self, job_id: JobId, sink: StatusSink) -> Result<(), CoreError> {
        if let Some(existing) = self.channels.get(&job_id) {
            if !existing.is_closed() {
                return Err(CoreError::DuplicateRegistration(job_id));
            }
        }
        self.channels.insert(job_id, sink);
        Ok(())
    }

    /// Push an event to the submitter.
    pub fn notify(&mut self, job_id: JobId, event: StatusEvent) -> Result<(), CoreError> {
        let sink = self
            .channels
            .get(&job_id)
            .ok_or(CoreError::ChannelNotFound(job_id))?;
        if sink.send(event).is_err() {
            self.channels.remove(&job_id);
            return Err(CoreError::ChannelGone(job_id));
        }
        Ok(())
    }

    /// Release the sink, ending the submitter's stream once buffered events
    /// are drained.
    pub fn close(&mut self, job_id: JobId) -> Result<(), CoreError> {
        self.channels
            .remove(&job_id)
            .map(drop)
            .ok_or(CoreError::ChannelNotFound(job_id))
    }

    /// Whether an open sink is bound to `job_id`.
    pub fn is_open(&self, job_id: JobId) -> bool {
        self.channels
            .get(&job_id)
            .is_some_and(|sink| !sink.is_closed())
    }

    /// Drop every sink whose receiver has gone away. Returns the affected ids.
    pub fn reap_closed(&mut self) -> Vec<JobId> {
        let stale: Vec<JobId> = self
            .channels
            .iter()
            .filter(|(_, sink)| sink.is_closed())
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            self.channels.remove(id);
        }
        stale
    }

    /// Release every sink. Used at shutdown so open streams end.
    pub fn close_all(&mut self) -> usize {
        let count = self.channels.len();
        self.channels.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
