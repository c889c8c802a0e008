//! Job dispatch engine.
//!
//! Contains the dispatcher that owns the job queue and the submission
//! correlator, plus the background sweeper that releases status channels
//! whose submitter disconnected.

pub mod dispatcher;
pub mod sweeper;

pub use dispatcher::{AcceptedReport, DispatchStats, Dispatcher, Submission};
