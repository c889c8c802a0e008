//! Domain model for the Testu dispatch server.
//!
//! Everything in this crate is free of HTTP and file I/O: the job queue,
//! the agent allow-list, report validation, the status event schema and the
//! submission correlator. The API crate serializes access to the mutable
//! pieces behind a single lock.

pub mod agents;
pub mod collaborators;
pub mod correlator;
pub mod error;
pub mod job;
pub mod queue;
pub mod report;
pub mod status;
pub mod types;
