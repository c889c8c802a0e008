//! Request handlers for the submission, agent, status and digest surfaces.
//!
//! Handlers stay thin: they extract the request, delegate to the
//! [`Dispatcher`](crate::engine::Dispatcher) or the report store, and map
//! errors via [`AppError`](crate::error::AppError).

pub mod agent;
pub mod digest;
pub mod status;
pub mod submission;
