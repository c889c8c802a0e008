//! Stand-in implementations of the collaborator seams in
//! [`testu_core::collaborators`].
//!
//! - [`ScriptMerger`] merges a submission into a job script (batch+merge).
//! - [`TallyScorer`] attaches an act count as the report score.
//! - [`SummaryDigester`] renders a minimal HTML summary.
//!
//! None of these carry accessibility scoring semantics; deployments that
//! need real scores plug their own implementations into the dispatcher.

pub mod digest;
pub mod error;
pub mod score;
pub mod script;

pub use digest::SummaryDigester;
pub use error::PipelineError;
pub use score::TallyScorer;
pub use script::ScriptMerger;
