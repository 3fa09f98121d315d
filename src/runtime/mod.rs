//! Import runtime: row validation, field resolution and run orchestration.
//!
//! The runtime is synchronous and single-threaded. Rows are processed one at
//! a time in the order the row source yields them.

pub mod collaborators;
pub mod context;
pub mod date_format;
pub mod orchestrator;
pub mod query;
pub mod resolver;
pub mod validator;

// Re-export key types
pub use collaborators::{
    AttachmentLocator, ChoiceLookup, Collaborators, ConfigSource, ImportConfig, LogSink,
    RecordSink, ReferenceLookup, RequestContext, RequestSource, RowSource, Rows,
};
pub use context::{RunContext, RunLog};
pub use date_format::DateFormat;
pub use orchestrator::{ImportOrchestrator, ImportOutcome};
pub use resolver::FieldResolver;
pub use validator::RowValidator;
