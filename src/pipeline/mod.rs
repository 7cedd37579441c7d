//! Agent pipelines: the ordered sequence, its executor, and run events.

mod events;
mod executor;
mod spec;

pub use events::{
    NoopObserver, OutputEvent, OutputKind, PipelineEvent, PipelineObserver, ProgressEvent,
};
pub use executor::{ExecutionRecord, PipelineError, PipelineExecutor, RunReport};
pub use spec::PipelineSpec;
