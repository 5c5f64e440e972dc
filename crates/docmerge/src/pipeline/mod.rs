pub mod context;
pub mod error;
pub mod groups;
pub mod progress;
pub mod runner;
pub mod state;

pub use context::{RunContext, RunLayout};
pub use error::PipelineError;
pub use progress::{ChannelProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use runner::MergeOrchestrator;
pub use state::{CancelFlag, RunState};
