pub mod job;
pub mod outcome;
pub mod status;
pub mod work_item;

pub use job::{Job, JobProgress, JobStatus, Tier};
pub use outcome::{Outcome, OutcomeStatus};
pub use status::{OrchestratorStatus, StatusUpdate};
pub use work_item::{Difficulty, WorkItem};
