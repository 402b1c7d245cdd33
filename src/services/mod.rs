pub mod catalog;
pub mod orchestrator;
pub mod queue;
pub mod scheduler;
pub mod target;
