//! Stand-in for the remote extraction API: same routes, simulated jobs.

pub mod server;
mod simulator;

pub use simulator::{
    JobRecord, SimulatedExtractor, Stage, COMPLETED_STEP, DEFAULT_RETAINED_JOBS, QUEUED_STEP,
    UNREADABLE_IMAGE_MESSAGE,
};
