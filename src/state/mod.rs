//! State module for tracking job lifecycle
//!
//! # Components
//!
//! - `JobState`: Configured, Running or Terminated, as seen by the job's owner
//! - `StreamPhase`: the forwarder's finer phases and their legal transitions

mod job_state;

// Re-export main types
pub use job_state::{JobState, StreamPhase};
