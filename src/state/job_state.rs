/// Lifecycle state definitions for crawl jobs
///
/// `StreamPhase` is the fine-grained state driven by the job's tasks.
/// `JobState` is the coarse view callers reason about.
use std::fmt;

/// Coarse lifecycle of a job as seen by its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Created, not started yet
    Configured,

    /// Start was called and the result stream has not ended
    Running,

    /// The result stream ended; the job cannot be restarted
    Terminated,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configured => "configured",
            Self::Running => "running",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Phase of the stream forwarder driving a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamPhase {
    // ===== Before start =====
    /// Start has not been called
    NotStarted,

    // ===== Running =====
    /// Dialing the server and waiting for the subscription
    Connecting,

    /// Receiving results and dispatching them to the sink
    Streaming,

    // ===== Winding down =====
    /// The result stream ended; buffered results are still being dispatched
    Draining,

    /// Everything has been dispatched and the completion signal has fired
    Terminated,
}

impl StreamPhase {
    /// Returns the coarse job state for this phase
    pub fn job_state(&self) -> JobState {
        match self {
            Self::NotStarted => JobState::Configured,
            Self::Connecting | Self::Streaming => JobState::Running,
            Self::Draining | Self::Terminated => JobState::Terminated,
        }
    }

    /// Returns true while the job accepts injected requests and cancels
    pub fn is_running(&self) -> bool {
        self.job_state() == JobState::Running
    }

    /// Returns true once no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Checks whether moving from `self` to `next` is a legal transition
    ///
    /// Phases only move forward. `Connecting` may jump straight to
    /// `Terminated` when the session cannot be established.
    pub fn can_transition_to(&self, next: StreamPhase) -> bool {
        matches!(
            (self, next),
            (Self::NotStarted, Self::Connecting)
                | (Self::Connecting, Self::Streaming)
                | (Self::Connecting, Self::Terminated)
                | (Self::Streaming, Self::Draining)
                | (Self::Draining, Self::Terminated)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Draining => "draining",
            Self::Terminated => "terminated",
        }
    }

    /// Returns all phases in lifecycle order
    pub fn all_phases() -> Vec<Self> {
        vec![
            Self::NotStarted,
            Self::Connecting,
            Self::Streaming,
            Self::Draining,
            Self::Terminated,
        ]
    }
}

impl fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
