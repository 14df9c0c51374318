//! Failure reporting for daemons that retry forever

/// Tracks whether the source is currently failing
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FailureLatch {
    failing: bool,
    consecutive: u64,
}

impl FailureLatch {
    /// Record a failure; true if it is the first since the last success
    pub fn fail(&mut self) -> bool {
        let first = !self.failing;
        self.failing = true;
        self.consecutive += 1;
        first
    }

    /// Record a success; true if it ends a run of failures
    pub fn succeed(&mut self) -> bool {
        let recovered = self.failing;
        self.failing = false;
        self.consecutive = 0;
        recovered
    }

    pub fn is_failing(&self) -> bool {
        self.failing
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive
    }
}
