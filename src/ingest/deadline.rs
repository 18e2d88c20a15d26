use std::time::{Duration, Instant};

use crate::error::IngestError;

/// Wall-clock budget shared by the stages of one request.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn expired(&self) -> bool {
        self.started.elapsed() >= self.budget
    }

    pub fn check(&self, stage: &'static str) -> Result<(), IngestError> {
        if self.expired() {
            return Err(IngestError::Timeout(self.budget, stage));
        }
        Ok(())
    }
}
