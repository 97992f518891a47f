use std::time::{Duration, Instant};

use crate::error::RigError;

/// Caller-supplied point in time after which a request is abandoned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    pub fn is_expired(&self) -> bool {
        self.0.is_some_and(|instant| Instant::now() >= instant)
    }

    /// Fail with [`RigError::DeadlineExceeded`] once the deadline has passed.
    pub fn check(&self, stage: &'static str) -> Result<(), RigError> {
        if self.is_expired() {
            return Err(RigError::DeadlineExceeded { stage });
        }
        Ok(())
    }
}
