//! Accumulator for protocol-level check failures.
//!
//! A failed check never aborts the run: it is logged with the location of the
//! check and kept so the runner can report every violation at the end.

use std::fmt::{self, Display, Formatter};
use std::panic::Location;

use tracing::error;

use crate::error::{HarnessError, HarnessResult};

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    /// Source file of the check.
    pub file: &'static str,
    /// Source line of the check.
    pub line: u32,
    /// What was expected.
    pub message: String,
}

impl Display for CheckFailure {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{} \"{}\"", self.file, self.line, self.message)
    }
}

/// Failures collected over a test run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    failures: Vec<CheckFailure>,
}

impl CheckReport {
    /// Empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure at the caller's location unless `condition` holds.
    /// Returns `condition`.
    #[track_caller]
    pub fn check(&mut self, condition: bool, message: impl Into<String>) -> bool {
        if !condition {
            self.record(Location::caller(), message.into());
        }
        condition
    }

    /// Record an unconditional failure at the caller's location.
    #[track_caller]
    pub fn fail(&mut self, message: impl Into<String>) {
        self.record(Location::caller(), message.into());
    }

    fn record(&mut self, location: &'static Location<'static>, message: String) {
        let failure = CheckFailure {
            file: location.file(),
            line: location.line(),
            message,
        };
        error!(
            file = failure.file,
            line = failure.line,
            message = %failure.message,
            "check failed"
        );
        self.failures.push(failure);
    }

    /// Whether no check has failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Recorded failures in order.
    #[must_use]
    pub fn failures(&self) -> &[CheckFailure] {
        &self.failures
    }

    /// Convert the report into a run outcome.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ChecksFailed`] when any check failed.
    pub fn into_result(self) -> HarnessResult<()> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::ChecksFailed {
                count: self.failures.len(),
            })
        }
    }
}
