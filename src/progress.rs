//! Progress reporting to presentation layers.
//!
//! The orchestrator pushes a structured record after every state
//! transition; it has no knowledge of how the record is rendered. The
//! `human_status` line always summarizes the current halt reason and
//! counts so a caller can show actionable guidance without inspecting
//! internal error codes.

use serde::Serialize;

/// One progress update.
#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    /// Index of the task currently being worked (or just finished)
    pub current_index: usize,
    /// Total tasks in this run
    pub total_count: usize,
    /// Completion percentage over this run's tasks, 0-100
    pub percentage: u8,
    /// Human-readable status line
    pub human_status: String,
}

impl Progress {
    /// Build a record, deriving the percentage from `done`/`total`.
    #[must_use]
    pub fn new(current_index: usize, done: usize, total: usize, human_status: String) -> Self {
        let percentage = if total == 0 {
            100
        } else {
            u8::try_from(done * 100 / total).unwrap_or(100)
        };
        Self {
            current_index,
            total_count: total,
            percentage,
            human_status,
        }
    }
}

/// Push interface consumed by presentation layers.
pub trait ProgressReporter: Send + Sync + std::fmt::Debug {
    /// Called after every state transition
    fn report(&self, progress: Progress);
}

/// Reporter that drops all updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn report(&self, _progress: Progress) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_derivation() {
        let p = Progress::new(2, 3, 10, "Sending 3 of 10".to_string());
        assert_eq!(p.percentage, 30);

        let done = Progress::new(9, 10, 10, "Done".to_string());
        assert_eq!(done.percentage, 100);

        let empty = Progress::new(0, 0, 0, "Nothing to do".to_string());
        assert_eq!(empty.percentage, 100);
    }
}
