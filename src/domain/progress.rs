//! Progress snapshots of long-running background tasks.
//!
//! Status only moves forward: `pending → running → {completed | failed}`, with
//! `pending → failed` for tasks that fail before starting. `completed` never
//! decreases and never exceeds a known `total`.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ProgressStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::Pending => "pending",
            ProgressStatus::Running => "running",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProgressStatus::Completed | ProgressStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            ProgressStatus::Pending => 0,
            ProgressStatus::Running => 1,
            ProgressStatus::Completed | ProgressStatus::Failed => 2,
        }
    }

    /// Whether a record may move from `self` to `next`.
    pub fn can_transition_to(self, next: ProgressStatus) -> bool {
        match (self, next) {
            (ProgressStatus::Pending, ProgressStatus::Completed) => false,
            (current, next) => !current.is_terminal() && next.rank() > current.rank(),
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgressError {
    #[error("task progress cannot move from `{from}` to `{to}`")]
    InvalidTransition {
        from: ProgressStatus,
        to: ProgressStatus,
    },
    #[error("task progress is already `{status}`")]
    Terminal { status: ProgressStatus },
    #[error("task progress must be running to advance (currently `{status}`)")]
    NotRunning { status: ProgressStatus },
    #[error("completed count {completed} would exceed total {total}")]
    Overflow { completed: u64, total: u64 },
}

/// Persisted progress record. The JSON shape is shared with polling clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub status: ProgressStatus,
    pub total: u64,
    pub completed: u64,
    pub current: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Default for TaskProgress {
    fn default() -> Self {
        Self::pending()
    }
}

impl TaskProgress {
    /// Fresh record with an unknown total.
    pub fn pending() -> Self {
        Self {
            status: ProgressStatus::Pending,
            total: 0,
            completed: 0,
            current: String::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Completion percentage, or `None` while the total is unknown.
    pub fn percent(&self) -> Option<u8> {
        if self.total == 0 {
            return None;
        }
        let ratio = u128::from(self.completed.min(self.total)) * 100 / u128::from(self.total);
        Some(ratio as u8)
    }

    /// Structural invariants a stored record must satisfy.
    pub fn check(&self) -> Result<(), ProgressError> {
        if self.total > 0 && self.completed > self.total {
            return Err(ProgressError::Overflow {
                completed: self.completed,
                total: self.total,
            });
        }
        Ok(())
    }

    /// Move to `running`, recording `total` if it is already known.
    pub fn begin(&mut self, total: u64) -> Result<(), ProgressError> {
        self.transition(ProgressStatus::Running)?;
        self.total = total;
        Ok(())
    }

    /// Record a total discovered after the task started.
    pub fn set_total(&mut self, total: u64) -> Result<(), ProgressError> {
        self.ensure_open()?;
        if total < self.completed {
            return Err(ProgressError::Overflow {
                completed: self.completed,
                total,
            });
        }
        self.total = total;
        Ok(())
    }

    /// Count `count` more finished items and name the item now in flight.
    pub fn advance(&mut self, count: u64, current: impl Into<String>) -> Result<(), ProgressError> {
        if self.status != ProgressStatus::Running {
            return Err(ProgressError::NotRunning {
                status: self.status,
            });
        }
        let completed = self.completed.saturating_add(count);
        if self.total > 0 && completed > self.total {
            return Err(ProgressError::Overflow {
                completed,
                total: self.total,
            });
        }
        self.completed = completed;
        self.current = current.into();
        Ok(())
    }

    pub fn push_warning(&mut self, message: impl Into<String>) -> Result<(), ProgressError> {
        self.ensure_open()?;
        self.warnings.push(message.into());
        Ok(())
    }

    pub fn push_error(&mut self, message: impl Into<String>) -> Result<(), ProgressError> {
        self.ensure_open()?;
        self.errors.push(message.into());
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), ProgressError> {
        self.transition(ProgressStatus::Completed)?;
        self.current.clear();
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), ProgressError> {
        self.transition(ProgressStatus::Failed)?;
        self.errors.push(message.into());
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), ProgressError> {
        if self.status.is_terminal() {
            return Err(ProgressError::Terminal {
                status: self.status,
            });
        }
        Ok(())
    }

    fn transition(&mut self, next: ProgressStatus) -> Result<(), ProgressError> {
        self.ensure_open()?;
        if !self.status.can_transition_to(next) {
            return Err(ProgressError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}
