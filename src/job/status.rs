// src/job/status.rs

//! Task and job lifecycle states.

use std::fmt;

/// Lifecycle state of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Submitted,
    Pending,
    Paused,
    Running,
    WaitingOnError,
    WaitingOnFailure,
    InError,
    Failed,
    NotStarted,
    NotRestarted,
    Aborted,
    Faulty,
    Finished,
    Skipped,
}

/// Counter bucket a task status belongs to. Every status maps to exactly one
/// bucket, so the job counters always partition the task set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Pending,
    Running,
    InError,
    Finished,
    Failed,
    Faulty,
}

impl TaskStatus {
    /// No transition leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Failed
                | TaskStatus::NotStarted
                | TaskStatus::NotRestarted
                | TaskStatus::Aborted
                | TaskStatus::Faulty
                | TaskStatus::Finished
                | TaskStatus::Skipped
        )
    }

    /// Whether a dependent task may run once its parent reached this status.
    pub fn satisfies_dependency(self) -> bool {
        matches!(
            self,
            TaskStatus::Finished | TaskStatus::Skipped | TaskStatus::Faulty
        )
    }

    pub fn is_waiting(self) -> bool {
        matches!(
            self,
            TaskStatus::WaitingOnError | TaskStatus::WaitingOnFailure
        )
    }

    pub fn class(self) -> StatusClass {
        match self {
            TaskStatus::Submitted | TaskStatus::Pending | TaskStatus::Paused => {
                StatusClass::Pending
            }
            TaskStatus::Running => StatusClass::Running,
            TaskStatus::WaitingOnError | TaskStatus::WaitingOnFailure | TaskStatus::InError => {
                StatusClass::InError
            }
            TaskStatus::Finished | TaskStatus::Skipped => StatusClass::Finished,
            TaskStatus::Failed
            | TaskStatus::NotStarted
            | TaskStatus::NotRestarted
            | TaskStatus::Aborted => StatusClass::Failed,
            TaskStatus::Faulty => StatusClass::Faulty,
        }
    }

    /// Transition table enforced by `JobModel::set_task_status`.
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        use TaskStatus::*;

        if self.is_terminal() {
            return false;
        }
        match (self, to) {
            (_, Failed | Faulty | Skipped | NotStarted) => true,
            (Submitted, Pending | Paused) => true,
            (Pending, Running | Paused) => true,
            (Paused, Pending | Submitted) => true,
            (Running, Finished | Aborted | Pending | Paused) => true,
            (Running, WaitingOnError | WaitingOnFailure) => true,
            (WaitingOnError | WaitingOnFailure, InError | Pending | Paused | NotRestarted) => true,
            (InError, Pending | Paused) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Submitted => "SUBMITTED",
            TaskStatus::Pending => "PENDING",
            TaskStatus::Paused => "PAUSED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::WaitingOnError => "WAITING_ON_ERROR",
            TaskStatus::WaitingOnFailure => "WAITING_ON_FAILURE",
            TaskStatus::InError => "IN_ERROR",
            TaskStatus::Failed => "FAILED",
            TaskStatus::NotStarted => "NOT_STARTED",
            TaskStatus::NotRestarted => "NOT_RESTARTED",
            TaskStatus::Aborted => "ABORTED",
            TaskStatus::Faulty => "FAULTY",
            TaskStatus::Finished => "FINISHED",
            TaskStatus::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Running,
    Stalled,
    Paused,
    InError,
    Finished,
    Failed,
    Canceled,
    Killed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Finished | JobStatus::Failed | JobStatus::Canceled | JobStatus::Killed
        )
    }

    /// Statuses in which eligible tasks may be handed out.
    pub fn is_dispatching(self) -> bool {
        matches!(
            self,
            JobStatus::Running | JobStatus::Stalled | JobStatus::InError
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Stalled => "STALLED",
            JobStatus::Paused => "PAUSED",
            JobStatus::InError => "IN_ERROR",
            JobStatus::Finished => "FINISHED",
            JobStatus::Failed => "FAILED",
            JobStatus::Canceled => "CANCELED",
            JobStatus::Killed => "KILLED",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TaskStatus; 14] = [
        TaskStatus::Submitted,
        TaskStatus::Pending,
        TaskStatus::Paused,
        TaskStatus::Running,
        TaskStatus::WaitingOnError,
        TaskStatus::WaitingOnFailure,
        TaskStatus::InError,
        TaskStatus::Failed,
        TaskStatus::NotStarted,
        TaskStatus::NotRestarted,
        TaskStatus::Aborted,
        TaskStatus::Faulty,
        TaskStatus::Finished,
        TaskStatus::Skipped,
    ];

    #[test]
    fn terminal_statuses_have_no_outgoing_transitions() {
        for from in ALL.iter().copied().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn running_cannot_go_back_to_submitted() {
        assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Submitted));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Finished));
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
    }

    #[test]
    fn skipped_counts_as_finished() {
        assert_eq!(TaskStatus::Skipped.class(), StatusClass::Finished);
        assert_eq!(TaskStatus::Paused.class(), StatusClass::Pending);
        assert_eq!(TaskStatus::WaitingOnFailure.class(), StatusClass::InError);
    }
}
