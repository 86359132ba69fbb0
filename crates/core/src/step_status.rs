//! Display status of each workflow step for one record.
//!
//! [`resolve_step_statuses`] is the single source of truth for how a step is
//! shown. Click routing is derived from it in [`step_click_targets`] rather
//! than reimplemented by views.

use serde::{Deserialize, Serialize};

use crate::workflow::{WorkflowRecord, WorkflowStepDefinition};

/// How a step is shown in the progress view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Permanently done.
    Completed,
    /// Submitted at least once in a loopable workflow and may be revisited.
    Recorded,
    /// The step the record is waiting on.
    Current,
    /// Not reached yet.
    Pending,
}

impl StepStatus {
    /// Whether the step has been passed, either permanently or for now.
    pub fn is_done(self) -> bool {
        matches!(self, Self::Completed | Self::Recorded)
    }
}

/// Where a click on a step should lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepClickTarget {
    SubmissionHistory,
    FormPreview,
}

/// Compute the display status of every step, in the given order.
///
/// `steps` must be ordered by position. A completed record shows every step
/// as completed. Otherwise the current step wins. Then any step with a
/// recorded submission, or positioned before the current step, is done:
/// `recorded` when the workflow loops, `completed` when it does not.
pub fn resolve_step_statuses(
    record: &WorkflowRecord,
    steps: &[WorkflowStepDefinition],
    is_loopable: bool,
) -> Vec<StepStatus> {
    if record.is_completed() {
        return vec![StepStatus::Completed; steps.len()];
    }

    let done = if is_loopable {
        StepStatus::Recorded
    } else {
        StepStatus::Completed
    };
    let current_position = record
        .current_step_id
        .and_then(|id| steps.iter().position(|s| s.id == id));

    steps
        .iter()
        .enumerate()
        .map(|(position, step)| {
            if Some(step.id) == record.current_step_id {
                StepStatus::Current
            } else if record.submission_count(step.id) > 0 {
                done
            } else if current_position.is_some_and(|current| position < current) {
                // Progressed past without a recorded submission.
                done
            } else {
                StepStatus::Pending
            }
        })
        .collect()
}

/// Route a click on a step with the given status and submission count.
pub fn step_click_target(status: StepStatus, submission_count: u32) -> StepClickTarget {
    if status.is_done() || submission_count > 0 {
        StepClickTarget::SubmissionHistory
    } else {
        StepClickTarget::FormPreview
    }
}

/// Click targets for every step, derived from [`resolve_step_statuses`].
pub fn step_click_targets(
    record: &WorkflowRecord,
    steps: &[WorkflowStepDefinition],
    is_loopable: bool,
) -> Vec<StepClickTarget> {
    resolve_step_statuses(record, steps, is_loopable)
        .into_iter()
        .zip(steps)
        .map(|(status, step)| step_click_target(status, record.submission_count(step.id)))
        .collect()
}

/// Aggregate progress for a progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub total: usize,
    pub done: usize,
    /// Zero-based position of the current step, if any.
    pub current_position: Option<usize>,
}

impl ProgressSummary {
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.done as f64 / self.total as f64) * 100.0
    }
}

pub fn summarize_progress(statuses: &[StepStatus]) -> ProgressSummary {
    ProgressSummary {
        total: statuses.len(),
        done: statuses.iter().filter(|s| s.is_done()).count(),
        current_position: statuses.iter().position(|s| *s == StepStatus::Current),
    }
}
