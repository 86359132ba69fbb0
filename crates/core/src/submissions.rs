//! Step submission history.
//!
//! Loopable workflows accumulate many submissions per step. The history is
//! kept as its own ordered list so views can show every pass, while count
//! resolution reads only the latest pass that was not rejected.

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

/// Review state of a single submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

/// Data a user submitted for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSubmission {
    pub id: DbId,
    pub step_id: DbId,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    pub submitted_by: DbId,
    pub submitted_at: Timestamp,
    pub status: SubmissionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<DbId>,
}

/// All submissions of one record, ordered oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<StepSubmission>", into = "Vec<StepSubmission>")]
pub struct SubmissionHistory {
    entries: Vec<StepSubmission>,
}

impl From<Vec<StepSubmission>> for SubmissionHistory {
    fn from(mut entries: Vec<StepSubmission>) -> Self {
        // Ties keep the id order so equal timestamps stay deterministic.
        entries.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Self { entries }
    }
}

impl From<SubmissionHistory> for Vec<StepSubmission> {
    fn from(history: SubmissionHistory) -> Self {
        history.entries
    }
}

impl SubmissionHistory {
    pub fn new(entries: Vec<StepSubmission>) -> Self {
        entries.into()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every submission, oldest first.
    pub fn all(&self) -> &[StepSubmission] {
        &self.entries
    }

    /// Submissions for one step, oldest first.
    pub fn for_step(&self, step_id: DbId) -> impl Iterator<Item = &StepSubmission> {
        self.entries.iter().filter(move |s| s.step_id == step_id)
    }

    /// The most recent submission for a step, if any.
    pub fn latest_for_step(&self, step_id: DbId) -> Option<&StepSubmission> {
        self.for_step(step_id).last()
    }

    /// The most recent submission for a step that was not rejected.
    pub fn latest_accepted_for_step(&self, step_id: DbId) -> Option<&StepSubmission> {
        self.for_step(step_id)
            .filter(|s| s.status != SubmissionStatus::Rejected)
            .last()
    }

    pub fn count_for_step(&self, step_id: DbId) -> usize {
        self.for_step(step_id).count()
    }
}
