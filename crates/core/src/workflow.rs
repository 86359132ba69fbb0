//! Workflow definitions, runtime records, and entity types.
//!
//! Definitions are authored by administrators; records are created and
//! advanced by the backend. Both arrive here as already-fetched JSON.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::completion::CompletionAction;
use crate::error::CoreError;
use crate::metadata_schema::{
    numeric_properties, schema_to_fields, validate_submission_data, FieldDefinition, FieldIssue,
    MetadataSchema,
};
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Record status
// ---------------------------------------------------------------------------

pub const RECORD_NOT_STARTED: &str = "not_started";
pub const RECORD_IN_PROGRESS: &str = "in_progress";
pub const RECORD_COMPLETED: &str = "completed";

/// All valid record status strings.
pub const VALID_RECORD_STATUSES: &[&str] =
    &[RECORD_NOT_STARTED, RECORD_IN_PROGRESS, RECORD_COMPLETED];

/// Lifecycle state of one workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl RecordStatus {
    pub fn from_str_value(s: &str) -> Result<Self, CoreError> {
        match s {
            RECORD_NOT_STARTED => Ok(Self::NotStarted),
            RECORD_IN_PROGRESS => Ok(Self::InProgress),
            RECORD_COMPLETED => Ok(Self::Completed),
            _ => Err(CoreError::Validation(format!(
                "Invalid record status '{s}'. Must be one of: {}",
                VALID_RECORD_STATUSES.join(", ")
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => RECORD_NOT_STARTED,
            Self::InProgress => RECORD_IN_PROGRESS,
            Self::Completed => RECORD_COMPLETED,
        }
    }
}

// ---------------------------------------------------------------------------
// Entity types
// ---------------------------------------------------------------------------

/// A class of entities with its own metadata schema and code prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    pub id: DbId,
    pub name: String,
    pub code_prefix: String,
    #[serde(default)]
    pub metadata_schema: MetadataSchema,
}

impl EntityType {
    /// The entity metadata form as editable fields.
    pub fn metadata_fields(&self) -> Vec<FieldDefinition> {
        schema_to_fields(&self.metadata_schema)
    }

    /// Check an entity's metadata against this type's schema.
    pub fn validate_metadata(
        &self,
        data: &serde_json::Map<String, serde_json::Value>,
    ) -> Vec<FieldIssue> {
        validate_submission_data(&self.metadata_schema, data)
    }
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// The form a user fills in at one step.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepForm {
    pub name: String,
    #[serde(default)]
    pub schema: MetadataSchema,
}

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStepDefinition {
    pub id: DbId,
    pub name: String,
    pub order_index: i32,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub form: StepForm,
}

impl WorkflowStepDefinition {
    /// Whether this step's form has at least one `number`/`integer` field.
    pub fn has_numeric_fields(&self) -> bool {
        !numeric_properties(&self.form.schema).is_empty()
    }
}

/// An administrator-authored workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: DbId,
    pub name: String,
    #[serde(default)]
    pub is_loopable: bool,
    #[serde(default)]
    pub is_auto_start: bool,
    #[serde(default)]
    pub entity_type_ids: BTreeSet<DbId>,
    #[serde(default)]
    pub steps: Vec<WorkflowStepDefinition>,
    #[serde(default)]
    pub on_complete: Vec<CompletionAction>,
}

impl WorkflowDefinition {
    /// Steps sorted by `order_index`.
    pub fn ordered_steps(&self) -> Vec<WorkflowStepDefinition> {
        let mut steps = self.steps.clone();
        steps.sort_by_key(|s| s.order_index);
        steps
    }
}

/// Check that `order_index` values are unique and form `0..n`.
pub fn validate_step_order(steps: &[WorkflowStepDefinition]) -> Result<(), String> {
    let mut indices: Vec<i32> = steps.iter().map(|s| s.order_index).collect();
    indices.sort_unstable();
    for (expected, actual) in indices.iter().enumerate() {
        if *actual != expected as i32 {
            return Err(format!(
                "Step order must be contiguous from 0; found {actual} at position {expected}"
            ));
        }
    }
    Ok(())
}

/// Find the step at a given `order_index`.
pub fn step_at_order(
    steps: &[WorkflowStepDefinition],
    order_index: i32,
) -> Option<&WorkflowStepDefinition> {
    steps.iter().find(|s| s.order_index == order_index)
}

/// A workflow as listed in an option picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowOption {
    pub id: DbId,
    pub name: String,
    #[serde(default)]
    pub entity_type_ids: BTreeSet<DbId>,
}

impl WorkflowOption {
    pub fn is_assignable_to(&self, entity_type_id: DbId) -> bool {
        self.entity_type_ids.contains(&entity_type_id)
    }
}

/// Workflows that may be started against entities of `entity_type_id`.
pub fn workflows_for_entity_type(
    options: &[WorkflowOption],
    entity_type_id: DbId,
) -> Vec<&WorkflowOption> {
    options
        .iter()
        .filter(|w| w.is_assignable_to(entity_type_id))
        .collect()
}

// ---------------------------------------------------------------------------
// Runtime records
// ---------------------------------------------------------------------------

/// One execution of a workflow against one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: DbId,
    pub workflow_id: DbId,
    pub entity_id: DbId,
    pub status: RecordStatus,
    pub current_step_id: Option<DbId>,
    pub started_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    /// Number of submissions recorded per step id.
    #[serde(default)]
    pub step_submission_counts: HashMap<DbId, u32>,
}

impl WorkflowRecord {
    pub fn submission_count(&self, step_id: DbId) -> u32 {
        self.step_submission_counts
            .get(&step_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn is_completed(&self) -> bool {
        self.status == RecordStatus::Completed
    }
}
