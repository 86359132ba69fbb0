//! Request bodies sent to the backend when a workflow is saved.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::completion::CompletionAction;
use crate::types::DbId;
use crate::workflow::StepForm;

/// Maximum length of workflow and step names.
pub const MAX_NAME_LENGTH: u64 = 255;

/// One step of a workflow being created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateStepInput {
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub name: String,
    pub order_index: i32,
    pub requires_approval: bool,
    pub form: StepForm,
}

/// Body of the create-workflow request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateWorkflowInput {
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub name: String,
    pub entity_type_ids: BTreeSet<DbId>,
    pub is_auto_start: bool,
    pub is_loopable: bool,
    #[validate(nested)]
    pub steps: Vec<CreateStepInput>,
    pub on_complete: Vec<CompletionAction>,
}

/// Body of the partial update request. Only changed fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateWorkflowRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_auto_start: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_loopable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_entity_type_ids: Option<BTreeSet<DbId>>,
    /// Whether existing entities of newly added types should be enrolled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_existing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_complete: Option<Vec<CompletionAction>>,
}

impl UpdateWorkflowRequest {
    /// Whether there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
