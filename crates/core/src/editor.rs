//! Edit-session state for a workflow definition.
//!
//! [`WorkflowDraft`] owns a workflow while an administrator edits it and
//! keeps its completion actions consistent with its steps:
//!
//! - step `order_index` values are renumbered to `0..n` after every step edit;
//! - a `submission_field` count source follows its step when steps are
//!   reordered, and loses its step/field reference when the step is removed
//!   or no longer has the referenced numeric field;
//! - dependent fields of an action are reset through the pure transitions in
//!   [`crate::completion`].
//!
//! Nothing here returns an error while editing. Problems are reported by
//! [`WorkflowDraft::validation_report`] and block [`WorkflowDraft::to_create_input`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::completion::{
    action_issues, is_submission_field_selectable, ActionIssue, ActionKind, CompletionAction,
    CountSource, CountSourceKind,
};
use crate::error::CoreError;
use crate::metadata_schema::{
    fields_to_schema, is_numeric_property, schema_to_fields, validate_fields, FieldDefinition,
    MetadataSchema,
};
use crate::requests::{CreateStepInput, CreateWorkflowInput, UpdateWorkflowRequest};
use crate::types::DbId;
use crate::workflow::{
    step_at_order, validate_step_order, StepForm, WorkflowDefinition, WorkflowOption,
    WorkflowStepDefinition,
};

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Why a count-source reference was cleared after a step edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearReason {
    StepRemoved,
    NoNumericFields,
    FieldNotNumeric,
}

/// A count-source reference that a step edit made stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearedReference {
    pub action_index: usize,
    pub step_order: Option<i32>,
    pub field_path: Option<String>,
    pub reason: ClearReason,
}

/// One problem that blocks saving a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum DraftIssue {
    Workflow { message: String },
    Step { step_id: DbId, message: String },
    Field { step_id: DbId, field: String, message: String },
    Action { index: usize, issue: ActionIssue },
}

impl DraftIssue {
    pub fn message(&self) -> String {
        match self {
            Self::Workflow { message } => message.clone(),
            Self::Step { step_id, message } => format!("Step {step_id}: {message}"),
            Self::Field {
                step_id,
                field,
                message,
            } => format!("Step {step_id}, field '{field}': {message}"),
            Self::Action { index, issue } => format!("Action {}: {}", index + 1, issue.message()),
        }
    }
}

/// Aggregated result of validating a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftReport {
    pub is_valid: bool,
    pub issues: Vec<DraftIssue>,
}

// ---------------------------------------------------------------------------
// Draft
// ---------------------------------------------------------------------------

/// A workflow being created or edited.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDraft {
    pub id: Option<DbId>,
    pub name: String,
    pub is_loopable: bool,
    pub is_auto_start: bool,
    entity_type_ids: BTreeSet<DbId>,
    /// Assignments that already exist on the backend; these can only grow.
    locked_entity_type_ids: BTreeSet<DbId>,
    steps: Vec<WorkflowStepDefinition>,
    on_complete: Vec<CompletionAction>,
    /// Steps created in this session get negative ids until saved.
    next_temp_step_id: DbId,
}

impl WorkflowDraft {
    /// Start a draft for a new workflow.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            is_loopable: false,
            is_auto_start: false,
            entity_type_ids: BTreeSet::new(),
            locked_entity_type_ids: BTreeSet::new(),
            steps: Vec::new(),
            on_complete: Vec::new(),
            next_temp_step_id: -1,
        }
    }

    /// Start a draft from a persisted definition.
    ///
    /// Stale count-source references are cleared on load. Use
    /// [`validate_definition`] to report them instead.
    pub fn from_definition(definition: &WorkflowDefinition) -> Self {
        let mut draft = Self::loaded(definition);
        draft.edit_steps(|_| {});
        draft
    }

    /// The definition as stored, without renumbering or repairs.
    fn loaded(definition: &WorkflowDefinition) -> Self {
        Self {
            id: Some(definition.id),
            name: definition.name.clone(),
            is_loopable: definition.is_loopable,
            is_auto_start: definition.is_auto_start,
            entity_type_ids: definition.entity_type_ids.clone(),
            locked_entity_type_ids: definition.entity_type_ids.clone(),
            steps: definition.ordered_steps(),
            on_complete: definition.on_complete.clone(),
            next_temp_step_id: -1,
        }
    }

    pub fn steps(&self) -> &[WorkflowStepDefinition] {
        &self.steps
    }

    pub fn actions(&self) -> &[CompletionAction] {
        &self.on_complete
    }

    pub fn entity_type_ids(&self) -> &BTreeSet<DbId> {
        &self.entity_type_ids
    }

    /// Completion actions only make sense once an entity type is assigned.
    pub fn completion_actions_enabled(&self) -> bool {
        !self.entity_type_ids.is_empty()
    }

    // --- Entity types ---

    pub fn add_entity_type(&mut self, entity_type_id: DbId) -> bool {
        self.entity_type_ids.insert(entity_type_id)
    }

    /// Remove an assignment made in this session. Persisted assignments
    /// cannot be removed and return `false`.
    pub fn remove_entity_type(&mut self, entity_type_id: DbId) -> bool {
        if self.locked_entity_type_ids.contains(&entity_type_id) {
            return false;
        }
        self.entity_type_ids.remove(&entity_type_id)
    }

    // --- Steps ---

    /// Append a step and return its temporary id.
    pub fn add_step(&mut self, name: impl Into<String>, requires_approval: bool, form: StepForm) -> DbId {
        let id = self.next_temp_step_id;
        self.next_temp_step_id -= 1;
        let name = name.into();
        self.edit_steps(|steps| {
            steps.push(WorkflowStepDefinition {
                id,
                name,
                order_index: steps.len() as i32,
                requires_approval,
                form,
            });
        });
        id
    }

    pub fn remove_step(&mut self, step_id: DbId) -> Vec<ClearedReference> {
        self.edit_steps(|steps| steps.retain(|s| s.id != step_id))
    }

    /// Move the step at position `from` to position `to`.
    pub fn move_step(&mut self, from: usize, to: usize) -> Vec<ClearedReference> {
        if from >= self.steps.len() || to >= self.steps.len() || from == to {
            return Vec::new();
        }
        self.edit_steps(|steps| {
            let step = steps.remove(from);
            steps.insert(to, step);
        })
    }

    pub fn set_step_schema(&mut self, step_id: DbId, schema: MetadataSchema) -> Vec<ClearedReference> {
        self.edit_steps(|steps| {
            if let Some(step) = steps.iter_mut().find(|s| s.id == step_id) {
                step.form.schema = schema;
            }
        })
    }

    /// Replace a step's form with the schema compiled from `fields`.
    pub fn set_step_fields(&mut self, step_id: DbId, fields: &[FieldDefinition]) -> Vec<ClearedReference> {
        self.set_step_schema(step_id, fields_to_schema(fields))
    }

    pub fn rename_step(&mut self, step_id: DbId, name: impl Into<String>) -> bool {
        match self.steps.iter_mut().find(|s| s.id == step_id) {
            Some(step) => {
                step.name = name.into();
                true
            }
            None => false,
        }
    }

    pub fn set_step_requires_approval(&mut self, step_id: DbId, requires_approval: bool) -> bool {
        match self.steps.iter_mut().find(|s| s.id == step_id) {
            Some(step) => {
                step.requires_approval = requires_approval;
                true
            }
            None => false,
        }
    }

    /// Apply a step edit, renumber, and repair count-source references.
    ///
    /// References are bound to step ids before the edit so a reordered step
    /// keeps being referenced at its new position.
    fn edit_steps(&mut self, edit: impl FnOnce(&mut Vec<WorkflowStepDefinition>)) -> Vec<ClearedReference> {
        let bindings: Vec<Option<DbId>> = self
            .on_complete
            .iter()
            .map(|action| match action {
                CompletionAction::CreateEntities(config) => match &config.count_source {
                    CountSource::SubmissionField {
                        step_order: Some(order),
                        ..
                    } => step_at_order(&self.steps, *order).map(|s| s.id),
                    _ => None,
                },
                CompletionAction::StartWorkflow(_) => None,
            })
            .collect();

        edit(&mut self.steps);
        for (position, step) in self.steps.iter_mut().enumerate() {
            step.order_index = position as i32;
        }

        for (action, bound) in self.on_complete.iter_mut().zip(bindings) {
            let (Some(step_id), CompletionAction::CreateEntities(config)) = (bound, &mut *action) else {
                continue;
            };
            if let Some(step) = self.steps.iter().find(|s| s.id == step_id) {
                if let CountSource::SubmissionField { step_order, .. } = &mut config.count_source {
                    *step_order = Some(step.order_index);
                }
            }
        }

        self.revalidate_count_sources()
    }

    /// Clear every `submission_field` reference that no longer points at a
    /// numeric field of an existing step. The fallback value is kept.
    pub fn revalidate_count_sources(&mut self) -> Vec<ClearedReference> {
        let mut cleared = Vec::new();

        for (index, action) in self.on_complete.iter_mut().enumerate() {
            let CompletionAction::CreateEntities(config) = action else {
                continue;
            };
            let CountSource::SubmissionField {
                step_order: Some(order),
                field_path,
                ..
            } = &config.count_source
            else {
                continue;
            };
            let order = *order;

            let reason = match step_at_order(&self.steps, order) {
                None => Some(ClearReason::StepRemoved),
                Some(step) if !step.has_numeric_fields() => Some(ClearReason::NoNumericFields),
                Some(step) => match field_path {
                    Some(path) if !is_numeric_property(&step.form.schema, path) => {
                        Some(ClearReason::FieldNotNumeric)
                    }
                    _ => None,
                },
            };
            let Some(reason) = reason else {
                continue;
            };

            let reference = ClearedReference {
                action_index: index,
                step_order: Some(order),
                field_path: field_path.clone(),
                reason,
            };
            config.count_source = match reason {
                ClearReason::FieldNotNumeric => config.count_source.with_field(None),
                ClearReason::StepRemoved | ClearReason::NoNumericFields => {
                    config.count_source.with_step(None)
                }
            };
            tracing::debug!(
                action_index = index,
                step_order = order,
                ?reason,
                "Cleared stale count-source reference"
            );
            cleared.push(reference);
        }

        cleared
    }

    // --- Actions ---

    /// Append a fresh action. Returns `None` while no entity type is
    /// assigned.
    pub fn add_action(&mut self, kind: ActionKind) -> Option<usize> {
        if !self.completion_actions_enabled() {
            return None;
        }
        self.on_complete.push(CompletionAction::default_for(kind));
        Some(self.on_complete.len() - 1)
    }

    pub fn remove_action(&mut self, index: usize) -> bool {
        if index >= self.on_complete.len() {
            return false;
        }
        self.on_complete.remove(index);
        true
    }

    fn update_action(
        &mut self,
        index: usize,
        update: impl FnOnce(&CompletionAction) -> Option<CompletionAction>,
    ) -> bool {
        let Some(action) = self.on_complete.get_mut(index) else {
            return false;
        };
        match update(action) {
            Some(next) => {
                *action = next;
                true
            }
            None => false,
        }
    }

    fn update_count_source(
        &mut self,
        index: usize,
        update: impl FnOnce(&CountSource) -> Option<CountSource>,
    ) -> bool {
        self.update_action(index, |action| match action {
            CompletionAction::CreateEntities(config) => {
                let mut config = config.clone();
                config.count_source = update(&config.count_source)?;
                Some(CompletionAction::CreateEntities(config))
            }
            CompletionAction::StartWorkflow(_) => None,
        })
    }

    pub fn set_action_kind(&mut self, index: usize, kind: ActionKind) -> bool {
        self.update_action(index, |a| Some(a.with_kind(kind)))
    }

    pub fn set_action_entity_type(&mut self, index: usize, entity_type_id: Option<DbId>) -> bool {
        self.update_action(index, |a| Some(a.with_entity_type(entity_type_id)))
    }

    pub fn set_count_source_kind(&mut self, index: usize, kind: CountSourceKind) -> bool {
        self.update_count_source(index, |source| Some(source.with_kind(kind)))
    }

    /// Select the step a `submission_field` count reads from. Steps without
    /// numeric fields cannot be selected.
    pub fn set_count_step(&mut self, index: usize, step_order: Option<i32>) -> bool {
        if let Some(order) = step_order {
            if !is_submission_field_selectable(&self.steps, order) {
                return false;
            }
        }
        self.update_count_source(index, |source| match source {
            CountSource::SubmissionField { .. } => Some(source.with_step(step_order)),
            CountSource::Fixed { .. } => None,
        })
    }

    /// Select the numeric field a `submission_field` count reads. The field
    /// must be numeric on the currently selected step.
    pub fn set_count_field(&mut self, index: usize, field_path: Option<String>) -> bool {
        let steps = &self.steps;
        let Some(action) = self.on_complete.get_mut(index) else {
            return false;
        };
        let CompletionAction::CreateEntities(config) = action else {
            return false;
        };
        let CountSource::SubmissionField { step_order, .. } = &config.count_source else {
            return false;
        };
        if let Some(path) = &field_path {
            let valid = step_order
                .and_then(|order| step_at_order(steps, order))
                .is_some_and(|step| is_numeric_property(&step.form.schema, path));
            if !valid {
                return false;
            }
        }
        config.count_source = config.count_source.with_field(field_path);
        true
    }

    pub fn set_count_value(&mut self, index: usize, value: i64) -> bool {
        self.update_count_source(index, |source| Some(source.with_value(value)))
    }

    pub fn set_workflow(&mut self, index: usize, workflow_id: Option<DbId>) -> bool {
        self.update_action(index, |action| match action {
            CompletionAction::StartWorkflow(config) => {
                let mut config = config.clone();
                config.workflow_id = workflow_id;
                Some(CompletionAction::StartWorkflow(config))
            }
            CompletionAction::CreateEntities(_) => None,
        })
    }

    // --- Validation and output ---

    /// Everything that blocks saving.
    pub fn validation_report(&self, workflow_options: Option<&[WorkflowOption]>) -> DraftReport {
        let mut issues = Vec::new();

        if self.name.trim().is_empty() {
            issues.push(DraftIssue::Workflow {
                message: "Workflow name is required".to_string(),
            });
        }
        if let Err(message) = validate_step_order(&self.steps) {
            issues.push(DraftIssue::Workflow { message });
        }
        if !self.on_complete.is_empty() && !self.completion_actions_enabled() {
            issues.push(DraftIssue::Workflow {
                message: "Completion actions require at least one entity type".to_string(),
            });
        }

        for step in &self.steps {
            if step.name.trim().is_empty() {
                issues.push(DraftIssue::Step {
                    step_id: step.id,
                    message: "Step name is required".to_string(),
                });
            }
            let fields = schema_to_fields(&step.form.schema);
            for issue in validate_fields(&fields) {
                issues.push(DraftIssue::Field {
                    step_id: step.id,
                    field: issue.field,
                    message: issue.message,
                });
            }
        }

        for (index, action) in self.on_complete.iter().enumerate() {
            for issue in action_issues(action, &self.steps, workflow_options) {
                issues.push(DraftIssue::Action { index, issue });
            }
        }

        DraftReport {
            is_valid: issues.is_empty(),
            issues,
        }
    }

    fn ensure_valid(&self) -> Result<(), CoreError> {
        let report = self.validation_report(None);
        if report.is_valid {
            return Ok(());
        }
        let messages: Vec<String> = report.issues.iter().map(DraftIssue::message).collect();
        Err(CoreError::Validation(messages.join("; ")))
    }

    /// Build the create request, refusing an invalid draft.
    pub fn to_create_input(&self) -> Result<CreateWorkflowInput, CoreError> {
        self.ensure_valid()?;

        let input = CreateWorkflowInput {
            name: self.name.trim().to_string(),
            entity_type_ids: self.entity_type_ids.clone(),
            is_auto_start: self.is_auto_start,
            is_loopable: self.is_loopable,
            steps: self
                .steps
                .iter()
                .map(|s| CreateStepInput {
                    name: s.name.clone(),
                    order_index: s.order_index,
                    requires_approval: s.requires_approval,
                    form: s.form.clone(),
                })
                .collect(),
            on_complete: self.on_complete.clone(),
        };
        input
            .validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;
        Ok(input)
    }

    /// Build a partial update holding only what changed since `original`.
    ///
    /// `include_existing` is only sent alongside newly added entity types.
    /// An invalid draft is refused, the same as for creation.
    pub fn to_update_request(
        &self,
        original: &WorkflowDefinition,
        include_existing: bool,
    ) -> Result<UpdateWorkflowRequest, CoreError> {
        self.ensure_valid()?;

        let added: BTreeSet<DbId> = self
            .entity_type_ids
            .difference(&original.entity_type_ids)
            .copied()
            .collect();
        let name = self.name.trim();

        Ok(UpdateWorkflowRequest {
            name: (name != original.name).then(|| name.to_string()),
            is_auto_start: (self.is_auto_start != original.is_auto_start)
                .then_some(self.is_auto_start),
            is_loopable: (self.is_loopable != original.is_loopable).then_some(self.is_loopable),
            include_existing: (!added.is_empty()).then_some(include_existing),
            add_entity_type_ids: (!added.is_empty()).then_some(added),
            on_complete: (self.on_complete != original.on_complete)
                .then(|| self.on_complete.clone()),
        })
    }
}

/// Validate a stored definition as it is, before any repair.
///
/// Stale count-source references show up as issues here, where
/// [`WorkflowDraft::from_definition`] would clear them.
pub fn validate_definition(
    definition: &WorkflowDefinition,
    workflow_options: Option<&[WorkflowOption]>,
) -> DraftReport {
    WorkflowDraft::loaded(definition).validation_report(workflow_options)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
