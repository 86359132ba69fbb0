//! Actions that run when a workflow record completes.
//!
//! A [`CompletionAction`] either creates entities or starts another
//! workflow. The entity count of a `create_entities` action comes from a
//! [`CountSource`]: a fixed number, or a numeric field read from a prior
//! step's latest submission.
//!
//! The backend executes actions. This module owns their shape, the pure
//! editing transitions, the validation rules, and the resolution semantics
//! that turn a configured action into an [`ActionInstruction`].

use serde::{Deserialize, Serialize};

use crate::metadata_schema::{is_numeric_property, numeric_properties};
use crate::submissions::SubmissionHistory;
use crate::types::DbId;
use crate::workflow::{step_at_order, WorkflowOption, WorkflowRecord, WorkflowStepDefinition};

/// Smallest count an action may resolve to.
pub const MIN_COUNT: i64 = 1;

// ---------------------------------------------------------------------------
// Count source
// ---------------------------------------------------------------------------

/// Discriminant of a [`CountSource`], as picked in the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountSourceKind {
    Fixed,
    SubmissionField,
}

/// How many entities a `create_entities` action creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CountSource {
    Fixed {
        value: i64,
    },
    /// Read from a numeric field of the step at `step_order`, falling back
    /// to `value` when the field is absent.
    SubmissionField {
        value: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_order: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field_path: Option<String>,
    },
}

impl Default for CountSource {
    fn default() -> Self {
        Self::Fixed { value: MIN_COUNT }
    }
}

impl CountSource {
    pub fn kind(&self) -> CountSourceKind {
        match self {
            Self::Fixed { .. } => CountSourceKind::Fixed,
            Self::SubmissionField { .. } => CountSourceKind::SubmissionField,
        }
    }

    /// The fixed count, or the fallback for a submission field.
    pub fn value(&self) -> i64 {
        match self {
            Self::Fixed { value } | Self::SubmissionField { value, .. } => *value,
        }
    }

    /// Switch kind. The step reference is always dropped; the value is kept.
    pub fn with_kind(&self, kind: CountSourceKind) -> Self {
        if kind == self.kind() {
            return self.clone();
        }
        let value = self.value().max(MIN_COUNT);
        match kind {
            CountSourceKind::Fixed => Self::Fixed { value },
            CountSourceKind::SubmissionField => Self::SubmissionField {
                value,
                step_order: None,
                field_path: None,
            },
        }
    }

    /// Point at a different step. The field belongs to the old step, so it
    /// is cleared.
    pub fn with_step(&self, step_order: Option<i32>) -> Self {
        match self {
            Self::Fixed { .. } => self.clone(),
            Self::SubmissionField { value, .. } => Self::SubmissionField {
                value: *value,
                step_order,
                field_path: None,
            },
        }
    }

    pub fn with_field(&self, field_path: Option<String>) -> Self {
        match self {
            Self::Fixed { .. } => self.clone(),
            Self::SubmissionField {
                value, step_order, ..
            } => Self::SubmissionField {
                value: *value,
                step_order: *step_order,
                field_path,
            },
        }
    }

    pub fn with_value(&self, value: i64) -> Self {
        match self {
            Self::Fixed { .. } => Self::Fixed { value },
            Self::SubmissionField {
                step_order,
                field_path,
                ..
            } => Self::SubmissionField {
                value,
                step_order: *step_order,
                field_path: field_path.clone(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Discriminant of a [`CompletionAction`], as picked in the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateEntities,
    StartWorkflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreateEntitiesConfig {
    #[serde(default)]
    pub entity_type_id: Option<DbId>,
    #[serde(default)]
    pub count_source: CountSource,
}

impl CreateEntitiesConfig {
    /// Change the entity type. The count source does not depend on it.
    pub fn with_entity_type(&self, entity_type_id: Option<DbId>) -> Self {
        Self {
            entity_type_id,
            count_source: self.count_source.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StartWorkflowConfig {
    #[serde(default)]
    pub entity_type_id: Option<DbId>,
    #[serde(default)]
    pub workflow_id: Option<DbId>,
}

impl StartWorkflowConfig {
    /// Change the entity type. The valid workflow set depends on it, so the
    /// workflow is cleared whenever the type actually changes.
    pub fn with_entity_type(&self, entity_type_id: Option<DbId>) -> Self {
        let workflow_id = if entity_type_id == self.entity_type_id {
            self.workflow_id
        } else {
            None
        };
        Self {
            entity_type_id,
            workflow_id,
        }
    }
}

/// A declarative rule executed when a record reaches `completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum CompletionAction {
    CreateEntities(CreateEntitiesConfig),
    StartWorkflow(StartWorkflowConfig),
}

impl CompletionAction {
    /// A fresh action of the given kind with nothing selected yet.
    pub fn default_for(kind: ActionKind) -> Self {
        match kind {
            ActionKind::CreateEntities => Self::CreateEntities(CreateEntitiesConfig::default()),
            ActionKind::StartWorkflow => Self::StartWorkflow(StartWorkflowConfig::default()),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::CreateEntities(_) => ActionKind::CreateEntities,
            Self::StartWorkflow(_) => ActionKind::StartWorkflow,
        }
    }

    pub fn entity_type_id(&self) -> Option<DbId> {
        match self {
            Self::CreateEntities(c) => c.entity_type_id,
            Self::StartWorkflow(c) => c.entity_type_id,
        }
    }

    /// Switch kind, replacing the config with a fresh default. Same kind is
    /// a no-op.
    pub fn with_kind(&self, kind: ActionKind) -> Self {
        if kind == self.kind() {
            self.clone()
        } else {
            Self::default_for(kind)
        }
    }

    pub fn with_entity_type(&self, entity_type_id: Option<DbId>) -> Self {
        match self {
            Self::CreateEntities(c) => Self::CreateEntities(c.with_entity_type(entity_type_id)),
            Self::StartWorkflow(c) => Self::StartWorkflow(c.with_entity_type(entity_type_id)),
        }
    }
}

// ---------------------------------------------------------------------------
// Gating and validation
// ---------------------------------------------------------------------------

/// A step that may feed a `submission_field` count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountStepOption {
    pub step_id: DbId,
    pub order_index: i32,
    pub name: String,
    pub numeric_fields: Vec<String>,
}

/// Steps offered in the count-source step picker: only those with at least
/// one numeric field.
pub fn numeric_step_options(steps: &[WorkflowStepDefinition]) -> Vec<CountStepOption> {
    let mut options: Vec<CountStepOption> = steps
        .iter()
        .filter_map(|step| {
            let numeric_fields: Vec<String> = numeric_properties(&step.form.schema)
                .into_iter()
                .map(String::from)
                .collect();
            (!numeric_fields.is_empty()).then(|| CountStepOption {
                step_id: step.id,
                order_index: step.order_index,
                name: step.name.clone(),
                numeric_fields,
            })
        })
        .collect();
    options.sort_by_key(|o| o.order_index);
    options
}

/// Whether the step at `step_order` exists and has a numeric field.
pub fn is_submission_field_selectable(steps: &[WorkflowStepDefinition], step_order: i32) -> bool {
    step_at_order(steps, step_order).is_some_and(|s| s.has_numeric_fields())
}

/// A reason an action cannot be saved as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ActionIssue {
    MissingEntityType,
    MissingWorkflow,
    CountBelowMinimum { value: i64 },
    MissingCountStep,
    CountStepNotFound { step_order: i32 },
    CountStepHasNoNumericFields { step_order: i32 },
    MissingCountField,
    CountFieldNotNumeric { step_order: i32, field_path: String },
    WorkflowNotAssignable { workflow_id: DbId, entity_type_id: DbId },
}

impl ActionIssue {
    /// Human-readable message for display.
    pub fn message(&self) -> String {
        match self {
            Self::MissingEntityType => "An entity type must be selected".to_string(),
            Self::MissingWorkflow => "A workflow must be selected".to_string(),
            Self::CountBelowMinimum { value } => {
                format!("Count must be at least {MIN_COUNT}, got {value}")
            }
            Self::MissingCountStep => "A step must be selected for the count".to_string(),
            Self::CountStepNotFound { step_order } => {
                format!("No step at position {step_order}")
            }
            Self::CountStepHasNoNumericFields { step_order } => {
                format!("Step at position {step_order} has no numeric fields")
            }
            Self::MissingCountField => "A numeric field must be selected for the count".to_string(),
            Self::CountFieldNotNumeric {
                step_order,
                field_path,
            } => format!("'{field_path}' is not a numeric field of step {step_order}"),
            Self::WorkflowNotAssignable {
                workflow_id,
                entity_type_id,
            } => format!(
                "Workflow {workflow_id} cannot be started for entity type {entity_type_id}"
            ),
        }
    }

    /// Whether the issue is a stale reference into the step list, as
    /// opposed to something the user has not filled in yet.
    pub fn is_stale_step_reference(&self) -> bool {
        matches!(
            self,
            Self::CountStepNotFound { .. }
                | Self::CountStepHasNoNumericFields { .. }
                | Self::CountFieldNotNumeric { .. }
        )
    }
}

/// Problems with a count source against the current step list.
pub fn count_source_issues(
    source: &CountSource,
    steps: &[WorkflowStepDefinition],
) -> Vec<ActionIssue> {
    let mut issues = Vec::new();
    if source.value() < MIN_COUNT {
        issues.push(ActionIssue::CountBelowMinimum {
            value: source.value(),
        });
    }

    let CountSource::SubmissionField {
        step_order,
        field_path,
        ..
    } = source
    else {
        return issues;
    };

    let Some(step_order) = *step_order else {
        issues.push(ActionIssue::MissingCountStep);
        return issues;
    };
    let Some(step) = step_at_order(steps, step_order) else {
        issues.push(ActionIssue::CountStepNotFound { step_order });
        return issues;
    };
    if !step.has_numeric_fields() {
        issues.push(ActionIssue::CountStepHasNoNumericFields { step_order });
        return issues;
    }
    match field_path {
        None => issues.push(ActionIssue::MissingCountField),
        Some(path) if !is_numeric_property(&step.form.schema, path) => {
            issues.push(ActionIssue::CountFieldNotNumeric {
                step_order,
                field_path: path.clone(),
            })
        }
        Some(_) => {}
    }
    issues
}

/// Every problem with one action.
///
/// When `workflow_options` is given, a selected workflow must also be
/// assignable to the selected entity type.
pub fn action_issues(
    action: &CompletionAction,
    steps: &[WorkflowStepDefinition],
    workflow_options: Option<&[WorkflowOption]>,
) -> Vec<ActionIssue> {
    let mut issues = Vec::new();
    if action.entity_type_id().is_none() {
        issues.push(ActionIssue::MissingEntityType);
    }
    match action {
        CompletionAction::CreateEntities(config) => {
            issues.extend(count_source_issues(&config.count_source, steps));
        }
        CompletionAction::StartWorkflow(config) => match config.workflow_id {
            None => issues.push(ActionIssue::MissingWorkflow),
            Some(workflow_id) => {
                if let (Some(options), Some(entity_type_id)) =
                    (workflow_options, config.entity_type_id)
                {
                    let assignable = options
                        .iter()
                        .any(|w| w.id == workflow_id && w.is_assignable_to(entity_type_id));
                    if !assignable {
                        issues.push(ActionIssue::WorkflowNotAssignable {
                            workflow_id,
                            entity_type_id,
                        });
                    }
                }
            }
        },
    }
    issues
}

/// Structural completeness: mandatory ids set and a positive count.
///
/// This is the last check before an action is included in a save request.
pub fn is_action_complete(action: &CompletionAction) -> bool {
    match action {
        CompletionAction::CreateEntities(c) => {
            c.entity_type_id.is_some() && c.count_source.value() >= MIN_COUNT
        }
        CompletionAction::StartWorkflow(c) => c.entity_type_id.is_some() && c.workflow_id.is_some(),
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Everything needed to resolve the actions of one completed record.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionContext<'a> {
    pub record: &'a WorkflowRecord,
    /// Entity type of the record's own entity.
    pub entity_type_id: DbId,
    pub steps: &'a [WorkflowStepDefinition],
    pub submissions: &'a SubmissionHistory,
}

/// What the backend should do for one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionInstruction {
    CreateEntities {
        entity_type_id: DbId,
        count: i64,
    },
    StartWorkflow {
        workflow_id: DbId,
        entity_type_id: DbId,
        entity_id: DbId,
    },
}

/// Result of resolving one configured action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ActionOutcome {
    Execute(ActionInstruction),
    /// The action is incomplete and cannot be executed.
    Skipped { reason: String },
    /// The combination is not supported; nothing is guessed.
    Unsupported { reason: String },
}

fn numeric_value(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        serde_json::Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    }
}

/// Read a numeric value from the latest non-rejected submission of the
/// step at `step_order`.
///
/// Returns `None` when the reference is incomplete, the step or field no
/// longer qualifies, nothing usable was submitted, or the value is not
/// numeric.
pub fn lookup_numeric_field(
    submissions: &SubmissionHistory,
    steps: &[WorkflowStepDefinition],
    step_order: Option<i32>,
    field_path: Option<&str>,
) -> Option<i64> {
    let step = step_at_order(steps, step_order?)?;
    let field = field_path?;
    if !is_numeric_property(&step.form.schema, field) {
        return None;
    }
    let submission = submissions.latest_accepted_for_step(step.id)?;
    numeric_value(submission.data.get(field)?)
}

/// Resolve the number of entities to create, never below [`MIN_COUNT`].
pub fn resolve_count(
    source: &CountSource,
    steps: &[WorkflowStepDefinition],
    submissions: &SubmissionHistory,
) -> i64 {
    let count = match source {
        CountSource::Fixed { value } => *value,
        CountSource::SubmissionField {
            value,
            step_order,
            field_path,
        } => lookup_numeric_field(submissions, steps, *step_order, field_path.as_deref())
            .unwrap_or(*value),
    };
    count.max(MIN_COUNT)
}

/// Resolve one action against a completed record.
pub fn resolve_action(action: &CompletionAction, ctx: &ResolutionContext<'_>) -> ActionOutcome {
    match action {
        CompletionAction::CreateEntities(config) => {
            let Some(entity_type_id) = config.entity_type_id else {
                return ActionOutcome::Skipped {
                    reason: "create_entities has no entity type".to_string(),
                };
            };
            let count = resolve_count(&config.count_source, ctx.steps, ctx.submissions);
            ActionOutcome::Execute(ActionInstruction::CreateEntities {
                entity_type_id,
                count,
            })
        }
        CompletionAction::StartWorkflow(config) => {
            let (Some(entity_type_id), Some(workflow_id)) =
                (config.entity_type_id, config.workflow_id)
            else {
                return ActionOutcome::Skipped {
                    reason: "start_workflow needs an entity type and a workflow".to_string(),
                };
            };
            if entity_type_id != ctx.entity_type_id {
                return ActionOutcome::Unsupported {
                    reason: format!(
                        "start_workflow for entity type {entity_type_id} cannot target \
                         a record of entity type {}",
                        ctx.entity_type_id
                    ),
                };
            }
            ActionOutcome::Execute(ActionInstruction::StartWorkflow {
                workflow_id,
                entity_type_id,
                entity_id: ctx.record.entity_id,
            })
        }
    }
}

/// Resolve every action in list order. Nothing is resolved for a record
/// that has not completed.
pub fn resolve_actions(
    actions: &[CompletionAction],
    ctx: &ResolutionContext<'_>,
) -> Vec<ActionOutcome> {
    if !ctx.record.is_completed() {
        tracing::debug!(record_id = ctx.record.id, "Record not completed; no actions resolved");
        return Vec::new();
    }
    actions
        .iter()
        .enumerate()
        .map(|(index, action)| {
            let outcome = resolve_action(action, ctx);
            match &outcome {
                ActionOutcome::Execute(instruction) => {
                    tracing::debug!(record_id = ctx.record.id, index, ?instruction, "Resolved action");
                }
                ActionOutcome::Skipped { reason } | ActionOutcome::Unsupported { reason } => {
                    tracing::warn!(record_id = ctx.record.id, index, %reason, "Action not executable");
                }
            }
            outcome
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
