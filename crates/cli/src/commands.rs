//! Command implementations. Each loads its inputs, calls the core, and
//! returns a serializable result.

use std::path::Path;

use anyhow::{bail, Context};
use serde::de::DeserializeOwned;
use serde::Serialize;

use entiflow_core::completion::{resolve_actions, ActionOutcome, ResolutionContext};
use entiflow_core::editor::{validate_definition, DraftReport};
use entiflow_core::metadata_schema::{
    fields_to_schema, schema_to_fields, validate_fields, FieldDefinition, FieldIssue,
    MetadataSchema,
};
use entiflow_core::step_status::{
    resolve_step_statuses, step_click_targets, summarize_progress, ProgressSummary,
    StepClickTarget, StepStatus,
};
use entiflow_core::submissions::SubmissionHistory;
use entiflow_core::types::DbId;
use entiflow_core::workflow::{EntityType, WorkflowDefinition, WorkflowOption, WorkflowRecord};

/// Read and deserialize a JSON file.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Serialize a command result for printing.
pub fn render<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<String> {
    let out = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    out.context("Failed to serialize output")
}

// ---------------------------------------------------------------------------
// statuses
// ---------------------------------------------------------------------------

/// Display state of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepView {
    pub step_id: DbId,
    pub name: String,
    pub order_index: i32,
    pub status: StepStatus,
    pub submission_count: u32,
    pub click_target: StepClickTarget,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusesOutput {
    pub record_id: DbId,
    pub steps: Vec<StepView>,
    pub progress: ProgressSummary,
}

pub fn statuses(definition_path: &Path, record_path: &Path) -> anyhow::Result<StatusesOutput> {
    let definition: WorkflowDefinition = load_json(definition_path)?;
    let record: WorkflowRecord = load_json(record_path)?;
    if record.workflow_id != definition.id {
        bail!(
            "Record {} belongs to workflow {}, not {}",
            record.id,
            record.workflow_id,
            definition.id
        );
    }

    let steps = definition.ordered_steps();
    let resolved = resolve_step_statuses(&record, &steps, definition.is_loopable);
    let progress = summarize_progress(&resolved);
    tracing::debug!(
        record_id = record.id,
        done = progress.done,
        total = progress.total,
        "Resolved step statuses"
    );

    let targets = step_click_targets(&record, &steps, definition.is_loopable);
    let views = steps
        .iter()
        .zip(resolved)
        .zip(targets)
        .map(|((step, status), click_target)| StepView {
            step_id: step.id,
            name: step.name.clone(),
            order_index: step.order_index,
            status,
            submission_count: record.submission_count(step.id),
            click_target,
        })
        .collect();

    Ok(StatusesOutput {
        record_id: record.id,
        steps: views,
        progress,
    })
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

pub fn validate(
    definition_path: &Path,
    workflow_options_path: Option<&Path>,
) -> anyhow::Result<DraftReport> {
    let definition: WorkflowDefinition = load_json(definition_path)?;
    let options = workflow_options_path
        .map(load_json::<Vec<WorkflowOption>>)
        .transpose()?;

    let report = validate_definition(&definition, options.as_deref());
    if !report.is_valid {
        tracing::info!(
            workflow_id = definition.id,
            issues = report.issues.len(),
            "Workflow definition is invalid"
        );
    }
    Ok(report)
}

// ---------------------------------------------------------------------------
// resolve-actions
// ---------------------------------------------------------------------------

pub fn resolve(
    definition_path: &Path,
    record_path: &Path,
    submissions_path: &Path,
    entity_type_id: DbId,
) -> anyhow::Result<Vec<ActionOutcome>> {
    let definition: WorkflowDefinition = load_json(definition_path)?;
    let record: WorkflowRecord = load_json(record_path)?;
    let submissions: SubmissionHistory = load_json(submissions_path)?;

    if !record.is_completed() {
        bail!(
            "Record {} is {}; actions only run on completed records",
            record.id,
            record.status.as_str()
        );
    }

    let steps = definition.ordered_steps();
    let ctx = ResolutionContext {
        record: &record,
        entity_type_id,
        steps: &steps,
        submissions: &submissions,
    };
    Ok(resolve_actions(&definition.on_complete, &ctx))
}

// ---------------------------------------------------------------------------
// schema conversion
// ---------------------------------------------------------------------------

pub fn compile_fields(fields_path: &Path) -> anyhow::Result<MetadataSchema> {
    let fields: Vec<FieldDefinition> = load_json(fields_path)?;
    let issues = validate_fields(&fields);
    if !issues.is_empty() {
        let messages: Vec<String> = issues
            .iter()
            .map(|i| format!("{}: {}", i.field, i.message))
            .collect();
        bail!("Invalid fields: {}", messages.join("; "));
    }
    Ok(fields_to_schema(&fields))
}

pub fn parse_schema(schema_path: &Path) -> anyhow::Result<Vec<FieldDefinition>> {
    let schema: MetadataSchema = load_json(schema_path)?;
    Ok(schema_to_fields(&schema))
}

pub fn validate_metadata(
    entity_type_path: &Path,
    metadata_path: &Path,
) -> anyhow::Result<Vec<FieldIssue>> {
    let entity_type: EntityType = load_json(entity_type_path)?;
    let metadata: serde_json::Map<String, serde_json::Value> = load_json(metadata_path)?;
    let issues = entity_type.validate_metadata(&metadata);
    if !issues.is_empty() {
        tracing::info!(
            entity_type_id = entity_type.id,
            issues = issues.len(),
            "Entity metadata is invalid"
        );
    }
    Ok(issues)
}
