//! Tests for the CLI command functions against JSON fixtures on disk.

mod common;

use common::{definition, record, submissions, Fixtures};
use entiflow_cli::commands;
use entiflow_core::completion::{ActionInstruction, ActionIssue, ActionOutcome};
use entiflow_core::editor::DraftIssue;
use entiflow_core::metadata_schema::FieldType;
use entiflow_core::step_status::{StepClickTarget, StepStatus};
use serde_json::json;

// ---------------------------------------------------------------------------
// statuses
// ---------------------------------------------------------------------------

#[test]
fn statuses_for_loopable_record_in_progress() {
    let fx = Fixtures::new();
    let def = fx.write("definition", &definition(true));
    let rec = fx.write("record", &record("in_progress", Some(11), json!({ "10": 1 })));

    let out = commands::statuses(&def, &rec).unwrap();
    let statuses: Vec<StepStatus> = out.steps.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Recorded, StepStatus::Current, StepStatus::Pending]
    );
    assert_eq!(out.steps[0].click_target, StepClickTarget::SubmissionHistory);
    assert_eq!(out.steps[2].click_target, StepClickTarget::FormPreview);
    assert_eq!(out.progress.done, 1);
    assert_eq!(out.progress.current_position, Some(1));
}

#[test]
fn statuses_for_completed_record() {
    let fx = Fixtures::new();
    let def = fx.write("definition", &definition(true));
    let rec = fx.write("record", &record("completed", None, json!({ "10": 1, "11": 1 })));

    let out = commands::statuses(&def, &rec).unwrap();
    assert!(out.steps.iter().all(|s| s.status == StepStatus::Completed));
    assert_eq!(out.progress.done, 3);
}

#[test]
fn statuses_rejects_record_of_other_workflow() {
    let fx = Fixtures::new();
    let def = fx.write("definition", &definition(false));
    let mut other = record("in_progress", Some(11), json!({}));
    other["workflow_id"] = json!(99);
    let rec = fx.write("record", &other);

    let err = commands::statuses(&def, &rec).unwrap_err();
    assert!(err.to_string().contains("belongs to workflow 99"));
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

#[test]
fn validate_accepts_consistent_definition() {
    let fx = Fixtures::new();
    let def = fx.write("definition", &definition(false));
    let report = commands::validate(&def, None).unwrap();
    assert!(report.is_valid, "{:?}", report.issues);
}

#[test]
fn validate_reports_unassignable_workflow() {
    let fx = Fixtures::new();
    let def = fx.write("definition", &definition(false));
    let options = fx.write(
        "options",
        &json!([{ "id": 9, "name": "Audit", "entity_type_ids": [8] }]),
    );
    let report = commands::validate(&def, Some(&options)).unwrap();
    assert!(!report.is_valid);
    assert!(matches!(report.issues[0], DraftIssue::Action { index: 1, .. }));
}

#[test]
fn validate_reports_stale_reference_as_stored() {
    let fx = Fixtures::new();
    let mut value = definition(false);
    value["on_complete"][0]["config"]["count_source"]["step_order"] = json!(0);
    let def = fx.write("definition", &value);

    let report = commands::validate(&def, None).unwrap();
    assert!(!report.is_valid);
    assert_eq!(
        report.issues,
        vec![DraftIssue::Action {
            index: 0,
            issue: ActionIssue::CountStepHasNoNumericFields { step_order: 0 }
        }]
    );
}

#[test]
fn validate_reports_unreadable_file() {
    let fx = Fixtures::new();
    let bad = fx.write_raw("broken.json", "{ not json");
    let err = commands::validate(&bad, None).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse"));
}

// ---------------------------------------------------------------------------
// resolve-actions
// ---------------------------------------------------------------------------

#[test]
fn resolve_reads_count_from_submission() {
    let fx = Fixtures::new();
    let def = fx.write("definition", &definition(false));
    let rec = fx.write("record", &record("completed", None, json!({ "10": 1, "11": 1 })));
    let subs = fx.write("submissions", &submissions(json!(7)));

    let outcomes = commands::resolve(&def, &rec, &subs, 3).unwrap();
    assert_eq!(
        outcomes,
        vec![
            ActionOutcome::Execute(ActionInstruction::CreateEntities {
                entity_type_id: 4,
                count: 7
            }),
            ActionOutcome::Execute(ActionInstruction::StartWorkflow {
                workflow_id: 9,
                entity_type_id: 3,
                entity_id: 77
            }),
        ]
    );
}

#[test]
fn resolve_falls_back_and_flags_cross_type_start() {
    let fx = Fixtures::new();
    let def = fx.write("definition", &definition(false));
    let rec = fx.write("record", &record("completed", None, json!({})));
    let subs = fx.write("submissions", &submissions(json!(null)));

    let outcomes = commands::resolve(&def, &rec, &subs, 6).unwrap();
    assert_eq!(
        outcomes[0],
        ActionOutcome::Execute(ActionInstruction::CreateEntities {
            entity_type_id: 4,
            count: 1
        })
    );
    assert!(matches!(outcomes[1], ActionOutcome::Unsupported { .. }));
}

#[test]
fn resolve_refuses_unfinished_record() {
    let fx = Fixtures::new();
    let def = fx.write("definition", &definition(false));
    let rec = fx.write("record", &record("in_progress", Some(12), json!({})));
    let subs = fx.write("submissions", &json!([]));

    let err = commands::resolve(&def, &rec, &subs, 3).unwrap_err();
    assert!(err.to_string().contains("in_progress"));
}

// ---------------------------------------------------------------------------
// schema conversion
// ---------------------------------------------------------------------------

#[test]
fn fields_compile_and_parse_back() {
    let fx = Fixtures::new();
    let fields = fx.write(
        "fields",
        &json!([
            { "name": "species", "label": "Species", "type": "string", "required": true },
            { "name": "tags", "label": "Tags", "type": "dropdown", "required": false, "options": ["a", "b"] }
        ]),
    );

    let schema = commands::compile_fields(&fields).unwrap();
    let rendered: serde_json::Value =
        serde_json::from_str(&commands::render(&schema, false).unwrap()).unwrap();
    assert_eq!(
        rendered,
        json!({
            "type": "object",
            "properties": {
                "species": { "type": "string", "title": "Species" },
                "tags": { "type": "string", "title": "Tags", "enum": ["a", "b"] }
            },
            "required": ["species"]
        })
    );

    let schema_path = fx.write("schema", &rendered);
    let parsed = commands::parse_schema(&schema_path).unwrap();
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[1].field_type, FieldType::Dropdown);
    assert!(parsed[0].required);
}

#[test]
fn incomplete_dropdown_is_rejected() {
    let fx = Fixtures::new();
    let fields = fx.write(
        "fields",
        &json!([{ "name": "tags", "label": "Tags", "type": "dropdown", "options": [] }]),
    );
    let err = commands::compile_fields(&fields).unwrap_err();
    assert!(err.to_string().contains("at least one option"));
}

// ---------------------------------------------------------------------------
// validate-metadata
// ---------------------------------------------------------------------------

fn specimen_type() -> serde_json::Value {
    json!({
        "id": 3,
        "name": "Specimen",
        "code_prefix": "SP",
        "metadata_schema": {
            "type": "object",
            "properties": {
                "species": { "type": "string", "title": "Species" },
                "weight": { "type": "number", "title": "Weight" }
            },
            "required": ["species"]
        }
    })
}

#[test]
fn metadata_matching_entity_type_passes() {
    let fx = Fixtures::new();
    let entity_type = fx.write("entity_type", &specimen_type());
    let metadata = fx.write("metadata", &json!({ "species": "Rana", "weight": 1.5 }));
    assert!(commands::validate_metadata(&entity_type, &metadata)
        .unwrap()
        .is_empty());
}

#[test]
fn metadata_issues_are_listed_per_field() {
    let fx = Fixtures::new();
    let entity_type = fx.write("entity_type", &specimen_type());
    let metadata = fx.write("metadata", &json!({ "weight": "heavy", "colour": "red" }));
    let issues = commands::validate_metadata(&entity_type, &metadata).unwrap();
    let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
    assert_eq!(fields, vec!["colour", "species", "weight"]);
}

#[test]
fn metadata_must_be_an_object() {
    let fx = Fixtures::new();
    let entity_type = fx.write("entity_type", &specimen_type());
    let metadata = fx.write("metadata", &json!(["species"]));
    let err = commands::validate_metadata(&entity_type, &metadata).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse"));
}
