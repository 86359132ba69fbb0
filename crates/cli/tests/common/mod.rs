//! Shared fixtures for CLI command tests.

use std::path::PathBuf;

use serde_json::{json, Value};
use tempfile::TempDir;

/// A temp directory holding JSON fixtures.
pub struct Fixtures {
    dir: TempDir,
}

impl Fixtures {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    /// Write `value` as `<name>.json` and return its path.
    pub fn write(&self, name: &str, value: &Value) -> PathBuf {
        let path = self.dir.path().join(format!("{name}.json"));
        std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
        path
    }

    pub fn write_raw(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }
}

/// Three-step loopable workflow; step 1 collects an integer `quantity`.
pub fn definition(is_loopable: bool) -> Value {
    json!({
        "id": 1,
        "name": "Specimen intake",
        "is_loopable": is_loopable,
        "is_auto_start": true,
        "entity_type_ids": [3],
        "steps": [
            {
                "id": 10, "name": "Register", "order_index": 0, "requires_approval": false,
                "form": { "name": "Register", "schema": {
                    "type": "object",
                    "properties": { "species": { "type": "string", "title": "Species" } },
                    "required": ["species"]
                } }
            },
            {
                "id": 11, "name": "Count", "order_index": 1, "requires_approval": true,
                "form": { "name": "Count", "schema": {
                    "type": "object",
                    "properties": { "quantity": { "type": "integer", "title": "Quantity" } }
                } }
            },
            {
                "id": 12, "name": "Close", "order_index": 2, "requires_approval": false,
                "form": { "name": "Close", "schema": { "type": "object", "properties": {} } }
            }
        ],
        "on_complete": [
            {
                "type": "create_entities",
                "config": {
                    "entity_type_id": 4,
                    "count_source": {
                        "type": "submission_field", "value": 1,
                        "step_order": 1, "field_path": "quantity"
                    }
                }
            },
            {
                "type": "start_workflow",
                "config": { "entity_type_id": 3, "workflow_id": 9 }
            }
        ]
    })
}

pub fn record(status: &str, current_step_id: Option<i64>, counts: Value) -> Value {
    json!({
        "id": 50,
        "workflow_id": 1,
        "entity_id": 77,
        "status": status,
        "current_step_id": current_step_id,
        "started_at": "2026-06-01T09:00:00Z",
        "step_submission_counts": counts
    })
}

pub fn submissions(quantity: Value) -> Value {
    json!([
        {
            "id": 1, "step_id": 10, "data": { "species": "Rana" },
            "submitted_by": 2, "submitted_at": "2026-06-01T10:00:00Z", "status": "approved"
        },
        {
            "id": 2, "step_id": 11, "data": { "quantity": quantity },
            "submitted_by": 2, "submitted_at": "2026-06-01T11:00:00Z", "status": "approved",
            "reviewed_by": 5
        }
    ])
}
