//! Field definitions and their JSON-Schema-shaped metadata schema.
//!
//! Entity-type metadata and workflow step forms are both authored as an
//! ordered list of [`FieldDefinition`]s and stored as a [`MetadataSchema`].
//! [`fields_to_schema`] and [`schema_to_fields`] convert between the two
//! without losing order or content.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// The only `format` value the compiler understands.
pub const FORMAT_DATE: &str = "date";

/// Expected layout for `date` values in submitted data.
pub const DATE_LAYOUT: &str = "%Y-%m-%d";

// ---------------------------------------------------------------------------
// Field type
// ---------------------------------------------------------------------------

/// The editor-facing type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Date,
    Dropdown,
}

impl FieldType {
    /// All field types in the order the editor offers them.
    pub const ALL: [FieldType; 6] = [
        Self::String,
        Self::Number,
        Self::Integer,
        Self::Boolean,
        Self::Date,
        Self::Dropdown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Dropdown => "dropdown",
        }
    }

    /// Parse a field type from its wire string.
    pub fn from_str_value(s: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Invalid field type '{s}'. Must be one of: {}",
                    Self::ALL.map(|t| t.as_str()).join(", ")
                ))
            })
    }

    /// Whether values of this type can feed a numeric count.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Number | Self::Integer)
    }
}

/// The JSON Schema primitive type stored on a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    #[default]
    String,
    Number,
    Integer,
    Boolean,
}

impl PropertyType {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Number | Self::Integer)
    }
}

/// Top-level schema type. Metadata schemas are always objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaType {
    #[default]
    Object,
}

// ---------------------------------------------------------------------------
// Field definition
// ---------------------------------------------------------------------------

/// One field as the form builder edits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Machine-readable key used in submitted data.
    pub name: String,
    /// Human-readable display label.
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Allowed values, only meaningful for `dropdown` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl FieldDefinition {
    /// Create a non-dropdown field with no description.
    pub fn new(name: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            field_type,
            required: false,
            description: None,
            options: None,
        }
    }

    /// Create a dropdown field with the given options.
    pub fn dropdown(
        name: impl Into<String>,
        label: impl Into<String>,
        options: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            options: Some(options.into_iter().map(Into::into).collect()),
            ..Self::new(name, label, FieldType::Dropdown)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// A single property of a [`MetadataSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type", default)]
    pub property_type: PropertyType,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PropertySchema {
    /// The editor-facing type, by priority: enum, then date format, then
    /// the declared primitive type.
    pub fn field_type(&self) -> FieldType {
        if self.enum_values.is_some() {
            return FieldType::Dropdown;
        }
        if self.format.as_deref() == Some(FORMAT_DATE) {
            return FieldType::Date;
        }
        match self.property_type {
            PropertyType::String => FieldType::String,
            PropertyType::Number => FieldType::Number,
            PropertyType::Integer => FieldType::Integer,
            PropertyType::Boolean => FieldType::Boolean,
        }
    }
}

/// An object schema whose property order is the declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetadataSchema {
    #[serde(rename = "type", default)]
    pub schema_type: SchemaType,
    #[serde(default)]
    pub properties: IndexMap<String, PropertySchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl MetadataSchema {
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// Compare two schemas treating `required` as a set.
    ///
    /// Property order is significant.
    pub fn is_equivalent(&self, other: &MetadataSchema) -> bool {
        let ours: HashSet<&str> = self.required.iter().map(String::as_str).collect();
        let theirs: HashSet<&str> = other.required.iter().map(String::as_str).collect();
        ours == theirs && self.properties.iter().eq(other.properties.iter())
    }
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Parse a schema into editable fields, in declaration order.
pub fn schema_to_fields(schema: &MetadataSchema) -> Vec<FieldDefinition> {
    schema
        .properties
        .iter()
        .map(|(name, prop)| {
            let field_type = prop.field_type();
            let label = if prop.title.is_empty() {
                name.clone()
            } else {
                prop.title.clone()
            };
            FieldDefinition {
                name: name.clone(),
                label,
                field_type,
                required: schema.is_required(name),
                description: prop.description.clone(),
                options: match field_type {
                    FieldType::Dropdown => prop.enum_values.clone(),
                    _ => None,
                },
            }
        })
        .collect()
}

/// Build a schema from editable fields, preserving list order.
///
/// `date` and `dropdown` fields are stored as strings carrying a `format`
/// or an `enum` respectively.
pub fn fields_to_schema(fields: &[FieldDefinition]) -> MetadataSchema {
    let mut properties = IndexMap::with_capacity(fields.len());
    let mut required = Vec::new();

    for field in fields {
        let property_type = match field.field_type {
            FieldType::String | FieldType::Date | FieldType::Dropdown => PropertyType::String,
            FieldType::Number => PropertyType::Number,
            FieldType::Integer => PropertyType::Integer,
            FieldType::Boolean => PropertyType::Boolean,
        };
        let format = (field.field_type == FieldType::Date).then(|| FORMAT_DATE.to_string());
        let enum_values = (field.field_type == FieldType::Dropdown)
            .then(|| field.options.clone().unwrap_or_default());

        properties.insert(
            field.name.clone(),
            PropertySchema {
                property_type,
                title: field.label.clone(),
                format,
                enum_values,
                description: field.description.clone(),
            },
        );
        if field.required {
            required.push(field.name.clone());
        }
    }

    MetadataSchema {
        schema_type: SchemaType::Object,
        properties,
        required,
    }
}

/// Names of `number`/`integer` properties, in declaration order.
pub fn numeric_properties(schema: &MetadataSchema) -> Vec<&str> {
    schema
        .properties
        .iter()
        .filter(|(_, p)| p.enum_values.is_none() && p.property_type.is_numeric())
        .map(|(name, _)| name.as_str())
        .collect()
}

/// Whether `name` is a numeric property of `schema`.
pub fn is_numeric_property(schema: &MetadataSchema, name: &str) -> bool {
    numeric_properties(schema).contains(&name)
}

// ---------------------------------------------------------------------------
// Field validation
// ---------------------------------------------------------------------------

/// A single field-level problem found while editing or submitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Whether a field has everything it needs to be saved.
///
/// A dropdown needs at least one non-blank option.
pub fn is_field_complete(field: &FieldDefinition) -> bool {
    if field.name.trim().is_empty() || field.label.trim().is_empty() {
        return false;
    }
    match field.field_type {
        FieldType::Dropdown => field
            .options
            .as_ref()
            .is_some_and(|opts| opts.iter().any(|o| !o.trim().is_empty())),
        _ => true,
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Check a field list before it is compiled into a schema.
///
/// Returns an empty vec when every field is savable.
pub fn validate_fields(fields: &[FieldDefinition]) -> Vec<FieldIssue> {
    let mut issues = Vec::new();
    let mut seen = HashSet::new();

    for field in fields {
        if !is_identifier(&field.name) {
            issues.push(FieldIssue::new(
                &field.name,
                format!("Field name '{}' must be a valid identifier", field.name),
            ));
        } else if !seen.insert(field.name.as_str()) {
            issues.push(FieldIssue::new(
                &field.name,
                format!("Duplicate field name '{}'", field.name),
            ));
        }
        if field.label.trim().is_empty() {
            issues.push(FieldIssue::new(&field.name, "Label is required"));
        }
        if field.field_type == FieldType::Dropdown && !is_field_complete(field) {
            issues.push(FieldIssue::new(
                &field.name,
                "Dropdown fields need at least one option",
            ));
        }
    }

    issues
}

// ---------------------------------------------------------------------------
// Submission data validation
// ---------------------------------------------------------------------------

fn is_filled(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn is_integral(value: &serde_json::Value) -> bool {
    value.is_i64()
        || value.is_u64()
        || value.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0)
}

/// Validate submitted step data against the step's form schema.
///
/// Checks required fields, primitive types, date layout, enum membership,
/// and rejects keys the schema does not declare. Null values on optional
/// fields are accepted.
pub fn validate_submission_data(
    schema: &MetadataSchema,
    data: &serde_json::Map<String, serde_json::Value>,
) -> Vec<FieldIssue> {
    let mut issues = Vec::new();

    for key in data.keys() {
        if !schema.properties.contains_key(key) {
            issues.push(FieldIssue::new(key, format!("Unknown field: {key}")));
        }
    }

    for (name, prop) in &schema.properties {
        let label = if prop.title.is_empty() { name } else { &prop.title };
        let value = data.get(name).filter(|v| is_filled(v));

        let Some(value) = value else {
            if schema.is_required(name) {
                issues.push(FieldIssue::new(name, format!("'{label}' is required")));
            }
            continue;
        };

        match prop.field_type() {
            FieldType::Dropdown => {
                let options = prop.enum_values.as_deref().unwrap_or_default();
                match value.as_str() {
                    Some(s) if options.iter().any(|o| o == s) => {}
                    _ => issues.push(FieldIssue::new(
                        name,
                        format!(
                            "Invalid value for '{label}'. Allowed: {}",
                            options.join(", ")
                        ),
                    )),
                }
            }
            FieldType::Date => {
                let valid = value
                    .as_str()
                    .is_some_and(|s| chrono::NaiveDate::parse_from_str(s, DATE_LAYOUT).is_ok());
                if !valid {
                    issues.push(FieldIssue::new(
                        name,
                        format!("'{label}' must be a date in YYYY-MM-DD form"),
                    ));
                }
            }
            FieldType::Integer => {
                if !is_integral(value) {
                    issues.push(FieldIssue::new(
                        name,
                        format!("'{label}' must be a whole number"),
                    ));
                }
            }
            FieldType::Number => {
                if !value.is_number() {
                    issues.push(FieldIssue::new(name, format!("'{label}' must be a number")));
                }
            }
            FieldType::Boolean => {
                if !value.is_boolean() {
                    issues.push(FieldIssue::new(
                        name,
                        format!("'{label}' must be true or false"),
                    ));
                }
            }
            FieldType::String => {
                if !value.is_string() {
                    issues.push(FieldIssue::new(name, format!("'{label}' must be text")));
                }
            }
        }
    }

    issues
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn species_and_tags() -> Vec<FieldDefinition> {
        vec![
            FieldDefinition::new("species", "Species", FieldType::String).required(),
            FieldDefinition::dropdown("tags", "Tags", ["a", "b"]),
        ]
    }

    fn every_type() -> Vec<FieldDefinition> {
        vec![
            FieldDefinition::new("notes", "Notes", FieldType::String),
            FieldDefinition {
                description: Some("Grams".into()),
                ..FieldDefinition::new("weight", "Weight", FieldType::Number).required()
            },
            FieldDefinition::new("quantity", "Quantity", FieldType::Integer).required(),
            FieldDefinition::new("alive", "Alive", FieldType::Boolean),
            FieldDefinition::new("collected_on", "Collected On", FieldType::Date),
            FieldDefinition::dropdown("sex", "Sex", ["male", "female", "unknown"]),
        ]
    }

    fn data(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn fields_to_schema_matches_expected_json() {
        let schema = fields_to_schema(&species_and_tags());
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "object",
                "properties": {
                    "species": { "type": "string", "title": "Species" },
                    "tags": { "type": "string", "title": "Tags", "enum": ["a", "b"] }
                },
                "required": ["species"]
            })
        );
    }

    #[test]
    fn required_key_omitted_when_nothing_required() {
        let fields = vec![FieldDefinition::new("notes", "Notes", FieldType::String)];
        let value = serde_json::to_value(fields_to_schema(&fields)).unwrap();
        assert!(value.get("required").is_none());
    }

    #[test]
    fn date_field_becomes_string_with_format() {
        let fields = vec![FieldDefinition::new("seen", "Seen", FieldType::Date)];
        let schema = fields_to_schema(&fields);
        let prop = &schema.properties["seen"];
        assert_eq!(prop.property_type, PropertyType::String);
        assert_eq!(prop.format.as_deref(), Some(FORMAT_DATE));
        assert!(prop.enum_values.is_none());
    }

    #[test]
    fn fields_round_trip_preserves_content_and_order() {
        let fields = every_type();
        let back = schema_to_fields(&fields_to_schema(&fields));
        assert_eq!(back, fields);
    }

    #[test]
    fn schema_round_trip_is_equivalent() {
        let schema = fields_to_schema(&every_type());
        let again = fields_to_schema(&schema_to_fields(&schema));
        assert!(schema.is_equivalent(&again));
        let keys: Vec<_> = again.properties.keys().cloned().collect();
        assert_eq!(
            keys,
            vec!["notes", "weight", "quantity", "alive", "collected_on", "sex"]
        );
    }

    #[test]
    fn enum_takes_priority_over_date_format() {
        let schema: MetadataSchema = serde_json::from_value(json!({
            "type": "object",
            "properties": {
                "when": { "type": "string", "title": "When", "format": "date", "enum": ["x"] }
            }
        }))
        .unwrap();
        assert_eq!(schema_to_fields(&schema)[0].field_type, FieldType::Dropdown);
    }

    #[test]
    fn missing_type_defaults_to_string_and_title_to_name() {
        let schema: MetadataSchema = serde_json::from_value(json!({
            "properties": { "code": {} }
        }))
        .unwrap();
        let fields = schema_to_fields(&schema);
        assert_eq!(fields[0].field_type, FieldType::String);
        assert_eq!(fields[0].label, "code");
        assert!(!fields[0].required);
    }

    #[test]
    fn required_set_is_order_insensitive() {
        let mut a = fields_to_schema(&every_type());
        let b = a.clone();
        a.required.reverse();
        assert!(a.is_equivalent(&b));
    }

    #[test]
    fn numeric_properties_lists_number_and_integer_only() {
        let schema = fields_to_schema(&every_type());
        assert_eq!(numeric_properties(&schema), vec!["weight", "quantity"]);
        assert!(is_numeric_property(&schema, "quantity"));
        assert!(!is_numeric_property(&schema, "notes"));
    }

    #[test]
    fn dropdown_without_options_is_incomplete() {
        let mut field = FieldDefinition::dropdown("tags", "Tags", Vec::<String>::new());
        assert!(!is_field_complete(&field));
        field.options = Some(vec!["  ".into()]);
        assert!(!is_field_complete(&field));
        field.options = Some(vec!["a".into()]);
        assert!(is_field_complete(&field));
    }

    #[test]
    fn validate_fields_flags_bad_names_and_duplicates() {
        let fields = vec![
            FieldDefinition::new("1abc", "Bad", FieldType::String),
            FieldDefinition::new("ok", "Ok", FieldType::String),
            FieldDefinition::new("ok", "Again", FieldType::String),
            FieldDefinition::dropdown("pick", "Pick", Vec::<String>::new()),
        ];
        let issues = validate_fields(&fields);
        assert_eq!(issues.len(), 3);
        assert!(issues[0].message.contains("identifier"));
        assert!(issues[1].message.contains("Duplicate"));
        assert!(issues[2].message.contains("at least one option"));
    }

    #[test]
    fn validate_fields_accepts_editor_output() {
        assert!(validate_fields(&every_type()).is_empty());
    }

    #[test]
    fn field_type_parses_wire_strings() {
        assert_eq!(
            FieldType::from_str_value("dropdown").unwrap(),
            FieldType::Dropdown
        );
        let err = FieldType::from_str_value("array").unwrap_err();
        assert!(err.to_string().contains("Invalid field type"));
    }

    #[test]
    fn submission_data_valid_payload_passes() {
        let schema = fields_to_schema(&every_type());
        let payload = data(json!({
            "notes": "ok",
            "weight": 12.5,
            "quantity": 7,
            "alive": true,
            "collected_on": "2026-03-01",
            "sex": "female"
        }));
        assert!(validate_submission_data(&schema, &payload).is_empty());
    }

    #[test]
    fn submission_data_reports_missing_required() {
        let schema = fields_to_schema(&every_type());
        let payload = data(json!({ "weight": 1, "quantity": null }));
        let issues = validate_submission_data(&schema, &payload);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "quantity");
        assert!(issues[0].message.contains("required"));
    }

    #[test]
    fn submission_data_reports_type_errors() {
        let schema = fields_to_schema(&every_type());
        let payload = data(json!({
            "weight": "heavy",
            "quantity": 2.5,
            "alive": "yes",
            "collected_on": "03/01/2026",
            "sex": "other",
            "extra": 1
        }));
        let issues = validate_submission_data(&schema, &payload);
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["extra", "weight", "quantity", "alive", "collected_on", "sex"]
        );
    }

    #[test]
    fn integer_accepts_whole_floats() {
        let schema = fields_to_schema(&[FieldDefinition::new(
            "n",
            "N",
            FieldType::Integer,
        )]);
        assert!(validate_submission_data(&schema, &data(json!({ "n": 3.0 }))).is_empty());
    }
}
