use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum number of near-miss names reported when a field lookup fails.
pub const SIMILAR_FIELDS_LIMIT: usize = 10;

/// One entry of the `fields` array returned by an sObject describe call.
///
/// Only the attributes surfaced through the MCP tools are kept; everything
/// else in the describe payload is dropped on deserialization. Missing keys
/// fall back to their defaults so partial payloads still parse.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldMetadata {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub length: i64,
    pub nillable: bool,
    pub unique: bool,
    pub external_id: bool,
    pub updateable: bool,
    pub createable: bool,
    pub custom: bool,
    pub calculated: bool,
    pub filterable: bool,
    pub sortable: bool,
    pub defaulted_on_create: bool,
    pub dependent_picklist: bool,
    pub picklist_values: Vec<Value>,
    pub reference_to: Vec<String>,
    pub relationship_name: Option<String>,
}

impl Default for FieldMetadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            label: String::new(),
            field_type: String::new(),
            length: 0,
            // describe reports nillable=true unless a value is mandatory
            nillable: true,
            unique: false,
            external_id: false,
            updateable: false,
            createable: false,
            custom: false,
            calculated: false,
            filterable: false,
            sortable: false,
            defaulted_on_create: false,
            dependent_picklist: false,
            picklist_values: Vec::new(),
            reference_to: Vec::new(),
            relationship_name: None,
        }
    }
}

/// Compact view used by `get_object_fields`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSummary<'a> {
    pub label: &'a str,
    pub name: &'a str,
    pub updateable: bool,
    #[serde(rename = "type")]
    pub field_type: &'a str,
    pub length: i64,
    #[serde(rename = "picklistValues")]
    pub picklist_values: &'a [Value],
}

/// Full view used by `get_field_details`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDetails<'a> {
    pub name: &'a str,
    pub label: &'a str,
    #[serde(rename = "type")]
    pub field_type: &'a str,
    pub length: i64,
    pub required: bool,
    pub unique: bool,
    pub external_id: bool,
    pub updateable: bool,
    pub createable: bool,
    pub custom: bool,
    pub calculated: bool,
    pub defaulted_on_create: bool,
    pub dependency_following: bool,
    pub picklist_values: &'a [Value],
    pub referenced_to: &'a [String],
    pub relationship_name: Option<&'a str>,
}

impl FieldMetadata {
    pub fn summary(&self) -> FieldSummary<'_> {
        FieldSummary {
            label: &self.label,
            name: &self.name,
            updateable: self.updateable,
            field_type: &self.field_type,
            length: self.length,
            picklist_values: &self.picklist_values,
        }
    }

    pub fn details(&self) -> FieldDetails<'_> {
        FieldDetails {
            name: &self.name,
            label: &self.label,
            field_type: &self.field_type,
            length: self.length,
            required: !self.nillable,
            unique: self.unique,
            external_id: self.external_id,
            updateable: self.updateable,
            createable: self.createable,
            custom: self.custom,
            calculated: self.calculated,
            defaulted_on_create: self.defaulted_on_create,
            dependency_following: self.dependent_picklist,
            picklist_values: &self.picklist_values,
            referenced_to: &self.reference_to,
            relationship_name: self.relationship_name.as_deref(),
        }
    }
}

/// Extract typed field entries from a raw describe payload.
pub fn fields_from_describe(describe: &Value) -> Result<Vec<FieldMetadata>, serde_json::Error> {
    match describe.get("fields") {
        Some(fields) => Vec::<FieldMetadata>::deserialize(fields),
        None => Ok(Vec::new()),
    }
}

/// Case-insensitive exact match on the field API name.
pub fn find_field<'a>(fields: &'a [FieldMetadata], field_name: &str) -> Option<&'a FieldMetadata> {
    let wanted = field_name.to_lowercase();
    fields.iter().find(|field| field.name.to_lowercase() == wanted)
}

/// Field names containing `needle` (case-insensitive), in describe order,
/// capped at [`SIMILAR_FIELDS_LIMIT`].
pub fn similar_field_names(fields: &[FieldMetadata], needle: &str) -> Vec<String> {
    let needle = needle.to_lowercase();
    fields
        .iter()
        .filter(|field| field.name.to_lowercase().contains(&needle))
        .take(SIMILAR_FIELDS_LIMIT)
        .map(|field| field.name.clone())
        .collect()
}
