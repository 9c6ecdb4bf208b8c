//! Tool registry.
//!
//! One declarative table drives both the `tools/list` payload and the
//! required-argument checks the dispatcher runs before touching Salesforce.

use std::sync::LazyLock;

use serde_json::{Map, Value, json};

use crate::error::ToolError;

pub const HTTP_METHODS: &[&str] = &["GET", "POST", "PATCH", "DELETE"];

pub const CUSTOM_FIELD_TYPES: &[&str] = &[
    "Text",
    "Number",
    "Date",
    "DateTime",
    "Checkbox",
    "Picklist",
    "Email",
    "Phone",
    "Url",
    "TextArea",
    "LongTextArea",
];

/// Names accepted in `tools/call` but not listed.
const TOOL_ALIASES: &[(&str, &str)] = &[
    ("run_query", "run_soql_query"),
    ("run_search", "run_sosl_search"),
];

const OBJECT_NAME_DESC: &str = "The name of the Salesforce object (e.g., 'Account', 'Contact')";
const SOBJECT_API_NAME_DESC: &str =
    "The API name of the Salesforce SObject (e.g., 'Account', 'MyCustomObject__c').";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    String,
    Number,
    Boolean,
    Object,
    StringArray,
    ObjectArray,
    /// Array of objects that must each carry an `Id`.
    RecordArray,
}

#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub description: &'static str,
    pub required: bool,
    pub allowed: &'static [&'static str],
    pub default: Option<Value>,
}

impl ArgSpec {
    fn new(name: &'static str, kind: ArgKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: false,
            allowed: &[],
            default: None,
        }
    }

    fn string(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ArgKind::String, description)
    }

    fn number(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ArgKind::Number, description)
    }

    fn boolean(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ArgKind::Boolean, description)
    }

    fn object(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ArgKind::Object, description)
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn one_of(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = allowed;
        self
    }

    fn default_value(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    fn schema(&self) -> Value {
        let mut schema = match self.kind {
            ArgKind::String => json!({ "type": "string" }),
            ArgKind::Number => json!({ "type": "number" }),
            ArgKind::Boolean => json!({ "type": "boolean" }),
            ArgKind::Object => json!({
                "type": "object",
                "properties": {},
                "additionalProperties": true
            }),
            ArgKind::StringArray => json!({
                "type": "array",
                "items": { "type": "string" }
            }),
            ArgKind::ObjectArray => json!({
                "type": "array",
                "items": { "type": "object", "additionalProperties": true }
            }),
            ArgKind::RecordArray => json!({
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "Id": { "type": "string", "description": "The ID of the record to update." }
                    },
                    "required": ["Id"],
                    "additionalProperties": true
                }
            }),
        };
        schema["description"] = json!(self.description);
        if !self.allowed.is_empty() {
            schema["enum"] = json!(self.allowed);
        }
        if let Some(default) = &self.default {
            schema["default"] = default.clone();
        }
        schema
    }
}

#[derive(Debug)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub args: Vec<ArgSpec>,
}

impl ToolDefinition {
    fn new(name: &'static str, description: &'static str, args: Vec<ArgSpec>) -> Self {
        Self {
            name,
            description,
            args,
        }
    }

    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for arg in &self.args {
            properties.insert(arg.name.to_string(), arg.schema());
        }
        let mut schema = json!({
            "type": "object",
            "properties": properties,
        });
        let required: Vec<&str> = self.required_args().collect();
        if !required.is_empty() {
            schema["required"] = json!(required);
        }
        schema
    }

    pub fn required_args(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.args.iter().filter(|arg| arg.required).map(|arg| arg.name)
    }

    pub fn listing(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema(),
        })
    }

    /// Reject absent, null, blank-string, empty-object and empty-array values
    /// for every required argument.
    pub fn validate_required(&self, args: &Map<String, Value>) -> Result<(), ToolError> {
        for name in self.required_args() {
            match args.get(name) {
                None | Some(Value::Null) => {
                    return Err(ToolError::validation(
                        name,
                        format!("Missing required field '{name}'"),
                    ));
                }
                Some(Value::String(v)) if v.trim().is_empty() => {
                    return Err(ToolError::validation(
                        name,
                        format!("'{name}' must not be empty"),
                    ));
                }
                Some(Value::Object(map)) if map.is_empty() => {
                    return Err(ToolError::validation(
                        name,
                        format!("'{name}' must not be empty"),
                    ));
                }
                Some(Value::Array(items)) if items.is_empty() => {
                    return Err(ToolError::validation(
                        name,
                        format!("'{name}' must not be empty"),
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

static TOOL_DEFINITIONS: LazyLock<Vec<ToolDefinition>> = LazyLock::new(build_tool_definitions);

/// The registry, in listing order.
pub fn tool_definitions() -> &'static [ToolDefinition] {
    &TOOL_DEFINITIONS
}

/// Look a tool up by name or alias.
pub fn find_tool(name: &str) -> Option<&'static ToolDefinition> {
    let canonical = TOOL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(name);
    tool_definitions().iter().find(|tool| tool.name == canonical)
}

/// Best listed name for a mistyped tool, if any is reasonably close.
pub fn closest_tool_name(name: &str) -> Option<&'static str> {
    tool_definitions()
        .iter()
        .map(|tool| (tool.name, strsim::jaro_winkler(name, tool.name)))
        .filter(|(_, score)| *score >= 0.8)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(tool_name, _)| tool_name)
}

pub fn tools_list_payload() -> Value {
    let tools: Vec<Value> = tool_definitions()
        .iter()
        .map(ToolDefinition::listing)
        .collect();
    json!({ "tools": tools })
}

fn build_tool_definitions() -> Vec<ToolDefinition> {
    let method = || {
        ArgSpec::string("method", "The HTTP method (default: 'GET')")
            .one_of(HTTP_METHODS)
            .default_value(json!("GET"))
    };

    vec![
        ToolDefinition::new(
            "run_soql_query",
            "Executes a SOQL query against Salesforce",
            vec![ArgSpec::string("query", "The SOQL query to execute").required()],
        ),
        ToolDefinition::new(
            "run_sosl_search",
            "Executes a SOSL search against Salesforce",
            vec![
                ArgSpec::string(
                    "search",
                    "The SOSL search to execute (e.g., 'FIND {John Smith} IN ALL FIELDS')",
                )
                .required(),
            ],
        ),
        ToolDefinition::new(
            "get_object_fields",
            "Retrieves field Names, labels and types for a specific Salesforce object",
            vec![ArgSpec::string("object_name", OBJECT_NAME_DESC).required()],
        ),
        ToolDefinition::new(
            "get_record",
            "Retrieves a specific record by ID",
            vec![
                ArgSpec::string("object_name", OBJECT_NAME_DESC).required(),
                ArgSpec::string("record_id", "The ID of the record to retrieve").required(),
            ],
        ),
        ToolDefinition::new(
            "create_record",
            "Creates a new record",
            vec![
                ArgSpec::string("object_name", OBJECT_NAME_DESC).required(),
                ArgSpec::object("data", "The data for the new record").required(),
            ],
        ),
        ToolDefinition::new(
            "update_record",
            "Updates an existing record",
            vec![
                ArgSpec::string("object_name", OBJECT_NAME_DESC).required(),
                ArgSpec::string("record_id", "The ID of the record to update").required(),
                ArgSpec::object("data", "The updated data for the record").required(),
            ],
        ),
        ToolDefinition::new(
            "delete_record",
            "Deletes a record",
            vec![
                ArgSpec::string("object_name", OBJECT_NAME_DESC).required(),
                ArgSpec::string("record_id", "The ID of the record to delete").required(),
            ],
        ),
        ToolDefinition::new(
            "tooling_execute",
            "Executes a Tooling API request",
            vec![
                ArgSpec::string(
                    "action",
                    "The Tooling API endpoint to call (e.g., 'sobjects/ApexClass')",
                )
                .required(),
                method(),
                ArgSpec::object("data", "Data for POST/PATCH requests"),
            ],
        ),
        ToolDefinition::new(
            "apex_execute",
            "Executes an Apex REST request",
            vec![
                ArgSpec::string(
                    "action",
                    "The Apex REST endpoint to call (e.g., '/MyApexClass')",
                )
                .required(),
                method(),
                ArgSpec::object("data", "Data for POST/PATCH requests"),
            ],
        ),
        ToolDefinition::new(
            "restful",
            "Makes a direct REST API call to Salesforce",
            vec![
                ArgSpec::string(
                    "path",
                    "The path of the REST API endpoint (e.g., 'sobjects/Account/describe')",
                )
                .required(),
                method(),
                ArgSpec::object("params", "Query parameters for the request"),
                ArgSpec::object("data", "Data for POST/PATCH requests"),
            ],
        ),
        ToolDefinition::new(
            "list_sobjects",
            "Retrieves a list of all available Salesforce SObjects (standard and custom).",
            Vec::new(),
        ),
        ToolDefinition::new(
            "bulk_create_records",
            "Creates multiple records of a specified SObject type in bulk.",
            vec![
                ArgSpec::string("object_name", SOBJECT_API_NAME_DESC).required(),
                ArgSpec::new(
                    "data",
                    ArgKind::ObjectArray,
                    "A list of records to create. Each record is a dictionary of field names and values.",
                )
                .required(),
            ],
        ),
        ToolDefinition::new(
            "bulk_update_records",
            "Updates multiple records of a specified SObject type in bulk. Each record must have an 'Id' field.",
            vec![
                ArgSpec::string("object_name", SOBJECT_API_NAME_DESC).required(),
                ArgSpec::new(
                    "data",
                    ArgKind::RecordArray,
                    "A list of records to update. Each record is a dictionary of field names and values, and *must* include an 'Id' field.",
                )
                .required(),
            ],
        ),
        ToolDefinition::new(
            "bulk_delete_records",
            "Deletes multiple records of a specified SObject type in bulk, given their IDs.",
            vec![
                ArgSpec::string("object_name", SOBJECT_API_NAME_DESC).required(),
                ArgSpec::new(
                    "record_ids",
                    ArgKind::StringArray,
                    "A list of record IDs (strings) to delete.",
                )
                .required(),
            ],
        ),
        ToolDefinition::new(
            "get_record_types",
            "Retrieves all record types for a specific SObject.",
            vec![
                ArgSpec::string(
                    "object_name",
                    "The API name of the Salesforce SObject (e.g., 'Account', 'Opportunity').",
                )
                .required(),
            ],
        ),
        ToolDefinition::new(
            "get_user_permissions",
            "Retrieves current user's permissions for a specific SObject including field-level security.",
            vec![
                ArgSpec::string(
                    "object_name",
                    "The API name of the Salesforce SObject (e.g., 'Account', 'Contact').",
                )
                .required(),
            ],
        ),
        ToolDefinition::new(
            "create_custom_field",
            "Creates a new custom field on a specified SObject using Tooling API.",
            vec![
                ArgSpec::string("object_name", SOBJECT_API_NAME_DESC).required(),
                ArgSpec::string(
                    "field_name",
                    "The name for the new custom field (without __c suffix).",
                )
                .required(),
                ArgSpec::string("field_type", "The type of field to create.")
                    .one_of(CUSTOM_FIELD_TYPES)
                    .required(),
                ArgSpec::string("field_label", "The display label for the field.").required(),
                ArgSpec::number("length", "Length for Text fields (optional, default 255)."),
                ArgSpec::number("precision", "Precision for Number fields (optional)."),
                ArgSpec::number("scale", "Scale for Number fields (optional)."),
                ArgSpec::boolean("required", "Whether the field is required (default false)."),
                ArgSpec::boolean(
                    "unique",
                    "Whether the field should be unique (default false).",
                ),
                ArgSpec::boolean(
                    "external_id",
                    "Whether the field is an external ID (default false).",
                ),
            ],
        ),
        ToolDefinition::new(
            "update_custom_field",
            "Updates settings of an existing custom field using Tooling API.",
            vec![
                ArgSpec::string("object_name", "The API name of the Salesforce SObject.")
                    .required(),
                ArgSpec::string(
                    "field_name",
                    "The API name of the custom field (with __c suffix).",
                )
                .required(),
                ArgSpec::string(
                    "field_label",
                    "New display label for the field (optional).",
                ),
                ArgSpec::boolean("required", "Whether the field is required (optional)."),
                ArgSpec::boolean("unique", "Whether the field should be unique (optional)."),
                ArgSpec::boolean(
                    "external_id",
                    "Whether the field is an external ID (optional).",
                ),
            ],
        ),
        ToolDefinition::new(
            "set_field_permissions",
            "Sets field-level security permissions for a custom field on profiles or permission sets.",
            vec![
                ArgSpec::string("object_name", "The API name of the Salesforce SObject.")
                    .required(),
                ArgSpec::string(
                    "field_name",
                    "The API name of the custom field (with __c suffix).",
                )
                .required(),
                ArgSpec::string(
                    "permission_set_name",
                    "The API name of the permission set or profile (optional, defaults to 'System Administrator').",
                )
                .default_value(json!("System Administrator")),
                ArgSpec::boolean("readable", "Whether the field is readable (default: true).")
                    .default_value(json!(true)),
                ArgSpec::boolean("editable", "Whether the field is editable (default: true).")
                    .default_value(json!(true)),
            ],
        ),
        ToolDefinition::new(
            "get_field_permissions",
            "Retrieves field-level security permissions for a custom field across all profiles and permission sets.",
            vec![
                ArgSpec::string("object_name", "The API name of the Salesforce SObject.")
                    .required(),
                ArgSpec::string("field_name", "The API name of the field.").required(),
            ],
        ),
        ToolDefinition::new(
            "get_field_details",
            "Retrieves detailed metadata for a specific field of a Salesforce object, including external ID, unique, required settings.",
            vec![
                ArgSpec::string(
                    "object_name",
                    "The API name of the Salesforce SObject (e.g., 'Account', 'Contact').",
                )
                .required(),
                ArgSpec::string(
                    "field_name",
                    "The API name of the field (e.g., 'GLN__c', 'Name', 'Email').",
                )
                .required(),
            ],
        ),
        ToolDefinition::new(
            "export_data_csv",
            "Export SOQL query results to CSV format",
            vec![
                ArgSpec::string("query", "The SOQL query to execute and export").required(),
                ArgSpec::string(
                    "filename",
                    "Optional filename for the CSV file (default: 'export.csv')",
                )
                .default_value(json!("export.csv")),
            ],
        ),
        ToolDefinition::new(
            "list_reports",
            "Get all available reports and folders in the organization",
            vec![ArgSpec::string(
                "folder_id",
                "Optional folder ID to filter reports (default: all reports)",
            )],
        ),
        ToolDefinition::new(
            "list_users",
            "Get all users with their profiles, roles, and status",
            vec![
                ArgSpec::boolean(
                    "include_inactive",
                    "Include inactive users in results (default: false)",
                )
                .default_value(json!(false)),
                ArgSpec::number(
                    "limit",
                    "Maximum number of users to return (default: 100)",
                )
                .default_value(json!(100)),
            ],
        ),
        ToolDefinition::new(
            "get_org_limits",
            "Get current API usage limits and organizational features",
            Vec::new(),
        ),
        ToolDefinition::new(
            "clear_field_cache",
            "Drops cached field metadata so the next field lookup re-describes the object. Clears every object when object_name is omitted.",
            vec![ArgSpec::string(
                "object_name",
                "Object whose cached fields should be dropped (optional).",
            )],
        ),
    ]
}
