//! Tool dispatch.
//!
//! Every call runs the same pipeline: resolve the tool, check required
//! arguments, check the connection, delegate to the backing client, then
//! label the result. Failures at any step come back as [`ToolError`].

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use serde_json::{Map, Value, json};
use sforce_core::error::codes;
use sforce_core::fields::{FieldSummary, fields_from_describe, find_field, similar_field_names};
use tracing::debug;

use crate::args::{
    arg_bool, arg_optional_bool, arg_optional_object, arg_optional_string, arg_optional_u64,
    arg_string, parse_http_method, parse_query_pairs, required_api_name, required_array,
    required_object, required_string,
};
use crate::csv_export::{NO_RECORDS_MESSAGE, export_summary, render_csv};
use crate::error::{SalesforceError, ToolError};
use crate::field_cache::FieldCache;
use crate::salesforce::SalesforceApi;
use crate::tools::{CUSTOM_FIELD_TYPES, closest_tool_name, find_tool};
use crate::util::{soql_quote, to_pretty_json};

const DEFAULT_PERMISSION_SET: &str = "System Administrator";
const DEFAULT_USER_LIMIT: u64 = 100;
const DEFAULT_TEXT_LENGTH: u64 = 255;
const DEFAULT_NUMBER_PRECISION: u64 = 18;
const DEFAULT_NUMBER_SCALE: u64 = 0;
const CUSTOM_FIELD_SUFFIX: &str = "__c";

pub struct Dispatcher {
    client: Option<Arc<dyn SalesforceApi>>,
    field_cache: FieldCache,
}

impl Dispatcher {
    /// `client` is `None` when the startup connection failed; the server then
    /// answers every org-bound tool with a `not_connected` error.
    pub fn new(client: Option<Arc<dyn SalesforceApi>>, field_cache: FieldCache) -> Self {
        Self {
            client,
            field_cache,
        }
    }

    pub async fn call(&self, name: &str, args: &Map<String, Value>) -> Result<String, ToolError> {
        let tool = find_tool(name).ok_or_else(|| unknown_tool(name))?;
        tool.validate_required(args)?;

        if tool.name == "clear_field_cache" {
            return self.clear_field_cache(args).await;
        }

        let api = self.client.as_deref().ok_or_else(ToolError::not_connected)?;
        debug!(tool = tool.name, "dispatching tool call");

        match tool.name {
            "run_soql_query" => run_soql_query(api, args).await,
            "run_sosl_search" => run_sosl_search(api, args).await,
            "get_object_fields" => self.get_object_fields(api, args).await,
            "get_record" => get_record(api, args).await,
            "create_record" => create_record(api, args).await,
            "update_record" => update_record(api, args).await,
            "delete_record" => delete_record(api, args).await,
            "tooling_execute" => tooling_execute(api, args).await,
            "apex_execute" => apex_execute(api, args).await,
            "restful" => restful(api, args).await,
            "list_sobjects" => list_sobjects(api).await,
            "bulk_create_records" => bulk_create_records(api, args).await,
            "bulk_update_records" => bulk_update_records(api, args).await,
            "bulk_delete_records" => bulk_delete_records(api, args).await,
            "get_record_types" => get_record_types(api, args).await,
            "get_user_permissions" => get_user_permissions(api, args).await,
            "create_custom_field" => create_custom_field(api, args).await,
            "update_custom_field" => update_custom_field(api, args).await,
            "set_field_permissions" => set_field_permissions(api, args).await,
            "get_field_permissions" => get_field_permissions(api, args).await,
            "get_field_details" => self.get_field_details(api, args).await,
            "export_data_csv" => export_data_csv(api, args).await,
            "list_reports" => list_reports(api, args).await,
            "list_users" => list_users(api, args).await,
            "get_org_limits" => get_org_limits(api).await,
            other => Err(ToolError::new(
                codes::INTERNAL_ERROR,
                format!("Tool '{other}' is registered but has no handler"),
            )),
        }
    }

    async fn get_object_fields(
        &self,
        api: &dyn SalesforceApi,
        args: &Map<String, Value>,
    ) -> Result<String, ToolError> {
        let object_name = required_api_name(args, "object_name")?;
        let fields = self.field_cache.get_fields(api, &object_name).await?;
        let summaries: Vec<FieldSummary<'_>> = fields.iter().map(|f| f.summary()).collect();
        Ok(labeled(&format!("{object_name} Metadata (JSON):\n"), &summaries))
    }

    async fn get_field_details(
        &self,
        api: &dyn SalesforceApi,
        args: &Map<String, Value>,
    ) -> Result<String, ToolError> {
        let object_name = required_api_name(args, "object_name")?;
        let field_name = required_string(args, "field_name")?;
        let fields = self.field_cache.get_fields(api, &object_name).await?;

        let label = format!("Field Details for {object_name}.{field_name} (JSON):\n");
        match find_field(&fields, &field_name) {
            Some(field) => Ok(labeled(&label, &field.details())),
            None => Ok(labeled(
                &label,
                &json!({
                    "error": format!("Field '{field_name}' not found in object '{object_name}'"),
                    "similar_fields": similar_field_names(&fields, &field_name),
                }),
            )),
        }
    }

    async fn clear_field_cache(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        let cleared = match arg_optional_string(args, "object_name")? {
            Some(object_name) => usize::from(self.field_cache.invalidate(&object_name).await),
            None => self.field_cache.clear().await,
        };
        let remaining = self.field_cache.len().await;
        Ok(labeled(
            "Field Cache Cleared:\n",
            &json!({ "cleared": cleared, "remaining": remaining }),
        ))
    }
}

fn unknown_tool(name: &str) -> ToolError {
    let err = ToolError::new(codes::UNKNOWN_TOOL, format!("Unknown tool: {name}")).with_field("name");
    match closest_tool_name(name) {
        Some(suggestion) => err.with_docs_hint(format!("Did you mean '{suggestion}'?")),
        None => err.with_docs_hint("Call tools/list for the available tools."),
    }
}

fn labeled<T: Serialize + ?Sized>(label: &str, value: &T) -> String {
    format!("{label}{}", to_pretty_json(value))
}

fn records_of(result: &Value) -> &[Value] {
    result
        .get("records")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

async fn run_soql_query(
    api: &dyn SalesforceApi,
    args: &Map<String, Value>,
) -> Result<String, ToolError> {
    let query = required_string(args, "query")?;
    let result = api.query_all(&query).await?;
    Ok(labeled("SOQL Query Results (JSON):\n", &result))
}

async fn run_sosl_search(
    api: &dyn SalesforceApi,
    args: &Map<String, Value>,
) -> Result<String, ToolError> {
    let search = required_string(args, "search")?;
    let result = api.search(&search).await?;
    Ok(labeled("SOSL Search Results (JSON):\n", &result))
}

async fn get_record(api: &dyn SalesforceApi, args: &Map<String, Value>) -> Result<String, ToolError> {
    let object_name = required_api_name(args, "object_name")?;
    let record_id = required_string(args, "record_id")?;
    let result = api.get(&object_name, &record_id).await?;
    Ok(labeled(&format!("{object_name} Record (JSON):\n"), &result))
}

async fn create_record(
    api: &dyn SalesforceApi,
    args: &Map<String, Value>,
) -> Result<String, ToolError> {
    let object_name = required_api_name(args, "object_name")?;
    let data = required_object(args, "data")?;
    let result = api.create(&object_name, data).await?;
    Ok(labeled(
        &format!("Create {object_name} Record Result (JSON):\n"),
        &result,
    ))
}

async fn update_record(
    api: &dyn SalesforceApi,
    args: &Map<String, Value>,
) -> Result<String, ToolError> {
    let object_name = required_api_name(args, "object_name")?;
    let record_id = required_string(args, "record_id")?;
    let data = required_object(args, "data")?;
    let status = api.update(&object_name, &record_id, data).await?;
    Ok(format!("Update {object_name} Record Result: {status}"))
}

async fn delete_record(
    api: &dyn SalesforceApi,
    args: &Map<String, Value>,
) -> Result<String, ToolError> {
    let object_name = required_api_name(args, "object_name")?;
    let record_id = required_string(args, "record_id")?;
    let status = api.delete(&object_name, &record_id).await?;
    Ok(format!("Delete {object_name} Record Result: {status}"))
}

async fn tooling_execute(
    api: &dyn SalesforceApi,
    args: &Map<String, Value>,
) -> Result<String, ToolError> {
    let action = required_string(args, "action")?;
    let method = parse_http_method(args)?;
    let data = arg_optional_object(args, "data")?;
    let result = api.tooling_execute(&action, method, data).await?;
    Ok(labeled("Tooling Execute Result (JSON):\n", &result))
}

async fn apex_execute(
    api: &dyn SalesforceApi,
    args: &Map<String, Value>,
) -> Result<String, ToolError> {
    let action = required_string(args, "action")?;
    let method = parse_http_method(args)?;
    let data = arg_optional_object(args, "data")?;
    let result = api.apex_execute(&action, method, data).await?;
    Ok(labeled("Apex Execute Result (JSON):\n", &result))
}

async fn restful(api: &dyn SalesforceApi, args: &Map<String, Value>) -> Result<String, ToolError> {
    let path = required_string(args, "path")?;
    let method = parse_http_method(args)?;
    let params = parse_query_pairs(args.get("params"), "params")?;
    let data = arg_optional_object(args, "data")?;
    let result = api.restful(&path, method, &params, data).await?;
    Ok(labeled("RESTful API Call Result (JSON):\n", &result))
}

async fn list_sobjects(api: &dyn SalesforceApi) -> Result<String, ToolError> {
    let global = api.describe_global().await?;
    let sobjects = global
        .get("sobjects")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            SalesforceError::UnexpectedResponse("global describe has no 'sobjects' list".into())
        })?;
    let names: Vec<&str> = sobjects
        .iter()
        .filter_map(|sobject| sobject.get("name").and_then(Value::as_str))
        .collect();
    Ok(labeled("Available SObjects (JSON):\n", &names))
}

async fn bulk_create_records(
    api: &dyn SalesforceApi,
    args: &Map<String, Value>,
) -> Result<String, ToolError> {
    let object_name = required_api_name(args, "object_name")?;
    let records = required_array(args, "data")?;
    if records.iter().any(|record| !record.is_object()) {
        return Err(ToolError::validation(
            "data",
            "Each record in 'data' must be an object of field names and values.",
        ));
    }
    let results = api.bulk_insert(&object_name, records).await?;
    Ok(labeled(
        &format!("Bulk Create {object_name} Results (JSON):\n"),
        &results,
    ))
}

async fn bulk_update_records(
    api: &dyn SalesforceApi,
    args: &Map<String, Value>,
) -> Result<String, ToolError> {
    let object_name = required_api_name(args, "object_name")?;
    let records = required_array(args, "data")?;
    for (index, record) in records.iter().enumerate() {
        let has_id = record
            .get("Id")
            .and_then(Value::as_str)
            .is_some_and(|id| !id.trim().is_empty());
        if !has_id {
            return Err(ToolError::validation(
                "data",
                "Each record in 'data' must be an object and include an 'Id' field for bulk updates.",
            )
            .with_details(json!({ "index": index })));
        }
    }
    let results = api.bulk_update(&object_name, records).await?;
    Ok(labeled(
        &format!("Bulk Update {object_name} Results (JSON):\n"),
        &results,
    ))
}

async fn bulk_delete_records(
    api: &dyn SalesforceApi,
    args: &Map<String, Value>,
) -> Result<String, ToolError> {
    let object_name = required_api_name(args, "object_name")?;
    let record_ids = required_array(args, "record_ids")?;
    let mut records = Vec::with_capacity(record_ids.len());
    for (index, item) in record_ids.iter().enumerate() {
        let id = item.as_str().ok_or_else(|| {
            ToolError::validation("record_ids", "Each item in 'record_ids' must be a string ID.")
                .with_details(json!({ "index": index }))
        })?;
        records.push(json!({ "Id": id }));
    }
    let results = api.bulk_delete(&object_name, &records).await?;
    Ok(labeled(
        &format!("Bulk Delete {object_name} Results (JSON):\n"),
        &results,
    ))
}

async fn get_record_types(
    api: &dyn SalesforceApi,
    args: &Map<String, Value>,
) -> Result<String, ToolError> {
    let object_name = required_api_name(args, "object_name")?;
    let soql = format!(
        "SELECT Id, Name, DeveloperName, Description, IsActive FROM RecordType WHERE SobjectType = {}",
        soql_quote(&object_name)
    );
    let result = api.query(&soql).await?;
    Ok(labeled(&format!("{object_name} Record Types (JSON):\n"), &result))
}

async fn get_user_permissions(
    api: &dyn SalesforceApi,
    args: &Map<String, Value>,
) -> Result<String, ToolError> {
    let object_name = required_api_name(args, "object_name")?;
    let describe = api.describe(&object_name).await?;
    let fields = fields_from_describe(&describe).map_err(|e| {
        SalesforceError::UnexpectedResponse(format!(
            "describe for {object_name} has malformed fields: {e}"
        ))
    })?;

    let flag = |key: &str| describe.get(key).and_then(Value::as_bool).unwrap_or(false);
    let field_permissions: Vec<Value> = fields
        .iter()
        .map(|field| {
            json!({
                "name": field.name,
                "label": field.label,
                "createable": field.createable,
                "updateable": field.updateable,
                "nillable": field.nillable,
                "filterable": field.filterable,
                "sortable": field.sortable,
            })
        })
        .collect();
    let permissions = json!({
        "object_permissions": {
            "createable": flag("createable"),
            "deletable": flag("deletable"),
            "queryable": flag("queryable"),
            "updateable": flag("updateable"),
            "retrieveable": flag("retrieveable"),
        },
        "field_permissions": field_permissions,
    });
    Ok(labeled(
        &format!("{object_name} User Permissions (JSON):\n"),
        &permissions,
    ))
}

async fn create_custom_field(
    api: &dyn SalesforceApi,
    args: &Map<String, Value>,
) -> Result<String, ToolError> {
    let object_name = required_api_name(args, "object_name")?;
    let field_name = required_api_name(args, "field_name")?;
    let field_name = field_name
        .strip_suffix(CUSTOM_FIELD_SUFFIX)
        .unwrap_or(&field_name)
        .to_string();
    let field_type = required_string(args, "field_type")?;
    if !CUSTOM_FIELD_TYPES.contains(&field_type.as_str()) {
        return Err(ToolError::validation(
            "field_type",
            format!("Unsupported field_type '{field_type}'"),
        )
        .with_docs_hint(format!("Use one of: {}", CUSTOM_FIELD_TYPES.join(", "))));
    }
    let field_label = required_string(args, "field_label")?;

    let mut metadata = json!({
        "type": field_type,
        "label": field_label,
        "required": arg_bool(args, "required", false)?,
        "unique": arg_bool(args, "unique", false)?,
        "externalId": arg_bool(args, "external_id", false)?,
    });
    match field_type.as_str() {
        "Text" => {
            metadata["length"] =
                json!(arg_optional_u64(args, "length")?.unwrap_or(DEFAULT_TEXT_LENGTH));
        }
        "Number" => {
            metadata["precision"] =
                json!(arg_optional_u64(args, "precision")?.unwrap_or(DEFAULT_NUMBER_PRECISION));
            metadata["scale"] =
                json!(arg_optional_u64(args, "scale")?.unwrap_or(DEFAULT_NUMBER_SCALE));
        }
        _ => {}
    }
    let definition = json!({
        "FullName": format!("{object_name}.{field_name}{CUSTOM_FIELD_SUFFIX}"),
        "Metadata": metadata,
    });

    let result = api
        .tooling_execute("sobjects/CustomField", Method::POST, Some(&definition))
        .await?;
    Ok(labeled("Create Custom Field Result (JSON):\n", &result))
}

async fn update_custom_field(
    api: &dyn SalesforceApi,
    args: &Map<String, Value>,
) -> Result<String, ToolError> {
    let object_name = required_api_name(args, "object_name")?;
    let field_name = required_api_name(args, "field_name")?;

    let mut changes = Map::new();
    if let Some(label) = arg_optional_string(args, "field_label")? {
        changes.insert("Label".into(), json!(label));
    }
    for (arg, key) in [
        ("required", "Required"),
        ("unique", "Unique"),
        ("external_id", "ExternalId"),
    ] {
        if let Some(value) = arg_optional_bool(args, arg)? {
            changes.insert(key.into(), json!(value));
        }
    }
    if changes.is_empty() {
        return Err(ToolError::new(codes::VALIDATION_FAILED, "No update fields provided")
            .with_docs_hint("Pass at least one of field_label, required, unique, external_id."));
    }

    let developer_name = field_name
        .strip_suffix(CUSTOM_FIELD_SUFFIX)
        .unwrap_or(&field_name);
    let soql = format!(
        "SELECT Id FROM CustomField WHERE TableEnumOrId = {} AND DeveloperName = {}",
        soql_quote(&object_name),
        soql_quote(developer_name)
    );
    let lookup = api.tooling_query(&soql).await?;
    let field_id = records_of(&lookup)
        .first()
        .and_then(|record| record.get("Id"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ToolError::new(
                codes::NOT_FOUND,
                format!("Custom field {field_name} not found on {object_name}"),
            )
            .with_field("field_name")
        })?;

    let result = api
        .tooling_execute(
            &format!("sobjects/CustomField/{field_id}"),
            Method::PATCH,
            Some(&Value::Object(changes)),
        )
        .await?;
    Ok(labeled("Update Custom Field Result (JSON):\n", &result))
}

async fn set_field_permissions(
    api: &dyn SalesforceApi,
    args: &Map<String, Value>,
) -> Result<String, ToolError> {
    let object_name = required_api_name(args, "object_name")?;
    let field_name = required_api_name(args, "field_name")?;
    let permission_set_name = arg_string(args, "permission_set_name", DEFAULT_PERMISSION_SET)?;
    let readable = arg_bool(args, "readable", true)?;
    let editable = arg_bool(args, "editable", true)?;
    let qualified = format!("{object_name}.{field_name}");

    let sets = api
        .tooling_query(&format!(
            "SELECT Id, Name, IsOwnedByProfile FROM PermissionSet WHERE Name = {}",
            soql_quote(&permission_set_name)
        ))
        .await?;
    let permission_set = records_of(&sets).first().ok_or_else(|| {
        ToolError::new(
            codes::NOT_FOUND,
            format!("Permission set/profile '{permission_set_name}' not found."),
        )
        .with_field("permission_set_name")
    })?;
    let parent_id = permission_set
        .get("Id")
        .and_then(Value::as_str)
        .ok_or_else(|| SalesforceError::UnexpectedResponse("PermissionSet row has no Id".into()))?;
    let is_profile = permission_set
        .get("IsOwnedByProfile")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let existing = api
        .tooling_query(&format!(
            "SELECT Id FROM FieldPermissions WHERE ParentId = {} AND Field = {}",
            soql_quote(parent_id),
            soql_quote(&qualified)
        ))
        .await?;
    let payload = json!({
        "ParentId": parent_id,
        "SobjectType": object_name,
        "Field": qualified,
        "PermissionsRead": readable,
        "PermissionsEdit": editable,
    });

    let existing_id = records_of(&existing)
        .first()
        .and_then(|record| record.get("Id"))
        .and_then(Value::as_str);
    let (action, result) = match existing_id {
        Some(id) => (
            "updated",
            api.tooling_execute(
                &format!("sobjects/FieldPermissions/{id}"),
                Method::PATCH,
                Some(&payload),
            )
            .await?,
        ),
        None => (
            "created",
            api.tooling_execute("sobjects/FieldPermissions", Method::POST, Some(&payload))
                .await?,
        ),
    };

    let holder = if is_profile { "Profile" } else { "Permission Set" };
    Ok(format!(
        "Field permissions {action} successfully!\nField: {qualified}\n{holder}: {permission_set_name}\nReadable: {readable}\nEditable: {editable}\nResult: {}",
        to_pretty_json(&result)
    ))
}

async fn get_field_permissions(
    api: &dyn SalesforceApi,
    args: &Map<String, Value>,
) -> Result<String, ToolError> {
    let object_name = required_api_name(args, "object_name")?;
    let field_name = required_api_name(args, "field_name")?;
    let qualified = format!("{object_name}.{field_name}");

    let result = api
        .tooling_query(&format!(
            "SELECT Id, ParentId, Parent.Name, Parent.IsOwnedByProfile, PermissionsRead, PermissionsEdit, Field FROM FieldPermissions WHERE Field = {}",
            soql_quote(&qualified)
        ))
        .await?;
    let records = records_of(&result);
    if records.is_empty() {
        return Ok(format!("No field permissions found for {qualified}"));
    }

    let permissions: Vec<Value> = records
        .iter()
        .map(|perm| {
            let parent = perm.get("Parent");
            let is_profile = parent
                .and_then(|p| p.get("IsOwnedByProfile"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            json!({
                "name": parent.and_then(|p| p.get("Name")).cloned().unwrap_or(Value::Null),
                "type": if is_profile { "Profile" } else { "Permission Set" },
                "readable": perm.get("PermissionsRead").cloned().unwrap_or(Value::Bool(false)),
                "editable": perm.get("PermissionsEdit").cloned().unwrap_or(Value::Bool(false)),
                "id": perm.get("ParentId").cloned().unwrap_or(Value::Null),
            })
        })
        .collect();
    Ok(labeled(
        &format!("Field Permissions for {qualified}:\n"),
        &permissions,
    ))
}

async fn export_data_csv(
    api: &dyn SalesforceApi,
    args: &Map<String, Value>,
) -> Result<String, ToolError> {
    let query = required_string(args, "query")?;
    let filename = arg_string(args, "filename", "export.csv")?;
    let result = api.query_all(&query).await?;
    match render_csv(records_of(&result)) {
        Some(export) => Ok(export_summary(&filename, &export)),
        None => Ok(NO_RECORDS_MESSAGE.to_string()),
    }
}

async fn list_reports(
    api: &dyn SalesforceApi,
    args: &Map<String, Value>,
) -> Result<String, ToolError> {
    let folder_filter = match arg_optional_string(args, "folder_id")? {
        Some(folder_id) => format!(" WHERE OwnerId = {}", soql_quote(&folder_id)),
        None => String::new(),
    };
    let reports = api
        .query(&format!(
            "SELECT Id, Name, DeveloperName, FolderName, Description, LastRunDate FROM Report{folder_filter} ORDER BY FolderName, Name"
        ))
        .await?;
    let folders = api
        .query("SELECT Id, Name, DeveloperName, Type FROM Folder WHERE Type = 'Report' ORDER BY Name")
        .await?;

    let reports = records_of(&reports);
    let folders = records_of(&folders);
    Ok(labeled(
        "Reports and Folders (JSON):\n",
        &json!({
            "reports": reports,
            "folders": folders,
            "total_reports": reports.len(),
            "total_folders": folders.len(),
        }),
    ))
}

async fn list_users(api: &dyn SalesforceApi, args: &Map<String, Value>) -> Result<String, ToolError> {
    let include_inactive = arg_bool(args, "include_inactive", false)?;
    let limit = arg_optional_u64(args, "limit")?.unwrap_or(DEFAULT_USER_LIMIT);
    if limit == 0 {
        return Err(ToolError::validation("limit", "'limit' must be at least 1"));
    }
    let active_filter = if include_inactive {
        ""
    } else {
        " WHERE IsActive = TRUE"
    };

    let users = api
        .query(&format!(
            "SELECT Id, Username, FirstName, LastName, Email, IsActive, Profile.Name, UserRole.Name, LastLoginDate, CreatedDate FROM User{active_filter} ORDER BY LastName, FirstName LIMIT {limit}"
        ))
        .await?;
    let count = api
        .query(&format!("SELECT COUNT() FROM User{active_filter}"))
        .await?;

    let users = records_of(&users);
    Ok(labeled(
        "Users List (JSON):\n",
        &json!({
            "users": users,
            "total_count": count.get("totalSize").cloned().unwrap_or(json!(0)),
            "returned_count": users.len(),
            "include_inactive": include_inactive,
            "limit": limit,
        }),
    ))
}

async fn get_org_limits(api: &dyn SalesforceApi) -> Result<String, ToolError> {
    let limits = api.restful("limits", Method::GET, &[], None).await?;
    let org = api
        .query("SELECT Id, Name, OrganizationType, IsSandbox, InstanceName FROM Organization")
        .await?;

    let pair = |key: &str| {
        let entry = limits.get(key);
        let read = |k: &str| entry.and_then(|e| e.get(k)).and_then(Value::as_i64).unwrap_or(0);
        (read("Max"), read("Remaining"))
    };
    let (api_max, api_remaining) = pair("DailyApiRequests");
    let (storage_max, storage_remaining) = pair("DataStorageMB");

    let organization = records_of(&org).first().cloned().unwrap_or_else(|| json!({}));
    Ok(labeled(
        "Organization Limits and Info (JSON):\n",
        &json!({
            "organization": organization,
            "limits": limits,
            "summary": {
                "api_requests_used": api_max - api_remaining,
                "api_requests_remaining": api_remaining,
                "api_requests_limit": api_max,
                "data_storage_used_mb": storage_max - storage_remaining,
                "data_storage_remaining_mb": storage_remaining,
                "data_storage_limit_mb": storage_max,
            }
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockSalesforce, account_describe};
    use crate::tools::{ArgKind, ArgSpec, ToolDefinition, tool_definitions};

    fn dispatcher(api: &Arc<MockSalesforce>) -> Dispatcher {
        let client: Arc<dyn SalesforceApi> = api.clone();
        Dispatcher::new(Some(client), FieldCache::default())
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn missing_required_argument_never_reaches_the_client() {
        let api = Arc::new(MockSalesforce::new());
        let d = dispatcher(&api);

        for (tool, arguments) in [
            ("run_soql_query", json!({})),
            ("run_soql_query", json!({"query": ""})),
            ("get_record", json!({"object_name": "Account", "record_id": null})),
            ("create_record", json!({"object_name": "Account", "data": {}})),
            ("bulk_delete_records", json!({"object_name": "Account", "record_ids": []})),
        ] {
            let err = d.call(tool, &args(arguments)).await.unwrap_err();
            assert_eq!(err.code, codes::VALIDATION_FAILED, "{tool}");
        }
        assert!(api.calls().is_empty());
    }

    /// A non-empty value of the right shape for `spec`.
    fn filled(spec: &ArgSpec) -> Value {
        if let Some(first) = spec.allowed.first() {
            return json!(first);
        }
        match spec.kind {
            ArgKind::String => json!("Account"),
            ArgKind::Number => json!(1),
            ArgKind::Boolean => json!(true),
            ArgKind::Object => json!({"Name": "Acme"}),
            ArgKind::StringArray => json!(["001x"]),
            ArgKind::ObjectArray | ArgKind::RecordArray => json!([{"Id": "001x"}]),
        }
    }

    fn empty(spec: &ArgSpec) -> Value {
        match spec.kind {
            ArgKind::String => json!("  "),
            ArgKind::Object => json!({}),
            ArgKind::StringArray | ArgKind::ObjectArray | ArgKind::RecordArray => json!([]),
            ArgKind::Number | ArgKind::Boolean => Value::Null,
        }
    }

    fn required_filled(tool: &ToolDefinition) -> Map<String, Value> {
        tool.args
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| (spec.name.to_string(), filled(spec)))
            .collect()
    }

    #[tokio::test]
    async fn every_required_argument_is_checked_before_the_client() {
        let api = Arc::new(MockSalesforce::new());
        let d = dispatcher(&api);
        let mut checked = 0;

        for tool in tool_definitions() {
            for spec in tool.args.iter().filter(|spec| spec.required) {
                let mut absent = required_filled(tool);
                absent.remove(spec.name);
                let mut blank = required_filled(tool);
                blank.insert(spec.name.to_string(), empty(spec));

                for arguments in [absent, blank] {
                    let err = d.call(tool.name, &arguments).await.unwrap_err();
                    assert_eq!(err.code, codes::VALIDATION_FAILED, "{}.{}", tool.name, spec.name);
                    assert_eq!(err.field.as_deref(), Some(spec.name), "{}", tool.name);
                }
                checked += 1;
            }
        }
        assert!(checked > 20);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn every_org_tool_reports_not_connected() {
        let d = Dispatcher::new(None, FieldCache::default());
        for tool in tool_definitions() {
            if tool.name == "clear_field_cache" {
                continue;
            }
            let err = d.call(tool.name, &required_filled(tool)).await.unwrap_err();
            assert_eq!(err.code, codes::NOT_CONNECTED, "{}", tool.name);
        }
    }

    #[tokio::test]
    async fn disconnected_dispatcher_reports_connection_error() {
        let d = Dispatcher::new(None, FieldCache::default());
        let err = d
            .call("run_soql_query", &args(json!({"query": "SELECT Id FROM Account"})))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::NOT_CONNECTED);
        assert_eq!(err.message, "Salesforce connection not established.");
    }

    #[tokio::test]
    async fn validation_runs_before_connection_check() {
        let d = Dispatcher::new(None, FieldCache::default());
        let err = d.call("get_record", &args(json!({"object_name": "Account"}))).await.unwrap_err();
        assert_eq!(err.code, codes::VALIDATION_FAILED);
    }

    #[tokio::test]
    async fn soql_result_is_labeled_pretty_json() {
        let result = json!({"totalSize": 1, "done": true, "records": [{"Id": "001A"}]});
        let api = Arc::new(MockSalesforce::new().with_response("query_all", result.clone()));
        let d = dispatcher(&api);

        let text = d
            .call("run_soql_query", &args(json!({"query": "SELECT Id FROM Account"})))
            .await
            .unwrap();
        assert_eq!(
            text,
            format!("SOQL Query Results (JSON):\n{}", to_pretty_json(&result))
        );
        assert_eq!(api.calls()[0].args, json!("SELECT Id FROM Account"));
    }

    #[tokio::test]
    async fn aliases_dispatch_to_canonical_tools() {
        let api = Arc::new(
            MockSalesforce::new()
                .with_response("query_all", json!({"records": []}))
                .with_response("search", json!({"searchRecords": []})),
        );
        let d = dispatcher(&api);
        assert!(
            d.call("run_query", &args(json!({"query": "SELECT Id FROM Lead"})))
                .await
                .unwrap()
                .starts_with("SOQL Query Results")
        );
        assert!(
            d.call("run_search", &args(json!({"search": "FIND {Acme}"})))
                .await
                .unwrap()
                .starts_with("SOSL Search Results")
        );
    }

    #[tokio::test]
    async fn object_fields_are_described_once() {
        let api = Arc::new(MockSalesforce::new().with_response("describe", account_describe()));
        let d = dispatcher(&api);
        let a = args(json!({"object_name": "Account"}));

        let first = d.call("get_object_fields", &a).await.unwrap();
        let second = d.call("get_object_fields", &a).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(api.call_count("describe"), 1);
        assert!(first.starts_with("Account Metadata (JSON):\n["));
        let body: Value = serde_json::from_str(first.split_once('\n').unwrap().1).unwrap();
        assert_eq!(body[1]["name"], "Name");
        assert_eq!(
            body[1].as_object().unwrap().keys().collect::<Vec<_>>(),
            vec!["label", "name", "updateable", "type", "length", "picklistValues"]
        );
    }

    #[tokio::test]
    async fn field_details_match_case_insensitively_and_share_the_cache() {
        let api = Arc::new(MockSalesforce::new().with_response("describe", account_describe()));
        let d = dispatcher(&api);

        let text = d
            .call("get_field_details", &args(json!({"object_name": "Account", "field_name": "gln__c"})))
            .await
            .unwrap();
        assert!(text.starts_with("Field Details for Account.gln__c (JSON):\n"));
        let body: Value = serde_json::from_str(text.split_once('\n').unwrap().1).unwrap();
        assert_eq!(body["name"], "GLN__c");
        assert_eq!(body["external_id"], true);
        assert_eq!(body["required"], false);

        d.call("get_object_fields", &args(json!({"object_name": "Account"})))
            .await
            .unwrap();
        assert_eq!(api.call_count("describe"), 1);
    }

    #[tokio::test]
    async fn field_details_miss_lists_similar_fields() {
        let api = Arc::new(MockSalesforce::new().with_response("describe", account_describe()));
        let d = dispatcher(&api);

        let text = d
            .call(
                "get_field_details",
                &args(json!({"object_name": "Account", "field_name": "account"})),
            )
            .await
            .unwrap();
        let body: Value = serde_json::from_str(text.split_once('\n').unwrap().1).unwrap();
        assert_eq!(body["error"], "Field 'account' not found in object 'Account'");
        assert_eq!(body["similar_fields"], json!(["AccountNumber"]));
    }

    #[tokio::test]
    async fn update_and_delete_report_status() {
        let api = Arc::new(MockSalesforce::new());
        let d = dispatcher(&api);

        let updated = d
            .call(
                "update_record",
                &args(json!({"object_name": "Account", "record_id": "001A", "data": {"Name": "Acme"}})),
            )
            .await
            .unwrap();
        assert_eq!(updated, "Update Account Record Result: 204");

        let deleted = d
            .call("delete_record", &args(json!({"object_name": "Account", "record_id": "001A"})))
            .await
            .unwrap();
        assert_eq!(deleted, "Delete Account Record Result: 204");
        assert_eq!(api.calls()[0].args, json!(["Account", "001A", {"Name": "Acme"}]));
    }

    #[tokio::test]
    async fn bulk_create_rejects_non_objects_before_calling_out() {
        let api = Arc::new(MockSalesforce::new());
        let d = dispatcher(&api);

        let err = d
            .call(
                "bulk_create_records",
                &args(json!({"object_name": "Contact", "data": [{"LastName": "Ng"}, "oops"]})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("data"));
        assert!(api.calls().is_empty());

        let text = d
            .call(
                "bulk_create_records",
                &args(json!({"object_name": "Contact", "data": [{"LastName": "Ng"}]})),
            )
            .await
            .unwrap();
        assert!(text.starts_with("Bulk Create Contact Results (JSON):\n"));
        assert!(text.contains("\"success\": true"));
        assert_eq!(api.call_count("bulk_insert"), 1);
    }

    #[tokio::test]
    async fn bulk_delete_wraps_ids_as_records() {
        let api = Arc::new(MockSalesforce::new());
        let d = dispatcher(&api);

        let text = d
            .call(
                "bulk_delete_records",
                &args(json!({"object_name": "Account", "record_ids": ["001x", "001y"]})),
            )
            .await
            .unwrap();
        assert!(text.starts_with("Bulk Delete Account Results (JSON):\n"));
        assert_eq!(
            api.calls()[0].args,
            json!(["Account", [{"Id": "001x"}, {"Id": "001y"}]])
        );
    }

    #[tokio::test]
    async fn bulk_update_requires_ids_and_bulk_delete_requires_strings() {
        let api = Arc::new(MockSalesforce::new());
        let d = dispatcher(&api);

        let err = d
            .call(
                "bulk_update_records",
                &args(json!({"object_name": "Account", "data": [{"Id": "001A"}, {"Name": "no id"}]})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.details, Some(json!({"index": 1})));

        let err = d
            .call(
                "bulk_delete_records",
                &args(json!({"object_name": "Account", "record_ids": ["001A", 7]})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("record_ids"));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn csv_export_without_records_reports_nothing_exported() {
        let api = Arc::new(
            MockSalesforce::new().with_response("query_all", json!({"totalSize": 0, "records": []})),
        );
        let d = dispatcher(&api);
        let text = d
            .call("export_data_csv", &args(json!({"query": "SELECT Id FROM Account WHERE Name = 'none'"})))
            .await
            .unwrap();
        assert_eq!(text, NO_RECORDS_MESSAGE);
    }

    #[tokio::test]
    async fn csv_export_summarizes_rows() {
        let api = Arc::new(MockSalesforce::new().with_response(
            "query_all",
            json!({"records": [
                {"attributes": {"type": "Contact"}, "Id": "003A", "Email": "a@x.com"},
                {"attributes": {"type": "Contact"}, "Id": "003B", "Email": null}
            ]}),
        ));
        let d = dispatcher(&api);
        let text = d
            .call(
                "export_data_csv",
                &args(json!({"query": "SELECT Id, Email FROM Contact", "filename": "contacts.csv"})),
            )
            .await
            .unwrap();
        assert!(text.contains("Filename: contacts.csv\nRecords exported: 2\nFields: Id, Email\n"));
        assert!(text.ends_with("Id,Email\r\n003A,a@x.com\r\n003B,\r\n"));
    }

    #[tokio::test]
    async fn remote_errors_surface_as_tool_errors() {
        let api = Arc::new(MockSalesforce::new().failing(
            400,
            json!([{"message": "unexpected token: FORM", "errorCode": "MALFORMED_QUERY"}]),
        ));
        let d = dispatcher(&api);
        let err = d
            .call("run_soql_query", &args(json!({"query": "SELECT Id FORM Account"})))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::SALESFORCE_ERROR);
        assert_eq!(err.message, "MALFORMED_QUERY: unexpected token: FORM");
    }

    #[tokio::test]
    async fn object_names_are_checked_before_building_requests() {
        let api = Arc::new(MockSalesforce::new());
        let d = dispatcher(&api);
        let err = d
            .call("get_record_types", &args(json!({"object_name": "Account' OR Name != '"})))
            .await
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("object_name"));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn list_sobjects_returns_names() {
        let api = Arc::new(MockSalesforce::new().with_response(
            "describe_global",
            json!({"sobjects": [{"name": "Account"}, {"name": "Contact"}]}),
        ));
        let d = dispatcher(&api);
        let text = d.call("list_sobjects", &Map::new()).await.unwrap();
        assert_eq!(
            text,
            "Available SObjects (JSON):\n[\n  \"Account\",\n  \"Contact\"\n]"
        );
    }

    #[tokio::test]
    async fn restful_passes_method_params_and_body() {
        let api = Arc::new(MockSalesforce::new().with_response("restful", json!({"ok": true})));
        let d = dispatcher(&api);
        d.call(
            "restful",
            &args(json!({
                "path": "sobjects/Account",
                "method": "POST",
                "params": {"q": 1},
                "data": {"Name": "Acme"}
            })),
        )
        .await
        .unwrap();
        assert_eq!(
            api.calls()[0].args,
            json!(["sobjects/Account", "POST", [["q", "1"]], {"Name": "Acme"}])
        );
    }

    #[tokio::test]
    async fn create_custom_field_builds_type_specific_metadata() {
        let api = Arc::new(
            MockSalesforce::new().with_response("tooling_execute", json!({"id": "00N1", "success": true})),
        );
        let d = dispatcher(&api);
        let text = d
            .call(
                "create_custom_field",
                &args(json!({
                    "object_name": "Account",
                    "field_name": "Score",
                    "field_type": "Number",
                    "field_label": "Score",
                    "scale": 2
                })),
            )
            .await
            .unwrap();
        assert!(text.starts_with("Create Custom Field Result (JSON):\n"));

        let call = &api.calls()[0];
        assert_eq!(call.args[0], "sobjects/CustomField");
        assert_eq!(call.args[1], "POST");
        assert_eq!(call.args[2]["FullName"], "Account.Score__c");
        assert_eq!(call.args[2]["Metadata"]["precision"], 18);
        assert_eq!(call.args[2]["Metadata"]["scale"], 2);
        assert!(call.args[2]["Metadata"].get("length").is_none());
    }

    #[tokio::test]
    async fn create_custom_field_rejects_unknown_type() {
        let api = Arc::new(MockSalesforce::new());
        let d = dispatcher(&api);
        let err = d
            .call(
                "create_custom_field",
                &args(json!({
                    "object_name": "Account",
                    "field_name": "Score",
                    "field_type": "Blob",
                    "field_label": "Score"
                })),
            )
            .await
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("field_type"));
    }

    #[tokio::test]
    async fn update_custom_field_needs_changes_and_an_existing_field() {
        let api = Arc::new(MockSalesforce::new().with_response("tooling_query", json!({"records": []})));
        let d = dispatcher(&api);

        let err = d
            .call(
                "update_custom_field",
                &args(json!({"object_name": "Account", "field_name": "GLN__c"})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::VALIDATION_FAILED);
        assert!(api.calls().is_empty());

        let err = d
            .call(
                "update_custom_field",
                &args(json!({"object_name": "Account", "field_name": "GLN__c", "unique": true})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::NOT_FOUND);
        assert_eq!(
            api.calls()[0].args,
            json!("SELECT Id FROM CustomField WHERE TableEnumOrId = 'Account' AND DeveloperName = 'GLN'")
        );
    }

    #[tokio::test]
    async fn set_field_permissions_updates_existing_grant() {
        let api = Arc::new(
            MockSalesforce::new()
                .with_response(
                    "tooling_query",
                    json!({"records": [{"Id": "0PS1", "Name": "Sales_Ops", "IsOwnedByProfile": false}]}),
                )
                .with_response("tooling_query", json!({"records": [{"Id": "01k1"}]}))
                .with_response("tooling_execute", Value::Null),
        );
        let d = dispatcher(&api);
        let text = d
            .call(
                "set_field_permissions",
                &args(json!({
                    "object_name": "Account",
                    "field_name": "GLN__c",
                    "permission_set_name": "Sales_Ops",
                    "editable": false
                })),
            )
            .await
            .unwrap();
        assert_eq!(
            text,
            "Field permissions updated successfully!\nField: Account.GLN__c\nPermission Set: Sales_Ops\nReadable: true\nEditable: false\nResult: null"
        );
        let patch = &api.calls()[2];
        assert_eq!(patch.args[0], "sobjects/FieldPermissions/01k1");
        assert_eq!(patch.args[1], "PATCH");
        assert_eq!(patch.args[2]["PermissionsEdit"], false);
    }

    #[tokio::test]
    async fn set_field_permissions_missing_set_is_not_found() {
        let api = Arc::new(MockSalesforce::new().with_response("tooling_query", json!({"records": []})));
        let d = dispatcher(&api);
        let err = d
            .call(
                "set_field_permissions",
                &args(json!({"object_name": "Account", "field_name": "GLN__c"})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::NOT_FOUND);
        assert_eq!(err.message, "Permission set/profile 'System Administrator' not found.");
    }

    #[tokio::test]
    async fn field_permissions_listing_and_empty_message() {
        let api = Arc::new(
            MockSalesforce::new()
                .with_response(
                    "tooling_query",
                    json!({"records": [{
                        "ParentId": "0PS1",
                        "Parent": {"Name": "Admin", "IsOwnedByProfile": true},
                        "PermissionsRead": true,
                        "PermissionsEdit": false
                    }]}),
                )
                .with_response("tooling_query", json!({"records": []})),
        );
        let d = dispatcher(&api);
        let a = args(json!({"object_name": "Account", "field_name": "GLN__c"}));

        let text = d.call("get_field_permissions", &a).await.unwrap();
        let body: Value = serde_json::from_str(text.split_once('\n').unwrap().1).unwrap();
        assert_eq!(
            body,
            json!([{"name": "Admin", "type": "Profile", "readable": true, "editable": false, "id": "0PS1"}])
        );

        let empty = d.call("get_field_permissions", &a).await.unwrap();
        assert_eq!(empty, "No field permissions found for Account.GLN__c");
    }

    #[tokio::test]
    async fn list_users_filters_active_by_default() {
        let api = Arc::new(
            MockSalesforce::new()
                .with_response("query", json!({"records": [{"Id": "005A"}]}))
                .with_response("query", json!({"totalSize": 42, "records": []})),
        );
        let d = dispatcher(&api);
        let text = d.call("list_users", &args(json!({"limit": 5}))).await.unwrap();
        let body: Value = serde_json::from_str(text.split_once('\n').unwrap().1).unwrap();
        assert_eq!(body["total_count"], 42);
        assert_eq!(body["returned_count"], 1);
        assert_eq!(body["limit"], 5);

        let calls = api.calls();
        assert!(calls[0].args.as_str().unwrap().contains("WHERE IsActive = TRUE"));
        assert!(calls[0].args.as_str().unwrap().ends_with("LIMIT 5"));
        assert_eq!(calls[1].args, json!("SELECT COUNT() FROM User WHERE IsActive = TRUE"));
    }

    #[tokio::test]
    async fn org_limits_summarize_usage() {
        let api = Arc::new(
            MockSalesforce::new()
                .with_response(
                    "restful",
                    json!({
                        "DailyApiRequests": {"Max": 15000, "Remaining": 14000},
                        "DataStorageMB": {"Max": 5, "Remaining": 4}
                    }),
                )
                .with_response("query", json!({"records": [{"Name": "Acme Org", "IsSandbox": true}]})),
        );
        let d = dispatcher(&api);
        let text = d.call("get_org_limits", &Map::new()).await.unwrap();
        let body: Value = serde_json::from_str(text.split_once('\n').unwrap().1).unwrap();
        assert_eq!(body["organization"]["Name"], "Acme Org");
        assert_eq!(body["summary"]["api_requests_used"], 1000);
        assert_eq!(body["summary"]["data_storage_used_mb"], 1);
    }

    #[tokio::test]
    async fn get_and_create_record_label_results() {
        let api = Arc::new(
            MockSalesforce::new()
                .with_response("get", json!({"Id": "001A", "Name": "Acme"}))
                .with_response("create", json!({"id": "001B", "success": true, "errors": []})),
        );
        let d = dispatcher(&api);

        let fetched = d
            .call("get_record", &args(json!({"object_name": "Account", "record_id": "001A"})))
            .await
            .unwrap();
        assert!(fetched.starts_with("Account Record (JSON):\n{\n  \"Id\": \"001A\""));

        let created = d
            .call(
                "create_record",
                &args(json!({"object_name": "Account", "data": {"Name": "Globex"}})),
            )
            .await
            .unwrap();
        assert!(created.starts_with("Create Account Record Result (JSON):\n"));
        assert_eq!(api.calls()[1].args, json!(["Account", {"Name": "Globex"}]));
    }

    #[tokio::test]
    async fn user_permissions_combine_object_and_field_flags() {
        let api = Arc::new(MockSalesforce::new().with_response("describe", account_describe()));
        let d = dispatcher(&api);
        let text = d
            .call("get_user_permissions", &args(json!({"object_name": "Account"})))
            .await
            .unwrap();
        assert!(text.starts_with("Account User Permissions (JSON):\n"));
        let body: Value = serde_json::from_str(text.split_once('\n').unwrap().1).unwrap();
        assert_eq!(body["object_permissions"]["deletable"], true);
        assert_eq!(body["field_permissions"][0]["name"], "Id");
        assert_eq!(body["field_permissions"][0]["createable"], false);
        assert_eq!(body["field_permissions"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn list_reports_filters_by_folder() {
        let api = Arc::new(
            MockSalesforce::new()
                .with_response("query", json!({"records": [{"Id": "00O1", "Name": "Pipeline"}]}))
                .with_response("query", json!({"records": []})),
        );
        let d = dispatcher(&api);
        let text = d
            .call("list_reports", &args(json!({"folder_id": "00l5e000000abcd"})))
            .await
            .unwrap();
        let body: Value = serde_json::from_str(text.split_once('\n').unwrap().1).unwrap();
        assert_eq!(body["total_reports"], 1);
        assert_eq!(body["total_folders"], 0);
        assert!(
            api.calls()[0]
                .args
                .as_str()
                .unwrap()
                .contains("FROM Report WHERE OwnerId = '00l5e000000abcd' ORDER BY")
        );
    }

    #[tokio::test]
    async fn clear_field_cache_works_without_a_connection() {
        let d = Dispatcher::new(None, FieldCache::default());
        let text = d.call("clear_field_cache", &Map::new()).await.unwrap();
        assert_eq!(
            text,
            "Field Cache Cleared:\n{\n  \"cleared\": 0,\n  \"remaining\": 0\n}"
        );
    }

    #[tokio::test]
    async fn clear_field_cache_forces_a_new_describe() {
        let api = Arc::new(MockSalesforce::new().with_response("describe", account_describe()));
        let d = dispatcher(&api);
        let a = args(json!({"object_name": "Account"}));

        d.call("get_object_fields", &a).await.unwrap();
        let text = d.call("clear_field_cache", &a).await.unwrap();
        assert!(text.contains("\"cleared\": 1"));
        d.call("get_object_fields", &a).await.unwrap();
        assert_eq!(api.call_count("describe"), 2);
    }

    #[tokio::test]
    async fn unknown_tool_suggests_a_close_name() {
        let d = Dispatcher::new(None, FieldCache::default());
        let err = d.call("get_recrod", &Map::new()).await.unwrap_err();
        assert_eq!(err.code, codes::UNKNOWN_TOOL);
        assert_eq!(err.docs_hint.as_deref(), Some("Did you mean 'get_record'?"));
    }
}
