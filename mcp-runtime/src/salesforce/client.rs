use async_trait::async_trait;
use reqwest::{Method, Url, header};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::SalesforceApi;
use crate::error::SalesforceError;
use crate::util::parse_response_body;

pub const DEFAULT_API_VERSION: &str = "59.0";

/// sObject Collections accept at most 200 records per request.
const COLLECTIONS_BATCH_SIZE: usize = 200;

/// REST client bound to one org session.
#[derive(Clone)]
pub struct SalesforceClient {
    http: reqwest::Client,
    instance_url: String,
    session_id: String,
    api_version: String,
}

impl std::fmt::Debug for SalesforceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SalesforceClient")
            .field("instance_url", &self.instance_url)
            .field("session_id", &"<redacted>")
            .field("api_version", &self.api_version)
            .finish()
    }
}

#[derive(Debug)]
struct ApiCallResult {
    status: u16,
    body: Value,
}

impl SalesforceClient {
    pub fn new(
        http: reqwest::Client,
        instance_url: impl Into<String>,
        session_id: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        let instance_url: String = instance_url.into();
        let api_version: String = api_version.into();
        Self {
            http,
            instance_url: instance_url.trim_end_matches('/').to_string(),
            session_id: session_id.into(),
            api_version: api_version.trim_start_matches(['v', 'V']).to_string(),
        }
    }

    pub fn instance_url(&self) -> &str {
        &self.instance_url
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// `{instance}/services/data/vXX.X/<segments...>`, each segment percent-encoded.
    fn data_url(&self, segments: &[&str]) -> Result<Url, SalesforceError> {
        let mut url = Url::parse(&self.instance_url)
            .map_err(|e| SalesforceError::InvalidUrl(format!("{}: {e}", self.instance_url)))?;
        let version = format!("v{}", self.api_version);
        url.path_segments_mut()
            .map_err(|_| SalesforceError::InvalidUrl(self.instance_url.clone()))?
            .pop_if_empty()
            .extend(["services", "data", version.as_str()])
            .extend(segments);
        Ok(url)
    }

    /// Join a caller-supplied relative path (which may carry its own query
    /// string) under `prefix`.
    fn relative_url(&self, prefix: &str, path: &str) -> Result<Url, SalesforceError> {
        let path = path.trim().trim_start_matches('/');
        if path.starts_with("http://") || path.starts_with("https://") {
            return Err(SalesforceError::InvalidUrl(format!(
                "pass a path relative to {prefix}, not a full URL"
            )));
        }
        let raw = format!("{}{prefix}{path}", self.instance_url);
        Url::parse(&raw).map_err(|e| SalesforceError::InvalidUrl(format!("{raw}: {e}")))
    }

    fn versioned_prefix(&self, suffix: &str) -> String {
        format!("/services/data/v{}/{suffix}", self.api_version)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<ApiCallResult, SalesforceError> {
        debug!(method = %method, path = url.path(), "salesforce request");
        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&self.session_id)
            .header(header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|source| SalesforceError::Transport {
                url: self.instance_url.clone(),
                source,
            })?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|source| SalesforceError::Transport {
                url: self.instance_url.clone(),
                source,
            })?;
        let body = parse_response_body(&bytes);
        debug!(status, "salesforce response");

        if !(200..=299).contains(&status) {
            return Err(SalesforceError::from_response(status, body));
        }
        Ok(ApiCallResult { status, body })
    }

    async fn get_json(&self, url: Url) -> Result<Value, SalesforceError> {
        Ok(self.send(Method::GET, url, None).await?.body)
    }

    fn query_url(&self, segments: &[&str], soql: &str) -> Result<Url, SalesforceError> {
        let mut url = self.data_url(segments)?;
        url.query_pairs_mut().append_pair("q", soql);
        Ok(url)
    }

    async fn collections_write(
        &self,
        method: Method,
        object_name: &str,
        records: &[Value],
    ) -> Result<Vec<Value>, SalesforceError> {
        let url = self.data_url(&["composite", "sobjects"])?;
        let mut results = Vec::with_capacity(records.len());
        for (batch, chunk) in records.chunks(COLLECTIONS_BATCH_SIZE).enumerate() {
            let typed: Vec<Value> = chunk
                .iter()
                .map(|record| with_type_attribute(record, object_name))
                .collect();
            let body = json!({ "allOrNone": false, "records": typed });
            let outcome = self
                .send(method.clone(), url.clone(), Some(&body))
                .await
                .and_then(|response| collection_results(response.body));
            match outcome {
                Ok(rows) => results.extend(rows),
                Err(err) if batch == 0 => return Err(err),
                Err(err) => {
                    let pending = &records[batch * COLLECTIONS_BATCH_SIZE..];
                    warn!(
                        object_name,
                        committed = results.len(),
                        pending = pending.len(),
                        error = %err,
                        "collections batch failed"
                    );
                    results.extend(
                        pending
                            .iter()
                            .map(|record| uncommitted_row(record.get("Id").cloned(), &err)),
                    );
                    break;
                }
            }
        }
        Ok(results)
    }
}

/// Result row for a record whose batch failed after earlier batches were
/// committed, shaped like a collections error entry.
fn uncommitted_row(id: Option<Value>, err: &SalesforceError) -> Value {
    let status_code = match err {
        SalesforceError::Api { status, body, .. } => body
            .get(0)
            .and_then(|item| item.get("errorCode"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP_{status}")),
        _ => "REQUEST_FAILED".to_string(),
    };
    json!({
        "id": id.unwrap_or(Value::Null),
        "success": false,
        "errors": [{
            "statusCode": status_code,
            "message": err.to_string(),
            "fields": [],
        }],
    })
}

fn with_type_attribute(record: &Value, object_name: &str) -> Value {
    let mut record = record.clone();
    if let Some(map) = record.as_object_mut() {
        if !map.contains_key("attributes") {
            // attributes must lead the record for the collections endpoint
            let mut typed = Map::with_capacity(map.len() + 1);
            typed.insert("attributes".to_string(), json!({ "type": object_name }));
            typed.extend(std::mem::take(map));
            *map = typed;
        }
    }
    record
}

fn collection_results(body: Value) -> Result<Vec<Value>, SalesforceError> {
    match body {
        Value::Array(items) => Ok(items),
        other => Err(SalesforceError::UnexpectedResponse(format!(
            "expected a result array from composite/sobjects, got {other}"
        ))),
    }
}

#[async_trait]
impl SalesforceApi for SalesforceClient {
    async fn query_all(&self, soql: &str) -> Result<Value, SalesforceError> {
        let mut page = self.get_json(self.query_url(&["query"], soql)?).await?;
        let mut records = match page.get_mut("records").map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };

        let mut next = next_records_url(&page);
        while let Some(path) = next {
            let url = self.relative_url("/", &path)?;
            let more = self.get_json(url).await?;
            if let Some(items) = more.get("records").and_then(Value::as_array) {
                records.extend(items.iter().cloned());
            }
            next = next_records_url(&more);
        }

        if let Some(map) = page.as_object_mut() {
            map.remove("nextRecordsUrl");
            map.insert("done".to_string(), Value::Bool(true));
            map.insert("records".to_string(), Value::Array(records));
        }
        Ok(page)
    }

    async fn query(&self, soql: &str) -> Result<Value, SalesforceError> {
        self.get_json(self.query_url(&["query"], soql)?).await
    }

    async fn search(&self, sosl: &str) -> Result<Value, SalesforceError> {
        self.get_json(self.query_url(&["search"], sosl)?).await
    }

    async fn describe_global(&self) -> Result<Value, SalesforceError> {
        self.get_json(self.data_url(&["sobjects"])?).await
    }

    async fn describe(&self, object_name: &str) -> Result<Value, SalesforceError> {
        self.get_json(self.data_url(&["sobjects", object_name, "describe"])?)
            .await
    }

    async fn get(&self, object_name: &str, record_id: &str) -> Result<Value, SalesforceError> {
        self.get_json(self.data_url(&["sobjects", object_name, record_id])?)
            .await
    }

    async fn create(
        &self,
        object_name: &str,
        data: &Map<String, Value>,
    ) -> Result<Value, SalesforceError> {
        let url = self.data_url(&["sobjects", object_name])?;
        let body = Value::Object(data.clone());
        Ok(self.send(Method::POST, url, Some(&body)).await?.body)
    }

    async fn update(
        &self,
        object_name: &str,
        record_id: &str,
        data: &Map<String, Value>,
    ) -> Result<u16, SalesforceError> {
        let url = self.data_url(&["sobjects", object_name, record_id])?;
        let body = Value::Object(data.clone());
        Ok(self.send(Method::PATCH, url, Some(&body)).await?.status)
    }

    async fn delete(&self, object_name: &str, record_id: &str) -> Result<u16, SalesforceError> {
        let url = self.data_url(&["sobjects", object_name, record_id])?;
        Ok(self.send(Method::DELETE, url, None).await?.status)
    }

    async fn tooling_execute(
        &self,
        action: &str,
        method: Method,
        data: Option<&Value>,
    ) -> Result<Value, SalesforceError> {
        let url = self.relative_url(&self.versioned_prefix("tooling/"), action)?;
        Ok(self.send(method, url, data).await?.body)
    }

    async fn tooling_query(&self, soql: &str) -> Result<Value, SalesforceError> {
        self.get_json(self.query_url(&["tooling", "query"], soql)?)
            .await
    }

    async fn apex_execute(
        &self,
        action: &str,
        method: Method,
        data: Option<&Value>,
    ) -> Result<Value, SalesforceError> {
        let url = self.relative_url("/services/apexrest/", action)?;
        Ok(self.send(method, url, data).await?.body)
    }

    async fn restful(
        &self,
        path: &str,
        method: Method,
        params: &[(String, String)],
        data: Option<&Value>,
    ) -> Result<Value, SalesforceError> {
        let mut url = self.relative_url(&self.versioned_prefix(""), path)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(self.send(method, url, data).await?.body)
    }

    async fn bulk_insert(
        &self,
        object_name: &str,
        records: &[Value],
    ) -> Result<Vec<Value>, SalesforceError> {
        self.collections_write(Method::POST, object_name, records)
            .await
    }

    async fn bulk_update(
        &self,
        object_name: &str,
        records: &[Value],
    ) -> Result<Vec<Value>, SalesforceError> {
        self.collections_write(Method::PATCH, object_name, records)
            .await
    }

    async fn bulk_delete(
        &self,
        _object_name: &str,
        records: &[Value],
    ) -> Result<Vec<Value>, SalesforceError> {
        let ids: Vec<&str> = records
            .iter()
            .filter_map(|record| record.get("Id").and_then(Value::as_str))
            .collect();
        if ids.len() != records.len() {
            return Err(SalesforceError::UnexpectedResponse(
                "every record passed to bulk delete needs a string Id".to_string(),
            ));
        }

        let mut results = Vec::with_capacity(ids.len());
        for (batch, chunk) in ids.chunks(COLLECTIONS_BATCH_SIZE).enumerate() {
            let mut url = self.data_url(&["composite", "sobjects"])?;
            url.query_pairs_mut()
                .append_pair("ids", &chunk.join(","))
                .append_pair("allOrNone", "false");
            let outcome = self
                .send(Method::DELETE, url, None)
                .await
                .and_then(|response| collection_results(response.body));
            match outcome {
                Ok(rows) => results.extend(rows),
                Err(err) if batch == 0 => return Err(err),
                Err(err) => {
                    let pending = &ids[batch * COLLECTIONS_BATCH_SIZE..];
                    warn!(
                        committed = results.len(),
                        pending = pending.len(),
                        error = %err,
                        "collections delete batch failed"
                    );
                    results.extend(
                        pending
                            .iter()
                            .map(|id| uncommitted_row(Some(json!(id)), &err)),
                    );
                    break;
                }
            }
        }
        Ok(results)
    }
}

fn next_records_url(page: &Value) -> Option<String> {
    if page.get("done").and_then(Value::as_bool).unwrap_or(true) {
        return None;
    }
    page.get("nextRecordsUrl")
        .and_then(Value::as_str)
        .map(str::to_string)
}
