//! In-memory [`SalesforceApi`] used by the runtime's unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Map, Value, json};
use tokio::sync::Notify;

use crate::error::SalesforceError;
use crate::salesforce::SalesforceApi;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MockCall {
    pub op: &'static str,
    pub args: Value,
}

/// Records every call. Each operation answers from a queue of canned
/// responses; the last queued response repeats.
#[derive(Default)]
pub(crate) struct MockSalesforce {
    calls: Mutex<Vec<MockCall>>,
    responses: Mutex<HashMap<&'static str, VecDeque<Value>>>,
    failure: Option<(u16, Value)>,
    describe_gate: Option<Arc<Notify>>,
}

impl MockSalesforce {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, op: &'static str, value: Value) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(value);
        self
    }

    /// Every call fails with this HTTP status and body.
    pub fn failing(mut self, status: u16, body: Value) -> Self {
        self.failure = Some((status, body));
        self
    }

    /// `describe` records its call, then suspends until `gate` is notified.
    pub fn gate_describe(mut self, gate: Arc<Notify>) -> Self {
        self.describe_gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.op == op)
            .count()
    }

    fn record(&self, op: &'static str, args: Value) -> Result<Option<Value>, SalesforceError> {
        self.calls.lock().unwrap().push(MockCall { op, args });
        if let Some((status, body)) = &self.failure {
            return Err(SalesforceError::from_response(*status, body.clone()));
        }
        let mut responses = self.responses.lock().unwrap();
        let Some(queue) = responses.get_mut(op) else {
            return Ok(None);
        };
        if queue.len() > 1 {
            Ok(queue.pop_front())
        } else {
            Ok(queue.front().cloned())
        }
    }

    fn value(&self, op: &'static str, args: Value) -> Result<Value, SalesforceError> {
        Ok(self.record(op, args)?.unwrap_or(Value::Null))
    }

    fn status(&self, op: &'static str, args: Value) -> Result<u16, SalesforceError> {
        Ok(self
            .record(op, args)?
            .and_then(|v| v.as_u64())
            .map(|v| v as u16)
            .unwrap_or(204))
    }

    fn bulk(&self, op: &'static str, args: Value, records: &[Value]) -> Result<Vec<Value>, SalesforceError> {
        match self.record(op, args)? {
            Some(Value::Array(items)) => Ok(items),
            _ => Ok(records
                .iter()
                .enumerate()
                .map(|(i, record)| {
                    let id = record
                        .get("Id")
                        .cloned()
                        .unwrap_or_else(|| json!(format!("001MOCK{i:04}")));
                    json!({ "id": id, "success": true, "errors": [] })
                })
                .collect()),
        }
    }
}

#[async_trait]
impl SalesforceApi for MockSalesforce {
    async fn query_all(&self, soql: &str) -> Result<Value, SalesforceError> {
        self.value("query_all", json!(soql))
    }

    async fn query(&self, soql: &str) -> Result<Value, SalesforceError> {
        self.value("query", json!(soql))
    }

    async fn search(&self, sosl: &str) -> Result<Value, SalesforceError> {
        self.value("search", json!(sosl))
    }

    async fn describe_global(&self) -> Result<Value, SalesforceError> {
        self.value("describe_global", Value::Null)
    }

    async fn describe(&self, object_name: &str) -> Result<Value, SalesforceError> {
        let result = self.value("describe", json!(object_name));
        if let Some(gate) = &self.describe_gate {
            gate.notified().await;
        }
        result
    }

    async fn get(&self, object_name: &str, record_id: &str) -> Result<Value, SalesforceError> {
        self.value("get", json!([object_name, record_id]))
    }

    async fn create(
        &self,
        object_name: &str,
        data: &Map<String, Value>,
    ) -> Result<Value, SalesforceError> {
        self.value("create", json!([object_name, data]))
    }

    async fn update(
        &self,
        object_name: &str,
        record_id: &str,
        data: &Map<String, Value>,
    ) -> Result<u16, SalesforceError> {
        self.status("update", json!([object_name, record_id, data]))
    }

    async fn delete(&self, object_name: &str, record_id: &str) -> Result<u16, SalesforceError> {
        self.status("delete", json!([object_name, record_id]))
    }

    async fn tooling_execute(
        &self,
        action: &str,
        method: Method,
        data: Option<&Value>,
    ) -> Result<Value, SalesforceError> {
        self.value("tooling_execute", json!([action, method.as_str(), data]))
    }

    async fn tooling_query(&self, soql: &str) -> Result<Value, SalesforceError> {
        self.value("tooling_query", json!(soql))
    }

    async fn apex_execute(
        &self,
        action: &str,
        method: Method,
        data: Option<&Value>,
    ) -> Result<Value, SalesforceError> {
        self.value("apex_execute", json!([action, method.as_str(), data]))
    }

    async fn restful(
        &self,
        path: &str,
        method: Method,
        params: &[(String, String)],
        data: Option<&Value>,
    ) -> Result<Value, SalesforceError> {
        self.value("restful", json!([path, method.as_str(), params, data]))
    }

    async fn bulk_insert(
        &self,
        object_name: &str,
        records: &[Value],
    ) -> Result<Vec<Value>, SalesforceError> {
        self.bulk("bulk_insert", json!([object_name, records]), records)
    }

    async fn bulk_update(
        &self,
        object_name: &str,
        records: &[Value],
    ) -> Result<Vec<Value>, SalesforceError> {
        self.bulk("bulk_update", json!([object_name, records]), records)
    }

    async fn bulk_delete(
        &self,
        object_name: &str,
        records: &[Value],
    ) -> Result<Vec<Value>, SalesforceError> {
        self.bulk("bulk_delete", json!([object_name, records]), records)
    }
}

/// Describe payload with a handful of Account fields.
pub(crate) fn account_describe() -> Value {
    json!({
        "name": "Account",
        "createable": true,
        "deletable": true,
        "queryable": true,
        "updateable": true,
        "retrieveable": true,
        "fields": [
            {
                "name": "Id", "label": "Account ID", "type": "id", "length": 18,
                "nillable": false, "updateable": false, "createable": false,
                "filterable": true, "sortable": true, "picklistValues": []
            },
            {
                "name": "Name", "label": "Account Name", "type": "string", "length": 255,
                "nillable": false, "updateable": true, "createable": true,
                "filterable": true, "sortable": true, "picklistValues": []
            },
            {
                "name": "BillingCity", "label": "Billing City", "type": "string", "length": 40,
                "nillable": true, "updateable": true, "createable": true, "picklistValues": []
            },
            {
                "name": "AccountNumber", "label": "Account Number", "type": "string", "length": 40,
                "nillable": true, "updateable": true, "createable": true, "picklistValues": []
            },
            {
                "name": "GLN__c", "label": "GLN", "type": "string", "length": 13,
                "nillable": true, "unique": true, "externalId": true, "custom": true,
                "updateable": true, "createable": true, "picklistValues": []
            }
        ]
    })
}
