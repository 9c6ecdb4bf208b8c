//! Salesforce backing client.
//!
//! The dispatcher only talks to [`SalesforceApi`]; [`SalesforceClient`] is the
//! HTTP implementation and [`connect`] builds one from startup configuration.

mod auth;
mod client;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Map, Value};

use crate::error::SalesforceError;

pub use auth::{ConnectionConfig, Credentials, connect};
pub use client::{DEFAULT_API_VERSION, SalesforceClient};

/// Operations the MCP tools need from an org.
///
/// Object names are plain parameters; implementations build request paths
/// from them.
#[async_trait]
pub trait SalesforceApi: Send + Sync {
    /// SOQL query, following `nextRecordsUrl` until every page is merged.
    async fn query_all(&self, soql: &str) -> Result<Value, SalesforceError>;

    /// SOQL query, first page only.
    async fn query(&self, soql: &str) -> Result<Value, SalesforceError>;

    async fn search(&self, sosl: &str) -> Result<Value, SalesforceError>;

    async fn describe_global(&self) -> Result<Value, SalesforceError>;

    async fn describe(&self, object_name: &str) -> Result<Value, SalesforceError>;

    async fn get(&self, object_name: &str, record_id: &str) -> Result<Value, SalesforceError>;

    async fn create(
        &self,
        object_name: &str,
        data: &Map<String, Value>,
    ) -> Result<Value, SalesforceError>;

    /// Returns the HTTP status (204 on success); the endpoint has no body.
    async fn update(
        &self,
        object_name: &str,
        record_id: &str,
        data: &Map<String, Value>,
    ) -> Result<u16, SalesforceError>;

    /// Returns the HTTP status (204 on success); the endpoint has no body.
    async fn delete(&self, object_name: &str, record_id: &str) -> Result<u16, SalesforceError>;

    /// Tooling API call; `action` is relative to `/tooling/`.
    async fn tooling_execute(
        &self,
        action: &str,
        method: Method,
        data: Option<&Value>,
    ) -> Result<Value, SalesforceError>;

    async fn tooling_query(&self, soql: &str) -> Result<Value, SalesforceError>;

    /// Apex REST call; `action` is relative to `/services/apexrest/`.
    async fn apex_execute(
        &self,
        action: &str,
        method: Method,
        data: Option<&Value>,
    ) -> Result<Value, SalesforceError>;

    /// Raw REST call; `path` is relative to `/services/data/vXX.X/`.
    async fn restful(
        &self,
        path: &str,
        method: Method,
        params: &[(String, String)],
        data: Option<&Value>,
    ) -> Result<Value, SalesforceError>;

    /// One result entry per input record, in input order.
    async fn bulk_insert(
        &self,
        object_name: &str,
        records: &[Value],
    ) -> Result<Vec<Value>, SalesforceError>;

    /// Every record must carry an `Id`.
    async fn bulk_update(
        &self,
        object_name: &str,
        records: &[Value],
    ) -> Result<Vec<Value>, SalesforceError>;

    /// Records are `{"Id": ...}` maps.
    async fn bulk_delete(
        &self,
        object_name: &str,
        records: &[Value],
    ) -> Result<Vec<Value>, SalesforceError>;
}
