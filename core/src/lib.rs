//! Types shared between the Salesforce MCP runtime and its binaries.

pub mod error;
pub mod fields;
