//! Salesforce tools exposed over the Model Context Protocol.

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use serde_json::json;
use tracing::{info, warn};

pub mod args;
pub mod csv_export;
pub mod dispatch;
pub mod error;
pub mod field_cache;
pub mod salesforce;
pub mod server;
pub mod tools;
pub mod util;

#[cfg(test)]
mod testing;

use dispatch::Dispatcher;
use field_cache::{DEFAULT_FIELD_CACHE_CAPACITY, FieldCache};
use salesforce::{ConnectionConfig, Credentials, DEFAULT_API_VERSION, SalesforceApi, connect};
use server::{ConnectionStatus, McpServer};
use util::to_pretty_json;

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const MCP_SERVER_NAME: &str = "salesforce-mcp";

#[derive(Subcommand, Clone, Debug)]
pub enum McpCommands {
    /// Run the MCP server over stdio
    Serve,
    /// Connect once, print the connection status and exit (0 connected, 2 not)
    Check,
    /// Print the tools/list payload and exit
    Tools,
}

/// Org connection settings. Every option can come from the environment.
#[derive(Args, Clone)]
pub struct SalesforceArgs {
    /// OAuth access token (used together with --instance-url)
    #[arg(long, env = "SALESFORCE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,
    /// Org base URL, e.g. https://acme.my.salesforce.com
    #[arg(long, env = "SALESFORCE_INSTANCE_URL")]
    pub instance_url: Option<String>,
    #[arg(long, env = "SALESFORCE_USERNAME")]
    pub username: Option<String>,
    #[arg(long, env = "SALESFORCE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    #[arg(long, env = "SALESFORCE_SECURITY_TOKEN", hide_env_values = true)]
    pub security_token: Option<String>,
    /// Login domain: `login` (default), `test` for sandboxes, or a My Domain prefix
    #[arg(long, env = "SALESFORCE_DOMAIN")]
    pub domain: Option<String>,
    #[arg(long, env = "SALESFORCE_API_VERSION", default_value = DEFAULT_API_VERSION)]
    pub api_version: String,
    /// Objects whose field metadata stays cached (LRU)
    #[arg(long, env = "SALESFORCE_FIELD_CACHE_CAPACITY", default_value_t = DEFAULT_FIELD_CACHE_CAPACITY)]
    pub field_cache_capacity: usize,
    #[arg(long, env = "SALESFORCE_CONNECT_TIMEOUT_SECS", default_value_t = 30)]
    pub connect_timeout_secs: u64,
}

impl std::fmt::Debug for SalesforceArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SalesforceArgs")
            .field("credentials", &self.credentials())
            .field("api_version", &self.api_version)
            .field("field_cache_capacity", &self.field_cache_capacity)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl SalesforceArgs {
    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::from_parts(
            self.access_token.clone(),
            self.instance_url.clone(),
            self.username.clone(),
            self.password.clone(),
            self.security_token.clone(),
            self.domain.clone(),
        )
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            credentials: self.credentials(),
            api_version: self.api_version.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

pub async fn run(args: &SalesforceArgs, command: McpCommands) -> i32 {
    match command {
        McpCommands::Serve => {
            let (client, status) = establish(args).await;
            let dispatcher = Dispatcher::new(client, FieldCache::new(args.field_cache_capacity));
            let server = McpServer::new(dispatcher, status);
            match server.serve_stdio().await {
                Ok(()) => 0,
                Err(err) => {
                    let payload = json!({
                        "error": "mcp_server_error",
                        "message": err,
                    });
                    eprintln!("{}", to_pretty_json(&payload));
                    1
                }
            }
        }
        McpCommands::Check => {
            let (client, status) = establish(args).await;
            println!("{}", to_pretty_json(&status));
            if client.is_some() { 0 } else { 2 }
        }
        McpCommands::Tools => {
            println!("{}", to_pretty_json(&tools::tools_list_payload()));
            0
        }
    }
}

/// Connect once at startup. Failure is logged and the server continues
/// without a client.
async fn establish(args: &SalesforceArgs) -> (Option<Arc<dyn SalesforceApi>>, ConnectionStatus) {
    let config = args.connection_config();
    let auth_mode = config.credentials.as_ref().map(Credentials::auth_mode);
    match connect(&config).await {
        Ok(client) => {
            let status = ConnectionStatus::connected(
                auth_mode.unwrap_or("access_token"),
                client.instance_url(),
                client.api_version(),
            );
            info!(
                instance_url = client.instance_url(),
                api_version = client.api_version(),
                "connected to Salesforce"
            );
            let client: Arc<dyn SalesforceApi> = Arc::new(client);
            (Some(client), status)
        }
        Err(err) => {
            warn!(error = %err, "Salesforce connection failed; tools will report not_connected");
            (
                None,
                ConnectionStatus::degraded(auth_mode, &config.api_version, err.to_string()),
            )
        }
    }
}
