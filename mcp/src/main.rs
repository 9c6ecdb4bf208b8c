use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use sforce_mcp_runtime::{McpCommands, SalesforceArgs, run as run_mcp};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(
    name = "sforce-mcp",
    version,
    about = "Salesforce MCP server: SOQL, records, metadata and Tooling API over stdio"
)]
struct Cli {
    #[command(flatten)]
    salesforce: SalesforceArgs,

    /// Log output format (logs always go to stderr)
    #[arg(long, env = "SFORCE_MCP_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Defaults to `serve`
    #[command(subcommand)]
    command: Option<McpCommands>,
}

fn init_tracing(format: LogFormat) {
    // stdout carries the protocol
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let command = cli.command.unwrap_or(McpCommands::Serve);
    tracing::debug!(?command, version = env!("CARGO_PKG_VERSION"), "starting sforce-mcp");
    let code = run_mcp(&cli.salesforce, command).await;
    std::process::exit(code);
}
