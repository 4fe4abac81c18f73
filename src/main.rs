//! MCP HTTP client demo
//!
//! Connects to a Streamable HTTP MCP server, runs the handshake and a health
//! check, lists tools, calls one tool, then stays up answering sampling
//! requests with a mock model until interrupted.
//!
//! ```bash
//! mcp-http-client --url http://localhost:8080/mcp \
//!     --tool execute_query --arg query="SELECT 1" --arg limit=10
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mcp_http_client::transport::{HttpClientConfig, HttpClientTransport};
use mcp_http_client::{EchoSamplingHandler, McpClient, ToolInvocation};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "mcp-http-client")]
#[command(about = "MCP client over Streamable HTTP with mock sampling", long_about = None)]
struct Args {
    /// MCP server endpoint
    #[arg(long, env = "MCP_SERVER_URL", default_value = "http://localhost:8080/mcp")]
    url: String,

    /// Tool to call after listing tools
    #[arg(long, default_value = "execute_query")]
    tool: String,

    /// Tool argument as key=value; values are parsed as JSON when possible
    #[arg(long = "arg", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    args: Vec<(String, Value)>,

    /// Deadline for each request
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// Bearer token sent in the Authorization header
    #[arg(long, env = "MCP_BEARER_TOKEN", hide_env_values = true)]
    bearer_token: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn parse_key_value(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn invocation(args: &Args) -> ToolInvocation {
    let invocation = ToolInvocation::new(&args.tool);
    if args.args.is_empty() {
        return invocation
            .arg("databse", "sql")
            .arg("query", "SELECT * FROM masterbranch")
            .arg("format", "json");
    }
    args.args
        .iter()
        .fold(invocation, |inv, (key, value)| inv.arg(key, value.clone()))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn run(args: Args) -> mcp_http_client::Result<()> {
    let mut config = HttpClientConfig::new(&args.url);
    if let Some(token) = &args.bearer_token {
        config = config.bearer_token(token);
    }
    let transport = Arc::new(HttpClientTransport::new(config)?);

    let client = McpClient::builder(transport.clone())
        .client_info("mcp-http-client", "1.0.0")
        .sampling_handler(EchoSamplingHandler)
        .request_timeout(Duration::from_secs(args.timeout_secs))
        .build();

    if let Err(e) = client.initialize().await {
        tracing::error!(error = %e, "Failed to initialize MCP session");
        let _ = client.close().await;
        return Err(e);
    }

    match transport.open_event_stream().await {
        Ok(true) => tracing::info!("Listening for server requests"),
        Ok(false) => {}
        Err(e) => tracing::warn!(error = %e, "Could not open event stream"),
    }

    println!("Performing health check...");
    if let Err(e) = client.ping().await {
        tracing::error!(error = %e, "Health check failed");
        let _ = client.close().await;
        return Err(e);
    }
    println!("Server is alive and responding");

    match client.list_tools().await {
        Ok(tools) => {
            println!("Available tools: {}", tools.len());
            for tool in &tools {
                tracing::info!(
                    name = %tool.name,
                    description = tool.description.as_deref().unwrap_or(""),
                    "Tool"
                );
            }

            match client.call_tool(invocation(&args)).await {
                Ok(result) => {
                    tracing::info!(tool = %args.tool, response = %result.all_text(), "Response from MCP")
                }
                Err(e) => tracing::error!(tool = %args.tool, error = %e, "Tool call failed"),
            }
        }
        Err(e) => tracing::error!(error = %e, "Failed to list tools"),
    }

    shutdown_signal().await;
    tracing::info!("Received shutdown signal");

    client.close().await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = match format!("mcp_http_client={}", args.log_level)
        .parse::<tracing_subscriber::filter::Directive>()
    {
        Ok(directive) => tracing_subscriber::EnvFilter::from_default_env().add_directive(directive),
        Err(e) => {
            eprintln!("Invalid log level '{}': {}", args.log_level, e);
            return ExitCode::FAILURE;
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(url = %args.url, tool = %args.tool, "Starting mcp-http-client");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "mcp-http-client failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(parse_key_value("limit=10").unwrap(), ("limit".to_string(), json!(10)));
        assert_eq!(
            parse_key_value("query=SELECT * FROM t").unwrap(),
            ("query".to_string(), json!("SELECT * FROM t"))
        );
        assert_eq!(
            parse_key_value("filter={\"a\":true}").unwrap(),
            ("filter".to_string(), json!({"a": true}))
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_default_invocation_matches_demo() {
        let args = Args::parse_from(["mcp-http-client"]);
        let inv = invocation(&args);
        assert_eq!(inv.name, "execute_query");
        assert_eq!(inv.arguments["query"], "SELECT * FROM masterbranch");
        assert_eq!(inv.arguments["format"], "json");
        assert_eq!(inv.arguments.len(), 3);
    }

    #[test]
    fn test_explicit_args_replace_defaults() {
        let args = Args::parse_from(["mcp-http-client", "--tool", "get_schema", "--arg", "table=users"]);
        let inv = invocation(&args);
        assert_eq!(inv.name, "get_schema");
        assert_eq!(inv.arguments.len(), 1);
        assert_eq!(inv.arguments["table"], "users");
    }
}
