//! GA4 Reports MCP Server
//!
//! Exposes Google Analytics 4 reporting as Model Context Protocol tools.

mod access;
mod analytics;
mod api;
mod auth;
mod backend;
mod config;
mod debug;
mod error;
mod gateway;
mod server;
mod tools;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rmcp::{transport::stdio, ServiceExt};
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

use crate::access::{AccessGate, Authorized};
use crate::auth::OAuth2Client;
use crate::backend::DataApiClient;
use crate::config::Config;
use crate::debug::DebugLogger;
use crate::error::ToolError;
use crate::gateway::{failure_envelope, CallShape, Gateway};
use crate::server::AnalyticsReportsServer;
use crate::tools::{Limits, ToolRegistry};

#[derive(Parser, Debug)]
#[command(name = "ga4-reports-mcp")]
#[command(author, version, about = "Google Analytics 4 reports MCP server", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json", global = true)]
    config: String,

    /// Enable debug logging and the trace file
    #[arg(short, long, global = true)]
    debug: bool,

    /// GA4 property id, overrides property_id from the configuration file
    #[arg(short, long, global = true)]
    property: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve MCP on stdio (default)
    Serve,
    /// Print the tool catalog as JSON
    Tools,
    /// Run one request body (flat or JSON-RPC) and print the response envelope
    Call {
        /// Shared secret checked against api_secret
        #[arg(long)]
        token: Option<String>,

        /// Request body; read from stdin when omitted
        #[arg(long)]
        body: Option<String>,
    },
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout carries MCP traffic
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn build_gateway(config: &Config, debug: Arc<DebugLogger>) -> anyhow::Result<Gateway> {
    let auth_client = OAuth2Client::new(config.clone())?;
    let backend = DataApiClient::new(config, auth_client, debug.clone())?;
    let registry = ToolRegistry::standard(Limits {
        max_rows: config.max_rows,
    });

    Ok(Gateway::new(Arc::new(registry), Arc::new(backend), debug))
}

async fn read_body(body: Option<String>) -> anyhow::Result<String> {
    match body {
        Some(body) => Ok(body),
        None => {
            let mut input = String::new();
            tokio::io::stdin()
                .read_to_string(&mut input)
                .await
                .context("failed to read request body from stdin")?;
            Ok(input)
        }
    }
}

async fn serve(gateway: Gateway, debug: Arc<DebugLogger>) -> anyhow::Result<()> {
    let server = AnalyticsReportsServer::new(gateway);

    debug.log("Starting MCP server on stdio transport...");
    let service = server.serve(stdio()).await?;
    tracing::info!("MCP server started");

    service.waiting().await?;
    debug.log("MCP server shutting down");
    Ok(())
}

async fn call(
    gateway: Gateway,
    gate: AccessGate,
    token: Option<String>,
    body: Option<String>,
) -> anyhow::Result<()> {
    let proof: Authorized = gate.authorize(token.as_deref())?;
    let raw = read_body(body).await?;

    let response = match serde_json::from_str::<Value>(&raw) {
        Ok(body) => gateway.handle(body, proof).await,
        Err(e) => failure_envelope(
            CallShape::Flat,
            &Value::Null,
            &ToolError::Validation(format!("request body is not valid JSON: {}", e)),
        ),
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config))?
        .with_property(args.property.clone())?;
    let debug_enabled = args.debug || config.debug;
    init_logging(debug_enabled);

    let debug = Arc::new(DebugLogger::new(debug_enabled));
    if let Some(path) = debug.trace_path() {
        tracing::info!(path = %path.display(), "Writing debug trace");
    }
    debug.log(&format!("Config file: {}", args.config));
    debug.log(&format!(
        "Property: {}",
        config.property_resource().as_deref().unwrap_or("not configured")
    ));
    debug.log(if config.uses_static_token() {
        "Auth: static access token"
    } else {
        "Auth: OAuth2 refresh token"
    });

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let gateway = build_gateway(&config, debug.clone())?;
            serve(gateway, debug).await
        }
        Command::Tools => {
            let registry = ToolRegistry::standard(Limits {
                max_rows: config.max_rows,
            });
            println!("{}", serde_json::to_string_pretty(&registry.catalog())?);
            Ok(())
        }
        Command::Call { token, body } => {
            let gateway = build_gateway(&config, debug)?;
            call(gateway, AccessGate::from_config(&config), token, body).await
        }
    }
}
