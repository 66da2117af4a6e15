//! MCP server exposing the analytics tool registry.

use std::borrow::Cow;

use rmcp::{
    model::{
        CallToolRequestParam, CallToolResult, Content, ErrorCode, ErrorData as McpError,
        Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo, Tool,
    },
    service::RequestContext,
    RoleServer, ServerHandler,
};
use serde_json::{json, Value};

use crate::access::Authorized;
use crate::error::ToolError;
use crate::gateway::Gateway;

/// GA4 reports MCP server.
#[derive(Clone)]
pub struct AnalyticsReportsServer {
    gateway: Gateway,
}

impl AnalyticsReportsServer {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    fn tools(&self) -> Vec<Tool> {
        self.gateway
            .registry()
            .definitions()
            .iter()
            .map(|definition| {
                Tool::new(
                    definition.name,
                    definition.description.clone(),
                    definition.input_schema.clone(),
                )
            })
            .collect()
    }
}

fn to_mcp_error(error: &ToolError) -> McpError {
    McpError {
        code: ErrorCode(error.code()),
        message: Cow::from(error.envelope_message()),
        data: Some(json!({ "kind": error.kind() })),
    }
}

impl ServerHandler for AnalyticsReportsServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Google Analytics 4 reports - traffic sources, channels, pages, devices, geography, \
                key events and daily trends, with period-over-period comparison, anomaly detection, \
                funnels and field search."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let arguments = request.arguments.map(Value::Object).unwrap_or(Value::Null);
        // The stdio peer is the process that spawned us.
        let outcome = self
            .gateway
            .invoke(&request.name, arguments, Authorized::local_transport())
            .await;

        match outcome.result {
            Ok(value) => {
                let text =
                    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(error) => Err(to_mcp_error(&error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::debug::DebugLogger;
    use crate::tools::executor::tests::FakeBackend;
    use crate::tools::{Limits, ToolRegistry};

    fn server() -> AnalyticsReportsServer {
        AnalyticsReportsServer::new(Gateway::new(
            Arc::new(ToolRegistry::standard(Limits { max_rows: 100 })),
            Arc::new(FakeBackend::default()),
            Arc::new(DebugLogger::disabled()),
        ))
    }

    #[test]
    fn test_tools_mirror_registry() {
        let server = server();
        let tools = server.tools();
        assert_eq!(tools.len(), server.gateway.registry().definitions().len());
        assert!(tools.iter().any(|t| t.name == "compare_periods"));
    }

    #[test]
    fn test_error_mapping_keeps_code_and_kind() {
        let error = to_mcp_error(&ToolError::NotResolvable("use NdaysAgo".to_string()));
        assert_eq!(error.code, ErrorCode(-32602));
        assert_eq!(error.data, Some(json!({"kind": "not_resolvable"})));
        assert!(error.message.contains("NdaysAgo"));
    }

    #[test]
    fn test_server_info_enables_tools() {
        let info = server().get_info();
        assert!(info.capabilities.tools.is_some());
    }
}
