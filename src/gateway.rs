//! Invocation gateway.
//!
//! Request bodies arrive in one of two shapes:
//!
//! - flat: `{"name": "...", "arguments": {...}}`
//! - correlated: `{"jsonrpc": "2.0", "id": ..., "method": "tools/call",
//!   "params": {"name": "...", "arguments": {...}}}`, or `"tools/list"`
//!
//! Both decode into one [`Invocation`] and run through the same
//! `Received → Authorized → Validated → Executing → Completed | Failed`
//! path. Every outcome, including decode failures, becomes a response
//! envelope; nothing is raised to the transport.

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::access::Authorized;
use crate::backend::AnalyticsBackend;
use crate::debug::DebugLogger;
use crate::error::ToolError;
use crate::tools::{self, ToolRegistry};

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    Flat,
    Correlated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    CallTool { name: String, arguments: Value },
    ListTools,
}

/// A decoded request, independent of its wire shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub shape: CallShape,
    /// Request identifier to echo; `Null` for the flat shape.
    pub id: Value,
    pub method: Method,
}

/// A body that could not be decoded, with whatever id it carried.
#[derive(Debug)]
pub struct DecodeFailure {
    pub shape: CallShape,
    pub id: Value,
    pub error: ToolError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Received,
    Authorized,
    Validated,
    Executing,
    Completed,
    Failed,
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InvocationState::Received => "received",
            InvocationState::Authorized => "authorized",
            InvocationState::Validated => "validated",
            InvocationState::Executing => "executing",
            InvocationState::Completed => "completed",
            InvocationState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of one tool invocation plus the states it passed through.
#[derive(Debug)]
pub struct Outcome {
    pub result: Result<Value, ToolError>,
    pub states: Vec<InvocationState>,
}

/// Decode either call shape. Bodies with `method` or `jsonrpc` are correlated.
pub fn decode(body: Value) -> Result<Invocation, DecodeFailure> {
    let Value::Object(object) = body else {
        return Err(DecodeFailure {
            shape: CallShape::Flat,
            id: Value::Null,
            error: ToolError::Validation("request body must be a JSON object".to_string()),
        });
    };

    if object.contains_key("method") || object.contains_key("jsonrpc") {
        decode_correlated(object)
    } else {
        decode_flat(object)
    }
}

fn decode_flat(mut object: Map<String, Value>) -> Result<Invocation, DecodeFailure> {
    let fail = |message: &str| DecodeFailure {
        shape: CallShape::Flat,
        id: Value::Null,
        error: ToolError::Validation(message.to_string()),
    };

    let name = match object.remove("name") {
        Some(Value::String(name)) => name,
        _ => return Err(fail("'name' must be a string")),
    };
    let arguments = object.remove("arguments").unwrap_or(Value::Null);

    Ok(Invocation {
        shape: CallShape::Flat,
        id: Value::Null,
        method: Method::CallTool { name, arguments },
    })
}

fn decode_correlated(mut object: Map<String, Value>) -> Result<Invocation, DecodeFailure> {
    let id = object.remove("id").unwrap_or(Value::Null);
    let fail = |id: Value, error: ToolError| DecodeFailure {
        shape: CallShape::Correlated,
        id,
        error,
    };

    if !matches!(id, Value::Null | Value::String(_) | Value::Number(_)) {
        return Err(fail(
            Value::Null,
            ToolError::Validation("'id' must be a string or a number".to_string()),
        ));
    }
    match object.get("jsonrpc") {
        None => {}
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        Some(_) => {
            return Err(fail(
                id,
                ToolError::Validation("'jsonrpc' must be \"2.0\"".to_string()),
            ))
        }
    }

    let method = match object.remove("method") {
        Some(Value::String(method)) => method,
        _ => {
            return Err(fail(
                id,
                ToolError::Validation("'method' must be a string".to_string()),
            ))
        }
    };

    let method = match method.as_str() {
        "tools/list" => Method::ListTools,
        "tools/call" => {
            let mut params = match object.remove("params") {
                Some(Value::Object(params)) => params,
                _ => {
                    return Err(fail(
                        id,
                        ToolError::Validation("'params' must be an object".to_string()),
                    ))
                }
            };
            let name = match params.remove("name") {
                Some(Value::String(name)) => name,
                _ => {
                    return Err(fail(
                        id,
                        ToolError::Validation("'params.name' must be a string".to_string()),
                    ))
                }
            };
            Method::CallTool {
                name,
                arguments: params.remove("arguments").unwrap_or(Value::Null),
            }
        }
        _ => return Err(fail(id, ToolError::UnknownMethod(method))),
    };

    Ok(Invocation {
        shape: CallShape::Correlated,
        id,
        method,
    })
}

/// Tool result as a single text content element.
pub fn content(value: &Value) -> Value {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    json!({"content": [{"type": "text", "text": text}]})
}

pub fn success_envelope(shape: CallShape, id: &Value, result: Value) -> Value {
    match shape {
        CallShape::Flat => result,
        CallShape::Correlated => json!({"jsonrpc": JSONRPC_VERSION, "id": id, "result": result}),
    }
}

pub fn failure_envelope(shape: CallShape, id: &Value, error: &ToolError) -> Value {
    let error = json!({"code": error.code(), "message": error.envelope_message()});
    match shape {
        CallShape::Flat => json!({"error": error}),
        CallShape::Correlated => json!({"jsonrpc": JSONRPC_VERSION, "id": id, "error": error}),
    }
}

struct Transitions<'a> {
    tool: &'a str,
    states: Vec<InvocationState>,
}

impl<'a> Transitions<'a> {
    fn start(tool: &'a str) -> Self {
        debug!(tool, state = %InvocationState::Received, "Invocation received");
        Self {
            tool,
            states: vec![InvocationState::Received],
        }
    }

    fn advance(&mut self, next: InvocationState) {
        let from = self
            .states
            .last()
            .copied()
            .unwrap_or(InvocationState::Received);
        debug!(tool = self.tool, %from, to = %next, "Invocation state");
        self.states.push(next);
    }

    fn finish(mut self, result: Result<Value, ToolError>) -> Outcome {
        match &result {
            Ok(_) => {
                self.advance(InvocationState::Completed);
                info!(tool = self.tool, "Tool call completed");
            }
            Err(e) => {
                self.advance(InvocationState::Failed);
                warn!(tool = self.tool, kind = e.kind(), error = %e, "Tool call failed");
            }
        }
        Outcome {
            result,
            states: self.states,
        }
    }
}

/// Dispatches authorized invocations to the tool registry.
#[derive(Clone)]
pub struct Gateway {
    registry: Arc<ToolRegistry>,
    backend: Arc<dyn AnalyticsBackend>,
    debug: Arc<DebugLogger>,
}

impl Gateway {
    pub fn new(
        registry: Arc<ToolRegistry>,
        backend: Arc<dyn AnalyticsBackend>,
        debug: Arc<DebugLogger>,
    ) -> Self {
        Self {
            registry,
            backend,
            debug,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> Value {
        self.registry.catalog()
    }

    /// Decode a raw body, run it and wrap the outcome in its envelope.
    pub async fn handle(&self, body: Value, proof: Authorized) -> Value {
        let invocation = match decode(body) {
            Ok(invocation) => invocation,
            Err(failure) => {
                warn!(error = %failure.error, "Rejected undecodable request");
                self.debug.log_error("decode", &failure.error.to_string());
                return failure_envelope(failure.shape, &failure.id, &failure.error);
            }
        };

        match invocation.method {
            Method::ListTools => {
                success_envelope(invocation.shape, &invocation.id, self.catalog())
            }
            Method::CallTool { name, arguments } => {
                let outcome = self.invoke(&name, arguments, proof).await;
                match outcome.result {
                    Ok(value) => success_envelope(invocation.shape, &invocation.id, content(&value)),
                    Err(error) => failure_envelope(invocation.shape, &invocation.id, &error),
                }
            }
        }
    }

    /// Validate and run one tool call.
    pub async fn invoke(&self, name: &str, arguments: Value, _proof: Authorized) -> Outcome {
        let mut transitions = Transitions::start(name);
        transitions.advance(InvocationState::Authorized);
        self.debug.log_tool_call(name, &arguments);

        let call = match self.registry.validate(name, arguments) {
            Ok(call) => call,
            Err(error) => {
                self.debug.log_error(name, &error.to_string());
                return transitions.finish(Err(error));
            }
        };
        transitions.advance(InvocationState::Validated);

        transitions.advance(InvocationState::Executing);
        let result = tools::execute(self.backend.as_ref(), call, self.registry.limits()).await;
        match &result {
            Ok(value) => self.debug.log_tool_result(name, value),
            Err(error) => self.debug.log_error(name, &error.to_string()),
        }
        transitions.finish(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::executor::tests::{channel_table, FakeBackend};
    use crate::tools::Limits;

    fn gateway(backend: FakeBackend) -> (Gateway, Arc<FakeBackend>) {
        let backend = Arc::new(backend);
        let gateway = Gateway::new(
            Arc::new(ToolRegistry::standard(Limits { max_rows: 500 })),
            backend.clone(),
            Arc::new(DebugLogger::disabled()),
        );
        (gateway, backend)
    }

    fn proof() -> Authorized {
        Authorized::local_transport()
    }

    #[test]
    fn test_decode_both_shapes_converge() {
        let flat = decode(json!({"name": "top_pages", "arguments": {"limit": 5}})).unwrap();
        let rpc = decode(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": {"name": "top_pages", "arguments": {"limit": 5}}
        }))
        .unwrap();

        assert_eq!(flat.method, rpc.method);
        assert_eq!(flat.shape, CallShape::Flat);
        assert_eq!(rpc.shape, CallShape::Correlated);
        assert_eq!(rpc.id, json!(7));
    }

    #[test]
    fn test_decode_failures() {
        let failure = decode(json!("tools/call")).unwrap_err();
        assert!(matches!(failure.error, ToolError::Validation(_)));

        let failure = decode(json!({"arguments": {}})).unwrap_err();
        assert_eq!(failure.shape, CallShape::Flat);

        let failure = decode(json!({"jsonrpc": "2.0", "id": "a1", "method": "resources/list"}))
            .unwrap_err();
        assert_eq!(failure.id, json!("a1"));
        assert_eq!(failure.error.code(), ToolError::CODE_NOT_FOUND);

        let failure = decode(json!({"jsonrpc": "1.0", "id": 1, "method": "tools/list"})).unwrap_err();
        assert!(matches!(failure.error, ToolError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_tool_not_found_in_both_shapes() {
        let (gateway, backend) = gateway(FakeBackend::default());

        let flat = gateway
            .handle(json!({"name": "predict_revenue", "arguments": {}}), proof())
            .await;
        assert_eq!(flat["error"]["code"], -32601);

        let rpc = gateway
            .handle(
                json!({
                    "jsonrpc": "2.0",
                    "id": "req-9",
                    "method": "tools/call",
                    "params": {"name": "predict_revenue"}
                }),
                proof(),
            )
            .await;
        assert_eq!(rpc["id"], "req-9");
        assert_eq!(rpc["error"]["code"], -32601);
        assert_eq!(backend.report_calls(), 0);
    }

    #[tokio::test]
    async fn test_validation_failure_never_executes() {
        let (gateway, backend) = gateway(FakeBackend::default());
        let outcome = gateway
            .invoke("top_pages", json!({"limit": 0}), proof())
            .await;

        assert!(matches!(outcome.result, Err(ToolError::Validation(_))));
        assert_eq!(
            outcome.states,
            vec![
                InvocationState::Received,
                InvocationState::Authorized,
                InvocationState::Failed
            ]
        );
        assert_eq!(backend.report_calls(), 0);
    }

    #[tokio::test]
    async fn test_completed_invocation_passes_every_state() {
        let (gateway, _) = gateway(FakeBackend::default().with_report(
            "28daysAgo",
            "yesterday",
            channel_table(&[("Direct", "12")]),
        ));
        let outcome = gateway.invoke("channel_performance", Value::Null, proof()).await;

        assert!(outcome.result.is_ok());
        assert_eq!(
            outcome.states,
            vec![
                InvocationState::Received,
                InvocationState::Authorized,
                InvocationState::Validated,
                InvocationState::Executing,
                InvocationState::Completed
            ]
        );
    }

    #[tokio::test]
    async fn test_success_envelopes_wrap_text_content() {
        let (gateway, _) = gateway(FakeBackend::default().with_report(
            "28daysAgo",
            "yesterday",
            channel_table(&[("Direct", "12")]),
        ));

        let flat = gateway
            .handle(json!({"name": "channel_performance"}), proof())
            .await;
        assert_eq!(flat["content"][0]["type"], "text");
        let payload: Value =
            serde_json::from_str(flat["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(payload["rows"][0]["sessionDefaultChannelGroup"], "Direct");

        let rpc = gateway
            .handle(
                json!({
                    "jsonrpc": "2.0",
                    "id": 42,
                    "method": "tools/call",
                    "params": {"name": "channel_performance", "arguments": {}}
                }),
                proof(),
            )
            .await;
        assert_eq!(rpc["jsonrpc"], "2.0");
        assert_eq!(rpc["id"], 42);
        assert_eq!(rpc["result"]["content"][0]["type"], "text");
    }

    #[tokio::test]
    async fn test_backend_error_is_truncated_internal_failure() {
        let (gateway, _) = gateway(FakeBackend {
            fail_with: Some("e".repeat(3000)),
            ..FakeBackend::default()
        });

        let response = gateway
            .handle(
                json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call",
                       "params": {"name": "geo_breakdown"}}),
                proof(),
            )
            .await;
        assert_eq!(response["error"]["code"], -32603);
        let message = response["error"]["message"].as_str().unwrap();
        assert!(message.ends_with("…(truncated)"));
        assert_eq!(message.chars().count(), 800);
    }

    #[tokio::test]
    async fn test_list_tools_correlated() {
        let (gateway, _) = gateway(FakeBackend::default());
        let response = gateway
            .handle(json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list"}), proof())
            .await;
        let tools = response["result"]["tools"].as_array().unwrap();
        assert!(tools.iter().any(|t| t["name"] == "detect_anomalies"));
        assert_eq!(tools[0]["inputSchema"]["type"], "object");
    }
}
