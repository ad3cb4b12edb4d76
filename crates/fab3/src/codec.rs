//! JSON-RPC envelope shapes and method name mapping.

use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;

use crate::error::{
    Fab3Error,
    JsonRpcErrorCode,
};

/// Rewrites `service_method` into the dispatch name `service.Method`.
///
/// Returns `None` unless the name holds exactly one underscore.
pub fn dispatch_name(method: &str) -> Option<String> {
    let (service, name) = method.split_once('_')?;
    if name.contains('_') {
        return None;
    }
    let mut chars = name.chars();
    let first = chars.next()?;
    Some(format!("{service}.{}{}", first.to_uppercase(), chars.as_str()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

impl JsonRpcRequest {
    /// Positional parameters. A missing or null `params` is empty.
    pub fn params(&self) -> &[Value] {
        match &self.params {
            Value::Array(params) => params,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcError {
    pub fn new(code: JsonRpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code as i32,
            message: message.into(),
        }
    }
}

impl From<Fab3Error> for JsonRpcError {
    fn from(e: Fab3Error) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(error),
            id,
        }
    }
}
