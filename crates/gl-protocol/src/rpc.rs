//! Request/response messages
//!
//! Requests carry a numeric `id` chosen by the client; the guider echoes
//! it in the matching response. A response carries either `result` or
//! `error`, never both.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RpcError;

/// Version string the guider puts in every response
pub const JSONRPC_VERSION: &str = "2.0";

fn jsonrpc_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// A method call sent to the guider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Method name, e.g. `get_app_state`
    pub method: String,
    /// Positional or named parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Correlation id
    pub id: u64,
}

impl RpcRequest {
    /// Create a new request
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
            id,
        }
    }
}

/// Error object inside a failed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// A response to an [`RpcRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Result value (absent or `null` on failure and for void methods)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error object on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
    /// Correlation id of the request
    pub id: u64,
}

impl RpcResponse {
    /// Successful response
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Failed response
    pub fn failure(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            result: None,
            error: Some(RpcErrorObject {
                code,
                message: message.into(),
            }),
            id,
        }
    }

    /// Convert into the call outcome, classifying any error
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(err) => Err(RpcError::new(err.code, err.message)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcErrorKind;
    use serde_json::json;

    #[test]
    fn test_request_omits_missing_params() {
        let request = RpcRequest::new(7, "get_app_state", None);
        let text = serde_json::to_string(&request).unwrap();
        assert_eq!(text, r#"{"method":"get_app_state","id":7}"#);
    }

    #[test]
    fn test_request_with_params() {
        let request = RpcRequest::new(3, "set_paused", Some(json!([true])));
        let text = serde_json::to_string(&request).unwrap();
        assert_eq!(text, r#"{"method":"set_paused","params":[true],"id":3}"#);
    }

    #[test]
    fn test_null_result_is_ok() {
        let response: RpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","result":null,"id":1}"#).unwrap();
        assert_eq!(response.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_error_response_is_classified() {
        let response: RpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","error":{"code":1,"message":"Invalid axis"},"id":4}"#,
        )
        .unwrap();
        let err = response.into_result().unwrap_err();
        assert_eq!(err.kind, RpcErrorKind::InvalidAxis);
        assert_eq!(err.message, "Invalid axis");
    }
}
