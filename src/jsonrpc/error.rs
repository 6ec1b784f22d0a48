//! JSON-RPC error codes and the mapping from dispatch failures to error objects

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::jsonrpc::codec::DecodeError;
use crate::jsonrpc::registry::ProcedureError;

/// Reserved JSON-RPC 2.0 error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ServerError,
}

impl ErrorCode {
    pub fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ServerError => -32000,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ServerError => "Server error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl ErrorObject {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }
}

/// Every way a single call (or the whole body) can fail before a result exists.
#[derive(Debug)]
pub enum Failure {
    Unreadable(String),
    Decode(DecodeError),
    InvalidRequest(String),
    MethodNotFound(String),
    Procedure(ProcedureError),
    Internal(String),
}

impl Failure {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unreadable(_) | Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::Decode(_) => ErrorCode::ParseError,
            Self::MethodNotFound(_) => ErrorCode::MethodNotFound,
            Self::Procedure(_) => ErrorCode::ServerError,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }
}

impl From<Failure> for ErrorObject {
    fn from(failure: Failure) -> Self {
        let code = failure.code();
        match failure {
            Failure::Unreadable(reason) => {
                ErrorObject::new(code, format!("Unable to read request body: {reason}"))
            }
            Failure::Decode(err) => ErrorObject::new(code, err.to_string()),
            Failure::InvalidRequest(reason) => {
                let mut data = Map::new();
                data.insert("reason".to_string(), Value::String(reason));
                ErrorObject::new(code, code.message()).with_data(data)
            }
            Failure::MethodNotFound(method) => {
                ErrorObject::new(code, format!("Method {method} is not supported"))
            }
            Failure::Procedure(err) => {
                let (message, data) = err.into_parts();
                ErrorObject {
                    code: code.code(),
                    message,
                    data,
                }
            }
            Failure::Internal(reason) => ErrorObject::new(code, reason),
        }
    }
}
