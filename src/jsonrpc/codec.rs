//! Envelope codec
//!
//! Turns a raw request body into a single call or a batch of calls, and turns
//! responses back into bytes. Call objects are validated here so that the
//! dispatcher only ever sees well-formed calls or an explicit rejection.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::jsonrpc::error::ErrorObject;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(Number),
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(value) => f.write_str(value),
            Self::Number(value) => write!(f, "{value}"),
        }
    }
}

/// Call parameters, passed through untouched. Each procedure decodes its own shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Option<Value>);

impl Params {
    pub fn new(value: Option<Value>) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> Option<&Value> {
        self.0.as_ref()
    }

    /// Absent params decode as JSON `null`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.0 {
            Some(value) => T::deserialize(value),
            None => T::deserialize(&Value::Null),
        }
    }
}

impl From<Value> for Params {
    fn from(value: Value) -> Self {
        Self(Some(value))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: String,
    pub params: Params,
    pub id: Option<RequestId>,
}

impl Call {
    pub fn new(method: impl Into<String>, params: Params, id: Option<RequestId>) -> Self {
        Self {
            method: method.into(),
            params,
            id,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A call object that was valid JSON but not a valid request.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidCall {
    pub id: Option<RequestId>,
    pub reason: String,
}

pub type Entry = Result<Call, InvalidCall>;

#[derive(Debug)]
pub enum Envelope {
    Single(Entry),
    Batch(Vec<Entry>),
}

#[derive(Debug, Deserialize)]
struct RawCall {
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    id: Option<RequestId>,
}

#[derive(Debug, Error)]
#[error("unable to parse request body: as object: {object}; as batch: {batch}")]
pub struct DecodeError {
    object: serde_json::Error,
    batch: serde_json::Error,
}

#[derive(Debug, Error)]
#[error("unable to serialize response: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// Exactly one of `result` and `error` is set; the constructors enforce it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorObject>,
    id: Option<RequestId>,
}

impl Response {
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Option<RequestId>, error: impl Into<ErrorObject>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            result: None,
            error: Some(error.into()),
            id,
        }
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&ErrorObject> {
        self.error.as_ref()
    }

    pub fn id(&self) -> Option<&RequestId> {
        self.id.as_ref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// What goes back to the client. `Empty` means there is no body to send.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Single(Response),
    Batch(Vec<Response>),
    Empty,
}

pub fn decode(body: &[u8]) -> Result<Envelope, DecodeError> {
    let object = match serde_json::from_slice::<Map<String, Value>>(body) {
        Ok(object) => return Ok(Envelope::Single(call_from_object(object))),
        Err(err) => err,
    };

    match serde_json::from_slice::<Vec<Value>>(body) {
        Ok(items) => Ok(Envelope::Batch(
            items.into_iter().map(call_from_value).collect(),
        )),
        Err(batch) => Err(DecodeError { object, batch }),
    }
}

pub fn encode(reply: &Reply) -> Result<Option<Vec<u8>>, EncodeError> {
    let bytes = match reply {
        Reply::Single(response) => serde_json::to_vec(response)?,
        Reply::Batch(responses) => serde_json::to_vec(responses)?,
        Reply::Empty => return Ok(None),
    };
    Ok(Some(bytes))
}

fn call_from_value(value: Value) -> Entry {
    match value {
        Value::Object(object) => call_from_object(object),
        _ => Err(InvalidCall {
            id: None,
            reason: "call must be a JSON object".to_string(),
        }),
    }
}

fn call_from_object(object: Map<String, Value>) -> Entry {
    let id = object
        .get("id")
        .and_then(|value| RequestId::deserialize(value).ok());

    let raw = RawCall::deserialize(Value::Object(object)).map_err(|err| InvalidCall {
        id: id.clone(),
        reason: err.to_string(),
    })?;

    if raw.jsonrpc != JSONRPC_VERSION {
        return Err(InvalidCall {
            id,
            reason: format!("jsonrpc must be \"{JSONRPC_VERSION}\""),
        });
    }

    if raw.method.trim().is_empty() {
        return Err(InvalidCall {
            id,
            reason: "method must not be empty".to_string(),
        });
    }

    Ok(Call::new(raw.method, Params::new(raw.params), raw.id))
}
