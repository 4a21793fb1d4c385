//! JSON-RPC 2.0 message types and the mapping between [`CoreError`] and
//! JSON-RPC error objects.

use bastion_core::{CoreError, ErrorKind, Variant};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

/// Protocol version carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// The JSON sent is not a valid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal error while executing the method.
pub const INTERNAL_ERROR: i64 = -32603;

const EXCEPTION_KEY: &str = "exception";

/// A call or notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: String,
    /// Command name.
    pub method: String,
    /// Structured parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Correlation id; absent for notifications. An explicit `null` id is
    /// `Some(Value::Null)` and still gets a response.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,
}

fn present_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl Request {
    /// Builds a call expecting a response.
    #[must_use]
    pub fn call(method: impl Into<String>, params: Value, id: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.into(),
            params: Some(params),
            id: Some(Value::from(id)),
        }
    }

    /// Whether the sender expects no response.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Error member of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// JSON-RPC error code.
    pub code: i64,
    /// Short description.
    pub message: String,
    /// Structured details; carries the serialized error under `exception`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Protocol-level error without details.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Encodes `error` with its code and serialized form.
    #[must_use]
    pub fn from_core(error: &CoreError) -> Self {
        let code = match error.kind() {
            ErrorKind::OperationNotSupported => METHOD_NOT_FOUND,
            ErrorKind::TypeError => INVALID_PARAMS,
            _ => INTERNAL_ERROR,
        };
        Self {
            code,
            message: error.to_string(),
            data: Some(json!({ EXCEPTION_KEY: error.to_variant().to_json() })),
        }
    }

    /// Rebuilds the error raised on the remote side.
    ///
    /// Errors without a usable `exception` member are mapped by code.
    #[must_use]
    pub fn into_core(self) -> CoreError {
        let rebuilt = self
            .data
            .as_ref()
            .and_then(|data| data.get(EXCEPTION_KEY))
            .and_then(|exception| Variant::from_json(exception.clone()).ok())
            .and_then(|exception| CoreError::from_variant(&exception));
        if let Some(error) = rebuilt {
            return error;
        }
        let kind = match self.code {
            METHOD_NOT_FOUND => ErrorKind::OperationNotSupported,
            INVALID_PARAMS => ErrorKind::TypeError,
            PARSE_ERROR | INVALID_REQUEST => ErrorKind::InvalidFormat,
            _ => ErrorKind::RuntimeError,
        };
        CoreError::new(
            kind,
            format!("remote error {}: {}", self.code, self.message),
        )
    }
}

/// Reply to a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: String,
    /// Result of a successful call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error of a failed call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    /// Id of the call being answered; `null` when it could not be read.
    #[serde(default)]
    pub id: Value,
}

impl Response {
    /// Successful reply.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Failed reply.
    #[must_use]
    pub fn failure(id: Value, error: ErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            result: None,
            error: Some(error),
            id,
        }
    }

    /// Converts the reply into the call outcome.
    ///
    /// # Errors
    ///
    /// Returns the rebuilt remote error for failed replies.
    pub fn into_result(self) -> Result<Value, CoreError> {
        match self.error {
            Some(error) => Err(error.into_core()),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Parses one request line.
///
/// # Errors
///
/// Returns the error response to send back when the line is not valid JSON
/// or not a valid request object.
pub fn parse_request(line: &[u8]) -> Result<Request, Box<Response>> {
    let value: Value = serde_json::from_slice(line).map_err(|error| {
        Box::new(Response::failure(
            Value::Null,
            ErrorObject::new(PARSE_ERROR, format!("parse error: {error}")),
        ))
    })?;
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let request: Request = serde_json::from_value(value).map_err(|error| {
        Box::new(Response::failure(
            id.clone(),
            ErrorObject::new(INVALID_REQUEST, format!("invalid request: {error}")),
        ))
    })?;
    if request.jsonrpc != JSONRPC_VERSION {
        return Err(Box::new(Response::failure(
            id,
            ErrorObject::new(
                INVALID_REQUEST,
                format!("unsupported jsonrpc version '{}'", request.jsonrpc),
            ),
        )));
    }
    if let Some(params) = &request.params
        && !matches!(params, Value::Object(_) | Value::Array(_) | Value::Null)
    {
        return Err(Box::new(Response::failure(
            id,
            ErrorObject::new(INVALID_REQUEST, "params must be an object or an array"),
        )));
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(CoreError::operation_not_supported("nope"), METHOD_NOT_FOUND)]
    #[case(CoreError::type_error("bad"), INVALID_PARAMS)]
    #[case(CoreError::invalid_argument("bad"), INTERNAL_ERROR)]
    #[case(CoreError::no_data("empty"), INTERNAL_ERROR)]
    fn core_errors_map_to_codes(#[case] error: CoreError, #[case] code: i64) {
        let object = ErrorObject::from_core(&error);
        assert_eq!(object.code, code);
        let rebuilt = object.into_core();
        assert_eq!(rebuilt.kind(), error.kind());
        assert_eq!(rebuilt.message(), error.message());
    }

    #[rstest]
    #[case(METHOD_NOT_FOUND, ErrorKind::OperationNotSupported)]
    #[case(PARSE_ERROR, ErrorKind::InvalidFormat)]
    #[case(-32000, ErrorKind::RuntimeError)]
    fn foreign_errors_map_by_code(#[case] code: i64, #[case] kind: ErrorKind) {
        assert_eq!(ErrorObject::new(code, "remote").into_core().kind(), kind);
    }

    #[test]
    fn calls_serialise_with_version_and_id() {
        let request = Request::call("echo", json!({"a": 1}), 7);
        assert_eq!(
            serde_json::to_value(&request).expect("request serialises"),
            json!({"jsonrpc": "2.0", "method": "echo", "params": {"a": 1}, "id": 7})
        );
    }

    #[test]
    fn null_results_survive_the_round_trip() {
        let text = serde_json::to_string(&Response::success(json!(1), Value::Null))
            .expect("response serialises");
        let response: Response = serde_json::from_str(&text).expect("response parses");
        assert_eq!(response.into_result().expect("success"), Value::Null);
    }

    #[rstest]
    #[case(b"{".as_slice(), PARSE_ERROR)]
    #[case(br#"{"jsonrpc":"2.0","id":1}"#.as_slice(), INVALID_REQUEST)]
    #[case(br#"{"jsonrpc":"1.0","method":"x","id":1}"#.as_slice(), INVALID_REQUEST)]
    #[case(br#"{"jsonrpc":"2.0","method":"x","params":3,"id":1}"#.as_slice(), INVALID_REQUEST)]
    fn malformed_requests_produce_error_responses(#[case] line: &[u8], #[case] code: i64) {
        let response = parse_request(line).expect_err("request rejected");
        assert_eq!(response.error.map(|error| error.code), Some(code));
    }

    #[test]
    fn notifications_have_no_id() {
        let request = parse_request(br#"{"jsonrpc":"2.0","method":"ping"}"#).expect("valid");
        assert!(request.is_notification());
    }

    #[test]
    fn null_ids_are_calls() {
        let request =
            parse_request(br#"{"jsonrpc":"2.0","method":"ping","id":null}"#).expect("valid");
        assert!(!request.is_notification());
        assert_eq!(request.id, Some(Value::Null));
    }
}
