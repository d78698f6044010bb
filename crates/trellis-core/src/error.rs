//! Error codes and failure payloads.
//!
//! Every failure that crosses a stage boundary is an [`ErrorData`] value
//! carrying one [`ErrorCode`] from a fixed, closed table and an optional
//! opaque [`Cause`].
//!
//! # Error Code Table
//!
//! The numeric identifiers are wire-visible and never change:
//!
//! | Name | Code | Category |
//! |---|---|---|
//! | `PARSE_ERROR` | -32700 | server |
//! | `BAD_REQUEST` | -32600 | client |
//! | `INTERNAL_SERVER_ERROR` | -32603 | server |
//! | `UNAUTHORIZED` | -32001 | client |
//! | `FORBIDDEN` | -32003 | client |
//! | `NOT_FOUND` | -32004 | client |
//! | `METHOD_NOT_SUPPORTED` | -32005 | client |
//! | `TIMEOUT` | -32008 | client |
//! | `PRECONDITION_FAILED` | -32012 | client |
//! | `PAYLOAD_TOO_LARGE` | -32013 | client |
//! | `CLIENT_CLOSED_REQUEST` | -32099 | client |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Message used in place of server-side failure details when they are not exposed.
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred";

/// Named error kinds with stable numeric identifiers.
///
/// # Example
///
/// ```
/// use trellis_core::ErrorCode;
///
/// assert_eq!(ErrorCode::Unauthorized.code(), -32001);
/// assert_eq!(ErrorCode::Unauthorized.name(), "UNAUTHORIZED");
/// assert_eq!("UNAUTHORIZED".parse::<ErrorCode>().unwrap(), ErrorCode::Unauthorized);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed request.
    ParseError,
    /// Invalid request shape or content.
    BadRequest,
    /// Unexpected server fault.
    InternalServerError,
    /// Missing or invalid credentials.
    Unauthorized,
    /// Authenticated but disallowed.
    Forbidden,
    /// Target resource absent.
    NotFound,
    /// Unsupported operation.
    MethodNotSupported,
    /// Deadline exceeded.
    Timeout,
    /// Precondition not met.
    PreconditionFailed,
    /// Input exceeds limit.
    PayloadTooLarge,
    /// Caller disconnected.
    ClientClosedRequest,
}

/// Who caused a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The caller sent something the procedure refuses.
    Client,
    /// The procedure itself failed.
    Server,
}

impl ErrorCategory {
    /// Returns true for server-caused failures.
    #[must_use]
    pub const fn is_server(self) -> bool {
        matches!(self, Self::Server)
    }
}

impl ErrorCode {
    /// Every code in the table, in declaration order.
    pub const ALL: [ErrorCode; 11] = [
        Self::ParseError,
        Self::BadRequest,
        Self::InternalServerError,
        Self::Unauthorized,
        Self::Forbidden,
        Self::NotFound,
        Self::MethodNotSupported,
        Self::Timeout,
        Self::PreconditionFailed,
        Self::PayloadTooLarge,
        Self::ClientClosedRequest,
    ];

    /// Returns the stable numeric identifier.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::BadRequest => -32600,
            Self::InternalServerError => -32603,
            Self::Unauthorized => -32001,
            Self::Forbidden => -32003,
            Self::NotFound => -32004,
            Self::MethodNotSupported => -32005,
            Self::Timeout => -32008,
            Self::PreconditionFailed => -32012,
            Self::PayloadTooLarge => -32013,
            Self::ClientClosedRequest => -32099,
        }
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ParseError => "PARSE_ERROR",
            Self::BadRequest => "BAD_REQUEST",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::MethodNotSupported => "METHOD_NOT_SUPPORTED",
            Self::Timeout => "TIMEOUT",
            Self::PreconditionFailed => "PRECONDITION_FAILED",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::ClientClosedRequest => "CLIENT_CLOSED_REQUEST",
        }
    }

    /// Looks up a code by its wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.name() == name)
    }

    /// Looks up a code by its numeric identifier.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// Returns whether the caller or the server caused this failure.
    #[must_use]
    pub const fn category(self) -> ErrorCategory {
        match self {
            Self::ParseError | Self::InternalServerError => ErrorCategory::Server,
            _ => ErrorCategory::Client,
        }
    }

    /// Returns the HTTP status a transport should use for this code.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::ParseError | Self::BadRequest => 400,
            Self::InternalServerError => 500,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::MethodNotSupported => 405,
            Self::Timeout => 408,
            Self::PreconditionFailed => 412,
            Self::PayloadTooLarge => 413,
            Self::ClientClosedRequest => 499,
        }
    }

    /// Returns [`http_status`](Self::http_status) as a [`StatusCode`].
    #[must_use]
    pub fn status_code(self) -> StatusCode {
        StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when parsing a name that is not in the error code table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown error code: {0}")]
pub struct UnknownErrorCode(pub String);

impl FromStr for ErrorCode {
    type Err = UnknownErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| UnknownErrorCode(s.to_string()))
    }
}

/// An opaque error attached to a failure.
///
/// Causes are shared, so cloning a failure never clones the underlying
/// error. Two causes compare equal when they render the same message.
///
/// # Example
///
/// ```
/// use trellis_core::Cause;
///
/// let cause = Cause::new(std::io::Error::other("disk on fire"));
/// assert!(cause.downcast_ref::<std::io::Error>().is_some());
/// assert_eq!(cause.to_string(), "disk on fire");
/// ```
#[derive(Clone)]
pub struct Cause(Arc<dyn StdError + Send + Sync + 'static>);

impl Cause {
    /// Wraps an error.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    /// Creates a cause from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(Arc::new(CauseMessage(message.into())))
    }

    /// Returns the wrapped error as `E`, if that is its concrete type.
    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    /// Returns the wrapped error.
    #[must_use]
    pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.0
    }
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl StdError for Cause {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl PartialEq for Cause {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.to_string() == other.to_string()
    }
}

impl From<anyhow::Error> for Cause {
    fn from(error: anyhow::Error) -> Self {
        let boxed: Box<dyn StdError + Send + Sync + 'static> = error.into();
        Self(Arc::from(boxed))
    }
}

#[derive(Debug)]
struct CauseMessage(String);

impl fmt::Display for CauseMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for CauseMessage {}

/// The payload of a failed [`Envelope`](crate::Envelope).
///
/// # Example
///
/// ```
/// use trellis_core::{ErrorCode, ErrorData};
///
/// let error = ErrorData::new(ErrorCode::NotFound).with_message("no such user");
/// assert_eq!(error.code(), ErrorCode::NotFound);
/// assert_eq!(error.cause().unwrap().to_string(), "no such user");
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{} ({})", .code, .code.code())]
pub struct ErrorData {
    code: ErrorCode,
    #[source]
    cause: Option<Cause>,
}

impl ErrorData {
    /// Creates a failure payload without a cause.
    #[must_use]
    pub const fn new(code: ErrorCode) -> Self {
        Self { code, cause: None }
    }

    /// Creates a failure payload with a cause.
    #[must_use]
    pub fn with_cause(code: ErrorCode, cause: Cause) -> Self {
        Self {
            code,
            cause: Some(cause),
        }
    }

    /// Attaches `error` as the cause.
    #[must_use]
    pub fn caused_by<E>(mut self, error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Cause::new(error));
        self
    }

    /// Attaches a plain message as the cause.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.cause = Some(Cause::msg(message));
        self
    }

    /// Creates an `INTERNAL_SERVER_ERROR` caused by `error`.
    #[must_use]
    pub fn internal(error: anyhow::Error) -> Self {
        Self::with_cause(ErrorCode::InternalServerError, error.into())
    }

    /// Creates a `BAD_REQUEST` failure.
    #[must_use]
    pub const fn bad_request() -> Self {
        Self::new(ErrorCode::BadRequest)
    }

    /// Creates an `UNAUTHORIZED` failure.
    #[must_use]
    pub const fn unauthorized() -> Self {
        Self::new(ErrorCode::Unauthorized)
    }

    /// Creates a `FORBIDDEN` failure.
    #[must_use]
    pub const fn forbidden() -> Self {
        Self::new(ErrorCode::Forbidden)
    }

    /// Creates a `NOT_FOUND` failure.
    #[must_use]
    pub const fn not_found() -> Self {
        Self::new(ErrorCode::NotFound)
    }

    /// Returns the error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Returns the cause, if any.
    #[must_use]
    pub const fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Renders this failure for the wire, exposing the cause message.
    #[must_use]
    pub fn to_wire(&self) -> WireError {
        let message = self
            .cause
            .as_ref()
            .map_or_else(|| self.code.name().to_string(), ToString::to_string);

        WireError {
            code: self.code.code(),
            name: self.code,
            message,
            http_status: self.code.http_status(),
        }
    }

    /// Renders this failure for the wire, replacing the message of
    /// server-category failures with `internal_message`.
    #[must_use]
    pub fn to_wire_redacted(&self, internal_message: &str) -> WireError {
        let mut wire = self.to_wire();
        if self.category().is_server() {
            wire.message = internal_message.to_string();
        }
        wire
    }
}

impl From<ErrorCode> for ErrorData {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

impl Serialize for ErrorData {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

/// Serializable form of an [`ErrorData`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    /// Numeric error code.
    pub code: i32,
    /// Error code name.
    pub name: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// HTTP status for transports that need one.
    pub http_status: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_table() {
        let table = [
            ("PARSE_ERROR", -32700),
            ("BAD_REQUEST", -32600),
            ("INTERNAL_SERVER_ERROR", -32603),
            ("UNAUTHORIZED", -32001),
            ("FORBIDDEN", -32003),
            ("NOT_FOUND", -32004),
            ("METHOD_NOT_SUPPORTED", -32005),
            ("TIMEOUT", -32008),
            ("PRECONDITION_FAILED", -32012),
            ("PAYLOAD_TOO_LARGE", -32013),
            ("CLIENT_CLOSED_REQUEST", -32099),
        ];

        assert_eq!(table.len(), ErrorCode::ALL.len());
        for (name, numeric) in table {
            let code = ErrorCode::from_name(name).expect("name should be in the table");
            assert_eq!(code.code(), numeric, "{name}");
            assert_eq!(ErrorCode::from_code(numeric), Some(code));
        }
    }

    #[test]
    fn test_serde_name_matches_wire_name() {
        for code in ErrorCode::ALL {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.name()));
        }
    }

    #[test]
    fn test_unknown_name() {
        let err = "TEAPOT".parse::<ErrorCode>().unwrap_err();
        assert_eq!(err.to_string(), "unknown error code: TEAPOT");
        assert_eq!(ErrorCode::from_code(-1), None);
    }

    #[test]
    fn test_categories() {
        assert_eq!(ErrorCode::ParseError.category(), ErrorCategory::Server);
        assert_eq!(ErrorCode::InternalServerError.category(), ErrorCategory::Server);
        let client = ErrorCode::ALL
            .into_iter()
            .filter(|c| c.category() == ErrorCategory::Client)
            .count();
        assert_eq!(client, 9);
    }

    #[test]
    fn test_http_status() {
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::PayloadTooLarge.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(ErrorCode::ClientClosedRequest.status_code().as_u16(), 499);
    }

    #[test]
    fn test_error_data_display_and_source() {
        let error = ErrorData::new(ErrorCode::Forbidden).with_message("not yours");
        assert_eq!(error.to_string(), "FORBIDDEN (-32003)");
        assert_eq!(error.source().unwrap().to_string(), "not yours");
    }

    #[test]
    fn test_cause_downcast() {
        let error = ErrorData::bad_request().caused_by(std::io::Error::other("bad bytes"));
        let io = error.cause().and_then(Cause::downcast_ref::<std::io::Error>);
        assert_eq!(io.unwrap().to_string(), "bad bytes");
    }

    #[test]
    fn test_internal_from_anyhow() {
        let error = ErrorData::internal(anyhow::anyhow!("db down"));
        assert_eq!(error.code(), ErrorCode::InternalServerError);
        assert_eq!(error.cause().unwrap().to_string(), "db down");
    }

    #[test]
    fn test_wire_redaction() {
        let internal = ErrorData::internal(anyhow::anyhow!("connection string leaked"));
        assert_eq!(
            internal.to_wire_redacted(INTERNAL_ERROR_MESSAGE).message,
            INTERNAL_ERROR_MESSAGE
        );

        let client = ErrorData::not_found().with_message("user 7");
        assert_eq!(client.to_wire_redacted(INTERNAL_ERROR_MESSAGE).message, "user 7");
    }

    #[test]
    fn test_wire_serialization() {
        let json = serde_json::to_value(ErrorData::unauthorized()).unwrap();
        assert_eq!(json["code"], -32001);
        assert_eq!(json["name"], "UNAUTHORIZED");
        assert_eq!(json["message"], "UNAUTHORIZED");
        assert_eq!(json["http_status"], 401);
    }
}
