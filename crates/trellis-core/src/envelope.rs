//! The result envelope returned by resolvers, stages, and procedures.

use crate::error::{ErrorCode, ErrorData};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// A success-or-failure value.
///
/// Exactly one variant is populated. Construction never fails, and callers
/// branch on the variant instead of catching errors.
///
/// # Serialization
///
/// ```
/// use trellis_core::{Envelope, ErrorCode};
///
/// let ok = Envelope::success("hi");
/// assert_eq!(serde_json::to_string(&ok).unwrap(), r#"{"data":"hi"}"#);
///
/// let failed: Envelope<&str> = Envelope::failure(ErrorCode::NotFound);
/// let json = serde_json::to_value(&failed).unwrap();
/// assert_eq!(json["error"]["code"], -32004);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope<T> {
    /// The procedure produced data.
    Success(T),
    /// The procedure failed.
    Failure(ErrorData),
}

impl<T> Envelope<T> {
    /// Creates a success envelope.
    pub const fn success(data: T) -> Self {
        Self::Success(data)
    }

    /// Creates a failure envelope without a cause.
    pub const fn failure(code: ErrorCode) -> Self {
        Self::Failure(ErrorData::new(code))
    }

    /// Creates a failure envelope caused by `error`.
    pub fn failure_with_cause<E>(code: ErrorCode, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failure(ErrorData::new(code).caused_by(error))
    }

    /// Returns true for the success variant.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true for the failure variant.
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Returns the data of a success.
    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Success(data) => Some(data),
            Self::Failure(_) => None,
        }
    }

    /// Returns the error of a failure.
    pub const fn error(&self) -> Option<&ErrorData> {
        match self {
            Self::Success(_) => None,
            Self::Failure(error) => Some(error),
        }
    }

    /// Returns the error code of a failure.
    pub fn code(&self) -> Option<ErrorCode> {
        self.error().map(ErrorData::code)
    }

    /// Converts into a standard `Result`.
    pub fn into_result(self) -> Result<T, ErrorData> {
        match self {
            Self::Success(data) => Ok(data),
            Self::Failure(error) => Err(error),
        }
    }

    /// Maps the data of a success, leaving failures untouched.
    pub fn map<U, F>(self, f: F) -> Envelope<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Success(data) => Envelope::Success(f(data)),
            Self::Failure(error) => Envelope::Failure(error),
        }
    }
}

impl<T> From<Result<T, ErrorData>> for Envelope<T> {
    fn from(result: Result<T, ErrorData>) -> Self {
        match result {
            Ok(data) => Self::Success(data),
            Err(error) => Self::Failure(error),
        }
    }
}

impl<T> From<ErrorData> for Envelope<T> {
    fn from(error: ErrorData) -> Self {
        Self::Failure(error)
    }
}

impl<T: Serialize> Serialize for Envelope<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Success(data) => map.serialize_entry("data", data)?,
            Self::Failure(error) => map.serialize_entry("error", error)?,
        }
        map.end()
    }
}
