//! Input validation stage.
//!
//! The stage hands the raw input to a [`Validator`]. On success it forwards
//! the validated value as the new input; on failure it short-circuits with
//! `BAD_REQUEST`, attaching the validator's error unchanged as the cause.
//!
//! ```text
//! Params<C, RawInput> → [Validation] → Params<C, V::Output>
//!                            ↓
//!                       BAD_REQUEST (cause = validator error)
//! ```
//!
//! Validators that ship with the crate:
//!
//! - [`JsonValidator`] deserializes into any `DeserializeOwned` type
//! - [`SchemaValidator`] checks required fields and field types of an object
//! - [`FnValidator`] and [`AsyncFnValidator`] wrap closures
//!
//! A validator that panics is caught here and reported as
//! `INTERNAL_SERVER_ERROR`; the panic never reaches later stages. The
//! procedure decides whether the panic message is shown to the caller.
//!
//! # Example
//!
//! ```
//! use serde::Deserialize;
//! use serde_json::json;
//! use trellis_core::{Envelope, ErrorCode, Params};
//! use trellis_middleware::{stages::validate_json, Procedure};
//!
//! #[derive(Deserialize)]
//! struct Hello {
//!     hello: String,
//! }
//!
//! # tokio_test::block_on(async {
//! let greet = Procedure::<Params<()>, String>::builder()
//!     .stage(validate_json::<Hello>())
//!     .resolve(|params: Params<(), Hello>| async move { Envelope::success(params.input.hello) });
//!
//! let ok = greet.invoke(Params::with_raw_input((), json!({"hello": "x"}))).await;
//! assert_eq!(ok, Envelope::success("x".to_string()));
//!
//! let bad = greet.invoke(Params::with_raw_input((), json!({}))).await;
//! assert_eq!(bad.code(), Some(ErrorCode::BadRequest));
//! # });
//! ```

use crate::middleware::{panic_failure, panic_message, BoxFuture, Middleware, Next, Settled};
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::future::{ready, Future};
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use trellis_core::{ErrorCode, ErrorData, Params, RawInput};

/// Validates raw input and produces a typed value.
///
/// `raw` is `None` when the caller supplied no input at all. Validators may
/// be asynchronous; the stage waits for the outcome before deciding.
pub trait Validator: Send + Sync + 'static {
    /// The validated input type.
    type Output: Send + 'static;
    /// The error describing why validation failed.
    type Error: StdError + Send + Sync + 'static;

    /// Validates `raw`.
    fn validate<'a>(&'a self, raw: Option<&'a Value>) -> BoxFuture<'a, Result<Self::Output, Self::Error>>;
}

/// The validation stage.
#[derive(Debug, Clone)]
pub struct ValidationMiddleware<V> {
    validator: V,
}

impl<V: Validator> ValidationMiddleware<V> {
    /// Creates a validation stage around `validator`.
    pub const fn new(validator: V) -> Self {
        Self { validator }
    }

    /// Returns the wrapped validator.
    pub const fn validator(&self) -> &V {
        &self.validator
    }
}

impl ValidationMiddleware<SchemaValidator> {
    /// Creates a stage that checks the raw input against `schema`.
    pub fn schema(schema: Schema) -> Self {
        Self::new(SchemaValidator::new(schema))
    }
}

impl<F, T, E> ValidationMiddleware<FnValidator<F, T, E>>
where
    F: Fn(Option<&Value>) -> Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: StdError + Send + Sync + 'static,
{
    /// Creates a stage from a synchronous validation closure.
    pub fn from_fn(func: F) -> Self {
        Self::new(FnValidator::new(func))
    }
}

impl<C, R, V> Middleware<Params<C, RawInput>, R> for ValidationMiddleware<V>
where
    C: Send + 'static,
    R: Send + 'static,
    V: Validator,
{
    type Output = Params<C, V::Output>;

    fn name(&self) -> &'static str {
        "validation"
    }

    fn process<'a>(
        &'a self,
        params: Params<C, RawInput>,
        next: Next<Params<C, V::Output>, R>,
    ) -> BoxFuture<'a, Settled<R>> {
        Box::pin(async move {
            let (ctx, raw) = params.into_parts();
            let outcome = AssertUnwindSafe(async { self.validator.validate(raw.as_value()).await })
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(input)) => next.run(Params::from_parts(ctx, input)).await,
                Ok(Err(error)) => {
                    tracing::debug!(error = %error, "input validation failed");
                    next.reject(ErrorData::new(ErrorCode::BadRequest).caused_by(error))
                }
                Err(payload) => {
                    tracing::error!(panic = %panic_message(payload.as_ref()), "validator panicked");
                    next.reject(panic_failure(payload.as_ref()))
                }
            }
        })
    }
}

/// Creates a stage that deserializes the raw input into `T`.
pub fn validate_json<T>() -> ValidationMiddleware<JsonValidator<T>>
where
    T: DeserializeOwned + Send + 'static,
{
    ValidationMiddleware::new(JsonValidator::new())
}

// ============================================================================
// Validators
// ============================================================================

/// A validator backed by a synchronous closure.
pub struct FnValidator<F, T, E> {
    func: F,
    _marker: PhantomData<fn() -> (T, E)>,
}

impl<F, T, E> FnValidator<F, T, E>
where
    F: Fn(Option<&Value>) -> Result<T, E>,
{
    /// Wraps `func`.
    pub const fn new(func: F) -> Self {
        Self {
            func,
            _marker: PhantomData,
        }
    }
}

impl<F, T, E> fmt::Debug for FnValidator<F, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnValidator").finish_non_exhaustive()
    }
}

impl<F, T, E> Validator for FnValidator<F, T, E>
where
    F: Fn(Option<&Value>) -> Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: StdError + Send + Sync + 'static,
{
    type Output = T;
    type Error = E;

    fn validate<'a>(&'a self, raw: Option<&'a Value>) -> BoxFuture<'a, Result<T, E>> {
        Box::pin(ready((self.func)(raw)))
    }
}

/// Deserializes the raw input into `T` with serde.
///
/// Missing input is treated as JSON `null`, so `Option<_>` and unit-like
/// targets accept it. When a [`Schema`] is attached it is checked first and
/// its violations are reported instead of serde's.
pub struct JsonValidator<T> {
    schema: Option<Schema>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonValidator<T> {
    /// Creates a validator for `T`.
    pub const fn new() -> Self {
        Self {
            schema: None,
            _marker: PhantomData,
        }
    }

    /// Checks `schema` before deserializing.
    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }
}

impl<T> Default for JsonValidator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonValidator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonValidator")
            .field("target", &std::any::type_name::<T>())
            .field("schema", &self.schema)
            .finish()
    }
}

impl<T> Validator for JsonValidator<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;
    type Error = SchemaViolations;

    fn validate<'a>(&'a self, raw: Option<&'a Value>) -> BoxFuture<'a, Result<T, SchemaViolations>> {
        let outcome = self
            .schema
            .as_ref()
            .map_or(Ok(()), |schema| schema.check(raw))
            .and_then(|()| {
                let value = raw.cloned().unwrap_or(Value::Null);
                serde_json::from_value(value).map_err(SchemaViolations::from)
            });
        Box::pin(ready(outcome))
    }
}

/// Checks raw input against a [`Schema`] and forwards the JSON object
/// unchanged.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    schema: Schema,
}

impl SchemaValidator {
    /// Creates a validator for `schema`.
    pub const fn new(schema: Schema) -> Self {
        Self { schema }
    }
}

impl Validator for SchemaValidator {
    type Output = Value;
    type Error = SchemaViolations;

    fn validate<'a>(&'a self, raw: Option<&'a Value>) -> BoxFuture<'a, Result<Value, SchemaViolations>> {
        let outcome = self
            .schema
            .check(raw)
            .map(|()| raw.cloned().unwrap_or_else(|| Value::Object(serde_json::Map::new())));
        Box::pin(ready(outcome))
    }
}

// ============================================================================
// Schema
// ============================================================================

/// A lightweight object schema: required fields, field types, and whether
/// unknown fields are allowed.
///
/// The default schema is [`Schema::any`].
#[derive(Debug, Clone)]
pub struct Schema {
    required_fields: Vec<String>,
    field_types: HashMap<String, FieldType>,
    allow_additional: bool,
}

/// Expected JSON type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// String type.
    String,
    /// Integer type.
    Integer,
    /// Number type (float).
    Number,
    /// Boolean type.
    Boolean,
    /// Array type.
    Array,
    /// Object type.
    Object,
    /// Any type (no validation).
    Any,
}

impl FieldType {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::any()
    }
}

impl Schema {
    /// Creates a new empty schema builder.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Creates a schema that accepts any object.
    pub fn any() -> Self {
        Self {
            required_fields: Vec::new(),
            field_types: HashMap::new(),
            allow_additional: true,
        }
    }

    /// Checks `raw` against the schema, collecting every violation.
    pub fn check(&self, raw: Option<&Value>) -> Result<(), SchemaViolations> {
        let Some(value) = raw else {
            if self.required_fields.is_empty() {
                return Ok(());
            }
            return Err(Violation::new("", "Input is required", "INPUT_REQUIRED").into());
        };

        let Some(object) = value.as_object() else {
            return Err(Violation::new("", "Input must be an object", "INPUT_NOT_OBJECT").into());
        };

        let mut violations = Vec::new();

        for field in &self.required_fields {
            if !object.contains_key(field) {
                violations.push(Violation::new(
                    field,
                    format!("Missing required field: {field}"),
                    "FIELD_REQUIRED",
                ));
            }
        }

        for (field, value) in object {
            if let Some(expected) = self.field_types.get(field) {
                if !expected.matches(value) {
                    violations.push(Violation::new(
                        field,
                        format!("Field '{field}' has invalid type, expected {expected:?}"),
                        "INVALID_TYPE",
                    ));
                }
            } else if !self.allow_additional {
                violations.push(Violation::new(field, format!("Unexpected field: {field}"), "UNEXPECTED_FIELD"));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaViolations { violations })
        }
    }
}

/// Builder for [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    required_fields: Vec<String>,
    field_types: HashMap<String, FieldType>,
    allow_additional: Option<bool>,
}

impl SchemaBuilder {
    /// Adds a required field.
    #[must_use]
    pub fn required(mut self, field: &str) -> Self {
        self.required_fields.push(field.to_string());
        self
    }

    /// Adds a field with a specific type.
    #[must_use]
    pub fn field(mut self, name: &str, field_type: FieldType) -> Self {
        self.field_types.insert(name.to_string(), field_type);
        self
    }

    /// Sets whether additional fields are allowed. Defaults to `true`.
    #[must_use]
    pub fn allow_additional(mut self, allow: bool) -> Self {
        self.allow_additional = Some(allow);
        self
    }

    /// Builds the schema.
    #[must_use]
    pub fn build(self) -> Schema {
        Schema {
            required_fields: self.required_fields,
            field_types: self.field_types,
            allow_additional: self.allow_additional.unwrap_or(true),
        }
    }
}

/// A single validation problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// The field that failed validation; empty for the input as a whole.
    pub field: String,
    /// Human-readable description.
    pub message: String,
    /// Machine-readable code, e.g. `FIELD_REQUIRED`.
    pub code: String,
}

impl Violation {
    fn new(field: &str, message: impl Into<String>, code: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
            code: code.to_string(),
        }
    }
}

/// Every violation found in one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolations {
    /// The violations, in discovery order. Never empty.
    pub violations: Vec<Violation>,
}

impl SchemaViolations {
    /// Returns the violation for `field`, if any.
    pub fn for_field(&self, field: &str) -> Option<&Violation> {
        self.violations.iter().find(|v| v.field == field)
    }
}

impl fmt::Display for SchemaViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut messages = self.violations.iter().map(|v| v.message.as_str());
        if let Some(first) = messages.next() {
            f.write_str(first)?;
        }
        for message in messages {
            write!(f, "; {message}")?;
        }
        Ok(())
    }
}

impl StdError for SchemaViolations {}

impl From<Violation> for SchemaViolations {
    fn from(violation: Violation) -> Self {
        Self {
            violations: vec![violation],
        }
    }
}

impl From<serde_json::Error> for SchemaViolations {
    fn from(error: serde_json::Error) -> Self {
        Violation::new("", format!("Invalid input: {error}"), "INVALID_INPUT").into()
    }
}

/// Adapts an async closure into a [`Validator`].
///
/// Use this when validation needs I/O, e.g. checking that a referenced row
/// exists.
pub struct AsyncFnValidator<F, T, E> {
    func: F,
    _marker: PhantomData<fn() -> (T, E)>,
}

impl<F, Fut, T, E> AsyncFnValidator<F, T, E>
where
    F: Fn(Option<Value>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    /// Wraps `func`. The closure receives an owned copy of the raw input.
    pub const fn new(func: F) -> Self {
        Self {
            func,
            _marker: PhantomData,
        }
    }
}

impl<F, T, E> fmt::Debug for AsyncFnValidator<F, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFnValidator").finish_non_exhaustive()
    }
}

impl<F, Fut, T, E> Validator for AsyncFnValidator<F, T, E>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: StdError + Send + Sync + 'static,
{
    type Output = T;
    type Error = E;

    fn validate<'a>(&'a self, raw: Option<&'a Value>) -> BoxFuture<'a, Result<T, E>> {
        Box::pin((self.func)(raw.cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Procedure, ProcedureOptions};
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use trellis_core::{Envelope, INTERNAL_ERROR_MESSAGE};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Hello {
        hello: String,
    }

    fn hello_schema() -> Schema {
        Schema::builder()
            .required("hello")
            .field("hello", FieldType::String)
            .allow_additional(false)
            .build()
    }

    #[test]
    fn test_middleware_name() {
        let stage = ValidationMiddleware::schema(Schema::any());
        assert_eq!(Middleware::<Params<()>, ()>::name(&stage), "validation");
    }

    #[test]
    fn test_schema_reports_every_violation() {
        let schema = Schema::builder()
            .required("name")
            .required("age")
            .field("age", FieldType::Integer)
            .allow_additional(false)
            .build();

        let err = schema.check(Some(&json!({"age": "ten", "extra": true}))).unwrap_err();
        assert_eq!(err.violations.len(), 3);
        assert_eq!(err.for_field("name").unwrap().code, "FIELD_REQUIRED");
        assert_eq!(err.for_field("age").unwrap().code, "INVALID_TYPE");
        assert_eq!(err.for_field("extra").unwrap().code, "UNEXPECTED_FIELD");
    }

    #[test]
    fn test_schema_missing_input() {
        assert!(Schema::any().check(None).is_ok());

        let err = hello_schema().check(None).unwrap_err();
        assert_eq!(err.violations[0].code, "INPUT_REQUIRED");

        let err = hello_schema().check(Some(&json!([1, 2]))).unwrap_err();
        assert_eq!(err.violations[0].code, "INPUT_NOT_OBJECT");
    }

    #[test]
    fn test_field_type_matching() {
        assert!(FieldType::Integer.matches(&json!(3)));
        assert!(!FieldType::Integer.matches(&json!(3.5)));
        assert!(FieldType::Number.matches(&json!(3.5)));
        assert!(FieldType::Array.matches(&json!([])));
        assert!(FieldType::Any.matches(&Value::Null));
        assert!(!FieldType::Boolean.matches(&json!("true")));
    }

    #[test]
    fn test_violations_display() {
        let err = SchemaViolations {
            violations: vec![
                Violation::new("a", "first", "X"),
                Violation::new("b", "second", "Y"),
            ],
        };
        assert_eq!(err.to_string(), "first; second");
    }

    #[tokio::test]
    async fn test_json_validator_forwards_typed_input() {
        let procedure = Procedure::<Params<()>, String>::builder()
            .stage(validate_json::<Hello>())
            .resolve(|params: Params<(), Hello>| async move { Envelope::success(params.input.hello) });

        let result = procedure.invoke(Params::with_raw_input((), json!({"hello": "x"}))).await;
        assert_eq!(result, Envelope::success("x".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_input_attaches_validator_error() {
        let resolved = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&resolved);
        let procedure = Procedure::<Params<()>, String>::builder()
            .stage(ValidationMiddleware::new(JsonValidator::<Hello>::new().with_schema(hello_schema())))
            .resolve(move |params: Params<(), Hello>| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Envelope::success(params.input.hello) }
            });

        let result = procedure.invoke(Params::with_raw_input((), json!({}))).await;
        let error = result.error().unwrap();
        assert_eq!(error.code(), ErrorCode::BadRequest);

        let violations = error.cause().unwrap().downcast_ref::<SchemaViolations>().unwrap();
        assert_eq!(violations.for_field("hello").unwrap().code, "FIELD_REQUIRED");
        assert_eq!(resolved.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_serde_errors_become_violations() {
        let procedure = Procedure::<Params<()>, String>::builder()
            .stage(validate_json::<Hello>())
            .resolve(|params: Params<(), Hello>| async move { Envelope::success(params.input.hello) });

        let result = procedure.invoke(Params::with_raw_input((), json!({"hello": 5}))).await;
        let cause = result.error().and_then(ErrorData::cause).unwrap();
        let violations = cause.downcast_ref::<SchemaViolations>().unwrap();
        assert_eq!(violations.violations[0].code, "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_schema_validator_forwards_object() {
        let procedure = Procedure::<Params<()>, Value>::builder()
            .stage(ValidationMiddleware::schema(hello_schema()))
            .resolve(|params: Params<(), Value>| async move { Envelope::success(params.input) });

        let result = procedure.invoke(Params::with_raw_input((), json!({"hello": "x"}))).await;
        assert_eq!(result, Envelope::success(json!({"hello": "x"})));
    }

    #[tokio::test]
    async fn test_fn_validator() {
        let stage = ValidationMiddleware::from_fn(|raw: Option<&Value>| {
            raw.and_then(Value::as_u64)
                .ok_or_else(|| std::io::Error::other("expected an unsigned integer"))
        });
        let procedure = Procedure::<Params<()>, u64>::builder()
            .stage(stage)
            .resolve(|params: Params<(), u64>| async move { Envelope::success(params.input + 1) });

        assert_eq!(procedure.invoke(Params::with_raw_input((), json!(41))).await, Envelope::success(42));

        let result = procedure.invoke(Params::new(())).await;
        let cause = result.error().and_then(ErrorData::cause).unwrap();
        assert_eq!(cause.to_string(), "expected an unsigned integer");
        assert!(cause.downcast_ref::<std::io::Error>().is_some());
    }

    #[tokio::test]
    async fn test_async_validator() {
        let stage = ValidationMiddleware::new(AsyncFnValidator::new(|raw: Option<Value>| async move {
            tokio::task::yield_now().await;
            raw.and_then(|v| v.as_str().map(str::to_uppercase))
                .ok_or_else(|| std::io::Error::other("expected a string"))
        }));
        let procedure = Procedure::<Params<()>, String>::builder()
            .stage(stage)
            .resolve(|params: Params<(), String>| async move { Envelope::success(params.input) });

        let result = procedure.invoke(Params::with_raw_input((), json!("shout"))).await;
        assert_eq!(result, Envelope::success("SHOUT".to_string()));
    }

    #[tokio::test]
    async fn test_validator_panic_is_internal_error() {
        let stage = ValidationMiddleware::from_fn(|_: Option<&Value>| -> Result<u8, std::io::Error> {
            panic!("validator bug")
        });
        let procedure = Procedure::<Params<()>, u8>::builder()
            .stage(stage)
            .resolve(|params: Params<(), u8>| async move { Envelope::success(params.input) });

        let result = procedure.invoke(Params::new(())).await;
        let error = result.error().unwrap();
        assert_eq!(error.code(), ErrorCode::InternalServerError);
        assert_eq!(error.cause().unwrap().to_string(), INTERNAL_ERROR_MESSAGE);
    }

    fn connect_to_db() -> Result<u8, std::io::Error> {
        panic!("secret db password hunter2")
    }

    fn leaky_validator() -> ValidationMiddleware<impl Validator<Output = u8>> {
        ValidationMiddleware::new(AsyncFnValidator::new(|_: Option<Value>| async move {
            tokio::task::yield_now().await;
            connect_to_db()
        }))
    }

    #[tokio::test]
    async fn test_async_validator_panic_is_redacted() {
        let procedure = Procedure::<Params<()>, u8>::builder()
            .stage(leaky_validator())
            .resolve(|params: Params<(), u8>| async move { Envelope::success(params.input) });

        let result = procedure.invoke(Params::with_raw_input((), json!(1))).await;
        let error = result.error().unwrap();
        assert_eq!(error.code(), ErrorCode::InternalServerError);
        assert_eq!(error.cause().unwrap().to_string(), INTERNAL_ERROR_MESSAGE);

        let wire = serde_json::to_string(&result).unwrap();
        assert!(!wire.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_validator_panic_exposed_when_configured() {
        let procedure = Procedure::<Params<()>, u8>::builder()
            .options(ProcedureOptions::default().expose_internal_errors(true))
            .stage(leaky_validator())
            .resolve(|params: Params<(), u8>| async move { Envelope::success(params.input) });

        let result = procedure.invoke(Params::new(())).await;
        assert_eq!(
            result.error().unwrap().cause().unwrap().to_string(),
            "secret db password hunter2"
        );
    }
}
