//! Parameters passed down a procedure chain.
//!
//! A [`Params`] value pairs the context with the input. Before a validation
//! stage runs the input is a [`RawInput`]; afterwards it is whatever type the
//! validator produced. Stages never mutate params in place: every
//! transformation consumes the value and builds a new one.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unvalidated input as received from the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawInput(Option<Value>);

impl RawInput {
    /// No input was supplied.
    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }

    /// Wraps a JSON value.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(Some(value))
    }

    /// Returns the raw JSON value, if any.
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        self.0.as_ref()
    }

    /// Consumes the wrapper.
    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        self.0
    }

    /// Returns true when input was supplied.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.0.is_some()
    }
}

impl From<Value> for RawInput {
    fn from(value: Value) -> Self {
        Self(Some(value))
    }
}

impl From<Option<Value>> for RawInput {
    fn from(value: Option<Value>) -> Self {
        Self(value)
    }
}

/// The value each stage receives.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use trellis_core::Params;
///
/// let params = Params::with_raw_input("ctx", json!({"hello": "x"}));
/// assert_eq!(params.raw_input(), Some(&json!({"hello": "x"})));
///
/// let swapped = params.with_ctx(42_u32);
/// assert_eq!(swapped.ctx, 42);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Params<C, I = RawInput> {
    /// The invocation context.
    pub ctx: C,
    /// Raw input before validation, validated input after.
    pub input: I,
}

impl<C> Params<C> {
    /// Creates params with no raw input.
    pub const fn new(ctx: C) -> Self {
        Self {
            ctx,
            input: RawInput::none(),
        }
    }

    /// Creates params carrying raw input.
    pub fn with_raw_input(ctx: C, raw: impl Into<RawInput>) -> Self {
        Self {
            ctx,
            input: raw.into(),
        }
    }

    /// Returns the raw input, if any.
    pub const fn raw_input(&self) -> Option<&Value> {
        self.input.as_value()
    }
}

impl<C, I> Params<C, I> {
    /// Assembles params from a context and an input.
    pub const fn from_parts(ctx: C, input: I) -> Self {
        Self { ctx, input }
    }

    /// Replaces the context, keeping the input.
    pub fn with_ctx<D>(self, ctx: D) -> Params<D, I> {
        Params {
            ctx,
            input: self.input,
        }
    }

    /// Derives a new context from the current one, keeping the input.
    pub fn map_ctx<D, F>(self, f: F) -> Params<D, I>
    where
        F: FnOnce(C) -> D,
    {
        Params {
            ctx: f(self.ctx),
            input: self.input,
        }
    }

    /// Replaces the input, keeping the context.
    pub fn with_input<J>(self, input: J) -> Params<C, J> {
        Params {
            ctx: self.ctx,
            input,
        }
    }

    /// Splits into context and input.
    pub fn into_parts(self) -> (C, I) {
        (self.ctx, self.input)
    }
}
