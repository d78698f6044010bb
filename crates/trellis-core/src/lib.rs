//! # Trellis Core
//!
//! Core types shared by every Trellis procedure:
//!
//! - [`Envelope`] - the closed success/failure value every stage returns
//! - [`ErrorCode`] - fixed error table with stable numeric identifiers
//! - [`ErrorData`] / [`Cause`] - failure payload with an opaque cause
//! - [`Params`] / [`RawInput`] - what each stage receives
//! - [`CallerIdentity`] / [`Authenticated`] - who is calling
//! - [`RequestContext`] / [`RequestId`] - a ready-made initial context

#![doc(html_root_url = "https://docs.rs/trellis-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod envelope;
mod error;
mod identity;
mod params;

pub use context::{RequestContext, RequestId};
pub use envelope::Envelope;
pub use error::{
    Cause, ErrorCategory, ErrorCode, ErrorData, UnknownErrorCode, WireError,
    INTERNAL_ERROR_MESSAGE,
};
pub use identity::{
    ApiKeyIdentity, Authenticated, CallerContext, CallerIdentity, ServiceIdentity, UserIdentity,
};
pub use params::{Params, RawInput};
