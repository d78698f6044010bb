//! Raw input size limit.
//!
//! Measures the JSON encoding of the raw input and short-circuits with
//! `PAYLOAD_TOO_LARGE` when it exceeds the limit. Place it before validation
//! so oversized input never reaches the validator.

use crate::middleware::{BoxFuture, Middleware, Next, Settled};
use serde_json::Value;
use std::io;
use trellis_core::{ErrorCode, ErrorData, Params};

/// Rejects raw input larger than `max_bytes` once encoded as JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLimit {
    max_bytes: usize,
}

impl PayloadLimit {
    /// Creates a limit of `max_bytes`.
    pub const fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Returns the limit in bytes.
    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

impl<C, R> Middleware<Params<C>, R> for PayloadLimit
where
    C: Send + 'static,
    R: Send + 'static,
{
    type Output = Params<C>;

    fn name(&self) -> &'static str {
        "payload_limit"
    }

    fn process<'a>(&'a self, params: Params<C>, next: Next<Params<C>, R>) -> BoxFuture<'a, Settled<R>> {
        let size = params.raw_input().map_or(0, encoded_len);
        Box::pin(async move {
            if size > self.max_bytes {
                tracing::debug!(size, limit = self.max_bytes, "raw input over limit");
                return next.reject(
                    ErrorData::new(ErrorCode::PayloadTooLarge)
                        .with_message(format!("input is {size} bytes, limit is {}", self.max_bytes)),
                );
            }
            next.run(params).await
        })
    }
}

/// Counts bytes without buffering them.
struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn encoded_len(value: &Value) -> usize {
    let mut counter = ByteCounter(0);
    match serde_json::to_writer(&mut counter, value) {
        Ok(()) => counter.0,
        Err(_) => usize::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Procedure;
    use serde_json::json;
    use trellis_core::Envelope;

    fn limited(max_bytes: usize) -> Procedure<Params<()>, bool> {
        Procedure::builder()
            .stage(PayloadLimit::new(max_bytes))
            .resolve(|params: Params<()>| async move { Envelope::success(params.input.is_present()) })
    }

    #[test]
    fn test_encoded_len_matches_serialization() {
        let value = json!({"hello": "world", "n": [1, 2, 3]});
        assert_eq!(encoded_len(&value), serde_json::to_vec(&value).unwrap().len());
    }

    #[tokio::test]
    async fn test_within_limit() {
        let result = limited(16).invoke(Params::with_raw_input((), json!({"a": 1}))).await;
        assert_eq!(result, Envelope::success(true));
    }

    #[tokio::test]
    async fn test_missing_input_is_empty() {
        let result = limited(0).invoke(Params::new(())).await;
        assert_eq!(result, Envelope::success(false));
    }

    #[tokio::test]
    async fn test_over_limit() {
        let result = limited(8).invoke(Params::with_raw_input((), json!({"hello": "world"}))).await;
        let error = result.error().unwrap();
        assert_eq!(error.code(), ErrorCode::PayloadTooLarge);
        assert_eq!(error.code().http_status(), 413);
        assert_eq!(error.cause().unwrap().to_string(), "input is 17 bytes, limit is 8");
    }
}
