//! Shared helpers: decimal arithmetic and retry with backoff.

pub mod decimal;
mod retry;

pub use retry::{retry_with_backoff, RetryPolicy};
