//! HTTP request handlers.
//!
//! This module contains all the endpoint handlers for the gateway API.

use serde::Serialize;

pub mod health;
pub mod identity;
pub mod keys;

/// Envelope for successful JSON responses.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    /// The response payload.
    pub data: T,
}

impl<T> DataResponse<T> {
    /// Wrap `data` in the envelope.
    pub const fn new(data: T) -> Self {
        Self { data }
    }
}
