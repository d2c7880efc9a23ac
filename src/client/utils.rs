//! Utility functions for the CouchDB client.
//!
//! This module provides helpers for:
//! - Retry logic with exponential backoff
//! - Status code classification
//! - Document id generation and document field access

use crate::error::{CouchError, Result};
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

/// Check if status code indicates a transient server condition.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 502 | 503 | 504)
}

/// Exponential backoff delay calculation.
///
/// The exponent is capped so a long retry chain cannot overflow.
pub fn exponential_backoff(attempt: u32, base_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2_u64.pow(attempt.min(10)));
    Duration::from_millis(delay_ms)
}

/// A fresh document id: a v4 UUID as 32 lowercase hex digits.
pub fn new_document_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Render a JSON value as a query-string value.
///
/// Strings travel unquoted; everything else uses its JSON text.
pub fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Whether a boolean option was switched off, as `false` or `"false"`.
pub fn is_disabled(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => !flag,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("false"),
        _ => false,
    }
}

/// Borrow a document as a JSON object.
pub fn as_object(doc: &Value) -> Result<&Map<String, Value>> {
    doc.as_object()
        .ok_or_else(|| CouchError::InvalidArgument("document must be a JSON object".to_string()))
}

/// Mutably borrow a document as a JSON object.
pub fn as_object_mut(doc: &mut Value) -> Result<&mut Map<String, Value>> {
    doc.as_object_mut()
        .ok_or_else(|| CouchError::InvalidArgument("document must be a JSON object".to_string()))
}

/// Read a string field such as `_id` or `_rev`.
pub fn doc_str<'a>(doc: &'a Value, field: &str) -> Result<&'a str> {
    as_object(doc)?
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| CouchError::InvalidArgument(format!("Invalid document, missing {} attr", field)))
}

/// Return the document's `_id`, assigning a new one when absent.
pub fn ensure_document_id(doc: &mut Value) -> Result<String> {
    let object = as_object_mut(doc)?;
    match object.get("_id").and_then(Value::as_str) {
        Some(id) => Ok(id.to_string()),
        None => {
            let id = new_document_id();
            object.insert("_id".to_string(), Value::String(id.clone()));
            Ok(id)
        }
    }
}
