//! Header parsing for CouchDB responses.
//!
//! CouchDB reports a document's current revision in the `ETag` header of
//! `HEAD`/`GET` answers, quoted as an entity tag (`"1-967a00dff5e02add41819138abb3284d"`).
//! Cookie authentication returns the session token in `Set-Cookie`.
//!
//! # Examples
//!
//! ```
//! use couchdb_http::protocol::{parse_etag, extract_auth_cookie};
//!
//! assert_eq!(parse_etag("\"1-abc\""), "1-abc");
//! assert_eq!(
//!     extract_auth_cookie("AuthSession=cm9vdDo1MEJ; Version=1; Path=/; HttpOnly").as_deref(),
//!     Some("AuthSession=cm9vdDo1MEJ")
//! );
//! ```

use super::constants::{AUTH_COOKIE, JSON_MIME};

/// Strip entity-tag quoting to obtain a revision.
///
/// Weak validators (`W/"..."`) are accepted and their prefix dropped.
pub fn parse_etag(value: &str) -> String {
    let trimmed = value.trim();
    let trimmed = trimmed.strip_prefix("W/").unwrap_or(trimmed);
    trimmed.trim_matches('"').to_string()
}

/// Whether a `Content-Type` header value denotes a JSON body.
pub fn is_json_content_type(value: &str) -> bool {
    value.to_ascii_lowercase().contains(JSON_MIME)
}

/// Extract the `AuthSession=...` pair from a `Set-Cookie` header value.
///
/// Returns `None` for unrelated cookies and for the empty token CouchDB sends
/// on logout.
pub fn extract_auth_cookie(set_cookie: &str) -> Option<String> {
    let pair = set_cookie.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    if name.trim() != AUTH_COOKIE || value.is_empty() {
        return None;
    }
    Some(format!("{}={}", AUTH_COOKIE, value))
}
