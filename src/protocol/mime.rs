//! Attachment content-type guessing.

use super::constants::OCTET_STREAM_MIME;

/// Guess an attachment's content type from its file name.
///
/// Falls back to `application/octet-stream` for unknown extensions.
///
/// ```
/// use couchdb_http::protocol::guess_content_type;
///
/// assert_eq!(guess_content_type("notes.txt"), "text/plain");
/// assert_eq!(guess_content_type("blob"), "application/octet-stream");
/// ```
pub fn guess_content_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_raw()
        .unwrap_or(OCTET_STREAM_MIME)
        .to_string()
}
