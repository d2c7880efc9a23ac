//! Protocol-level helpers for the CouchDB HTTP API.
//!
//! Nothing in this module performs I/O. It covers the parts of talking to
//! CouchDB that are pure string and URL work:
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`constants`] | Header names, MIME types and well-known endpoint paths |
//! | [`url`] | Credential extraction, URL joining, document and view paths |
//! | [`headers`] | ETag and cookie parsing, content-type checks |
//! | [`mime`] | Attachment content-type guessing |
//!
//! # Examples
//!
//! ```
//! use couchdb_http::protocol::{id_to_path, path_from_name, urljoin};
//!
//! assert_eq!(id_to_path("_design/blog"), vec!["_design", "blog"]);
//! assert_eq!(
//!     path_from_name("blog/by_date", "_view").unwrap(),
//!     vec!["_design", "blog", "_view", "by_date"]
//! );
//! assert_eq!(urljoin("http://localhost:5984/", &["db", "doc"]), "http://localhost:5984/db/doc");
//! ```

pub mod constants;
pub mod headers;
pub mod mime;
pub mod url;

pub use headers::{extract_auth_cookie, is_json_content_type, parse_etag};
pub use mime::guess_content_type;
pub use self::url::{extract_credentials, id_to_path, join_segments, path_from_name, urljoin};
