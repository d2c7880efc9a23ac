//! Constants used on the wire.

/// Header names.
pub mod headers {
    use reqwest::header::HeaderName;

    /// Disables CouchDB's fsync-per-request when set to `false`.
    pub const FULL_COMMIT: HeaderName = HeaderName::from_static("x-couch-full-commit");
    /// Revision of a document returned by HEAD/GET.
    pub const ETAG: HeaderName = HeaderName::from_static("etag");
}

/// MIME type for every JSON request and response body.
pub const JSON_MIME: &str = "application/json";

/// Content type used when nothing better can be guessed.
pub const OCTET_STREAM_MIME: &str = "application/octet-stream";

/// Default server location when neither configuration nor environment provide one.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5984/";

/// Environment variable consulted for the server location.
pub const BASE_URL_ENV: &str = "COUCHDB_URL";

/// Cookie carrying a session token after `POST /_session`.
pub const AUTH_COOKIE: &str = "AuthSession";

/// Well-known endpoint segments.
#[allow(missing_docs)]
pub mod paths {
    pub const ALL_DBS: &str = "_all_dbs";
    pub const ALL_DOCS: &str = "_all_docs";
    pub const BULK_DOCS: &str = "_bulk_docs";
    pub const CHANGES: &str = "_changes";
    pub const DB_UPDATES: &str = "_db_updates";
    pub const SESSION: &str = "_session";
    pub const REPLICATE: &str = "_replicate";
    pub const CONFIG: &str = "_config";
    pub const STATS: &str = "_stats";
    pub const COMPACT: &str = "_compact";
    pub const VIEW_CLEANUP: &str = "_view_cleanup";
    pub const ENSURE_FULL_COMMIT: &str = "_ensure_full_commit";
    pub const TEMP_VIEW: &str = "_temp_view";
    pub const DESIGN: &str = "_design";
    pub const VIEW: &str = "_view";
}
