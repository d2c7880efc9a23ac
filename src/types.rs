//! Typed models for CouchDB responses.
//!
//! Documents themselves stay untyped ([`Document`] is a `serde_json::Value`)
//! because their shape belongs to the application. Server metadata has a
//! stable shape and is modelled here; fields that vary between CouchDB
//! releases are collected in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A CouchDB document: a JSON object with `_id` and optionally `_rev`.
pub type Document = Value;

/// User name and password pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name
    pub username: String,
    /// Password
    pub password: String,
}

impl Credentials {
    /// Create a credentials pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Answer of `GET /`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Always `"Welcome"`
    #[serde(default)]
    pub couchdb: String,
    /// Server release
    #[serde(default)]
    pub version: String,
    /// Source revision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_sha: Option<String>,
    /// Server instance identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Enabled feature flags
    #[serde(default)]
    pub features: Vec<String>,
    /// Vendor details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<Value>,
    /// Anything else the server reports
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Answer of `GET /{db}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseInfo {
    /// Database name
    #[serde(default)]
    pub db_name: String,
    /// Number of live documents
    #[serde(default)]
    pub doc_count: u64,
    /// Number of deleted documents
    #[serde(default)]
    pub doc_del_count: u64,
    /// Current update sequence (string on clusters, integer on 1.x)
    #[serde(default)]
    pub update_seq: Value,
    /// Whether compaction is running
    #[serde(default)]
    pub compact_running: bool,
    /// Anything else the server reports
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One row of a view or `_all_docs` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Emitting document id (absent for reduced rows)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Emitted key
    #[serde(default)]
    pub key: Value,
    /// Emitted value
    #[serde(default)]
    pub value: Value,
    /// Full document when `include_docs=true`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Document>,
}

/// Answer of a view query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewResult {
    /// Rows in the whole view
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
    /// Offset of the first returned row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    /// Returned rows, kept raw so `flat` projections see every field
    #[serde(default)]
    pub rows: Vec<Value>,
}

/// Per-document outcome of a `_bulk_docs` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkItem {
    /// Document id
    #[serde(default)]
    pub id: String,
    /// New revision when the write succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// Success flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    /// Error kind when the write failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error detail when the write failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// One entry of the changes feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeResult {
    /// Sequence identifier
    #[serde(default)]
    pub seq: Value,
    /// Changed document id
    #[serde(default)]
    pub id: String,
    /// Leaf revisions, `[{"rev": "..."}]`
    #[serde(default)]
    pub changes: Vec<Value>,
    /// Whether the change is a deletion
    #[serde(default)]
    pub deleted: bool,
    /// Document body when `include_docs=true`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Document>,
}

/// Answer of a non-continuous `_changes` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangesList {
    /// Sequence to resume from
    #[serde(default)]
    pub last_seq: Value,
    /// Changes since the requested sequence
    #[serde(default)]
    pub results: Vec<ChangeResult>,
}
