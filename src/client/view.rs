//! View query options and result pagination.
//!
//! CouchDB views are sorted by `(key, document id)`. Large views are walked
//! page by page by re-issuing the query with `startkey`/`startkey_docid` set
//! to the first row that has not been returned yet:
//!
//! ```text
//! request limit = page + 1
//! ┌─────────────── page ───────────────┐┌ boundary ┐
//! │ row 0 │ row 1 │ ... │ row page-1    ││ row page │ ──► next startkey / startkey_docid
//! └────────────────────────────────────┘└──────────┘
//! ```
//!
//! The boundary row is never emitted with the page that fetched it; it is the
//! first row of the next page, so every row is returned exactly once even when
//! many rows share a key.
//!
//! # Examples
//!
//! ```ignore
//! use couchdb_http::ViewOptions;
//!
//! let mut pages = db
//!     .query_pages("testing/names", ViewOptions::new().pagesize(100).limit(250))?;
//! while let Some(page) = pages.next_page().await? {
//!     println!("{} rows", page.len());
//! }
//! ```

use crate::client::resource::{RequestParts, Resource};
use crate::client::utils::query_value;
use crate::error::{CouchError, Result};
use crate::types::ViewResult;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Options sent as JSON rather than plain text.
const JSON_ENCODED_OPTIONS: [&str; 5] = ["key", "startkey", "endkey", "start_key", "end_key"];

/// Encode view options as query-string pairs.
///
/// Key bounds are JSON encoded (a string key `foo` travels as `"foo"`);
/// every other value is rendered as plain text.
///
/// ```
/// use couchdb_http::client::encode_view_options;
/// use serde_json::json;
/// use std::collections::BTreeMap;
///
/// let mut options = BTreeMap::new();
/// options.insert("startkey".to_string(), json!("foo"));
/// options.insert("limit".to_string(), json!(10));
/// options.insert("descending".to_string(), json!(true));
///
/// let encoded = encode_view_options(&options);
/// assert_eq!(encoded, vec![
///     ("descending".to_string(), "true".to_string()),
///     ("limit".to_string(), "10".to_string()),
///     ("startkey".to_string(), "\"foo\"".to_string()),
/// ]);
/// ```
pub fn encode_view_options(options: &BTreeMap<String, Value>) -> Vec<(String, String)> {
    options
        .iter()
        .map(|(name, value)| {
            let encoded = if JSON_ENCODED_OPTIONS.contains(&name.as_str()) {
                value.to_string()
            } else {
                query_value(value)
            };
            (name.clone(), encoded)
        })
        .collect()
}

/// Query options for views and `_all_docs`.
#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    params: BTreeMap<String, Value>,
    keys: Option<Vec<Value>>,
    flat: Option<String>,
    pagesize: Option<usize>,
}

impl ViewOptions {
    /// No options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an arbitrary query option.
    ///
    /// `keys` is routed to the request body like [`ViewOptions::keys`].
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let value = value.into();
        if name == "keys" {
            self.keys = Some(match value {
                Value::Array(keys) => keys,
                other => vec![other],
            });
        } else {
            self.params.insert(name, value);
        }
        self
    }

    /// Exact key to match.
    pub fn key(self, key: impl Into<Value>) -> Self {
        self.param("key", key)
    }

    /// First key of the range.
    pub fn startkey(self, key: impl Into<Value>) -> Self {
        self.param("startkey", key)
    }

    /// Last key of the range.
    pub fn endkey(self, key: impl Into<Value>) -> Self {
        self.param("endkey", key)
    }

    /// Document id to start from among rows sharing `startkey`.
    pub fn startkey_docid(self, id: impl Into<String>) -> Self {
        self.param("startkey_docid", id.into())
    }

    /// Document id to stop at among rows sharing `endkey`.
    pub fn endkey_docid(self, id: impl Into<String>) -> Self {
        self.param("endkey_docid", id.into())
    }

    /// Maximum number of rows; with [`ViewOptions::pagesize`] it caps the total across pages.
    pub fn limit(self, limit: u64) -> Self {
        self.param("limit", limit)
    }

    /// Rows to skip before the first returned row.
    pub fn skip(self, skip: u64) -> Self {
        self.param("skip", skip)
    }

    /// Reverse the row order.
    pub fn descending(self, descending: bool) -> Self {
        self.param("descending", descending)
    }

    /// Embed each row's document.
    pub fn include_docs(self, include_docs: bool) -> Self {
        self.param("include_docs", include_docs)
    }

    /// Run (or skip) the view's reduce function.
    pub fn reduce(self, reduce: bool) -> Self {
        self.param("reduce", reduce)
    }

    /// Group reduce results by key.
    pub fn group(self, group: bool) -> Self {
        self.param("group", group)
    }

    /// Group reduce results by the first `level` elements of array keys.
    pub fn group_level(self, level: u64) -> Self {
        self.param("group_level", level)
    }

    /// Fetch exactly these keys; sent as a POST body.
    pub fn keys<I, V>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Return one field of each row (or document) instead of the whole object.
    pub fn flat(mut self, field: impl Into<String>) -> Self {
        self.flat = Some(field.into());
        self
    }

    /// Fetch the result `size` rows at a time.
    pub fn pagesize(mut self, size: usize) -> Self {
        self.pagesize = Some(size);
        self
    }

    /// A previously set option.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Set `name` only when the caller has not.
    pub(crate) fn with_default(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.entry(name.to_string()).or_insert_with(|| value.into());
        self
    }

    /// Query-string pairs for these options.
    pub fn encoded(&self) -> Vec<(String, String)> {
        encode_view_options(&self.params)
    }

    pub(crate) fn keys_ref(&self) -> Option<&Vec<Value>> {
        self.keys.as_ref()
    }

    pub(crate) fn flat_ref(&self) -> Option<&str> {
        self.flat.as_deref()
    }

    pub(crate) fn pagesize_ref(&self) -> Option<usize> {
        self.pagesize
    }
}

/// How raw rows are turned into returned values.
#[derive(Debug, Clone)]
pub(crate) enum RowShape {
    /// View rows as returned, optionally projected to one field.
    View { flat: Option<String> },
    /// `_all_docs` rows: the embedded document, or `{id, rev}` without docs.
    AllDocs {
        include_docs: bool,
        flat: Option<String>,
    },
}

impl RowShape {
    pub(crate) fn apply(&self, rows: Vec<Value>) -> Vec<Value> {
        match self {
            RowShape::View { flat } => rows.into_iter().map(|row| project(row, flat.as_deref())).collect(),
            RowShape::AllDocs { include_docs, flat } => rows
                .into_iter()
                // rows for unknown `keys` carry an error instead of a document
                .filter(|row| row.get("error").is_none())
                .map(|row| {
                    let doc = if *include_docs {
                        row.get("doc").cloned().unwrap_or(Value::Null)
                    } else {
                        json!({
                            "id": row.get("id").cloned().unwrap_or(Value::Null),
                            "rev": row.pointer("/value/rev").cloned().unwrap_or(Value::Null),
                        })
                    };
                    project(doc, flat.as_deref())
                })
                .collect(),
        }
    }
}

fn project(value: Value, flat: Option<&str>) -> Value {
    match flat {
        Some(field) => value.get(field).cloned().unwrap_or(Value::Null),
        None => value,
    }
}

/// Run one view request and return its raw rows.
///
/// `body` turns the request into a POST (multi-key queries, temporary views).
pub(crate) async fn fetch_rows(
    resource: &Resource,
    path: &[&str],
    params: Vec<(String, String)>,
    body: Option<Value>,
) -> Result<Vec<Value>> {
    let parts = RequestParts::new().params(params);
    let response = match body {
        Some(body) => resource.post(path, parts.json(&body)?).await?,
        None => resource.get(path, parts).await?,
    };
    let result: ViewResult = response.into_typed()?;
    Ok(result.rows)
}

/// Body of a multi-key view request.
pub(crate) fn keys_body(keys: Option<&Vec<Value>>) -> Option<Value> {
    keys.map(|keys| {
        let mut body = Map::new();
        body.insert("keys".to_string(), Value::Array(keys.clone()));
        Value::Object(body)
    })
}

/// Lazily walks a view one page at a time.
///
/// Created by [`Database::query_pages`](crate::Database::query_pages).
#[derive(Debug)]
pub struct Paginator {
    resource: Resource,
    path: Vec<String>,
    params: BTreeMap<String, Value>,
    shape: RowShape,
    pagesize: usize,
    remaining: Option<u64>,
    next_start: Option<(Value, String)>,
    done: bool,
}

impl Paginator {
    pub(crate) fn new(
        resource: Resource,
        path: Vec<String>,
        options: ViewOptions,
        shape: RowShape,
    ) -> Result<Self> {
        let pagesize = match options.pagesize {
            Some(size) if size > 0 => size,
            _ => {
                return Err(CouchError::InvalidArgument(
                    "pagesize should be a positive integer".to_string(),
                ))
            }
        };

        if options.keys.is_some() {
            return Err(CouchError::InvalidArgument(
                "pagesize cannot be combined with keys".to_string(),
            ));
        }

        let mut params = options.params;
        let remaining = match params.remove("limit") {
            None => None,
            Some(limit) => Some(limit.as_u64().ok_or_else(|| {
                CouchError::InvalidArgument("limit should be a non-negative integer".to_string())
            })?),
        };

        Ok(Paginator {
            resource,
            path,
            params,
            shape,
            pagesize,
            remaining,
            next_start: None,
            done: false,
        })
    }

    /// Fetch the next page; `None` once the view (or the limit) is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>> {
        if self.done {
            return Ok(None);
        }

        let want = match self.remaining {
            Some(remaining) => self.pagesize.min(usize::try_from(remaining).unwrap_or(usize::MAX)),
            None => self.pagesize,
        };
        if want == 0 {
            self.done = true;
            return Ok(None);
        }

        let mut params = self.params.clone();
        params.insert("limit".to_string(), Value::from(want + 1));
        if let Some((key, docid)) = &self.next_start {
            params.remove("start_key");
            params.insert("startkey".to_string(), key.clone());
            params.insert("startkey_docid".to_string(), Value::String(docid.clone()));
        }

        let path: Vec<&str> = self.path.iter().map(String::as_str).collect();
        let mut rows = fetch_rows(&self.resource, &path, encode_view_options(&params), None).await?;

        // skip applies to the first page only; later pages start at the boundary row
        self.params.remove("skip");

        if rows.len() > want {
            let boundary = rows.split_off(want);
            let row = &boundary[0];
            let docid = row.get("id").and_then(Value::as_str).ok_or_else(|| {
                CouchError::Unexpected("cannot paginate rows without a document id".to_string())
            })?;
            let key = row.get("key").cloned().unwrap_or(Value::Null);
            self.next_start = Some((key, docid.to_string()));
        } else {
            self.done = true;
        }

        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(rows.len() as u64);
            if *remaining == 0 {
                self.done = true;
            }
        }

        if rows.is_empty() {
            self.done = true;
            return Ok(None);
        }

        tracing::debug!(rows = rows.len(), more = !self.done, "view page fetched");
        Ok(Some(self.shape.apply(rows)))
    }

    /// Drain every remaining page into one vector.
    pub async fn collect_all(mut self) -> Result<Vec<Value>> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page);
        }
        Ok(all)
    }
}
