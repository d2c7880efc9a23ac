//! Database-level operations: documents, bulk writes, attachments, views
//! and changes.
//!
//! Methods that modify a document never mutate the caller's value; they
//! return an updated copy carrying the new `_rev`.
//!
//! # Examples
//!
//! ```ignore
//! use couchdb_http::{Server, ViewOptions};
//! use serde_json::json;
//!
//! let db = server.database("blog").await?;
//!
//! let post = db.save(&json!({"title": "Hello", "type": "post"})).await?;
//! let post = db.put_attachment(&post, "hi there", "note.txt", None).await?;
//!
//! let titles = db
//!     .query("posts/by_date", ViewOptions::new().descending(true).flat("value"))
//!     .await?;
//! ```

use crate::client::feed::{listen_feed, ChangesOptions, FeedReader};
use crate::client::resource::{RequestParts, Resource};
use crate::client::subscription::ChangesStream;
use crate::client::utils::{as_object_mut, doc_str, ensure_document_id, is_disabled};
use crate::client::view::{fetch_rows, keys_body, Paginator, RowShape, ViewOptions};
use crate::error::{CouchError, Result};
use crate::protocol::constants::{headers as couch_headers, paths};
use crate::protocol::{guess_content_type, id_to_path, parse_etag, path_from_name};
use crate::types::{BulkItem, ChangesList, DatabaseInfo, Document};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

/// Streamed attachment body.
pub type AttachmentStream = BoxStream<'static, Result<Bytes>>;

/// A handle to one database.
#[derive(Clone, Debug)]
pub struct Database {
    resource: Resource,
    name: String,
}

impl Database {
    pub(crate) fn new(server: &Resource, name: &str) -> Result<Self> {
        Ok(Database {
            resource: server.child(&[name])?,
            name: name.to_string(),
        })
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underlying resource, for endpoints without a dedicated method.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Whether a document exists.
    pub async fn contains(&self, id: &str) -> Result<bool> {
        match self.resource.head(&id_to_path(id), RequestParts::new()).await {
            Ok(response) => Ok(response.status < 206),
            Err(CouchError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Database metadata.
    pub async fn info(&self) -> Result<DatabaseInfo> {
        self.resource.get(&[], RequestParts::new()).await?.into_typed()
    }

    /// Number of live documents.
    pub async fn len(&self) -> Result<u64> {
        Ok(self.info().await?.doc_count)
    }

    /// Whether the database holds no live documents.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Fetch a document.
    pub async fn get(&self, id: &str) -> Result<Document> {
        self.get_with(id, Vec::<(String, String)>::new()).await
    }

    /// Fetch a document with query parameters (`rev`, `revs_info`, `conflicts`, ...).
    pub async fn get_with<I, K, V>(&self, id: &str, params: I) -> Result<Document>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.resource
            .get(&id_to_path(id), RequestParts::new().params(params))
            .await?
            .into_json()
    }

    /// Create or update a document.
    ///
    /// A document without `_id` gets a random one. Returns a copy with the
    /// new `_rev`; a stale `_rev` yields [`CouchError::Conflict`].
    pub async fn save(&self, doc: &Document) -> Result<Document> {
        let mut doc = doc.clone();
        let id = ensure_document_id(&mut doc)?;

        let result = self
            .resource
            .put(&id_to_path(&id), RequestParts::new().json(&doc)?)
            .await?
            .into_json()?;

        if let Some(rev) = result.get("rev").and_then(Value::as_str) {
            as_object_mut(&mut doc)?.insert("_rev".to_string(), Value::String(rev.to_string()));
        }
        tracing::debug!(db = %self.name, id = %id, "document saved");
        Ok(doc)
    }

    /// Save many documents in one request.
    ///
    /// With `transaction`, CouchDB applies all writes or none
    /// (`all_or_nothing`). Returns copies with ids and new revisions.
    pub async fn save_bulk(&self, docs: &[Document], transaction: bool) -> Result<Vec<Document>> {
        let mut docs = docs.to_vec();
        for doc in docs.iter_mut() {
            ensure_document_id(doc)?;
        }

        let results = self.bulk_docs(&docs, transaction).await?;
        for (doc, result) in docs.iter_mut().zip(results) {
            if let Some(rev) = result.rev {
                as_object_mut(doc)?.insert("_rev".to_string(), Value::String(rev));
            }
        }
        Ok(docs)
    }

    /// Delete a document by id, using its current revision.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let path = id_to_path(id);
        let head = self.resource.head(&path, RequestParts::new()).await?;
        let rev = head
            .header_str(&couch_headers::ETAG)
            .map(parse_etag)
            .ok_or_else(|| CouchError::Unexpected(format!("no ETag for document '{}'", id)))?;

        self.resource
            .delete(&path, RequestParts::new().param("rev", rev))
            .await?;
        tracing::debug!(db = %self.name, id, "document deleted");
        Ok(())
    }

    /// Delete a document given as a JSON object with `_id`.
    pub async fn delete_doc(&self, doc: &Document) -> Result<()> {
        let id = doc_str(doc, "_id")?;
        self.delete(id).await
    }

    /// Delete many documents in one request.
    ///
    /// Documents are marked `_deleted` unless they already say otherwise. Any
    /// per-document failure is reported as [`CouchError::Conflict`].
    pub async fn delete_bulk(&self, docs: &[Document], transaction: bool) -> Result<Vec<BulkItem>> {
        let mut docs = docs.to_vec();
        for doc in docs.iter_mut() {
            as_object_mut(doc)?
                .entry("_deleted")
                .or_insert(Value::Bool(true));
        }

        let results = self.bulk_docs(&docs, transaction).await?;
        if results.iter().any(|r| r.error.is_some()) {
            return Err(CouchError::Conflict("one or more docs are not saved".to_string()));
        }
        Ok(results)
    }

    async fn bulk_docs(&self, docs: &[Document], transaction: bool) -> Result<Vec<BulkItem>> {
        let parts = RequestParts::new()
            .param("all_or_nothing", if transaction { "true" } else { "false" })
            .json(&json!({ "docs": docs }))?;
        self.resource
            .post(&[paths::BULK_DOCS], parts)
            .await?
            .into_typed()
    }

    /// All documents via `_all_docs`.
    ///
    /// `include_docs` defaults to `true`; with `include_docs(false)` each item
    /// is `{"id", "rev"}`. `keys` switches to a POST; `pagesize` walks the
    /// index in pages.
    pub async fn all(&self, options: ViewOptions) -> Result<Vec<Value>> {
        let options = options.with_default("include_docs", true);
        let shape = RowShape::AllDocs {
            include_docs: !is_disabled(options.get("include_docs")),
            flat: options.flat_ref().map(str::to_string),
        };
        self.run_view(vec![paths::ALL_DOCS.to_string()], options, shape)
            .await
    }

    /// Remove index files no longer used by any design document.
    pub async fn cleanup(&self) -> Result<Value> {
        self.post_command(&[paths::VIEW_CLEANUP]).await
    }

    /// Ask the server to flush pending writes to disk.
    pub async fn commit(&self) -> Result<Value> {
        self.post_command(&[paths::ENSURE_FULL_COMMIT]).await
    }

    /// Compact the database file.
    ///
    /// Compacting write-heavy databases should be avoided; compaction may
    /// never catch up with the writes.
    pub async fn compact(&self) -> Result<Value> {
        self.post_command(&[paths::COMPACT]).await
    }

    /// Compact the view indexes of one design document.
    pub async fn compact_view(&self, ddoc: &str) -> Result<Value> {
        self.post_command(&[paths::COMPACT, ddoc]).await
    }

    async fn post_command(&self, path: &[&str]) -> Result<Value> {
        self.resource
            .post(path, RequestParts::new())
            .await?
            .into_json()
    }

    /// Every stored revision of a document.
    ///
    /// With `status` (usually `"available"`) only revisions in that state are
    /// fetched; `None` fetches all listed revisions.
    pub async fn revisions(&self, id: &str, status: Option<&str>) -> Result<Vec<Document>> {
        let doc = self.get_with(id, [("revs_info", "true")]).await?;
        let revs_info = doc
            .get("_revs_info")
            .and_then(Value::as_array)
            .ok_or_else(|| CouchError::Unexpected(format!("no _revs_info for document '{}'", id)))?;

        let mut revisions = Vec::new();
        for info in revs_info {
            let matches = match status {
                Some(status) => info.get("status").and_then(Value::as_str) == Some(status),
                None => true,
            };
            if !matches {
                continue;
            }
            if let Some(rev) = info.get("rev").and_then(Value::as_str) {
                revisions.push(self.get_with(id, [("rev", rev)]).await?);
            }
        }
        Ok(revisions)
    }

    /// Download an attachment of `doc` (at `doc._rev`).
    pub async fn get_attachment(&self, doc: &Document, filename: &str) -> Result<Bytes> {
        let response = self.attachment_response(doc, filename).await?;
        Ok(response.bytes().await?)
    }

    /// Download an attachment chunk by chunk.
    pub async fn get_attachment_stream(&self, doc: &Document, filename: &str) -> Result<AttachmentStream> {
        let response = self.attachment_response(doc, filename).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(CouchError::from))
            .boxed())
    }

    async fn attachment_response(&self, doc: &Document, filename: &str) -> Result<reqwest::Response> {
        let id = doc_str(doc, "_id")?;
        let rev = doc_str(doc, "_rev")?;
        let mut path = id_to_path(id);
        path.push(filename);

        let parts = RequestParts::new()
            .param("rev", rev)
            .header(ACCEPT, HeaderValue::from_static("*/*"));
        self.resource.stream(Method::GET, &path, parts).await
    }

    /// Upload an attachment and return the re-fetched document.
    ///
    /// The content type is guessed from `filename` when not given.
    pub async fn put_attachment(
        &self,
        doc: &Document,
        content: impl Into<Bytes>,
        filename: &str,
        content_type: Option<&str>,
    ) -> Result<Document> {
        if filename.is_empty() {
            return Err(CouchError::InvalidArgument("no filename specified for attachment".to_string()));
        }
        let id = doc_str(doc, "_id")?;
        let rev = doc_str(doc, "_rev")?;

        let content_type = content_type
            .map(str::to_string)
            .unwrap_or_else(|| guess_content_type(filename));
        let content_type = HeaderValue::from_str(&content_type)
            .map_err(|e| CouchError::InvalidArgument(format!("invalid content type: {}", e)))?;

        let mut path = id_to_path(id);
        path.push(filename);
        let parts = RequestParts::new()
            .param("rev", rev)
            .header(CONTENT_TYPE, content_type)
            .body(content);

        self.resource.put(&path, parts).await.map_err(|e| match e {
            CouchError::Generic { status, .. } => {
                CouchError::Conflict(format!("attachment upload failed with status {}", status))
            }
            other => other,
        })?;
        self.get(id).await
    }

    /// Remove an attachment; returns a copy of `doc` with the new `_rev`.
    pub async fn delete_attachment(&self, doc: &Document, filename: &str) -> Result<Document> {
        let id = doc_str(doc, "_id")?;
        let rev = doc_str(doc, "_rev")?;
        let mut path = id_to_path(id);
        path.push(filename);

        let result = self
            .resource
            .delete(&path, RequestParts::new().param("rev", rev))
            .await
            .map_err(|e| match e {
                CouchError::NotFound(_) => CouchError::NotFound(format!("filename {} not found", filename)),
                CouchError::BadRequest(reason) => CouchError::Conflict(reason),
                CouchError::Generic { status, body } => CouchError::Conflict(
                    body.get("reason")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("attachment delete failed with status {}", status)),
                ),
                other => other,
            })?
            .into_json()?;
        let new_rev = result
            .get("rev")
            .and_then(Value::as_str)
            .ok_or_else(|| CouchError::Unexpected("attachment delete returned no rev".to_string()))?;

        let mut doc = doc.clone();
        let object = as_object_mut(&mut doc)?;
        object.insert("_rev".to_string(), Value::String(new_rev.to_string()));
        let now_empty = match object.get_mut("_attachments").and_then(Value::as_object_mut) {
            Some(attachments) => {
                attachments.remove(filename);
                attachments.is_empty()
            }
            None => false,
        };
        if now_empty {
            object.remove("_attachments");
        }
        Ok(doc)
    }

    /// First row of a view, if any.
    pub async fn one(&self, name: &str, options: ViewOptions) -> Result<Option<Value>> {
        let options = options.with_default("limit", 1);
        Ok(self.query(name, options).await?.into_iter().next())
    }

    /// Query a design-document view (`ddoc/view`).
    ///
    /// With `pagesize`, the view is fetched page by page and every page is
    /// collected; use [`Database::query_pages`] to consume pages lazily.
    pub async fn query(&self, name: &str, options: ViewOptions) -> Result<Vec<Value>> {
        let path = path_from_name(name, paths::VIEW)?;
        let shape = RowShape::View {
            flat: options.flat_ref().map(str::to_string),
        };
        self.run_view(path, options, shape).await
    }

    /// Query a view and deserialize each row (or projected field).
    pub async fn query_as<T: DeserializeOwned>(&self, name: &str, options: ViewOptions) -> Result<Vec<T>> {
        self.query(name, options)
            .await?
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(CouchError::from))
            .collect()
    }

    /// Page-by-page iteration over a view; `options` must set `pagesize`.
    pub fn query_pages(&self, name: &str, options: ViewOptions) -> Result<Paginator> {
        let path = path_from_name(name, paths::VIEW)?;
        let shape = RowShape::View {
            flat: options.flat_ref().map(str::to_string),
        };
        Paginator::new(self.resource.clone(), path, options, shape)
    }

    /// Run an ad-hoc map/reduce view (`_temp_view`, CouchDB 1.x only).
    pub async fn temporary_query(
        &self,
        map_fn: &str,
        reduce_fn: Option<&str>,
        language: &str,
        options: ViewOptions,
    ) -> Result<Vec<Value>> {
        let mut body = Map::new();
        body.insert("map".to_string(), Value::String(map_fn.to_string()));
        body.insert("language".to_string(), Value::String(language.to_string()));
        if let Some(reduce_fn) = reduce_fn {
            body.insert("reduce".to_string(), Value::String(reduce_fn.to_string()));
        }
        if let Some(keys) = options.keys_ref() {
            body.insert("keys".to_string(), Value::Array(keys.clone()));
        }

        let shape = RowShape::View {
            flat: options.flat_ref().map(str::to_string),
        };
        let rows = fetch_rows(
            &self.resource,
            &[paths::TEMP_VIEW],
            options.encoded(),
            Some(Value::Object(body)),
        )
        .await?;
        Ok(shape.apply(rows))
    }

    async fn run_view(
        &self,
        path: Vec<String>,
        options: ViewOptions,
        shape: RowShape,
    ) -> Result<Vec<Value>> {
        if options.pagesize_ref().is_some() {
            return Paginator::new(self.resource.clone(), path, options, shape)?
                .collect_all()
                .await;
        }

        let body = keys_body(options.keys_ref());
        let path: Vec<&str> = path.iter().map(String::as_str).collect();
        let rows = fetch_rows(&self.resource, &path, options.encoded(), body).await?;
        Ok(shape.apply(rows))
    }

    /// Listen to this database's `_changes` feed.
    ///
    /// Blocks the calling task until the reader stops or the server closes
    /// the feed.
    pub async fn changes_feed<R: FeedReader>(&self, reader: &mut R, options: ChangesOptions) -> Result<()> {
        listen_feed(&self.resource, paths::CHANGES, reader, options).await
    }

    /// This database's `_changes` feed as a stream.
    pub async fn changes_stream(&self, options: ChangesOptions) -> Result<ChangesStream> {
        ChangesStream::open(&self.resource, paths::CHANGES, options).await
    }

    /// One-shot list of changes.
    pub async fn changes_list(&self, options: ChangesOptions) -> Result<ChangesList> {
        let (method, parts) = options.into_request()?;
        self.resource
            .request(method, &[paths::CHANGES], parts)
            .await?
            .into_typed()
    }
}
