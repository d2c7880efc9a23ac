//! Changes-feed readers.
//!
//! [`listen_feed`] opens a feed and hands every event to a [`FeedReader`].
//! The reader decides after each event whether to keep listening; returning
//! [`FeedControl::Stop`] closes the connection cleanly and is not an error.
//!
//! # Examples
//!
//! ## A closure as reader
//!
//! ```ignore
//! use couchdb_http::client::{feed_reader_fn, ChangesOptions, FeedControl};
//!
//! let mut seen = 0;
//! db.changes_feed(
//!     &mut feed_reader_fn(|change| {
//!         seen += 1;
//!         println!("{}", change["id"]);
//!         Ok(if seen == 10 { FeedControl::Stop } else { FeedControl::Continue })
//!     }),
//!     ChangesOptions::new().since("now").heartbeat(5_000),
//! )
//! .await?;
//! ```
//!
//! ## A stateful reader
//!
//! ```ignore
//! use couchdb_http::client::{FeedControl, FeedReader};
//! use couchdb_http::Result;
//! use serde_json::Value;
//!
//! struct Counter { messages: usize, heartbeats: usize }
//!
//! impl FeedReader for Counter {
//!     fn on_message(&mut self, _message: Value) -> Result<FeedControl> {
//!         self.messages += 1;
//!         Ok(FeedControl::Continue)
//!     }
//!
//!     fn on_heartbeat(&mut self) -> Result<FeedControl> {
//!         self.heartbeats += 1;
//!         Ok(FeedControl::Continue)
//!     }
//! }
//! ```

use crate::client::parser::{FeedLine, LineParser};
use crate::client::resource::{check_result, RequestParts, Resource};
use crate::client::utils::query_value;
use crate::error::{CouchError, Result};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Method;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, VecDeque};

/// What a reader wants after handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedControl {
    /// Keep reading
    Continue,
    /// Close the feed
    Stop,
}

/// Callbacks invoked while a feed is open.
pub trait FeedReader {
    /// A change (or database update) event arrived.
    fn on_message(&mut self, message: Value) -> Result<FeedControl>;

    /// The server sent a keep-alive newline.
    fn on_heartbeat(&mut self) -> Result<FeedControl> {
        Ok(FeedControl::Continue)
    }

    /// The feed ended: the reader stopped, the server closed the stream, or
    /// an error is about to be returned.
    fn on_close(&mut self) {}
}

/// Adapts a closure into a [`FeedReader`]; heartbeats and close are ignored.
pub struct SimpleFeedReader<F> {
    callback: F,
}

impl<F> SimpleFeedReader<F>
where
    F: FnMut(Value) -> Result<FeedControl>,
{
    /// Wrap `callback`.
    pub fn new(callback: F) -> Self {
        SimpleFeedReader { callback }
    }
}

impl<F> FeedReader for SimpleFeedReader<F>
where
    F: FnMut(Value) -> Result<FeedControl>,
{
    fn on_message(&mut self, message: Value) -> Result<FeedControl> {
        (self.callback)(message)
    }
}

/// Shorthand for [`SimpleFeedReader::new`].
pub fn feed_reader_fn<F>(callback: F) -> SimpleFeedReader<F>
where
    F: FnMut(Value) -> Result<FeedControl>,
{
    SimpleFeedReader::new(callback)
}

/// Feed types this client knows how to read.
const SUPPORTED_FEEDS: &[&str] = &["continuous", "longpoll", "normal"];

/// Options for `_changes` and `_db_updates` requests.
///
/// # Examples
///
/// ```
/// use couchdb_http::client::ChangesOptions;
///
/// let options = ChangesOptions::new()
///     .since("now")
///     .include_docs(true)
///     .doc_ids(["a", "b"]);
/// assert!(options.is_continuous());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChangesOptions {
    params: BTreeMap<String, String>,
    body: Map<String, Value>,
}

impl ChangesOptions {
    /// No options: a continuous feed from the beginning when listened to.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an arbitrary query parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), query_value(&value.into()));
        self
    }

    /// Feed type: `continuous`, `longpoll` or `normal`.
    ///
    /// Other types, such as `eventsource`, are rejected with
    /// [`CouchError::InvalidArgument`] when the request is made.
    pub fn feed(self, feed: &str) -> Self {
        self.param("feed", feed)
    }

    /// Start after this sequence; `"now"` skips history.
    pub fn since(self, since: impl Into<Value>) -> Self {
        self.param("since", since)
    }

    /// Maximum number of events.
    pub fn limit(self, limit: u64) -> Self {
        self.param("limit", limit)
    }

    /// Heartbeat interval in milliseconds.
    pub fn heartbeat(self, millis: u64) -> Self {
        self.param("heartbeat", millis)
    }

    /// Close an idle feed after this many milliseconds.
    pub fn timeout(self, millis: u64) -> Self {
        self.param("timeout", millis)
    }

    /// Embed each changed document.
    pub fn include_docs(self, include_docs: bool) -> Self {
        self.param("include_docs", include_docs)
    }

    /// Newest changes first.
    pub fn descending(self, descending: bool) -> Self {
        self.param("descending", descending)
    }

    /// Filter function (`ddoc/filter`) or built-in filter name.
    pub fn filter(self, filter: &str) -> Self {
        self.param("filter", filter)
    }

    /// `main_only` or `all_docs` leaf revisions.
    pub fn style(self, style: &str) -> Self {
        self.param("style", style)
    }

    /// Only report changes to these documents.
    pub fn doc_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids = ids.into_iter().map(|id| Value::String(id.into())).collect();
        self.body.insert("doc_ids".to_string(), Value::Array(ids));
        self.filter("_doc_ids")
    }

    /// Only report documents matching a Mango selector.
    pub fn selector(mut self, selector: Value) -> Self {
        self.body.insert("selector".to_string(), selector);
        self.filter("_selector")
    }

    /// Whether listening with these options yields a line-per-event stream.
    pub fn is_continuous(&self) -> bool {
        self.params.get("feed").map_or(true, |feed| feed == "continuous")
    }

    /// A previously set parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// GET when only query parameters are set, POST when a body filter is present.
    pub(crate) fn into_request(self) -> Result<(Method, RequestParts)> {
        if let Some(feed) = self.params.get("feed") {
            if !SUPPORTED_FEEDS.contains(&feed.as_str()) {
                return Err(CouchError::InvalidArgument(format!("unsupported feed type: {}", feed)));
            }
        }
        let parts = RequestParts::new().params(self.params);
        if self.body.is_empty() {
            Ok((Method::GET, parts))
        } else {
            Ok((Method::POST, parts.json(&Value::Object(self.body))?))
        }
    }

    fn with_feed_default(mut self) -> Self {
        self.params
            .entry("feed".to_string())
            .or_insert_with(|| "continuous".to_string());
        self
    }
}

enum Source {
    Lines {
        stream: BoxStream<'static, reqwest::Result<Bytes>>,
        parser: LineParser,
        pending: VecDeque<FeedLine>,
        finished: bool,
    },
    Batch(VecDeque<Value>),
}

/// An open feed yielding one [`FeedLine`] at a time.
pub(crate) struct FeedSource {
    source: Source,
}

impl FeedSource {
    /// Open `node` with `options`, defaulting to a continuous feed.
    pub(crate) async fn open(resource: &Resource, node: &str, options: ChangesOptions) -> Result<Self> {
        let options = options.with_feed_default();
        let continuous = options.is_continuous();
        let (method, parts) = options.into_request()?;
        let response = resource.stream(method, &[node], parts).await?;
        tracing::debug!(node, continuous, "feed opened");

        let source = if continuous {
            Source::Lines {
                stream: response.bytes_stream().boxed(),
                parser: LineParser::new(),
                pending: VecDeque::new(),
                finished: false,
            }
        } else {
            // longpoll/normal answers are one JSON document listing every result
            let body: Value = response.json().await?;
            check_result(200, Some(&body))?;
            let events = match body {
                Value::Object(mut map) => match map.remove("results") {
                    Some(Value::Array(results)) => results,
                    _ => vec![Value::Object(map)],
                },
                other => vec![other],
            };
            Source::Batch(events.into())
        };

        Ok(FeedSource { source })
    }

    /// Next line, or `None` when the server has closed the feed.
    pub(crate) async fn next_line(&mut self) -> Result<Option<FeedLine>> {
        match &mut self.source {
            Source::Batch(events) => Ok(events.pop_front().map(FeedLine::Message)),
            Source::Lines {
                stream,
                parser,
                pending,
                finished,
            } => loop {
                if let Some(line) = pending.pop_front() {
                    return Ok(Some(line));
                }
                if *finished {
                    return Ok(None);
                }
                match stream.next().await {
                    Some(chunk) => pending.extend(parser.feed(&chunk?)?),
                    None => {
                        *finished = true;
                        pending.extend(parser.finish()?);
                    }
                }
            },
        }
    }
}

/// Listen on a feed endpoint (`_changes`, `_db_updates`) until the reader
/// stops or the server closes the stream.
///
/// `feed` defaults to `continuous`. `on_close` is always called once the
/// feed has been opened, including when an error ends it.
pub async fn listen_feed<R: FeedReader>(
    resource: &Resource,
    node: &str,
    reader: &mut R,
    options: ChangesOptions,
) -> Result<()> {
    let mut source = FeedSource::open(resource, node, options).await?;
    let outcome = pump(&mut source, reader).await;
    reader.on_close();
    tracing::debug!(node, ok = outcome.is_ok(), "feed closed");
    outcome
}

async fn pump<R: FeedReader>(source: &mut FeedSource, reader: &mut R) -> Result<()> {
    while let Some(line) = source.next_line().await? {
        let control = match line {
            FeedLine::Heartbeat => reader.on_heartbeat()?,
            FeedLine::Message(message) => reader.on_message(message)?,
        };
        if control == FeedControl::Stop {
            break;
        }
    }
    Ok(())
}
