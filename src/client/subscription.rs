//! Changes feed as an async [`Stream`].
//!
//! Where [`listen_feed`](crate::client::listen_feed) drives callbacks, a
//! [`ChangesStream`] hands events to the caller one by one. A background task
//! reads the HTTP response and forwards events through a bounded channel, so
//! a slow consumer applies backpressure to the connection instead of
//! buffering without limit.
//!
//! Heartbeats are consumed by the background task and never surface.
//!
//! # Examples
//!
//! ```ignore
//! use couchdb_http::client::ChangesOptions;
//! use futures::StreamExt;
//!
//! let mut changes = db.changes_stream(ChangesOptions::new().since("now")).await?;
//! while let Some(change) = changes.next().await {
//!     let change = change?;
//!     println!("{} changed", change["id"]);
//! }
//! ```
//!
//! Dropping the stream closes the connection, even while only heartbeats
//! are arriving.

use crate::client::feed::{ChangesOptions, FeedSource};
use crate::client::parser::FeedLine;
use crate::client::resource::Resource;
use crate::error::Result;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Events buffered between the reading task and the consumer.
const CHANNEL_CAPACITY: usize = 100;

/// A live changes feed.
///
/// Yields `Ok(event)` per change, at most one `Err` if the feed breaks, and
/// `None` once the server closes the feed.
pub struct ChangesStream {
    receiver: ReceiverStream<Result<Value>>,
}

impl ChangesStream {
    /// Open `node` and start forwarding its events.
    ///
    /// Errors opening the feed (unknown database, bad options) are returned
    /// here rather than through the stream.
    pub(crate) async fn open(resource: &Resource, node: &str, options: ChangesOptions) -> Result<Self> {
        let mut source = FeedSource::open(resource, node, options).await?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let node = node.to_string();

        tokio::spawn(async move {
            loop {
                // heartbeats keep the socket busy, so watch for the consumer going away
                let line = tokio::select! {
                    line = source.next_line() => line,
                    _ = tx.closed() => break,
                };
                let item = match line {
                    Ok(Some(FeedLine::Heartbeat)) => continue,
                    Ok(Some(FeedLine::Message(message))) => Ok(message),
                    Ok(None) => break,
                    Err(e) => Err(e),
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() {
                    // receiver dropped
                    break;
                }
                if failed {
                    break;
                }
            }
            tracing::debug!(node = %node, "changes stream finished");
        });

        Ok(Self::new(rx))
    }

    /// Wrap a receiver of feed events.
    pub fn new(receiver: mpsc::Receiver<Result<Value>>) -> Self {
        ChangesStream {
            receiver: ReceiverStream::new(receiver),
        }
    }

    /// Receive the next event; `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<Result<Value>> {
        futures::StreamExt::next(&mut self.receiver).await
    }
}

impl Stream for ChangesStream {
    type Item = Result<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}
