//! Pull-based streaming consumer.
//!
//! The stream issues one `poll_one` per item the consumer asks for and never
//! has more than one request in flight, so a slow consumer naturally slows
//! down consumption from the queue.
//!
//! End of stream means that no message arrived within the last poll's wait,
//! not that the queue is gone. Long-lived consumers should treat it as
//! "drained for now" and create a new stream later. A backend error is
//! yielded once and ends the stream.

use crate::error::QueueError;
use crate::message::PeekOptions;
use crate::queue::Queue;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;

/// Stream of message bodies consumed from a queue
pub type MessageStream = BoxStream<'static, Result<Value, QueueError>>;

impl Queue {
    /// Stream message bodies, polling with default options (no wait)
    pub fn stream(&self) -> MessageStream {
        body_stream(self.clone(), PeekOptions::default())
    }

    /// Stream message bodies, polling with `options` for each item.
    ///
    /// `options.limit` is ignored; each pull takes a single message.
    pub fn stream_with(&self, options: PeekOptions) -> Result<MessageStream, QueueError> {
        let options = options.with_limit(1);
        options.validate()?;
        Ok(body_stream(self.clone(), options))
    }
}

fn body_stream(queue: Queue, options: PeekOptions) -> MessageStream {
    stream::try_unfold(queue, move |queue| {
        let options = options.clone();
        async move {
            let next = queue.poll_one(options).await?;
            Ok::<_, QueueError>(next.map(|message| (message.body, queue)))
        }
    })
    .boxed()
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
