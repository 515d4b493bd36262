//! Chunk-by-chunk relay of a downstream response body

use bytes::Bytes;
use futures::stream::Stream;
use std::convert::Infallible;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::producer::ProducerGuard;

/// Frame appended when the downstream body fails mid-stream.
///
/// The leading blank line terminates any partially forwarded event so the
/// marker is always parsed as an event of its own.
pub const STREAM_ERROR_EVENT: &[u8] =
    b"\n\nevent: error\ndata: {\"error\":\"ml stream interrupted\"}\n\n";

/// Forwards downstream chunks unchanged and in order.
///
/// The stream ends on downstream EOF or on the first read error. With the
/// sentinel enabled a read error yields [`STREAM_ERROR_EVENT`] before the end,
/// so a client can tell an interrupted stream from a completed one.
///
/// Dropping the stream drops the downstream body (closing that connection) and
/// the producer guard.
pub struct RelayStream<S> {
    inner: S,
    emit_sentinel: bool,
    done: bool,
    bytes_forwarded: u64,
    _producer: Option<ProducerGuard>,
}

impl<S> RelayStream<S> {
    pub fn new(inner: S, emit_sentinel: bool) -> Self {
        Self {
            inner,
            emit_sentinel,
            done: false,
            bytes_forwarded: 0,
            _producer: None,
        }
    }

    /// Keep the producer alive for as long as the stream is consumed
    pub(crate) fn with_producer(mut self, producer: ProducerGuard) -> Self {
        self._producer = Some(producer);
        self
    }

    pub fn bytes_forwarded(&self) -> u64 {
        self.bytes_forwarded
    }
}

impl<S, E> Stream for RelayStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        if this.done {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                this.bytes_forwarded += bytes.len() as u64;
                Poll::Ready(Some(Ok(bytes)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.done = true;
                tracing::warn!(
                    error = %e,
                    bytes_forwarded = this.bytes_forwarded,
                    "Downstream stream interrupted"
                );
                if this.emit_sentinel {
                    Poll::Ready(Some(Ok(Bytes::from_static(STREAM_ERROR_EVENT))))
                } else {
                    Poll::Ready(None)
                }
            }
            Poll::Ready(None) => {
                this.done = true;
                tracing::debug!(
                    bytes_forwarded = this.bytes_forwarded,
                    "Downstream stream completed"
                );
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::{self, StreamExt};

    fn chunks(
        items: Vec<Result<&'static str, &'static str>>,
    ) -> impl Stream<Item = Result<Bytes, String>> + Unpin {
        stream::iter(items.into_iter().map(|item| {
            item.map(|s| Bytes::from_static(s.as_bytes()))
                .map_err(str::to_string)
        }))
    }

    async fn drain<S>(stream: RelayStream<S>) -> (Vec<u8>, u64)
    where
        S: Stream<Item = Result<Bytes, String>> + Unpin,
    {
        let mut stream = stream;
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        (out, stream.bytes_forwarded())
    }

    #[tokio::test]
    async fn test_forwards_all_chunks_in_order() {
        let inner = chunks(vec![Ok("data: a\n\n"), Ok("data: b\n\n"), Ok("data: [DONE]\n\n")]);

        let (out, forwarded) = drain(RelayStream::new(inner, true)).await;

        assert_eq!(out, b"data: a\n\ndata: b\n\ndata: [DONE]\n\n");
        assert_eq!(forwarded, out.len() as u64);
    }

    #[tokio::test]
    async fn test_error_emits_sentinel_and_stops() {
        let inner = chunks(vec![Ok("data: a\n\n"), Err("connection reset"), Ok("never")]);

        let (out, forwarded) = drain(RelayStream::new(inner, true)).await;

        let mut expected = b"data: a\n\n".to_vec();
        expected.extend_from_slice(STREAM_ERROR_EVENT);
        assert_eq!(out, expected);
        assert_eq!(forwarded, 9);
    }

    #[tokio::test]
    async fn test_error_without_sentinel_ends_silently() {
        let inner = chunks(vec![Ok("data: a"), Err("connection reset"), Ok("never")]);

        let (out, _) = drain(RelayStream::new(inner, false)).await;

        assert_eq!(out, b"data: a");
    }

    #[tokio::test]
    async fn test_clean_eof_has_no_sentinel() {
        let inner = chunks(vec![]);

        let (out, forwarded) = drain(RelayStream::new(inner, true)).await;

        assert!(out.is_empty());
        assert_eq!(forwarded, 0);
    }

    #[tokio::test]
    async fn test_dropping_stream_cancels_producer() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let producer = ProducerGuard::spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await;
        });

        let stream = RelayStream::new(chunks(vec![Ok("x")]), true).with_producer(producer);
        drop(stream);

        assert!(rx.await.is_err());
    }
}
