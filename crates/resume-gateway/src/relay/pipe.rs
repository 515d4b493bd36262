//! In-memory byte pipe between the file producer and the HTTP client
//!
//! The writer half is owned by exactly one producer task. The reader half
//! becomes the outbound request body. The channel is bounded, so a write
//! suspends until the client has drained earlier chunks onto the wire.

use bytes::Bytes;
use std::io;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

type Chunk = io::Result<Bytes>;

/// Create a bounded pipe holding at most `capacity` chunks in flight
pub fn body_pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (PipeWriter { tx }, PipeReader { rx })
}

/// Producer half of the pipe
#[derive(Debug)]
pub struct PipeWriter {
    tx: mpsc::Sender<Chunk>,
}

impl PipeWriter {
    /// Hand one chunk to the reader, waiting for room in the pipe.
    ///
    /// Fails with `BrokenPipe` once the reader has been dropped.
    pub async fn write(&self, chunk: Bytes) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }

        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "body pipe reader dropped"))
    }

    /// Close the pipe cleanly; the reader observes end of stream
    pub fn close(self) {
        drop(self);
    }

    /// Close the pipe with an error; the reader observes it as a read failure
    pub async fn close_with_error(self, err: io::Error) {
        // A dropped reader has nothing left to observe.
        let _ = self.tx.send(Err(err)).await;
    }
}

/// Consumer half of the pipe
#[derive(Debug)]
pub struct PipeReader {
    rx: mpsc::Receiver<Chunk>,
}

impl PipeReader {
    pub fn into_stream(self) -> ReceiverStream<Chunk> {
        ReceiverStream::new(self.rx)
    }

    /// Turn the reader into a streaming request body
    pub fn into_body(self) -> reqwest::Body {
        reqwest::Body::wrap_stream(self.into_stream())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_chunks_arrive_in_order_then_eof() {
        let (writer, reader) = body_pipe(2);

        let producer = tokio::spawn(async move {
            for part in ["alpha", "beta", "gamma"] {
                writer.write(Bytes::from(part)).await.unwrap();
            }
            writer.close();
        });

        let chunks: Vec<Chunk> = reader.into_stream().collect().await;
        producer.await.unwrap();

        let data: Vec<Bytes> = chunks.into_iter().map(|c| c.unwrap()).collect();
        assert_eq!(data, vec!["alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn test_close_with_error_surfaces_to_reader() {
        let (writer, reader) = body_pipe(4);

        writer.write(Bytes::from_static(b"head")).await.unwrap();
        writer
            .close_with_error(io::Error::other("source vanished"))
            .await;

        let mut stream = reader.into_stream();
        assert_eq!(stream.next().await.unwrap().unwrap(), "head");

        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "source vanished");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_write_after_reader_dropped_is_broken_pipe() {
        let (writer, reader) = body_pipe(1);
        drop(reader);

        let err = writer.write(Bytes::from_static(b"x")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_empty_chunks_are_skipped() {
        let (writer, reader) = body_pipe(1);

        writer.write(Bytes::new()).await.unwrap();
        writer.write(Bytes::from_static(b"data")).await.unwrap();
        writer.close();

        let chunks: Vec<Chunk> = reader.into_stream().collect().await;
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_raised() {
        let (writer, reader) = body_pipe(0);
        writer.write(Bytes::from_static(b"ok")).await.unwrap();
        writer.close();

        let chunks: Vec<Chunk> = reader.into_stream().collect().await;
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_writer_waits_for_reader() {
        let (writer, reader) = body_pipe(1);
        writer.write(Bytes::from_static(b"first")).await.unwrap();

        // The pipe is full; the second write only completes once the reader drains.
        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            writer.write(Bytes::from_static(b"second")),
        )
        .await;
        assert!(pending.is_err());

        let mut stream = reader.into_stream();
        assert_eq!(stream.next().await.unwrap().unwrap(), "first");
        writer.write(Bytes::from_static(b"second")).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "second");
    }
}
