//! Producer task that feeds the resume file into the outbound body

use bytes::BytesMut;
use std::future::Future;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use super::pipe::PipeWriter;

/// Size of each read from the file source
pub const FILE_CHUNK_SIZE: usize = 32 * 1024;

/// Owns the producer task and aborts it when dropped.
///
/// The guard lives exactly as long as the request that needs the body: it is
/// held by the request future and, in streamed mode, by the response stream.
/// Dropping either on client disconnect cancels the producer.
#[derive(Debug)]
pub struct ProducerGuard {
    handle: JoinHandle<()>,
}

impl ProducerGuard {
    pub fn spawn<F>(task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(task),
        }
    }
}

impl Drop for ProducerGuard {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            tracing::debug!("Cancelling file producer");
            self.handle.abort();
        }
    }
}

/// Copy `source` into the pipe in [`FILE_CHUNK_SIZE`] reads, then close it.
///
/// A read failure closes the pipe with that error so the HTTP client fails
/// the request instead of sending a truncated file as if it were complete.
pub async fn produce_file<R>(pipe: PipeWriter, mut source: R)
where
    R: AsyncRead + Send + Unpin,
{
    let mut written = 0u64;

    loop {
        let mut buf = BytesMut::with_capacity(FILE_CHUNK_SIZE);
        let chunk = match source.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => buf.freeze(),
            Err(e) => {
                tracing::warn!(error = %e, file_bytes = written, "Aborting upload body");
                pipe.close_with_error(e).await;
                return;
            }
        };

        written += chunk.len() as u64;
        if let Err(e) = pipe.write(chunk).await {
            // The client dropped the body; nobody is left to tell.
            tracing::debug!(error = %e, file_bytes = written, "Upload body abandoned");
            return;
        }
    }

    tracing::debug!(file_bytes = written, "Upload body complete");
    pipe.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::pipe::body_pipe;
    use futures::StreamExt;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;
    use tokio::sync::oneshot;

    struct FailingReader;

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::other("disk went away")))
        }
    }

    #[tokio::test]
    async fn test_dropping_guard_aborts_task() {
        let (tx, rx) = oneshot::channel::<()>();

        let guard = ProducerGuard::spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await;
        });
        drop(guard);

        // The sender is dropped once the aborted task is torn down.
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_file_copied_in_order() {
        let (pipe, reader) = body_pipe(2);
        let data: Vec<u8> = (0..FILE_CHUNK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        let source = std::io::Cursor::new(data.clone());

        let _guard = ProducerGuard::spawn(produce_file(pipe, source));

        let mut body = Vec::new();
        let mut chunks = 0;
        let mut stream = reader.into_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            assert!(chunk.len() <= FILE_CHUNK_SIZE);
            body.extend_from_slice(&chunk);
            chunks += 1;
        }

        assert_eq!(body, data);
        assert!(chunks >= 4);
    }

    #[tokio::test]
    async fn test_empty_file_closes_cleanly() {
        let (pipe, reader) = body_pipe(1);

        let _guard = ProducerGuard::spawn(produce_file(pipe, &b""[..]));

        let chunks: Vec<io::Result<bytes::Bytes>> = reader.into_stream().collect().await;
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_read_failure_reaches_reader() {
        let (pipe, reader) = body_pipe(4);

        let _guard = ProducerGuard::spawn(produce_file(pipe, FailingReader));

        let results: Vec<io::Result<bytes::Bytes>> = reader.into_stream().collect().await;
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].as_ref().unwrap_err().to_string(),
            "disk went away"
        );
    }
}
