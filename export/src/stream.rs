use crate::sink::ArtifactSink;
use cloudstore::{ByteStream, Error, Result};
use futures_util::stream::StreamExt;
use std::io;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

/// Copy a streamed body into a sink, in writes of at most `chunk_size` bytes, returning the
/// sink's finalized size.  On any failure, including cancellation, the sink is aborted.
pub(crate) async fn copy_to_sink(
    name: &str,
    stream: ByteStream,
    sink: &mut dyn ArtifactSink,
    chunk_size: usize,
    cancel: &CancellationToken,
) -> Result<u64> {
    match copy_chunks(name, stream, sink, chunk_size, cancel).await {
        Ok(size) => Ok(size),
        Err(e) => {
            sink.abort().await;
            Err(e)
        }
    }
}

async fn copy_chunks(
    name: &str,
    stream: ByteStream,
    sink: &mut dyn ArtifactSink,
    chunk_size: usize,
    cancel: &CancellationToken,
) -> Result<u64> {
    // StreamReader wants io::Error; the original error is unwrapped again in `read_error`
    let stream = stream.map(|r| r.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
    let mut reader = StreamReader::new(stream);
    let mut buf = vec![0u8; chunk_size.max(1)];

    loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            r = reader.read(&mut buf) => r.map_err(|e| read_error(name, e))?,
        };
        if n == 0 {
            break;
        }
        sink.write(&buf[..n]).await?;
    }

    sink.finalize().await
}

fn read_error(name: &str, err: io::Error) -> Error {
    let kind = err.kind();
    match err.into_inner() {
        Some(inner) => match inner.downcast::<Error>() {
            Ok(e) => *e,
            Err(other) => Error::io(name, io::Error::new(kind, other)),
        },
        None => Error::io(name, kind.into()),
    }
}
