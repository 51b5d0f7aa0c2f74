//! Payload readers handed out by stores.
//!
//! A store returns a [`ContentReader`]: an async reader that also carries a
//! release hook. The stream writer takes a [`ByteSource`] so plain readers and
//! releasable ones travel the same path.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::fs::File;
use tokio::io::{AsyncRead, ReadBuf};

/// A readable resource that must be explicitly released when the reader is done.
///
/// Stores hand out payloads through this trait so that callers never have to
/// probe whether a reader also needs closing. `release` is called exactly once
/// by whoever consumes the reader.
pub trait ReleasableRead: AsyncRead + Send + Unpin {
    /// Release the underlying resource (file handle, connection, lease).
    fn release(&mut self) -> io::Result<()>;
}

/// Payload reader returned by the store contract.
pub type ContentReader = Box<dyn ReleasableRead>;

/// A byte source handed to the stream writer.
///
/// `Readable` is a plain reader with nothing to release; `Releasable` carries
/// a release hook that the stream writer runs on every exit path.
pub enum ByteSource {
    Readable(Box<dyn AsyncRead + Send + Unpin>),
    Releasable(ContentReader),
}

impl ByteSource {
    pub fn readable(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        ByteSource::Readable(Box::new(reader))
    }

    pub fn releasable(reader: impl ReleasableRead + 'static) -> Self {
        ByteSource::Releasable(Box::new(reader))
    }

    /// Consume the source, running its release hook if it has one.
    pub fn release(self) -> io::Result<()> {
        match self {
            ByteSource::Readable(_) => Ok(()),
            ByteSource::Releasable(mut reader) => reader.release(),
        }
    }
}

impl From<ContentReader> for ByteSource {
    fn from(reader: ContentReader) -> Self {
        ByteSource::Releasable(reader)
    }
}

impl AsyncRead for ByteSource {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ByteSource::Readable(reader) => Pin::new(reader).poll_read(cx, buf),
            ByteSource::Releasable(reader) => Pin::new(reader).poll_read(cx, buf),
        }
    }
}

/// A payload file on local disk. `release` closes the handle.
pub struct FileContent {
    file: Option<File>,
}

impl FileContent {
    pub fn new(file: File) -> Self {
        Self { file: Some(file) }
    }
}

impl AsyncRead for FileContent {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut().file.as_mut() {
            Some(file) => Pin::new(file).poll_read(cx, buf),
            None => Poll::Ready(Err(io::Error::other("read from released file"))),
        }
    }
}

impl ReleasableRead for FileContent {
    fn release(&mut self) -> io::Result<()> {
        match self.file.take() {
            Some(file) => {
                drop(file);
                Ok(())
            }
            None => Err(io::Error::other("file content already released")),
        }
    }
}
