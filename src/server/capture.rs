use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::BytesMut;
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, ReadBuf};

pin_project! {
    /// Read-side tee: every byte handed to the parser is mirrored into a
    /// side buffer, so a failed parse can be logged with the raw request.
    pub(crate) struct CaptureReader<R> {
        #[pin]
        inner: R,
        captured: BytesMut,
    }
}

impl<R> CaptureReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            captured: BytesMut::new(),
        }
    }

    pub(crate) fn captured(&self) -> &[u8] {
        &self.captured
    }
}

impl<R> AsyncRead for CaptureReader<R>
where
    R: AsyncRead,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let filled_before = buf.filled().len();
        ready!(this.inner.poll_read(cx, buf))?;
        this.captured.extend_from_slice(&buf.filled()[filled_before..]);
        Poll::Ready(Ok(()))
    }
}
