use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf, Result as IoResult};

/// Stops reading once `until` resolves, reporting end-of-stream to the caller.
///
/// Step log readers wrap their byte source with the cancellation future so a shutdown
/// ends the read loop the same way a finished container does, and the source (a
/// `kubectl logs -f` child, for instance) is dropped with the reader.
pub trait AsyncReadExt: AsyncRead {
    /// Wrap `self` so reads end once `until` resolves.
    fn read_until_future<F>(self, until: F) -> ReadUntil<Self, F>
    where
        Self: Sized,
        F: Future<Output = ()>,
    {
        ReadUntil {
            reader: self,
            until,
            stopped: false,
        }
    }
}

impl<S> AsyncReadExt for S where S: AsyncRead {}

/// Reader returned by [`AsyncReadExt::read_until_future`].
#[pin_project]
#[derive(Debug)]
pub struct ReadUntil<S, F> {
    #[pin]
    reader: S,
    #[pin]
    until: F,
    stopped: bool,
}

impl<S, F> ReadUntil<S, F> {
    /// Whether the stop future fired; later reads keep returning end-of-stream.
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl<S, F> AsyncRead for ReadUntil<S, F>
where
    S: AsyncRead,
    F: Future<Output = ()>,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<IoResult<()>> {
        let this = self.project();

        if *this.stopped {
            return Poll::Ready(Ok(()));
        }

        match this.until.poll(cx) {
            Poll::Ready(()) => {
                *this.stopped = true;
                Poll::Ready(Ok(()))
            }
            Poll::Pending => this.reader.poll_read(cx, buf),
        }
    }
}
