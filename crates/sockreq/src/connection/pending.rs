//! Future-based completion for virtual requests.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::error::{Result, SocketError};
use crate::response::ResponseEnvelope;

/// The eventual outcome of a virtual request.
///
/// Resolves when the server acknowledges the request. There is no timeout:
/// if the server never replies, the future never resolves. If the request is
/// removed from the queue or the transport discards its acknowledgment, the
/// future resolves to [`SocketError::Cancelled`].
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct PendingResponse {
    rx: oneshot::Receiver<Result<ResponseEnvelope>>,
}

impl PendingResponse {
    /// Create a completion callback and the future it resolves.
    pub(crate) fn pair() -> (impl FnOnce(Result<ResponseEnvelope>) + Send + 'static, Self) {
        let (tx, rx) = oneshot::channel();
        let complete = move |result| {
            // The caller may have dropped the future; nobody is left to tell.
            let _ = tx.send(result);
        };
        (complete, Self { rx })
    }

    /// Take the outcome if it has already arrived, without waiting.
    pub fn try_take(&mut self) -> Option<Result<ResponseEnvelope>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(SocketError::Cancelled)),
        }
    }
}

impl Future for PendingResponse {
    type Output = Result<ResponseEnvelope>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(SocketError::Cancelled)))
    }
}
