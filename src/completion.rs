use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project::pin_project;
use tokio::sync::oneshot;

use crate::DispatchError;

pub(crate) type Outcome<T> = Result<T, DispatchError>;

/// The write-once slot handed back by [`Throttler::submit`](crate::Throttler::submit).
///
/// Resolves once the call has actually been dispatched and finished, with whatever the operation
/// returned. Dropping it does not cancel the call: the call still runs in turn and its output is
/// discarded.
#[pin_project]
#[derive(Debug)]
#[must_use = "a Completion does nothing unless awaited, though the call runs regardless"]
pub struct Completion<T> {
    #[pin]
    receiver: oneshot::Receiver<Outcome<T>>,
}

/// The dispatch loop's end of a [`Completion`].
pub(crate) struct Resolver<T> {
    sender: oneshot::Sender<Outcome<T>>,
}

pub(crate) fn channel<T>() -> (Resolver<T>, Completion<T>) {
    let (sender, receiver) = oneshot::channel();
    (Resolver { sender }, Completion { receiver })
}

impl<T> Resolver<T> {
    /// Fill the slot. Consumes the resolver, so a call can only ever be resolved once.
    pub(crate) fn resolve(self, outcome: Outcome<T>) {
        // The originator may have dropped its handle; that's fine.
        let _ = self.sender.send(outcome);
    }
}

impl<T> Future for Completion<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.receiver.poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // The sender was dropped unresolved.
            Poll::Ready(Err(_)) => Poll::Ready(Err(DispatchError::Abandoned)),
        }
    }
}
