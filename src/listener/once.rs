use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::record::EventRecord;

/// Future returned by `once`: the next record of the awaited kind.
///
/// Resolves to `None` if the registry is dropped before a match arrives.
pub struct Once {
    rx: oneshot::Receiver<EventRecord>,
}

impl Once {
    pub(super) fn new(rx: oneshot::Receiver<EventRecord>) -> Self {
        Once { rx }
    }
}

impl Future for Once {
    type Output = Option<EventRecord>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(Result::ok)
    }
}
