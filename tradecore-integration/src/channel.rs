use crate::Unrecoverable;
use std::fmt::Debug;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::warn;

/// A cheaply cloneable sender half of an unbounded mpsc channel.
#[derive(Debug, Clone)]
pub struct UnboundedTx<T> {
    tx: tokio::sync::mpsc::UnboundedSender<T>,
}

impl<T> UnboundedTx<T> {
    pub fn send(&self, item: T) -> Result<(), tokio::sync::mpsc::error::SendError<T>> {
        self.tx.send(item)
    }
}

impl<T> Unrecoverable for tokio::sync::mpsc::error::SendError<T> {
    fn is_unrecoverable(&self) -> bool {
        true
    }
}

/// Receiver half, exposed both as a blocking-free [`Stream`] (the common
/// case for the Market-Data Hub's subscriber fan-out) and via [`Self::recv`].
pub struct UnboundedRx<T> {
    rx: tokio::sync::mpsc::UnboundedReceiver<T>,
}

impl<T> UnboundedRx<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn into_stream(self) -> UnboundedReceiverStream<T> {
        UnboundedReceiverStream::new(self.rx)
    }
}

impl<T> Stream for UnboundedRx<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

pub fn unbounded<T>() -> (UnboundedTx<T>, UnboundedRx<T>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    (UnboundedTx { tx }, UnboundedRx { rx })
}

/// A [`UnboundedTx`] that disables itself the first time its receiver is
/// dropped, rather than returning an error on every subsequent send. Used by
/// fan-out publishers (Market-Data Hub subscribers, broker event streams)
/// where a slow or vanished consumer must not take down the publisher.
#[derive(Debug, Clone)]
pub struct DroppableTx<T> {
    state: DroppableState<T>,
}

#[derive(Debug, Clone)]
enum DroppableState<T> {
    Active(UnboundedTx<T>),
    Disabled,
}

impl<T: Debug> DroppableTx<T> {
    pub fn new(tx: UnboundedTx<T>) -> Self {
        Self {
            state: DroppableState::Active(tx),
        }
    }

    /// Send `item`, silently disabling this sender if the peer has hung up.
    /// Returns `true` while the channel is still active.
    pub fn send(&mut self, item: T) -> bool {
        let DroppableState::Active(tx) = &self.state else {
            return false;
        };
        if tx.send(item).is_err() {
            warn!(
                kind = std::any::type_name::<T>(),
                "receiver dropped, disabling channel"
            );
            self.state = DroppableState::Disabled;
            false
        } else {
            true
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, DroppableState::Active(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn droppable_tx_disables_after_receiver_drop() {
        let (tx, rx) = unbounded::<u32>();
        let mut tx = DroppableTx::new(tx);
        assert!(tx.send(1));
        drop(rx);
        assert!(!tx.send(2));
        assert!(!tx.is_active());
    }
}
