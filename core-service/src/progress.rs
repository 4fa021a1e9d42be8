//! Progress records of a running batch as a `futures::Stream`.
//!
//! Delivery is acknowledgement-driven: the batch does not start its next
//! item until the current record has been taken and the consumer asks for
//! the following one (or drops the stream). A cancel issued between two
//! `next()` calls therefore stops the batch at the very next boundary, on
//! any runtime flavor.

use crate::error::Result;
use core_reconcile::{AutoRelocateOutcome, BatchProgress, BatchResult, OperationId};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One record on its way to the consumer, with the sender side of its ack.
#[derive(Debug)]
pub(crate) struct ProgressUpdate {
    progress: BatchProgress,
    ack: oneshot::Sender<()>,
}

/// Producer half held by the batch.
#[derive(Debug, Clone)]
pub(crate) struct ProgressSender {
    sender: mpsc::Sender<ProgressUpdate>,
}

impl ProgressSender {
    /// Hand `progress` to the consumer and wait until it is acknowledged or
    /// the batch is cancelled.
    ///
    /// Returns immediately when the stream has been dropped.
    pub(crate) async fn deliver(&self, progress: BatchProgress, cancelled: CancellationToken) {
        let (ack, acked) = oneshot::channel();
        if self
            .sender
            .send(ProgressUpdate { progress, ack })
            .await
            .is_err()
        {
            return;
        }

        tokio::select! {
            _ = acked => {}
            _ = cancelled.cancelled() => {}
        }
    }
}

/// One record per finished item, ending when the batch finishes.
#[derive(Debug)]
pub struct ProgressStream {
    receiver: mpsc::Receiver<ProgressUpdate>,
    pending_ack: Option<oneshot::Sender<()>>,
}

impl ProgressStream {
    pub(crate) fn channel() -> (ProgressSender, Self) {
        let (sender, receiver) = mpsc::channel(1);
        (
            ProgressSender { sender },
            Self {
                receiver,
                pending_ack: None,
            },
        )
    }
}

impl Stream for ProgressStream {
    type Item = BatchProgress;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        // Asking for the next record releases the previous one.
        if let Some(ack) = this.pending_ack.take() {
            ack.send(()).ok();
        }

        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(update)) => {
                this.pending_ack = Some(update.ack);
                Poll::Ready(Some(update.progress))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Handle to a spawned auto-relocate batch.
///
/// The batch is registered before this handle is returned, so
/// `operation_id` can be cancelled or polled right away. Because progress
/// waits for its reader, either drain `progress`, drop it, or use
/// [`wait`](Self::wait) before awaiting `outcome`.
#[derive(Debug)]
pub struct AutoRelocateHandle {
    pub operation_id: OperationId,
    pub progress: ProgressStream,
    pub outcome: JoinHandle<Result<BatchResult<AutoRelocateOutcome>>>,
}

impl AutoRelocateHandle {
    /// Stop listening for progress and wait for the batch to finish.
    pub async fn wait(self) -> Result<BatchResult<AutoRelocateOutcome>> {
        let AutoRelocateHandle { progress, outcome, .. } = self;
        drop(progress);
        outcome.await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn record(processed: u64) -> BatchProgress {
        let mut progress = BatchProgress::new(OperationId::from_string("op").unwrap(), 5);
        for i in 1..=processed {
            progress.advance(format!("item-{}", i));
        }
        progress
    }

    #[tokio::test]
    async fn test_delivery_waits_for_next_poll() {
        let (sender, mut stream) = ProgressStream::channel();
        let token = CancellationToken::new();

        let producer = tokio::spawn({
            let token = token.clone();
            async move {
                sender.deliver(record(1), token.clone()).await;
                sender.deliver(record(2), token).await;
            }
        });

        assert_eq!(stream.next().await.unwrap().processed, 1);
        tokio::task::yield_now().await;
        assert!(!producer.is_finished());

        assert_eq!(stream.next().await.unwrap().processed, 2);
        drop(stream);
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancellation_releases_delivery() {
        let (sender, mut stream) = ProgressStream::channel();
        let token = CancellationToken::new();

        let producer = tokio::spawn({
            let token = token.clone();
            async move { sender.deliver(record(1), token).await }
        });

        stream.next().await.unwrap();
        token.cancel();
        producer.await.unwrap();
        assert!(stream.next().await.is_none());
    }
}
