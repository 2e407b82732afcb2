//! Cancellable channel operations used by every stage.

use crate::cancellation::CancellationToken;
use async_channel::{Receiver, Sender};

/// Receives the next element, or `None` once the channel is closed and empty
/// or the token is cancelled. Cancellation is checked first.
pub(crate) async fn recv<T>(rx: &Receiver<T>, token: &CancellationToken) -> Option<T> {
    tokio::select! {
        biased;
        () = token.cancelled() => None,
        received = rx.recv() => received.ok(),
    }
}

/// Sends `value`, returning false if the token was cancelled or every
/// receiver is gone. A send blocked on a full channel is abandoned on
/// cancellation.
pub(crate) async fn send<T>(tx: &Sender<T>, value: T, token: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = token.cancelled() => false,
        sent = tx.send(value) => sent.is_ok(),
    }
}

/// Creates a channel whose ends are already closed.
pub(crate) fn closed<T>() -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = async_channel::bounded(1);
    tx.close();
    (tx, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_recv_returns_none_when_closed() {
        let token = CancellationToken::new();
        let (tx, rx) = async_channel::bounded(2);
        assert!(send(&tx, 7, &token).await);
        drop(tx);

        assert_eq!(recv(&rx, &token).await, Some(7));
        assert_eq!(recv(&rx, &token).await, None);
    }

    #[tokio::test]
    async fn test_blocked_send_aborts_on_cancel() {
        let token = CancellationToken::new();
        let (tx, _rx) = async_channel::bounded(1);
        assert!(send(&tx, 1, &token).await);

        let blocked = {
            let token = token.clone();
            tokio::spawn(async move { send(&tx, 2, &token).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel("stop");

        let sent = tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .unwrap()
            .unwrap();
        assert!(!sent);
    }

    #[tokio::test]
    async fn test_send_fails_without_receivers() {
        let token = CancellationToken::new();
        let (tx, rx) = async_channel::bounded::<i32>(1);
        drop(rx);
        assert!(!send(&tx, 1, &token).await);
    }

    #[tokio::test]
    async fn test_closed_pair() {
        let token = CancellationToken::new();
        let (tx, rx) = closed::<i32>();
        assert!(!send(&tx, 1, &token).await);
        assert_eq!(recv(&rx, &token).await, None);
    }
}
