//! Cancellation signals
//!
//! A [`CancelSource`] is owned by whoever may cancel (the RPC server);
//! [`CancelToken`]s are cheap clones handed to every blocking operation.

use crate::error::{Result, TransportError};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Signals every token handed out by this source.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token is cancelled; never resolves otherwise.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Runs `future` unless the token fires first.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output> {
        if self.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(TransportError::Cancelled),
            output = future => Ok(output),
        }
    }

    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(tokio::time::sleep(duration)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_never_token_runs_to_completion() {
        let token = CancelToken::never();
        assert_eq!(token.run(async { 7 }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_sleep() {
        let source = CancelSource::new();
        let token = source.token();
        let handle = tokio::spawn(async move { token.sleep(Duration::from_secs(60)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        source.cancel();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(TransportError::Cancelled)));
    }

    #[tokio::test]
    async fn test_already_cancelled() {
        let source = CancelSource::new();
        source.cancel();
        let token = source.token();
        assert!(token.is_cancelled());
        assert!(token.run(async {}).await.is_err());
    }
}
