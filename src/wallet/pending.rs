//! Single-flight settlement for in-flight connect/disconnect operations.

use tokio::sync::watch;

use crate::error::WalletError;

/// A shared settlement slot for one in-flight operation.
///
/// Any number of waiters await the same slot and observe the same outcome;
/// the first settlement wins and later ones are ignored. Clones share the
/// slot.
pub(crate) struct Settlement<T> {
    tx: watch::Sender<Option<Result<T, WalletError>>>,
}

impl<T> Clone for Settlement<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Clone> Settlement<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Settle the operation. Only the first call has any effect.
    pub fn settle(&self, outcome: Result<T, WalletError>) {
        let mut outcome = Some(outcome);
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = outcome.take();
            true
        });
    }

    /// Wait for the settlement. Resolves immediately when already settled.
    pub async fn wait(&self) -> Result<T, WalletError> {
        let mut rx = self.tx.subscribe();
        let slot = rx
            .wait_for(|slot| slot.is_some())
            .await
            .expect("settlement sender held by self");
        slot.as_ref().expect("checked by wait_for").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_waiters_share_the_outcome() {
        let settlement: Settlement<u64> = Settlement::new();

        let first = settlement.clone();
        let second = settlement.clone();
        let waiters = tokio::spawn(async move {
            let a = first.wait().await;
            let b = second.wait().await;
            (a, b)
        });

        settlement.settle(Ok(7));
        let (a, b) = waiters.await.unwrap();
        assert_eq!(a, Ok(7));
        assert_eq!(b, Ok(7));
    }

    #[tokio::test]
    async fn test_first_settlement_wins() {
        let settlement: Settlement<u64> = Settlement::new();

        settlement.settle(Err(WalletError::WalletUnavailable));
        settlement.settle(Ok(1));

        assert_eq!(
            settlement.wait().await,
            Err(WalletError::WalletUnavailable)
        );
    }

    #[tokio::test]
    async fn test_wait_after_settlement_resolves_immediately() {
        let settlement: Settlement<u64> = Settlement::new();
        settlement.settle(Ok(3));
        assert_eq!(settlement.wait().await, Ok(3));
    }
}
