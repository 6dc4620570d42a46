//! Periodic call cleanup
//!
//! Pending calls are never reaped here; only resolved calls that have not
//! been touched for longer than the retention window.

use crate::config::{retention_window, CleanupConfig};
use crate::domain::call::CallRepository;
use crate::domain::shared::error::Result;
use crate::domain::shared::time;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub struct CallSweeper<C: ?Sized> {
    calls: Arc<C>,
    interval: Duration,
    retention: chrono::Duration,
}

impl<C> CallSweeper<C>
where
    C: CallRepository + ?Sized + 'static,
{
    /// Fails with a configuration error when `retention` is out of range
    pub fn new(calls: Arc<C>, interval: Duration, retention: Duration) -> Result<Self> {
        Ok(Self {
            calls,
            interval,
            retention: retention_window(retention)?,
        })
    }

    pub fn from_config(calls: Arc<C>, config: &CleanupConfig) -> Result<Self> {
        Self::new(calls, config.interval(), config.retention())
    }

    /// Run one cleanup pass; returns how many calls were removed
    pub async fn sweep_once(&self) -> Result<u64> {
        let cutoff = time::now()
            .checked_sub_signed(self.retention)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);

        let removed = self.calls.cleanup_calls(cutoff).await?;
        debug!("Call sweep removed {} calls older than {}", removed, cutoff);
        Ok(removed)
    }

    /// Sweep every interval until `shutdown` flips to `true` or its sender is dropped
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Call sweeper started (interval {:?}, retention {}s)",
                self.interval,
                self.retention.num_seconds()
            );

            // a zero period would panic
            let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            error!("Call sweep failed: {}", e);
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Call sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::repository::MockCallRepository;
    use crate::domain::shared::error::DomainError;
    use chrono::Utc;

    #[tokio::test]
    async fn test_sweep_uses_retention_cutoff() {
        let mut calls = MockCallRepository::new();
        calls
            .expect_cleanup_calls()
            .withf(|cutoff| {
                let age = Utc::now() - *cutoff;
                age >= chrono::Duration::seconds(3599) && age <= chrono::Duration::seconds(3660)
            })
            .times(1)
            .returning(|_| Ok(3));

        let sweeper = CallSweeper::new(
            Arc::new(calls),
            Duration::from_secs(60),
            Duration::from_secs(3600),
        )
        .unwrap();

        assert_eq!(tokio_test::assert_ok!(sweeper.sweep_once().await), 3);
    }

    #[tokio::test]
    async fn test_sweep_propagates_storage_errors() {
        let mut calls = MockCallRepository::new();
        calls
            .expect_cleanup_calls()
            .returning(|_| Err(DomainError::Storage("connection reset".to_string())));

        let sweeper =
            CallSweeper::new(Arc::new(calls), Duration::from_secs(60), Duration::ZERO).unwrap();

        assert_eq!(
            sweeper.sweep_once().await,
            Err(DomainError::Storage("connection reset".to_string()))
        );
    }

    #[test]
    fn test_out_of_range_retention_is_rejected() {
        let calls = MockCallRepository::new();
        let result = CallSweeper::new(
            Arc::new(calls),
            Duration::from_secs(60),
            Duration::from_secs(u64::MAX),
        );

        assert!(matches!(result, Err(DomainError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_spawned_sweeper_stops_on_shutdown() {
        let mut calls = MockCallRepository::new();
        calls.expect_cleanup_calls().times(1..).returning(|_| Ok(0));

        let (tx, rx) = watch::channel(false);
        let handle = CallSweeper::new(
            Arc::new(calls),
            Duration::from_millis(10),
            Duration::from_secs(60),
        )
        .unwrap()
        .spawn(rx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
