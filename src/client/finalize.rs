use std::time::Duration;

use log::{debug, warn};
use tokio::time::sleep;

use crate::error::{Error, Result};
use crate::mxe::{ComputationOffset, ComputationStatus, MxeCluster, MxeError};

/// Await the out-of-band finalization of a queued computation.
///
/// Polls `status` up to `attempts` times, `delay` apart. Every wait has this
/// attempt ceiling: exhaustion surfaces as [`Error::FinalizationTimeout`],
/// never as success. Abandoning the wait (dropping the future) does not roll
/// back the underlying request; the platform finalizes or aborts it
/// independently of the client.
pub(crate) async fn await_finalization<M>(
    mxe: &M,
    offset: ComputationOffset,
    attempts: u32,
    delay: Duration,
) -> Result<()>
where
    M: MxeCluster + ?Sized,
{
    for attempt in 1..=attempts {
        match mxe.status(offset).await? {
            ComputationStatus::Finalized => {
                debug!("computation {offset} finalized after {attempt} poll(s)");
                return Ok(());
            }
            ComputationStatus::Aborted => return Err(Error::Mxe(MxeError::Aborted(offset))),
            ComputationStatus::Pending => {
                if attempt < attempts {
                    debug!("computation {offset} pending ({attempt}/{attempts}), retrying in {delay:?}");
                    sleep(delay).await;
                }
            }
        }
    }
    Err(Error::FinalizationTimeout { offset, attempts })
}

/// Fetch the cluster public key, retrying while the cluster bootstraps.
pub(crate) async fn cluster_pubkey_with_retry<M>(
    mxe: &M,
    attempts: u32,
    delay: Duration,
) -> Result<[u8; 32]>
where
    M: MxeCluster + ?Sized,
{
    for attempt in 1..=attempts {
        match mxe.cluster_pubkey().await {
            Ok(key) => return Ok(key),
            Err(err) => {
                warn!("attempt {attempt}/{attempts} failed to fetch MXE public key: {err}");
                if attempt < attempts {
                    sleep(delay).await;
                }
            }
        }
    }
    Err(Error::Mxe(MxeError::PublicKeyUnavailable))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::model::account::AccountId;
    use crate::mxe::{Argument, Circuit};

    use super::*;

    /// A cluster that reports Pending a fixed number of times, then
    /// Finalized.
    struct SlowCluster {
        polls_until_done: Mutex<u32>,
    }

    #[async_trait]
    impl MxeCluster for SlowCluster {
        async fn cluster_pubkey(&self) -> std::result::Result<[u8; 32], MxeError> {
            Ok([0; 32])
        }

        async fn healthy(&self) -> bool {
            true
        }

        async fn queue(
            &self,
            _circuit: Circuit,
            _offset: ComputationOffset,
            _args: Vec<Argument>,
            _callback: AccountId,
        ) -> std::result::Result<(), MxeError> {
            Ok(())
        }

        async fn status(
            &self,
            _offset: ComputationOffset,
        ) -> std::result::Result<ComputationStatus, MxeError> {
            let mut remaining = self.polls_until_done.lock().unwrap();
            if *remaining == 0 {
                Ok(ComputationStatus::Finalized)
            } else {
                *remaining -= 1;
                Ok(ComputationStatus::Pending)
            }
        }
    }

    #[tokio::test]
    async fn finalization_within_budget_succeeds() {
        let cluster = SlowCluster {
            polls_until_done: Mutex::new(3),
        };
        await_finalization(&cluster, 42, 10, Duration::from_millis(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn exhausted_budget_is_a_timeout() {
        let cluster = SlowCluster {
            polls_until_done: Mutex::new(100),
        };
        let err = await_finalization(&cluster, 42, 4, Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::FinalizationTimeout {
                offset: 42,
                attempts: 4
            }
        ));
    }
}
