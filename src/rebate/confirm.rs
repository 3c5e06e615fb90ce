use futures_util::TryStreamExt;
use sqlx::SqlitePool;
use std::{pin::pin, sync::Arc, time::Duration};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::evm::client::EvmClient;
use crate::indexer::db::{set_status, stream_pending_drips};
use crate::indexer::types::DepositStatus;
use crate::rebate::errors::{with_timeout, RebateError};

/// Pending drips checked per pass
const CONFIRM_PAGE: u32 = 20;

const RECEIPT_TIMEOUT: Duration = Duration::from_secs(1);
const RESEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Retires drips once their transaction has a receipt, resending the stored
/// bytes until then.
#[derive(Debug, Clone)]
pub(crate) struct ConfirmationTracker {
    pool: SqlitePool,
    l2: Arc<dyn EvmClient>,
}

impl ConfirmationTracker {
    pub(crate) fn new(pool: SqlitePool, l2: Arc<dyn EvmClient>) -> Self {
        Self { pool, l2 }
    }

    /// Returns the number of deposits moved to `Done`.
    pub(crate) async fn run_pass(&self) -> Result<usize, RebateError> {
        let mut pending = pin!(stream_pending_drips(&self.pool, CONFIRM_PAGE));
        let mut confirmed = 0;

        while let Some(drip) = pending.try_next().await? {
            let txid = *drip.txid;
            let receipt = with_timeout(
                "eth_getTransactionReceipt",
                RECEIPT_TIMEOUT,
                self.l2.transaction_receipt(txid),
            )
            .await?;

            match receipt {
                Some(receipt) => {
                    set_status(&self.pool, drip.pid, DepositStatus::Done).await?;
                    info!(
                        id = drip.pid,
                        txid = %receipt.transaction_hash,
                        block = receipt.block_number,
                        status = receipt.status,
                        "Rebate confirmed"
                    );
                    confirmed += 1;
                }
                None => {
                    // may already sit in the mempool, so failures are expected
                    if let Err(e) = with_timeout(
                        "eth_sendRawTransaction",
                        RESEND_TIMEOUT,
                        self.l2.send_raw_transaction(&drip.rawtx),
                    )
                    .await
                    {
                        debug!(id = drip.pid, %txid, %e, "Resend failed");
                    }
                }
            }
        }

        Ok(confirmed)
    }
}

/// Runs a confirmation pass every `period` until cancelled.
pub(crate) async fn confirm_task(tracker: ConfirmationTracker, period: Duration, cancel: CancellationToken) {
    info!("Running rebate confirmation task...");
    let mut interval = interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            result = tracker.run_pass() => match result {
                Ok(0) => {}
                Ok(confirmed) => info!(confirmed, "Confirmation pass finished"),
                Err(e) => error!(%e, "Confirmation pass failed"),
            },
        }
    }

    info!("Rebate confirmation task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::mock::MockChain;
    use crate::evm::types::RpcReceipt;
    use crate::indexer::db::insert_drip_and_set_status;
    use crate::indexer::db::tests::{new_deposit, seed, status_of, test_pool};
    use crate::indexer::models::{Deposit, NewDrip};
    use alloy_primitives::{keccak256, Address, U256};

    async fn processing(pool: &SqlitePool, deposit: &Deposit, rawtx: Vec<u8>) -> NewDrip {
        let drip = NewDrip {
            pid: deposit.id,
            txid: keccak256(&rawtx),
            from: Address::repeat_byte(0xee),
            to: *deposit.to_address,
            amount: U256::from(10_000_000_000_000_000u64),
            rawtx,
        };
        insert_drip_and_set_status(pool, deposit, Some(&drip), DepositStatus::Processing)
            .await
            .unwrap();
        drip
    }

    fn receipt_for(drip: &NewDrip, status: u64) -> RpcReceipt {
        RpcReceipt {
            transaction_hash: drip.txid,
            block_number: 100,
            gas_used: 21_000,
            effective_gas_price: Some(1_000_000_000),
            status: Some(status),
        }
    }

    #[tokio::test]
    async fn unconfirmed_drips_are_resent_verbatim() {
        let pool = test_pool().await;
        let l2 = Arc::new(MockChain::new(1088));
        let rows = seed(&pool, &[new_deposit(1, 10)]).await;
        let drip = processing(&pool, &rows[0], vec![0xf8, 1, 2, 3]).await;

        let tracker = ConfirmationTracker::new(pool.clone(), l2.clone());
        assert_eq!(tracker.run_pass().await.unwrap(), 0);
        assert_eq!(tracker.run_pass().await.unwrap(), 0);

        assert_eq!(l2.broadcasts(), vec![drip.rawtx.clone(), drip.rawtx]);
        assert_eq!(status_of(&pool, rows[0].id).await, DepositStatus::Processing);
    }

    #[tokio::test]
    async fn resend_failures_are_tolerated() {
        let pool = test_pool().await;
        let l2 = Arc::new(MockChain::new(1088));
        l2.fail_broadcasts();
        let rows = seed(&pool, &[new_deposit(1, 10)]).await;
        processing(&pool, &rows[0], vec![0xf8, 9]).await;

        let tracker = ConfirmationTracker::new(pool.clone(), l2.clone());
        assert_eq!(tracker.run_pass().await.unwrap(), 0);
        assert_eq!(l2.broadcasts().len(), 1);
        assert_eq!(status_of(&pool, rows[0].id).await, DepositStatus::Processing);
    }

    #[tokio::test]
    async fn any_receipt_completes_the_deposit() {
        let pool = test_pool().await;
        let l2 = Arc::new(MockChain::new(1088));
        let rows = seed(&pool, &[new_deposit(1, 10), new_deposit(2, 10), new_deposit(3, 10)]).await;
        let ok = processing(&pool, &rows[0], vec![1]).await;
        // reverted on chain, still settled
        let reverted = processing(&pool, &rows[1], vec![2]).await;
        processing(&pool, &rows[2], vec![3]).await;
        l2.insert_receipt(receipt_for(&ok, 1));
        l2.insert_receipt(receipt_for(&reverted, 0));

        let tracker = ConfirmationTracker::new(pool.clone(), l2.clone());
        assert_eq!(tracker.run_pass().await.unwrap(), 2);

        assert_eq!(status_of(&pool, rows[0].id).await, DepositStatus::Done);
        assert_eq!(status_of(&pool, rows[1].id).await, DepositStatus::Done);
        assert_eq!(status_of(&pool, rows[2].id).await, DepositStatus::Processing);
        assert_eq!(l2.broadcasts(), vec![vec![3]]);

        // done deposits drop out of later passes
        assert_eq!(tracker.run_pass().await.unwrap(), 0);
        assert_eq!(l2.broadcasts().len(), 2);
    }

    #[tokio::test]
    async fn ignored_deposits_are_not_tracked() {
        let pool = test_pool().await;
        let l2 = Arc::new(MockChain::new(1088));
        let rows = seed(&pool, &[new_deposit(1, 10)]).await;
        insert_drip_and_set_status(&pool, &rows[0], None, DepositStatus::Ignore)
            .await
            .unwrap();

        let tracker = ConfirmationTracker::new(pool.clone(), l2.clone());
        assert_eq!(tracker.run_pass().await.unwrap(), 0);
        assert!(l2.broadcasts().is_empty());
    }

    #[tokio::test]
    async fn cancel_interrupts_a_receipt_check() {
        let pool = test_pool().await;
        let l2 = Arc::new(MockChain::new(1088));
        let rows = seed(&pool, &[new_deposit(1, 10)]).await;
        processing(&pool, &rows[0], vec![0xf8, 1]).await;
        l2.hang("eth_getTransactionReceipt");

        let cancel = CancellationToken::new();
        let task = tokio::spawn(confirm_task(
            ConfirmationTracker::new(pool.clone(), l2.clone()),
            Duration::from_secs(3600),
            cancel.clone(),
        ));
        l2.wait_until_hung().await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("confirmation task ignored cancellation")
            .unwrap();
        assert_eq!(status_of(&pool, rows[0].id).await, DepositStatus::Processing);
        assert!(l2.broadcasts().is_empty());
    }
}
