use alloy_primitives::Address;
use hex_literal::hex;
use once_cell::sync::Lazy;
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::SyncConfig;
use crate::evm::client::EvmClient;
use crate::evm::events::{DecodedDeposit, DepositEventKind};
use crate::evm::types::{LogEntry, LogFilter};
use crate::indexer::db::{get_checkpoint, init_checkpoint, insert_deposits_and_advance_checkpoint};
use crate::indexer::models::NewDeposit;
use crate::indexer::types::DepositStatus;
use crate::rebate::errors::{with_timeout, RebateError};

/// Stand-in L1 token for native ether deposits
pub(crate) static NATIVE_L1_TOKEN: Lazy<Address> = Lazy::new(|| Address::ZERO);

/// Stand-in L2 token for native ether deposits
pub(crate) static NATIVE_L2_TOKEN: Lazy<Address> =
    Lazy::new(|| Address::from(hex!("420000000000000000000000000000000000000a")));

/// L2 token of METIS deposits; it already arrives as the destination gas token
pub(crate) static METIS_L2_TOKEN: Lazy<Address> =
    Lazy::new(|| Address::from(hex!("deaddeaddeaddeaddeaddeaddeaddeaddead0000")));

const BLOCK_NUMBER_TIMEOUT: Duration = Duration::from_secs(10);
const SYNC_RANGE_TIMEOUT: Duration = Duration::from_secs(600);

/// Replays bridge deposit logs into the store, one bounded sub-range per
/// transaction.
#[derive(Debug, Clone)]
pub(crate) struct DepositSyncer {
    pool: SqlitePool,
    l1: Arc<dyn EvmClient>,
    bridge: Address,
    confirmation_depth: u64,
    range_sync: u64,
    start_height: u64,
    drip_height: u64,
}

impl DepositSyncer {
    pub(crate) fn new(
        pool: SqlitePool,
        l1: Arc<dyn EvmClient>,
        bridge: Address,
        config: &SyncConfig,
    ) -> Self {
        Self {
            pool,
            l1,
            bridge,
            confirmation_depth: config.confirmation_depth(),
            range_sync: config.range_sync().max(1),
            start_height: config.start_height(),
            drip_height: config.drip_height(),
        }
    }

    /// Loads the checkpoint, creating it just below the start height on a
    /// fresh store. Returns the synced height.
    pub(crate) async fn preflight(&self) -> Result<u64, RebateError> {
        let checkpoint = init_checkpoint(&self.pool, self.start_height.max(1) - 1).await?;
        let height = u64::from(checkpoint.height);
        let blockhash = *checkpoint.blockhash;
        info!(height, %blockhash, "Deposit checkpoint loaded");
        Ok(height)
    }

    /// Syncs up to the latest block minus the confirmation depth.
    pub(crate) async fn sync_to_tip(&self) -> Result<usize, RebateError> {
        let latest = with_timeout("eth_blockNumber", BLOCK_NUMBER_TIMEOUT, self.l1.block_number()).await?;
        self.advance(latest.saturating_sub(self.confirmation_depth)).await
    }

    /// Replays every block after the checkpoint up to `target` in sub-ranges
    /// of at most `range_sync` blocks. Returns the number of deposits stored.
    ///
    /// Each sub-range commits on its own; an error leaves earlier sub-ranges
    /// committed and the failing one untouched.
    pub(crate) async fn advance(&self, target: u64) -> Result<usize, RebateError> {
        let checkpoint = get_checkpoint(&self.pool)
            .await?
            .ok_or_else(|| RebateError::Invariant("checkpoint is not initialised".into()))?;

        let mut next = u64::from(checkpoint.height) + 1;
        let mut stored = 0;
        while next <= target {
            let end = target.min(next.saturating_add(self.range_sync - 1));
            stored += with_timeout("sync range", SYNC_RANGE_TIMEOUT, self.sync_range(next, end)).await?;
            next = end + 1;
        }
        Ok(stored)
    }

    async fn sync_range(&self, start: u64, end: u64) -> Result<usize, RebateError> {
        info!(start, end, "Syncing deposits");

        let tail = self.l1.header_by_number(end).await?;
        if tail.number != end {
            return Err(RebateError::Invariant(format!(
                "asked for block {end}, node returned {}",
                tail.number
            )));
        }

        let mut deposits = Vec::new();
        for kind in DepositEventKind::ALL {
            let filter = LogFilter {
                address: self.bridge,
                topic0: kind.topic0(),
                from_block: start,
                to_block: end,
            };
            for log in self.l1.logs(&filter).await? {
                deposits.push(self.normalize(&log)?);
            }
        }
        deposits.sort_by_key(|d| (d.height, d.log_index));

        insert_deposits_and_advance_checkpoint(&self.pool, &deposits, end, tail.hash).await?;

        info!(
            start,
            end,
            deposits = deposits.len(),
            block_time = tail.timestamp,
            "Deposit range committed"
        );
        Ok(deposits.len())
    }

    fn normalize(&self, log: &LogEntry) -> Result<NewDeposit, RebateError> {
        let event = DecodedDeposit::decode(log)?;
        let (l1_token, l2_token, amount) = match &event {
            DecodedDeposit::Erc20(e) => (e._l1Token, e._l2Token, e._amount),
            DecodedDeposit::Native(e) => (*NATIVE_L1_TOKEN, *NATIVE_L2_TOKEN, e._amount),
        };

        let mut status = DepositStatus::Unprocessed;
        if l2_token == *METIS_L2_TOKEN {
            status = DepositStatus::Ignore;
        }
        if log.block_number < self.drip_height {
            debug!(
                txid = %log.transaction_hash,
                height = log.block_number,
                drip_height = self.drip_height,
                "Deposit predates rebates"
            );
            status = DepositStatus::Ignore;
        }

        Ok(NewDeposit {
            txid: log.transaction_hash,
            log_index: log.log_index,
            height: log.block_number,
            l1_token,
            l2_token,
            from: event.from(),
            to: event.to(),
            amount,
            status,
        })
    }
}

/// Deposit sync task: syncs to tip on every tick until cancelled.
pub(crate) async fn deposit_sync_task(
    syncer: DepositSyncer,
    period: Duration,
    cancel: CancellationToken,
) {
    info!("Running deposit sync task...");
    let mut interval = interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            result = syncer.sync_to_tip() => match result {
                Ok(stored) => debug!(stored, "Deposit sync pass finished"),
                Err(e) => error!(%e, "Deposit sync failed"),
            },
        }
    }

    info!("Deposit sync task stopped");
}
