use alloy_primitives::{Address, U256};
use futures_util::TryStreamExt;
use sqlx::SqlitePool;
use std::{collections::HashSet, pin::pin, sync::Arc, time::Duration};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::evm::client::EvmClient;
use crate::evm::signer::TransferSigner;
use crate::evm::types::CallRequest;
use crate::evm::units::to_ether;
use crate::indexer::db::{insert_drip_and_set_status, stream_by_status};
use crate::indexer::models::{Deposit, NewDrip};
use crate::indexer::types::DepositStatus;
use crate::pricing::token_list::TokenList;
use crate::rebate::errors::{with_timeout, RebateError};
use crate::rebate::evaluator::{Evaluator, Verdict};
use crate::utils::rpc_client::execute_with_retries;

/// Deposits considered per dispatch pass
const DISPATCH_PAGE: u32 = 100;

const BALANCE_TIMEOUT: Duration = Duration::from_secs(3);
const TOKEN_LIST_TIMEOUT: Duration = Duration::from_secs(10);
const BUILD_TX_TIMEOUT: Duration = Duration::from_secs(5);
const BROADCAST_TIMEOUT: Duration = Duration::from_secs(5);

/// Turns unprocessed deposits into signed payouts.
///
/// Owns the payer's nonce: it is read from the chain once in [`Dispatcher::new`]
/// and only advanced here, after the drip carrying it has been committed.
#[derive(Debug)]
pub(crate) struct Dispatcher {
    pool: SqlitePool,
    l2: Arc<dyn EvmClient>,
    evaluator: Evaluator,
    token_list: Arc<dyn TokenList>,
    signer: TransferSigner,
    reserved_balance: f64,
    nonce: u64,
}

/// Summary of one dispatch pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PassStats {
    pub(crate) paid: usize,
    pub(crate) ignored: usize,
}

impl Dispatcher {
    pub(crate) async fn new(
        pool: SqlitePool,
        l2: Arc<dyn EvmClient>,
        evaluator: Evaluator,
        token_list: Arc<dyn TokenList>,
        signer: TransferSigner,
        reserved_balance: f64,
    ) -> Result<Self, RebateError> {
        let payer = signer.address();
        let nonce = execute_with_retries(|| l2.nonce_at(payer), "eth_getTransactionCount").await?;
        info!(%payer, nonce, "Dispatcher ready");

        Ok(Self {
            pool,
            l2,
            evaluator,
            token_list,
            signer,
            reserved_balance,
            nonce,
        })
    }

    pub(crate) fn nonce(&self) -> u64 {
        self.nonce
    }

    /// One pass over the oldest unprocessed deposits. Any error aborts the
    /// rest of the pass; items already handled stay committed.
    pub(crate) async fn run_pass(&mut self) -> Result<PassStats, RebateError> {
        self.check_balance().await?;

        let tokens = with_timeout(
            "bridge token list",
            TOKEN_LIST_TIMEOUT,
            self.token_list.list_supported_tokens(),
        )
        .await?;

        let pool = self.pool.clone();
        let mut deposits = pin!(stream_by_status(&pool, DepositStatus::Unprocessed, DISPATCH_PAGE));
        let mut paid = HashSet::new();
        let mut stats = PassStats::default();

        while let Some(deposit) = deposits.try_next().await? {
            let amount = match self.evaluator.evaluate(&deposit, &tokens, &paid).await? {
                Verdict::Ineligible { policy, reason } => {
                    let to = *deposit.to_address;
                    info!(
                        id = deposit.id,
                        %to,
                        policy = policy.map(|p| p.name.as_str()),
                        %reason,
                        "Deposit not eligible for rebate"
                    );
                    insert_drip_and_set_status(&self.pool, &deposit, None, DepositStatus::Ignore).await?;
                    stats.ignored += 1;
                    continue;
                }
                Verdict::Eligible(policy) => {
                    let amount = self.evaluator.calc_amount(policy, &deposit).await?;
                    info!(id = deposit.id, policy = %policy.name, %amount, "Deposit eligible for rebate");
                    amount
                }
            };

            let drip = with_timeout("build transaction", BUILD_TX_TIMEOUT, self.build_drip(&deposit, amount)).await?;
            insert_drip_and_set_status(&self.pool, &deposit, Some(&drip), DepositStatus::Processing).await?;
            paid.insert(drip.to);
            self.nonce += 1;

            match with_timeout("eth_sendRawTransaction", BROADCAST_TIMEOUT, self.l2.send_raw_transaction(&drip.rawtx)).await {
                Ok(_) => info!(id = deposit.id, txid = %drip.txid, to = %drip.to, amount = %drip.amount, "Rebate sent"),
                Err(e) => warn!(id = deposit.id, txid = %drip.txid, %e, "Broadcast failed; confirmation pass will resend"),
            }
            stats.paid += 1;
        }

        Ok(stats)
    }

    async fn check_balance(&self) -> Result<(), RebateError> {
        let payer = self.signer.address();
        let balance = with_timeout("eth_getBalance", BALANCE_TIMEOUT, self.l2.balance_at(payer)).await?;
        let balance = to_ether(balance)?;
        if balance <= self.reserved_balance {
            return Err(RebateError::InsufficientBalance {
                balance,
                reserved: self.reserved_balance,
            });
        }
        Ok(())
    }

    /// Signs a transfer of `amount` wei to the deposit's recipient at the
    /// current nonce.
    async fn build_drip(&self, deposit: &Deposit, amount: U256) -> Result<NewDrip, RebateError> {
        let to: Address = *deposit.to_address;
        let from = self.signer.address();

        let gas_price = self.l2.gas_price().await?;
        let gas_limit = self
            .l2
            .estimate_gas(&CallRequest {
                from: Some(from),
                to,
                value: Some(amount),
                data: None,
            })
            .await?;

        let signed = self
            .signer
            .sign_transfer(self.nonce, gas_price, gas_limit, to, amount)?;

        Ok(NewDrip {
            pid: deposit.id,
            txid: signed.hash,
            from,
            to,
            amount,
            rawtx: signed.raw,
        })
    }
}

/// Runs a dispatch pass every `period` until cancelled.
pub(crate) async fn dispatch_task(mut dispatcher: Dispatcher, period: Duration, cancel: CancellationToken) {
    info!("Running rebate dispatch task...");
    let mut interval = interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = dispatcher.run_pass() => result,
        };
        match result {
            Ok(stats) if stats.paid + stats.ignored > 0 => info!(
                paid = stats.paid,
                ignored = stats.ignored,
                nonce = dispatcher.nonce(),
                "Dispatch pass finished"
            ),
            Ok(_) => {}
            Err(e) => error!(%e, "Dispatch pass failed"),
        }
    }

    info!("Rebate dispatch task stopped");
}
