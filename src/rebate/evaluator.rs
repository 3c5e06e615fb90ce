use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use sqlx::SqlitePool;
use std::{collections::HashSet, fmt, sync::Arc, time::Duration};

use crate::config::DispatchConfig;
use crate::evm::client::EvmClient;
use crate::evm::events::decimalsCall;
use crate::evm::types::CallRequest;
use crate::evm::units::{to_display, to_ether, to_wei, NATIVE_DECIMALS};
use crate::indexer::db::count_drips_to;
use crate::indexer::deposits::NATIVE_L1_TOKEN;
use crate::indexer::models::Deposit;
use crate::pricing::oracle::{is_stablecoin, OracleError, PriceOracle};
use crate::pricing::token_list::BridgeTokens;
use crate::rebate::errors::{with_timeout, RebateError};
use crate::rebate::policy::{Policy, PolicySet, RebateType};

const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a deposit gets no rebate.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum IneligibleReason {
    NoPolicy,
    UnsupportedToken,
    AlreadyPaidThisPass,
    BelowMinimumUsd { value: f64, min: f64 },
    NoPriceData,
    ReceivedBefore,
    NonceNotZero,
    HasGas,
    NotEoa,
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IneligibleReason::NoPolicy => write!(f, "no policy matched"),
            IneligibleReason::UnsupportedToken => write!(f, "token is not on the bridge list"),
            IneligibleReason::AlreadyPaidThisPass => write!(f, "already paid this pass"),
            IneligibleReason::BelowMinimumUsd { value, min } => {
                write!(f, "deposit worth ${value:.2} is below ${min:.2}")
            }
            IneligibleReason::NoPriceData => write!(f, "no price data"),
            IneligibleReason::ReceivedBefore => write!(f, "recipient received a rebate before"),
            IneligibleReason::NonceNotZero => write!(f, "recipient nonce is not zero"),
            IneligibleReason::HasGas => write!(f, "recipient already holds gas"),
            IneligibleReason::NotEoa => write!(f, "recipient is a contract"),
        }
    }
}

/// Outcome of evaluating one deposit.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Verdict<'a> {
    Eligible(&'a Policy),
    Ineligible {
        policy: Option<&'a Policy>,
        reason: IneligibleReason,
    },
}

impl<'a> Verdict<'a> {
    fn ineligible(policy: Option<&'a Policy>, reason: IneligibleReason) -> Self {
        Verdict::Ineligible { policy, reason }
    }
}

/// Applies the rebate policies to deposits and prices the payout.
#[derive(Debug)]
pub(crate) struct Evaluator {
    pool: SqlitePool,
    l1: Arc<dyn EvmClient>,
    l2: Arc<dyn EvmClient>,
    oracle: Arc<dyn PriceOracle>,
    policies: PolicySet,
    flat_amount: f64,
    max_drip_usd: f64,
    /// L1 address of the payout token, used to price gas-fee rebates
    reference_token: Address,
}

impl Evaluator {
    pub(crate) fn new(
        pool: SqlitePool,
        l1: Arc<dyn EvmClient>,
        l2: Arc<dyn EvmClient>,
        oracle: Arc<dyn PriceOracle>,
        policies: PolicySet,
        config: &DispatchConfig,
        reference_token: Address,
    ) -> Self {
        Self {
            pool,
            l1,
            l2,
            oracle,
            policies,
            flat_amount: config.drip_amount(),
            max_drip_usd: config.max_drip_usd(),
            reference_token,
        }
    }

    /// Runs the eligibility checks in order, stopping at the first failure.
    ///
    /// `paid` holds recipients already paid in the current dispatch pass.
    /// Infrastructure failures are errors; a rejected deposit is a
    /// [`Verdict::Ineligible`].
    pub(crate) async fn evaluate<'a>(
        &'a self,
        deposit: &Deposit,
        tokens: &BridgeTokens,
        paid: &HashSet<Address>,
    ) -> Result<Verdict<'a>, RebateError> {
        let to = *deposit.to_address;

        let Some(policy) = self.policies.select(deposit.created_at, &deposit.l1_token) else {
            return Ok(Verdict::ineligible(None, IneligibleReason::NoPolicy));
        };
        let reject = |reason| Ok(Verdict::ineligible(Some(policy), reason));

        if !tokens.contains_key(&*deposit.l2_token) {
            return reject(IneligibleReason::UnsupportedToken);
        }

        if paid.contains(&to) {
            return reject(IneligibleReason::AlreadyPaidThisPass);
        }

        if policy.min_usd_equal > 0.0 {
            let Some(value) = self.usd_value(deposit).await? else {
                return reject(IneligibleReason::NoPriceData);
            };
            if value < policy.min_usd_equal {
                return reject(IneligibleReason::BelowMinimumUsd {
                    value,
                    min: policy.min_usd_equal,
                });
            }
        }

        if policy.check_if_first {
            if count_drips_to(&self.pool, to).await? > 0 {
                return reject(IneligibleReason::ReceivedBefore);
            }
            let nonce = with_timeout("eth_getTransactionCount", CHECK_TIMEOUT, self.l2.nonce_at(to)).await?;
            if nonce != 0 {
                return reject(IneligibleReason::NonceNotZero);
            }
        }

        if policy.check_if_no_gas {
            let balance = with_timeout("eth_getBalance", CHECK_TIMEOUT, self.l2.balance_at(to)).await?;
            if !balance.is_zero() {
                return reject(IneligibleReason::HasGas);
            }
        }

        let code = with_timeout("eth_getCode", CHECK_TIMEOUT, self.l2.code_at(to)).await?;
        if !code.is_empty() {
            return reject(IneligibleReason::NotEoa);
        }

        Ok(Verdict::Eligible(policy))
    }

    /// USD value of the deposit, or `None` if the oracle has no price for it.
    async fn usd_value(&self, deposit: &Deposit) -> Result<Option<f64>, RebateError> {
        let token = *deposit.l1_token;
        let decimals = self.decimals(token).await?;
        let amount = to_display(*deposit.amount, decimals)?;

        if is_stablecoin(&token) {
            return Ok(Some(amount));
        }
        match with_timeout("price lookup", CHECK_TIMEOUT, self.oracle.get_token(token)).await {
            Ok(price) => Ok(Some(amount * price.value_in_usd)),
            Err(RebateError::Oracle(OracleError::NoData(_))) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn decimals(&self, token: Address) -> Result<u8, RebateError> {
        if token == *NATIVE_L1_TOKEN {
            return Ok(NATIVE_DECIMALS);
        }
        let call = CallRequest {
            from: None,
            to: token,
            value: None,
            data: Some(Bytes::from(decimalsCall {}.abi_encode())),
        };
        let output = with_timeout("decimals()", CHECK_TIMEOUT, self.l1.call(&call)).await?;
        Ok(decimalsCall::abi_decode_returns(&output, true)?._0)
    }

    /// Payout in wei of the destination native currency.
    pub(crate) async fn calc_amount(&self, policy: &Policy, deposit: &Deposit) -> Result<U256, RebateError> {
        match policy.rebate_type {
            RebateType::Flat => Ok(to_wei(self.flat_amount)?),
            RebateType::GasFeeBased => {
                let amount = self.gas_fee_amount(deposit).await?;
                Ok(to_wei(amount)?)
            }
        }
    }

    /// Source-chain gas cost of the deposit expressed in the payout token,
    /// capped at `max_drip_usd`.
    async fn gas_fee_amount(&self, deposit: &Deposit) -> Result<f64, RebateError> {
        let txid = *deposit.txid;
        let tx = with_timeout("eth_getTransactionByHash", CHECK_TIMEOUT, self.l1.transaction_by_hash(txid))
            .await?
            .ok_or(RebateError::MissingTransaction(txid))?;
        let receipt = with_timeout("eth_getTransactionReceipt", CHECK_TIMEOUT, self.l1.transaction_receipt(txid))
            .await?
            .ok_or(RebateError::MissingTransaction(txid))?;

        let gas_price = tx
            .gas_price
            .or(receipt.effective_gas_price)
            .ok_or_else(|| RebateError::Invariant(format!("transaction {txid:#x} has no gas price")))?;
        let cost = to_ether(U256::from(gas_price) * U256::from(receipt.gas_used))?;

        let reference = with_timeout("price lookup", CHECK_TIMEOUT, self.oracle.get_token(self.reference_token)).await?;
        if reference.value_in_native <= 0.0 || reference.value_in_usd <= 0.0 {
            return Err(OracleError::NoData(self.reference_token).into());
        }

        let mut amount = cost / reference.value_in_native;
        if amount * reference.value_in_usd > self.max_drip_usd {
            amount = self.max_drip_usd / reference.value_in_usd;
        }
        Ok(amount)
    }
}
