use alloy_primitives::utils::UnitsError;
use alloy_primitives::B256;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::evm::client::RpcError;
use crate::evm::signer::SignerError;
use crate::indexer::db::StoreError;
use crate::pricing::oracle::OracleError;

/// Error types for the sync, dispatch and confirmation services.
///
/// Ineligibility is not represented here; see
/// [`Verdict`](crate::rebate::evaluator::Verdict).
#[derive(Debug, Error)]
pub(crate) enum RebateError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Chain RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Price lookup failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Source transaction {0} not found")]
    MissingTransaction(B256),

    #[error("Payer balance {balance} is below the reserved {reserved}")]
    InsufficientBalance { balance: f64, reserved: f64 },

    #[error("Signing failed: {0}")]
    Signing(#[from] SignerError),

    #[error("Unit conversion failed: {0}")]
    Units(#[from] UnitsError),

    #[error("Undecodable deposit log: {0}")]
    Decode(#[from] alloy_sol_types::Error),
}

impl From<sqlx::Error> for RebateError {
    fn from(e: sqlx::Error) -> Self {
        RebateError::Store(StoreError::Db(e))
    }
}

/// Bounds `operation` by `limit`, reporting expiry as [`RebateError::Timeout`].
pub(crate) async fn with_timeout<T, E, F>(
    name: &'static str,
    limit: Duration,
    operation: F,
) -> Result<T, RebateError>
where
    F: Future<Output = Result<T, E>>,
    RebateError: From<E>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result.map_err(RebateError::from),
        Err(_) => Err(RebateError::Timeout(name)),
    }
}
