use alloy_primitives::B256;
use axum::{http::StatusCode, Json};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::error;

use crate::indexer::db::{get_checkpoint, status_counts};
use crate::indexer::types::DepositStatus;

#[derive(Serialize, Clone, Debug, PartialEq)]
pub(crate) struct CheckpointStatus {
    pub(crate) height: u64,
    pub(crate) blockhash: B256,
}

/// Deposit count per status
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct DepositCounts {
    pub(crate) unprocessed: i64,
    pub(crate) processing: i64,
    pub(crate) done: i64,
    pub(crate) ignore: i64,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub(crate) struct RebateStatus {
    /// `None` until the synchronizer has run its pre-flight
    pub(crate) checkpoint: Option<CheckpointStatus>,
    pub(crate) deposits: DepositCounts,
}

async fn load_status(pool: &SqlitePool) -> Result<RebateStatus, sqlx::Error> {
    let checkpoint = get_checkpoint(pool).await?.map(|c| CheckpointStatus {
        height: c.height.into(),
        blockhash: *c.blockhash,
    });

    let mut deposits = DepositCounts::default();
    for (status, count) in status_counts(pool).await? {
        match status {
            DepositStatus::Unprocessed => deposits.unprocessed = count,
            DepositStatus::Processing => deposits.processing = count,
            DepositStatus::Done => deposits.done = count,
            DepositStatus::Ignore => deposits.ignore = count,
        }
    }

    Ok(RebateStatus {
        checkpoint,
        deposits,
    })
}

/// HTTP handler for GET `/api/status`
pub(crate) async fn get_rebate_status(pool: SqlitePool) -> Result<Json<RebateStatus>, StatusCode> {
    load_status(&pool).await.map(Json).map_err(|e| {
        error!(%e, "Failed to load rebate status");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
