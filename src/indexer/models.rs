use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};

use crate::indexer::types::{DbAddress, DbAmount, DbBlockNumber, DbHash, DepositStatus};

/// Sync progress marker (single row).
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct Checkpoint {
    /// Highest fully synced source-chain block
    pub(crate) height: DbBlockNumber,
    /// Hash of the block at `height`; zero until the first sub-range commits
    pub(crate) blockhash: DbHash,
    pub(crate) updated_at: DateTime<Utc>,
}

/// Deposit stored in the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct Deposit {
    pub(crate) id: i64,

    /// Source-chain transaction hash
    pub(crate) txid: DbHash,

    /// Log position inside the source block; `(txid, log_index)` is unique
    pub(crate) log_index: i64,

    /// Source-chain block number
    pub(crate) height: DbBlockNumber,

    pub(crate) l1_token: DbAddress,
    pub(crate) l2_token: DbAddress,
    pub(crate) from_address: DbAddress,
    pub(crate) to_address: DbAddress,

    /// Base units of the L1 token
    pub(crate) amount: DbAmount,

    pub(crate) status: DepositStatus,

    /// Insertion time; policy windows are evaluated against it
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

/// Normalized deposit produced by the synchronizer, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NewDeposit {
    pub(crate) txid: B256,
    pub(crate) log_index: u64,
    pub(crate) height: u64,
    pub(crate) l1_token: Address,
    pub(crate) l2_token: Address,
    pub(crate) from: Address,
    pub(crate) to: Address,
    pub(crate) amount: U256,
    pub(crate) status: DepositStatus,
}

/// Payout attached to a deposit. Immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NewDrip {
    /// Owning deposit id
    pub(crate) pid: i64,
    /// Destination-chain transaction hash
    pub(crate) txid: B256,
    pub(crate) from: Address,
    pub(crate) to: Address,
    /// Wei paid on the destination chain; stored in display units
    pub(crate) amount: U256,
    /// Signed transaction, resent verbatim until a receipt shows up
    pub(crate) rawtx: Vec<u8>,
}

/// Drip whose deposit is still `Processing`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct PendingDrip {
    pub(crate) pid: i64,
    pub(crate) txid: DbHash,
    pub(crate) rawtx: Vec<u8>,
}
