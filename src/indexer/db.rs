use alloy_primitives::{Address, B256};
use chrono::Utc;
use futures_util::stream::{self, Stream};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use std::{collections::VecDeque, future::Future, str::FromStr, time::Duration};
use thiserror::Error;

use crate::indexer::models::{Checkpoint, Deposit, NewDeposit, NewDrip, PendingDrip};
use crate::indexer::types::{
    DbAddress, DbAmount, DbBlockNumber, DbEtherAmount, DbHash, DepositStatus,
};

/// Rows fetched per round trip while streaming
const FETCH_PAGE: u32 = 16;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Illegal status transition for deposit {id}: {from:?} -> {to}")]
    IllegalTransition {
        id: i64,
        from: Option<DepositStatus>,
        to: DepositStatus,
    },

    #[error("Store invariant violated: {0}")]
    Invariant(String),
}

/// Initialize the SQLite connection pool.
pub(crate) async fn init_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
}

/// Runs all embedded migrations.
pub(crate) async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub(crate) async fn get_checkpoint(pool: &SqlitePool) -> Result<Option<Checkpoint>, sqlx::Error> {
    sqlx::query_as::<_, Checkpoint>(
        "SELECT height, blockhash, updated_at FROM checkpoint WHERE id = 1",
    )
    .fetch_optional(pool)
    .await
}

/// Creates the checkpoint row unless one exists, then returns the stored row.
pub(crate) async fn init_checkpoint(pool: &SqlitePool, height: u64) -> Result<Checkpoint, StoreError> {
    let height = block_number(height)?;
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO checkpoint (id, height, blockhash, updated_at)
        VALUES (1, ?, ?, ?)
        "#,
    )
    .bind(height)
    .bind(DbHash::from(B256::ZERO))
    .bind(Utc::now())
    .execute(pool)
    .await?;

    get_checkpoint(pool)
        .await?
        .ok_or_else(|| StoreError::Invariant("checkpoint missing after init".into()))
}

/// Persists one synced sub-range: every deposit plus the new checkpoint, or nothing.
pub(crate) async fn insert_deposits_and_advance_checkpoint(
    pool: &SqlitePool,
    deposits: &[NewDeposit],
    height: u64,
    blockhash: B256,
) -> Result<(), StoreError> {
    if let Some(ahead) = deposits.iter().find(|d| d.height > height) {
        return Err(StoreError::Invariant(format!(
            "deposit at height {} beyond checkpoint {height}",
            ahead.height
        )));
    }

    let db_height = block_number(height)?;
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    for deposit in deposits {
        sqlx::query(
            r#"
            INSERT INTO deposits
                (txid, log_index, height, l1_token, l2_token, from_address, to_address,
                 amount, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(DbHash::from(deposit.txid))
        .bind(i64::try_from(deposit.log_index).map_err(|_| out_of_range("log_index"))?)
        .bind(block_number(deposit.height)?)
        .bind(DbAddress::from(deposit.l1_token))
        .bind(DbAddress::from(deposit.l2_token))
        .bind(DbAddress::from(deposit.from))
        .bind(DbAddress::from(deposit.to))
        .bind(DbAmount::from(deposit.amount))
        .bind(deposit.status)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    let advanced = sqlx::query(
        r#"
        UPDATE checkpoint
        SET height = ?, blockhash = ?, updated_at = ?
        WHERE id = 1 AND height < ?
        "#,
    )
    .bind(db_height)
    .bind(DbHash::from(blockhash))
    .bind(now)
    .bind(db_height)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if advanced != 1 {
        // dropping `tx` rolls the inserts back
        return Err(StoreError::Invariant(format!(
            "checkpoint cannot move to {height}"
        )));
    }

    tx.commit().await?;
    Ok(())
}

/// Lazily yields up to `limit` deposits in `status`, oldest first.
///
/// Rows are fetched in small pages keyed on `id`, so no statement stays open
/// between items and dropping the stream releases everything.
pub(crate) fn stream_by_status(
    pool: &SqlitePool,
    status: DepositStatus,
    limit: u32,
) -> impl Stream<Item = Result<Deposit, sqlx::Error>> + Send + '_ {
    paginate(limit, move |after, page| async move {
        sqlx::query_as::<_, Deposit>(
            r#"
            SELECT id, txid, log_index, height, l1_token, l2_token, from_address, to_address,
                   amount, status, created_at, updated_at
            FROM deposits
            WHERE status = ? AND id > ?
            ORDER BY id
            LIMIT ?
            "#,
        )
        .bind(status)
        .bind(after)
        .bind(page)
        .fetch_all(pool)
        .await
    })
}

/// Lazily yields up to `limit` drips whose deposit is still `Processing`.
pub(crate) fn stream_pending_drips(
    pool: &SqlitePool,
    limit: u32,
) -> impl Stream<Item = Result<PendingDrip, sqlx::Error>> + Send + '_ {
    paginate(limit, move |after, page| async move {
        sqlx::query_as::<_, PendingDrip>(
            r#"
            SELECT drips.pid, drips.txid, drips.rawtx
            FROM drips
            JOIN deposits ON deposits.id = drips.pid
            WHERE deposits.status = ? AND drips.pid > ?
            ORDER BY drips.pid
            LIMIT ?
            "#,
        )
        .bind(DepositStatus::Processing)
        .bind(after)
        .bind(page)
        .fetch_all(pool)
        .await
    })
}

pub(crate) async fn count_drips_to(pool: &SqlitePool, to: Address) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM drips WHERE to_address = ?")
        .bind(DbAddress::from(to))
        .fetch_one(pool)
        .await
}

/// Moves a deposit to `status` and, for a payout, records its drip in the same
/// transaction.
///
/// `Processing` requires a drip, `Ignore` forbids one; the drip must belong to
/// the deposit and pay the deposit's recipient.
pub(crate) async fn insert_drip_and_set_status(
    pool: &SqlitePool,
    deposit: &Deposit,
    drip: Option<&NewDrip>,
    status: DepositStatus,
) -> Result<(), StoreError> {
    match (status, drip) {
        (DepositStatus::Processing, None) => {
            return Err(StoreError::Invariant(format!(
                "deposit {} cannot enter processing without a drip",
                deposit.id
            )))
        }
        (DepositStatus::Ignore, Some(_)) => {
            return Err(StoreError::Invariant(format!(
                "ignored deposit {} cannot carry a drip",
                deposit.id
            )))
        }
        (_, Some(drip)) if drip.pid != deposit.id || drip.to != *deposit.to_address => {
            return Err(StoreError::Invariant(format!(
                "drip (pid {}, to {:#x}) does not belong to deposit {} (to {:#x})",
                drip.pid, drip.to, deposit.id, *deposit.to_address
            )))
        }
        _ => {}
    }

    let mut tx = pool.begin().await?;
    transition(&mut tx, deposit.id, status).await?;

    if let Some(drip) = drip {
        sqlx::query(
            r#"
            INSERT INTO drips (pid, txid, from_address, to_address, amount, rawtx, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(drip.pid)
        .bind(DbHash::from(drip.txid))
        .bind(DbAddress::from(drip.from))
        .bind(DbAddress::from(drip.to))
        .bind(DbEtherAmount::from(drip.amount))
        .bind(&drip.rawtx)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Applies one legal status transition; fails unless exactly one row changed.
pub(crate) async fn set_status(
    pool: &SqlitePool,
    id: i64,
    status: DepositStatus,
) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    transition(&mut tx, id, status).await?;
    tx.commit().await?;
    Ok(())
}

/// Deposit count per status, for the status endpoint.
pub(crate) async fn status_counts(
    pool: &SqlitePool,
) -> Result<Vec<(DepositStatus, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (DepositStatus, i64)>(
        "SELECT status, COUNT(*) FROM deposits GROUP BY status ORDER BY status",
    )
    .fetch_all(pool)
    .await
}

async fn transition(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: i64,
    status: DepositStatus,
) -> Result<(), StoreError> {
    let current = sqlx::query_scalar::<_, DepositStatus>("SELECT status FROM deposits WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
    let Some(from) = current.filter(|from| from.can_transition_to(status)) else {
        return Err(StoreError::IllegalTransition {
            id,
            from: current,
            to: status,
        });
    };

    let updated = sqlx::query(
        "UPDATE deposits SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
    )
    .bind(status)
    .bind(Utc::now())
    .bind(id)
    .bind(from)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if updated != 1 {
        return Err(StoreError::Invariant(format!(
            "status update for deposit {id} touched {updated} rows"
        )));
    }
    Ok(())
}

fn block_number(height: u64) -> Result<DbBlockNumber, StoreError> {
    DbBlockNumber::try_from(height).map_err(|_| out_of_range("height"))
}

fn out_of_range(field: &str) -> StoreError {
    StoreError::Invariant(format!("{field} exceeds SQLite integer range"))
}

/// Rows that can be paged through by an increasing integer key.
pub(crate) trait Keyed {
    fn key(&self) -> i64;
}

impl Keyed for Deposit {
    fn key(&self) -> i64 {
        self.id
    }
}

impl Keyed for PendingDrip {
    fn key(&self) -> i64 {
        self.pid
    }
}

struct Cursor<F, T> {
    fetch: F,
    after: i64,
    remaining: u32,
    buffered: VecDeque<T>,
    exhausted: bool,
}

fn paginate<'a, T, F, Fut>(limit: u32, fetch: F) -> impl Stream<Item = Result<T, sqlx::Error>> + Send + 'a
where
    T: Keyed + Send + 'a,
    F: Fn(i64, u32) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Vec<T>, sqlx::Error>> + Send + 'a,
{
    let cursor = Cursor {
        fetch,
        after: 0,
        remaining: limit,
        buffered: VecDeque::<T>::new(),
        exhausted: false,
    };

    stream::try_unfold(cursor, |mut cursor| async move {
        loop {
            if cursor.remaining == 0 {
                return Ok(None);
            }
            if let Some(row) = cursor.buffered.pop_front() {
                cursor.after = row.key();
                cursor.remaining -= 1;
                return Ok(Some((row, cursor)));
            }
            if cursor.exhausted {
                return Ok(None);
            }

            let page = cursor.remaining.min(FETCH_PAGE);
            let rows = (cursor.fetch)(cursor.after, page).await?;
            cursor.exhausted = rows.len() < page as usize;
            cursor.buffered = rows.into();
        }
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy_primitives::U256;
    use futures_util::TryStreamExt;

    /// Single-connection in-memory database with the real schema.
    pub(crate) async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    pub(crate) fn new_deposit(n: u8, height: u64) -> NewDeposit {
        NewDeposit {
            txid: B256::repeat_byte(n),
            log_index: 0,
            height,
            l1_token: Address::repeat_byte(0xa1),
            l2_token: Address::repeat_byte(0xa2),
            from: Address::repeat_byte(0xf0),
            to: Address::repeat_byte(n),
            amount: U256::from(1_000u64) * U256::from(n),
            status: DepositStatus::Unprocessed,
        }
    }

    /// Stores `batch` as one synced range just above the current checkpoint
    /// and returns the stored rows in insertion order.
    pub(crate) async fn seed(pool: &SqlitePool, batch: &[NewDeposit]) -> Vec<Deposit> {
        let checkpoint = init_checkpoint(pool, 0).await.unwrap();
        let height = batch
            .iter()
            .map(|d| d.height)
            .max()
            .unwrap_or(0)
            .max(u64::from(checkpoint.height) + 1);
        insert_deposits_and_advance_checkpoint(pool, batch, height, B256::ZERO)
            .await
            .unwrap();

        let mut rows = Vec::new();
        for deposit in batch {
            rows.push(
                sqlx::query_as::<_, Deposit>("SELECT * FROM deposits WHERE txid = ? AND log_index = ?")
                    .bind(DbHash::from(deposit.txid))
                    .bind(deposit.log_index as i64)
                    .fetch_one(pool)
                    .await
                    .unwrap(),
            );
        }
        rows
    }

    pub(crate) async fn status_of(pool: &SqlitePool, id: i64) -> DepositStatus {
        sqlx::query_scalar("SELECT status FROM deposits WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    pub(crate) async fn drip_count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM drips")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn all(pool: &SqlitePool, status: DepositStatus) -> Vec<Deposit> {
        stream_by_status(pool, status, 1_000).try_collect().await.unwrap()
    }

    fn drip_for(deposit: &Deposit) -> NewDrip {
        NewDrip {
            pid: deposit.id,
            txid: B256::repeat_byte(0xdd),
            from: Address::repeat_byte(0xee),
            to: *deposit.to_address,
            amount: U256::from(10_000_000_000_000_000u64),
            rawtx: vec![0xc0, 1, 2, 3],
        }
    }

    #[tokio::test]
    async fn init_checkpoint_is_idempotent() {
        let pool = test_pool().await;
        assert!(get_checkpoint(&pool).await.unwrap().is_none());

        let first = init_checkpoint(&pool, 99).await.unwrap();
        let again = init_checkpoint(&pool, 5).await.unwrap();
        assert_eq!(*first.height, 99);
        assert_eq!(*again.height, 99);
        assert_eq!(*again.blockhash, B256::ZERO);
    }

    #[tokio::test]
    async fn batch_commits_deposits_with_checkpoint() {
        let pool = test_pool().await;
        init_checkpoint(&pool, 9).await.unwrap();

        let batch = vec![new_deposit(1, 10), new_deposit(2, 15)];
        insert_deposits_and_advance_checkpoint(&pool, &batch, 20, B256::repeat_byte(0x20))
            .await
            .unwrap();

        let checkpoint = get_checkpoint(&pool).await.unwrap().unwrap();
        assert_eq!(*checkpoint.height, 20);
        assert_eq!(*checkpoint.blockhash, B256::repeat_byte(0x20));

        let stored = all(&pool, DepositStatus::Unprocessed).await;
        assert_eq!(stored.len(), 2);
        assert_eq!(*stored[1].amount, U256::from(2_000u64));
        assert_eq!(*stored[1].to_address, Address::repeat_byte(2));
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_trace() {
        let pool = test_pool().await;
        init_checkpoint(&pool, 9).await.unwrap();

        // same (txid, log_index) twice violates the unique key mid-batch
        let batch = vec![new_deposit(1, 10), new_deposit(1, 11)];
        let err = insert_deposits_and_advance_checkpoint(&pool, &batch, 20, B256::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Db(_)));

        assert_eq!(*get_checkpoint(&pool).await.unwrap().unwrap().height, 9);
        assert!(all(&pool, DepositStatus::Unprocessed).await.is_empty());
    }

    #[tokio::test]
    async fn same_tx_different_log_index_are_distinct() {
        let pool = test_pool().await;
        init_checkpoint(&pool, 0).await.unwrap();

        let mut second = new_deposit(1, 10);
        second.log_index = 1;
        insert_deposits_and_advance_checkpoint(&pool, &[new_deposit(1, 10), second], 10, B256::ZERO)
            .await
            .unwrap();
        assert_eq!(all(&pool, DepositStatus::Unprocessed).await.len(), 2);
    }

    #[tokio::test]
    async fn checkpoint_never_moves_backwards() {
        let pool = test_pool().await;
        init_checkpoint(&pool, 50).await.unwrap();

        for height in [50, 40] {
            let err = insert_deposits_and_advance_checkpoint(&pool, &[], height, B256::ZERO)
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::Invariant(_)), "{height}");
        }
        assert_eq!(*get_checkpoint(&pool).await.unwrap().unwrap().height, 50);
    }

    #[tokio::test]
    async fn deposits_above_checkpoint_are_rejected() {
        let pool = test_pool().await;
        init_checkpoint(&pool, 0).await.unwrap();
        let err = insert_deposits_and_advance_checkpoint(&pool, &[new_deposit(1, 30)], 20, B256::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Invariant(_)));
    }

    #[tokio::test]
    async fn stream_respects_limit_and_order() {
        let pool = test_pool().await;
        init_checkpoint(&pool, 0).await.unwrap();
        let batch: Vec<_> = (1..=40).map(|n| new_deposit(n, 10)).collect();
        insert_deposits_and_advance_checkpoint(&pool, &batch, 10, B256::ZERO)
            .await
            .unwrap();

        let limited: Vec<Deposit> = stream_by_status(&pool, DepositStatus::Unprocessed, 25)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(limited.len(), 25);
        assert!(limited.windows(2).all(|w| w[0].id < w[1].id));

        assert_eq!(all(&pool, DepositStatus::Unprocessed).await.len(), 40);
        assert!(all(&pool, DepositStatus::Done).await.is_empty());
    }

    #[tokio::test]
    async fn stream_tolerates_writes_between_items() {
        let pool = test_pool().await;
        init_checkpoint(&pool, 0).await.unwrap();
        let batch: Vec<_> = (1..=20).map(|n| new_deposit(n, 10)).collect();
        insert_deposits_and_advance_checkpoint(&pool, &batch, 10, B256::ZERO)
            .await
            .unwrap();

        let stream = stream_by_status(&pool, DepositStatus::Unprocessed, 100);
        futures_util::pin_mut!(stream);
        let mut seen = 0;
        while let Some(deposit) = stream.try_next().await.unwrap() {
            insert_drip_and_set_status(&pool, &deposit, None, DepositStatus::Ignore)
                .await
                .unwrap();
            seen += 1;
        }
        assert_eq!(seen, 20);
        assert_eq!(all(&pool, DepositStatus::Ignore).await.len(), 20);
    }

    #[tokio::test]
    async fn drip_and_status_commit_together() {
        let pool = test_pool().await;
        init_checkpoint(&pool, 0).await.unwrap();
        insert_deposits_and_advance_checkpoint(&pool, &[new_deposit(7, 1)], 1, B256::ZERO)
            .await
            .unwrap();
        let deposit = all(&pool, DepositStatus::Unprocessed).await.remove(0);
        let drip = drip_for(&deposit);

        insert_drip_and_set_status(&pool, &deposit, Some(&drip), DepositStatus::Processing)
            .await
            .unwrap();
        assert_eq!(count_drips_to(&pool, *deposit.to_address).await.unwrap(), 1);

        let pending: Vec<PendingDrip> = stream_pending_drips(&pool, 20).try_collect().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].pid, deposit.id);
        assert_eq!(pending[0].rawtx, drip.rawtx);

        set_status(&pool, deposit.id, DepositStatus::Done).await.unwrap();
        let pending: Vec<PendingDrip> = stream_pending_drips(&pool, 20).try_collect().await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn drip_amount_is_stored_as_exact_decimal() {
        let pool = test_pool().await;
        init_checkpoint(&pool, 0).await.unwrap();
        insert_deposits_and_advance_checkpoint(&pool, &[new_deposit(7, 1)], 1, B256::ZERO)
            .await
            .unwrap();
        let deposit = all(&pool, DepositStatus::Unprocessed).await.remove(0);
        let mut drip = drip_for(&deposit);
        // one wei above an ether, not representable as f64
        drip.amount = U256::from(1_000_000_000_000_000_001u64);

        insert_drip_and_set_status(&pool, &deposit, Some(&drip), DepositStatus::Processing)
            .await
            .unwrap();

        let stored: String = sqlx::query_scalar("SELECT amount FROM drips WHERE pid = ?")
            .bind(deposit.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, "1.000000000000000001");

        let decoded: DbEtherAmount = sqlx::query_scalar("SELECT amount FROM drips WHERE pid = ?")
            .bind(deposit.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(*decoded, drip.amount);
    }

    #[tokio::test]
    async fn mismatched_drip_is_rejected() {
        let pool = test_pool().await;
        init_checkpoint(&pool, 0).await.unwrap();
        insert_deposits_and_advance_checkpoint(&pool, &[new_deposit(7, 1)], 1, B256::ZERO)
            .await
            .unwrap();
        let deposit = all(&pool, DepositStatus::Unprocessed).await.remove(0);

        let mut wrong_owner = drip_for(&deposit);
        wrong_owner.pid += 1;
        let mut wrong_recipient = drip_for(&deposit);
        wrong_recipient.to = Address::repeat_byte(0x99);

        for drip in [wrong_owner, wrong_recipient] {
            let err = insert_drip_and_set_status(&pool, &deposit, Some(&drip), DepositStatus::Processing)
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::Invariant(_)));
        }
        assert_eq!(all(&pool, DepositStatus::Unprocessed).await.len(), 1);
        assert_eq!(count_drips_to(&pool, *deposit.to_address).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn illegal_transitions_are_rejected() {
        let pool = test_pool().await;
        init_checkpoint(&pool, 0).await.unwrap();
        insert_deposits_and_advance_checkpoint(&pool, &[new_deposit(3, 1)], 1, B256::ZERO)
            .await
            .unwrap();
        let deposit = all(&pool, DepositStatus::Unprocessed).await.remove(0);

        // done is only reachable from processing
        let err = set_status(&pool, deposit.id, DepositStatus::Done).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::IllegalTransition {
                from: Some(DepositStatus::Unprocessed),
                ..
            }
        ));

        // nothing moves back into the initial state
        let err = set_status(&pool, deposit.id, DepositStatus::Unprocessed).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::IllegalTransition {
                from: Some(DepositStatus::Unprocessed),
                to: DepositStatus::Unprocessed,
                ..
            }
        ));

        set_status(&pool, deposit.id, DepositStatus::Ignore).await.unwrap();
        for next in DepositStatus::ALL {
            assert!(set_status(&pool, deposit.id, next).await.is_err(), "{next}");
        }

        let err = set_status(&pool, 12345, DepositStatus::Done).await.unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { from: None, .. }));
    }

    #[tokio::test]
    async fn counts_by_status() {
        let pool = test_pool().await;
        init_checkpoint(&pool, 0).await.unwrap();
        let mut ignored = new_deposit(2, 1);
        ignored.status = DepositStatus::Ignore;
        insert_deposits_and_advance_checkpoint(&pool, &[new_deposit(1, 1), ignored], 1, B256::ZERO)
            .await
            .unwrap();

        assert_eq!(
            status_counts(&pool).await.unwrap(),
            vec![(DepositStatus::Unprocessed, 1), (DepositStatus::Ignore, 1)]
        );
    }
}
