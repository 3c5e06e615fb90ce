use alloy_primitives::utils::{format_units, parse_units};
use alloy_primitives::{Address, B256, U256};
use sqlx::{
    sqlite::{SqliteTypeInfo, SqliteValueRef},
    Decode, Encode, Sqlite, Type,
};
use std::{fmt::Display, ops::Deref, str::FromStr};

use crate::evm::units::NATIVE_DECIMALS;

/// Lifecycle of a deposit record.
///
/// Legal transitions are `Unprocessed -> Processing | Ignore` and
/// `Processing -> Done`. `Done` and `Ignore` are terminal. A deposit may also be
/// *created* as `Ignore` when the synchronizer already knows it won't be paid.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Type)]
#[repr(i32)]
pub(crate) enum DepositStatus {
    Unprocessed = 0,
    Processing = 1,
    Done = 2,
    Ignore = 3,
}

impl DepositStatus {
    pub(crate) const ALL: [DepositStatus; 4] = [
        DepositStatus::Unprocessed,
        DepositStatus::Processing,
        DepositStatus::Done,
        DepositStatus::Ignore,
    ];

    /// The only state a transition into `self` may start from
    pub(crate) fn predecessor(self) -> Option<DepositStatus> {
        match self {
            DepositStatus::Unprocessed => None,
            DepositStatus::Processing | DepositStatus::Ignore => Some(DepositStatus::Unprocessed),
            DepositStatus::Done => Some(DepositStatus::Processing),
        }
    }

    pub(crate) fn can_transition_to(self, next: DepositStatus) -> bool {
        next.predecessor() == Some(self)
    }
}

impl Display for DepositStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DepositStatus::Unprocessed => "unprocessed",
            DepositStatus::Processing => "processing",
            DepositStatus::Done => "done",
            DepositStatus::Ignore => "ignore",
        };
        write!(f, "{}", s)
    }
}

/// ───── Transaction / block hash ────────────────────────────────────────
/// Stored as `0x`-prefixed lower-case hex.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct DbHash(B256);

impl Deref for DbHash {
    type Target = B256;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<B256> for DbHash {
    fn from(hash: B256) -> Self {
        Self(hash)
    }
}

impl Type<Sqlite> for DbHash {
    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }
}

impl<'r> Decode<'r, Sqlite> for DbHash {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let s: String = Decode::<'r, Sqlite>::decode(value)?;
        Ok(DbHash(B256::from_str(&s)?))
    }
}

impl<'q> Encode<'q, Sqlite> for DbHash {
    fn encode_by_ref(
        &self,
        buf: &mut <Sqlite as sqlx::Database>::ArgumentBuffer<'q>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Encode::<Sqlite>::encode_by_ref(&format!("{:#x}", self.0), buf)
    }
}

/// ───── Account / token address ─────────────────────────────────────────
/// Stored lower-cased so equality in SQL matches equality in Rust.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct DbAddress(Address);

impl Deref for DbAddress {
    type Target = Address;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Address> for DbAddress {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl Type<Sqlite> for DbAddress {
    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }
}

impl<'r> Decode<'r, Sqlite> for DbAddress {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let s: String = Decode::<'r, Sqlite>::decode(value)?;
        Ok(DbAddress(Address::from_str(&s)?))
    }
}

impl<'q> Encode<'q, Sqlite> for DbAddress {
    fn encode_by_ref(
        &self,
        buf: &mut <Sqlite as sqlx::Database>::ArgumentBuffer<'q>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Encode::<Sqlite>::encode_by_ref(&format!("{:#x}", self.0), buf)
    }
}

/// ───── Token amount in base units ──────────────────────────────────────
/// SQLite has no 256-bit integer, so the decimal string is stored.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct DbAmount(U256);

impl Deref for DbAmount {
    type Target = U256;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<U256> for DbAmount {
    fn from(v: U256) -> Self {
        Self(v)
    }
}

impl Type<Sqlite> for DbAmount {
    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }
}

impl<'r> Decode<'r, Sqlite> for DbAmount {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let s: String = Decode::<'r, Sqlite>::decode(value)?;
        Ok(DbAmount(U256::from_str_radix(&s, 10)?))
    }
}

impl<'q> Encode<'q, Sqlite> for DbAmount {
    fn encode_by_ref(
        &self,
        buf: &mut <Sqlite as sqlx::Database>::ArgumentBuffer<'q>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Encode::<Sqlite>::encode_by_ref(&self.0.to_string(), buf)
    }
}

/// ───── Native amount in display units ─────────────────────────────────
/// Held as wei, stored as the exact 18-decimals string (`0.010000000000000000`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct DbEtherAmount(U256);

impl Deref for DbEtherAmount {
    type Target = U256;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<U256> for DbEtherAmount {
    fn from(wei: U256) -> Self {
        Self(wei)
    }
}

impl Type<Sqlite> for DbEtherAmount {
    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }
}

impl<'r> Decode<'r, Sqlite> for DbEtherAmount {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let s: String = Decode::<'r, Sqlite>::decode(value)?;
        Ok(DbEtherAmount(parse_units(&s, NATIVE_DECIMALS)?.get_absolute()))
    }
}

impl<'q> Encode<'q, Sqlite> for DbEtherAmount {
    fn encode_by_ref(
        &self,
        buf: &mut <Sqlite as sqlx::Database>::ArgumentBuffer<'q>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Encode::<Sqlite>::encode_by_ref(&format_units(self.0, NATIVE_DECIMALS)?, buf)
    }
}

/// ───── Block number ────────────────────────────────────────────────────
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Type)]
#[sqlx(transparent)]
pub(crate) struct DbBlockNumber(i64);

impl Deref for DbBlockNumber {
    type Target = i64;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for DbBlockNumber {
    type Error = std::num::TryFromIntError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value).map(Self)
    }
}

impl From<DbBlockNumber> for u64 {
    fn from(value: DbBlockNumber) -> Self {
        value.0.max(0) as u64
    }
}
