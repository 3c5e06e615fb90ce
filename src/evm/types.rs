use alloy_primitives::{Address, Bytes, B256, U256};
use serde::de::Error;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Map, Value};

/// Represents a subset of an Ethereum log entry returned by `eth_getLogs`.
///
/// `removed` and `transactionIndex` are omitted; the synchronizer only reads
/// logs below the confirmation depth.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub(crate) struct LogEntry {
    /// The emitting contract address (the L1 standard bridge)
    pub(crate) address: Address,
    /// ABI-encoded non-indexed event fields
    pub(crate) data: Bytes,
    /// Indexed event parameters; the first topic is the event selector
    pub(crate) topics: Vec<B256>,

    /// Block number containing the log
    #[serde(rename = "blockNumber", deserialize_with = "from_hex_u64")]
    pub(crate) block_number: u64,

    /// Source chain transaction hash
    #[serde(rename = "transactionHash")]
    pub(crate) transaction_hash: B256,

    /// Position of the log inside its block
    #[serde(rename = "logIndex", deserialize_with = "from_hex_u64")]
    pub(crate) log_index: u64,
}

/// Block header fields needed to stamp a checkpoint.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub(crate) struct BlockHeader {
    pub(crate) hash: B256,
    #[serde(deserialize_with = "from_hex_u64")]
    pub(crate) number: u64,
    /// Unix seconds
    #[serde(deserialize_with = "from_hex_u64")]
    pub(crate) timestamp: u64,
}

/// Transaction as returned by `eth_getTransactionByHash`; only the gas price
/// is of interest.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub(crate) struct RpcTransaction {
    /// Effective gas price for mined transactions
    #[serde(rename = "gasPrice", default, deserialize_with = "from_opt_hex_u128")]
    pub(crate) gas_price: Option<u128>,
}

/// Receipt as returned by `eth_getTransactionReceipt`.
///
/// Existence of a receipt is what marks a drip as settled; `status` is kept
/// for logging only.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub(crate) struct RpcReceipt {
    #[serde(rename = "transactionHash")]
    pub(crate) transaction_hash: B256,
    #[serde(rename = "blockNumber", deserialize_with = "from_hex_u64")]
    pub(crate) block_number: u64,
    #[serde(rename = "gasUsed", deserialize_with = "from_hex_u64")]
    pub(crate) gas_used: u64,
    #[serde(
        rename = "effectiveGasPrice",
        default,
        deserialize_with = "from_opt_hex_u128"
    )]
    pub(crate) effective_gas_price: Option<u128>,
    #[serde(default, deserialize_with = "from_opt_hex_u64")]
    pub(crate) status: Option<u64>,
}

/// Parameters of an `eth_getLogs` query over one contract and one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LogFilter {
    pub(crate) address: Address,
    pub(crate) topic0: B256,
    pub(crate) from_block: u64,
    pub(crate) to_block: u64,
}

impl LogFilter {
    pub(crate) fn to_json(&self) -> Value {
        json!({
            "fromBlock": format!("{:#x}", self.from_block),
            "toBlock": format!("{:#x}", self.to_block),
            "address": format!("{:#x}", self.address),
            "topics": [format!("{:#x}", self.topic0)]
        })
    }
}

/// Call object shared by `eth_call` and `eth_estimateGas`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CallRequest {
    pub(crate) from: Option<Address>,
    pub(crate) to: Address,
    pub(crate) value: Option<U256>,
    pub(crate) data: Option<Bytes>,
}

impl CallRequest {
    pub(crate) fn to_json(&self) -> Value {
        let mut call = Map::new();
        if let Some(from) = self.from {
            call.insert("from".into(), json!(format!("{from:#x}")));
        }
        call.insert("to".into(), json!(format!("{:#x}", self.to)));
        if let Some(value) = self.value {
            call.insert("value".into(), json!(format!("{value:#x}")));
        }
        if let Some(data) = &self.data {
            call.insert("data".into(), json!(format!("0x{}", hex::encode(data))));
        }
        Value::Object(call)
    }
}

fn parse_hex_u128<E: Error>(hex_str: &str) -> Result<u128, E> {
    u128::from_str_radix(hex_str.trim_start_matches("0x"), 16).map_err(E::custom)
}

fn from_hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let hex_str: String = Deserialize::deserialize(deserializer)?;
    u64::from_str_radix(hex_str.trim_start_matches("0x"), 16).map_err(serde::de::Error::custom)
}

fn from_opt_hex_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let hex_str: Option<String> = Deserialize::deserialize(deserializer)?;
    hex_str
        .map(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(D::Error::custom))
        .transpose()
}

fn from_opt_hex_u128<'de, D>(deserializer: D) -> Result<Option<u128>, D::Error>
where
    D: Deserializer<'de>,
{
    let hex_str: Option<String> = Deserialize::deserialize(deserializer)?;
    hex_str.map(|s| parse_hex_u128(&s)).transpose()
}
