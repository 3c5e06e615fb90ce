use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::{rpc_params, ClientError};
use jsonrpsee::http_client::HttpClient;
use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;

use super::types::{BlockHeader, CallRequest, LogEntry, LogFilter, RpcReceipt, RpcTransaction};
use crate::utils::rpc_client::create_rpc_client;

/// Error types for chain RPC access
#[derive(Debug, Error)]
pub(crate) enum RpcError {
    #[error("JSON-RPC request failed: {0}")]
    Client(#[from] ClientError),

    #[error("Malformed {field} in RPC response: {value}")]
    Malformed { field: &'static str, value: String },

    #[error("Block {0} not found")]
    BlockNotFound(u64),
}

/// Read and write access to an EVM chain.
///
/// One instance per chain; the synchronizer and the evaluator read the source
/// chain, the evaluator and the dispatcher read and write the destination chain.
#[async_trait]
pub(crate) trait EvmClient: Send + Sync + Debug {
    async fn chain_id(&self) -> Result<u64, RpcError>;

    async fn block_number(&self) -> Result<u64, RpcError>;

    async fn header_by_number(&self, number: u64) -> Result<BlockHeader, RpcError>;

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, RpcError>;

    /// Transaction count at the latest block
    async fn nonce_at(&self, account: Address) -> Result<u64, RpcError>;

    async fn balance_at(&self, account: Address) -> Result<U256, RpcError>;

    async fn code_at(&self, account: Address) -> Result<Bytes, RpcError>;

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<RpcTransaction>, RpcError>;

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<RpcReceipt>, RpcError>;

    async fn gas_price(&self) -> Result<u128, RpcError>;

    async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, RpcError>;

    async fn call(&self, call: &CallRequest) -> Result<Bytes, RpcError>;

    /// Broadcasts a signed, EIP-2718 encoded transaction
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcError>;
}

/// [`EvmClient`] over a pooled jsonrpsee HTTP client
#[derive(Debug)]
pub(crate) struct HttpEvmClient {
    client: HttpClient,
}

impl HttpEvmClient {
    pub(crate) fn new(rpc_url: &str, request_timeout: Duration) -> Result<Self, RpcError> {
        Ok(Self {
            client: create_rpc_client(rpc_url, request_timeout)?,
        })
    }
}

fn quantity_u64(field: &'static str, value: &str) -> Result<u64, RpcError> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16).map_err(|_| RpcError::Malformed {
        field,
        value: value.to_string(),
    })
}

fn quantity_u128(field: &'static str, value: &str) -> Result<u128, RpcError> {
    u128::from_str_radix(value.trim_start_matches("0x"), 16).map_err(|_| RpcError::Malformed {
        field,
        value: value.to_string(),
    })
}

fn quantity_u256(field: &'static str, value: &str) -> Result<U256, RpcError> {
    U256::from_str_radix(value.trim_start_matches("0x"), 16).map_err(|_| RpcError::Malformed {
        field,
        value: value.to_string(),
    })
}

fn data_bytes(field: &'static str, value: &str) -> Result<Bytes, RpcError> {
    hex::decode(value.trim_start_matches("0x"))
        .map(Bytes::from)
        .map_err(|_| RpcError::Malformed {
            field,
            value: value.to_string(),
        })
}

#[async_trait]
impl EvmClient for HttpEvmClient {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        let raw: String = self.client.request("eth_chainId", rpc_params![]).await?;
        quantity_u64("chainId", &raw)
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        let raw: String = self.client.request("eth_blockNumber", rpc_params![]).await?;
        quantity_u64("blockNumber", &raw)
    }

    async fn header_by_number(&self, number: u64) -> Result<BlockHeader, RpcError> {
        let header: Option<BlockHeader> = self
            .client
            .request(
                "eth_getBlockByNumber",
                rpc_params![format!("{number:#x}"), false],
            )
            .await?;
        header.ok_or(RpcError::BlockNotFound(number))
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, RpcError> {
        let logs = self
            .client
            .request("eth_getLogs", rpc_params![filter.to_json()])
            .await?;
        Ok(logs)
    }

    async fn nonce_at(&self, account: Address) -> Result<u64, RpcError> {
        let raw: String = self
            .client
            .request(
                "eth_getTransactionCount",
                rpc_params![format!("{account:#x}"), "latest"],
            )
            .await?;
        quantity_u64("nonce", &raw)
    }

    async fn balance_at(&self, account: Address) -> Result<U256, RpcError> {
        let raw: String = self
            .client
            .request(
                "eth_getBalance",
                rpc_params![format!("{account:#x}"), "latest"],
            )
            .await?;
        quantity_u256("balance", &raw)
    }

    async fn code_at(&self, account: Address) -> Result<Bytes, RpcError> {
        let raw: String = self
            .client
            .request("eth_getCode", rpc_params![format!("{account:#x}"), "latest"])
            .await?;
        data_bytes("code", &raw)
    }

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<RpcTransaction>, RpcError> {
        let tx = self
            .client
            .request("eth_getTransactionByHash", rpc_params![format!("{hash:#x}")])
            .await?;
        Ok(tx)
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<RpcReceipt>, RpcError> {
        let receipt = self
            .client
            .request(
                "eth_getTransactionReceipt",
                rpc_params![format!("{hash:#x}")],
            )
            .await?;
        Ok(receipt)
    }

    async fn gas_price(&self) -> Result<u128, RpcError> {
        let raw: String = self.client.request("eth_gasPrice", rpc_params![]).await?;
        quantity_u128("gasPrice", &raw)
    }

    async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, RpcError> {
        let raw: String = self
            .client
            .request("eth_estimateGas", rpc_params![call.to_json()])
            .await?;
        quantity_u64("gas", &raw)
    }

    async fn call(&self, call: &CallRequest) -> Result<Bytes, RpcError> {
        let raw: String = self
            .client
            .request("eth_call", rpc_params![call.to_json(), "latest"])
            .await?;
        data_bytes("returnData", &raw)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcError> {
        let hash: String = self
            .client
            .request(
                "eth_sendRawTransaction",
                rpc_params![format!("0x{}", hex::encode(raw))],
            )
            .await?;
        let bytes = data_bytes("transactionHash", &hash)?;
        if bytes.len() != 32 {
            return Err(RpcError::Malformed {
                field: "transactionHash",
                value: hash,
            });
        }
        Ok(B256::from_slice(&bytes))
    }
}
