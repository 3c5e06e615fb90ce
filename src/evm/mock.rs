//! In-memory [`EvmClient`] for service tests.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::Notify;

use super::client::{EvmClient, RpcError};
use super::types::{BlockHeader, CallRequest, LogEntry, LogFilter, RpcReceipt, RpcTransaction};

#[derive(Debug, Default)]
struct ChainState {
    chain_id: u64,
    block_number: u64,
    logs: Vec<LogEntry>,
    nonces: HashMap<Address, u64>,
    balances: HashMap<Address, U256>,
    codes: HashMap<Address, Bytes>,
    transactions: HashMap<B256, RpcTransaction>,
    receipts: HashMap<B256, RpcReceipt>,
    call_results: HashMap<Address, Bytes>,
    gas_price: u128,
    gas_estimate: u64,
    failing_headers: Vec<u64>,
    fail_broadcast: bool,
    hang_logs_from: Option<u64>,
    hung_methods: Vec<&'static str>,
    broadcasts: Vec<Vec<u8>>,
    header_requests: Vec<u64>,
}

#[derive(Debug, Default)]
pub(crate) struct MockChain {
    state: Mutex<ChainState>,
    /// Signalled whenever a call starts hanging
    hung: Notify,
}

impl MockChain {
    pub(crate) fn new(chain_id: u64) -> Self {
        let chain = Self::default();
        {
            let mut state = chain.state.lock().unwrap();
            state.chain_id = chain_id;
            state.gas_price = 1_000_000_000;
            state.gas_estimate = 21_000;
        }
        chain
    }

    pub(crate) fn set_block_number(&self, number: u64) {
        self.state.lock().unwrap().block_number = number;
    }

    pub(crate) fn push_event<E: SolEvent>(
        &self,
        contract: Address,
        event: &E,
        block_number: u64,
        tx_hash: B256,
        log_index: u64,
    ) {
        let (topics, data) = event.encode_log_data().split();
        self.state.lock().unwrap().logs.push(LogEntry {
            address: contract,
            data,
            topics,
            block_number,
            transaction_hash: tx_hash,
            log_index,
        });
    }

    pub(crate) fn push_log(&self, log: LogEntry) {
        self.state.lock().unwrap().logs.push(log);
    }

    pub(crate) fn set_nonce(&self, account: Address, nonce: u64) {
        self.state.lock().unwrap().nonces.insert(account, nonce);
    }

    pub(crate) fn set_balance(&self, account: Address, balance: U256) {
        self.state.lock().unwrap().balances.insert(account, balance);
    }

    pub(crate) fn set_code(&self, account: Address, code: Bytes) {
        self.state.lock().unwrap().codes.insert(account, code);
    }

    pub(crate) fn set_call_result(&self, contract: Address, output: Bytes) {
        self.state.lock().unwrap().call_results.insert(contract, output);
    }

    pub(crate) fn insert_transaction(&self, hash: B256, tx: RpcTransaction) {
        self.state.lock().unwrap().transactions.insert(hash, tx);
    }

    pub(crate) fn insert_receipt(&self, receipt: RpcReceipt) {
        self.state
            .lock()
            .unwrap()
            .receipts
            .insert(receipt.transaction_hash, receipt);
    }

    pub(crate) fn fail_header(&self, number: u64) {
        self.state.lock().unwrap().failing_headers.push(number);
    }

    pub(crate) fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.failing_headers.clear();
        state.fail_broadcast = false;
    }

    pub(crate) fn fail_broadcasts(&self) {
        self.state.lock().unwrap().fail_broadcast = true;
    }

    /// Log queries starting at or after `block` never return.
    pub(crate) fn hang_logs_from(&self, block: u64) {
        self.state.lock().unwrap().hang_logs_from = Some(block);
    }

    /// Calls to `method` never return.
    pub(crate) fn hang(&self, method: &'static str) {
        self.state.lock().unwrap().hung_methods.push(method);
    }

    /// Resolves once some call is hanging.
    pub(crate) async fn wait_until_hung(&self) {
        self.hung.notified().await;
    }

    async fn hang_if(&self, hang: bool) {
        if hang {
            self.hung.notify_one();
            std::future::pending::<()>().await;
        }
    }

    fn is_hung(&self, method: &str) -> bool {
        self.state.lock().unwrap().hung_methods.contains(&method)
    }

    pub(crate) fn broadcasts(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().broadcasts.clone()
    }

    pub(crate) fn header_requests(&self) -> Vec<u64> {
        self.state.lock().unwrap().header_requests.clone()
    }

    pub(crate) fn header_hash(number: u64) -> B256 {
        B256::left_padding_from(&number.to_be_bytes())
    }
}

fn matches(filter: &LogFilter, log: &LogEntry) -> bool {
    log.address == filter.address
        && log.topics.first() == Some(&filter.topic0)
        && (filter.from_block..=filter.to_block).contains(&log.block_number)
}

fn unavailable(method: &str) -> RpcError {
    RpcError::Client(jsonrpsee::core::ClientError::Custom(format!(
        "{method} unavailable"
    )))
}

#[async_trait]
impl EvmClient for MockChain {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        Ok(self.state.lock().unwrap().chain_id)
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        Ok(self.state.lock().unwrap().block_number)
    }

    async fn header_by_number(&self, number: u64) -> Result<BlockHeader, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.header_requests.push(number);
        if state.failing_headers.contains(&number) {
            return Err(unavailable("eth_getBlockByNumber"));
        }
        if number > state.block_number {
            return Err(RpcError::BlockNotFound(number));
        }
        Ok(BlockHeader {
            hash: Self::header_hash(number),
            number,
            timestamp: 1_700_000_000 + number * 12,
        })
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, RpcError> {
        let (logs, hang) = {
            let state = self.state.lock().unwrap();
            let logs: Vec<LogEntry> = state
                .logs
                .iter()
                .filter(|log| matches(filter, log))
                .cloned()
                .collect();
            let hang = state
                .hang_logs_from
                .is_some_and(|block| filter.from_block >= block);
            (logs, hang)
        };
        self.hang_if(hang).await;
        Ok(logs)
    }

    async fn nonce_at(&self, account: Address) -> Result<u64, RpcError> {
        Ok(*self.state.lock().unwrap().nonces.get(&account).unwrap_or(&0))
    }

    async fn balance_at(&self, account: Address) -> Result<U256, RpcError> {
        self.hang_if(self.is_hung("eth_getBalance")).await;
        Ok(*self
            .state
            .lock()
            .unwrap()
            .balances
            .get(&account)
            .unwrap_or(&U256::ZERO))
    }

    async fn code_at(&self, account: Address) -> Result<Bytes, RpcError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .codes
            .get(&account)
            .cloned()
            .unwrap_or_default())
    }

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<RpcTransaction>, RpcError> {
        Ok(self.state.lock().unwrap().transactions.get(&hash).cloned())
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<RpcReceipt>, RpcError> {
        self.hang_if(self.is_hung("eth_getTransactionReceipt")).await;
        Ok(self.state.lock().unwrap().receipts.get(&hash).cloned())
    }

    async fn gas_price(&self) -> Result<u128, RpcError> {
        Ok(self.state.lock().unwrap().gas_price)
    }

    async fn estimate_gas(&self, _call: &CallRequest) -> Result<u64, RpcError> {
        Ok(self.state.lock().unwrap().gas_estimate)
    }

    async fn call(&self, call: &CallRequest) -> Result<Bytes, RpcError> {
        self.state
            .lock()
            .unwrap()
            .call_results
            .get(&call.to)
            .cloned()
            .ok_or_else(|| unavailable("eth_call"))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.broadcasts.push(raw.to_vec());
        if state.fail_broadcast {
            return Err(unavailable("eth_sendRawTransaction"));
        }
        Ok(alloy_primitives::keccak256(raw))
    }
}
