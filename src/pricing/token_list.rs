use alloy_primitives::Address;
use async_trait::async_trait;
use std::{collections::HashMap, fmt::Debug, str::FromStr, time::Duration};
use tracing::{debug, warn};

use super::oracle::OracleError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// L2 tokens the bridge supports, keyed by address.
pub(crate) type BridgeTokens = HashMap<Address, String>;

/// Bridge token allow-list.
#[async_trait]
pub(crate) trait TokenList: Send + Sync + Debug {
    async fn list_supported_tokens(&self) -> Result<BridgeTokens, OracleError>;
}

/// Allow-list published as a JSON object of `symbol -> L2 address`.
#[derive(Debug)]
pub(crate) struct RemoteTokenList {
    http_client: reqwest::Client,
    url: String,
}

impl RemoteTokenList {
    pub(crate) fn new(url: impl Into<String>) -> Result<Self, OracleError> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http_client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl TokenList for RemoteTokenList {
    async fn list_supported_tokens(&self) -> Result<BridgeTokens, OracleError> {
        let raw: HashMap<String, String> = self
            .http_client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut tokens = BridgeTokens::with_capacity(raw.len());
        for (symbol, address) in raw {
            match Address::from_str(address.trim()) {
                Ok(address) => {
                    tokens.insert(address, symbol);
                }
                Err(e) => warn!(%symbol, %address, %e, "Skipping malformed token list entry"),
            }
        }
        debug!(count = tokens.len(), "Fetched bridge token list");
        Ok(tokens)
    }
}
