use alloy_primitives::Address;
use async_trait::async_trait;
use chrono::Utc;
use hex_literal::hex;
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    fmt::Debug,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::indexer::deposits::NATIVE_L1_TOKEN;

/// Wrapped ether on L1; native ether is priced through it
pub(crate) static WETH9: Lazy<Address> =
    Lazy::new(|| Address::from(hex!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2")));

/// L1 stablecoins valued at exactly one USD
pub(crate) static STABLECOINS: Lazy<[Address; 4]> = Lazy::new(|| {
    [
        Address::from(hex!("dac17f958d2ee523a2206206994597c13d831ec7")), // USDT
        Address::from(hex!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48")), // USDC
        Address::from(hex!("6b175474e89094c44da98b954eedeac495271d0f")), // DAI
        Address::from(hex!("4fabb145d64652a948d72533023f6e7a623c7c53")), // BUSD
    ]
});

pub(crate) fn is_stablecoin(token: &Address) -> bool {
    STABLECOINS.contains(token)
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const TOKEN_PRICE_QUERY: &str = r#"
query tokenHourDatas($startTime: Int!, $address: Bytes!, $weth: Bytes!) {
  ethPrice: tokenHourDatas(
    first: 1
    skip: 0
    where: {token: $weth, periodStartUnix_gt: $startTime}
    orderBy: periodStartUnix
    orderDirection: asc
  ) {
    high
    low
    open
    close
  }
  tokens(where: {id: $address}) {
    name
    symbol
    decimals
    derivedETH
  }
}
"#;

/// Error types for price and token-list lookups
#[derive(Debug, Error)]
pub(crate) enum OracleError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("No ETH price in the last hour")]
    NoEthPrice,

    #[error("No price data for token {0:#x}")]
    NoData(Address),
}

/// Token metadata as reported by the subgraph
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct TokenInfo {
    pub(crate) name: String,
    pub(crate) symbol: String,
    #[serde(deserialize_with = "from_str_number")]
    pub(crate) decimals: u8,
    #[serde(rename = "derivedETH", deserialize_with = "from_str_number")]
    pub(crate) derived_eth: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TokenPrice {
    /// Price of one token in the native currency (ether)
    pub(crate) value_in_native: f64,
    pub(crate) value_in_usd: f64,
    pub(crate) info: TokenInfo,
}

#[derive(Debug, Deserialize)]
struct HourCandle {
    #[serde(deserialize_with = "from_str_number")]
    close: f64,
}

#[derive(Debug, Deserialize)]
struct PriceData {
    #[serde(rename = "ethPrice", default)]
    eth_price: Vec<HourCandle>,
    #[serde(default)]
    tokens: Vec<TokenInfo>,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<PriceData>,
    errors: Option<Value>,
}

fn from_str_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    s.parse::<T>().map_err(serde::de::Error::custom)
}

/// Source of token prices.
#[async_trait]
pub(crate) trait PriceOracle: Send + Sync + Debug {
    /// Prices an L1 token. [`OracleError::NoData`] means the token is unknown
    /// to the source, which callers treat as "not priceable" rather than a fault.
    async fn get_token(&self, token: Address) -> Result<TokenPrice, OracleError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    price: TokenPrice,
    fetched_at: Instant,
}

/// Uniswap v3 subgraph oracle with a per-token TTL cache.
#[derive(Debug)]
pub(crate) struct UniswapOracle {
    http_client: reqwest::Client,
    url: String,
    ttl: Duration,
    cache: RwLock<HashMap<Address, CacheEntry>>,
}

impl UniswapOracle {
    pub(crate) fn new(url: impl Into<String>, ttl: Duration) -> Result<Self, OracleError> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http_client,
            url: url.into(),
            ttl,
            cache: RwLock::new(HashMap::new()),
        })
    }

    async fn cached(&self, token: &Address) -> Option<TokenPrice> {
        let cache = self.cache.read().await;
        cache
            .get(token)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.price.clone())
    }

    async fn fetch(&self, token: Address) -> Result<TokenPrice, OracleError> {
        let start_time = Utc::now().timestamp() - 3600;
        let body = json!({
            "query": TOKEN_PRICE_QUERY,
            "variables": {
                "startTime": start_time,
                "address": format!("{token:#x}"),
                "weth": format!("{:#x}", *WETH9),
            }
        });

        let response: GraphQlResponse = self
            .http_client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(errors) = response.errors {
            return Err(OracleError::GraphQl(errors.to_string()));
        }
        let data = response
            .data
            .ok_or_else(|| OracleError::GraphQl("response has no data".into()))?;

        let eth_price = data.eth_price.first().ok_or(OracleError::NoEthPrice)?.close;
        let info = data
            .tokens
            .into_iter()
            .next()
            .ok_or(OracleError::NoData(token))?;

        Ok(TokenPrice {
            value_in_native: info.derived_eth,
            value_in_usd: info.derived_eth * eth_price,
            info,
        })
    }
}

#[async_trait]
impl PriceOracle for UniswapOracle {
    async fn get_token(&self, token: Address) -> Result<TokenPrice, OracleError> {
        let token = if token == *NATIVE_L1_TOKEN { *WETH9 } else { token };

        if let Some(price) = self.cached(&token).await {
            return Ok(price);
        }

        let price = self.fetch(token).await?;
        debug!(
            token = %token,
            symbol = %price.info.symbol,
            usd = price.value_in_usd,
            "Fetched token price"
        );
        self.cache.write().await.insert(
            token,
            CacheEntry {
                price: price.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(price)
    }
}
