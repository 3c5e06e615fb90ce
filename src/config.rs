use alloy_primitives::Address;
use dotenvy::dotenv;
use hex_literal::hex;
use std::{net::SocketAddr, str::FromStr};
use tracing::info;

/// Default number of trailing source-chain blocks withheld from sync
const DEFAULT_CONFIRMATION_DEPTH: u64 = 32;

/// Default and minimum width of one sync sub-range
const DEFAULT_RANGE_SYNC: u64 = 50_000;
const MIN_RANGE_SYNC: u64 = 1_000;

/// First block synced on a fresh database
const DEFAULT_START_HEIGHT: u64 = 7_501_326;

/// Deposits below this height are recorded but never paid
const DEFAULT_DRIP_HEIGHT: u64 = 7_945_105;

/// Flat rebate in destination-chain display units
const DEFAULT_DRIP_AMOUNT: f64 = 0.01;

/// Cap on the USD value of a gas-fee rebate
const DEFAULT_MAX_DRIP_USD: f64 = 250.0;

/// Payer balance that dispatch never spends below, in display units
const DEFAULT_RESERVED_BALANCE: f64 = 1.0;

const DEFAULT_SYNC_INTERVAL_S: u64 = 300;
const DEFAULT_DISPATCH_INTERVAL_S: u64 = 60;
const DEFAULT_CONFIRM_INTERVAL_S: u64 = 30;

/// Default price cache freshness in seconds
const DEFAULT_PRICE_CACHE_TTL_S: u64 = 300;

const DEFAULT_PRICE_ORACLE_URL: &str =
    "https://subgraph.satsuma-prod.com/b91d46e5018b/metis/community/uniswap-v3-mainnet/version/0.0.1/api";

const DEFAULT_BRIDGE_TOKEN_LIST_URL: &str =
    "https://raw.githubusercontent.com/MetisProtocol/metis-bridge-resources/master/metis-l2-token-list.json";

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .unwrap_or_else(|| default.to_string())
}

/// Source chains the bridge is deployed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum L1Network {
    Mainnet,
    Goerli,
}

impl L1Network {
    pub(crate) fn from_chain_id(chain_id: u64) -> Option<Self> {
        match chain_id {
            1 => Some(L1Network::Mainnet),
            5 => Some(L1Network::Goerli),
            _ => None,
        }
    }

    /// L1 standard bridge emitting the deposit events
    pub(crate) fn bridge_address(self) -> Address {
        match self {
            L1Network::Mainnet => Address::from(hex!("3980c9ed79d2c191a89e02fa3529c60ed6e9c04b")),
            L1Network::Goerli => Address::from(hex!("cf7257a86a5dbba34babcd2680f209eb9a05b2d2")),
        }
    }

    /// METIS token contract on L1
    pub(crate) fn metis_token(self) -> Address {
        match self {
            L1Network::Mainnet => Address::from(hex!("9e32b13ce7f2e80a01932b42553652e053d6ed8e")),
            L1Network::Goerli => Address::from(hex!("114f836434a9aa9ca584491e7965b16565bf5d7b")),
        }
    }
}

/// Destination chains rebates are paid on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum L2Network {
    Andromeda,
    MetisGoerli,
}

impl L2Network {
    pub(crate) fn from_chain_id(chain_id: u64) -> Option<Self> {
        match chain_id {
            1088 => Some(L2Network::Andromeda),
            599 => Some(L2Network::MetisGoerli),
            _ => None,
        }
    }
}

/// Deposit synchronizer configuration
#[derive(Debug, Clone)]
pub(crate) struct SyncConfig {
    /// JSON-RPC endpoint of the source chain
    l1_rpc_url: String,

    confirmation_depth: u64,

    /// Maximum number of blocks per sub-range
    range_sync: u64,

    start_height: u64,

    drip_height: u64,

    sync_interval_s: u64,
}

impl SyncConfig {
    pub(crate) fn new() -> Self {
        dotenv().ok(); // Load `.env` file if present

        let l1_rpc_url = env_string("L1_RPC_URL", "http://localhost:8545");
        let confirmation_depth = env_or("CONFIRMATION_DEPTH", DEFAULT_CONFIRMATION_DEPTH);
        let range_sync = env_or("RANGE_SYNC", DEFAULT_RANGE_SYNC).max(MIN_RANGE_SYNC);
        let start_height = env_or("START_HEIGHT", DEFAULT_START_HEIGHT);
        let drip_height = env_or("DRIP_HEIGHT", DEFAULT_DRIP_HEIGHT);
        let sync_interval_s = env_or("SYNC_INTERVAL_S", DEFAULT_SYNC_INTERVAL_S).max(1);

        info!(
            %l1_rpc_url,
            confirmation_depth,
            range_sync,
            start_height,
            drip_height,
            "Loaded deposit sync config:"
        );

        SyncConfig {
            l1_rpc_url,
            confirmation_depth,
            range_sync,
            start_height,
            drip_height,
            sync_interval_s,
        }
    }

    pub(crate) fn l1_rpc_url(&self) -> &str {
        &self.l1_rpc_url
    }

    pub(crate) fn confirmation_depth(&self) -> u64 {
        self.confirmation_depth
    }

    pub(crate) fn range_sync(&self) -> u64 {
        self.range_sync
    }

    pub(crate) fn start_height(&self) -> u64 {
        self.start_height
    }

    pub(crate) fn drip_height(&self) -> u64 {
        self.drip_height
    }

    pub(crate) fn sync_interval(&self) -> u64 {
        self.sync_interval_s
    }
}

/// Rebate dispatch and confirmation configuration
#[derive(Debug, Clone)]
pub(crate) struct DispatchConfig {
    /// Whether the dispatch and confirmation loops run at all
    enabled: bool,

    /// JSON-RPC endpoint of the destination chain
    l2_rpc_url: String,

    /// File holding the payer's hex private key
    key_path: String,

    /// Flat rebate in display units
    drip_amount: f64,

    max_drip_usd: f64,

    reserved_balance: f64,

    /// Optional JSON policy file; the built-in catch-all applies otherwise
    policies_path: Option<String>,

    dispatch_interval_s: u64,

    confirm_interval_s: u64,
}

impl DispatchConfig {
    pub(crate) fn new() -> Self {
        dotenv().ok();

        let enabled = env_or("DISPATCH_ENABLED", false);
        let l2_rpc_url = env_string("L2_RPC_URL", "http://localhost:8546");
        let key_path = env_string("KEY_PATH", "key.txt");
        let drip_amount = normalize_drip_amount(env_or("DRIP_AMOUNT", DEFAULT_DRIP_AMOUNT));
        let max_drip_usd = env_or("MAX_DRIP_USD", DEFAULT_MAX_DRIP_USD);
        let reserved_balance = env_or("RESERVED_BALANCE", DEFAULT_RESERVED_BALANCE);
        let policies_path = std::env::var("REBATE_POLICIES_PATH").ok();
        let dispatch_interval_s = env_or("DISPATCH_INTERVAL_S", DEFAULT_DISPATCH_INTERVAL_S).max(1);
        let confirm_interval_s = env_or("CONFIRM_INTERVAL_S", DEFAULT_CONFIRM_INTERVAL_S).max(1);

        info!(
            enabled,
            %l2_rpc_url,
            drip_amount,
            max_drip_usd,
            reserved_balance,
            ?policies_path,
            "Loaded rebate dispatch config:"
        );

        DispatchConfig {
            enabled,
            l2_rpc_url,
            key_path,
            drip_amount,
            max_drip_usd,
            reserved_balance,
            policies_path,
            dispatch_interval_s,
            confirm_interval_s,
        }
    }

    pub(crate) fn enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn l2_rpc_url(&self) -> &str {
        &self.l2_rpc_url
    }

    pub(crate) fn key_path(&self) -> &str {
        &self.key_path
    }

    pub(crate) fn drip_amount(&self) -> f64 {
        self.drip_amount
    }

    pub(crate) fn max_drip_usd(&self) -> f64 {
        self.max_drip_usd
    }

    pub(crate) fn reserved_balance(&self) -> f64 {
        self.reserved_balance
    }

    pub(crate) fn policies_path(&self) -> Option<&str> {
        self.policies_path.as_deref()
    }

    pub(crate) fn dispatch_interval(&self) -> u64 {
        self.dispatch_interval_s
    }

    pub(crate) fn confirm_interval(&self) -> u64 {
        self.confirm_interval_s
    }
}

/// Non-positive flat amounts fall back to the default.
fn normalize_drip_amount(amount: f64) -> f64 {
    if amount > 0.0 {
        amount
    } else {
        DEFAULT_DRIP_AMOUNT
    }
}

/// Price oracle and token allow-list endpoints
#[derive(Debug, Clone)]
pub(crate) struct PricingConfig {
    oracle_url: String,
    cache_ttl_s: u64,
    token_list_url: String,
}

impl PricingConfig {
    pub(crate) fn new() -> Self {
        dotenv().ok();

        let oracle_url = env_string("PRICE_ORACLE_URL", DEFAULT_PRICE_ORACLE_URL);
        let cache_ttl_s = env_or("PRICE_CACHE_TTL_S", DEFAULT_PRICE_CACHE_TTL_S);
        let token_list_url = env_string("BRIDGE_TOKEN_LIST_URL", DEFAULT_BRIDGE_TOKEN_LIST_URL);

        info!(%oracle_url, cache_ttl_s, %token_list_url, "Loaded pricing config:");

        PricingConfig {
            oracle_url,
            cache_ttl_s,
            token_list_url,
        }
    }

    pub(crate) fn oracle_url(&self) -> &str {
        &self.oracle_url
    }

    pub(crate) fn cache_ttl(&self) -> u64 {
        self.cache_ttl_s
    }

    pub(crate) fn token_list_url(&self) -> &str {
        &self.token_list_url
    }
}

/// Store location and status endpoint
#[derive(Debug, Clone)]
pub(crate) struct ServiceConfig {
    database_url: String,
    status_server_addr: SocketAddr,
}

impl ServiceConfig {
    pub(crate) fn new() -> Self {
        dotenv().ok();

        let database_url = env_string("DATABASE_URL", "sqlite://rebate.db?mode=rwc");
        let status_server_addr = env_or(
            "STATUS_SERVER_ADDR",
            SocketAddr::from(([0, 0, 0, 0], 3000)),
        );

        info!(%database_url, %status_server_addr, "Loaded service config:");

        ServiceConfig {
            database_url,
            status_server_addr,
        }
    }

    pub(crate) fn database_url(&self) -> &str {
        &self.database_url
    }

    pub(crate) fn status_server_addr(&self) -> SocketAddr {
        self.status_server_addr
    }
}

#[cfg(test)]
impl SyncConfig {
    pub(crate) fn for_test(
        confirmation_depth: u64,
        range_sync: u64,
        start_height: u64,
        drip_height: u64,
    ) -> Self {
        SyncConfig {
            l1_rpc_url: String::new(),
            confirmation_depth,
            range_sync,
            start_height,
            drip_height,
            sync_interval_s: 1,
        }
    }
}

#[cfg(test)]
impl DispatchConfig {
    pub(crate) fn for_test(drip_amount: f64, max_drip_usd: f64, reserved_balance: f64) -> Self {
        DispatchConfig {
            enabled: true,
            l2_rpc_url: String::new(),
            key_path: String::new(),
            drip_amount: normalize_drip_amount(drip_amount),
            max_drip_usd,
            reserved_balance,
            policies_path: None,
            dispatch_interval_s: 1,
            confirm_interval_s: 1,
        }
    }
}
