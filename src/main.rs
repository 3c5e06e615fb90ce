mod config;
mod evm;
mod indexer;
mod pricing;
mod rebate;
mod status;
mod utils;

use anyhow::anyhow;
use axum::{routing::get, Router};
use dotenvy::dotenv;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::{
    config::{DispatchConfig, L1Network, L2Network, PricingConfig, ServiceConfig, SyncConfig},
    evm::{
        client::{EvmClient, HttpEvmClient},
        signer::TransferSigner,
    },
    indexer::{
        db::{init_pool, run_migrations},
        deposits::{deposit_sync_task, DepositSyncer},
    },
    pricing::{oracle::UniswapOracle, token_list::RemoteTokenList},
    rebate::{
        confirm::{confirm_task, ConfirmationTracker},
        dispatch::{dispatch_task, Dispatcher},
        evaluator::Evaluator,
        policy::PolicySet,
    },
    status::get_rebate_status,
    utils::rpc_client::execute_with_retries,
};

/// Per-request timeout of the chain RPC clients
const RPC_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    dotenv().ok();

    let service_config = ServiceConfig::new();
    let sync_config = SyncConfig::new();
    let dispatch_config = DispatchConfig::new();

    let pool = init_pool(service_config.database_url()).await?;
    run_migrations(&pool).await?;

    let l1: Arc<dyn EvmClient> = Arc::new(HttpEvmClient::new(sync_config.l1_rpc_url(), RPC_REQUEST_TIMEOUT)?);
    let l1_chain_id = execute_with_retries(|| l1.chain_id(), "eth_chainId (L1)").await?;
    let l1_network = L1Network::from_chain_id(l1_chain_id)
        .ok_or_else(|| anyhow!("unsupported source chain id {l1_chain_id}"))?;
    info!(?l1_network, "Source chain resolved");

    let syncer = DepositSyncer::new(pool.clone(), Arc::clone(&l1), l1_network.bridge_address(), &sync_config);
    syncer.preflight().await?;

    let cancel = CancellationToken::new();
    let mut handles = vec![tokio::spawn(deposit_sync_task(
        syncer,
        Duration::from_secs(sync_config.sync_interval()),
        cancel.clone(),
    ))];

    if dispatch_config.enabled() {
        let l2: Arc<dyn EvmClient> = Arc::new(HttpEvmClient::new(dispatch_config.l2_rpc_url(), RPC_REQUEST_TIMEOUT)?);
        let l2_chain_id = execute_with_retries(|| l2.chain_id(), "eth_chainId (L2)").await?;
        let l2_network = L2Network::from_chain_id(l2_chain_id)
            .ok_or_else(|| anyhow!("unsupported destination chain id {l2_chain_id}"))?;
        info!(?l2_network, "Destination chain resolved");

        let signer = TransferSigner::from_key_file(dispatch_config.key_path(), l2_chain_id)?;
        let policies = PolicySet::load(dispatch_config.policies_path())?;
        info!(policies = policies.len(), payer = %signer.address(), "Rebate policies loaded");

        let pricing_config = PricingConfig::new();
        let oracle = Arc::new(UniswapOracle::new(
            pricing_config.oracle_url(),
            Duration::from_secs(pricing_config.cache_ttl()),
        )?);
        let token_list = Arc::new(RemoteTokenList::new(pricing_config.token_list_url())?);

        // the price subgraph only indexes mainnet tokens
        let evaluator = Evaluator::new(
            pool.clone(),
            Arc::clone(&l1),
            Arc::clone(&l2),
            oracle,
            policies,
            &dispatch_config,
            L1Network::Mainnet.metis_token(),
        );
        let dispatcher = Dispatcher::new(
            pool.clone(),
            Arc::clone(&l2),
            evaluator,
            token_list,
            signer,
            dispatch_config.reserved_balance(),
        )
        .await?;
        let tracker = ConfirmationTracker::new(pool.clone(), l2);

        handles.push(tokio::spawn(dispatch_task(
            dispatcher,
            Duration::from_secs(dispatch_config.dispatch_interval()),
            cancel.clone(),
        )));
        handles.push(tokio::spawn(confirm_task(
            tracker,
            Duration::from_secs(dispatch_config.confirm_interval()),
            cancel.clone(),
        )));
    } else {
        info!("Rebate dispatch disabled; only syncing deposits");
    }

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match shutdown_signal().await {
                Ok(signal) => {
                    info!(signal, "Shutdown requested");
                    cancel.cancel();
                }
                Err(e) => error!(%e, "Unable to listen for shutdown signal"),
            }
        }
    });

    let cors = CorsLayer::new().allow_origin(Any);
    let status_pool = pool.clone();
    let app = Router::new()
        .route("/api/status", get(move || get_rebate_status(status_pool.clone())))
        .layer(cors);

    let addr = service_config.status_server_addr();
    info!(%addr, "Server running at http://");

    let listener = TcpListener::bind(addr).await?;
    let shutdown = cancel.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;

    // stop the loops even if the server failed
    cancel.cancel();
    for handle in handles {
        handle.await?;
    }
    pool.close().await;

    served?;
    info!("Shut down cleanly");
    Ok(())
}

/// Resolves with the signal name on SIGINT (ctrl-c) or SIGTERM.
#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "SIGINT")
}
