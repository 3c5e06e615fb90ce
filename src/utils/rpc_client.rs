use jsonrpsee::core::ClientError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use std::time::Duration;
use std::{fmt, future::Future};
use tokio::time::sleep;
use tracing::warn;

use super::retry_policy::ExponentialBackoff;

/// Creates a JSON-RPC HTTP client with connection pooling and timeout configuration
///
/// The client is configured with:
///
/// - a per-request timeout (`request_timeout`) so a stalled node cannot hang a pass
/// - 10MB max request and response size, enough for one bounded `eth_getLogs` range
/// - internal connection pooling (managed by hyper)
///
/// # Errors
///
/// Returns an error if the URL cannot be parsed.
pub(crate) fn create_rpc_client(
    rpc_url: &str,
    request_timeout: Duration,
) -> Result<HttpClient, ClientError> {
    HttpClientBuilder::default()
        .request_timeout(request_timeout)
        .max_request_size(10 * 1024 * 1024)
        .max_response_size(10 * 1024 * 1024)
        .build(rpc_url)
}

/// Execute an async operation with exponential backoff retry logic
///
/// Only meant for start-up calls (chain id, payer nonce). Pass loops never
/// retry in place; they fail and wait for the next tick.
pub(crate) async fn execute_with_retries<F, Fut, T, E>(
    operation: F,
    operation_name: &str,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let retry_policy = ExponentialBackoff::new(3, 10, 1.5);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < retry_policy.max_retries() => {
                attempt += 1;
                let delay = retry_policy.get_delay(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_retries = retry_policy.max_retries(),
                    delay_secs = delay,
                    error = %e,
                    "Operation failed, retrying..."
                );
                sleep(Duration::from_secs(delay)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
