//! Deadline guard for provider calls

use std::future::Future;
use std::time::Duration;

use crate::error::ProviderError;

/// Run `operation`, giving up after `duration`.
///
/// On expiry the operation is dropped, so whatever it was doing is abandoned
/// and its eventual result is never observed.
pub async fn with_timeout<F, T>(
    operation: F,
    duration: Duration,
    provider_name: &str,
) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(duration, operation).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            provider: provider_name.to_string(),
            timeout_ms: duration.as_millis() as u64,
        }),
    }
}
