use std::future::Future;
use std::time::Duration;

use crate::error::ProviderError;

/// Await a collaborator call, failing with `ProviderError::Timeout` after `limit`.
pub async fn within<T, F>(provider: &str, limit: Duration, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            provider: provider.to_string(),
            seconds: limit.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let result: Result<(), _> = within("search", Duration::from_secs(2), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        assert_eq!(
            result.unwrap_err(),
            ProviderError::Timeout {
                provider: "search".to_string(),
                seconds: 2
            }
        );
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let result = within("llm", Duration::from_secs(2), async { Ok::<_, ProviderError>(7) }).await;
        assert_eq!(result, Ok(7));
    }
}
