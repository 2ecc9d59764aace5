use std::future::Future;
use std::time::Duration;

use crate::error::{Result, RpcError};

/// Await `fut` for at most `dur`, mapping expiry to [`RpcError::Timeout`]
pub async fn with_timeout_error<F, T>(fut: F, dur: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(dur, fut).await {
        Ok(result) => result,
        Err(_) => Err(RpcError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_within_deadline() {
        let value = with_timeout_error(async { Ok(7) }, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn expiry_becomes_timeout() {
        let err = with_timeout_error(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            Duration::from_millis(20),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RpcError::Timeout));
    }

    #[tokio::test]
    async fn inner_error_passes_through() {
        let err = with_timeout_error(
            async { Err::<(), _>(RpcError::ConnectionClosed) },
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RpcError::ConnectionClosed));
    }
}
