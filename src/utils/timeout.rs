use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Default TCP connect timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time allowed for the remote HELLO
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a single frame write
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Run a fallible future, turning an elapsed deadline into `ProtocolError::Timeout`.
pub async fn with_timeout_error<F, T>(future: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn elapsed_deadline_maps_to_timeout() {
        let result: Result<()> = with_timeout_error(
            async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            },
            Duration::from_millis(10),
        )
        .await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }

    #[tokio::test]
    async fn inner_error_passes_through() {
        let result: Result<()> =
            with_timeout_error(async { Err(ProtocolError::NotRunning) }, WRITE_TIMEOUT).await;
        assert!(matches!(result, Err(ProtocolError::NotRunning)));
    }
}
