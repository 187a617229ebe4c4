//! Soft-timeout wrapper for async operations
//!
//! The workflow scheduler imposes no timeouts of its own; callers that
//! want a per-vertex bound wrap the task body with [`with_timeout`].

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout as tokio_timeout;

/// Error from a timed operation.
#[derive(Debug)]
pub enum TimeoutError<E> {
    /// The operation finished but failed
    OperationFailed(E),
    /// The deadline elapsed first
    Timeout(Duration),
}

impl<E: std::fmt::Display> std::fmt::Display for TimeoutError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutError::OperationFailed(e) => write!(f, "operation failed: {e}"),
            TimeoutError::Timeout(d) => write!(f, "operation timed out after {d:?}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for TimeoutError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TimeoutError::OperationFailed(e) => Some(e),
            TimeoutError::Timeout(_) => None,
        }
    }
}

/// Run `operation` with a deadline.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tooling::async_utils::timeout::{with_timeout, TimeoutError};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let slow = async {
///     tokio::time::sleep(Duration::from_secs(60)).await;
///     Ok::<_, String>("done")
/// };
/// let result = with_timeout(Duration::from_millis(10), slow).await;
/// assert!(matches!(result, Err(TimeoutError::Timeout(_))));
/// # }
/// ```
pub async fn with_timeout<F, T, E>(
    duration: Duration,
    operation: F,
) -> Result<T, TimeoutError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio_timeout(duration, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(TimeoutError::OperationFailed(error)),
        Err(_elapsed) => Err(TimeoutError::Timeout(duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let result: Result<i32, TimeoutError<String>> =
            with_timeout(Duration::from_secs(1), async { Ok(42) }).await;
        assert!(matches!(result, Ok(42)));
    }

    #[tokio::test]
    async fn test_times_out() {
        let result: Result<(), TimeoutError<String>> =
            with_timeout(Duration::from_millis(5), async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(TimeoutError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_propagates_operation_failure() {
        let result: Result<(), TimeoutError<String>> =
            with_timeout(Duration::from_secs(1), async { Err("boom".to_string()) }).await;
        match result {
            Err(TimeoutError::OperationFailed(e)) => assert_eq!(e, "boom"),
            other => panic!("expected OperationFailed, got {other:?}"),
        }
    }
}
