// Current-position lookup with a caller-specified timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::LocationError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Position, LocationError>;
}

// Serves a configured position, or PositionUnavailable when none is set.
#[derive(Debug, Clone, Default)]
pub struct FixedLocationProvider {
    position: Option<Position>,
}

impl FixedLocationProvider {
    pub fn new(position: Option<Position>) -> Self {
        Self { position }
    }
}

#[async_trait]
impl LocationProvider for FixedLocationProvider {
    async fn current_position(&self) -> Result<Position, LocationError> {
        self.position.ok_or_else(|| {
            LocationError::PositionUnavailable("no position configured".to_string())
        })
    }
}

pub async fn get_current_location(
    provider: &dyn LocationProvider,
    timeout: Duration,
) -> Result<Position, LocationError> {
    match tokio::time::timeout(timeout, provider.current_position()).await {
        Ok(result) => result,
        Err(_) => {
            warn!("location lookup timed out after {}ms", timeout.as_millis());
            Err(LocationError::Timeout(timeout.as_millis() as u64))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowProvider;

    #[async_trait]
    impl LocationProvider for SlowProvider {
        async fn current_position(&self) -> Result<Position, LocationError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Position {
                latitude: 0.0,
                longitude: 0.0,
                accuracy: 1.0,
            })
        }
    }

    struct DeniedProvider;

    #[async_trait]
    impl LocationProvider for DeniedProvider {
        async fn current_position(&self) -> Result<Position, LocationError> {
            Err(LocationError::PermissionDenied)
        }
    }

    #[tokio::test]
    async fn test_fixed_position() {
        let position = Position {
            latitude: 37.77,
            longitude: -122.42,
            accuracy: 25.0,
        };
        let provider = FixedLocationProvider::new(Some(position));
        let found = get_current_location(&provider, Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(found, position);
    }

    #[tokio::test]
    async fn test_error_kinds_are_distinct() {
        let unavailable = get_current_location(&FixedLocationProvider::default(), Duration::from_secs(1)).await;
        assert!(matches!(unavailable, Err(LocationError::PositionUnavailable(_))));

        let denied = get_current_location(&DeniedProvider, Duration::from_secs(1)).await;
        assert_eq!(denied, Err(LocationError::PermissionDenied));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let result = get_current_location(&SlowProvider, Duration::from_secs(10)).await;
        assert_eq!(result, Err(LocationError::Timeout(10_000)));
    }
}
