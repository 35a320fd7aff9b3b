//! Magnetic declination source used during calibration.

use futures::future::{self, BoxFuture, FutureExt};
use std::time::Duration;

use crate::types::Position;

/// Returns declination in radians for a position, or `None`.
pub trait DeclinationLookup: Send + Sync {
    fn lookup(&self, latitude: f64, longitude: f64) -> BoxFuture<'_, Option<f64>>;
}

/// A constant answer, e.g. read from a chart.
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedDeclination(pub Option<f64>);

impl DeclinationLookup for FixedDeclination {
    fn lookup(&self, _latitude: f64, _longitude: f64) -> BoxFuture<'_, Option<f64>> {
        future::ready(self.0).boxed()
    }
}

/// Ask `lookup` for the declination at `position`, giving up after `timeout`.
pub async fn lookup_with_timeout(
    lookup: &dyn DeclinationLookup,
    position: Position,
    timeout: Duration,
) -> Option<f64> {
    match tokio::time::timeout(timeout, lookup.lookup(position.latitude, position.longitude)).await {
        Ok(Some(value)) if value.is_finite() => Some(value),
        Ok(_) => {
            log::warn!(
                "No declination for {:.3},{:.3}; keeping previous value",
                position.latitude,
                position.longitude
            );
            None
        }
        Err(_) => {
            log::warn!("Declination lookup timed out after {:?}; keeping previous value", timeout);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverAnswers;

    impl DeclinationLookup for NeverAnswers {
        fn lookup(&self, _latitude: f64, _longitude: f64) -> BoxFuture<'_, Option<f64>> {
            future::pending().boxed()
        }
    }

    const STOCKHOLM: Position = Position {
        latitude: 59.33,
        longitude: 18.07,
    };

    #[tokio::test]
    async fn test_fixed_lookup() {
        let value = lookup_with_timeout(&FixedDeclination(Some(0.1)), STOCKHOLM, Duration::from_secs(1)).await;
        assert_eq!(value, Some(0.1));
        let value = lookup_with_timeout(&FixedDeclination(None), STOCKHOLM, Duration::from_secs(1)).await;
        assert_eq!(value, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_lookup_times_out() {
        let value = lookup_with_timeout(&NeverAnswers, STOCKHOLM, Duration::from_secs(10)).await;
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_non_finite_rejected() {
        let value = lookup_with_timeout(&FixedDeclination(Some(f64::NAN)), STOCKHOLM, Duration::from_secs(1)).await;
        assert!(value.is_none());
    }
}
