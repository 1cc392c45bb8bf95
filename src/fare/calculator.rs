//! Demand-adjusted fare quotes with a short-lived cache.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::FareConfig;
use crate::fare::FareError;
use crate::geo::{cell_of, Position};
use crate::observability::metrics;
use crate::rides::{unix_now, Fare};
use crate::store::{keys, GeoStore};

/// Fare for a trip of `distance_km` from a cell with `waiting` riders,
/// rounded to cents.
pub fn fare_amount(distance_km: f64, waiting: u64, config: &FareConfig) -> f64 {
    let multiplier = (1.0 + config.demand_step * waiting as f64).min(config.max_multiplier);
    let amount = (distance_km * config.per_km * multiplier).max(config.min_fare);
    (amount * 100.0).round() / 100.0
}

/// Quotes fares against the configured reference point.
#[derive(Clone)]
pub struct FareCalculator {
    store: Arc<dyn GeoStore>,
    config: FareConfig,
    reference: Position,
    precision: usize,
}

impl FareCalculator {
    pub fn new(
        store: Arc<dyn GeoStore>,
        config: FareConfig,
        reference: Position,
        precision: usize,
    ) -> Self {
        Self {
            store,
            config,
            reference,
            precision,
        }
    }

    /// Quote a fare for a pickup at `position`.
    ///
    /// A cached amount for the same cell and coordinates is returned as is.
    pub async fn quote(&self, position: Position) -> Result<Fare, FareError> {
        if !position.is_valid() {
            return Err(FareError::InvalidPosition {
                lat: position.lat,
                lng: position.lng,
            });
        }

        let cell = cell_of(position, self.precision)?;
        let key = keys::fare(&cell, position);

        if let Some(amount) = self.store.cached_fare(&key).await? {
            metrics::record_fare_quote(true);
            return Ok(Fare {
                id: unix_now(),
                amount,
            });
        }

        let waiting = self.store.waiting_count(&cell).await?;
        let amount = fare_amount(position.distance_km(&self.reference), waiting, &self.config);
        self.store
            .cache_fare(&key, amount, Duration::from_secs(self.config.cache_ttl_secs))
            .await?;

        metrics::record_fare_quote(false);
        debug!(cell = %cell, waiting = waiting, amount = amount, "Fare computed");
        Ok(Fare {
            id: unix_now(),
            amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rides::{RiderRecord, RiderStatus};
    use crate::store::MemoryStore;

    fn config() -> FareConfig {
        FareConfig::default()
    }

    #[test]
    fn test_minimum_fare_applies() {
        assert_eq!(fare_amount(1.0, 0, &config()), 50.0);
    }

    #[test]
    fn test_demand_multiplier_and_cap() {
        assert_eq!(fare_amount(10.0, 0, &config()), 120.0);
        assert_eq!(fare_amount(10.0, 4, &config()), 144.0);
        assert_eq!(fare_amount(10.0, 100, &config()), 240.0);
    }

    #[test]
    fn test_rounds_to_cents() {
        assert_eq!(fare_amount(10.123456, 0, &config()), 121.48);
    }

    #[tokio::test]
    async fn test_cached_quote_ignores_new_demand() {
        let store = MemoryStore::new();
        let calculator = FareCalculator::new(
            Arc::new(store.clone()),
            config(),
            Position::new(23.3179, 77.349225),
            6,
        );
        let pickup = Position::new(23.2599, 77.4126);

        let first = calculator.quote(pickup).await.unwrap();

        store
            .register_presence(&RiderRecord {
                id: 1,
                position: pickup,
                cell: cell_of(pickup, 6).unwrap(),
                luggage: 0,
                detour_factor: 1.0,
                status: RiderStatus::Pending,
                cab_id: None,
                last_update_ts: 0,
            })
            .await
            .unwrap();

        let second = calculator.quote(pickup).await.unwrap();
        assert_eq!(first.amount, second.amount);
    }

    #[tokio::test]
    async fn test_invalid_position_rejected() {
        let calculator = FareCalculator::new(
            Arc::new(MemoryStore::new()),
            config(),
            Position::new(0.0, 0.0),
            6,
        );
        assert!(matches!(
            calculator.quote(Position::new(120.0, 0.0)).await,
            Err(FareError::InvalidPosition { .. })
        ));
    }
}
