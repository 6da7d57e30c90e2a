//! Travel fee quotes for call-out appointments.

use crate::error::{BookingError, BookingResult};
use crate::money::Price;
use crate::ports::DistanceProvider;
use crate::settings::Settings;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

/// A priced trip from the business origin to the customer and back
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TravelQuote {
    pub fee: Price,
    pub one_way_km: f64,
    pub round_trip_km: f64,
    pub duration_minutes: u32,
}

pub struct TravelQuoter {
    distance: Arc<dyn DistanceProvider>,
}

impl TravelQuoter {
    pub fn new(distance: Arc<dyn DistanceProvider>) -> Self {
        Self { distance }
    }

    /// Price the trip to `address`.
    ///
    /// Free inside `free_travel_km` (one way). Beyond it the fee is the round
    /// trip at `travel_rate_per_km`, never less than `min_travel_fee`.
    #[instrument(skip(self, settings))]
    pub async fn quote(&self, settings: &Settings, address: &str) -> BookingResult<TravelQuote> {
        let address = address.trim();
        if address.is_empty() {
            return Err(BookingError::Validation("address is required".to_string()));
        }
        let origin = settings
            .origin_address
            .as_deref()
            .ok_or_else(|| BookingError::Configuration("origin_address is not set".to_string()))?;

        let route = self.distance.distance(origin, address).await?;
        let one_way_km = round_tenth(route.one_way_km);
        let round_trip_km = round_tenth(route.one_way_km * 2.0);

        let fee = if one_way_km <= settings.free_travel_km {
            Price::zero(settings.currency)
        } else {
            let raw = Price::new(round_trip_km * settings.travel_rate_per_km, settings.currency);
            if raw.amount < settings.min_travel_fee.amount {
                settings.min_travel_fee
            } else {
                raw
            }
        };
        debug!(one_way_km, fee = %fee.display(), "Travel quote");

        Ok(TravelQuote {
            fee,
            one_way_km,
            round_trip_km,
            duration_minutes: route.duration_minutes,
        })
    }
}

fn round_tenth(km: f64) -> f64 {
    (km * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;
    use crate::ports::RouteDistance;
    use async_trait::async_trait;

    struct FixedDistance(f64);

    #[async_trait]
    impl DistanceProvider for FixedDistance {
        async fn distance(&self, _origin: &str, _destination: &str) -> BookingResult<RouteDistance> {
            Ok(RouteDistance {
                one_way_km: self.0,
                duration_minutes: 25,
            })
        }
    }

    fn settings() -> Settings {
        Settings {
            origin_address: Some("1 Studio Rd".into()),
            travel_rate_per_km: 3.0,
            free_travel_km: 10.0,
            min_travel_fee: Price::new(80.0, Currency::ZAR),
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_inside_free_radius() {
        let quoter = TravelQuoter::new(Arc::new(FixedDistance(9.96)));
        let quote = quoter.quote(&settings(), "Kloof St").await.unwrap();
        assert_eq!(quote.fee.amount, 0);
        assert_eq!(quote.one_way_km, 10.0);
    }

    #[tokio::test]
    async fn test_round_trip_rate() {
        let quoter = TravelQuoter::new(Arc::new(FixedDistance(20.0)));
        let quote = quoter.quote(&settings(), "Sea Point").await.unwrap();
        assert_eq!(quote.round_trip_km, 40.0);
        assert_eq!(quote.fee, Price::new(120.0, Currency::ZAR));
        assert_eq!(quote.duration_minutes, 25);
    }

    #[tokio::test]
    async fn test_minimum_fee_applies() {
        let quoter = TravelQuoter::new(Arc::new(FixedDistance(10.5)));
        let quote = quoter.quote(&settings(), "Gardens").await.unwrap();
        assert_eq!(quote.fee, Price::new(80.0, Currency::ZAR));
    }

    #[tokio::test]
    async fn test_missing_origin_or_address() {
        let quoter = TravelQuoter::new(Arc::new(FixedDistance(5.0)));
        let err = quoter.quote(&Settings::default(), "Gardens").await.unwrap_err();
        assert!(matches!(err, BookingError::Configuration(_)));

        let err = quoter.quote(&settings(), "  ").await.unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
    }
}
