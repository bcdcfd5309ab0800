//! Read-only market snapshot handed to every participant call of a run.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An order already resting on the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: String,
    pub asset: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub quantity: Option<f64>,
}

/// Market snapshot for one run. Built once, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketContext {
    /// When the snapshot was taken.
    pub as_of: DateTime<Utc>,
    /// Last price per trading pair.
    #[serde(default)]
    pub prices: BTreeMap<String, f64>,
    /// Free balance of the quote currency.
    #[serde(default)]
    pub quote_balance: f64,
    #[serde(default)]
    pub open_orders: Vec<OpenOrder>,
    /// Indicators and anything else the agents consume verbatim.
    #[serde(default)]
    pub extra: serde_json::Value,
}

/// Shared handle to a run's snapshot.
pub type SharedContext = Arc<MarketContext>;

impl MarketContext {
    pub fn new(as_of: DateTime<Utc>) -> Self {
        Self {
            as_of,
            prices: BTreeMap::new(),
            quote_balance: 0.0,
            open_orders: Vec::new(),
            extra: serde_json::Value::Null,
        }
    }

    pub fn with_price(mut self, asset: &str, price: f64) -> Self {
        self.prices.insert(asset.to_string(), price);
        self
    }

    pub fn with_quote_balance(mut self, balance: f64) -> Self {
        self.quote_balance = balance;
        self
    }

    pub fn with_open_order(mut self, order: OpenOrder) -> Self {
        self.open_orders.push(order);
        self
    }

    pub fn price(&self, asset: &str) -> Option<f64> {
        self.prices.get(asset).copied()
    }

    /// Number of resting orders for one asset.
    pub fn open_orders_for(&self, asset: &str) -> usize {
        self.open_orders.iter().filter(|o| o.asset == asset).count()
    }

    pub fn shared(self) -> SharedContext {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_lookup() {
        let ctx = MarketContext::new(Utc::now())
            .with_price("BTCUSDT", 60_000.0)
            .with_quote_balance(1_000.0)
            .with_open_order(OpenOrder {
                order_id: "1".into(),
                asset: "BTCUSDT".into(),
                price: Some(58_000.0),
                quantity: Some(0.001),
            });
        assert_eq!(ctx.price("BTCUSDT"), Some(60_000.0));
        assert_eq!(ctx.price("ADAUSDT"), None);
        assert_eq!(ctx.open_orders_for("BTCUSDT"), 1);
        assert_eq!(ctx.open_orders_for("ADAUSDT"), 0);
    }

    #[test]
    fn test_deserialize_minimal() {
        let ctx: MarketContext =
            serde_json::from_str(r#"{"as_of":"2025-01-01T00:00:00Z"}"#).unwrap();
        assert!(ctx.prices.is_empty());
        assert!(ctx.extra.is_null());
    }
}
