//! Atomic trading actions and their normalised form.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Closed set of atomic actions a participant may propose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    PlaceLimitBuy,
    PlaceLimitSell,
    PlaceMarketBuy,
    PlaceMarketSell,
    CancelOrder,
    Hold,
}

impl ActionKind {
    /// Normalised side of this action kind.
    pub fn normalized(self) -> NormalizedAction {
        match self {
            Self::PlaceLimitBuy | Self::PlaceMarketBuy => NormalizedAction::Buy,
            Self::PlaceLimitSell | Self::PlaceMarketSell => NormalizedAction::Sell,
            Self::CancelOrder => NormalizedAction::Cancel,
            Self::Hold => NormalizedAction::Hold,
        }
    }

    /// Whether this is a price-bounded order.
    pub fn is_limit(self) -> bool {
        matches!(self, Self::PlaceLimitBuy | Self::PlaceLimitSell)
    }

    /// Whether this action places a new order.
    pub fn is_order(self) -> bool {
        matches!(
            self,
            Self::PlaceLimitBuy
                | Self::PlaceLimitSell
                | Self::PlaceMarketBuy
                | Self::PlaceMarketSell
        )
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PlaceLimitBuy => write!(f, "PLACE_LIMIT_BUY"),
            Self::PlaceLimitSell => write!(f, "PLACE_LIMIT_SELL"),
            Self::PlaceMarketBuy => write!(f, "PLACE_MARKET_BUY"),
            Self::PlaceMarketSell => write!(f, "PLACE_MARKET_SELL"),
            Self::CancelOrder => write!(f, "CANCEL_ORDER"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

/// Coarse action used for agreement detection and tie-breaking only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NormalizedAction {
    Buy,
    Sell,
    Hold,
    Cancel,
}

impl std::fmt::Display for NormalizedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
            Self::Cancel => write!(f, "CANCEL"),
        }
    }
}

/// A single atomic action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TradeAction {
    /// Action kind.
    #[serde(rename = "type")]
    pub kind: ActionKind,
    /// Trading pair, e.g. `BTCUSDT`. Required for orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    /// Base-asset quantity. Required for orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    /// Limit price. Required for limit orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Order to cancel. Required for `CANCEL_ORDER`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub reasoning: String,
}

impl TradeAction {
    /// A HOLD action carrying the given reasoning.
    pub fn hold(reasoning: &str) -> Self {
        Self {
            kind: ActionKind::Hold,
            asset: None,
            quantity: None,
            price: None,
            order_id: None,
            reasoning: reasoning.to_string(),
        }
    }

    pub fn limit_buy(asset: &str, quantity: f64, price: f64) -> Self {
        Self::order(ActionKind::PlaceLimitBuy, asset, quantity, Some(price))
    }

    pub fn limit_sell(asset: &str, quantity: f64, price: f64) -> Self {
        Self::order(ActionKind::PlaceLimitSell, asset, quantity, Some(price))
    }

    pub fn market_buy(asset: &str, quantity: f64) -> Self {
        Self::order(ActionKind::PlaceMarketBuy, asset, quantity, None)
    }

    pub fn market_sell(asset: &str, quantity: f64) -> Self {
        Self::order(ActionKind::PlaceMarketSell, asset, quantity, None)
    }

    pub fn cancel(asset: &str, order_id: &str) -> Self {
        Self {
            kind: ActionKind::CancelOrder,
            asset: Some(asset.to_string()),
            quantity: None,
            price: None,
            order_id: Some(order_id.to_string()),
            reasoning: String::new(),
        }
    }

    fn order(kind: ActionKind, asset: &str, quantity: f64, price: Option<f64>) -> Self {
        Self {
            kind,
            asset: Some(asset.to_string()),
            quantity: Some(quantity),
            price,
            order_id: None,
            reasoning: String::new(),
        }
    }

    /// Check the fields required by this action's kind.
    pub fn check_shape(&self) -> Result<(), String> {
        if self.kind.is_order() {
            match self.asset.as_deref() {
                Some(a) if !a.trim().is_empty() => {}
                _ => return Err(format!("{} requires an asset", self.kind)),
            }
            match self.quantity {
                Some(q) if q.is_finite() && q > 0.0 => {}
                _ => return Err(format!("{} requires a positive quantity", self.kind)),
            }
        }
        if self.kind.is_limit() {
            match self.price {
                Some(p) if p.is_finite() && p > 0.0 => {}
                _ => return Err(format!("{} requires a positive price", self.kind)),
            }
        }
        if self.kind == ActionKind::CancelOrder
            && self.order_id.as_deref().map_or(true, |id| id.trim().is_empty())
        {
            return Err("CANCEL_ORDER requires an order_id".to_string());
        }
        Ok(())
    }
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let asset = self.asset.as_deref().unwrap_or("-");
        match self.kind {
            ActionKind::Hold => write!(f, "HOLD"),
            ActionKind::CancelOrder => write!(
                f,
                "CANCEL {} order {}",
                asset,
                self.order_id.as_deref().unwrap_or("?")
            ),
            ActionKind::PlaceLimitBuy | ActionKind::PlaceLimitSell => write!(
                f,
                "{} {} {} @ {}",
                self.kind,
                self.quantity.unwrap_or(0.0),
                asset,
                self.price.unwrap_or(0.0)
            ),
            ActionKind::PlaceMarketBuy | ActionKind::PlaceMarketSell => {
                write!(f, "{} {} {}", self.kind, self.quantity.unwrap_or(0.0), asset)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        assert_eq!(ActionKind::PlaceLimitBuy.normalized(), NormalizedAction::Buy);
        assert_eq!(ActionKind::PlaceMarketBuy.normalized(), NormalizedAction::Buy);
        assert_eq!(ActionKind::PlaceLimitSell.normalized(), NormalizedAction::Sell);
        assert_eq!(ActionKind::PlaceMarketSell.normalized(), NormalizedAction::Sell);
        assert_eq!(ActionKind::CancelOrder.normalized(), NormalizedAction::Cancel);
        assert_eq!(ActionKind::Hold.normalized(), NormalizedAction::Hold);
    }

    #[test]
    fn test_action_kind_serde() {
        let json = serde_json::to_string(&ActionKind::PlaceLimitBuy).unwrap();
        assert_eq!(json, "\"PLACE_LIMIT_BUY\"");
        let parsed: ActionKind = serde_json::from_str("\"CANCEL_ORDER\"").unwrap();
        assert_eq!(parsed, ActionKind::CancelOrder);
        assert!(serde_json::from_str::<ActionKind>("\"BUY_THE_DIP\"").is_err());
    }

    #[test]
    fn test_trade_action_wire_shape() {
        let json = r#"{"type":"PLACE_LIMIT_BUY","asset":"BTCUSDT","quantity":0.001,"price":60000.0}"#;
        let action: TradeAction = serde_json::from_str(json).unwrap();
        assert_eq!(action.kind, ActionKind::PlaceLimitBuy);
        assert_eq!(action.price, Some(60000.0));
        assert!(action.reasoning.is_empty());
        assert!(action.check_shape().is_ok());
    }

    #[test]
    fn test_check_shape_rejects_incomplete_orders() {
        let mut no_price = TradeAction::limit_buy("BTCUSDT", 0.001, 60000.0);
        no_price.price = None;
        assert!(no_price.check_shape().unwrap_err().contains("price"));

        let zero_qty = TradeAction::market_sell("BTCUSDT", 0.0);
        assert!(zero_qty.check_shape().unwrap_err().contains("quantity"));

        let mut no_asset = TradeAction::market_buy("BTCUSDT", 1.0);
        no_asset.asset = None;
        assert!(no_asset.check_shape().unwrap_err().contains("asset"));

        let mut no_id = TradeAction::cancel("BTCUSDT", "42");
        no_id.order_id = Some("  ".to_string());
        assert!(no_id.check_shape().is_err());

        assert!(TradeAction::hold("wait").check_shape().is_ok());
    }

    #[test]
    fn test_display() {
        assert_eq!(TradeAction::hold("x").to_string(), "HOLD");
        assert_eq!(
            TradeAction::market_buy("ADAUSDT", 25.0).to_string(),
            "PLACE_MARKET_BUY 25 ADAUSDT"
        );
        assert_eq!(NormalizedAction::Cancel.to_string(), "CANCEL");
    }
}
