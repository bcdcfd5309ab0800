//! Paper-trading execution venue.
//!
//! Validates candidate action lists against fixed risk limits and simulates
//! fills without touching an exchange. Calls are serialised by an internal
//! lock, so one venue can be shared by concurrent runs.

use std::sync::Mutex;

use async_trait::async_trait;
use coordination::debate::{
    ActionKind, ActionResult, ExecutionVenue, MarketContext, NormalizedAction, OrderDetails,
    TradeAction, ValidationReport, VenueError,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Safety limits applied before any action list is executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Maximum resting orders per asset.
    pub max_orders_per_asset: usize,
    /// Maximum resting orders across all assets.
    pub max_total_orders: usize,
    /// Maximum share of the quote balance a single decision may deploy.
    pub max_exposure_pct: f64,
    /// Maximum distance of a limit price from the market, in percent.
    pub max_price_deviation_pct: f64,
    /// Minimum order value in quote units.
    pub min_order_value: f64,
    /// Simulated fee as a fraction of notional.
    pub fee_rate: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_orders_per_asset: 3,
            max_total_orders: 5,
            max_exposure_pct: 50.0,
            max_price_deviation_pct: 5.0,
            min_order_value: 10.0,
            fee_rate: 0.001,
        }
    }
}

impl RiskLimits {
    /// Every limit violation in `actions`, empty when the list is acceptable.
    pub fn check(&self, actions: &[TradeAction], ctx: &MarketContext) -> Vec<String> {
        let mut errors = Vec::new();
        let mut deployed = 0.0;

        for (i, action) in actions.iter().enumerate() {
            let n = i + 1;
            if !action.kind.is_order() {
                continue;
            }
            let Some(asset) = action.asset.as_deref() else {
                errors.push(format!("Action {n}: missing asset"));
                continue;
            };
            let Some(market) = ctx.price(asset) else {
                errors.push(format!("Action {n}: unknown asset {asset}"));
                continue;
            };
            let quantity = action.quantity.unwrap_or(0.0);
            let price = action.price.unwrap_or(market);

            let existing = ctx.open_orders_for(asset);
            if existing >= self.max_orders_per_asset {
                errors.push(format!(
                    "Action {n}: already {existing} open orders for {asset} (max {})",
                    self.max_orders_per_asset
                ));
            }
            if ctx.open_orders.len() >= self.max_total_orders {
                errors.push(format!(
                    "Action {n}: already {} open orders in total (max {})",
                    ctx.open_orders.len(),
                    self.max_total_orders
                ));
            }

            if action.kind.is_limit() {
                let deviation = ((price - market) / market * 100.0).abs();
                if deviation > self.max_price_deviation_pct {
                    errors.push(format!(
                        "Action {n}: price {price:.4} deviates {deviation:.2}% from market {market:.4} (max {}%)",
                        self.max_price_deviation_pct
                    ));
                }
                if action.kind == ActionKind::PlaceLimitBuy && price > market {
                    errors.push(format!(
                        "Action {n}: buy limit {price:.4} is above market {market:.4}"
                    ));
                }
                if action.kind == ActionKind::PlaceLimitSell && price < market {
                    errors.push(format!(
                        "Action {n}: sell limit {price:.4} is below market {market:.4}"
                    ));
                }
            }

            let value = quantity * price;
            if value < self.min_order_value {
                errors.push(format!(
                    "Action {n}: order value {value:.2} is below minimum {:.2}",
                    self.min_order_value
                ));
            }
            if action.kind.normalized() == NormalizedAction::Buy {
                deployed += value;
            }
        }

        if deployed > 0.0 {
            if deployed > ctx.quote_balance {
                errors.push(format!(
                    "Insufficient quote balance: need {deployed:.2}, available {:.2}",
                    ctx.quote_balance
                ));
            } else {
                let exposure = deployed / ctx.quote_balance * 100.0;
                if exposure > self.max_exposure_pct {
                    errors.push(format!(
                        "Total exposure {deployed:.2} is {exposure:.1}% of available balance (max {}%)",
                        self.max_exposure_pct
                    ));
                }
            }
        }
        errors
    }
}

/// Simulated venue with an in-memory fill ledger.
#[derive(Debug, Default)]
pub struct PaperVenue {
    limits: RiskLimits,
    ledger: Mutex<Vec<ActionResult>>,
}

impl PaperVenue {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            ledger: Mutex::new(Vec::new()),
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Every result this venue has produced, oldest first.
    pub fn ledger(&self) -> Vec<ActionResult> {
        self.ledger
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn fill(&self, action: &TradeAction, ctx: &MarketContext) -> ActionResult {
        match action.kind {
            ActionKind::Hold => ActionResult::succeeded(action.clone(), None),
            ActionKind::CancelOrder => {
                let id = action.order_id.as_deref().unwrap_or_default();
                if ctx.open_orders.iter().any(|o| o.order_id == id) {
                    ActionResult::succeeded(
                        action.clone(),
                        Some(OrderDetails {
                            order_id: id.to_string(),
                            executed_price: None,
                            executed_quantity: None,
                            fee: None,
                        }),
                    )
                } else {
                    ActionResult::failed(action.clone(), &format!("unknown order {id}"))
                }
            }
            _ => {
                let asset = action.asset.as_deref().unwrap_or_default();
                let Some(market) = ctx.price(asset) else {
                    return ActionResult::failed(action.clone(), &format!("no price for {asset}"));
                };
                let price = if action.kind.is_limit() {
                    action.price.unwrap_or(market)
                } else {
                    market
                };
                let quantity = action.quantity.unwrap_or(0.0);
                ActionResult::succeeded(
                    action.clone(),
                    Some(OrderDetails {
                        order_id: uuid::Uuid::new_v4().to_string(),
                        executed_price: Some(price),
                        executed_quantity: Some(quantity),
                        fee: Some(price * quantity * self.limits.fee_rate),
                    }),
                )
            }
        }
    }
}

#[async_trait]
impl ExecutionVenue for PaperVenue {
    async fn validate(
        &self,
        actions: &[TradeAction],
        ctx: &MarketContext,
    ) -> Result<ValidationReport, VenueError> {
        let errors = self.limits.check(actions, ctx);
        if errors.is_empty() {
            debug!(actions = actions.len(), "Paper validation passed");
            Ok(ValidationReport::allowed())
        } else {
            for e in &errors {
                warn!(error = %e, "Paper validation failed");
            }
            Ok(ValidationReport::rejected(errors))
        }
    }

    async fn execute(
        &self,
        actions: &[TradeAction],
        ctx: &MarketContext,
    ) -> Result<Vec<ActionResult>, VenueError> {
        let mut ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
        let results: Vec<ActionResult> = actions.iter().map(|a| self.fill(a, ctx)).collect();
        for r in &results {
            info!(action = %r.action, success = r.success, "Paper fill");
        }
        ledger.extend(results.iter().cloned());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use coordination::debate::OpenOrder;

    fn ctx() -> MarketContext {
        MarketContext::new(Utc::now())
            .with_price("BTCUSDT", 60_000.0)
            .with_quote_balance(1_000.0)
    }

    fn open(asset: &str, id: &str) -> OpenOrder {
        OpenOrder {
            order_id: id.to_string(),
            asset: asset.to_string(),
            price: Some(1.0),
            quantity: Some(1.0),
        }
    }

    #[test]
    fn test_defaults() {
        let limits = RiskLimits::default();
        assert_eq!(limits.max_orders_per_asset, 3);
        assert_eq!(limits.max_total_orders, 5);
        assert_eq!(limits.max_exposure_pct, 50.0);
        assert_eq!(limits.max_price_deviation_pct, 5.0);
        assert_eq!(limits.min_order_value, 10.0);
    }

    #[test]
    fn test_reasonable_limit_buy_passes() {
        // 0.005 * 59 000 = 295, under half of 1 000.
        let actions = [TradeAction::limit_buy("BTCUSDT", 0.005, 59_000.0)];
        assert!(RiskLimits::default().check(&actions, &ctx()).is_empty());
    }

    #[test]
    fn test_hold_and_cancel_always_allowed() {
        let busy = (0..6).fold(ctx(), |c, i| c.with_open_order(open("BTCUSDT", &i.to_string())));
        let actions = [TradeAction::hold("wait"), TradeAction::cancel("BTCUSDT", "1")];
        assert!(RiskLimits::default().check(&actions, &busy).is_empty());
    }

    #[test]
    fn test_price_direction_and_deviation() {
        let limits = RiskLimits::default();
        let above = limits.check(&[TradeAction::limit_buy("BTCUSDT", 0.001, 60_500.0)], &ctx());
        assert!(above.iter().any(|e| e.contains("above market")));

        let below = limits.check(&[TradeAction::limit_sell("BTCUSDT", 0.001, 59_500.0)], &ctx());
        assert!(below.iter().any(|e| e.contains("below market")));

        let far = limits.check(&[TradeAction::limit_buy("BTCUSDT", 0.001, 50_000.0)], &ctx());
        assert!(far.iter().any(|e| e.contains("deviates")));
    }

    #[test]
    fn test_exposure_and_balance() {
        let limits = RiskLimits::default();
        // 0.01 * 60 000 = 600 of 1 000.
        let heavy = limits.check(&[TradeAction::market_buy("BTCUSDT", 0.01)], &ctx());
        assert!(heavy.iter().any(|e| e.contains("exposure")));

        let broke = limits.check(&[TradeAction::market_buy("BTCUSDT", 1.0)], &ctx());
        assert!(broke.iter().any(|e| e.contains("Insufficient")));

        // Sells do not deploy quote balance.
        let sell = limits.check(&[TradeAction::market_sell("BTCUSDT", 0.01)], &ctx());
        assert!(sell.is_empty());
    }

    #[test]
    fn test_order_counts_and_minimum() {
        let limits = RiskLimits::default();
        let crowded = (0..3).fold(ctx(), |c, i| c.with_open_order(open("BTCUSDT", &i.to_string())));
        let errors = limits.check(&[TradeAction::market_buy("BTCUSDT", 0.001)], &crowded);
        assert!(errors.iter().any(|e| e.contains("open orders for BTCUSDT")));

        let tiny = limits.check(&[TradeAction::market_buy("BTCUSDT", 0.0001)], &ctx());
        assert!(tiny.iter().any(|e| e.contains("below minimum")));

        let unknown = limits.check(&[TradeAction::market_buy("DOGEUSDT", 100.0)], &ctx());
        assert_eq!(unknown, vec!["Action 1: unknown asset DOGEUSDT".to_string()]);
    }

    #[tokio::test]
    async fn test_execute_simulates_fills() {
        let venue = PaperVenue::new(RiskLimits::default());
        let ctx = ctx().with_open_order(open("BTCUSDT", "77"));
        let actions = [
            TradeAction::limit_buy("BTCUSDT", 0.002, 59_000.0),
            TradeAction::market_sell("BTCUSDT", 0.001),
            TradeAction::cancel("BTCUSDT", "77"),
            TradeAction::cancel("BTCUSDT", "nope"),
        ];
        let results = venue.execute(&actions, &ctx).await.unwrap();

        let limit = results[0].order.as_ref().unwrap();
        assert_eq!(limit.executed_price, Some(59_000.0));
        assert!((limit.fee.unwrap() - 0.118).abs() < 1e-9);
        assert_eq!(results[1].order.as_ref().unwrap().executed_price, Some(60_000.0));
        assert!(results[2].success);
        assert!(!results[3].success);
        assert_eq!(venue.ledger().len(), 4);
    }

    #[tokio::test]
    async fn test_validate_reports_errors() {
        let venue = PaperVenue::default();
        let report = venue
            .validate(&[TradeAction::market_buy("BTCUSDT", 0.01)], &ctx())
            .await
            .unwrap();
        assert!(!report.allowed);
        assert!(!report.errors.is_empty());
    }
}
