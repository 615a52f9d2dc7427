//! Trade intents.
//!
//! A `TradeIntent` is a proposed trade that has not yet passed the
//! guardrail. Intents arrive either directly from a user or are
//! synthesized by the conditional order monitor when an order fires.

use crate::decimal::{Price, Size};
use crate::order::{IntentId, OrderId, Pair, TradeAction, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where an intent came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "order_id", rename_all = "snake_case")]
pub enum IntentSource {
    Manual,
    Conditional(OrderId),
}

/// Proposed BUY/SELL action awaiting validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub id: IntentId,
    pub user_id: UserId,
    pub pair: Pair,
    pub action: TradeAction,
    pub position_size: Size,
    pub entry_price: Price,
    #[serde(default)]
    pub stop_loss: Option<Price>,
    #[serde(default)]
    pub take_profit: Option<Price>,
    pub source: IntentSource,
    pub created_at: DateTime<Utc>,
}

impl TradeIntent {
    /// Create a manual intent with a fresh id.
    pub fn manual(
        user_id: UserId,
        pair: Pair,
        action: TradeAction,
        position_size: Size,
        entry_price: Price,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: IntentId::new(),
            user_id,
            pair,
            action,
            position_size,
            entry_price,
            stop_loss: None,
            take_profit: None,
            source: IntentSource::Manual,
            created_at,
        }
    }

    pub fn with_stop_loss(mut self, stop_loss: Price) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    pub fn with_take_profit(mut self, take_profit: Price) -> Self {
        self.take_profit = Some(take_profit);
        self
    }

    /// Amount of equity at risk if the stop-loss is hit.
    ///
    /// Without a stop-loss the whole notional is at risk. `None` when the
    /// amount does not fit in a `Decimal`.
    pub fn risk_amount(&self) -> Option<Decimal> {
        match self.stop_loss {
            Some(stop) => self
                .position_size
                .inner()
                .checked_mul(self.entry_price.distance(stop)?),
            None => self.position_size.notional(self.entry_price),
        }
    }

    /// First structural defect of the intent, if any.
    ///
    /// Size and every price present must be strictly positive.
    pub fn defect(&self) -> Option<String> {
        if !self.position_size.is_positive() {
            return Some(format!(
                "position size must be positive, got {}",
                self.position_size
            ));
        }
        let prices = [
            ("entry price", Some(self.entry_price)),
            ("stop loss", self.stop_loss),
            ("take profit", self.take_profit),
        ];
        for (name, price) in prices {
            if let Some(p) = price {
                if !p.is_positive() {
                    return Some(format!("{name} must be positive, got {p}"));
                }
            }
        }
        None
    }

    /// Order id this intent was synthesized from, if any.
    pub fn origin_order(&self) -> Option<&OrderId> {
        match &self.source {
            IntentSource::Conditional(id) => Some(id),
            IntentSource::Manual => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn intent() -> TradeIntent {
        TradeIntent::manual(
            UserId::from("u1"),
            Pair::parse("EUR/USD").unwrap(),
            TradeAction::Buy,
            Size::new(dec!(1000)),
            Price::new(dec!(1.10)),
            Utc::now(),
        )
    }

    #[test]
    fn test_risk_amount_with_stop() {
        let i = intent().with_stop_loss(Price::new(dec!(1.09)));
        assert_eq!(i.risk_amount(), Some(dec!(10.00)));
    }

    #[test]
    fn test_risk_amount_without_stop_is_notional() {
        assert_eq!(intent().risk_amount(), Some(dec!(1100.00)));
    }

    #[test]
    fn test_risk_amount_overflow_is_none() {
        let mut i = intent().with_stop_loss(Price::new(dec!(1)));
        i.position_size = Size::new(dec!(50000));
        i.entry_price = Price::new(Decimal::from_scientific("1e28").unwrap());
        assert!(i.risk_amount().is_none());
    }

    #[test]
    fn test_defect_flags_non_positive_values() {
        assert!(intent().defect().is_none());

        let mut short = intent();
        short.position_size = Size::new(dec!(-5000000));
        assert!(short.defect().unwrap().starts_with("position size"));

        let zero_stop = intent().with_stop_loss(Price::ZERO);
        assert!(zero_stop.defect().unwrap().starts_with("stop loss"));

        let negative_tp = intent().with_take_profit(Price::new(dec!(-1.2)));
        assert!(negative_tp.defect().unwrap().starts_with("take profit"));
    }

    #[test]
    fn test_source_serde_shape() {
        let json = serde_json::to_value(IntentSource::Conditional(OrderId::from_string("ord_1")))
            .unwrap();
        assert_eq!(json["type"], "conditional");
        assert_eq!(json["order_id"], "ord_1");
        assert!(intent().origin_order().is_none());
    }
}
