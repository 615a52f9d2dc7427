//! Market data pushed by the feed.

use crate::decimal::Price;
use crate::order::Pair;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Technical indicators a condition can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Rsi,
    MacdHistogram,
    Atr,
    Sentiment,
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsi => write!(f, "RSI"),
            Self::MacdHistogram => write!(f, "MACD histogram"),
            Self::Atr => write!(f, "ATR"),
            Self::Sentiment => write!(f, "sentiment"),
        }
    }
}

/// Trend direction reported alongside a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bullish => write!(f, "bullish"),
            Self::Bearish => write!(f, "bearish"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// Optional indicator readings attached to a tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorReadings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsi: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macd_histogram: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atr: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Decimal>,
}

impl IndicatorReadings {
    pub fn get(&self, indicator: Indicator) -> Option<Decimal> {
        match indicator {
            Indicator::Rsi => self.rsi,
            Indicator::MacdHistogram => self.macd_histogram,
            Indicator::Atr => self.atr,
            Indicator::Sentiment => self.sentiment,
        }
    }
}

/// Price update for one pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketTick {
    pub pair: Pair,
    pub price: Price,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub indicators: IndicatorReadings,
    #[serde(default)]
    pub trend: Option<TrendDirection>,
}

impl MarketTick {
    pub fn new(pair: Pair, price: Price, timestamp: DateTime<Utc>) -> Self {
        Self {
            pair,
            price,
            timestamp,
            indicators: IndicatorReadings::default(),
            trend: None,
        }
    }

    pub fn with_indicator(mut self, indicator: Indicator, value: Decimal) -> Self {
        let slot = match indicator {
            Indicator::Rsi => &mut self.indicators.rsi,
            Indicator::MacdHistogram => &mut self.indicators.macd_histogram,
            Indicator::Atr => &mut self.indicators.atr,
            Indicator::Sentiment => &mut self.indicators.sentiment,
        };
        *slot = Some(value);
        self
    }

    pub fn with_trend(mut self, trend: TrendDirection) -> Self {
        self.trend = Some(trend);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_indicator_lookup() {
        let tick = MarketTick::new(
            Pair::parse("EUR/USD").unwrap(),
            Price::new(dec!(1.1)),
            Utc::now(),
        )
        .with_indicator(Indicator::Rsi, dec!(28));

        assert_eq!(tick.indicators.get(Indicator::Rsi), Some(dec!(28)));
        assert_eq!(tick.indicators.get(Indicator::Atr), None);
    }

    #[test]
    fn test_tick_deserializes_without_optional_fields() {
        let json = r#"{"pair":"eur/usd","price":"1.0850","timestamp":"2026-03-02T10:00:00Z"}"#;
        let tick: MarketTick = serde_json::from_str(json).unwrap();
        assert_eq!(tick.pair.as_str(), "EUR/USD");
        assert!(tick.trend.is_none());
        assert_eq!(tick.indicators, IndicatorReadings::default());
    }
}
