//! Trigger conditions.
//!
//! A closed set of condition kinds evaluated against a single tick.
//! Anything a condition needs that the tick does not carry (an indicator
//! reading, a trend) makes that condition false.

use chrono::NaiveTime;
use guard_core::{Indicator, MarketTick, TrendDirection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "<", alias = "lt")]
    Lt,
    #[serde(rename = "<=", alias = "lte")]
    Lte,
    #[serde(rename = ">", alias = "gt")]
    Gt,
    #[serde(rename = ">=", alias = "gte")]
    Gte,
    #[serde(rename = "==", alias = "eq")]
    Eq,
    #[serde(rename = "!=", alias = "ne")]
    Ne,
}

impl Comparison {
    pub fn apply<T: PartialOrd>(&self, lhs: &T, rhs: &T) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Lte => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Gte => lhs >= rhs,
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
        }
    }

    /// `==` and `!=`, the only operators allowed on trends.
    pub fn is_equality(&self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        };
        f.write_str(s)
    }
}

/// How an order's conditions are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    #[default]
    All,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionKind {
    PriceLevel {
        operator: Comparison,
        value: Decimal,
    },
    IndicatorValue {
        indicator: Indicator,
        operator: Comparison,
        value: Decimal,
    },
    Trend {
        operator: Comparison,
        value: TrendDirection,
    },
    /// UTC wall-clock window `[start, end)`; wraps midnight when `start > end`.
    TimeWindow { start: NaiveTime, end: NaiveTime },
}

/// One trigger condition with its human-readable description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub kind: ConditionKind,
}

impl Condition {
    pub fn new(kind: ConditionKind) -> Self {
        let description = kind.to_string();
        Self { description, kind }
    }

    pub fn price(operator: Comparison, value: Decimal) -> Self {
        Self::new(ConditionKind::PriceLevel { operator, value })
    }

    pub fn indicator(indicator: Indicator, operator: Comparison, value: Decimal) -> Self {
        Self::new(ConditionKind::IndicatorValue {
            indicator,
            operator,
            value,
        })
    }

    pub fn trend(operator: Comparison, value: TrendDirection) -> Self {
        Self::new(ConditionKind::Trend { operator, value })
    }

    pub fn time_window(start: NaiveTime, end: NaiveTime) -> Self {
        Self::new(ConditionKind::TimeWindow { start, end })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Reject shapes that can never be meaningful.
    pub fn check(&self) -> Result<(), String> {
        match &self.kind {
            ConditionKind::Trend { operator, .. } if !operator.is_equality() => Err(format!(
                "trend condition only supports == and !=, got {operator}"
            )),
            _ => Ok(()),
        }
    }

    pub fn is_met(&self, tick: &MarketTick) -> bool {
        match &self.kind {
            ConditionKind::PriceLevel { operator, value } => {
                operator.apply(&tick.price.inner(), value)
            }
            ConditionKind::IndicatorValue {
                indicator,
                operator,
                value,
            } => tick
                .indicators
                .get(*indicator)
                .is_some_and(|reading| operator.apply(&reading, value)),
            ConditionKind::Trend { operator, value } => match (tick.trend, operator) {
                (Some(trend), Comparison::Eq) => trend == *value,
                (Some(trend), Comparison::Ne) => trend != *value,
                _ => false,
            },
            ConditionKind::TimeWindow { start, end } => {
                let t = tick.timestamp.time();
                if start <= end {
                    t >= *start && t < *end
                } else {
                    t >= *start || t < *end
                }
            }
        }
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PriceLevel { operator, value } => write!(f, "price {operator} {value}"),
            Self::IndicatorValue {
                indicator,
                operator,
                value,
            } => write!(f, "{indicator} {operator} {value}"),
            Self::Trend { operator, value } => write!(f, "trend {operator} {value}"),
            Self::TimeWindow { start, end } => {
                write!(f, "time between {} and {} UTC", start.format("%H:%M"), end.format("%H:%M"))
            }
        }
    }
}

/// Combine condition results for one tick.
///
/// An empty list is never satisfied.
pub fn conditions_met(conditions: &[Condition], combinator: Combinator, tick: &MarketTick) -> bool {
    if conditions.is_empty() {
        return false;
    }
    match combinator {
        Combinator::All => conditions.iter().all(|c| c.is_met(tick)),
        Combinator::Any => conditions.iter().any(|c| c.is_met(tick)),
    }
}
