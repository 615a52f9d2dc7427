//! Order book with a pair index over PENDING orders.
//!
//! Terminal orders stay queryable as per-user history, capped at
//! `history_limit` entries; the oldest are evicted first.

use crate::order::{ConditionalOrder, OrderStatus};
use dashmap::DashMap;
use guard_core::{OrderId, Pair, UserId};
use guard_persistence::{InMemoryStore, RecordStore};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

pub struct OrderBook {
    orders: InMemoryStore<OrderId, Arc<ConditionalOrder>>,
    /// Pair -> PENDING order ids, in registration order.
    pending_by_pair: DashMap<Pair, Vec<OrderId>>,
    /// User -> retained order ids, in registration order.
    by_user: DashMap<UserId, Vec<OrderId>>,
    /// User -> terminal order ids, in the order they settled.
    settled_by_user: DashMap<UserId, VecDeque<OrderId>>,
    history_limit: usize,
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

impl OrderBook {
    /// Book keeping at most `history_limit` terminal orders per user
    /// (at least one).
    pub fn new(history_limit: usize) -> Self {
        Self {
            orders: InMemoryStore::new(),
            pending_by_pair: DashMap::new(),
            by_user: DashMap::new(),
            settled_by_user: DashMap::new(),
            history_limit: history_limit.max(1),
        }
    }

    pub fn insert(&self, order: Arc<ConditionalOrder>) {
        self.pending_by_pair
            .entry(order.pair.clone())
            .or_default()
            .push(order.id.clone());
        self.by_user
            .entry(order.user_id.clone())
            .or_default()
            .push(order.id.clone());
        self.orders.put(order.id.clone(), order);
    }

    pub fn get(&self, id: &OrderId) -> Option<Arc<ConditionalOrder>> {
        self.orders.get(id)
    }

    /// Drop an order from the pair index once it left PENDING.
    pub fn unindex(&self, order: &ConditionalOrder) {
        if let Some(mut ids) = self.pending_by_pair.get_mut(&order.pair) {
            ids.retain(|id| id != &order.id);
        }
    }

    /// Move an order that reached a terminal state into the user's
    /// history, evicting the oldest settled orders past the limit.
    pub fn archive(&self, order: &ConditionalOrder) {
        let evicted: Vec<OrderId> = {
            let mut settled = self.settled_by_user.entry(order.user_id.clone()).or_default();
            settled.push_back(order.id.clone());
            let excess = settled.len().saturating_sub(self.history_limit);
            settled.drain(..excess).collect()
        };
        if evicted.is_empty() {
            return;
        }
        for id in &evicted {
            self.orders.remove(id);
        }
        if let Some(mut ids) = self.by_user.get_mut(&order.user_id) {
            ids.retain(|id| !evicted.contains(id));
        }
        debug!(user_id = %order.user_id, evicted = evicted.len(), "Evicted settled orders");
    }

    /// PENDING orders for one pair.
    pub fn pending_for_pair(&self, pair: &Pair) -> Vec<Arc<ConditionalOrder>> {
        let ids = match self.pending_by_pair.get(pair) {
            Some(ids) => ids.clone(),
            None => return Vec::new(),
        };
        ids.iter()
            .filter_map(|id| self.orders.get(id))
            .filter(|o| o.status() == OrderStatus::Pending)
            .collect()
    }

    /// PENDING orders across all pairs.
    pub fn pending(&self) -> Vec<Arc<ConditionalOrder>> {
        let pairs: Vec<Pair> = self.pending_by_pair.iter().map(|e| e.key().clone()).collect();
        pairs
            .iter()
            .flat_map(|pair| self.pending_for_pair(pair))
            .collect()
    }

    /// All orders of a user, oldest first.
    pub fn for_user(&self, user_id: &UserId) -> Vec<Arc<ConditionalOrder>> {
        let ids = match self.by_user.get(user_id) {
            Some(ids) => ids.clone(),
            None => return Vec::new(),
        };
        ids.iter().filter_map(|id| self.orders.get(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Comparison, Condition};
    use crate::order::OrderRequest;
    use chrono::{Duration, Utc};
    use guard_core::{Size, TradeAction};
    use rust_decimal_macros::dec;

    fn order(user: &str, pair: &str) -> Arc<ConditionalOrder> {
        let now = Utc::now();
        Arc::new(ConditionalOrder::from_request(
            OrderRequest::new(
                UserId::from(user),
                Pair::parse(pair).unwrap(),
                TradeAction::Buy,
                Size::new(dec!(100)),
                vec![Condition::price(Comparison::Gt, dec!(1))],
            ),
            now,
            now + Duration::hours(1),
        ))
    }

    #[test]
    fn test_pair_index_only_returns_pending() {
        let book = OrderBook::default();
        let a = order("u1", "EUR/USD");
        let b = order("u1", "EUR/USD");
        let c = order("u2", "GBP/USD");
        book.insert(Arc::clone(&a));
        book.insert(Arc::clone(&b));
        book.insert(Arc::clone(&c));

        assert_eq!(book.pending_for_pair(&a.pair).len(), 2);

        b.transition(OrderStatus::Pending, OrderStatus::Cancelled).unwrap();
        book.unindex(&b);
        let pending = book.pending_for_pair(&a.pair);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a.id);

        assert_eq!(book.pending().len(), 2);
        assert_eq!(book.for_user(&UserId::from("u1")).len(), 2);
        assert_eq!(book.len(), 3);
    }

    #[test]
    fn test_settled_history_is_bounded_per_user() {
        let book = OrderBook::new(2);
        let live = order("u1", "EUR/USD");
        book.insert(Arc::clone(&live));
        let other = order("u2", "EUR/USD");
        book.insert(Arc::clone(&other));
        other.transition(OrderStatus::Pending, OrderStatus::Cancelled).unwrap();
        book.archive(&other);

        let settled: Vec<_> = (0..3)
            .map(|_| {
                let o = order("u1", "EUR/USD");
                book.insert(Arc::clone(&o));
                o.transition(OrderStatus::Pending, OrderStatus::Cancelled).unwrap();
                book.unindex(&o);
                book.archive(&o);
                o
            })
            .collect();

        // Oldest settled order of u1 is gone; the pending one is kept.
        assert!(book.get(&settled[0].id).is_none());
        assert!(book.get(&settled[1].id).is_some());
        assert!(book.get(&settled[2].id).is_some());
        assert!(book.get(&live.id).is_some());
        assert_eq!(book.for_user(&UserId::from("u1")).len(), 3);
        // Other users are unaffected.
        assert!(book.get(&other.id).is_some());
        assert_eq!(book.len(), 4);
    }
}
