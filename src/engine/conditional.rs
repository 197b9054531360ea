//! Conditional orders: stop-loss, stop-limit, and take-profit.
//!
//! A conditional order is not live on any book. It waits in a per-symbol
//! registry keyed by trigger price, split into the two trigger directions,
//! so a single last-trade-price update evaluates all fired triggers in
//! O(log N + k) instead of scanning the whole registry.

use crate::engine::types::OrderRequest;
use crate::orderbook::EngineError;
use crate::orderbook::order::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The flavour of a conditional order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionalKind {
    /// Exit a position when the market moves against it; promotes to a
    /// market order.
    StopLoss,
    /// Like stop-loss, but promotes to a limit order at `limit_price`.
    StopLimit,
    /// Lock in gains when the market moves favourably; promotes to a
    /// market order.
    TakeProfit,
}

impl ConditionalKind {
    /// Parse the wire form (`stop_loss` / `stop_limit` / `take_profit`).
    pub fn parse(value: &str) -> Result<ConditionalKind, EngineError> {
        match value.to_ascii_lowercase().as_str() {
            "stop_loss" => Ok(ConditionalKind::StopLoss),
            "stop_limit" => Ok(ConditionalKind::StopLimit),
            "take_profit" => Ok(ConditionalKind::TakeProfit),
            _ => Err(EngineError::InvalidOrderKind {
                value: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for ConditionalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionalKind::StopLoss => "stop_loss",
            ConditionalKind::StopLimit => "stop_limit",
            ConditionalKind::TakeProfit => "take_profit",
        };
        write!(f, "{s}")
    }
}

/// Which side of the last-trade price a trigger waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TriggerDirection {
    /// Fires when `last_price <= trigger_price`.
    PriceAtOrBelow,
    /// Fires when `last_price >= trigger_price`.
    PriceAtOrAbove,
}

/// A registered conditional order awaiting its trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalOrder {
    /// Identifier; reused by the promoted order so replay stays id-stable.
    pub order_id: String,
    /// Trading symbol.
    pub symbol: String,
    /// Side of the promoted order.
    pub side: Side,
    /// Quantity of the promoted order.
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    /// Stop-loss, stop-limit, or take-profit.
    pub kind: ConditionalKind,
    /// Price at which the trigger fires.
    #[serde(with = "rust_decimal::serde::str")]
    pub trigger_price: Decimal,
    /// Limit price of the promoted order (stop-limit only).
    #[serde(with = "rust_decimal::serde::str_option", default)]
    pub limit_price: Option<Decimal>,
    /// Optional client correlation id.
    pub client_id: Option<String>,
    /// Flipped when the trigger fires; an activated entry is already out
    /// of the registry.
    pub activated: bool,
    /// Registration timestamp (UTC).
    pub created_at: DateTime<Utc>,
}

impl ConditionalOrder {
    /// Generate a conditional order identifier: `CND-<epoch_s>-<6 hex>`.
    #[must_use]
    pub fn generate_id() -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("CND-{}-{}", crate::utils::current_time_secs(), &suffix[..6])
    }

    fn direction(&self) -> TriggerDirection {
        match (self.side, self.kind) {
            (Side::Buy, ConditionalKind::StopLoss | ConditionalKind::StopLimit) => {
                TriggerDirection::PriceAtOrBelow
            }
            (Side::Buy, ConditionalKind::TakeProfit) => TriggerDirection::PriceAtOrAbove,
            (Side::Sell, ConditionalKind::StopLoss | ConditionalKind::StopLimit) => {
                TriggerDirection::PriceAtOrAbove
            }
            (Side::Sell, ConditionalKind::TakeProfit) => TriggerDirection::PriceAtOrBelow,
        }
    }

    /// Whether `last_price` fires this trigger.
    #[must_use]
    pub fn triggers_at(&self, last_price: Decimal) -> bool {
        match self.direction() {
            TriggerDirection::PriceAtOrBelow => last_price <= self.trigger_price,
            TriggerDirection::PriceAtOrAbove => last_price >= self.trigger_price,
        }
    }

    /// The live submission this conditional promotes to when triggered:
    /// a limit order at `limit_price` for stop-limit, a market order
    /// otherwise. The promoted order reuses this conditional's id.
    #[must_use]
    pub fn promote(&self) -> OrderRequest {
        let (order_type, price) = match self.kind {
            ConditionalKind::StopLimit => (
                "limit".to_string(),
                self.limit_price.map(|p| p.to_string()),
            ),
            _ => ("market".to_string(), None),
        };
        OrderRequest {
            symbol: self.symbol.clone(),
            order_type,
            side: self.side.to_string(),
            quantity: self.quantity.to_string(),
            price,
            client_id: self.client_id.clone(),
            order_id: Some(self.order_id.clone()),
            fee_tier: None,
        }
    }
}

/// Per-symbol index of waiting conditional orders, keyed by trigger price.
#[derive(Debug, Default)]
pub(crate) struct ConditionalRegistry {
    /// Entries that fire when `last_price <= trigger`; a price update
    /// fires every key in `[last_price, +inf)`.
    below: BTreeMap<Decimal, Vec<ConditionalOrder>>,
    /// Entries that fire when `last_price >= trigger`; a price update
    /// fires every key in `(-inf, last_price]`.
    above: BTreeMap<Decimal, Vec<ConditionalOrder>>,
}

impl ConditionalRegistry {
    /// Register a conditional order.
    pub(crate) fn insert(&mut self, order: ConditionalOrder) {
        let bucket = match order.direction() {
            TriggerDirection::PriceAtOrBelow => &mut self.below,
            TriggerDirection::PriceAtOrAbove => &mut self.above,
        };
        bucket.entry(order.trigger_price).or_default().push(order);
    }

    /// Remove and return every entry fired by `last_price`, marked
    /// activated, ordered by trigger price (ascending for below-triggers,
    /// then ascending for above-triggers) and insertion order within a
    /// price. The ordering is deterministic so WAL replay promotes in the
    /// same sequence.
    pub(crate) fn take_triggered(&mut self, last_price: Decimal) -> Vec<ConditionalOrder> {
        let mut fired = Vec::new();

        let keys: Vec<Decimal> = self.below.range(last_price..).map(|(k, _)| *k).collect();
        for key in keys {
            if let Some(mut entries) = self.below.remove(&key) {
                fired.append(&mut entries);
            }
        }

        let keys: Vec<Decimal> = self.above.range(..=last_price).map(|(k, _)| *k).collect();
        for key in keys {
            if let Some(mut entries) = self.above.remove(&key) {
                fired.append(&mut entries);
            }
        }

        for entry in &mut fired {
            entry.activated = true;
        }
        fired
    }

    /// Number of waiting entries.
    pub(crate) fn len(&self) -> usize {
        self.below.values().map(Vec::len).sum::<usize>()
            + self.above.values().map(Vec::len).sum::<usize>()
    }

    /// All waiting entries, for snapshots and introspection.
    pub(crate) fn entries(&self) -> Vec<ConditionalOrder> {
        self.below
            .values()
            .chain(self.above.values())
            .flatten()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn conditional(
        id: &str,
        side: Side,
        kind: ConditionalKind,
        trigger: Decimal,
    ) -> ConditionalOrder {
        ConditionalOrder {
            order_id: id.to_string(),
            symbol: "BTC-USDT".to_string(),
            side,
            quantity: dec!(1),
            kind,
            trigger_price: trigger,
            limit_price: (kind == ConditionalKind::StopLimit).then_some(trigger),
            client_id: None,
            activated: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_trigger_directions() {
        // Buy stop-loss fires when price drops to the trigger
        let order = conditional("c1", Side::Buy, ConditionalKind::StopLoss, dec!(100));
        assert!(order.triggers_at(dec!(99)));
        assert!(order.triggers_at(dec!(100)));
        assert!(!order.triggers_at(dec!(101)));

        // Buy take-profit fires when price rises to the trigger
        let order = conditional("c2", Side::Buy, ConditionalKind::TakeProfit, dec!(100));
        assert!(order.triggers_at(dec!(101)));
        assert!(!order.triggers_at(dec!(99)));

        // Sell stop-loss fires when price rises to the trigger
        let order = conditional("c3", Side::Sell, ConditionalKind::StopLoss, dec!(100));
        assert!(order.triggers_at(dec!(100)));
        assert!(order.triggers_at(dec!(101)));
        assert!(!order.triggers_at(dec!(99)));

        // Sell take-profit fires when price drops to the trigger
        let order = conditional("c4", Side::Sell, ConditionalKind::TakeProfit, dec!(100));
        assert!(order.triggers_at(dec!(99)));
        assert!(!order.triggers_at(dec!(101)));
    }

    #[test]
    fn test_registry_takes_only_fired_entries() {
        let mut registry = ConditionalRegistry::default();
        registry.insert(conditional("lo", Side::Buy, ConditionalKind::StopLoss, dec!(90)));
        registry.insert(conditional("hi", Side::Buy, ConditionalKind::StopLoss, dec!(110)));
        registry.insert(conditional(
            "tp",
            Side::Buy,
            ConditionalKind::TakeProfit,
            dec!(120),
        ));
        assert_eq!(registry.len(), 3);

        // Price 100: fires the 110 stop (last <= trigger), not the 90 stop
        // nor the 120 take-profit.
        let fired = registry.take_triggered(dec!(100));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].order_id, "hi");
        assert!(fired[0].activated);
        assert_eq!(registry.len(), 2);

        // Fired entries do not re-fire.
        assert!(registry.take_triggered(dec!(100)).is_empty());
    }

    #[test]
    fn test_registry_fires_above_triggers() {
        let mut registry = ConditionalRegistry::default();
        registry.insert(conditional(
            "tp",
            Side::Buy,
            ConditionalKind::TakeProfit,
            dec!(105),
        ));
        registry.insert(conditional("sl", Side::Sell, ConditionalKind::StopLoss, dec!(104)));

        let fired = registry.take_triggered(dec!(105));
        let ids: Vec<&str> = fired.iter().map(|c| c.order_id.as_str()).collect();
        assert_eq!(ids, vec!["sl", "tp"]);
    }

    #[test]
    fn test_promote_stop_limit_to_limit_order() {
        let mut order = conditional("c1", Side::Sell, ConditionalKind::StopLimit, dec!(95));
        order.limit_price = Some(dec!(94.5));
        let request = order.promote();
        assert_eq!(request.order_type, "limit");
        assert_eq!(request.price.as_deref(), Some("94.5"));
        assert_eq!(request.order_id.as_deref(), Some("c1"));
        assert_eq!(request.side, "sell");
    }

    #[test]
    fn test_promote_stop_loss_to_market_order() {
        let order = conditional("c1", Side::Buy, ConditionalKind::StopLoss, dec!(95));
        let request = order.promote();
        assert_eq!(request.order_type, "market");
        assert!(request.price.is_none());
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(
            ConditionalKind::parse("STOP_LOSS").unwrap(),
            ConditionalKind::StopLoss
        );
        assert_eq!(
            ConditionalKind::parse("take_profit").unwrap(),
            ConditionalKind::TakeProfit
        );
        assert!(ConditionalKind::parse("trailing").is_err());
    }
}
