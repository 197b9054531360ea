//! The submit pipeline: validation, matching, remainder policy, trade
//! generation, cancels, and the conditional trigger cascade.
//!
//! No error escapes [`MatchingEngine::submit_order`]; every failure is
//! returned as a rejected-order response. The pipeline order is fixed:
//! validate, materialize, WAL-append, match, apply the remainder policy,
//! update metrics, publish, then run the trigger cascade.

use crate::engine::conditional::{ConditionalKind, ConditionalOrder};
use crate::engine::types::{
    CancelResponse, ConditionalRequest, ConditionalResponse, OrderRequest, OrderResponse,
};
use crate::engine::{DEFAULT_DEPTH, MatchingEngine};
use crate::orderbook::order::{Order, OrderKind, OrderStatus, Side};
use crate::orderbook::trade::Trade;
use crate::orderbook::{EngineError, MatchOutcome, OrderBook};
use crate::persistence::{WalOrderSubmit, WalRecord, WalTradeExecute};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// A request that passed validation, with typed fields.
struct ValidRequest {
    symbol: String,
    kind: OrderKind,
    side: Side,
    quantity: Decimal,
    price: Option<Decimal>,
    client_id: Option<String>,
    order_id: Option<String>,
    fee_tier: Option<String>,
}

impl MatchingEngine {
    /// Submit an order. Never fails: rejections come back as responses
    /// with `status: "rejected"` and an `error` string.
    ///
    /// Fills may trigger conditional orders; their promotions run before
    /// this call returns, bounded by the configured cascade cap.
    pub fn submit_order(&self, request: &OrderRequest) -> OrderResponse {
        let _guard = self.submit_lock.lock();
        let mut trades = Vec::new();
        let response = self.process_submission(request, &mut trades);
        // The trigger scan runs only after fills. Every fill comes from a
        // logged submission, so replay reproduces each scan point.
        if !trades.is_empty() {
            self.run_trigger_cascade(&request.symbol, &mut trades);
        }
        response
    }

    /// Register a conditional (stop / take-profit) order.
    ///
    /// The order is not live on any book; it waits in the registry until
    /// a last-trade-price update fires its trigger.
    pub fn submit_conditional(&self, request: &ConditionalRequest) -> ConditionalResponse {
        let _guard = self.submit_lock.lock();
        match self.register_conditional(request) {
            Ok(order) => {
                info!(
                    order_id = %order.order_id,
                    symbol = %order.symbol,
                    kind = %order.kind,
                    trigger = %order.trigger_price,
                    "conditional order registered"
                );
                ConditionalResponse {
                    order_id: Some(order.order_id.clone()),
                    status: "pending".to_string(),
                    error: None,
                    order_type: Some(order.kind.to_string()),
                    symbol: Some(order.symbol.clone()),
                    side: Some(order.side),
                    quantity: Some(order.quantity),
                    trigger_price: Some(order.trigger_price),
                    limit_price: order.limit_price,
                }
            }
            Err(e) => {
                debug!(error = %e, "conditional order rejected");
                ConditionalResponse {
                    order_id: request.order_id.clone(),
                    status: "rejected".to_string(),
                    error: Some(e.to_string()),
                    order_type: None,
                    symbol: None,
                    side: None,
                    quantity: None,
                    trigger_price: None,
                    limit_price: None,
                }
            }
        }
    }

    /// Cancel a resting order by id.
    ///
    /// # Errors
    ///
    /// [`EngineError::OrderNotFound`] for unknown ids,
    /// [`EngineError::NotCancelable`] for orders already in a terminal
    /// state.
    pub fn cancel_order(&self, order_id: &str) -> Result<CancelResponse, EngineError> {
        let _guard = self.submit_lock.lock();
        self.cancel_inner(order_id)
    }

    pub(crate) fn cancel_inner(&self, order_id: &str) -> Result<CancelResponse, EngineError> {
        for book in self.books.iter() {
            if !book.contains_order(order_id) {
                continue;
            }
            let mut order = book
                .remove_order(order_id)
                .ok_or_else(|| EngineError::OrderNotFound {
                    order_id: order_id.to_string(),
                })?;
            order.cancel()?;
            info!(order_id, symbol = %order.symbol, "order cancelled");

            let response = CancelResponse {
                order_id: order.order_id.clone(),
                status: order.status,
                filled_quantity: order.filled_quantity,
                cancelled_quantity: order.cancelled_quantity,
                timestamp: Utc::now(),
            };
            self.closed_orders.insert(order.order_id.clone(), order);
            self.publish_market_data(book.value().as_ref());
            self.wal_append(&WalRecord::OrderCancel {
                order_id: order_id.to_string(),
            });
            return Ok(response);
        }

        if let Some(order) = self.closed_orders.get(order_id) {
            return Err(EngineError::NotCancelable {
                order_id: order_id.to_string(),
                status: order.status,
            });
        }
        Err(EngineError::OrderNotFound {
            order_id: order_id.to_string(),
        })
    }

    /// One submission through the full pipeline, collecting produced
    /// trades into `collected` (used for replay reconciliation and the
    /// cascade).
    pub(crate) fn process_submission(
        &self,
        request: &OrderRequest,
        collected: &mut Vec<Trade>,
    ) -> OrderResponse {
        match self.execute_submission(request) {
            Ok((response, trades)) => {
                collected.extend(trades);
                response
            }
            Err(e) => {
                debug!(error = %e, "order rejected");
                OrderResponse::rejected(request.order_id.as_deref(), &e)
            }
        }
    }

    fn execute_submission(
        &self,
        request: &OrderRequest,
    ) -> Result<(OrderResponse, Vec<Trade>), EngineError> {
        let valid = self.validate_request(request)?;
        let book = self.book_or_create(&valid.symbol);

        if let Some(id) = &valid.order_id {
            if book.contains_order(id) {
                return Err(EngineError::DuplicateOrderId {
                    order_id: id.clone(),
                });
            }
        }

        let mut order = Order::new(valid.order_id.clone());
        order.initialize(
            &valid.symbol,
            valid.side,
            valid.kind,
            valid.quantity,
            valid.price,
            valid.client_id.clone(),
        )?;
        order.fee_tier = valid.fee_tier.clone();
        order.arrival_seq = self.arrival_seq.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;

        // Logged before any book mutation so recovery sees every attempt.
        // Cascade promotions are deterministic consequences of already
        // logged inputs and are not logged themselves; replay re-fires
        // them through the same trigger scan.
        if !self.promoting.load(std::sync::atomic::Ordering::Relaxed) {
            self.wal_append(&WalRecord::OrderSubmit(WalOrderSubmit::from_order(&order)));
        }

        // Fill-or-kill: all-or-nothing feasibility check before touching
        // the book.
        if valid.kind == OrderKind::Fok {
            let available = book.peek_fillable(valid.side, valid.quantity, valid.price);
            if available < valid.quantity {
                order.reject();
                let error = EngineError::InsufficientLiquidity {
                    side: valid.side,
                    requested: valid.quantity,
                    available,
                };
                let response = OrderResponse::rejected_order(&order, &error);
                self.metrics.record_order();
                self.closed_orders.insert(order.order_id.clone(), order);
                return Ok((response, Vec::new()));
            }
        }

        let outcome =
            book.match_order(&order.order_id, valid.side, valid.quantity, valid.price)?;
        if outcome.executed_quantity > Decimal::ZERO {
            let last_price = outcome
                .fills
                .last()
                .map(|f| f.price)
                .unwrap_or(Decimal::ZERO);
            order.fill(outcome.executed_quantity, last_price)?;
        }

        let trades: Vec<Trade> = outcome
            .fills
            .iter()
            .map(|fill| {
                let trade = Trade {
                    trade_id: self.trade_ids.next_id(),
                    timestamp: Utc::now(),
                    symbol: order.symbol.clone(),
                    price: fill.price,
                    quantity: fill.quantity,
                    aggressor_side: order.side,
                    maker_order_id: fill.maker_order_id.clone(),
                    taker_order_id: order.order_id.clone(),
                    maker_fee: self
                        .fee_schedule
                        .calculate(fill.price, fill.quantity, true, fill.maker_fee_tier.as_deref())
                        .amount,
                    taker_fee: self
                        .fee_schedule
                        .calculate(fill.price, fill.quantity, false, order.fee_tier.as_deref())
                        .amount,
                    fee_currency: self.fee_schedule.currency().to_string(),
                };
                self.trade_history.push(trade.clone());
                self.wal_append(&WalRecord::TradeExecute(WalTradeExecute::from_trade(&trade)));
                debug!(%trade, "trade executed");
                trade
            })
            .collect();

        for maker in outcome.removed_makers.iter() {
            self.closed_orders
                .insert(maker.order_id.clone(), maker.clone());
        }

        let response = self.apply_remainder_policy(&mut order, &outcome, book.as_ref())?;

        self.metrics.record_order();
        self.metrics.record_trades(
            trades.len() as u64,
            trades.iter().map(|t| t.quantity).sum(),
        );

        if let Some(last) = trades.last() {
            book.set_last_trade_price(last.price);
        }
        for trade in &trades {
            self.feeds.publish_trade(trade);
        }
        self.publish_market_data(book.as_ref());

        Ok((response, trades))
    }

    /// Total function over `(kind, has_trades, remaining == 0)` deciding
    /// what happens to the unfilled remainder.
    fn apply_remainder_policy(
        &self,
        order: &mut Order,
        outcome: &MatchOutcome,
        book: &OrderBook,
    ) -> Result<OrderResponse, EngineError> {
        let avg_fill_price = outcome.avg_fill_price();
        let has_trades = !outcome.fills.is_empty();

        let response = if outcome.remaining_quantity > Decimal::ZERO {
            match order.kind {
                OrderKind::Market => {
                    if has_trades {
                        // Liquidity exhausted: partial, nothing rests.
                        OrderResponse::from_order(order, avg_fill_price)
                    } else {
                        order.reject();
                        let error = EngineError::InsufficientLiquidity {
                            side: order.side,
                            requested: order.original_quantity,
                            available: Decimal::ZERO,
                        };
                        OrderResponse::rejected_order(order, &error)
                    }
                }
                OrderKind::Limit => {
                    order.status = if has_trades {
                        OrderStatus::Partial
                    } else {
                        OrderStatus::Open
                    };
                    book.add_order(order.clone())?;
                    OrderResponse::from_order(order, avg_fill_price)
                }
                OrderKind::Ioc => {
                    if has_trades {
                        order.cancel_unfilled();
                        OrderResponse::from_order(order, avg_fill_price)
                    } else {
                        order.reject();
                        let error = EngineError::InsufficientLiquidity {
                            side: order.side,
                            requested: order.original_quantity,
                            available: Decimal::ZERO,
                        };
                        OrderResponse::rejected_order(order, &error)
                    }
                }
                // Unreachable: the pre-check rejected unfillable FOK
                // orders before the walk.
                OrderKind::Fok => {
                    return Err(EngineError::InvariantViolation {
                        message: format!(
                            "FOK order {} left the walk with {} remaining",
                            order.order_id, outcome.remaining_quantity
                        ),
                    });
                }
            }
        } else {
            // fill() already transitioned the order to Filled.
            OrderResponse::from_order(order, avg_fill_price)
        };

        if order.status.is_terminal() {
            self.closed_orders
                .insert(order.order_id.clone(), order.clone());
        }
        Ok(response)
    }

    fn validate_request(&self, request: &OrderRequest) -> Result<ValidRequest, EngineError> {
        if request.symbol.trim().is_empty() {
            return Err(EngineError::MissingField { field: "symbol" });
        }
        if request.order_type.trim().is_empty() {
            return Err(EngineError::MissingField { field: "order_type" });
        }
        if request.side.trim().is_empty() {
            return Err(EngineError::MissingField { field: "side" });
        }
        if request.quantity.trim().is_empty() {
            return Err(EngineError::MissingField { field: "quantity" });
        }

        let side = Side::parse(&request.side)?;
        let kind = OrderKind::parse(&request.order_type)?;

        let quantity =
            Decimal::from_str(request.quantity.trim()).map_err(|_| EngineError::InvalidDecimal {
                field: "quantity",
                value: request.quantity.clone(),
            })?;
        if quantity <= Decimal::ZERO {
            return Err(EngineError::InvalidQuantity { quantity });
        }
        if quantity > self.config.max_order_quantity {
            return Err(EngineError::QuantityAboveMax {
                quantity,
                max: self.config.max_order_quantity,
            });
        }

        let price = match &request.price {
            Some(raw) => Some(Decimal::from_str(raw.trim()).map_err(|_| {
                EngineError::InvalidDecimal {
                    field: "price",
                    value: raw.clone(),
                }
            })?),
            None => None,
        };
        match (kind.has_price(), price) {
            (false, Some(_)) => return Err(EngineError::MarketOrderWithPrice),
            (true, None) => return Err(EngineError::MissingPrice { kind }),
            (true, Some(p)) => {
                if p <= Decimal::ZERO {
                    return Err(EngineError::InvalidPrice { price: p });
                }
                if p > self.config.max_price {
                    return Err(EngineError::PriceAboveMax {
                        price: p,
                        max: self.config.max_price,
                    });
                }
            }
            (false, None) => {}
        }

        Ok(ValidRequest {
            symbol: request.symbol.trim().to_string(),
            kind,
            side,
            quantity,
            price,
            client_id: request.client_id.clone(),
            order_id: request.order_id.clone(),
            fee_tier: request.fee_tier.clone(),
        })
    }

    fn register_conditional(
        &self,
        request: &ConditionalRequest,
    ) -> Result<ConditionalOrder, EngineError> {
        if request.symbol.trim().is_empty() {
            return Err(EngineError::MissingField { field: "symbol" });
        }
        if request.order_type.trim().is_empty() {
            return Err(EngineError::MissingField { field: "order_type" });
        }
        if request.side.trim().is_empty() {
            return Err(EngineError::MissingField { field: "side" });
        }
        if request.quantity.trim().is_empty() {
            return Err(EngineError::MissingField { field: "quantity" });
        }
        if request.trigger_price.trim().is_empty() {
            return Err(EngineError::MissingField {
                field: "trigger_price",
            });
        }

        let kind = ConditionalKind::parse(&request.order_type)?;
        let side = Side::parse(&request.side)?;

        let quantity = Decimal::from_str(request.quantity.trim()).map_err(|_| {
            EngineError::InvalidDecimal {
                field: "quantity",
                value: request.quantity.clone(),
            }
        })?;
        if quantity <= Decimal::ZERO {
            return Err(EngineError::InvalidQuantity { quantity });
        }
        if quantity > self.config.max_order_quantity {
            return Err(EngineError::QuantityAboveMax {
                quantity,
                max: self.config.max_order_quantity,
            });
        }

        let trigger_price = Decimal::from_str(request.trigger_price.trim()).map_err(|_| {
            EngineError::InvalidDecimal {
                field: "trigger_price",
                value: request.trigger_price.clone(),
            }
        })?;
        if trigger_price <= Decimal::ZERO {
            return Err(EngineError::InvalidPrice {
                price: trigger_price,
            });
        }
        if trigger_price > self.config.max_price {
            return Err(EngineError::PriceAboveMax {
                price: trigger_price,
                max: self.config.max_price,
            });
        }

        let limit_price = match (kind, &request.limit_price) {
            (ConditionalKind::StopLimit, Some(raw)) => {
                let p = Decimal::from_str(raw.trim()).map_err(|_| {
                    EngineError::InvalidDecimal {
                        field: "limit_price",
                        value: raw.clone(),
                    }
                })?;
                if p <= Decimal::ZERO {
                    return Err(EngineError::InvalidPrice { price: p });
                }
                if p > self.config.max_price {
                    return Err(EngineError::PriceAboveMax {
                        price: p,
                        max: self.config.max_price,
                    });
                }
                Some(p)
            }
            (ConditionalKind::StopLimit, None) => {
                return Err(EngineError::MissingField {
                    field: "limit_price",
                });
            }
            _ => None,
        };

        let order = ConditionalOrder {
            order_id: request
                .order_id
                .clone()
                .unwrap_or_else(ConditionalOrder::generate_id),
            symbol: request.symbol.trim().to_string(),
            side,
            quantity,
            kind,
            trigger_price,
            limit_price,
            client_id: request.client_id.clone(),
            activated: false,
            created_at: Utc::now(),
        };

        self.wal_append(&WalRecord::ConditionalSubmit(order.clone()));
        self.conditionals
            .entry(order.symbol.clone())
            .or_default()
            .insert(order.clone());
        Ok(order)
    }

    /// Promote every conditional order fired by the symbol's last trade
    /// price, breadth-first, feeding promotions back through the submit
    /// pipeline. Each promotion's fills can fire further triggers; the
    /// configured cap bounds the cascade.
    pub(crate) fn run_trigger_cascade(&self, symbol: &str, collected: &mut Vec<Trade>) {
        if symbol.trim().is_empty() {
            return;
        }
        let cap = self.config.conditional_cascade_cap;
        let mut promoted = 0usize;
        let mut queue: VecDeque<OrderRequest> = self.collect_triggered(symbol).into();

        self.promoting.store(true, std::sync::atomic::Ordering::Relaxed);
        while let Some(request) = queue.pop_front() {
            if promoted == cap {
                warn!(
                    cap,
                    dropped = queue.len() + 1,
                    symbol,
                    "conditional cascade cap reached, dropping remaining promotions"
                );
                break;
            }
            promoted += 1;
            let response = self.process_submission(&request, collected);
            debug!(
                order_id = %response.order_id,
                status = %response.status,
                "conditional order promoted"
            );
            queue.extend(self.collect_triggered(symbol));
        }
        self.promoting.store(false, std::sync::atomic::Ordering::Relaxed);
    }

    fn collect_triggered(&self, symbol: &str) -> Vec<OrderRequest> {
        let Some(book) = self.books.get(symbol) else {
            return Vec::new();
        };
        let Some(last_price) = book.last_trade_price() else {
            return Vec::new();
        };
        drop(book);

        let Some(mut registry) = self.conditionals.get_mut(symbol) else {
            return Vec::new();
        };
        let fired = registry.take_triggered(last_price);
        drop(registry);

        fired
            .into_iter()
            .map(|order| {
                debug!(
                    order_id = %order.order_id,
                    kind = %order.kind,
                    trigger = %order.trigger_price,
                    %last_price,
                    "conditional order triggered"
                );
                order.promote()
            })
            .collect()
    }

    fn publish_market_data(&self, book: &OrderBook) {
        self.feeds.publish_book(Self::view_of(book, DEFAULT_DEPTH));
        self.feeds.publish_bbo(book.symbol(), book.bbo());
    }
}
