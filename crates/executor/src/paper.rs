use crate::error::ExecutorError;
use api_client::BrokerGateway;
use api_client::error::ApiError;
use async_trait::async_trait;
use chrono::{FixedOffset, Offset, Utc};
use core_types::{BROKER_TIME_FORMAT, OpenOrder, OpenOrders, OrderRequest};
use events::{BrokerMessage, CLOSE_CONFIRMATION_MARKER, EngineEvent, InfoMsg};
use rust_decimal::Decimal;
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;

/// The in-memory "virtual broker" used in paper mode.
///
/// Every open request fills at once. After each change the broker publishes
/// a fresh open-order snapshot, and after a full close it also publishes the
/// `INFO` confirmation the real bridge would send.
pub struct PaperBroker {
    state: Mutex<PaperBook>,
    /// Offset of the broker's server clock, used for `open_time`.
    server_offset: FixedOffset,
    events: UnboundedSender<EngineEvent>,
}

#[derive(Debug)]
struct PaperBook {
    orders: OpenOrders,
    next_ticket: u64,
}

impl PaperBroker {
    pub fn new(events: UnboundedSender<EngineEvent>) -> Self {
        Self::with_server_offset(events, Utc.fix())
    }

    pub fn with_server_offset(events: UnboundedSender<EngineEvent>, server_offset: FixedOffset) -> Self {
        Self {
            state: Mutex::new(PaperBook {
                orders: OpenOrders::new(),
                next_ticket: 1,
            }),
            server_offset,
            events,
        }
    }

    fn book(&self) -> std::sync::MutexGuard<'_, PaperBook> {
        // A poisoned book is still a consistent map; keep serving it.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Engine queue closed, dropping paper broker notification");
        }
    }

    fn fill(&self, order: &OrderRequest) -> Result<(u64, OpenOrders), ExecutorError> {
        if order.lots <= Decimal::ZERO {
            return Err(ExecutorError::NonPositiveLots(order.lots.to_string()));
        }
        let open_time = Utc::now()
            .with_timezone(&self.server_offset)
            .format(BROKER_TIME_FORMAT)
            .to_string();

        let mut book = self.book();
        let ticket = book.next_ticket;
        book.next_ticket += 1;
        book.orders.insert(
            ticket,
            OpenOrder {
                symbol: order.symbol.clone(),
                side: order.side,
                comment: order.comment.clone(),
                lots: order.lots,
                magic: order.magic,
                open_time,
                pnl: Decimal::ZERO,
            },
        );
        Ok((ticket, book.orders.clone()))
    }

    /// Reduces or removes a position. Returns the remaining lots and the new snapshot.
    fn reduce(&self, ticket: u64, lots: Decimal) -> Result<(Decimal, OpenOrders), ExecutorError> {
        let mut book = self.book();
        let held = book
            .orders
            .get(&ticket)
            .map(|o| o.lots)
            .ok_or(ExecutorError::UnknownTicket(ticket))?;
        if lots <= Decimal::ZERO || lots > held {
            return Err(ExecutorError::InvalidLots {
                ticket,
                requested: lots.to_string(),
                available: held.to_string(),
            });
        }

        let remaining = held - lots;
        if remaining.is_zero() {
            book.orders.remove(&ticket);
        } else if let Some(order) = book.orders.get_mut(&ticket) {
            order.lots = remaining;
        }
        Ok((remaining, book.orders.clone()))
    }
}

#[async_trait]
impl BrokerGateway for PaperBroker {
    async fn open_order(&self, order: &OrderRequest) -> Result<(), ApiError> {
        let (ticket, snapshot) = self.fill(order)?;
        tracing::info!(
            ticket,
            symbol = %order.symbol,
            side = order.side.as_str(),
            lots = %order.lots,
            comment = %order.comment,
            "Paper order filled"
        );
        self.publish(EngineEvent::OrdersChanged(snapshot));
        Ok(())
    }

    async fn close_order(&self, ticket: u64, lots: Decimal) -> Result<(), ApiError> {
        let (remaining, snapshot) = self.reduce(ticket, lots)?;
        tracing::info!(ticket, lots = %lots, remaining = %remaining, "Paper order closed");
        self.publish(EngineEvent::OrdersChanged(snapshot));
        if remaining.is_zero() {
            self.publish(EngineEvent::Broker(BrokerMessage::Info(InfoMsg {
                message: format!("{}: {}", CLOSE_CONFIRMATION_MARKER, ticket),
            })));
        }
        Ok(())
    }

    async fn open_orders(&self) -> Result<OpenOrders, ApiError> {
        Ok(self.book().orders.clone())
    }
}
