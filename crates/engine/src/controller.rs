use crate::error::ControllerError;
use crate::scheduler::{SessionScheduler, SessionWindow};
use api_client::{BrokerGateway, PriceFeed};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use configuration::{SessionParams, Timing};
use core_types::{OpenOrder, OpenOrders, OrderRequest, OrderSide, ZoneCode};
use events::{BrokerMessage, OrderTransition};
use recovery::{RecoveryRecord, RecoveryRepository};
use rust_decimal::Decimal;
use std::sync::Arc;
use strategies::ZoneGate;

/// The position a controller is tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub ticket: u64,
    pub lots: Decimal,
    pub comment: String,
    pub magic: i64,
    /// Reconstructed from the session's open hour and the broker's minute/second.
    pub executed_open_time: DateTime<Tz>,
    pub scheduled_close_time: DateTime<Tz>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Startup, before the first broker snapshot has been scanned.
    Recovering,
    Idle,
    /// An open request was sent for the current window and is unconfirmed.
    Armed,
    Open,
    ClosingRequested {
        requested_at: DateTime<Utc>,
        last_retry_at: DateTime<Utc>,
    },
}

/// Who a controller is at the broker and what it trades.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub name: String,
    pub symbol: String,
    pub comment: String,
    pub magic: i64,
    pub lots: Decimal,
}

impl SessionIdentity {
    pub fn new(params: &SessionParams, symbol: &str, version: &str) -> Self {
        Self {
            name: params.name.clone(),
            symbol: symbol.to_string(),
            comment: params.comment(version),
            magic: params.magic,
            lots: params.lots,
        }
    }
}

/// The order-lifecycle state machine of one session.
///
/// Every handler takes the current instant explicitly and reports the
/// transitions it made. Broker calls are fire-and-forget: only snapshots and
/// `INFO` messages coming back through the event queue move a request forward.
pub struct OrderLifecycleController {
    identity: SessionIdentity,
    scheduler: SessionScheduler,
    tolerance: Duration,
    retry_interval: Duration,
    unconditional_close: Duration,
    gate: Option<ZoneGate>,
    gateway: Arc<dyn BrokerGateway>,
    recovery: RecoveryRepository,

    state: ControllerState,
    window: Option<SessionWindow>,
    order: Option<OrderRecord>,
    entry_blocked_logged: bool,
    unconfirmed_logged: bool,
}

impl OrderLifecycleController {
    pub fn new(
        identity: SessionIdentity,
        scheduler: SessionScheduler,
        timing: &Timing,
        gate: Option<ZoneGate>,
        gateway: Arc<dyn BrokerGateway>,
        recovery: RecoveryRepository,
    ) -> Self {
        Self {
            identity,
            scheduler,
            tolerance: Duration::seconds(timing.entry_tolerance_secs),
            retry_interval: Duration::seconds(timing.close_retry_interval_secs),
            unconditional_close: Duration::seconds(timing.unconditional_close_secs),
            gate,
            gateway,
            recovery,
            state: ControllerState::Recovering,
            window: None,
            order: None,
            entry_blocked_logged: false,
            unconfirmed_logged: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn window(&self) -> Option<&SessionWindow> {
        self.window.as_ref()
    }

    pub fn order(&self) -> Option<&OrderRecord> {
        self.order.as_ref()
    }

    pub fn gate(&self) -> Option<&ZoneGate> {
        self.gate.as_ref()
    }

    /// Startup scan: adopt this session's order if the broker still holds one.
    pub fn recover(&mut self, snapshot: &OpenOrders, now: DateTime<Utc>) -> Vec<OrderTransition> {
        let mut transitions = Vec::new();
        if let Some(record) = self.adopt_from(snapshot) {
            transitions.push(self.opened(&record));
            let close = record.scheduled_close_time;
            self.order = Some(record);
            if close <= now {
                let close = close.with_timezone(&Utc);
                tracing::warn!(
                    session = %self.identity.name,
                    scheduled_close = %close,
                    "Recovered order is past its close time"
                );
                self.state = ControllerState::ClosingRequested {
                    requested_at: close,
                    last_retry_at: close,
                };
            } else {
                self.state = ControllerState::Open;
            }
            return transitions;
        }

        tracing::info!(session = %self.identity.name, "No order to recover");
        self.state = ControllerState::Idle;
        transitions.push(self.schedule_next(now));
        transitions
    }

    pub async fn on_tick(&mut self, now: DateTime<Utc>) -> Vec<OrderTransition> {
        match self.state {
            ControllerState::Recovering => Vec::new(),
            ControllerState::Idle => self.tick_idle(now).await,
            ControllerState::Armed => {
                let lapsed = self.window.is_some_and(|w| w.has_lapsed(now, self.tolerance));
                if lapsed && !self.unconfirmed_logged {
                    self.unconfirmed_logged = true;
                    tracing::warn!(
                        session = %self.identity.name,
                        "Entry window lapsed without an open confirmation; waiting for the broker"
                    );
                }
                Vec::new()
            }
            ControllerState::Open => self.tick_open(now).await,
            ControllerState::ClosingRequested {
                requested_at,
                last_retry_at,
            } => self.tick_closing(now, requested_at, last_retry_at).await,
        }
    }

    pub fn on_message(&mut self, message: &BrokerMessage, now: DateTime<Utc>) -> Vec<OrderTransition> {
        match message {
            BrokerMessage::Error(err) => {
                tracing::warn!(
                    session = %self.identity.name,
                    error_type = %err.error_type,
                    description = %err.description,
                    "Broker reported an error"
                );
                Vec::new()
            }
            BrokerMessage::Info(info) => {
                let Some(ticket) = self.order.as_ref().map(|o| o.ticket) else {
                    return Vec::new();
                };
                if !info.confirms_close_of(ticket) {
                    tracing::debug!(session = %self.identity.name, message = %info.message, "Broker info");
                    return Vec::new();
                }

                tracing::info!(session = %self.identity.name, ticket, "Close confirmed");
                self.order = None;
                self.state = ControllerState::Idle;
                vec![
                    OrderTransition::Closed {
                        session: self.identity.name.clone(),
                        ticket,
                    },
                    self.schedule_next(now),
                ]
            }
        }
    }

    /// Adopts a matching order from a fresh snapshot while nothing is tracked.
    pub fn on_orders_changed(&mut self, snapshot: &OpenOrders, _now: DateTime<Utc>) -> Vec<OrderTransition> {
        match self.state {
            ControllerState::Idle | ControllerState::Armed => {}
            ControllerState::Open | ControllerState::ClosingRequested { .. } => {
                if let Some(ticket) = self.order.as_ref().map(|o| o.ticket) {
                    if !snapshot.contains_key(&ticket) {
                        tracing::debug!(
                            session = %self.identity.name,
                            ticket,
                            "Tracked ticket missing from snapshot; waiting for close confirmation"
                        );
                    }
                }
                return Vec::new();
            }
            ControllerState::Recovering => return Vec::new(),
        }

        let Some(record) = self.adopt_from(snapshot) else {
            return Vec::new();
        };
        let transition = self.opened(&record);
        self.order = Some(record);
        self.state = ControllerState::Open;
        vec![transition]
    }

    /// Refreshes the zone gate, if this session has one.
    pub async fn refresh_zone(&mut self, feed: &dyn PriceFeed, now: DateTime<Utc>) -> Option<ZoneCode> {
        let gate = self.gate.as_mut()?;
        gate.refresh(feed, now).await
    }

    async fn tick_idle(&mut self, now: DateTime<Utc>) -> Vec<OrderTransition> {
        let mut transitions = Vec::new();
        if self.window.is_none_or(|w| w.has_lapsed(now, self.tolerance)) {
            transitions.push(self.schedule_next(now));
        }
        let Some(window) = self.window else {
            return transitions;
        };
        if !window.accepts_entry(now, self.tolerance) {
            return transitions;
        }

        let gating_zone = self.gate.as_ref().and_then(|g| g.current_zone());
        if self.gate.as_ref().is_some_and(|g| !g.allows_entry()) {
            if !self.entry_blocked_logged {
                self.entry_blocked_logged = true;
                tracing::info!(
                    session = %self.identity.name,
                    zone = ?gating_zone,
                    "Entry suppressed by zone gate"
                );
            }
            return transitions;
        }

        let request = OrderRequest {
            symbol: self.identity.symbol.clone(),
            side: OrderSide::Buy,
            lots: self.identity.lots,
            magic: self.identity.magic,
            comment: self.identity.comment.clone(),
        };
        // Marked before the call so a slow or failing gateway never causes a second send.
        self.state = ControllerState::Armed;
        self.unconfirmed_logged = false;
        tracing::info!(
            session = %self.identity.name,
            lots = %request.lots,
            zone = ?gating_zone,
            "Requesting open"
        );
        if let Err(e) = self.gateway.open_order(&request).await {
            tracing::error!(session = %self.identity.name, error = %e, "Open request failed");
        }

        transitions.push(OrderTransition::OpenRequested {
            session: self.identity.name.clone(),
            window_open: window.open_at.with_timezone(&Utc),
            gating_zone,
        });
        transitions
    }

    async fn tick_open(&mut self, now: DateTime<Utc>) -> Vec<OrderTransition> {
        let Some(order) = self.order.as_ref() else {
            return Vec::new();
        };
        if now < order.scheduled_close_time {
            return Vec::new();
        }
        let (ticket, lots) = (order.ticket, order.lots);

        tracing::info!(session = %self.identity.name, ticket, "Requesting close");
        self.state = ControllerState::ClosingRequested {
            requested_at: now,
            last_retry_at: now,
        };
        if let Err(e) = self.gateway.close_order(ticket, lots).await {
            tracing::error!(session = %self.identity.name, ticket, error = %e, "Close request failed");
        }
        vec![OrderTransition::CloseRequested {
            session: self.identity.name.clone(),
            ticket,
        }]
    }

    async fn tick_closing(
        &mut self,
        now: DateTime<Utc>,
        requested_at: DateTime<Utc>,
        last_retry_at: DateTime<Utc>,
    ) -> Vec<OrderTransition> {
        if now - last_retry_at <= self.retry_interval {
            return Vec::new();
        }
        let Some((ticket, lots)) = self.order.as_ref().map(|o| (o.ticket, o.lots)) else {
            return Vec::new();
        };
        self.state = ControllerState::ClosingRequested {
            requested_at,
            last_retry_at: now,
        };

        let elapsed = now - requested_at;
        if elapsed >= self.unconditional_close {
            let pnl = match self.gateway.open_orders().await {
                Ok(snapshot) => snapshot.get(&ticket).map(|o| o.pnl),
                Err(e) => {
                    tracing::warn!(session = %self.identity.name, ticket, error = %e, "Could not read P&L for close retry");
                    return Vec::new();
                }
            };
            if !pnl.is_some_and(|p| p > Decimal::ZERO) {
                tracing::debug!(session = %self.identity.name, ticket, pnl = ?pnl, "Holding close retry until P&L is positive");
                return Vec::new();
            }
        }

        tracing::info!(session = %self.identity.name, ticket, elapsed_secs = elapsed.num_seconds(), "Retrying close");
        if let Err(e) = self.gateway.close_order(ticket, lots).await {
            tracing::error!(session = %self.identity.name, ticket, error = %e, "Close retry failed");
        }
        vec![OrderTransition::CloseRetried {
            session: self.identity.name.clone(),
            ticket,
            elapsed_secs: elapsed.num_seconds(),
        }]
    }

    fn schedule_next(&mut self, now: DateTime<Utc>) -> OrderTransition {
        let window = self.scheduler.next_window(now);
        self.window = Some(window);
        self.entry_blocked_logged = false;
        tracing::info!(
            session = %self.identity.name,
            open_at = %window.open_at,
            close_at = %window.close_at,
            "Next session window"
        );
        OrderTransition::WindowScheduled {
            session: self.identity.name.clone(),
            open_at: window.open_at.with_timezone(&Utc),
            close_at: window.close_at.with_timezone(&Utc),
        }
    }

    fn opened(&self, record: &OrderRecord) -> OrderTransition {
        tracing::info!(
            session = %self.identity.name,
            ticket = record.ticket,
            executed_open = %record.executed_open_time,
            scheduled_close = %record.scheduled_close_time,
            "Tracking order"
        );
        OrderTransition::Opened {
            session: self.identity.name.clone(),
            ticket: record.ticket,
            executed_open_time: record.executed_open_time.with_timezone(&Utc),
            scheduled_close_time: record.scheduled_close_time.with_timezone(&Utc),
        }
    }

    /// The first order in `snapshot` carrying this session's comment tag that can be adopted.
    fn adopt_from(&self, snapshot: &OpenOrders) -> Option<OrderRecord> {
        snapshot
            .iter()
            .filter(|(_, o)| o.comment == self.identity.comment)
            .find_map(|(&ticket, order)| match self.adopt(ticket, order) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::error!(session = %self.identity.name, ticket, error = %e, "Skipping order");
                    None
                }
            })
    }

    fn adopt(&self, ticket: u64, order: &OpenOrder) -> Result<OrderRecord, ControllerError> {
        let executed_open_time = self.executed_open_time(ticket, order)?;
        Ok(OrderRecord {
            ticket,
            lots: order.lots,
            comment: order.comment.clone(),
            magic: order.magic,
            executed_open_time,
            scheduled_close_time: self.scheduler.close_after(executed_open_time),
        })
    }

    /// Reads the persisted open instant, or reconstructs and persists it.
    fn executed_open_time(&self, ticket: u64, order: &OpenOrder) -> Result<DateTime<Tz>, ControllerError> {
        let tz = self.scheduler.timezone();
        let mut persist = true;
        match self.recovery.load(ticket) {
            Ok(Some(record)) => match record.executed_open_time() {
                Ok(t) => return Ok(t.with_timezone(&tz)),
                Err(e) => {
                    tracing::warn!(session = %self.identity.name, ticket, error = %e, "Recovery record unusable, reconstructing");
                    persist = false;
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(session = %self.identity.name, ticket, error = %e, "Recovery record unreadable, reconstructing");
                persist = false;
            }
        }

        let broker_open = order
            .parsed_open_time()
            .map_err(|e| ControllerError::BrokerProtocol(e.to_string()))?;
        let executed = self.scheduler.executed_open_time(broker_open);

        if persist {
            let record = RecoveryRecord::new(ticket, &order.comment, order.lots, &order.open_time, executed.fixed_offset());
            if let Err(e) = self.recovery.save(&record) {
                tracing::error!(session = %self.identity.name, ticket, error = %e, "Could not persist recovery record");
            }
        }
        Ok(executed)
    }
}
