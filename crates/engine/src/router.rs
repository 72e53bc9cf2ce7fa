use crate::controller::OrderLifecycleController;
use api_client::{BrokerGateway, PriceFeed};
use chrono::{DateTime, Utc};
use core_types::OpenOrders;
use events::{EngineEvent, OrderTransition};
use std::time::Duration;

/// Forwards every event unchanged to each registered controller, one after another.
pub struct StrategyRouter {
    refresh_timeout: Duration,
    controllers: Vec<OrderLifecycleController>,
}

impl StrategyRouter {
    /// A zone refresh that outlives `refresh_timeout` is abandoned, leaving
    /// that controller's gate as it was.
    pub fn new(refresh_timeout: Duration) -> Self {
        Self {
            refresh_timeout,
            controllers: Vec::new(),
        }
    }

    pub fn register(&mut self, controller: OrderLifecycleController) {
        tracing::info!(session = %controller.name(), "Controller registered");
        self.controllers.push(controller);
    }

    pub fn controllers(&self) -> &[OrderLifecycleController] {
        &self.controllers
    }

    pub fn recover(&mut self, snapshot: &OpenOrders, now: DateTime<Utc>) -> Vec<OrderTransition> {
        self.controllers
            .iter_mut()
            .flat_map(|c| c.recover(snapshot, now))
            .collect()
    }

    /// Startup recovery against the broker's current book.
    ///
    /// Without a snapshot every controller starts `Idle`; its order, if any,
    /// is adopted once the next `OrdersChanged` arrives.
    pub async fn recover_from(&mut self, gateway: &dyn BrokerGateway, now: DateTime<Utc>) -> Vec<OrderTransition> {
        let snapshot = match gateway.open_orders().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(error = %e, "Open-order snapshot unavailable, starting every session idle");
                OpenOrders::new()
            }
        };
        tracing::info!(open_orders = snapshot.len(), "Running startup recovery");
        self.recover(&snapshot, now)
    }

    /// Delivers `event`; `now` stands in for events that carry no timestamp.
    pub async fn dispatch(
        &mut self,
        event: &EngineEvent,
        now: DateTime<Utc>,
        feed: &dyn PriceFeed,
    ) -> Vec<OrderTransition> {
        let mut transitions = Vec::new();
        for controller in &mut self.controllers {
            match event {
                EngineEvent::Tick { at, .. } => transitions.extend(controller.on_tick(*at).await),
                EngineEvent::Broker(message) => transitions.extend(controller.on_message(message, now)),
                EngineEvent::OrdersChanged(snapshot) => {
                    transitions.extend(controller.on_orders_changed(snapshot, now));
                }
                EngineEvent::RefreshZones { at } => {
                    let refresh = controller.refresh_zone(feed, *at);
                    if tokio::time::timeout(self.refresh_timeout, refresh).await.is_err() {
                        tracing::warn!(
                            session = %controller.name(),
                            timeout = ?self.refresh_timeout,
                            "Zone refresh timed out, keeping the previous zone"
                        );
                    }
                }
            }
        }
        transitions
    }
}
