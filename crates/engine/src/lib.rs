//! # Cassandra Engine
//!
//! Wires the session controllers to the outside world. One queue of
//! `EngineEvent`s feeds one loop; the loop hands each event to the router,
//! which runs every controller in turn. Timers only ever enqueue, so a zone
//! refresh can never interleave with an entry decision.

use api_client::{BrokerGateway, PriceFeed};
use chrono::Utc;
use configuration::Config;
use events::{EngineEvent, OrderTransition};
use recovery::RecoveryRepository;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use strategies::{ZoneGate, ZoneHistoryStore, compute_levels};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;

pub mod controller;
pub mod error;
pub mod router;
pub mod scheduler;

pub use controller::{ControllerState, OrderLifecycleController, OrderRecord, SessionIdentity};
pub use error::{ControllerError, EngineError};
pub use router::StrategyRouter;
pub use scheduler::{SessionScheduler, SessionWindow};

/// Builds one controller per enabled session.
pub fn build_router(config: &Config, gateway: Arc<dyn BrokerGateway>) -> Result<StrategyRouter, EngineError> {
    let fib = &config.fibonacci;
    let levels = compute_levels(fib.base_price, fib.top_price, fib.extended)?;
    let recovery = RecoveryRepository::new(config.recovery.orders_dir.clone());
    let tz = config.instrument.timezone;

    let mut router = StrategyRouter::new(Duration::from_secs(config.zone_history.request_timeout_secs));
    for session in config.enabled_sessions() {
        let gate = session.zone_gated.then(|| {
            let history = ZoneHistoryStore::new(&config.instrument.price_ticker, tz, levels.clone(), &config.zone_history);
            ZoneGate::new(history, fib, &config.zone_history)
        });
        router.register(OrderLifecycleController::new(
            SessionIdentity::new(session, &config.instrument.symbol, &config.instrument.version),
            SessionScheduler::from_params(session, tz)?,
            &config.timing,
            gate,
            Arc::clone(&gateway),
            recovery.clone(),
        ));
    }

    if router.controllers().is_empty() {
        return Err(EngineError::Configuration("no enabled sessions".to_string()));
    }
    Ok(router)
}

/// The central orchestrator for the live process.
pub struct LiveEngine {
    config: Config,
    router: StrategyRouter,
    gateway: Arc<dyn BrokerGateway>,
    feed: Arc<dyn PriceFeed>,
    events_tx: UnboundedSender<EngineEvent>,
    events_rx: UnboundedReceiver<EngineEvent>,
    synthetic_clock: bool,
}

impl LiveEngine {
    /// Creates an engine around an existing queue. Producers such as a broker
    /// bridge or the paper broker hold clones of `events_tx`.
    pub fn new(
        config: Config,
        gateway: Arc<dyn BrokerGateway>,
        feed: Arc<dyn PriceFeed>,
        events_tx: UnboundedSender<EngineEvent>,
        events_rx: UnboundedReceiver<EngineEvent>,
    ) -> Result<Self, EngineError> {
        let router = build_router(&config, Arc::clone(&gateway))?;
        Ok(Self {
            config,
            router,
            gateway,
            feed,
            events_tx,
            events_rx,
            synthetic_clock: false,
        })
    }

    /// A fresh queue for [`LiveEngine::new`].
    pub fn channel() -> (UnboundedSender<EngineEvent>, UnboundedReceiver<EngineEvent>) {
        unbounded_channel()
    }

    /// Drive schedules from a local clock instead of broker ticks.
    pub fn with_synthetic_clock(mut self) -> Self {
        self.synthetic_clock = true;
        self
    }

    pub fn sender(&self) -> UnboundedSender<EngineEvent> {
        self.events_tx.clone()
    }

    /// Recovers every controller, then processes the queue until Ctrl-C.
    pub async fn run(mut self) -> Result<(), EngineError> {
        let transitions = self.router.recover_from(self.gateway.as_ref(), Utc::now()).await;
        log_transitions(&transitions);

        let mut tasks = vec![self.spawn_refresh_timer()];
        if self.synthetic_clock {
            tasks.push(self.spawn_clock());
        }

        tracing::info!(sessions = self.router.controllers().len(), "Engine is running");
        loop {
            tokio::select! {
                event = self.events_rx.recv() => {
                    let Some(event) = event else {
                        tracing::warn!("Event queue closed");
                        break;
                    };
                    let transitions = self.router.dispatch(&event, Utc::now(), self.feed.as_ref()).await;
                    log_transitions(&transitions);
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown requested");
                    break;
                }
            }
        }

        for task in tasks {
            task.abort();
        }
        Ok(())
    }

    fn spawn_refresh_timer(&self) -> JoinHandle<()> {
        let tx = self.events_tx.clone();
        let period = Duration::from_secs(self.config.zone_history.refresh_interval_secs);
        tokio::spawn(async move {
            // The first tick completes immediately, so the history is filled at startup.
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if tx.send(EngineEvent::RefreshZones { at: Utc::now() }).is_err() {
                    break;
                }
            }
        })
    }

    fn spawn_clock(&self) -> JoinHandle<()> {
        let tx = self.events_tx.clone();
        let symbol = self.config.instrument.symbol.clone();
        let period = Duration::from_secs(self.config.timing.tick_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let tick = EngineEvent::Tick {
                    symbol: symbol.clone(),
                    bid: Decimal::ZERO,
                    ask: Decimal::ZERO,
                    at: Utc::now(),
                };
                if tx.send(tick).is_err() {
                    break;
                }
            }
        })
    }
}

fn log_transitions(transitions: &[OrderTransition]) {
    for t in transitions {
        tracing::debug!(transition = ?t, "Controller transition");
    }
}
