use api_client::error::ApiError;
use api_client::{BrokerGateway, PriceFeed};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::America::New_York;
use configuration::{FibonacciParams, SessionParams, Timing, ZoneHistoryParams};
use core_types::{Kline, OpenOrder, OpenOrders, OrderRequest, OrderSide, ZoneCode};
use engine::{ControllerState, OrderLifecycleController, SessionIdentity, SessionScheduler, StrategyRouter};
use events::{BrokerMessage, EngineEvent, ErrorMsg, InfoMsg, OrderTransition};
use executor::PaperBroker;
use recovery::{RecoveryRecord, RecoveryRepository};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use strategies::{ZoneGate, ZoneHistoryStore, compute_levels};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeGateway {
    orders: Mutex<OpenOrders>,
    opens: Mutex<Vec<OrderRequest>>,
    closes: Mutex<Vec<(u64, Decimal)>>,
}

impl FakeGateway {
    fn with_order(ticket: u64, order: OpenOrder) -> Self {
        let gw = Self::default();
        gw.orders.lock().unwrap().insert(ticket, order);
        gw
    }

    fn set_pnl(&self, ticket: u64, pnl: Decimal) {
        if let Some(o) = self.orders.lock().unwrap().get_mut(&ticket) {
            o.pnl = pnl;
        }
    }

    fn snapshot(&self) -> OpenOrders {
        self.orders.lock().unwrap().clone()
    }

    fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    fn close_count(&self) -> usize {
        self.closes.lock().unwrap().len()
    }
}

#[async_trait]
impl BrokerGateway for FakeGateway {
    async fn open_order(&self, order: &OrderRequest) -> Result<(), ApiError> {
        self.opens.lock().unwrap().push(order.clone());
        Ok(())
    }

    async fn close_order(&self, ticket: u64, lots: Decimal) -> Result<(), ApiError> {
        self.closes.lock().unwrap().push((ticket, lots));
        Ok(())
    }

    async fn open_orders(&self) -> Result<OpenOrders, ApiError> {
        Ok(self.snapshot())
    }
}

struct StaticFeed(Vec<Kline>);

#[async_trait]
impl PriceFeed for StaticFeed {
    async fn get_bars(
        &self,
        _symbol: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _interval: &str,
    ) -> Result<Vec<Kline>, ApiError> {
        Ok(self.0.clone())
    }
}

/// Accepts the request and never answers.
struct HangingFeed;

#[async_trait]
impl PriceFeed for HangingFeed {
    async fn get_bars(
        &self,
        _symbol: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _interval: &str,
    ) -> Result<Vec<Kline>, ApiError> {
        std::future::pending().await
    }
}

/// A broker bridge that is not answering yet.
struct OfflineGateway;

#[async_trait]
impl BrokerGateway for OfflineGateway {
    async fn open_order(&self, _order: &OrderRequest) -> Result<(), ApiError> {
        Err(ApiError::Broker("bridge offline".to_string()))
    }

    async fn close_order(&self, _ticket: u64, _lots: Decimal) -> Result<(), ApiError> {
        Err(ApiError::Broker("bridge offline".to_string()))
    }

    async fn open_orders(&self) -> Result<OpenOrders, ApiError> {
        Err(ApiError::Broker("bridge offline".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ny(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    New_York.with_ymd_and_hms(y, m, d, h, min, s).unwrap().with_timezone(&Utc)
}

fn td_params() -> SessionParams {
    SessionParams {
        name: "TD".to_string(),
        open_hour: 11,
        open_minute: 30,
        close_hour: 15,
        close_minute: 30,
        overnight: false,
        lots: dec!(0.1),
        magic: 202502252,
        zone_gated: false,
        enabled: true,
    }
}

fn on_params() -> SessionParams {
    SessionParams {
        name: "ON".to_string(),
        open_hour: 15,
        open_minute: 50,
        close_hour: 9,
        close_minute: 30,
        overnight: true,
        lots: dec!(0.1),
        magic: 202502251,
        zone_gated: true,
        enabled: true,
    }
}

fn gate(initial_zone: Option<i8>) -> ZoneGate {
    let fib = FibonacciParams {
        base_price: dec!(3594.52),
        top_price: dec!(4808.93),
        extended: false,
        inhibit_zones: [-5, -3, 3, 4, 5, 6, 7, 9].into_iter().map(ZoneCode).collect(),
        initial_zone: initial_zone.map(ZoneCode),
    };
    let zh = ZoneHistoryParams::default();
    let levels = compute_levels(fib.base_price, fib.top_price, fib.extended).unwrap();
    ZoneGate::new(ZoneHistoryStore::new("^GSPC", New_York, levels, &zh), &fib, &zh)
}

fn controller(
    params: &SessionParams,
    gate: Option<ZoneGate>,
    gateway: Arc<dyn BrokerGateway>,
    dir: &TempDir,
) -> OrderLifecycleController {
    OrderLifecycleController::new(
        SessionIdentity::new(params, "SPXm", "2.0"),
        SessionScheduler::from_params(params, New_York).unwrap(),
        &Timing::default(),
        gate,
        gateway,
        RecoveryRepository::new(dir.path()),
    )
}

fn order(comment: &str, open_time: &str, pnl: Decimal) -> OpenOrder {
    OpenOrder {
        symbol: "SPXm".to_string(),
        side: OrderSide::Buy,
        comment: comment.to_string(),
        lots: dec!(0.1),
        magic: 202502252,
        open_time: open_time.to_string(),
        pnl,
    }
}

fn info(text: &str) -> BrokerMessage {
    BrokerMessage::Info(InfoMsg {
        message: text.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Close retry ladder
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_close_retry_ladder() {
    let dir = tempfile::tempdir().unwrap();
    let gw = Arc::new(FakeGateway::with_order(7, order("TD__Cassandra__V2.0", "2025.03.04 11:30:05", dec!(-5))));
    let mut c = controller(&td_params(), None, gw.clone(), &dir);

    c.recover(&gw.snapshot(), ny(2025, 3, 4, 12, 0, 0));
    assert_eq!(c.state(), ControllerState::Open);
    let record = c.order().unwrap();
    assert_eq!(record.executed_open_time, New_York.with_ymd_and_hms(2025, 3, 4, 11, 30, 5).unwrap());
    assert_eq!(record.scheduled_close_time, New_York.with_ymd_and_hms(2025, 3, 4, 15, 30, 0).unwrap());

    // Not yet due.
    assert!(c.on_tick(ny(2025, 3, 4, 15, 29, 59)).await.is_empty());

    let t = ny(2025, 3, 4, 15, 30, 0);
    let out = c.on_tick(t).await;
    assert!(matches!(out.as_slice(), [OrderTransition::CloseRequested { ticket: 7, .. }]));
    assert_eq!(gw.close_count(), 1);

    // Inside the 10 second spacing nothing is resent.
    assert!(c.on_tick(t + Duration::seconds(5)).await.is_empty());
    assert!(c.on_tick(t + Duration::seconds(10)).await.is_empty());
    assert_eq!(gw.close_count(), 1);

    // T+90s: losing, but still inside the unconditional window.
    let out = c.on_tick(t + Duration::seconds(90)).await;
    assert!(matches!(out.as_slice(), [OrderTransition::CloseRetried { elapsed_secs: 90, .. }]));
    assert_eq!(gw.close_count(), 2);

    // T+5min: still losing, the position is left alone.
    assert!(c.on_tick(t + Duration::minutes(5)).await.is_empty());
    assert_eq!(gw.close_count(), 2);

    // Once profitable the close is resent.
    gw.set_pnl(7, dec!(3));
    let out = c.on_tick(t + Duration::minutes(5) + Duration::seconds(11)).await;
    assert!(matches!(out.as_slice(), [OrderTransition::CloseRetried { ticket: 7, .. }]));
    assert_eq!(gw.close_count(), 3);
    assert!(matches!(c.state(), ControllerState::ClosingRequested { .. }));
}

#[tokio::test]
async fn test_profitable_position_is_resent_after_four_minutes() {
    let dir = tempfile::tempdir().unwrap();
    let gw = Arc::new(FakeGateway::with_order(8, order("TD__Cassandra__V2.0", "2025.03.04 11:30:05", dec!(12.5))));
    let mut c = controller(&td_params(), None, gw.clone(), &dir);
    c.recover(&gw.snapshot(), ny(2025, 3, 4, 12, 0, 0));

    let t = ny(2025, 3, 4, 15, 30, 0);
    c.on_tick(t).await;
    let out = c.on_tick(t + Duration::minutes(5)).await;
    assert!(matches!(out.as_slice(), [OrderTransition::CloseRetried { elapsed_secs: 300, .. }]));
    assert_eq!(gw.close_count(), 2);
}

// ---------------------------------------------------------------------------
// Startup recovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_recovered_order_past_close_goes_straight_to_closing() {
    let dir = tempfile::tempdir().unwrap();
    let gw = Arc::new(FakeGateway::with_order(11, order("TD__Cassandra__V2.0", "2025.03.04 11:30:05", dec!(-1))));
    let mut c = controller(&td_params(), None, gw.clone(), &dir);

    let now = ny(2025, 3, 4, 16, 0, 0);
    let out = c.recover(&gw.snapshot(), now);
    assert!(matches!(out.as_slice(), [OrderTransition::Opened { ticket: 11, .. }]));

    let close = ny(2025, 3, 4, 15, 30, 0);
    assert_eq!(
        c.state(),
        ControllerState::ClosingRequested {
            requested_at: close,
            last_retry_at: close,
        }
    );
    assert_eq!(gw.close_count(), 0);

    // Half an hour past the close and losing: nothing is sent.
    assert!(c.on_tick(now).await.is_empty());
    gw.set_pnl(11, dec!(1));
    assert_eq!(c.on_tick(now + Duration::seconds(11)).await.len(), 1);
    assert_eq!(gw.close_count(), 1);
}

#[tokio::test]
async fn test_recovery_record_is_written_then_reused() {
    let dir = tempfile::tempdir().unwrap();
    let repo = RecoveryRepository::new(dir.path());
    let gw = Arc::new(FakeGateway::with_order(21, order("ON__Cassandra__V2.0", "2025.03.04 22:50:17", dec!(0))));

    let mut first = controller(&on_params(), Some(gate(None)), gw.clone(), &dir);
    first.recover(&gw.snapshot(), ny(2025, 3, 4, 17, 0, 0));
    let saved = repo.load(21).unwrap().unwrap();
    assert_eq!(saved.open_time, "2025.03.04 22:50:17");
    assert_eq!(saved.open_time_extended, "2025-03-04T15:50:17-05:00");
    assert_eq!(
        first.order().unwrap().scheduled_close_time,
        New_York.with_ymd_and_hms(2025, 3, 5, 9, 30, 0).unwrap()
    );

    // A persisted record wins over re-deriving from the broker's field.
    let pinned = New_York.with_ymd_and_hms(2025, 3, 4, 15, 51, 0).unwrap();
    repo.save(&RecoveryRecord::new(21, "ON__Cassandra__V2.0", dec!(0.1), "2025.03.04 22:50:17", pinned.fixed_offset()))
        .unwrap();
    let mut second = controller(&on_params(), Some(gate(None)), gw.clone(), &dir);
    second.recover(&gw.snapshot(), ny(2025, 3, 4, 17, 0, 0));
    assert_eq!(second.order().unwrap().executed_open_time, pinned);
}

#[tokio::test]
async fn test_corrupt_recovery_record_is_reconstructed_but_kept() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("31_cassandra.json");
    std::fs::write(&path, "{not json").unwrap();
    let gw = Arc::new(FakeGateway::with_order(31, order("ON__Cassandra__V2.0", "2025.03.04 22:50:17", dec!(0))));

    let mut c = controller(&on_params(), Some(gate(None)), gw.clone(), &dir);
    let out = c.recover(&gw.snapshot(), ny(2025, 3, 4, 17, 0, 0));

    assert!(matches!(out.as_slice(), [OrderTransition::Opened { ticket: 31, .. }]));
    assert_eq!(c.state(), ControllerState::Open);
    assert_eq!(
        c.order().unwrap().executed_open_time,
        New_York.with_ymd_and_hms(2025, 3, 4, 15, 50, 17).unwrap()
    );
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
}

#[tokio::test]
async fn test_malformed_open_time_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let gw = Arc::new(FakeGateway::with_order(5, order("TD__Cassandra__V2.0", "04/03/2025 11:30", dec!(0))));
    let mut c = controller(&td_params(), None, gw.clone(), &dir);

    let out = c.recover(&gw.snapshot(), ny(2025, 3, 4, 9, 0, 0));
    assert!(matches!(out.as_slice(), [OrderTransition::WindowScheduled { .. }]));
    assert_eq!(c.state(), ControllerState::Idle);
    assert!(c.order().is_none());
}

#[tokio::test]
async fn test_foreign_orders_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let gw = Arc::new(FakeGateway::with_order(5, order("ON__Cassandra__V2.0", "2025.03.04 15:50:00", dec!(0))));
    let mut c = controller(&td_params(), None, gw.clone(), &dir);
    c.recover(&gw.snapshot(), ny(2025, 3, 4, 9, 0, 0));
    assert_eq!(c.state(), ControllerState::Idle);
}

// ---------------------------------------------------------------------------
// Entry and close confirmation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_full_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let gw = Arc::new(FakeGateway::default());
    let mut c = controller(&td_params(), None, gw.clone(), &dir);

    c.recover(&OpenOrders::new(), ny(2025, 3, 4, 9, 0, 0));
    let window = *c.window().unwrap();
    assert_eq!(window.open_at, New_York.with_ymd_and_hms(2025, 3, 4, 11, 30, 0).unwrap());

    assert!(c.on_tick(ny(2025, 3, 4, 11, 29, 0)).await.is_empty());
    let out = c.on_tick(ny(2025, 3, 4, 11, 30, 1)).await;
    assert!(matches!(out.as_slice(), [OrderTransition::OpenRequested { gating_zone: None, .. }]));
    assert_eq!(c.state(), ControllerState::Armed);

    // No duplicate request while unconfirmed, even after the window lapses.
    c.on_tick(ny(2025, 3, 4, 11, 31, 0)).await;
    c.on_tick(ny(2025, 3, 4, 12, 30, 0)).await;
    assert_eq!(gw.open_count(), 1);
    let sent = gw.opens.lock().unwrap()[0].clone();
    assert_eq!(sent.comment, "TD__Cassandra__V2.0");
    assert_eq!(sent.magic, 202502252);

    let mut snapshot = OpenOrders::new();
    snapshot.insert(99, order("TD__Cassandra__V2.0", "2025.03.04 18:30:42", dec!(0)));
    let out = c.on_orders_changed(&snapshot, ny(2025, 3, 4, 12, 31, 0));
    assert!(matches!(out.as_slice(), [OrderTransition::Opened { ticket: 99, .. }]));
    assert_eq!(c.state(), ControllerState::Open);

    // A confirmation for another ticket changes nothing.
    assert!(c.on_message(&info("Successfully closed order: 9"), ny(2025, 3, 4, 15, 31, 0)).is_empty());

    c.on_tick(ny(2025, 3, 4, 15, 30, 0)).await;
    assert_eq!(gw.closes.lock().unwrap().as_slice(), &[(99, dec!(0.1))]);

    let out = c.on_message(&info("Successfully closed order: 99"), ny(2025, 3, 4, 15, 30, 2));
    assert!(matches!(
        out.as_slice(),
        [OrderTransition::Closed { ticket: 99, .. }, OrderTransition::WindowScheduled { .. }]
    ));
    assert_eq!(c.state(), ControllerState::Idle);
    assert!(c.order().is_none());
    assert_eq!(c.window().unwrap().open_at, New_York.with_ymd_and_hms(2025, 3, 5, 11, 30, 0).unwrap());
}

#[tokio::test]
async fn test_broker_errors_do_not_change_state() {
    let dir = tempfile::tempdir().unwrap();
    let gw = Arc::new(FakeGateway::default());
    let mut c = controller(&td_params(), None, gw.clone(), &dir);
    c.recover(&OpenOrders::new(), ny(2025, 3, 4, 9, 0, 0));
    c.on_tick(ny(2025, 3, 4, 11, 30, 1)).await;

    let err = BrokerMessage::Error(ErrorMsg {
        error_type: "OPEN_ORDER".to_string(),
        description: "Market closed".to_string(),
    });
    assert!(c.on_message(&err, ny(2025, 3, 4, 11, 30, 2)).is_empty());
    assert_eq!(c.state(), ControllerState::Armed);
}

#[tokio::test]
async fn test_lapsed_window_is_rescheduled() {
    let dir = tempfile::tempdir().unwrap();
    let gw = Arc::new(FakeGateway::default());
    let mut c = controller(&td_params(), Some(gate(Some(5))), gw.clone(), &dir);
    c.recover(&OpenOrders::new(), ny(2025, 3, 4, 9, 0, 0));

    let out = c.on_tick(ny(2025, 3, 4, 12, 0, 0)).await;
    assert!(matches!(out.as_slice(), [OrderTransition::WindowScheduled { .. }]));
    assert_eq!(c.window().unwrap().open_at, New_York.with_ymd_and_hms(2025, 3, 5, 11, 30, 0).unwrap());
}

// ---------------------------------------------------------------------------
// Zone gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_inhibited_zone_blocks_entry() {
    let dir = tempfile::tempdir().unwrap();
    let gw = Arc::new(FakeGateway::default());
    let mut c = controller(&on_params(), Some(gate(Some(5))), gw.clone(), &dir);
    c.recover(&OpenOrders::new(), ny(2025, 3, 4, 9, 0, 0));

    for minute in [50, 51, 59] {
        assert!(c.on_tick(ny(2025, 3, 4, 15, minute, 0)).await.is_empty());
    }
    assert_eq!(gw.open_count(), 0);
    assert_eq!(c.state(), ControllerState::Idle);
}

#[tokio::test]
async fn test_allowed_zone_enters() {
    let dir = tempfile::tempdir().unwrap();
    let gw = Arc::new(FakeGateway::default());
    let mut c = controller(&on_params(), Some(gate(Some(14))), gw.clone(), &dir);
    c.recover(&OpenOrders::new(), ny(2025, 3, 4, 9, 0, 0));

    let out = c.on_tick(ny(2025, 3, 4, 15, 50, 0)).await;
    assert!(matches!(
        out.as_slice(),
        [OrderTransition::OpenRequested { gating_zone: Some(ZoneCode(14)), .. }]
    ));
    assert_eq!(gw.open_count(), 1);
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_router_fans_out_to_every_controller() {
    let dir = tempfile::tempdir().unwrap();
    let gw = Arc::new(FakeGateway::default());
    let mut router = StrategyRouter::new(std::time::Duration::from_secs(5));
    router.register(controller(&td_params(), None, gw.clone(), &dir));
    router.register(controller(&on_params(), Some(gate(Some(14))), gw.clone(), &dir));

    let scheduled = router.recover(&OpenOrders::new(), ny(2025, 3, 4, 9, 0, 0));
    assert_eq!(scheduled.len(), 2);

    let feed = StaticFeed(Vec::new());
    let tick = |symbol: &str, at| EngineEvent::Tick {
        symbol: symbol.to_string(),
        bid: dec!(5000),
        ask: dec!(5000.5),
        at,
    };

    // Any subscribed symbol drives the clock, not only the traded one.
    let out = router.dispatch(&tick("EURUSD", ny(2025, 3, 4, 11, 30, 0)), Utc::now(), &feed).await;
    assert!(matches!(out.as_slice(), [OrderTransition::OpenRequested { .. }]));
    assert_eq!(gw.open_count(), 1);

    let out = router.dispatch(&tick("SPXm", ny(2025, 3, 4, 15, 50, 0)), Utc::now(), &feed).await;
    assert_eq!(out.len(), 1);
    assert_eq!(gw.open_count(), 2);

    // Each controller only adopts its own order from the shared snapshot.
    let mut snapshot = OpenOrders::new();
    snapshot.insert(1, order("TD__Cassandra__V2.0", "2025.03.04 11:30:03", dec!(0)));
    snapshot.insert(2, order("ON__Cassandra__V2.0", "2025.03.04 15:50:03", dec!(0)));
    let out = router
        .dispatch(&EngineEvent::OrdersChanged(snapshot), ny(2025, 3, 4, 15, 51, 0), &feed)
        .await;
    assert_eq!(out.len(), 2);
    let tickets: Vec<u64> = router.controllers().iter().map(|c| c.order().unwrap().ticket).collect();
    assert_eq!(tickets, vec![1, 2]);

    // A refresh with no data leaves the gating zone as seeded.
    router
        .dispatch(&EngineEvent::RefreshZones { at: ny(2025, 3, 5, 9, 0, 0) }, Utc::now(), &feed)
        .await;
    assert_eq!(router.controllers()[1].gate().unwrap().current_zone(), Some(ZoneCode(14)));
}

#[tokio::test]
async fn test_hung_zone_refresh_does_not_stall_the_router() {
    let dir = tempfile::tempdir().unwrap();
    let gw = Arc::new(FakeGateway::default());
    let mut router = StrategyRouter::new(std::time::Duration::from_millis(200));
    router.register(controller(&on_params(), Some(gate(Some(14))), gw.clone(), &dir));
    router.recover(&OpenOrders::new(), ny(2025, 3, 4, 9, 0, 0));

    let refresh = EngineEvent::RefreshZones { at: ny(2025, 3, 4, 12, 0, 0) };
    let bounded = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        router.dispatch(&refresh, Utc::now(), &HangingFeed),
    )
    .await;
    assert!(bounded.is_ok());
    assert_eq!(router.controllers()[0].gate().unwrap().current_zone(), Some(ZoneCode(14)));

    // The next event is still handled.
    let tick = EngineEvent::Tick {
        symbol: "SPXm".to_string(),
        bid: dec!(5000),
        ask: dec!(5000.5),
        at: ny(2025, 3, 4, 15, 50, 0),
    };
    let out = router.dispatch(&tick, Utc::now(), &HangingFeed).await;
    assert_eq!(out.len(), 1);
    assert_eq!(gw.open_count(), 1);
}

#[tokio::test]
async fn test_unavailable_snapshot_starts_sessions_idle() {
    let dir = tempfile::tempdir().unwrap();
    let mut router = StrategyRouter::new(std::time::Duration::from_secs(5));
    router.register(controller(&td_params(), None, Arc::new(OfflineGateway), &dir));
    router.register(controller(&on_params(), Some(gate(Some(14))), Arc::new(OfflineGateway), &dir));

    let out = router.recover_from(&OfflineGateway, ny(2025, 3, 4, 9, 0, 0)).await;
    assert_eq!(out.len(), 2);
    assert!(out.iter().all(|t| matches!(t, OrderTransition::WindowScheduled { .. })));
    assert!(router.controllers().iter().all(|c| c.state() == ControllerState::Idle));

    // The order is picked up once the bridge reports it.
    let mut snapshot = OpenOrders::new();
    snapshot.insert(7, order("TD__Cassandra__V2.0", "2025.03.04 11:30:03", dec!(0)));
    let out = router
        .dispatch(&EngineEvent::OrdersChanged(snapshot), ny(2025, 3, 4, 12, 0, 0), &StaticFeed(Vec::new()))
        .await;
    assert!(matches!(out.as_slice(), [OrderTransition::Opened { ticket: 7, .. }]));
    assert_eq!(router.controllers()[0].order().unwrap().ticket, 7);
}

// ---------------------------------------------------------------------------
// Paper broker round trip
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_paper_broker_round_trip_through_queue() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let broker = Arc::new(PaperBroker::new(tx));
    let feed = StaticFeed(Vec::new());

    let mut router = StrategyRouter::new(std::time::Duration::from_secs(5));
    router.register(controller(&td_params(), None, broker.clone(), &dir));
    router.recover(&OpenOrders::new(), ny(2025, 3, 4, 9, 0, 0));

    let tick = |at| EngineEvent::Tick {
        symbol: "SPXm".to_string(),
        bid: Decimal::ZERO,
        ask: Decimal::ZERO,
        at,
    };

    router.dispatch(&tick(ny(2025, 3, 4, 11, 30, 0)), Utc::now(), &feed).await;
    let filled = rx.recv().await.unwrap();
    let out = router.dispatch(&filled, Utc::now(), &feed).await;
    assert!(matches!(out.as_slice(), [OrderTransition::Opened { ticket: 1, .. }]));

    // The paper fill is stamped with the real clock, so close well after it.
    let later = Utc::now() + Duration::days(4);
    router.dispatch(&tick(later), later, &feed).await;
    assert!(matches!(router.controllers()[0].state(), ControllerState::ClosingRequested { .. }));

    let mut closed = false;
    while let Ok(event) = rx.try_recv() {
        let out = router.dispatch(&event, later, &feed).await;
        closed |= out.iter().any(|t| matches!(t, OrderTransition::Closed { ticket: 1, .. }));
    }
    assert!(closed);
    assert_eq!(router.controllers()[0].state(), ControllerState::Idle);
    assert!(dir.path().join("1_cassandra.json").exists());
}
