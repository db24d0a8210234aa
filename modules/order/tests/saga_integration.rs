//! Saga orchestrator scenarios over the in-memory fabric.

mod common;

use common::*;
use message_log::headers::BusinessContext;
use message_log::MessageLog;
use order_service::domain::{NotificationEvent, OrderRepository, OrderState, OrderTimeoutCheck};
use order_service::error::{BusinessReject, OrderError};
use order_service::ports::{CallContext, SeckillGate};
use order_service::saga::Orchestrator;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const DEADLINE: Duration = Duration::from_secs(5);

fn vip_call(promo_id: &str) -> CallContext {
    let mut business = BusinessContext::new();
    business.set_promotion_id(promo_id);
    CallContext::new(message_log::headers::TraceContext::new_root(), business)
}

#[tokio::test]
async fn happy_vip_path_places_order_and_schedules_timeout() {
    let fabric = fabric();
    let orchestrator = Orchestrator::new(fabric.deps.clone(), DEADLINE);

    let mut event = creation_event("order-s1", "U1", &["A", "B"]);
    event.is_vip = true;
    event.promo_id = Some("PROMO-7".to_string());

    let order = orchestrator
        .process(event, vip_call("PROMO-7"))
        .await
        .expect("saga should succeed");

    assert_eq!(order.state, OrderState::PendingPayment);
    let stored = fabric.repo.find("order-s1").await.unwrap().unwrap();
    assert_eq!(stored.state, OrderState::PendingPayment);

    // Both items reserved under this order, nothing released.
    assert_eq!(
        fabric.inventory.reserved(),
        vec![
            ("A".to_string(), "order-s1".to_string()),
            ("B".to_string(), "order-s1".to_string()),
        ]
    );
    assert!(fabric.inventory.released().is_empty());

    // Exactly one timeout check scheduled into the delay intake.
    assert_eq!(fabric.log.len(DELAY_TOPIC).await, 1);
    let scheduled = fabric.log.fetch(DELAY_TOPIC, "inspect").await.unwrap();
    let check: OrderTimeoutCheck = serde_json::from_slice(&scheduled.payload).unwrap();
    assert_eq!(check.order_id, "order-s1");
    assert_eq!(check.items, vec!["A".to_string(), "B".to_string()]);

    // One notification mentioning the VIP promotion.
    let note = fabric.log.fetch(NOTIFICATION_TOPIC, "inspect").await.unwrap();
    let note: NotificationEvent = serde_json::from_slice(&note.payload).unwrap();
    assert_eq!(note.user_id, "U1");
    assert!(note.message.contains("VIP promotion"));
    assert_eq!(note.promotion_id.as_deref(), Some("PROMO-7"));
}

#[tokio::test]
async fn business_context_reaches_the_pricing_call() {
    let fabric = fabric();
    let orchestrator = Orchestrator::new(fabric.deps.clone(), DEADLINE);

    let mut event = creation_event("order-promo", "U1", &["A"]);
    event.is_vip = true;
    event.promo_id = Some("PROMO-42".to_string());
    orchestrator
        .process(event, vip_call("PROMO-42"))
        .await
        .unwrap();

    let event = creation_event("order-plain", "U2", &["A"]);
    orchestrator.process(event, CallContext::root()).await.unwrap();

    assert_eq!(
        *fabric.pricing.seen_promotions.lock().unwrap(),
        vec![Some("PROMO-42".to_string()), None]
    );
}

#[tokio::test]
async fn seckill_sold_out_aborts_without_touching_inventory() {
    let fabric = fabric();
    let orchestrator = Orchestrator::new(fabric.deps.clone(), DEADLINE);
    fabric.gate.prepare("P", 1).await.unwrap();

    let mut first = creation_event("order-u1", "U1", &["A"]);
    first.seckill_product_id = Some("P".to_string());
    let order = orchestrator
        .process(first, CallContext::root())
        .await
        .expect("first contender wins the stock");
    assert_eq!(order.state, OrderState::PendingPayment);

    let mut second = creation_event("order-u2", "U2", &["A"]);
    second.seckill_product_id = Some("P".to_string());
    let err = orchestrator
        .process(second, CallContext::root())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrderError::Reject(BusinessReject::SeckillSoldOut { .. })
    ));

    let failed = fabric.repo.find("order-u2").await.unwrap().unwrap();
    assert_eq!(failed.state, OrderState::Failed);

    // The losing saga never reached inventory, and only the winner scheduled
    // a timeout.
    assert_eq!(fabric.inventory.reserved().len(), 1);
    assert!(fabric.inventory.released().is_empty());
    assert_eq!(fabric.log.len(DELAY_TOPIC).await, 1);
}

#[tokio::test]
async fn seckill_duplicate_does_not_fire_the_winners_compensation() {
    let fabric = fabric();
    let orchestrator = Orchestrator::new(fabric.deps.clone(), DEADLINE);
    fabric.gate.prepare("P", 1).await.unwrap();

    let mut first = creation_event("order-first", "U1", &["A"]);
    first.seckill_product_id = Some("P".to_string());
    orchestrator
        .process(first, CallContext::root())
        .await
        .unwrap();

    // Same buyer again: a separate saga that never succeeds at the gate.
    let mut again = creation_event("order-again", "U1", &["A"]);
    again.seckill_product_id = Some("P".to_string());
    let err = orchestrator
        .process(again, CallContext::root())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrderError::Reject(BusinessReject::SeckillDuplicate { .. })
    ));

    // The winning grant is untouched: stock stays spent and the first order
    // stays placed.
    assert_eq!(fabric.gate.remaining("P").await, 0);
    let winner = fabric.repo.find("order-first").await.unwrap().unwrap();
    assert_eq!(winner.state, OrderState::PendingPayment);
}

#[tokio::test]
async fn partial_inventory_failure_releases_reserved_items_in_lifo_order() {
    let fabric = fabric();
    let orchestrator = Orchestrator::new(fabric.deps.clone(), DEADLINE);
    fabric.inventory.fail_on("C");

    let event = creation_event("order-s4", "U1", &["A", "B", "C"]);
    let err = orchestrator
        .process(event, CallContext::root())
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Transport { .. }));

    // B then A, each against this order.
    assert_eq!(
        fabric.inventory.released(),
        vec![
            ("B".to_string(), "order-s4".to_string()),
            ("A".to_string(), "order-s4".to_string()),
        ]
    );

    let failed = fabric.repo.find("order-s4").await.unwrap().unwrap();
    assert_eq!(failed.state, OrderState::Failed);
    // The saga never reached the scheduling step.
    assert_eq!(fabric.log.len(DELAY_TOPIC).await, 0);
}

#[tokio::test]
async fn pricing_and_shipping_failures_are_aggregated_and_unwind_everything() {
    let fabric = fabric();
    let orchestrator = Orchestrator::new(fabric.deps.clone(), DEADLINE);
    fabric.gate.prepare("P", 3).await.unwrap();
    fabric.pricing.fail.store(true, Ordering::SeqCst);
    fabric.shipping.fail.store(true, Ordering::SeqCst);

    let mut event = creation_event("order-s5", "U1", &["A", "B"]);
    event.seckill_product_id = Some("P".to_string());
    let err = orchestrator
        .process(event, CallContext::root())
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("pricing service error"), "{}", message);
    assert!(message.contains("shipping service error"), "{}", message);

    // Inventory unwound LIFO, and the seckill grant was cancelled last.
    assert_eq!(
        fabric.inventory.released(),
        vec![
            ("B".to_string(), "order-s5".to_string()),
            ("A".to_string(), "order-s5".to_string()),
        ]
    );
    assert_eq!(fabric.gate.remaining("P").await, 3);

    let failed = fabric.repo.find("order-s5").await.unwrap().unwrap();
    assert_eq!(failed.state, OrderState::Failed);
}

#[tokio::test]
async fn fraud_refusal_aborts_with_nothing_to_unwind() {
    let fabric = fabric();
    let orchestrator = Orchestrator::new(fabric.deps.clone(), DEADLINE);
    fabric.fraud.refuse.store(true, Ordering::SeqCst);

    let event = creation_event("order-fraud", "U9", &["A"]);
    let err = orchestrator
        .process(event, CallContext::root())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrderError::Reject(BusinessReject::FraudRefused { .. })
    ));

    assert!(fabric.inventory.reserved().is_empty());
    assert!(fabric.inventory.released().is_empty());
    let failed = fabric.repo.find("order-fraud").await.unwrap().unwrap();
    assert_eq!(failed.state, OrderState::Failed);
}

#[tokio::test]
async fn deadline_expiry_fails_the_saga_and_still_unwinds() {
    let fabric = fabric();
    // Pricing outlives the 100ms processing deadline.
    *fabric.pricing.delay.lock().unwrap() = Some(Duration::from_secs(2));
    fabric.gate.prepare("P", 1).await.unwrap();

    let orchestrator = Orchestrator::new(fabric.deps.clone(), Duration::from_millis(100));

    let mut event = creation_event("order-slow", "U1", &["A"]);
    event.seckill_product_id = Some("P".to_string());
    let err = orchestrator
        .process(event, CallContext::root())
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Timeout(_)));

    // Everything registered before the deadline fired was compensated: the
    // reserved item released and the seckill grant returned.
    assert_eq!(
        fabric.inventory.released(),
        vec![("A".to_string(), "order-slow".to_string())]
    );
    assert_eq!(fabric.gate.remaining("P").await, 1);

    let failed = fabric.repo.find("order-slow").await.unwrap().unwrap();
    assert_eq!(failed.state, OrderState::Failed);
}

#[tokio::test]
async fn scheduler_enqueue_failure_does_not_fail_a_placed_order() {
    // A scheduler pointed at a closed log: every enqueue fails.
    let fabric = fabric();
    let dead_log = Arc::new(message_log::InMemoryLog::new());
    dead_log.close().await;

    let deps = Arc::new(order_service::saga::Deps {
        repo: fabric.repo.clone(),
        fraud: fabric.fraud.clone(),
        gate: fabric.gate.clone(),
        inventory: fabric.inventory.clone(),
        pricing: fabric.pricing.clone(),
        shipping: fabric.shipping.clone(),
        scheduler: Arc::new(order_service::adapters::LogTimeoutScheduler::new(
            dead_log,
            DELAY_TOPIC,
            TIMEOUT_TOPIC,
        )),
        notifier: fabric.deps.notifier.clone(),
    });
    let orchestrator = Orchestrator::new(deps, DEADLINE);

    let event = creation_event("order-noschedule", "U1", &["A"]);
    let order = orchestrator
        .process(event, CallContext::root())
        .await
        .expect("a missing timeout is preferable to losing the order");
    assert_eq!(order.state, OrderState::PendingPayment);
    assert!(fabric.inventory.released().is_empty());
}

#[tokio::test]
async fn redelivered_event_reuses_the_same_order_row() {
    let fabric = fabric();
    let orchestrator = Orchestrator::new(fabric.deps.clone(), DEADLINE);

    let event = creation_event("order-dup", "U1", &["A"]);
    orchestrator
        .process(event.clone(), CallContext::root())
        .await
        .unwrap();
    orchestrator.process(event, CallContext::root()).await.unwrap();

    // Same event id, same order id: the upsert kept one row.
    let stored = fabric.repo.find("order-dup").await.unwrap().unwrap();
    assert_eq!(stored.state, OrderState::PendingPayment);
}
