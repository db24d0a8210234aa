//! Shared test doubles: stub leaf services with failure switches, wired into
//! a fully in-memory fabric.
#![allow(dead_code)]

use async_trait::async_trait;
use message_log::InMemoryLog;
use order_service::adapters::{InMemorySeckillGate, LogNotificationProducer, LogTimeoutScheduler};
use order_service::domain::{InMemoryOrderRepository, OrderCreationRequested};
use order_service::error::{BusinessReject, OrderError};
use order_service::ports::{
    CallContext, FraudService, InventoryService, PricingService, ShippingService,
};
use order_service::saga::Deps;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DELAY_TOPIC: &str = "delay_fast";
pub const TIMEOUT_TOPIC: &str = "order-timeout-check";
pub const NOTIFICATION_TOPIC: &str = "notifications";

#[derive(Default)]
pub struct StubFraud {
    pub refuse: AtomicBool,
}

#[async_trait]
impl FraudService for StubFraud {
    async fn check(
        &self,
        _call: &CallContext,
        user_id: &str,
        _items: &[String],
    ) -> Result<(), OrderError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(BusinessReject::FraudRefused {
                user_id: user_id.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct StubInventory {
    pub fail_items: Mutex<Vec<String>>,
    /// (item_id, order_id) in call order.
    pub reserved: Mutex<Vec<(String, String)>>,
    /// (item_id, order_id) in call order.
    pub released: Mutex<Vec<(String, String)>>,
}

impl StubInventory {
    pub fn fail_on(&self, item_id: &str) {
        self.fail_items.lock().unwrap().push(item_id.to_string());
    }

    pub fn released(&self) -> Vec<(String, String)> {
        self.released.lock().unwrap().clone()
    }

    pub fn reserved(&self) -> Vec<(String, String)> {
        self.reserved.lock().unwrap().clone()
    }
}

#[async_trait]
impl InventoryService for StubInventory {
    async fn reserve(
        &self,
        _call: &CallContext,
        item_id: &str,
        _quantity: u32,
        _user_id: &str,
        order_id: &str,
    ) -> Result<(), OrderError> {
        if self.fail_items.lock().unwrap().iter().any(|i| i == item_id) {
            return Err(OrderError::transport(
                "inventory-reserve",
                format!("reservation for {} returned 503", item_id),
            ));
        }
        self.reserved
            .lock()
            .unwrap()
            .push((item_id.to_string(), order_id.to_string()));
        Ok(())
    }

    async fn release(
        &self,
        _call: &CallContext,
        item_id: &str,
        order_id: &str,
    ) -> Result<(), OrderError> {
        self.released
            .lock()
            .unwrap()
            .push((item_id.to_string(), order_id.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct StubPricing {
    pub fail: AtomicBool,
    pub delay: Mutex<Option<Duration>>,
    /// Promotion id observed on the business channel, one entry per call.
    pub seen_promotions: Mutex<Vec<Option<String>>>,
}

#[async_trait]
impl PricingService for StubPricing {
    async fn calculate_price(
        &self,
        call: &CallContext,
        _user_id: &str,
        _is_vip: bool,
    ) -> Result<f64, OrderError> {
        self.seen_promotions
            .lock()
            .unwrap()
            .push(call.business.promotion_id().map(str::to_string));

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(OrderError::transport("pricing", "pricing returned 503"));
        }
        Ok(99.0)
    }
}

#[derive(Default)]
pub struct StubShipping {
    pub fail: AtomicBool,
}

#[async_trait]
impl ShippingService for StubShipping {
    async fn quote(&self, _call: &CallContext) -> Result<f64, OrderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(OrderError::transport("shipping", "shipping returned 503"));
        }
        Ok(4.5)
    }
}

/// The whole fabric on in-memory infrastructure.
pub struct TestFabric {
    pub log: Arc<InMemoryLog>,
    pub repo: Arc<InMemoryOrderRepository>,
    pub gate: Arc<InMemorySeckillGate>,
    pub fraud: Arc<StubFraud>,
    pub inventory: Arc<StubInventory>,
    pub pricing: Arc<StubPricing>,
    pub shipping: Arc<StubShipping>,
    pub deps: Arc<Deps>,
}

pub fn fabric() -> TestFabric {
    let log = Arc::new(InMemoryLog::new());
    let repo = Arc::new(InMemoryOrderRepository::new());
    let gate = Arc::new(InMemorySeckillGate::new());
    let fraud = Arc::new(StubFraud::default());
    let inventory = Arc::new(StubInventory::default());
    let pricing = Arc::new(StubPricing::default());
    let shipping = Arc::new(StubShipping::default());

    let deps = Arc::new(Deps {
        repo: repo.clone(),
        fraud: fraud.clone(),
        gate: gate.clone(),
        inventory: inventory.clone(),
        pricing: pricing.clone(),
        shipping: shipping.clone(),
        scheduler: Arc::new(LogTimeoutScheduler::new(
            log.clone(),
            DELAY_TOPIC,
            TIMEOUT_TOPIC,
        )),
        notifier: Arc::new(LogNotificationProducer::new(
            log.clone(),
            NOTIFICATION_TOPIC,
            Duration::from_secs(5),
        )),
    });

    TestFabric {
        log,
        repo,
        gate,
        fraud,
        inventory,
        pricing,
        shipping,
        deps,
    }
}

pub fn creation_event(event_id: &str, user_id: &str, items: &[&str]) -> OrderCreationRequested {
    OrderCreationRequested {
        trace_id: format!("trace-{}", event_id),
        user_id: user_id.to_string(),
        is_vip: false,
        items: items.iter().map(|i| i.to_string()).collect(),
        quantity: 1,
        promo_id: None,
        seckill_product_id: None,
        event_id: event_id.to_string(),
    }
}
