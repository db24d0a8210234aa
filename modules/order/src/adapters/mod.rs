pub mod fraud_http;
pub mod inventory_http;
pub mod notifier_log;
pub mod pricing_http;
pub mod repository_pg;
pub mod rpc;
pub mod scheduler_log;
pub mod seckill_memory;
pub mod seckill_redis;
pub mod shipping_http;

pub use fraud_http::HttpFraudService;
pub use inventory_http::HttpInventoryService;
pub use notifier_log::LogNotificationProducer;
pub use pricing_http::HttpPricingService;
pub use repository_pg::PgOrderRepository;
pub use rpc::ServiceClient;
pub use scheduler_log::LogTimeoutScheduler;
pub use seckill_memory::InMemorySeckillGate;
pub use seckill_redis::RedisSeckillGate;
pub use shipping_http::HttpShippingService;
