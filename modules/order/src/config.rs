use std::env;
use std::time::Duration;

/// Order service configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bus_type: String,
    pub nats_url: String,
    pub repository: String,
    pub database_url: Option<String>,
    pub seckill_store: String,
    pub redis_url: String,

    pub fraud_url: String,
    pub inventory_reserve_url: String,
    pub inventory_release_url: String,
    pub pricing_url: String,
    pub promotion_url: String,
    pub shipping_url: String,
    pub rpc_timeout: Duration,

    /// Deadline for one whole saga run.
    pub processing_deadline: Duration,
    /// How long an order may sit unpaid. Must match the duration of the
    /// delay level named by `delay_topic`.
    pub payment_timeout: Duration,
    pub delay_topic: String,

    pub order_topic: String,
    pub timeout_topic: String,
    pub notification_topic: String,
    pub consumer_group: String,

    /// Retry ladder delays in seconds, e.g. `5,30,300`.
    pub retry_ladder: Vec<u64>,
    pub vip_promotions_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let port: u16 = env_or("PORT", "8091")
            .parse()
            .map_err(|_| "PORT must be a valid u16".to_string())?;

        let repository = env_or("ORDER_REPOSITORY", "inmemory");
        let database_url = env::var("DATABASE_URL").ok();
        if repository == "postgres" && database_url.is_none() {
            return Err("DATABASE_URL must be set when ORDER_REPOSITORY=postgres".to_string());
        }

        let retry_ladder = parse_ladder(&env_or("RETRY_LADDER", "5,30,300"))?;

        Ok(Config {
            port,
            bus_type: env_or("BUS_TYPE", "inmemory"),
            nats_url: env_or("NATS_URL", "nats://localhost:4222"),
            repository,
            database_url,
            seckill_store: env_or("SECKILL_STORE", "inmemory"),
            redis_url: env_or("REDIS_URL", "redis://localhost:6379"),

            fraud_url: env_or("FRAUD_SERVICE_URL", "http://localhost:8083/check_fraud"),
            inventory_reserve_url: env_or(
                "INVENTORY_RESERVE_URL",
                "http://localhost:8085/reserve_stock",
            ),
            inventory_release_url: env_or(
                "INVENTORY_RELEASE_URL",
                "http://localhost:8085/release_stock",
            ),
            pricing_url: env_or("PRICING_SERVICE_URL", "http://localhost:8084/calculate_price"),
            promotion_url: env_or(
                "PROMOTION_SERVICE_URL",
                "http://localhost:8087/get_promo_price",
            ),
            shipping_url: env_or("SHIPPING_SERVICE_URL", "http://localhost:8086/get_quote"),
            rpc_timeout: secs_env("RPC_TIMEOUT_SECS", 5)?,

            processing_deadline: secs_env("PROCESSING_DEADLINE_SECS", 10)?,
            payment_timeout: secs_env("PAYMENT_TIMEOUT_SECS", 5)?,
            delay_topic: env_or("PAYMENT_TIMEOUT_DELAY_TOPIC", "delay_5s"),

            order_topic: env_or("ORDER_TOPIC", "order-creation"),
            timeout_topic: env_or("TIMEOUT_TOPIC", "order-timeout-check"),
            notification_topic: env_or("NOTIFICATION_TOPIC", "notifications"),
            consumer_group: env_or("CONSUMER_GROUP", "order-service"),

            retry_ladder,
            vip_promotions_enabled: env_or("VIP_PROMOTIONS_ENABLED", "true")
                .parse()
                .map_err(|_| "VIP_PROMOTIONS_ENABLED must be true or false".to_string())?,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn secs_env(name: &str, default: u64) -> Result<Duration, String> {
    let raw = env_or(name, &default.to_string());
    let secs: u64 = raw
        .parse()
        .map_err(|_| format!("{} must be an integer number of seconds", name))?;
    Ok(Duration::from_secs(secs))
}

fn parse_ladder(spec: &str) -> Result<Vec<u64>, String> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .map_err(|_| format!("invalid retry ladder entry {:?}", s))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ladder() {
        assert_eq!(parse_ladder("5,30,300").unwrap(), vec![5, 30, 300]);
        assert_eq!(parse_ladder(" 5 , 30 ").unwrap(), vec![5, 30]);
        assert!(parse_ladder("5,x").is_err());
    }
}
