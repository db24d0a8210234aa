//! Redis-backed seckill gate.
//!
//! The admission check runs as one server-side Lua script, which is what
//! makes it atomic against concurrent attempts: membership test, stock load,
//! decrement and buyer record happen in a single round-trip with no
//! client-side locking. Log consumption upstream is at-least-once, so the
//! duplicate verdict is load-bearing for correctness, not just UX.

use crate::error::OrderError;
use crate::ports::{SeckillGate, SeckillVerdict};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;

const ATTEMPT_SCRIPT: &str = r#"
-- KEYS[1]: stock counter, e.g. seckill:stock:{product}
-- KEYS[2]: buyer set,     e.g. seckill:users:{product}
-- ARGV[1]: user id attempting the purchase

if redis.call('sismember', KEYS[2], ARGV[1]) == 1 then
    return 2
end

local stock = tonumber(redis.call('get', KEYS[1]))

if stock and stock > 0 then
    redis.call('decr', KEYS[1])
    redis.call('sadd', KEYS[2], ARGV[1])
    return 1
else
    return 0
end
"#;

const CANCEL_SCRIPT: &str = r#"
-- Compensation: restock only if this user actually holds a grant, so a
-- replayed cancel is a no-op.
if redis.call('srem', KEYS[2], ARGV[1]) == 1 then
    redis.call('incr', KEYS[1])
    return 1
end
return 0
"#;

pub struct RedisSeckillGate {
    conn: ConnectionManager,
    attempt_script: Script,
    cancel_script: Script,
}

impl RedisSeckillGate {
    pub async fn connect(url: &str) -> Result<Self, OrderError> {
        let client = redis::Client::open(url)
            .map_err(|e| OrderError::transport("seckill-store", e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| OrderError::transport("seckill-store", e.to_string()))?;
        Ok(Self {
            conn,
            attempt_script: Script::new(ATTEMPT_SCRIPT),
            cancel_script: Script::new(CANCEL_SCRIPT),
        })
    }

    // Hash tags keep both keys of one product in the same cluster slot.
    fn stock_key(product_id: &str) -> String {
        format!("seckill:stock:{{{}}}", product_id)
    }

    fn users_key(product_id: &str) -> String {
        format!("seckill:users:{{{}}}", product_id)
    }
}

#[async_trait]
impl SeckillGate for RedisSeckillGate {
    async fn attempt(&self, product_id: &str, user_id: &str) -> Result<SeckillVerdict, OrderError> {
        let mut conn = self.conn.clone();
        let code: i64 = self
            .attempt_script
            .key(Self::stock_key(product_id))
            .key(Self::users_key(product_id))
            .arg(user_id)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| OrderError::transport("seckill-attempt", e.to_string()))?;

        match code {
            1 => Ok(SeckillVerdict::Granted),
            0 => Ok(SeckillVerdict::SoldOut),
            2 => Ok(SeckillVerdict::Duplicate),
            other => Err(OrderError::Validation(format!(
                "unknown verdict code {} from seckill script",
                other
            ))),
        }
    }

    async fn cancel(&self, product_id: &str, user_id: &str) -> Result<(), OrderError> {
        let mut conn = self.conn.clone();
        let _: i64 = self
            .cancel_script
            .key(Self::stock_key(product_id))
            .key(Self::users_key(product_id))
            .arg(user_id)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| OrderError::transport("seckill-cancel", e.to_string()))?;
        Ok(())
    }

    async fn prepare(&self, product_id: &str, stock: i64) -> Result<(), OrderError> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .set(Self::stock_key(product_id), stock)
            .ignore()
            .del(Self::users_key(product_id))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| OrderError::transport("seckill-prepare", e.to_string()))
    }
}
