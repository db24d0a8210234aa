use crate::adapters::rpc::ServiceClient;
use crate::error::{BusinessReject, OrderError};
use crate::ports::{CallContext, InventoryService};
use async_trait::async_trait;

/// HTTP adapter for the inventory service.
pub struct HttpInventoryService {
    client: ServiceClient,
    reserve_url: String,
    release_url: String,
}

impl HttpInventoryService {
    pub fn new(
        client: ServiceClient,
        reserve_url: impl Into<String>,
        release_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            reserve_url: reserve_url.into(),
            release_url: release_url.into(),
        }
    }
}

#[async_trait]
impl InventoryService for HttpInventoryService {
    async fn reserve(
        &self,
        call: &CallContext,
        item_id: &str,
        quantity: u32,
        user_id: &str,
        order_id: &str,
    ) -> Result<(), OrderError> {
        let quantity = quantity.to_string();
        match self
            .client
            .post(
                call,
                &self.reserve_url,
                &[
                    ("itemId", item_id),
                    ("quantity", &quantity),
                    ("userId", user_id),
                    ("orderId", order_id),
                ],
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_client_error() => Err(BusinessReject::InventoryInsufficient {
                item_id: item_id.to_string(),
            }
            .into()),
            Err(e) => Err(OrderError::transport("inventory-reserve", e.to_string())),
        }
    }

    async fn release(
        &self,
        call: &CallContext,
        item_id: &str,
        order_id: &str,
    ) -> Result<(), OrderError> {
        // Release is idempotent on the service side; every failure here is
        // worth retrying, so it all maps to transport.
        self.client
            .post(
                call,
                &self.release_url,
                &[("itemId", item_id), ("orderId", order_id)],
            )
            .await
            .map(|_| ())
            .map_err(|e| OrderError::transport("inventory-release", e.to_string()))
    }
}
