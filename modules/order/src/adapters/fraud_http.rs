use crate::adapters::rpc::{RpcError, ServiceClient};
use crate::error::{BusinessReject, OrderError};
use crate::ports::{CallContext, FraudService};
use async_trait::async_trait;

/// HTTP adapter for the fraud detection service.
pub struct HttpFraudService {
    client: ServiceClient,
    url: String,
}

impl HttpFraudService {
    pub fn new(client: ServiceClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl FraudService for HttpFraudService {
    async fn check(
        &self,
        call: &CallContext,
        user_id: &str,
        items: &[String],
    ) -> Result<(), OrderError> {
        let items = items.join(",");
        match self
            .client
            .post(call, &self.url, &[("userId", user_id), ("items", &items)])
            .await
        {
            Ok(_) => Ok(()),
            // The service answered and said no: a refusal, not an outage.
            Err(e) if e.is_client_error() => Err(BusinessReject::FraudRefused {
                user_id: user_id.to_string(),
            }
            .into()),
            Err(RpcError::Http(msg)) => Err(OrderError::transport("fraud-check", msg)),
            Err(e) => Err(OrderError::transport("fraud-check", e.to_string())),
        }
    }
}
