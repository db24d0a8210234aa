use crate::adapters::rpc::ServiceClient;
use crate::error::OrderError;
use crate::ports::{CallContext, ShippingService};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Deserialize)]
struct QuoteResponse {
    quote: f64,
}

/// HTTP adapter for the shipping quote service.
pub struct HttpShippingService {
    client: ServiceClient,
    url: String,
}

impl HttpShippingService {
    pub fn new(client: ServiceClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ShippingService for HttpShippingService {
    async fn quote(&self, call: &CallContext) -> Result<f64, OrderError> {
        let body = self
            .client
            .post(call, &self.url, &[])
            .await
            .map_err(|e| OrderError::transport("shipping", e.to_string()))?;

        let parsed: QuoteResponse = serde_json::from_str(&body)
            .map_err(|e| OrderError::Validation(format!("malformed shipping response: {}", e)))?;
        Ok(parsed.quote)
    }
}
