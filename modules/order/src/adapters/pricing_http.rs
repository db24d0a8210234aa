use crate::adapters::rpc::ServiceClient;
use crate::error::OrderError;
use crate::ports::{CallContext, PricingService};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Deserialize)]
struct PriceResponse {
    price: f64,
}

/// HTTP adapter for price calculation.
///
/// Routes to the promotion service when the business-context channel carries
/// a promotion id, otherwise to the standard pricing service. The promotion
/// service reads the promotion id from its inbound headers, which the shared
/// client injects on every call.
pub struct HttpPricingService {
    client: ServiceClient,
    pricing_url: String,
    promotion_url: String,
}

impl HttpPricingService {
    pub fn new(
        client: ServiceClient,
        pricing_url: impl Into<String>,
        promotion_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            pricing_url: pricing_url.into(),
            promotion_url: promotion_url.into(),
        }
    }
}

#[async_trait]
impl PricingService for HttpPricingService {
    async fn calculate_price(
        &self,
        call: &CallContext,
        user_id: &str,
        is_vip: bool,
    ) -> Result<f64, OrderError> {
        let url = if call.business.promotion_id().is_some() {
            &self.promotion_url
        } else {
            &self.pricing_url
        };
        let is_vip = if is_vip { "true" } else { "false" };

        let body = self
            .client
            .post(call, url, &[("user_id", user_id), ("is_vip", is_vip)])
            .await
            .map_err(|e| OrderError::transport("pricing", e.to_string()))?;

        let parsed: PriceResponse = serde_json::from_str(&body)
            .map_err(|e| OrderError::Validation(format!("malformed pricing response: {}", e)))?;
        Ok(parsed.price)
    }
}
