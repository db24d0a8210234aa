//! Shared HTTP client for leaf-service RPCs.
//!
//! The leaf contract is POST with query parameters; any 2xx is success.
//! Trace context and business context are injected as request headers on
//! every call, so downstream services join the trace and read domain values
//! without parsing bodies.

use crate::ports::CallContext;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("http error: {0}")]
    Http(String),

    #[error("service returned status {status_code}: {body}")]
    Status { status_code: u16, body: String },
}

impl RpcError {
    /// 4xx: the service understood the request and said no.
    pub fn is_client_error(&self) -> bool {
        matches!(self, RpcError::Status { status_code, .. } if (400..500).contains(status_code))
    }
}

/// Thin reqwest wrapper shared by every leaf adapter.
#[derive(Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
}

impl ServiceClient {
    pub fn new(timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Http(e.to_string()))?;
        Ok(Self { http })
    }

    /// POST `url` with `params` as query parameters. Returns the response
    /// body on 2xx.
    pub async fn post(
        &self,
        call: &CallContext,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<String, RpcError> {
        let mut propagated = HashMap::new();
        call.trace.child().inject(&mut propagated);
        call.business.inject(&mut propagated);

        let mut request = self.http.post(url).query(params);
        for (name, value) in &propagated {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_success() {
            Ok(body)
        } else {
            Err(RpcError::Status {
                status_code: status.as_u16(),
                body,
            })
        }
    }
}
