//! # Header plumbing
//!
//! Two header channels ride every record:
//!
//! - **Trace context**: the `trace-id` / `span-id` pair. Every producer site
//!   injects it and every consumer site extracts it, so one order shares one
//!   trace lineage across the log, the scheduler and every RPC hop.
//! - **Business context**: `ctx-`-prefixed headers carrying domain values
//!   (today: a promotion id) across service boundaries without payload
//!   parsing. Deliberately distinct from trace context: dropping one channel
//!   must never drop the other.
//!
//! Routing metadata (`real-topic`, `delay-timestamp`, retry/DLT bookkeeping)
//! also lives here so topic plumbing agrees on the names.

use std::collections::HashMap;
use uuid::Uuid;

/// Destination topic for a delayed message, read by the scheduler once due.
pub const HEADER_REAL_TOPIC: &str = "real-topic";
/// RFC3339 instant for absolute-time delay levels.
pub const HEADER_DELAY_TIMESTAMP: &str = "delay-timestamp";
/// Zero-based retry attempt count stamped by the consumer harness.
pub const HEADER_RETRY_ATTEMPT: &str = "retry-attempt";

pub const HEADER_ORIGINAL_TOPIC: &str = "original-topic";
pub const HEADER_ORIGINAL_PARTITION: &str = "original-partition";
pub const HEADER_ORIGINAL_OFFSET: &str = "original-offset";
pub const HEADER_EXCEPTION_FQCN: &str = "exception-fqcn";
pub const HEADER_EXCEPTION_MESSAGE: &str = "exception-message";

const HEADER_TRACE_ID: &str = "trace-id";
const HEADER_SPAN_ID: &str = "span-id";

const BUSINESS_PREFIX: &str = "ctx-";
/// Promotion id in the business channel.
pub const CTX_PROMOTION_ID: &str = "ctx-promotion-id";

/// Trace lineage carried as a dedicated header pair.
///
/// Not a full W3C traceparent. The fabric only needs to stitch hops into one
/// lineage, so a (trace, span) pair is carried verbatim and a fresh span id is
/// minted per hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
}

impl TraceContext {
    /// Start a new root trace.
    pub fn new_root() -> Self {
        Self {
            trace_id: Uuid::new_v4().simple().to_string(),
            span_id: Uuid::new_v4().simple().to_string(),
        }
    }

    /// Derive a child hop: same trace, fresh span.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: Uuid::new_v4().simple().to_string(),
        }
    }

    /// Derive a context for compensation work: preserves the trace lineage
    /// but is detached from whatever deadline governed the originating saga.
    /// Deadlines live on the caller's timer, not in this value, so detaching
    /// is the same as starting a child hop; the helper exists so call sites
    /// say what they mean.
    pub fn detached(&self) -> Self {
        self.child()
    }

    /// Write the header pair into `headers`.
    pub fn inject(&self, headers: &mut HashMap<String, String>) {
        headers.insert(HEADER_TRACE_ID.to_string(), self.trace_id.clone());
        headers.insert(HEADER_SPAN_ID.to_string(), self.span_id.clone());
    }

    /// Read the header pair back, if present.
    pub fn extract(headers: &HashMap<String, String>) -> Option<Self> {
        let trace_id = headers.get(HEADER_TRACE_ID)?.clone();
        let span_id = headers.get(HEADER_SPAN_ID)?.clone();
        Some(Self { trace_id, span_id })
    }

    /// Extract, or mint a fresh root when the producer did not participate.
    pub fn extract_or_root(headers: &HashMap<String, String>) -> Self {
        Self::extract(headers).unwrap_or_else(Self::new_root)
    }
}

/// Header-carried key/value map for domain values, distinct from trace
/// context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusinessContext {
    values: HashMap<String, String>,
}

impl BusinessContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Set a value under its full `ctx-`-prefixed header name.
    pub fn set(&mut self, header_name: &str, value: impl Into<String>) {
        debug_assert!(header_name.starts_with(BUSINESS_PREFIX));
        self.values.insert(header_name.to_string(), value.into());
    }

    pub fn get(&self, header_name: &str) -> Option<&str> {
        self.values.get(header_name).map(String::as_str)
    }

    pub fn promotion_id(&self) -> Option<&str> {
        self.get(CTX_PROMOTION_ID)
    }

    pub fn set_promotion_id(&mut self, promotion_id: impl Into<String>) {
        self.set(CTX_PROMOTION_ID, promotion_id);
    }

    /// Copy every business value into `headers`.
    pub fn inject(&self, headers: &mut HashMap<String, String>) {
        for (k, v) in &self.values {
            headers.insert(k.clone(), v.clone());
        }
    }

    /// Collect every `ctx-`-prefixed header.
    pub fn extract(headers: &HashMap<String, String>) -> Self {
        let values = headers
            .iter()
            .filter(|(k, _)| k.starts_with(BUSINESS_PREFIX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_round_trip() {
        let ctx = TraceContext::new_root();
        let mut headers = HashMap::new();
        ctx.inject(&mut headers);

        let extracted = TraceContext::extract(&headers).unwrap();
        assert_eq!(extracted, ctx);
    }

    #[test]
    fn child_preserves_trace_id() {
        let root = TraceContext::new_root();
        let child = root.child();
        assert_eq!(child.trace_id, root.trace_id);
        assert_ne!(child.span_id, root.span_id);
    }

    #[test]
    fn detached_preserves_lineage() {
        let root = TraceContext::new_root();
        assert_eq!(root.detached().trace_id, root.trace_id);
    }

    #[test]
    fn extract_or_root_mints_when_absent() {
        let headers = HashMap::new();
        let ctx = TraceContext::extract_or_root(&headers);
        assert!(!ctx.trace_id.is_empty());
    }

    #[test]
    fn business_context_round_trip() {
        let mut biz = BusinessContext::new();
        biz.set_promotion_id("promo-42");

        let mut headers = HashMap::new();
        headers.insert("unrelated".to_string(), "x".to_string());
        biz.inject(&mut headers);

        let extracted = BusinessContext::extract(&headers);
        assert_eq!(extracted.promotion_id(), Some("promo-42"));
        assert!(extracted.get("unrelated").is_none());
    }

    #[test]
    fn business_context_is_distinct_from_trace() {
        let ctx = TraceContext::new_root();
        let mut headers = HashMap::new();
        ctx.inject(&mut headers);

        assert!(BusinessContext::extract(&headers).is_empty());
    }
}
