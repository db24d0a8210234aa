//! # MessageLog Abstraction
//!
//! A platform-level abstraction over an append-only, partitioned message log
//! with consumer-group cursors.
//!
//! ## Why This Lives in Tier 1
//!
//! Every service in the fabric (the order orchestrator, the delay scheduler,
//! the timeout reaper) moves state through the log. Placing the carrier in
//! `platform/` allows:
//! - Modules to depend on platform crates without circular dependencies
//! - Config-driven swap between JetStream (production) and InMemory (dev/test)
//! - One place for trace-context and business-context header plumbing
//!
//! ## Semantics
//!
//! - `produce` appends one record and returns only on durable ack.
//! - `fetch` returns the first record past the group's committed cursor; it
//!   does not advance anything. Fetching again without committing yields the
//!   same record, which is what lets the delay scheduler release an unready
//!   head and retry it on the next tick.
//! - `commit` advances the group cursor monotonically past the record. It is
//!   idempotent; delivery downstream is therefore at-least-once and every
//!   consumer must be idempotent in its business effect.
//!
//! ## Implementations
//!
//! - **JetStreamLog**: production implementation over NATS JetStream streams
//!   and durable pull consumers (ack = commit)
//! - **InMemoryLog**: dev/test implementation using tokio primitives

pub mod harness;
pub mod headers;
mod inmemory_log;
mod jetstream_log;

pub use inmemory_log::InMemoryLog;
pub use jetstream_log::JetStreamLog;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// One record as observed by a consumer.
#[derive(Debug, Clone)]
pub struct Record {
    /// Topic the record was appended to
    pub topic: String,
    /// Partition within the topic
    pub partition: u32,
    /// Offset within the partition (monotonic per partition)
    pub offset: u64,
    /// Partitioning key, when the producer supplied one
    pub key: Option<String>,
    /// Opaque payload bytes
    pub payload: Vec<u8>,
    /// String headers; trace context and routing metadata ride here
    pub headers: HashMap<String, String>,
    /// Time the log accepted the record, stamped server-side on append
    pub append_time: DateTime<Utc>,
}

impl Record {
    /// Look up a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Failure classification for log operations.
///
/// `Transport` failures are retryable; `Cancelled` surfaces when a blocked
/// fetch is interrupted by shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Cancelled,
}

/// Errors surfaced by the log carrier.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("log transport failure: {0}")]
    Transport(String),

    #[error("fetch cancelled by shutdown")]
    Cancelled,
}

impl LogError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LogError::Transport(_) => ErrorKind::Transport,
            LogError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Result type for log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Core carrier abstraction over a partitioned, append-only message log.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Append one record. Returns after the log has durably accepted it;
    /// failures are surfaced to the caller, never silently retried.
    async fn produce(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: Vec<u8>,
        headers: HashMap<String, String>,
    ) -> LogResult<()>;

    /// Return the next uncommitted record for `group` on `topic`, blocking
    /// until one is available or the log shuts down (`LogError::Cancelled`).
    ///
    /// Within a partition, records are observed in append order. Across
    /// partitions there is no ordering guarantee; key your producers so all
    /// records for one entity land on one partition.
    async fn fetch(&self, topic: &str, group: &str) -> LogResult<Record>;

    /// Advance the group cursor past `record`. Idempotent and monotonic; a
    /// failed commit leaves the record uncommitted and it will be fetched
    /// again.
    async fn commit(&self, group: &str, record: &Record) -> LogResult<()>;
}

impl fmt::Debug for dyn MessageLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageLog")
    }
}
