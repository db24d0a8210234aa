//! Resilient consumer harness.
//!
//! Wraps any record handler with retry-topic routing and a dead-letter
//! terminal. On handler failure the harness classifies the error:
//!
//! - **Retryable** failures are republished to the next topic in the retry
//!   ladder (`<base>.retry.5s`, `<base>.retry.30s`, ...). A retry consumer
//!   per ladder level sleeps out the remaining delay before re-invoking the
//!   same handler, and escalates to the next level on repeated failure.
//! - **Fatal** failures (malformed payload, invariant violation, exhausted
//!   ladder) go to `<base>.DLT` with headers capturing the original
//!   topic/partition/offset and the failure class and message.
//! - **Reject** failures are business outcomes, not defects: no retry, no
//!   dead letter.
//!
//! The source record is committed in every routed case so the partition
//! progresses; only a failed routing publish leaves the record uncommitted
//! for redelivery.

use crate::headers::{
    HEADER_EXCEPTION_FQCN, HEADER_EXCEPTION_MESSAGE, HEADER_ORIGINAL_OFFSET,
    HEADER_ORIGINAL_PARTITION, HEADER_ORIGINAL_TOPIC, HEADER_RETRY_ATTEMPT,
};
use crate::{LogError, MessageLog, Record};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handler failure taxonomy, as the harness sees it.
#[derive(Debug)]
pub enum HandlerError {
    /// Transient: broker/store/RPC transport trouble. Rides the retry ladder.
    Retryable { class: String, message: String },
    /// Permanent: malformed payload, invariant violation. Straight to DLT.
    Fatal { class: String, message: String },
    /// Business outcome (sold out, duplicate, refused). Committed and done.
    Reject { message: String },
}

impl HandlerError {
    pub fn retryable(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Retryable {
            class: class.into(),
            message: message.into(),
        }
    }

    pub fn fatal(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fatal {
            class: class.into(),
            message: message.into(),
        }
    }

    pub fn reject(message: impl Into<String>) -> Self {
        Self::Reject {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retryable { class, message } => write!(f, "retryable [{}]: {}", class, message),
            Self::Fatal { class, message } => write!(f, "fatal [{}]: {}", class, message),
            Self::Reject { message } => write!(f, "rejected: {}", message),
        }
    }
}

/// A consumer body invoked once per fetched record.
#[async_trait]
pub trait RecordHandler: Send + Sync {
    fn name(&self) -> &str;
    async fn handle(&self, record: &Record) -> Result<(), HandlerError>;
}

/// Ordered retry delays for one base topic.
#[derive(Debug, Clone)]
pub struct RetryLadder {
    base: String,
    delays: Vec<Duration>,
}

impl RetryLadder {
    pub fn new(base: impl Into<String>, delays: Vec<Duration>) -> Self {
        Self {
            base: base.into(),
            delays,
        }
    }

    /// Ladder from whole-second delays, e.g. `[5, 30, 300]`.
    pub fn from_secs(base: impl Into<String>, seconds: &[u64]) -> Self {
        Self::new(base, seconds.iter().map(|s| Duration::from_secs(*s)).collect())
    }

    pub fn base_topic(&self) -> &str {
        &self.base
    }

    pub fn levels(&self) -> usize {
        self.delays.len()
    }

    pub fn delay(&self, level: usize) -> Duration {
        self.delays[level]
    }

    pub fn retry_topic(&self, level: usize) -> String {
        format!("{}.retry.{}s", self.base, self.delays[level].as_secs())
    }

    pub fn dlt_topic(&self) -> String {
        format!("{}.DLT", self.base)
    }
}

/// Wires one handler to a base topic, its retry ladder and its dead-letter
/// terminal.
pub struct ConsumerHarness {
    log: Arc<dyn MessageLog>,
    ladder: RetryLadder,
    group: String,
    handler: Arc<dyn RecordHandler>,
}

impl ConsumerHarness {
    pub fn new(
        log: Arc<dyn MessageLog>,
        ladder: RetryLadder,
        group: impl Into<String>,
        handler: Arc<dyn RecordHandler>,
    ) -> Self {
        Self {
            log,
            ladder,
            group: group.into(),
            handler,
        }
    }

    /// Spawn the base consumer, one retry consumer per ladder level and the
    /// dead-letter logger. Returns the task handles; tasks exit when
    /// `shutdown` flips to `true` or the log shuts down.
    pub fn spawn_all(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let Self {
            log,
            ladder,
            group,
            handler,
        } = self;

        let mut handles = Vec::new();

        handles.push(spawn_consumer_loop(
            log.clone(),
            ladder.clone(),
            ladder.base_topic().to_string(),
            group.clone(),
            handler.clone(),
            None,
            shutdown.clone(),
        ));

        for level in 0..ladder.levels() {
            handles.push(spawn_consumer_loop(
                log.clone(),
                ladder.clone(),
                ladder.retry_topic(level),
                format!("{}-retry-{}", group, level),
                handler.clone(),
                Some(level),
                shutdown.clone(),
            ));
        }

        handles.push(spawn_dlt_logger(log, ladder, format!("{}-dlt", group), shutdown));

        handles
    }
}

fn spawn_consumer_loop(
    log: Arc<dyn MessageLog>,
    ladder: RetryLadder,
    topic: String,
    group: String,
    handler: Arc<dyn RecordHandler>,
    retry_level: Option<usize>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(topic = %topic, group = %group, handler = %handler.name(), "consumer started");

        loop {
            let record = tokio::select! {
                _ = shutdown.changed() => break,
                fetched = log.fetch(&topic, &group) => match fetched {
                    Ok(record) => record,
                    Err(LogError::Cancelled) => break,
                    Err(e) => {
                        tracing::error!(topic = %topic, error = %e, "fetch failed, backing off");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                },
            };

            // A retry consumer holds the record until its level's delay has
            // fully elapsed since the record entered the retry topic.
            if let Some(level) = retry_level {
                let due = record.append_time + ladder.delay(level);
                let remaining = (due - chrono::Utc::now()).to_std().unwrap_or(Duration::ZERO);
                if !remaining.is_zero() {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(remaining) => {}
                    }
                }
            }

            // One short-lived task per in-flight record; a panicking handler
            // must not take the consumer loop down with it.
            let task = {
                let log = log.clone();
                let ladder = ladder.clone();
                let group = group.clone();
                let handler = handler.clone();
                let record = record.clone();
                tokio::spawn(async move {
                    process_record(&*log, &ladder, &group, &*handler, &record, retry_level).await
                })
            };

            match task.await {
                Ok(()) => {}
                Err(join_err) => {
                    tracing::error!(topic = %topic, error = %join_err, "handler task panicked");
                    let outcome = HandlerError::fatal("panic", join_err.to_string());
                    route_failure(&*log, &ladder, &group, &record, retry_level, &outcome).await;
                }
            }
        }

        tracing::info!(topic = %topic, group = %group, "consumer stopped");
    })
}

async fn process_record(
    log: &dyn MessageLog,
    ladder: &RetryLadder,
    group: &str,
    handler: &dyn RecordHandler,
    record: &Record,
    retry_level: Option<usize>,
) {
    match handler.handle(record).await {
        Ok(()) => {
            commit(log, group, record).await;
        }
        Err(HandlerError::Reject { message }) => {
            tracing::info!(
                topic = %record.topic,
                offset = record.offset,
                reason = %message,
                "record rejected by business rule"
            );
            commit(log, group, record).await;
        }
        Err(outcome) => {
            route_failure(log, ladder, group, record, retry_level, &outcome).await;
        }
    }
}

/// Publish the failed record to the next retry level or the DLT, then commit
/// the source. A failed routing publish skips the commit so the record is
/// redelivered.
async fn route_failure(
    log: &dyn MessageLog,
    ladder: &RetryLadder,
    group: &str,
    record: &Record,
    retry_level: Option<usize>,
    outcome: &HandlerError,
) {
    let next_level = match retry_level {
        None => 0,
        Some(level) => level + 1,
    };

    let routed = match outcome {
        HandlerError::Retryable { class, message } if next_level < ladder.levels() => {
            let mut headers = record.headers.clone();
            ensure_origin(&mut headers, record);
            headers.insert(HEADER_RETRY_ATTEMPT.to_string(), next_level.to_string());
            let target = ladder.retry_topic(next_level);
            tracing::warn!(
                topic = %record.topic,
                offset = record.offset,
                target = %target,
                class = %class,
                error = %message,
                "routing record to retry topic"
            );
            log.produce(&target, record.key.as_deref(), record.payload.clone(), headers)
                .await
        }
        HandlerError::Retryable { class, message } | HandlerError::Fatal { class, message } => {
            let mut headers = record.headers.clone();
            ensure_origin(&mut headers, record);
            headers.insert(HEADER_EXCEPTION_FQCN.to_string(), class.clone());
            headers.insert(HEADER_EXCEPTION_MESSAGE.to_string(), message.clone());
            let target = ladder.dlt_topic();
            tracing::error!(
                topic = %record.topic,
                offset = record.offset,
                target = %target,
                class = %class,
                error = %message,
                "routing record to dead-letter topic"
            );
            log.produce(&target, record.key.as_deref(), record.payload.clone(), headers)
                .await
        }
        HandlerError::Reject { .. } => unreachable!("rejects are committed, never routed"),
    };

    match routed {
        Ok(()) => commit(log, group, record).await,
        Err(e) => {
            tracing::error!(
                topic = %record.topic,
                offset = record.offset,
                error = %e,
                "failed to route failed record, leaving uncommitted for redelivery"
            );
        }
    }
}

fn ensure_origin(headers: &mut HashMap<String, String>, record: &Record) {
    headers
        .entry(HEADER_ORIGINAL_TOPIC.to_string())
        .or_insert_with(|| record.topic.clone());
    headers
        .entry(HEADER_ORIGINAL_PARTITION.to_string())
        .or_insert_with(|| record.partition.to_string());
    headers
        .entry(HEADER_ORIGINAL_OFFSET.to_string())
        .or_insert_with(|| record.offset.to_string());
}

async fn commit(log: &dyn MessageLog, group: &str, record: &Record) {
    // Commit failure is tolerated: the record is redelivered and consumers
    // are idempotent.
    if let Err(e) = log.commit(group, record).await {
        tracing::error!(
            topic = %record.topic,
            offset = record.offset,
            error = %e,
            "failed to commit record"
        );
    }
}

/// Dead-letter consumer: structured logging only, no remediation.
fn spawn_dlt_logger(
    log: Arc<dyn MessageLog>,
    ladder: RetryLadder,
    group: String,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let topic = ladder.dlt_topic();
        loop {
            let record = tokio::select! {
                _ = shutdown.changed() => break,
                fetched = log.fetch(&topic, &group) => match fetched {
                    Ok(record) => record,
                    Err(LogError::Cancelled) => break,
                    Err(e) => {
                        tracing::error!(topic = %topic, error = %e, "fetch failed, backing off");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                },
            };

            tracing::error!(
                dlt = %topic,
                original_topic = record.header(HEADER_ORIGINAL_TOPIC).unwrap_or("unknown"),
                original_partition = record.header(HEADER_ORIGINAL_PARTITION).unwrap_or("?"),
                original_offset = record.header(HEADER_ORIGINAL_OFFSET).unwrap_or("?"),
                exception_class = record.header(HEADER_EXCEPTION_FQCN).unwrap_or("unknown"),
                exception_message = record.header(HEADER_EXCEPTION_MESSAGE).unwrap_or(""),
                "dead-lettered record"
            );
            commit(&*log, &group, &record).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryLog;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedHandler {
        // Failures to emit before succeeding; None means always this error.
        script: Vec<Option<HandlerError>>,
        calls: AtomicUsize,
    }

    impl ScriptedHandler {
        fn always_ok() -> Self {
            Self {
                script: Vec::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn scripted(script: Vec<Option<HandlerError>>) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RecordHandler for ScriptedHandler {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn handle(&self, _record: &Record) -> Result<(), HandlerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.get(call) {
                Some(Some(HandlerError::Retryable { class, message })) => {
                    Err(HandlerError::retryable(class.clone(), message.clone()))
                }
                Some(Some(HandlerError::Fatal { class, message })) => {
                    Err(HandlerError::fatal(class.clone(), message.clone()))
                }
                Some(Some(HandlerError::Reject { message })) => {
                    Err(HandlerError::reject(message.clone()))
                }
                _ => Ok(()),
            }
        }
    }

    fn ladder() -> RetryLadder {
        RetryLadder::from_secs("orders", &[5, 30])
    }

    #[test]
    fn ladder_topic_names() {
        let ladder = RetryLadder::from_secs("order-creation", &[5, 30, 300]);
        assert_eq!(ladder.retry_topic(0), "order-creation.retry.5s");
        assert_eq!(ladder.retry_topic(2), "order-creation.retry.300s");
        assert_eq!(ladder.dlt_topic(), "order-creation.DLT");
    }

    async fn produce_one(log: &InMemoryLog, topic: &str) {
        log.produce(topic, Some("k"), b"payload".to_vec(), HashMap::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn successful_record_is_committed_without_routing() {
        let log = InMemoryLog::new();
        produce_one(&log, "orders").await;

        let handler = Arc::new(ScriptedHandler::always_ok());
        let record = log.fetch("orders", "g").await.unwrap();
        process_record(&log, &ladder(), "g", &*handler, &record, None).await;

        assert_eq!(handler.calls(), 1);
        assert_eq!(log.len("orders.retry.5s").await, 0);
        assert_eq!(log.len("orders.DLT").await, 0);
    }

    #[tokio::test]
    async fn retryable_failure_routes_to_first_retry_topic() {
        let log = InMemoryLog::new();
        produce_one(&log, "orders").await;

        let handler = Arc::new(ScriptedHandler::scripted(vec![Some(
            HandlerError::retryable("TransportError", "broker down"),
        )]));
        let record = log.fetch("orders", "g").await.unwrap();
        process_record(&log, &ladder(), "g", &*handler, &record, None).await;

        let retried = log.fetch("orders.retry.5s", "inspect").await.unwrap();
        assert_eq!(retried.payload, b"payload");
        assert_eq!(retried.header(HEADER_RETRY_ATTEMPT), Some("0"));
        assert_eq!(retried.header(HEADER_ORIGINAL_TOPIC), Some("orders"));
        assert_eq!(retried.header(HEADER_ORIGINAL_OFFSET), Some("0"));
    }

    #[tokio::test]
    async fn fatal_failure_routes_to_dlt_with_exception_headers() {
        let log = InMemoryLog::new();
        produce_one(&log, "orders").await;

        let handler = Arc::new(ScriptedHandler::scripted(vec![Some(HandlerError::fatal(
            "ValidationError",
            "bad payload",
        ))]));
        let record = log.fetch("orders", "g").await.unwrap();
        process_record(&log, &ladder(), "g", &*handler, &record, None).await;

        let dead = log.fetch("orders.DLT", "inspect").await.unwrap();
        assert_eq!(dead.header(HEADER_ORIGINAL_TOPIC), Some("orders"));
        assert_eq!(dead.header(HEADER_ORIGINAL_PARTITION), Some("0"));
        assert_eq!(dead.header(HEADER_EXCEPTION_FQCN), Some("ValidationError"));
        assert_eq!(dead.header(HEADER_EXCEPTION_MESSAGE), Some("bad payload"));
        assert_eq!(log.len("orders.retry.5s").await, 0);
    }

    #[tokio::test]
    async fn reject_is_committed_without_retry_or_dlt() {
        let log = InMemoryLog::new();
        produce_one(&log, "orders").await;

        let handler = Arc::new(ScriptedHandler::scripted(vec![Some(
            HandlerError::reject("sold out"),
        )]));
        let record = log.fetch("orders", "g").await.unwrap();
        process_record(&log, &ladder(), "g", &*handler, &record, None).await;

        assert_eq!(log.len("orders.retry.5s").await, 0);
        assert_eq!(log.len("orders.DLT").await, 0);

        // Cursor advanced: nothing left to fetch for this group.
        produce_one(&log, "orders").await;
        let next = log.fetch("orders", "g").await.unwrap();
        assert_eq!(next.offset, 1);
    }

    #[tokio::test]
    async fn exhausted_ladder_escalates_to_dlt() {
        let log = InMemoryLog::new();
        produce_one(&log, "orders.retry.30s").await;

        let handler = Arc::new(ScriptedHandler::scripted(vec![Some(
            HandlerError::retryable("TransportError", "still down"),
        )]));
        let record = log.fetch("orders.retry.30s", "g").await.unwrap();
        // Failure at the last ladder level (index 1) has nowhere left to go.
        process_record(&log, &ladder(), "g", &*handler, &record, Some(1)).await;

        assert_eq!(log.len("orders.DLT").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_consumer_waits_out_delay_then_reinvokes_handler() {
        let log = Arc::new(InMemoryLog::new());
        let ladder = ladder();
        let handler = Arc::new(ScriptedHandler::always_ok());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        log.produce(
            &ladder.retry_topic(0),
            None,
            b"payload".to_vec(),
            HashMap::new(),
        )
        .await
        .unwrap();

        let handle = spawn_consumer_loop(
            log.clone(),
            ladder.clone(),
            ladder.retry_topic(0),
            "g-retry-0".to_string(),
            handler.clone(),
            Some(0),
            shutdown_rx,
        );

        // The paused clock auto-advances through the 5s hold.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(handler.calls(), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn end_to_end_retry_then_success() {
        let log = Arc::new(InMemoryLog::new());
        let ladder = RetryLadder::new("orders", vec![Duration::ZERO]);
        let handler = Arc::new(ScriptedHandler::scripted(vec![Some(
            HandlerError::retryable("TransportError", "first attempt fails"),
        )]));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        produce_one(&log, "orders").await;

        let harness = ConsumerHarness::new(log.clone(), ladder, "g", handler.clone());
        let handles = harness.spawn_all(shutdown_rx);

        tokio::time::timeout(Duration::from_secs(2), async {
            while handler.calls() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("retry consumer should re-invoke the handler");

        assert_eq!(log.len("orders.DLT").await, 0);

        shutdown_tx.send(true).unwrap();
        for handle in handles {
            let _ = handle.await;
        }
    }
}
