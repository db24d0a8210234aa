//! Per-level polling loop.
//!
//! One poller per delay level. Every tick the poller checks the head of its
//! intake topic and keeps draining for as long as the head is due:
//!
//! 1. Fetch the head record (uncommitted).
//! 2. Compute the due time: `append_time + duration` for a fixed-delay level,
//!    or the record's `delay-timestamp` header for an absolute-time level.
//! 3. Not yet due: release the head without committing and wait for the next
//!    tick. Later records are never inspected: the log is append-ordered, so
//!    an unready head implies an unready tail.
//! 4. Due but unroutable (missing `real-topic`, a malformed timestamp on an
//!    absolute level, or a `delay-timestamp` header smuggled onto a
//!    fixed-delay level): commit and skip.
//! 5. Due: re-emit the body to the real topic with the original trace
//!    context. Only a successful re-emission is committed; a failed produce
//!    leaves the head in place for the next tick.
//!
//! Commit-after-re-emission means duplicates are possible; real-topic
//! consumers must be idempotent in their business effect.

use chrono::{DateTime, Utc};
use message_log::headers::{TraceContext, HEADER_DELAY_TIMESTAMP, HEADER_REAL_TOPIC};
use message_log::{LogError, MessageLog, Record};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How a level turns a record into a due time. One mode per level; the mode
/// is fixed at configuration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelMode {
    /// Due `duration` after the log accepted the record.
    FixedDelay(Duration),
    /// Due at the RFC3339 instant in the record's `delay-timestamp` header.
    AbsoluteTimestamp,
}

/// A named delay bucket backed by one intake topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayLevel {
    /// Level name, doubling as the intake topic (e.g. `delay_5s`).
    pub name: String,
    pub mode: LevelMode,
}

impl DelayLevel {
    pub fn fixed(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            mode: LevelMode::FixedDelay(duration),
        }
    }

    pub fn absolute(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: LevelMode::AbsoluteTimestamp,
        }
    }
}

/// Poller for a single delay level.
pub struct LevelPoller {
    log: Arc<dyn MessageLog>,
    level: DelayLevel,
    group: String,
    tick: Duration,
}

enum Drained {
    /// Head not due, intake empty, or transient trouble: wait for next tick.
    Idle,
    /// The log shut down underneath us.
    Cancelled,
}

impl LevelPoller {
    pub fn new(log: Arc<dyn MessageLog>, level: DelayLevel, tick: Duration) -> Self {
        let group = format!("delay-scheduler-{}", level.name);
        Self {
            log,
            level,
            group,
            tick,
        }
    }

    /// Spawn the long-lived poller task.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            level = %self.level.name,
            tick_ms = self.tick.as_millis() as u64,
            "delay poller started"
        );

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if let Drained::Cancelled = self.drain_due().await {
                        break;
                    }
                }
            }
        }

        tracing::info!(level = %self.level.name, "delay poller stopped");
    }

    /// Drain every due record at the head of the intake, in order.
    async fn drain_due(&self) -> Drained {
        loop {
            // A short bounded wait doubles as the empty-intake check.
            let fetched =
                tokio::time::timeout(self.tick, self.log.fetch(&self.level.name, &self.group))
                    .await;
            let record = match fetched {
                Err(_) => return Drained::Idle,
                Ok(Err(LogError::Cancelled)) => return Drained::Cancelled,
                Ok(Err(e)) => {
                    tracing::error!(level = %self.level.name, error = %e, "intake fetch failed");
                    return Drained::Idle;
                }
                Ok(Ok(record)) => record,
            };

            let due_at = match self.due_time(&record) {
                Ok(due_at) => due_at,
                Err(reason) => {
                    // Unroutable; committing keeps it from wedging the level.
                    tracing::error!(
                        level = %self.level.name,
                        offset = record.offset,
                        reason = %reason,
                        "dropping unroutable delay record"
                    );
                    if !self.commit_or_break(&record).await {
                        return Drained::Idle;
                    }
                    continue;
                }
            };

            if Utc::now() < due_at {
                // Head-of-line blocking is the FIFO invariant, not a defect.
                return Drained::Idle;
            }

            let Some(real_topic) = record.header(HEADER_REAL_TOPIC).map(str::to_string) else {
                tracing::error!(
                    level = %self.level.name,
                    offset = record.offset,
                    "delay record has no real-topic header, dropping"
                );
                if !self.commit_or_break(&record).await {
                    return Drained::Idle;
                }
                continue;
            };

            let trace = TraceContext::extract_or_root(&record.headers);
            let mut headers = HashMap::new();
            trace.inject(&mut headers);

            if let Err(e) = self
                .log
                .produce(
                    &real_topic,
                    record.key.as_deref(),
                    record.payload.clone(),
                    headers,
                )
                .await
            {
                // Not committed: the same head is retried next tick.
                tracing::error!(
                    level = %self.level.name,
                    real_topic = %real_topic,
                    offset = record.offset,
                    error = %e,
                    "failed to re-emit due record"
                );
                return Drained::Idle;
            }

            if !self.commit_or_break(&record).await {
                return Drained::Idle;
            }

            tracing::info!(
                level = %self.level.name,
                real_topic = %real_topic,
                offset = record.offset,
                trace_id = %trace.trace_id,
                "due record re-emitted"
            );
        }
    }

    fn due_time(&self, record: &Record) -> Result<DateTime<Utc>, String> {
        match &self.level.mode {
            LevelMode::FixedDelay(duration) => {
                // A level is one mode forever; an absolute timestamp on a
                // fixed-delay level is a producer bug, not a schedule.
                if record.header(HEADER_DELAY_TIMESTAMP).is_some() {
                    return Err(
                        "delay-timestamp header on a fixed-delay level".to_string()
                    );
                }
                Ok(record.append_time
                    + chrono::Duration::from_std(*duration)
                        .map_err(|e| format!("level duration out of range: {}", e))?)
            }
            LevelMode::AbsoluteTimestamp => {
                let raw = record
                    .header(HEADER_DELAY_TIMESTAMP)
                    .ok_or_else(|| "missing delay-timestamp header on absolute-time level".to_string())?;
                DateTime::parse_from_rfc3339(raw)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| format!("malformed delay-timestamp {:?}: {}", raw, e))
            }
        }
    }

    /// Returns false when the commit failed; the caller backs off so the
    /// record is not re-emitted again within the same drain.
    async fn commit_or_break(&self, record: &Record) -> bool {
        if let Err(e) = self.log.commit(&self.group, record).await {
            tracing::error!(
                level = %self.level.name,
                offset = record.offset,
                error = %e,
                "failed to commit delay record"
            );
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_level_due_time_comes_from_append_time() {
        let poller = LevelPoller::new(
            Arc::new(message_log::InMemoryLog::new()),
            DelayLevel::fixed("delay_5s", Duration::from_secs(5)),
            Duration::from_millis(10),
        );
        let appended = Utc::now();
        let record = Record {
            topic: "delay_5s".to_string(),
            partition: 0,
            offset: 0,
            key: None,
            payload: Vec::new(),
            headers: HashMap::new(),
            append_time: appended,
        };

        let due = poller.due_time(&record).unwrap();
        assert_eq!(due, appended + chrono::Duration::seconds(5));
    }

    #[test]
    fn fixed_level_rejects_absolute_timestamp_records() {
        let poller = LevelPoller::new(
            Arc::new(message_log::InMemoryLog::new()),
            DelayLevel::fixed("delay_5s", Duration::from_secs(5)),
            Duration::from_millis(10),
        );
        let mut record = Record {
            topic: "delay_5s".to_string(),
            partition: 0,
            offset: 0,
            key: None,
            payload: Vec::new(),
            headers: HashMap::new(),
            append_time: Utc::now(),
        };
        record.headers.insert(
            HEADER_DELAY_TIMESTAMP.to_string(),
            Utc::now().to_rfc3339(),
        );

        assert!(poller.due_time(&record).is_err());
    }

    #[test]
    fn absolute_level_requires_parseable_timestamp() {
        let poller = LevelPoller::new(
            Arc::new(message_log::InMemoryLog::new()),
            DelayLevel::absolute("delay_at"),
            Duration::from_millis(10),
        );
        let mut record = Record {
            topic: "delay_at".to_string(),
            partition: 0,
            offset: 0,
            key: None,
            payload: Vec::new(),
            headers: HashMap::new(),
            append_time: Utc::now(),
        };

        assert!(poller.due_time(&record).is_err());

        record.headers.insert(
            HEADER_DELAY_TIMESTAMP.to_string(),
            "not-a-timestamp".to_string(),
        );
        assert!(poller.due_time(&record).is_err());

        let instant = "2026-08-02T10:00:00Z";
        record
            .headers
            .insert(HEADER_DELAY_TIMESTAMP.to_string(), instant.to_string());
        let due = poller.due_time(&record).unwrap();
        assert_eq!(due, DateTime::parse_from_rfc3339(instant).unwrap());
    }
}
