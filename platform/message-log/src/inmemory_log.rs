//! In-memory implementation of the MessageLog trait for testing and
//! development.

use crate::{LogError, LogResult, MessageLog, Record};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

/// MessageLog implementation backed by process memory.
///
/// Suitable for unit tests, integration tests and local development without a
/// broker. Topics are created on first use. Each topic has a fixed partition
/// count (default 1, so every topic is fully FIFO unless a test opts into
/// keyed partitioning with [`InMemoryLog::with_partitions`]).
///
/// Commit state is per (topic, group, partition), exactly like the production
/// log: fetch always returns the first record past the committed cursor, so
/// an uncommitted record is re-fetched. At-least-once, by construction.
#[derive(Clone)]
pub struct InMemoryLog {
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
    round_robin: Arc<AtomicU64>,
    partitions: u32,
}

struct State {
    // topic -> partition -> records
    topics: HashMap<String, Vec<Vec<StoredRecord>>>,
    // (topic, group, partition) -> next offset to deliver
    cursors: HashMap<(String, String, u32), u64>,
    closed: bool,
}

struct StoredRecord {
    key: Option<String>,
    payload: Vec<u8>,
    headers: HashMap<String, String>,
    append_time: chrono::DateTime<Utc>,
}

impl InMemoryLog {
    /// Create a log where every topic has a single partition.
    pub fn new() -> Self {
        Self::with_partitions(1)
    }

    /// Create a log where every topic has `partitions` partitions. Records
    /// with the same key always land on the same partition; unkeyed records
    /// are spread round-robin.
    pub fn with_partitions(partitions: u32) -> Self {
        assert!(partitions >= 1, "a topic needs at least one partition");
        Self {
            state: Arc::new(Mutex::new(State {
                topics: HashMap::new(),
                cursors: HashMap::new(),
                closed: false,
            })),
            notify: Arc::new(Notify::new()),
            round_robin: Arc::new(AtomicU64::new(0)),
            partitions,
        }
    }

    /// Shut the log down: every blocked and future fetch returns
    /// `LogError::Cancelled`.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.notify.notify_waiters();
    }

    /// Number of records appended to `topic` across all partitions.
    /// Test observability helper.
    pub async fn len(&self, topic: &str) -> usize {
        let state = self.state.lock().await;
        state
            .topics
            .get(topic)
            .map(|parts| parts.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    fn partition_for(&self, key: Option<&str>) -> u32 {
        match key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % self.partitions as u64) as u32
            }
            None => (self.round_robin.fetch_add(1, Ordering::Relaxed) % self.partitions as u64) as u32,
        }
    }
}

impl Default for InMemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageLog for InMemoryLog {
    async fn produce(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: Vec<u8>,
        headers: HashMap<String, String>,
    ) -> LogResult<()> {
        let partition = self.partition_for(key);
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(LogError::Transport("log is closed".to_string()));
            }
            let partitions = self.partitions as usize;
            let parts = state
                .topics
                .entry(topic.to_string())
                .or_insert_with(|| (0..partitions).map(|_| Vec::new()).collect());
            parts[partition as usize].push(StoredRecord {
                key: key.map(str::to_string),
                payload,
                headers,
                append_time: Utc::now(),
            });
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn fetch(&self, topic: &str, group: &str) -> LogResult<Record> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.state.lock().await;
                if state.closed {
                    return Err(LogError::Cancelled);
                }
                if let Some(parts) = state.topics.get(topic) {
                    for (partition, records) in parts.iter().enumerate() {
                        let partition = partition as u32;
                        let cursor = state
                            .cursors
                            .get(&(topic.to_string(), group.to_string(), partition))
                            .copied()
                            .unwrap_or(0);
                        if let Some(stored) = records.get(cursor as usize) {
                            return Ok(Record {
                                topic: topic.to_string(),
                                partition,
                                offset: cursor,
                                key: stored.key.clone(),
                                payload: stored.payload.clone(),
                                headers: stored.headers.clone(),
                                append_time: stored.append_time,
                            });
                        }
                    }
                }
            }

            notified.await;
        }
    }

    async fn commit(&self, group: &str, record: &Record) -> LogResult<()> {
        let mut state = self.state.lock().await;
        let cursor = state
            .cursors
            .entry((record.topic.clone(), group.to_string(), record.partition))
            .or_insert(0);
        // Monotonic: a replayed commit never moves the cursor backwards.
        *cursor = (*cursor).max(record.offset + 1);
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }
}
