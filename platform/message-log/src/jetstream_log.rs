//! NATS JetStream implementation of the MessageLog trait.

use crate::{LogError, LogResult, MessageLog, Record};
use async_nats::jetstream::{self, consumer};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

/// Producer-supplied key, carried as a header since NATS subjects are not
/// partitioned the way a keyed log is.
const HEADER_MSG_KEY: &str = "msg-key";

/// Production MessageLog over NATS JetStream.
///
/// Every topic maps to one stream (topic name with `.` flattened to `_`) with
/// the topic as its only subject. Consumer groups map to durable pull
/// consumers with explicit ack; `commit` acks the underlying message.
///
/// An unacked message is redelivered after `ack_wait`, which is what gives
/// fetch its "first uncommitted record" semantics: a consumer that declines
/// to commit sees the record again, just not sooner than `ack_wait`. Pollers
/// that lean on re-fetching (the delay scheduler) should keep `ack_wait` in
/// the same order of magnitude as their tick.
pub struct JetStreamLog {
    context: jetstream::Context,
    ack_wait: Duration,
    // Topics whose stream is known to exist; insert-only.
    known_streams: Mutex<std::collections::HashSet<String>>,
    // (topic, group) -> durable pull consumer; insert-only.
    consumers: Mutex<HashMap<(String, String), consumer::Consumer<consumer::pull::Config>>>,
    // (topic, group, stream sequence) -> message awaiting ack
    pending: Mutex<HashMap<(String, String, u64), jetstream::Message>>,
}

impl JetStreamLog {
    /// Connect a JetStream-backed log from an existing NATS client.
    pub fn new(client: async_nats::Client) -> Self {
        Self::with_ack_wait(client, Duration::from_secs(5))
    }

    pub fn with_ack_wait(client: async_nats::Client, ack_wait: Duration) -> Self {
        Self {
            context: jetstream::new(client),
            ack_wait,
            known_streams: Mutex::new(std::collections::HashSet::new()),
            consumers: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn stream_name(topic: &str) -> String {
        topic.replace('.', "_")
    }

    async fn stream_for(&self, topic: &str) -> LogResult<jetstream::stream::Stream> {
        self.context
            .get_or_create_stream(jetstream::stream::Config {
                name: Self::stream_name(topic),
                subjects: vec![topic.to_string()],
                ..Default::default()
            })
            .await
            .map_err(|e| LogError::Transport(e.to_string()))
    }

    async fn consumer_for(
        &self,
        topic: &str,
        group: &str,
    ) -> LogResult<consumer::Consumer<consumer::pull::Config>> {
        let key = (topic.to_string(), group.to_string());
        if let Some(consumer) = self.consumers.lock().await.get(&key) {
            return Ok(consumer.clone());
        }

        let stream = self.stream_for(topic).await?;
        let consumer = stream
            .get_or_create_consumer(
                group,
                consumer::pull::Config {
                    durable_name: Some(group.to_string()),
                    ack_policy: consumer::AckPolicy::Explicit,
                    ack_wait: self.ack_wait,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| LogError::Transport(e.to_string()))?;

        self.consumers.lock().await.insert(key, consumer.clone());
        Ok(consumer)
    }
}

#[async_trait]
impl MessageLog for JetStreamLog {
    async fn produce(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: Vec<u8>,
        headers: HashMap<String, String>,
    ) -> LogResult<()> {
        // Ensure the stream exists so the publish is durably captured; one
        // round-trip per topic, then cached.
        if !self.known_streams.lock().await.contains(topic) {
            self.stream_for(topic).await?;
            self.known_streams.lock().await.insert(topic.to_string());
        }

        let mut nats_headers = async_nats::HeaderMap::new();
        for (name, value) in &headers {
            nats_headers.insert(name.as_str(), value.as_str());
        }
        if let Some(key) = key {
            nats_headers.insert(HEADER_MSG_KEY, key);
        }

        let ack = self
            .context
            .publish_with_headers(topic.to_string(), nats_headers, payload.into())
            .await
            .map_err(|e| LogError::Transport(e.to_string()))?;

        // Wait for the JetStream ack: produce returns only on durable accept.
        ack.await.map_err(|e| LogError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn fetch(&self, topic: &str, group: &str) -> LogResult<Record> {
        let consumer = self.consumer_for(topic, group).await?;

        loop {
            let mut batch = consumer
                .fetch()
                .max_messages(1)
                .expires(Duration::from_secs(1))
                .messages()
                .await
                .map_err(|e| LogError::Transport(e.to_string()))?;

            let Some(message) = batch.next().await else {
                continue;
            };
            let message = message.map_err(|e| LogError::Transport(e.to_string()))?;

            let info = message
                .info()
                .map_err(|e| LogError::Transport(e.to_string()))?;
            let offset = info.stream_sequence;
            let append_time = DateTime::<Utc>::from_timestamp(
                info.published.unix_timestamp(),
                info.published.nanosecond(),
            )
            .unwrap_or_else(Utc::now);

            let mut headers = HashMap::new();
            let mut key = None;
            if let Some(nats_headers) = message.headers.as_ref() {
                for (name, values) in nats_headers.iter() {
                    if let Some(value) = values.first() {
                        if AsRef::<str>::as_ref(name) == HEADER_MSG_KEY {
                            key = Some(value.to_string());
                        } else {
                            headers.insert(name.to_string(), value.to_string());
                        }
                    }
                }
            }

            let record = Record {
                topic: topic.to_string(),
                partition: 0,
                offset,
                key,
                payload: message.payload.to_vec(),
                headers,
                append_time,
            };

            self.pending
                .lock()
                .await
                .insert((topic.to_string(), group.to_string(), offset), message);

            return Ok(record);
        }
    }

    async fn commit(&self, group: &str, record: &Record) -> LogResult<()> {
        let message = self.pending.lock().await.remove(&(
            record.topic.clone(),
            group.to_string(),
            record.offset,
        ));

        // Absent means the record was already committed (or the message was
        // redelivered to another instance); that is the idempotent case.
        if let Some(message) = message {
            message
                .ack()
                .await
                .map_err(|e| LogError::Transport(e.to_string()))?;
        }
        Ok(())
    }
}
