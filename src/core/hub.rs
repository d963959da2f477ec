// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/moisture-sim

//! Broadcast hub - fans reading batches out to live subscribers
//!
//! Every subscriber owns a bounded queue. Publishing never waits: a
//! subscriber whose queue is full or whose receiver is gone is dropped.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use chrono::{DateTime, Utc};
use futures::Stream;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::devices::Reading;

/// One reading per live device, the unit of delivery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingBatch {
    /// Tick that produced the batch, 0 for a subscribe snapshot
    pub sequence: u64,
    readings: Vec<Reading>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ReadingBatch {
    pub fn new(sequence: u64, readings: Vec<Reading>) -> Self {
        let index = readings
            .iter()
            .enumerate()
            .map(|(i, r)| (r.device_id.clone(), i))
            .collect();
        Self { sequence, readings, index }
    }

    /// Readings in device creation order
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn get(&self, device_id: &str) -> Option<&Reading> {
        self.index.get(device_id).map(|&i| &self.readings[i])
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.get(device_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Wire envelope sent to stream clients
    pub fn to_message(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "readings_batch",
            "data": self.readings,
        })
    }
}

/// Receiving end of a hub subscription
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Arc<ReadingBatch>>,
    /// Snapshot reading times, cleared by the first tick batch
    snapshot_seen: Option<HashMap<String, DateTime<Utc>>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next batch, `None` once the hub has dropped this subscriber
    pub async fn recv(&mut self) -> Option<Arc<ReadingBatch>> {
        let batch = self.rx.recv().await?;
        Some(self.skip_seen(batch))
    }

    pub fn try_recv(&mut self) -> Option<Arc<ReadingBatch>> {
        let batch = self.rx.try_recv().ok()?;
        Some(self.skip_seen(batch))
    }

    /// A tick committed before the snapshot but published after it would
    /// repeat readings the snapshot already carried.
    fn skip_seen(&mut self, batch: Arc<ReadingBatch>) -> Arc<ReadingBatch> {
        if batch.sequence == 0 {
            return batch;
        }
        let seen = match self.snapshot_seen.take() {
            Some(seen) => seen,
            None => return batch,
        };

        let is_new = |r: &Reading| seen.get(&r.device_id).map_or(true, |ts| r.timestamp > *ts);
        if batch.readings.iter().all(is_new) {
            return batch;
        }
        let fresh = batch.readings.iter().filter(|&r| is_new(r)).cloned().collect();
        Arc::new(ReadingBatch::new(batch.sequence, fresh))
    }
}

impl Stream for Subscription {
    type Item = Arc<ReadingBatch>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(batch)) => Poll::Ready(Some(this.skip_seen(batch))),
            other => other,
        }
    }
}

/// Registry of connected subscribers
pub struct BroadcastHub {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<Arc<ReadingBatch>>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl BroadcastHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Register a subscriber whose first batch is `snapshot()`.
    ///
    /// The snapshot is taken while the registry is locked, so no published
    /// batch can reach the subscriber ahead of it or fall between the two.
    pub fn subscribe_with<F>(&self, snapshot: F) -> Subscription
    where
        F: FnOnce() -> ReadingBatch,
    {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.subscribers.lock();
        let initial = snapshot();
        let snapshot_seen = initial
            .readings
            .iter()
            .map(|r| (r.device_id.clone(), r.timestamp))
            .collect();
        let _ = tx.try_send(Arc::new(initial));
        subscribers.insert(id, tx);

        debug!("Subscriber {} connected ({} total)", id, subscribers.len());
        Subscription {
            id,
            rx,
            snapshot_seen: Some(snapshot_seen),
        }
    }

    /// Deliver a batch to every subscriber without waiting, returns how many got it
    pub fn publish(&self, batch: ReadingBatch) -> usize {
        let batch = Arc::new(batch);
        let mut subscribers = self.subscribers.lock();

        subscribers.retain(|id, tx| match tx.try_send(batch.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Dropping subscriber {}: not keeping up", id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Subscriber {} disconnected", id);
                false
            }
        });

        subscribers.len()
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        self.subscribers.lock().remove(&id).is_some()
    }

    /// Connected subscribers, pruning any that went away
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|_, tx| !tx.is_closed());
        subscribers.len()
    }
}
