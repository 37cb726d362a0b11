//! InMemoryDeliveryQueue - 開発用の配送キュー
//!
//! # 実装詳細
//! - ready: 配送待ち（FIFO）
//! - in_flight: 受け取られたが ack/nack されていない配送（期限付き）
//! - dead: `nack(requeue = false)` されたメッセージ
//! - `tokio::sync::Mutex` + `Notify` で待機中の receive を起こす
//!
//! visibility timeout を過ぎた in-flight 配送は ready に戻され、
//! 新しい DeliveryId で再配送される（at-least-once）。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::DeliveryId;
use crate::ports::{
    Delivery, DeliveryQueue, IdGenerator, QueueDepth, QueueError, SystemClock, UlidGenerator,
};

#[derive(Debug, Clone)]
struct Message {
    payload: Arc<[u8]>,
    redelivered: bool,
}

#[derive(Debug)]
struct InFlight {
    payload: Arc<[u8]>,
    deadline: Instant,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Message>,
    in_flight: HashMap<DeliveryId, InFlight>,
    dead: Vec<Arc<[u8]>>,
}

impl QueueState {
    /// Move expired in-flight deliveries back to ready.
    fn reclaim_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<DeliveryId> = self
            .in_flight
            .iter()
            .filter(|(_, f)| f.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            if let Some(flight) = self.in_flight.remove(id) {
                self.ready.push_back(Message {
                    payload: flight.payload,
                    redelivered: true,
                });
            }
        }
        expired.len()
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.in_flight.values().map(|f| f.deadline).min()
    }
}

pub struct InMemoryDeliveryQueue {
    name: String,
    visibility_timeout: Duration,
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
    ids: Arc<dyn IdGenerator>,
}

impl InMemoryDeliveryQueue {
    pub fn new(name: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            visibility_timeout,
            state: Arc::new(Mutex::new(QueueState::default())),
            notify: Arc::new(Notify::new()),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Payloads that were nacked without requeue.
    pub async fn dead_letters(&self) -> Vec<Vec<u8>> {
        let state = self.state.lock().await;
        state.dead.iter().map(|p| p.to_vec()).collect()
    }
}

#[async_trait]
impl DeliveryQueue for InMemoryDeliveryQueue {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock().await;
            state.ready.push_back(Message {
                payload: payload.into(),
                redelivered: false,
            });
        }
        self.notify.notify_one();
        tracing::trace!(queue = %self.name, "published");
        Ok(())
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<Box<dyn Delivery>>, QueueError> {
        let give_up_at = Instant::now() + timeout;
        loop {
            let next_wake = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let reclaimed = state.reclaim_expired(now);
                if reclaimed > 0 {
                    tracing::debug!(queue = %self.name, reclaimed, "visibility timeout expired");
                }

                if let Some(message) = state.ready.pop_front() {
                    let id = self.ids.generate_delivery_id();
                    state.in_flight.insert(
                        id,
                        InFlight {
                            payload: Arc::clone(&message.payload),
                            deadline: now + self.visibility_timeout,
                        },
                    );
                    return Ok(Some(Box::new(InMemoryDelivery {
                        id,
                        payload: message.payload,
                        redelivered: message.redelivered,
                        state: Arc::clone(&self.state),
                        notify: Arc::clone(&self.notify),
                    })));
                }

                if now >= give_up_at {
                    return Ok(None);
                }
                state
                    .next_deadline()
                    .map_or(give_up_at, |deadline| deadline.min(give_up_at))
            };

            // publish / nack(requeue) か、次の期限まで待つ
            tokio::select! {
                _ = self.notify.notified() => {},
                _ = tokio::time::sleep_until(next_wake) => {},
            }
        }
    }

    async fn depth(&self) -> Result<QueueDepth, QueueError> {
        let state = self.state.lock().await;
        Ok(QueueDepth {
            ready: state.ready.len(),
            in_flight: state.in_flight.len(),
            dead: state.dead.len(),
        })
    }
}

struct InMemoryDelivery {
    id: DeliveryId,
    payload: Arc<[u8]>,
    redelivered: bool,
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
}

#[async_trait]
impl Delivery for InMemoryDelivery {
    fn delivery_id(&self) -> DeliveryId {
        self.id
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn redelivered(&self) -> bool {
        self.redelivered
    }

    async fn ack(self: Box<Self>) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        state
            .in_flight
            .remove(&self.id)
            .map(|_| ())
            .ok_or(QueueError::UnknownDelivery(self.id))
    }

    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock().await;
            let flight = state
                .in_flight
                .remove(&self.id)
                .ok_or(QueueError::UnknownDelivery(self.id))?;
            if requeue {
                state.ready.push_back(Message {
                    payload: flight.payload,
                    redelivered: true,
                });
            } else {
                state.dead.push(flight.payload);
            }
        }
        if requeue {
            self.notify.notify_one();
        }
        Ok(())
    }
}
