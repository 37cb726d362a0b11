//! WorkerLoop - キューを消費するループ
//!
//! # フロー
//! 1. DeliveryQueue::receive() でメッセージを受け取る（shutdown と競合させる）
//! 2. TaskProcessor::process_payload() で処理 → Disposition
//! 3. Disposition に従って ack / nack
//!
//! キューのエラーではループを抜けず、`reconnect_backoff` 待ってから再開する。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::ports::{Delivery, DeliveryQueue, QueueError};

use super::processor::{Disposition, TaskProcessor};

/// キューのコンシューマー 1 本
#[derive(Clone)]
pub struct WorkerLoop {
    name: String,
    queue: Arc<dyn DeliveryQueue>,
    processor: Arc<TaskProcessor>,
    receive_timeout: Duration,
    reconnect_backoff: Duration,
}

impl WorkerLoop {
    pub fn new(
        name: impl Into<String>,
        queue: Arc<dyn DeliveryQueue>,
        processor: Arc<TaskProcessor>,
        receive_timeout: Duration,
        reconnect_backoff: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            processor,
            receive_timeout,
            reconnect_backoff,
        }
    }

    /// 1 件の配送を処理して ack / nack する
    pub async fn handle(&self, delivery: Box<dyn Delivery>) -> Disposition {
        let delivery_id = delivery.delivery_id();
        if delivery.redelivered() {
            tracing::debug!(worker = %self.name, %delivery_id, "redelivered message");
        }

        let disposition = self.processor.process_payload(delivery.payload()).await;

        // ここで初めて ack する（タスクの永続化が終わった後）
        let settled = match &disposition {
            Disposition::Ack(_) => delivery.ack().await,
            Disposition::Nack { requeue, .. } => delivery.nack(*requeue).await,
        };
        if let Err(e) = settled {
            tracing::warn!(worker = %self.name, %delivery_id, error = %e, "ack/nack failed");
        }
        disposition
    }

    /// 最大 1 件受信して処理する。タイムアウト時は `Ok(None)`
    pub async fn run_once(&self) -> Result<Option<Disposition>, QueueError> {
        match self.queue.receive(self.receive_timeout).await? {
            Some(delivery) => Ok(Some(self.handle(delivery).await)),
            None => Ok(None),
        }
    }

    /// `shutdown` が true になるまで回す
    ///
    /// shutdown は新規受信を止めるだけで、受信済みのメッセージは
    /// 処理と ack / nack まで終えてから抜ける
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(worker = %self.name, "worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            // sender dropped: the group is gone, stop as if asked to
            let received = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                received = self.queue.receive(self.receive_timeout) => received,
            };

            match received {
                Ok(Some(delivery)) => {
                    self.handle(delivery).await;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        worker = %self.name,
                        error = %e,
                        backoff_ms = self.reconnect_backoff.as_millis() as u64,
                        "queue error, backing off"
                    );
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                        _ = tokio::time::sleep(self.reconnect_backoff) => {}
                    }
                }
            }
        }
        tracing::info!(worker = %self.name, "worker stopped");
    }
}

/// ワーカーグループのハンドル
/// - `request_shutdown()` で全ワーカーが新しいメッセージの受信をやめる
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// WorkerLoop ごとに 1 タスクを spawn
    pub fn spawn(loops: Vec<WorkerLoop>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let joins = loops
            .into_iter()
            .map(|worker| {
                let rx = shutdown_rx.clone();
                tokio::spawn(async move { worker.run(rx).await })
            })
            .collect();
        Self { shutdown_tx, joins }
    }

    /// `{worker_id}-{i}` という名前で `count` 本起動（タイムアウトは config から）
    pub fn start(
        count: usize,
        queue: Arc<dyn DeliveryQueue>,
        processor: Arc<TaskProcessor>,
        config: &AppConfig,
    ) -> Self {
        let loops = (0..count)
            .map(|i| {
                WorkerLoop::new(
                    format!("{}-{i}", config.worker_id),
                    queue.clone(),
                    processor.clone(),
                    config.receive_timeout(),
                    config.reconnect_backoff(),
                )
            })
            .collect();
        Self::spawn(loops)
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                tracing::error!(error = %e, "worker task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ledger::WalletLedger;
    use crate::app::processor::Verdict;
    use crate::domain::{ModelId, NewModel, NewTask, ScoringMessage, TaskId, TaskStatus, UserId};
    use crate::impls::{InMemoryDeliveryQueue, InMemoryStore};
    use crate::ports::{LedgerStore, ModelCatalog, TaskStore};
    use crate::scoring::{ModelResolver, PredictorRegistry, StubPredictor};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use ulid::Ulid;

    async fn processor(store: &Arc<InMemoryStore>) -> (Arc<TaskProcessor>, ModelId) {
        let model = store
            .insert_model(NewModel::new("bioage", 25, &["age", "bmi"]))
            .await
            .unwrap();
        let mut registry = PredictorRegistry::new();
        registry.register("bioage", Arc::new(StubPredictor)).unwrap();
        let processor = TaskProcessor::new(
            store.clone(),
            WalletLedger::new(store.clone()),
            ModelResolver::new(store.clone(), Arc::new(registry)),
            "w",
        );
        (Arc::new(processor), model.id)
    }

    async fn validated_message(store: &InMemoryStore, model_id: ModelId) -> ScoringMessage {
        let answers: crate::domain::Answers =
            serde_json::from_value(json!({"age": 40, "bmi": 25})).unwrap();
        let mut task = store
            .create_task(NewTask {
                external_id: TaskId::from_ulid(Ulid::new()),
                owner: UserId(1),
                model_id,
                answers: answers.clone(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        task.record_validation(true, vec![]).unwrap();
        store.update_task(&task, TaskStatus::Created).await.unwrap();
        ScoringMessage {
            task_id: task.external_id,
            features: answers,
            model: "bioage".into(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn run_once_acks_after_processing() {
        let store = Arc::new(InMemoryStore::new());
        store.open_wallet(UserId(1), 50).await.unwrap();
        let (processor, model_id) = processor(&store).await;
        let queue = Arc::new(InMemoryDeliveryQueue::new("q", Duration::from_secs(30)));
        let message = validated_message(&store, model_id).await;
        queue.publish(message.encode().unwrap()).await.unwrap();

        let worker = WorkerLoop::new(
            "w-0",
            queue.clone(),
            processor,
            Duration::from_millis(100),
            Duration::from_millis(10),
        );
        let disposition = worker.run_once().await.unwrap();
        assert_eq!(
            disposition,
            Some(Disposition::Ack(Verdict::Completed { charged: 25 }))
        );
        assert_eq!(queue.depth().await.unwrap(), Default::default());

        assert_eq!(worker.run_once().await.unwrap(), None);
    }

    #[tokio::test]
    async fn poison_message_is_dead_lettered() {
        let store = Arc::new(InMemoryStore::new());
        let (processor, _) = processor(&store).await;
        let queue = Arc::new(InMemoryDeliveryQueue::new("q", Duration::from_secs(30)));
        queue.publish(b"not a message".to_vec()).await.unwrap();

        let worker = WorkerLoop::new(
            "w-0",
            queue.clone(),
            processor,
            Duration::from_millis(100),
            Duration::from_millis(10),
        );
        worker.run_once().await.unwrap();
        assert_eq!(queue.dead_letters().await, vec![b"not a message".to_vec()]);
    }

    #[tokio::test]
    async fn group_drains_queue_and_shuts_down() {
        let store = Arc::new(InMemoryStore::new());
        store.open_wallet(UserId(1), 1_000).await.unwrap();
        let (processor, model_id) = processor(&store).await;
        let queue = Arc::new(InMemoryDeliveryQueue::new("q", Duration::from_secs(30)));
        for _ in 0..6 {
            let message = validated_message(&store, model_id).await;
            queue.publish(message.encode().unwrap()).await.unwrap();
        }

        let config = AppConfig {
            worker_id: "w".into(),
            receive_timeout_ms: 20,
            reconnect_backoff_ms: 10,
            ..AppConfig::default()
        };
        let group = WorkerGroup::start(3, queue.clone(), processor, &config);
        assert_eq!(group.len(), 3);

        for _ in 0..100 {
            if store.counts_by_status().await.unwrap().done == 6 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        group.shutdown_and_join().await;

        assert_eq!(store.counts_by_status().await.unwrap().done, 6);
        assert_eq!(store.wallet(UserId(1)).await.unwrap().unwrap().balance(), 1_000 - 6 * 25);
    }

    /// 最初の receive だけ失敗し、その後は空のキューとして振る舞う
    struct FlakyQueue {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DeliveryQueue for FlakyQueue {
        async fn publish(&self, _: Vec<u8>) -> Result<(), QueueError> {
            Ok(())
        }

        async fn receive(&self, timeout: Duration) -> Result<Option<Box<dyn Delivery>>, QueueError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(QueueError::Unavailable("broker restarting".into()));
            }
            tokio::time::sleep(timeout).await;
            Ok(None)
        }

        async fn depth(&self) -> Result<crate::ports::QueueDepth, QueueError> {
            Ok(Default::default())
        }
    }

    #[tokio::test]
    async fn queue_errors_back_off_instead_of_exiting() {
        let store = Arc::new(InMemoryStore::new());
        let (processor, _) = processor(&store).await;
        let queue = Arc::new(FlakyQueue {
            calls: AtomicUsize::new(0),
        });

        let group = WorkerGroup::spawn(vec![WorkerLoop::new(
            "w-0",
            queue.clone(),
            processor,
            Duration::from_millis(10),
            Duration::from_millis(10),
        )]);
        tokio::time::sleep(Duration::from_millis(100)).await;
        group.shutdown_and_join().await;

        assert!(queue.calls.load(Ordering::SeqCst) >= 2);
    }
}
