use std::sync::Arc;

use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use lapin::Channel;
use metrics::counter;
use thiserror::Error;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::messaging::envelope::Envelope;
use crate::messaging::handler::HandlerFn;
use crate::messaging::rabbitmq::error::RabbitMqError;
use crate::messaging::rabbitmq::subscriber::{RabbitMqSubscriber, Subscription};
use crate::messaging::rabbitmq::wire;

/// 路由器狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    /// 已組裝，尚未啟動
    Idle,
    /// 消費循環運行中
    Running,
    /// 已收到取消信號，等待在途消息完成
    Draining,
    /// 所有消費循環已退出
    Stopped,
}

/// 路由器錯誤
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Router already started")]
    AlreadyStarted,

    #[error("Failed to subscribe handler {handler}: {source}")]
    Subscribe {
        handler: String,
        #[source]
        source: RabbitMqError,
    },
}

/// 訂閱者與處理器的綁定
pub(crate) struct Binding {
    pub(crate) handler_name: String,
    pub(crate) topic: String,
    pub(crate) subscriber: Arc<RabbitMqSubscriber>,
    pub(crate) handle_fn: HandlerFn,
}

/// 分派結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchOutcome {
    /// 處理成功，消息確認
    Handled,
    /// 處理失敗，消息交還 broker 重新投遞
    Failed,
}

/// 處理路由器
///
/// 從所有訂閱泵送消息至註冊的處理器。每條綁定有獨立的消費循環，
/// 單條消息的失敗由恢復中間件隔離，不影響其他佇列與處理器。
/// 佇列之間不保證順序，單一佇列內遵循 broker 的投遞順序。
pub struct Router {
    bindings: Vec<Binding>,
    state: Arc<RwLock<RouterState>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Router {
    pub(crate) fn new() -> Self {
        Self {
            bindings: Vec::new(),
            state: Arc::new(RwLock::new(RouterState::Idle)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add_binding(&mut self, binding: Binding) {
        self.bindings.push(binding);
    }

    /// 當前狀態
    pub async fn state(&self) -> RouterState {
        *self.state.read().await
    }

    /// 綁定所有訂閱並啟動消費循環
    pub(crate) async fn start(&self, shutdown: watch::Receiver<bool>) -> Result<(), RouterError> {
        {
            let mut state = self.state.write().await;
            if *state != RouterState::Idle {
                return Err(RouterError::AlreadyStarted);
            }
            *state = RouterState::Running;
        }

        // 先完成全部訂閱，任何一個失敗則整體啟動失敗
        let mut subscriptions = Vec::with_capacity(self.bindings.len());
        for binding in &self.bindings {
            match binding.subscriber.start_consuming(&binding.topic).await {
                Ok(subscription) => subscriptions.push(subscription),
                Err(source) => {
                    let mut state = self.state.write().await;
                    *state = RouterState::Stopped;
                    return Err(RouterError::Subscribe {
                        handler: binding.handler_name.clone(),
                        source,
                    });
                }
            }
        }

        let mut tasks = self.tasks.lock().await;
        for (binding, subscription) in self.bindings.iter().zip(subscriptions) {
            tasks.push(tokio::spawn(consume_loop(
                binding.handler_name.clone(),
                binding.handle_fn.clone(),
                subscription,
                shutdown.clone(),
            )));
        }

        info!(
            "Router started with {} handler binding(s)",
            self.bindings.len()
        );

        Ok(())
    }

    /// 等待取消信號，排空在途消息後停止
    pub(crate) async fn wait_for_completion(&self, mut shutdown: watch::Receiver<bool>) {
        let _ = shutdown.wait_for(|stop| *stop).await;

        {
            let mut state = self.state.write().await;
            if *state != RouterState::Running {
                return;
            }
            *state = RouterState::Draining;
        }

        debug!("Router draining, waiting for in-flight handlers");

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Consume loop terminated abnormally: {}", e);
            }
        }

        {
            let mut state = self.state.write().await;
            *state = RouterState::Stopped;
        }

        info!("Router stopped");
    }
}

/// 單一綁定的消費循環
///
/// 收到取消信號後立即停止拉取新消息；已取出的消息處理完成後循環才退出。
async fn consume_loop(
    handler_name: String,
    handle_fn: HandlerFn,
    subscription: Subscription,
    mut shutdown: watch::Receiver<bool>,
) {
    let Subscription {
        queue_name,
        channel,
        mut consumer,
    } = subscription;

    debug!(
        "Consume loop started for handler {} on queue {}",
        handler_name, queue_name
    );

    loop {
        tokio::select! {
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => {
                debug!("Shutdown signal received, handler {} stops consuming", handler_name);
                break;
            }

            delivery = consumer.next() => {
                match delivery {
                    Some(Ok(delivery)) => {
                        dispatch(&handler_name, &handle_fn, &channel, delivery).await;
                    }
                    Some(Err(e)) => {
                        error!("Error receiving message for handler {}: {}", handler_name, e);
                    }
                    None => {
                        warn!("Consumer channel closed for handler {}", handler_name);
                        break;
                    }
                }
            }
        }
    }

    debug!("Consume loop stopped for handler {}", handler_name);
}

/// 分派一條投遞：還原封套、套用恢復中間件、回執
async fn dispatch(handler_name: &str, handle_fn: &HandlerFn, channel: &Channel, delivery: Delivery) {
    let delivery_tag = delivery.delivery_tag;
    let envelope = wire::decode_envelope(&delivery.properties, &delivery.data);

    match invoke_with_recovery(handler_name, handle_fn, envelope).await {
        DispatchOutcome::Handled => {
            if let Err(e) = channel
                .basic_ack(delivery_tag, BasicAckOptions::default())
                .await
            {
                error!("Failed to acknowledge message: {}", e);
            }
        }
        DispatchOutcome::Failed => {
            // 留給 broker 按其重試策略重新投遞
            let options = BasicNackOptions {
                requeue: true,
                ..BasicNackOptions::default()
            };
            if let Err(e) = channel.basic_nack(delivery_tag, options).await {
                error!("Failed to negatively acknowledge message: {}", e);
            }
        }
    }
}

/// 恢復中間件
///
/// 處理器返回錯誤或發生 panic 都不得中斷路由器。失敗連同消息元數據記錄後，
/// 消息交還 broker 重新投遞。panic 在獨立任務中發生，經 JoinError 捕獲。
pub(crate) async fn invoke_with_recovery(
    handler_name: &str,
    handle_fn: &HandlerFn,
    envelope: Envelope,
) -> DispatchOutcome {
    let message_id = envelope.message_id().to_string();
    let entity_id = envelope.entity_id().to_string();
    let source = envelope.source().to_string();

    let outcome = tokio::spawn((handle_fn)(envelope)).await;

    match outcome {
        Ok(Ok(())) => {
            counter!("chassis.messages.processed", "handler" => handler_name.to_string())
                .increment(1);
            DispatchOutcome::Handled
        }
        Ok(Err(e)) => {
            counter!("chassis.messages.failed", "handler" => handler_name.to_string())
                .increment(1);
            error!(
                "Handler {} failed for message {} (entityId={}, source={}): {}",
                handler_name, message_id, entity_id, source, e
            );
            DispatchOutcome::Failed
        }
        Err(e) => {
            counter!("chassis.messages.failed", "handler" => handler_name.to_string())
                .increment(1);
            error!(
                "Handler {} panicked for message {} (entityId={}, source={}): {}",
                handler_name, message_id, entity_id, source, e
            );
            DispatchOutcome::Failed
        }
    }
}
