use std::collections::HashSet;
use std::sync::Arc;

use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{Channel, ExchangeKind};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::messaging::envelope::Envelope;
use crate::messaging::rabbitmq::connection::ConnectionManager;
use crate::messaging::rabbitmq::error::RabbitMqError;
use crate::messaging::rabbitmq::wire;

/// 發布端拓撲模式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishTopology {
    /// 點對點：經預設交換機直達與主題同名的佇列
    DurableQueue,
    /// 廣播：每個主題一個持久化 fanout 交換機
    DurablePubSub,
}

/// 發布者配置
#[derive(Clone, Debug)]
pub struct PublisherConfig {
    pub topology: PublishTopology,
    pub exchange_durable: bool,
    pub confirm: bool,
}

impl PublisherConfig {
    /// 點對點佇列配置（命令）
    pub fn durable_queue() -> Self {
        Self {
            topology: PublishTopology::DurableQueue,
            exchange_durable: true,
            confirm: true,
        }
    }

    /// 廣播配置（事件）
    pub fn durable_pub_sub() -> Self {
        Self {
            topology: PublishTopology::DurablePubSub,
            exchange_durable: true,
            confirm: true,
        }
    }
}

/// 消息發布者
pub struct RabbitMqPublisher {
    connection: ConnectionManager,
    config: PublisherConfig,
    channel: Arc<Mutex<Option<Channel>>>,
    declared_exchanges: Arc<Mutex<HashSet<String>>>,
}

impl RabbitMqPublisher {
    /// 創建新的消息發布者
    pub fn new(connection: ConnectionManager, config: PublisherConfig) -> Self {
        Self {
            connection,
            config,
            channel: Arc::new(Mutex::new(None)),
            declared_exchanges: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// 初始化發布者，建立通道並按配置啟用發布確認
    pub async fn initialize(&self) -> Result<(), RabbitMqError> {
        let _ = self.ensure_channel().await?;
        info!("Publisher initialized ({:?})", self.config.topology);
        Ok(())
    }

    /// 確保通道可用，斷開時重建
    async fn ensure_channel(&self) -> Result<Channel, RabbitMqError> {
        let mut guard = self.channel.lock().await;

        if let Some(channel) = guard.as_ref() {
            if channel.status().connected() {
                return Ok(channel.clone());
            }
            debug!("Cached publisher channel lost, recreating");
        }

        let channel = self.connection.create_channel().await?;
        if self.config.confirm {
            channel
                .confirm_select(ConfirmSelectOptions::default())
                .await?;
        }

        *guard = Some(channel.clone());

        Ok(channel)
    }

    /// 確保主題對應的 fanout 交換機已宣告
    async fn ensure_exchange(&self, channel: &Channel, topic: &str) -> Result<(), RabbitMqError> {
        let mut declared = self.declared_exchanges.lock().await;
        if declared.contains(topic) {
            return Ok(());
        }

        debug!("Declaring exchange: {}", topic);

        channel
            .exchange_declare(
                topic,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: self.config.exchange_durable,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        declared.insert(topic.to_string());

        Ok(())
    }

    /// 發布封套到指定主題
    ///
    /// 啟用發布確認時，broker 接收並持久化後才返回成功。
    pub async fn publish(&self, topic: &str, envelope: &Envelope) -> Result<(), RabbitMqError> {
        let channel = self.ensure_channel().await?;

        let (exchange, routing_key) = match self.config.topology {
            // 預設交換機，主題即佇列
            PublishTopology::DurableQueue => ("", topic),
            PublishTopology::DurablePubSub => {
                self.ensure_exchange(&channel, topic).await?;
                (topic, "")
            }
        };

        debug!(
            "Publishing message {} to exchange: '{}', routing_key: '{}'",
            envelope.message_id(),
            exchange,
            routing_key
        );

        let confirmation = channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                envelope.payload(),
                wire::to_properties(envelope),
            )
            .await?
            .await?;

        if self.config.confirm && matches!(confirmation, Confirmation::Nack(_)) {
            return Err(RabbitMqError::PublishNotConfirmed);
        }

        debug!("Message published successfully: {}", envelope.message_id());

        Ok(())
    }

    /// 檢查發布者健康狀態
    pub async fn check_health(&self) -> Result<(), RabbitMqError> {
        let _ = self.ensure_channel().await?;
        Ok(())
    }
}
