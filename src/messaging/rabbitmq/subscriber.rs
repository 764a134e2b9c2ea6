use lapin::options::{
    BasicConsumeOptions, BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Consumer, ExchangeKind};
use tracing::{debug, info};
use uuid::Uuid;

use crate::messaging::rabbitmq::connection::ConnectionManager;
use crate::messaging::rabbitmq::error::RabbitMqError;
use crate::messaging::topology;

/// 佇列命名策略
#[derive(Clone, Debug)]
pub enum QueueNaming {
    /// 佇列名稱與主題相同（點對點）
    TopicAsQueue,
    /// 主題加處理器後綴（廣播，每個處理器一個私有佇列）
    TopicWithSuffix(String),
}

impl QueueNaming {
    /// 導出主題對應的佇列名稱，結果跨重啟穩定
    pub fn queue_name(&self, topic: &str) -> String {
        match self {
            QueueNaming::TopicAsQueue => topic.to_string(),
            QueueNaming::TopicWithSuffix(suffix) => topology::pub_sub_queue_name(topic, suffix),
        }
    }
}

/// 訂閱者配置
#[derive(Clone, Debug)]
pub struct SubscriberConfig {
    pub naming: QueueNaming,
    pub bind_exchange: bool,
    pub queue_durable: bool,
    pub exchange_durable: bool,
    pub prefetch_count: u16,
    pub consumer_tag: Option<String>,
}

impl SubscriberConfig {
    /// 點對點佇列配置（命令）：佇列名即主題名，不經交換機綁定
    pub fn durable_queue() -> Self {
        Self {
            naming: QueueNaming::TopicAsQueue,
            bind_exchange: false,
            queue_durable: true,
            exchange_durable: true,
            prefetch_count: 10,
            consumer_tag: None,
        }
    }

    /// 廣播配置（事件）：私有佇列以處理器名稱為後綴，綁定共享 fanout 交換機
    pub fn durable_pub_sub(suffix: &str) -> Self {
        Self {
            naming: QueueNaming::TopicWithSuffix(suffix.to_string()),
            bind_exchange: true,
            queue_durable: true,
            exchange_durable: true,
            prefetch_count: 10,
            consumer_tag: None,
        }
    }

    /// 設置預取數量
    pub fn with_prefetch(mut self, prefetch_count: u16) -> Self {
        self.prefetch_count = prefetch_count;
        self
    }
}

/// 一條活躍的佇列訂閱
pub struct Subscription {
    pub queue_name: String,
    pub channel: Channel,
    pub consumer: Consumer,
}

/// 持久化佇列訂閱者
pub struct RabbitMqSubscriber {
    connection: ConnectionManager,
    config: SubscriberConfig,
}

impl RabbitMqSubscriber {
    /// 創建新的訂閱者
    pub fn new(connection: ConnectionManager, config: SubscriberConfig) -> Self {
        Self { connection, config }
    }

    /// 檢查訂閱者能夠開啟通道
    pub async fn check(&self) -> Result<(), RabbitMqError> {
        let _ = self.connection.create_channel().await?;
        Ok(())
    }

    /// 宣告主題對應的佇列與綁定
    ///
    /// 於建構期調用，供應失敗即啟動失敗。
    pub async fn provision(&self, topic: &str) -> Result<String, RabbitMqError> {
        let channel = self.connection.create_channel().await?;
        let queue_name = self.config.naming.queue_name(topic);

        if self.config.bind_exchange {
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
        }

        debug!("Declaring queue: {}", queue_name);

        channel
            .queue_declare(
                &queue_name,
                QueueDeclareOptions {
                    durable: self.config.queue_durable,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        if self.config.bind_exchange {
            debug!("Binding queue {} to exchange {}", queue_name, topic);

            channel
                .queue_bind(
                    &queue_name,
                    topic,
                    "",
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }

        info!("Subscriber provisioned for queue: {}", queue_name);

        Ok(queue_name)
    }

    /// 開始消費主題對應的佇列
    pub async fn start_consuming(&self, topic: &str) -> Result<Subscription, RabbitMqError> {
        let channel = self.connection.create_channel().await?;

        channel
            .basic_qos(self.config.prefetch_count, BasicQosOptions::default())
            .await?;

        let queue_name = self.config.naming.queue_name(topic);
        let consumer_tag = self
            .config
            .consumer_tag
            .clone()
            .unwrap_or_else(|| format!("consumer-{}", Uuid::new_v4()));

        debug!(
            "Starting consumer {} for queue: {}",
            consumer_tag, queue_name
        );

        let consumer = channel
            .basic_consume(
                &queue_name,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(Subscription {
            queue_name,
            channel,
            consumer,
        })
    }
}
