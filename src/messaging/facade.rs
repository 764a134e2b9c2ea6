use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

use crate::config::types::RabbitMQConfig;
use crate::messaging::bus::{CommandBus, EventBus};
use crate::messaging::envelope::EnvelopeBuilder;
use crate::messaging::handler::{
    ensure_unique_command_handlers, ensure_unique_event_handlers, CommandRegistration,
    DuplicateHandlerError, EventRegistration,
};
use crate::messaging::rabbitmq::connection::{ConnectionError, ConnectionManager};
use crate::messaging::rabbitmq::error::RabbitMqError;
use crate::messaging::rabbitmq::publisher::{PublisherConfig, RabbitMqPublisher};
use crate::messaging::rabbitmq::subscriber::{RabbitMqSubscriber, SubscriberConfig};
use crate::messaging::router::{Binding, Router, RouterError, RouterState};
use crate::messaging::topology;

/// 建構失敗的聚合錯誤
///
/// 所有建構期失敗都經由此類型返回調用方，由調用方決定重試或退出，
/// 底盤自身不終止進程。
#[derive(Error, Debug)]
pub enum ChassisError {
    #[error("Broker connection failed: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Failed to create command publisher: {0}")]
    CommandPublisher(#[source] RabbitMqError),

    #[error("Failed to create event publisher: {0}")]
    EventPublisher(#[source] RabbitMqError),

    #[error("Failed to create command subscriber: {0}")]
    CommandSubscriber(#[source] RabbitMqError),

    #[error("Duplicate handler registration: {0}")]
    Duplicate(#[from] DuplicateHandlerError),

    #[error("Failed to provision subscriber for handler {handler}: {source}")]
    Provisioning {
        handler: String,
        #[source]
        source: RabbitMqError,
    },

    #[error("Router error: {0}")]
    Router(#[from] RouterError),
}

/// 命令處理器工廠
///
/// 兩階段建構的第二階段：以位址穩定的匯流排引用換取處理器註冊，
/// 供需要回發消息的處理器持有匯流排。
pub type CommandHandlerFactory =
    Box<dyn FnOnce(Arc<CommandBus>, Arc<EventBus>) -> Vec<CommandRegistration> + Send>;

/// 事件處理器工廠
pub type EventHandlerFactory =
    Box<dyn FnOnce(Arc<CommandBus>, Arc<EventBus>) -> Vec<EventRegistration> + Send>;

/// 消息底盤門面
///
/// 組合命令/事件匯流排與路由器為單一生命週期單位。
pub struct Chassis {
    command_bus: Arc<CommandBus>,
    event_bus: Arc<EventBus>,
    router: Arc<Router>,
    connection: ConnectionManager,
    shutdown_tx: watch::Sender<bool>,
}

impl Chassis {
    /// 命令匯流排
    pub fn command_bus(&self) -> Arc<CommandBus> {
        self.command_bus.clone()
    }

    /// 事件匯流排
    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    /// 路由器狀態
    pub async fn router_state(&self) -> RouterState {
        self.router.state().await
    }

    /// 啟動路由器
    ///
    /// 須在外部流量（可能觸發發布）開始前完成。
    pub async fn start(&self) -> Result<(), ChassisError> {
        self.router.start(self.shutdown_tx.subscribe()).await?;
        Ok(())
    }

    /// 阻塞直到收到取消信號且在途消息處理完成
    pub async fn wait_for_completion(&self) {
        self.router
            .wait_for_completion(self.shutdown_tx.subscribe())
            .await;
    }

    /// 啟動並運行直至取消
    pub async fn run(&self) -> Result<(), ChassisError> {
        self.start().await?;
        self.wait_for_completion().await;
        Ok(())
    }

    /// 發出取消信號，路由器進入排空
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// 檢查 broker 連接健康狀態
    pub async fn check_health(&self) -> Result<(), ChassisError> {
        self.connection.check_health().await?;
        Ok(())
    }
}

/// 底盤建構器
///
/// 建構順序固定：連接、發布者、共享命令訂閱者、匯流排外殼、處理器工廠、
/// 註冊驗證、事件訂閱者供應、路由器綁定。
pub struct ChassisBuilder {
    service_name: String,
    rabbitmq: RabbitMQConfig,
    command_handlers: Option<CommandHandlerFactory>,
    event_handlers: Option<EventHandlerFactory>,
}

impl ChassisBuilder {
    /// 創建新的底盤建構器
    ///
    /// 不註冊任何處理器時建構出僅發布模式的底盤。
    pub fn new(service_name: &str, rabbitmq: &RabbitMQConfig) -> Self {
        Self {
            service_name: service_name.to_string(),
            rabbitmq: rabbitmq.clone(),
            command_handlers: None,
            event_handlers: None,
        }
    }

    /// 設置命令處理器工廠
    pub fn command_handlers<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(Arc<CommandBus>, Arc<EventBus>) -> Vec<CommandRegistration> + Send + 'static,
    {
        self.command_handlers = Some(Box::new(factory));
        self
    }

    /// 設置事件處理器工廠
    pub fn event_handlers<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(Arc<CommandBus>, Arc<EventBus>) -> Vec<EventRegistration> + Send + 'static,
    {
        self.event_handlers = Some(Box::new(factory));
        self
    }

    /// 建構底盤
    pub async fn build(self) -> Result<Chassis, ChassisError> {
        // 階段一：連接與發布者，任一供應失敗即建構失敗
        let connection =
            ConnectionManager::new(&self.rabbitmq.uri, self.rabbitmq.pool_size as usize).await?;

        let command_publisher =
            RabbitMqPublisher::new(connection.clone(), PublisherConfig::durable_queue());
        command_publisher
            .initialize()
            .await
            .map_err(ChassisError::CommandPublisher)?;

        let event_publisher =
            RabbitMqPublisher::new(connection.clone(), PublisherConfig::durable_pub_sub());
        event_publisher
            .initialize()
            .await
            .map_err(ChassisError::EventPublisher)?;

        // 每種命令類型各有專屬佇列，單一訂閱者實例可安全複用於所有命令處理器
        let command_subscriber = Arc::new(RabbitMqSubscriber::new(
            connection.clone(),
            SubscriberConfig::durable_queue().with_prefetch(self.rabbitmq.prefetch_count),
        ));
        command_subscriber
            .check()
            .await
            .map_err(ChassisError::CommandSubscriber)?;

        let command_bus = Arc::new(CommandBus::new(
            command_publisher,
            EnvelopeBuilder::new(&self.service_name),
        ));
        let event_bus = Arc::new(EventBus::new(
            event_publisher,
            EnvelopeBuilder::new(&self.service_name),
        ));

        // 階段二：以穩定的匯流排引用調用處理器工廠
        let command_registrations = match self.command_handlers {
            Some(factory) => factory(command_bus.clone(), event_bus.clone()),
            None => Vec::new(),
        };
        let event_registrations = match self.event_handlers {
            Some(factory) => factory(command_bus.clone(), event_bus.clone()),
            None => Vec::new(),
        };

        ensure_unique_command_handlers(&command_registrations)?;
        ensure_unique_event_handlers(&event_registrations)?;

        let command_count = command_registrations.len();
        let event_count = event_registrations.len();

        // 階段三：訂閱者供應與路由器綁定
        let mut router = Router::new();

        for registration in command_registrations {
            let topic = topology::command_topic(registration.command_name()).to_string();

            command_subscriber
                .provision(&topic)
                .await
                .map_err(|source| ChassisError::Provisioning {
                    handler: registration.handler_name().to_string(),
                    source,
                })?;

            router.add_binding(Binding {
                handler_name: registration.handler_name().to_string(),
                topic,
                subscriber: command_subscriber.clone(),
                handle_fn: registration.handle_fn(),
            });
        }

        for registration in event_registrations {
            // 每個事件處理器一個隔離的訂閱者與私有佇列
            let subscriber = Arc::new(RabbitMqSubscriber::new(
                connection.clone(),
                SubscriberConfig::durable_pub_sub(registration.queue_suffix())
                    .with_prefetch(self.rabbitmq.prefetch_count),
            ));
            let topic = topology::event_topic(registration.event_name()).to_string();

            subscriber
                .provision(&topic)
                .await
                .map_err(|source| ChassisError::Provisioning {
                    handler: registration.handler_name().to_string(),
                    source,
                })?;

            router.add_binding(Binding {
                handler_name: registration.handler_name().to_string(),
                topic,
                subscriber,
                handle_fn: registration.handle_fn(),
            });
        }

        let (shutdown_tx, _shutdown_rx) = watch::channel(false);

        info!(
            "Chassis constructed for service {}: {} command handler(s), {} event handler(s)",
            self.service_name, command_count, event_count
        );

        Ok(Chassis {
            command_bus,
            event_bus,
            router: Arc::new(router),
            connection,
            shutdown_tx,
        })
    }
}
