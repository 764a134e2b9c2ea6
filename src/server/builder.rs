use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::types::ApplicationConfig;
use crate::config::validation::Validator;
use crate::messaging::bus::{CommandBus, EventBus};
use crate::messaging::facade::{
    Chassis, ChassisBuilder, CommandHandlerFactory, EventHandlerFactory,
};
use crate::messaging::handler::{CommandRegistration, EventRegistration};
use crate::server::{ServiceError, ServiceResult, ServiceState};

/// 服務實例
///
/// 包裝消息底盤為單一生命週期單位：路由器先於外部流量啟動，
/// 關閉時等待在途消息完成，等待上限由配置決定。
pub struct Service {
    /// 服務名稱
    name: String,
    /// 服務狀態
    state: Arc<RwLock<ServiceState>>,
    /// 消息底盤
    chassis: Arc<Chassis>,
    /// 關閉時等待排空的上限
    shutdown_timeout: Duration,
    /// 排空任務
    drain_task: Option<JoinHandle<()>>,
}

impl Service {
    /// 啟動服務
    ///
    /// 返回時路由器已在運行，外部接口層此後才可開始接收會觸發發布的流量。
    pub async fn start(&mut self) -> ServiceResult<()> {
        info!("啟動服務 {} ...", self.name);

        {
            let state = self.state.read().await;
            if *state != ServiceState::Initializing {
                return Err(ServiceError::Runtime(format!(
                    "服務狀態不允許啟動: {:?}",
                    *state
                )));
            }
        }

        // 啟動路由器，任何訂閱失敗都中止啟動
        self.chassis.start().await?;

        let chassis = self.chassis.clone();
        self.drain_task = Some(tokio::spawn(async move {
            chassis.wait_for_completion().await;
        }));

        {
            let mut state = self.state.write().await;
            *state = ServiceState::Running;
        }

        info!("服務已啟動");

        Ok(())
    }

    /// 阻塞直到收到作業系統中斷信號，然後優雅關閉
    pub async fn wait_for_shutdown_signal(&mut self) -> ServiceResult<()> {
        match signal::ctrl_c().await {
            Ok(()) => {
                warn!("接收到關閉信號，正在退出...");
                self.shutdown().await
            }
            Err(err) => {
                error!("無法監聽關閉信號: {}", err);
                Err(ServiceError::Io(err))
            }
        }
    }

    /// 優雅關閉服務
    ///
    /// 發出取消信號後等待在途消息處理完成，超過上限則強制關閉。
    pub async fn shutdown(&mut self) -> ServiceResult<()> {
        info!("正在關閉服務 {} ...", self.name);

        {
            let mut state = self.state.write().await;
            *state = ServiceState::ShuttingDown;
        }

        self.chassis.shutdown();

        if let Some(task) = self.drain_task.take() {
            match tokio::time::timeout(self.shutdown_timeout, task).await {
                Ok(Ok(())) => info!("所有在途消息已處理完成"),
                Ok(Err(e)) => error!("排空任務異常終止: {}", e),
                Err(_) => warn!("等待在途消息完成逾時，強制關閉"),
            }
        }

        {
            let mut state = self.state.write().await;
            *state = ServiceState::Stopped;
        }

        info!("服務已關閉");

        Ok(())
    }

    /// 檢查服務健康狀態
    pub async fn check_health(&self) -> ServiceResult<()> {
        let state = self.state.read().await;
        if *state != ServiceState::Running {
            return Err(ServiceError::Runtime(format!(
                "服務狀態不是運行中: {:?}",
                *state
            )));
        }

        self.chassis.check_health().await?;

        Ok(())
    }

    /// 獲取服務狀態
    pub async fn state(&self) -> ServiceState {
        *self.state.read().await
    }

    /// 命令匯流排，供外部接口層發布命令
    pub fn command_bus(&self) -> Arc<CommandBus> {
        self.chassis.command_bus()
    }

    /// 事件匯流排，供外部接口層發布事件
    pub fn event_bus(&self) -> Arc<EventBus> {
        self.chassis.event_bus()
    }
}

/// 服務構建器
pub struct ServiceBuilder {
    config: Option<ApplicationConfig>,
    command_handlers: Option<CommandHandlerFactory>,
    event_handlers: Option<EventHandlerFactory>,
}

impl ServiceBuilder {
    /// 創建新的服務構建器
    pub fn new() -> Self {
        Self {
            config: None,
            command_handlers: None,
            event_handlers: None,
        }
    }

    /// 設置服務配置
    pub fn with_config(mut self, config: ApplicationConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 設置命令處理器工廠
    pub fn with_command_handlers<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(Arc<CommandBus>, Arc<EventBus>) -> Vec<CommandRegistration> + Send + 'static,
    {
        self.command_handlers = Some(Box::new(factory));
        self
    }

    /// 設置事件處理器工廠
    pub fn with_event_handlers<F>(mut self, factory: F) -> Self
    where
        F: FnOnce(Arc<CommandBus>, Arc<EventBus>) -> Vec<EventRegistration> + Send + 'static,
    {
        self.event_handlers = Some(Box::new(factory));
        self
    }

    /// 構建並返回服務實例
    pub async fn build(self) -> ServiceResult<Service> {
        info!("構建服務實例");

        // 驗證配置
        let config = self
            .config
            .ok_or_else(|| ServiceError::Config("未提供服務配置".to_string()))?;
        config.validate()?;

        // 構建消息底盤
        let mut chassis_builder = ChassisBuilder::new(&config.app.name, &config.rabbitmq);
        if let Some(factory) = self.command_handlers {
            chassis_builder = chassis_builder.command_handlers(factory);
        }
        if let Some(factory) = self.event_handlers {
            chassis_builder = chassis_builder.event_handlers(factory);
        }
        let chassis = chassis_builder.build().await?;

        let service = Service {
            name: config.app.name.clone(),
            state: Arc::new(RwLock::new(ServiceState::Initializing)),
            chassis: Arc::new(chassis),
            shutdown_timeout: config.server.shutdown_timeout(),
            drain_task: None,
        };

        info!("服務實例構建完成");

        Ok(service)
    }
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
