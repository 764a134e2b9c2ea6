use deadpool_lapin::{Manager, Object, Pool, PoolError};
use lapin::{Channel, ConnectionProperties, Error as LapinError};
use thiserror::Error;
use tracing::info;

/// 連接層錯誤
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Connection pool build error: {0}")]
    Build(#[from] deadpool::managed::BuildError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Lapin error: {0}")]
    Lapin(#[from] LapinError),
}

/// RabbitMQ 連接管理器
///
/// 所有發布者與訂閱者共享同一個連接池，各自在其上開啟獨立通道。
#[derive(Clone)]
pub struct ConnectionManager {
    pool: Pool,
}

impl ConnectionManager {
    /// 創建新的連接池並驗證 broker 可達
    pub async fn new(amqp_uri: &str, pool_size: usize) -> Result<Self, ConnectionError> {
        info!("Creating RabbitMQ connection pool to {}", amqp_uri);

        let properties =
            ConnectionProperties::default().with_executor(tokio_executor_trait::Tokio::current());
        let manager = Manager::new(amqp_uri.to_string(), properties);
        let pool = Pool::builder(manager).max_size(pool_size).build()?;

        // 測試連接
        let _ = pool.get().await?;
        info!("Successfully connected to RabbitMQ");

        Ok(Self { pool })
    }

    /// 取得一條池化連接
    pub async fn get_connection(&self) -> Result<Object, ConnectionError> {
        Ok(self.pool.get().await?)
    }

    /// 在池化連接上開啟一條新通道
    pub async fn create_channel(&self) -> Result<Channel, ConnectionError> {
        let conn = self.get_connection().await?;
        Ok(conn.create_channel().await?)
    }

    /// 檢查連接狀態
    pub async fn check_health(&self) -> Result<(), ConnectionError> {
        let _ = self.pool.get().await?;
        Ok(())
    }
}
