use crate::config::validation::ValidationError;
use crate::messaging::facade::ChassisError;
use thiserror::Error;

/// 服務錯誤類型
#[derive(Error, Debug)]
pub enum ServiceError {
    /// 配置錯誤
    #[error("配置錯誤: {0}")]
    Config(String),

    /// 配置驗證錯誤
    #[error("配置驗證錯誤: {0}")]
    Validation(#[from] ValidationError),

    /// 消息底盤錯誤
    #[error("消息底盤錯誤: {0}")]
    Chassis(#[from] ChassisError),

    /// IO 錯誤
    #[error("IO 錯誤: {0}")]
    Io(#[from] std::io::Error),

    /// 運行時錯誤
    #[error("運行時錯誤: {0}")]
    Runtime(String),

    /// 關閉錯誤
    #[error("關閉錯誤: {0}")]
    Shutdown(String),
}

/// 服務結果類型別名
pub type ServiceResult<T> = Result<T, ServiceError>;
