use crate::messaging::rabbitmq::connection::ConnectionError;
use lapin::Error as LapinError;
use serde_json::Error as SerdeError;
use thiserror::Error;

/// RabbitMQ 系統通用錯誤類型
#[derive(Error, Debug)]
pub enum RabbitMqError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Lapin error: {0}")]
    Lapin(#[from] LapinError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerdeError),

    #[error("Publish not confirmed by broker")]
    PublishNotConfirmed,

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Other error: {0}")]
    Other(String),
}

/// 將字符串錯誤轉換為 RabbitMQ 錯誤
impl From<String> for RabbitMqError {
    fn from(error: String) -> Self {
        RabbitMqError::Other(error)
    }
}

/// 將 &str 錯誤轉換為 RabbitMQ 錯誤
impl From<&str> for RabbitMqError {
    fn from(error: &str) -> Self {
        RabbitMqError::Other(error.to_string())
    }
}
