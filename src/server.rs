// server.rs - 服務生命週期組件，宣告子模組
//
// 服務模組將消息底盤包裝為可管理生命週期的服務單位，實現：
// - 服務啟動與優雅關閉（含在途消息排空上限）
// - 作業系統中斷信號監聽
// - 匯流排存取器，供外部接口層（如 HTTP）發布消息

/// 服務構建器實現
pub mod builder;
/// 服務級別錯誤處理
pub mod error;

// 重新導出核心組件，簡化外部使用
pub use crate::config::types::ServerConfig;
pub use builder::{Service, ServiceBuilder};
pub use error::{ServiceError, ServiceResult};

/// 服務狀態枚舉
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServiceState {
    /// 服務正在初始化
    Initializing,
    /// 服務正在運行
    Running,
    /// 服務正在關閉
    ShuttingDown,
    /// 服務已停止
    Stopped,
}
