// 整合測試共用工具
// 需要可用的 RabbitMQ 時由 CHASSIS_TEST_AMQP_URI 環境變數提供位址，
// 未設定時測試直接跳過

use lapin::options::QueueDeleteOptions;
use lapin::{Connection, ConnectionProperties};
use message_chassis::config::types::RabbitMQConfig;

/// 取得整合測試用的 AMQP 位址，未設定時跳過測試
pub fn amqp_uri() -> Option<String> {
    match std::env::var("CHASSIS_TEST_AMQP_URI") {
        Ok(uri) if !uri.is_empty() => Some(uri),
        _ => {
            eprintln!("CHASSIS_TEST_AMQP_URI not set; skipping RabbitMQ integration test");
            None
        }
    }
}

/// 整合測試用的 RabbitMQ 配置
pub fn rabbitmq_config(uri: &str) -> RabbitMQConfig {
    RabbitMQConfig {
        uri: uri.to_string(),
        pool_size: 2,
        prefetch_count: 10,
    }
}

/// 刪除殘留佇列，讓每次測試從乾淨的積壓開始
pub async fn delete_queues(uri: &str, queues: &[&str]) {
    let conn = match Connection::connect(uri, ConnectionProperties::default()).await {
        Ok(conn) => conn,
        Err(_) => return,
    };

    if let Ok(channel) = conn.create_channel().await {
        for queue in queues {
            let _ = channel
                .queue_delete(queue, QueueDeleteOptions::default())
                .await;
        }
    }
}
