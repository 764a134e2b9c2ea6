// 主題路由策略
//
// 命令與事件使用不同的路由拓撲：每種命令類型對應一個專屬主題（在佇列型
// broker 上即點對點佇列），所有事件類型共用單一廣播主題，事件處理器之間的
// 隔離在訂閱層以私有佇列實現。

/// 所有事件共用的廣播主題名稱
pub const EVENTS_TOPIC: &str = "events";

/// 命令主題：主題名稱即命令名稱
///
/// 在主題與佇列一一對應的 broker 上，這保證每種命令類型有專屬的點對點佇列。
pub fn command_topic(command_name: &str) -> &str {
    command_name
}

/// 事件主題：所有事件類型共用單一主題
///
/// 事件類型的區分在處理器內部完成，不在路由層。
pub fn event_topic(_event_name: &str) -> &'static str {
    EVENTS_TOPIC
}

/// 導出事件處理器的私有佇列名稱
///
/// 對固定的 (主題, 後綴) 結果恆定，跨重啟穩定，使重新投遞能接回正確的積壓。
pub fn pub_sub_queue_name(topic: &str, suffix: &str) -> String {
    format!("{}_{}", topic, suffix)
}
