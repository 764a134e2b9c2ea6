// 消息系統模組
// 提供基於 RabbitMQ 的 CQRS 消息底盤：命令點對點投遞、事件廣播訂閱、
// 帶失敗隔離的處理路由器

// 導出子模組
pub mod bus;
pub mod envelope;
pub mod facade;
pub mod handler;
pub mod rabbitmq;
pub mod router;
pub mod topology;

// 重新導出常用類型
pub use bus::{CommandBus, EventBus, PublishError};
pub use envelope::{Envelope, EnvelopeBuilder, EnvelopeError, MessagePayload};
pub use facade::{Chassis, ChassisBuilder, ChassisError, CommandHandlerFactory, EventHandlerFactory};
pub use handler::{
    Command, CommandHandler, CommandRegistration, DuplicateHandlerError, Event, EventHandler,
    EventRegistration, HandlerResult,
};
pub use router::{Router, RouterState};
pub use topology::EVENTS_TOPIC;
