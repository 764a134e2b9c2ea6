// RabbitMQ 模組
// 提供與 RabbitMQ 通訊的基礎設施

// 導出子模組
pub mod connection;
pub mod error;
pub mod publisher;
pub mod subscriber;
pub mod wire;

// 重新導出常用結構
pub use connection::{ConnectionError, ConnectionManager};
pub use error::RabbitMqError;
pub use publisher::{PublishTopology, PublisherConfig, RabbitMqPublisher};
pub use subscriber::{QueueNaming, RabbitMqSubscriber, SubscriberConfig, Subscription};
