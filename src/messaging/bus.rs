use thiserror::Error;
use tracing::debug;

use crate::messaging::envelope::{EnvelopeBuilder, EnvelopeError};
use crate::messaging::handler::{Command, Event};
use crate::messaging::rabbitmq::error::RabbitMqError;
use crate::messaging::rabbitmq::publisher::RabbitMqPublisher;
use crate::messaging::topology;

/// 發布錯誤
#[derive(Error, Debug)]
pub enum PublishError {
    /// 封套建構失敗
    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// broker 層寫入失敗
    #[error("Broker error: {0}")]
    Broker(#[from] RabbitMqError),
}

/// 命令匯流排
///
/// 點對點發布命令。處理器的分派由路由器綁定完成，不經由匯流排。
pub struct CommandBus {
    publisher: RabbitMqPublisher,
    envelope_builder: EnvelopeBuilder,
}

impl CommandBus {
    pub(crate) fn new(publisher: RabbitMqPublisher, envelope_builder: EnvelopeBuilder) -> Self {
        Self {
            publisher,
            envelope_builder,
        }
    }

    /// 發布一條命令到其專屬主題
    pub async fn publish<C: Command>(&self, command: &C) -> Result<(), PublishError> {
        let envelope = self.envelope_builder.build(command)?;
        let topic = topology::command_topic(C::command_name());

        debug!(
            "Publishing command {} to topic: {}",
            envelope.message_id(),
            topic
        );

        self.publisher.publish(topic, &envelope).await?;

        Ok(())
    }
}

/// 事件匯流排
///
/// 將事件廣播到共享的事件主題，由各處理器的私有佇列分別接收。
pub struct EventBus {
    publisher: RabbitMqPublisher,
    envelope_builder: EnvelopeBuilder,
}

impl EventBus {
    pub(crate) fn new(publisher: RabbitMqPublisher, envelope_builder: EnvelopeBuilder) -> Self {
        Self {
            publisher,
            envelope_builder,
        }
    }

    /// 發布一條事件到共享事件主題
    pub async fn publish<E: Event>(&self, event: &E) -> Result<(), PublishError> {
        let envelope = self.envelope_builder.build(event)?;
        let topic = topology::event_topic(E::event_name());

        debug!(
            "Publishing event {} to topic: {}",
            envelope.message_id(),
            topic
        );

        self.publisher.publish(topic, &envelope).await?;

        Ok(())
    }
}
