use crate::messaging::envelope::{Envelope, EnvelopeError, MessagePayload};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// 處理器調用結果
pub type HandlerResult = Result<(), anyhow::Error>;

/// 已註冊處理函數的統一形態
pub(crate) type HandlerFn =
    Arc<dyn Fn(Envelope) -> Pin<Box<dyn Future<Output = HandlerResult> + Send>> + Send + Sync>;

/// 命令特徵
///
/// 命令是表達改變狀態意圖的類型化請求，每種命令類型只允許一個處理器。
pub trait Command: MessagePayload + DeserializeOwned + 'static {
    /// 命令名稱，同時作為路由主題
    fn command_name() -> &'static str;

    /// 由位元組還原命令，預設 JSON 解碼
    fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// 事件特徵
///
/// 事件是已發生事實的廣播，可被任意數量的獨立處理器消費。
pub trait Event: MessagePayload + DeserializeOwned + 'static {
    /// 事件名稱
    fn event_name() -> &'static str;

    /// 由位元組還原事件，預設 JSON 解碼
    fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// 類型化命令處理器
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    /// 消費的命令類型
    type Command: Command;

    /// 處理器名稱
    fn name(&self) -> &str;

    /// 處理一條命令
    async fn handle(&self, command: Self::Command) -> HandlerResult;
}

/// 類型化事件處理器
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// 消費的事件類型
    type Event: Event;

    /// 處理器名稱，同時導出其私有佇列後綴
    fn name(&self) -> &str;

    /// 處理一條事件
    async fn handle(&self, event: Self::Event) -> HandlerResult;
}

/// 重複的處理器註冊
#[derive(Error, Debug)]
pub enum DuplicateHandlerError {
    #[error("Duplicate command handler for command: {0}")]
    Command(String),

    #[error("Duplicate event handler name: {0}")]
    EventHandlerName(String),
}

/// 命令處理器註冊
///
/// 封閉的能力集合：處理器名稱、消費的命令名稱與處理函數。
/// 於建構期註冊一次，之後不可變。
#[derive(Clone)]
pub struct CommandRegistration {
    handler_name: String,
    command_name: &'static str,
    handle_fn: HandlerFn,
}

impl CommandRegistration {
    /// 從非同步閉包建立註冊
    pub fn new<C, F, Fut>(handler_name: impl Into<String>, handle: F) -> Self
    where
        C: Command,
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handle = Arc::new(handle);

        Self {
            handler_name: handler_name.into(),
            command_name: C::command_name(),
            handle_fn: Arc::new(move |envelope: Envelope| {
                let handle = handle.clone();
                Box::pin(async move {
                    let command = C::from_bytes(envelope.payload())?;
                    handle(command).await
                })
            }),
        }
    }

    /// 從類型化處理器建立註冊
    pub fn from_handler<H: CommandHandler>(handler: H) -> Self {
        let handler_name = handler.name().to_string();
        let handler = Arc::new(handler);

        Self {
            handler_name,
            command_name: H::Command::command_name(),
            handle_fn: Arc::new(move |envelope: Envelope| {
                let handler = handler.clone();
                Box::pin(async move {
                    let command = H::Command::from_bytes(envelope.payload())?;
                    handler.handle(command).await
                })
            }),
        }
    }

    /// 處理器名稱
    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    /// 消費的命令名稱
    pub fn command_name(&self) -> &'static str {
        self.command_name
    }

    pub(crate) fn handle_fn(&self) -> HandlerFn {
        self.handle_fn.clone()
    }
}

/// 事件處理器註冊
///
/// 處理器名稱同時導出其私有佇列後綴，因此以名稱為鍵，而非事件類型。
#[derive(Clone)]
pub struct EventRegistration {
    handler_name: String,
    event_name: &'static str,
    handle_fn: HandlerFn,
}

impl EventRegistration {
    /// 從非同步閉包建立註冊
    pub fn new<E, F, Fut>(handler_name: impl Into<String>, handle: F) -> Self
    where
        E: Event,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handle = Arc::new(handle);

        Self {
            handler_name: handler_name.into(),
            event_name: E::event_name(),
            handle_fn: Arc::new(move |envelope: Envelope| {
                let handle = handle.clone();
                Box::pin(async move {
                    let event = E::from_bytes(envelope.payload())?;
                    handle(event).await
                })
            }),
        }
    }

    /// 從類型化處理器建立註冊
    pub fn from_handler<H: EventHandler>(handler: H) -> Self {
        let handler_name = handler.name().to_string();
        let handler = Arc::new(handler);

        Self {
            handler_name,
            event_name: H::Event::event_name(),
            handle_fn: Arc::new(move |envelope: Envelope| {
                let handler = handler.clone();
                Box::pin(async move {
                    let event = H::Event::from_bytes(envelope.payload())?;
                    handler.handle(event).await
                })
            }),
        }
    }

    /// 處理器名稱
    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    /// 消費的事件名稱
    pub fn event_name(&self) -> &'static str {
        self.event_name
    }

    /// 私有佇列後綴
    pub fn queue_suffix(&self) -> &str {
        &self.handler_name
    }

    pub(crate) fn handle_fn(&self) -> HandlerFn {
        self.handle_fn.clone()
    }
}

/// 檢查一種命令類型只註冊了一個處理器
pub fn ensure_unique_command_handlers(
    registrations: &[CommandRegistration],
) -> Result<(), DuplicateHandlerError> {
    let mut seen = HashSet::new();
    for registration in registrations {
        if !seen.insert(registration.command_name()) {
            return Err(DuplicateHandlerError::Command(
                registration.command_name().to_string(),
            ));
        }
    }
    Ok(())
}

/// 檢查事件處理器名稱（即佇列後綴）不重複
pub fn ensure_unique_event_handlers(
    registrations: &[EventRegistration],
) -> Result<(), DuplicateHandlerError> {
    let mut seen = HashSet::new();
    for registration in registrations {
        if !seen.insert(registration.handler_name().to_string()) {
            return Err(DuplicateHandlerError::EventHandlerName(
                registration.handler_name().to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::envelope::EnvelopeBuilder;
    use assert_matches::assert_matches;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicI64, Ordering};

    #[derive(Debug, Serialize, Deserialize)]
    struct CreateOrder {
        order_id: i64,
    }

    impl MessagePayload for CreateOrder {
        fn entity_id(&self) -> i64 {
            self.order_id
        }
    }

    impl Command for CreateOrder {
        fn command_name() -> &'static str {
            "CreateOrder"
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct OrderCreated {
        order_id: i64,
    }

    impl MessagePayload for OrderCreated {
        fn entity_id(&self) -> i64 {
            self.order_id
        }
    }

    impl Event for OrderCreated {
        fn event_name() -> &'static str {
            "OrderCreated"
        }
    }

    fn command_registration(handler_name: &str) -> CommandRegistration {
        CommandRegistration::new(handler_name, |_command: CreateOrder| async { Ok(()) })
    }

    #[tokio::test]
    async fn test_registration_decodes_and_invokes_handler() {
        let received = Arc::new(AtomicI64::new(0));
        let captured = received.clone();

        let registration =
            CommandRegistration::new("order-processor", move |command: CreateOrder| {
                let captured = captured.clone();
                async move {
                    captured.store(command.order_id, Ordering::SeqCst);
                    Ok(())
                }
            });

        assert_eq!(registration.handler_name(), "order-processor");
        assert_eq!(registration.command_name(), "CreateOrder");

        let envelope = EnvelopeBuilder::new("test-service")
            .build(&CreateOrder { order_id: 42 })
            .unwrap();
        let result = (registration.handle_fn())(envelope).await;

        assert!(result.is_ok());
        assert_eq!(received.load(Ordering::SeqCst), 42);
    }

    #[tokio::test]
    async fn test_registration_reports_decode_failure() {
        let registration = command_registration("order-processor");

        let envelope =
            Envelope::from_parts("id".to_string(), Default::default(), b"not json".to_vec());
        let result = (registration.handle_fn())(envelope).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_typed_handler_lowers_into_registration() {
        struct BillingHandler {
            seen: Arc<AtomicI64>,
        }

        #[async_trait]
        impl EventHandler for BillingHandler {
            type Event = OrderCreated;

            fn name(&self) -> &str {
                "billing"
            }

            async fn handle(&self, event: OrderCreated) -> HandlerResult {
                self.seen.store(event.order_id, Ordering::SeqCst);
                Ok(())
            }
        }

        let seen = Arc::new(AtomicI64::new(0));
        let registration = EventRegistration::from_handler(BillingHandler { seen: seen.clone() });

        assert_eq!(registration.handler_name(), "billing");
        assert_eq!(registration.event_name(), "OrderCreated");
        assert_eq!(registration.queue_suffix(), "billing");

        let envelope = EnvelopeBuilder::new("test-service")
            .build(&OrderCreated { order_id: 7 })
            .unwrap();
        (registration.handle_fn())(envelope).await.unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_duplicate_command_handler_is_rejected() {
        let registrations = vec![
            command_registration("first"),
            command_registration("second"),
        ];

        let result = ensure_unique_command_handlers(&registrations);

        assert_matches!(result, Err(DuplicateHandlerError::Command(name)) if name == "CreateOrder");
    }

    #[test]
    fn test_single_command_handler_is_accepted() {
        let registrations = vec![command_registration("only")];

        assert!(ensure_unique_command_handlers(&registrations).is_ok());
    }

    #[test]
    fn test_duplicate_event_handler_name_is_rejected() {
        let make = |name: &str| EventRegistration::new(name, |_event: OrderCreated| async { Ok(()) });
        let registrations = vec![make("billing"), make("shipping"), make("billing")];

        let result = ensure_unique_event_handlers(&registrations);

        assert_matches!(
            result,
            Err(DuplicateHandlerError::EventHandlerName(name)) if name == "billing"
        );
    }
}
