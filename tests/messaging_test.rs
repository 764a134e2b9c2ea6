// 消息底盤整合測試
// 覆蓋命令點對點投遞、事件廣播、失敗隔離與優雅排空，
// 需要可用的 RabbitMQ（CHASSIS_TEST_AMQP_URI），未設定時跳過

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serial_test::serial;
use tokio::sync::mpsc;
use tokio::time::timeout;

use message_chassis::messaging::{
    ChassisBuilder, ChassisError, Command, CommandRegistration, Event, EventRegistration,
    MessagePayload, RouterState,
};

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(10);

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
        "it_create_order"
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SlowOrder {
    order_id: i64,
}

impl MessagePayload for SlowOrder {
    fn entity_id(&self) -> i64 {
        self.order_id
    }
}

impl Command for SlowOrder {
    fn command_name() -> &'static str {
        "it_slow_order"
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BroadcastOrderCreated {
    order_id: i64,
}

impl MessagePayload for BroadcastOrderCreated {
    fn entity_id(&self) -> i64 {
        self.order_id
    }
}

impl Event for BroadcastOrderCreated {
    fn event_name() -> &'static str {
        "it_broadcast_order_created"
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RecoveryOrderCreated {
    order_id: i64,
}

impl MessagePayload for RecoveryOrderCreated {
    fn entity_id(&self) -> i64 {
        self.order_id
    }
}

impl Event for RecoveryOrderCreated {
    fn event_name() -> &'static str {
        "it_recovery_order_created"
    }
}

/// 場景A：發布命令後，經專屬佇列投遞到唯一的處理器
#[tokio::test]
#[serial]
async fn test_command_routes_to_registered_handler() {
    let Some(uri) = common::amqp_uri() else {
        return;
    };
    common::delete_queues(&uri, &["it_create_order"]).await;

    let (tx, mut rx) = mpsc::unbounded_channel();

    let chassis = ChassisBuilder::new("it-command-service", &common::rabbitmq_config(&uri))
        .command_handlers(move |_command_bus, _event_bus| {
            let tx = tx.clone();
            vec![CommandRegistration::new(
                "order-processor",
                move |command: CreateOrder| {
                    let tx = tx.clone();
                    async move {
                        tx.send(command.order_id).unwrap();
                        Ok(())
                    }
                },
            )]
        })
        .build()
        .await
        .expect("build chassis");

    chassis.start().await.expect("start router");

    chassis
        .command_bus()
        .publish(&CreateOrder { order_id: 42 })
        .await
        .expect("publish command");

    let received = timeout(RECEIVE_TIMEOUT, rx.recv())
        .await
        .expect("command delivered in time")
        .expect("channel open");
    assert_eq!(received, 42);

    chassis.shutdown();
    chassis.wait_for_completion().await;
    assert_eq!(chassis.router_state().await, RouterState::Stopped);
}

/// 場景B：兩個處理器各自擁有私有佇列，同一事件各收到恰好一份
#[tokio::test]
#[serial]
async fn test_event_broadcast_reaches_each_handler_once() {
    let Some(uri) = common::amqp_uri() else {
        return;
    };
    common::delete_queues(&uri, &["events_it_billing", "events_it_shipping"]).await;

    let (billing_tx, mut billing_rx) = mpsc::unbounded_channel();
    let (shipping_tx, mut shipping_rx) = mpsc::unbounded_channel();

    let chassis = ChassisBuilder::new("it-broadcast-service", &common::rabbitmq_config(&uri))
        .event_handlers(move |_command_bus, _event_bus| {
            let billing_tx = billing_tx.clone();
            let shipping_tx = shipping_tx.clone();
            vec![
                EventRegistration::new("it_billing", move |event: BroadcastOrderCreated| {
                    let tx = billing_tx.clone();
                    async move {
                        tx.send(event.order_id).unwrap();
                        Ok(())
                    }
                }),
                EventRegistration::new("it_shipping", move |event: BroadcastOrderCreated| {
                    let tx = shipping_tx.clone();
                    async move {
                        tx.send(event.order_id).unwrap();
                        Ok(())
                    }
                }),
            ]
        })
        .build()
        .await
        .expect("build chassis");

    chassis.start().await.expect("start router");

    chassis
        .event_bus()
        .publish(&BroadcastOrderCreated { order_id: 7 })
        .await
        .expect("publish event");

    let billing = timeout(RECEIVE_TIMEOUT, billing_rx.recv())
        .await
        .expect("billing delivery in time")
        .expect("channel open");
    let shipping = timeout(RECEIVE_TIMEOUT, shipping_rx.recv())
        .await
        .expect("shipping delivery in time")
        .expect("channel open");
    assert_eq!(billing, 7);
    assert_eq!(shipping, 7);

    // 每個處理器恰好一份，短時間內不應出現重複投遞
    assert!(timeout(Duration::from_millis(500), billing_rx.recv())
        .await
        .is_err());
    assert!(timeout(Duration::from_millis(500), shipping_rx.recv())
        .await
        .is_err());

    chassis.shutdown();
    chassis.wait_for_completion().await;
}

/// 場景C：一個處理器 panic 不影響另一個處理器，消息經重新投遞後補處理
#[tokio::test]
#[serial]
async fn test_panicking_handler_is_isolated() {
    let Some(uri) = common::amqp_uri() else {
        return;
    };
    common::delete_queues(&uri, &["events_it_rec_billing", "events_it_rec_shipping"]).await;

    let (billing_tx, mut billing_rx) = mpsc::unbounded_channel();
    let (shipping_tx, mut shipping_rx) = mpsc::unbounded_channel();
    let attempts = Arc::new(AtomicU32::new(0));

    let chassis = ChassisBuilder::new("it-recovery-service", &common::rabbitmq_config(&uri))
        .event_handlers(move |_command_bus, _event_bus| {
            let billing_tx = billing_tx.clone();
            let shipping_tx = shipping_tx.clone();
            let attempts = attempts.clone();
            vec![
                EventRegistration::new("it_rec_billing", move |event: RecoveryOrderCreated| {
                    let tx = billing_tx.clone();
                    let attempts = attempts.clone();
                    async move {
                        // 首次投遞注入不可恢復故障，重新投遞後成功
                        if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                            panic!("injected failure");
                        }
                        tx.send(event.order_id).unwrap();
                        Ok(())
                    }
                }),
                EventRegistration::new("it_rec_shipping", move |event: RecoveryOrderCreated| {
                    let tx = shipping_tx.clone();
                    async move {
                        tx.send(event.order_id).unwrap();
                        Ok(())
                    }
                }),
            ]
        })
        .build()
        .await
        .expect("build chassis");

    chassis.start().await.expect("start router");

    chassis
        .event_bus()
        .publish(&RecoveryOrderCreated { order_id: 9 })
        .await
        .expect("publish event");

    // 未受影響的處理器照常收到事件
    let shipping = timeout(RECEIVE_TIMEOUT, shipping_rx.recv())
        .await
        .expect("shipping delivery in time")
        .expect("channel open");
    assert_eq!(shipping, 9);

    // 路由器仍在運行，故障消息重新投遞後由同一處理器補處理
    assert_eq!(chassis.router_state().await, RouterState::Running);
    let billing = timeout(RECEIVE_TIMEOUT, billing_rx.recv())
        .await
        .expect("billing redelivery in time")
        .expect("channel open");
    assert_eq!(billing, 9);

    chassis.shutdown();
    chassis.wait_for_completion().await;
}

/// 場景D：取消信號不中斷執行中的處理器，排空完成後才停止
#[tokio::test]
#[serial]
async fn test_shutdown_waits_for_in_flight_handler() {
    let Some(uri) = common::amqp_uri() else {
        return;
    };
    common::delete_queues(&uri, &["it_slow_order"]).await;

    let (tx, mut rx) = mpsc::unbounded_channel();

    let chassis = ChassisBuilder::new("it-drain-service", &common::rabbitmq_config(&uri))
        .command_handlers(move |_command_bus, _event_bus| {
            let tx = tx.clone();
            vec![CommandRegistration::new(
                "slow-processor",
                move |command: SlowOrder| {
                    let tx = tx.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(300)).await;
                        tx.send(command.order_id).unwrap();
                        Ok(())
                    }
                },
            )]
        })
        .build()
        .await
        .expect("build chassis");

    chassis.start().await.expect("start router");

    chassis
        .command_bus()
        .publish(&SlowOrder { order_id: 1 })
        .await
        .expect("publish command");

    // 等待消息進入處理中，再發出取消信號
    tokio::time::sleep(Duration::from_millis(100)).await;
    chassis.shutdown();
    chassis.wait_for_completion().await;

    // 在途處理必須完成後路由器才停止
    assert_eq!(chassis.router_state().await, RouterState::Stopped);
    assert_eq!(rx.try_recv().expect("in-flight handler completed"), 1);
}

/// 同一命令類型註冊兩個處理器於建構期被拒絕
#[tokio::test]
#[serial]
async fn test_duplicate_command_handler_rejected_at_construction() {
    let Some(uri) = common::amqp_uri() else {
        return;
    };

    let result = ChassisBuilder::new("it-duplicate-service", &common::rabbitmq_config(&uri))
        .command_handlers(|_command_bus, _event_bus| {
            let noop = |_command: CreateOrder| async { Ok(()) };
            vec![
                CommandRegistration::new("first", noop),
                CommandRegistration::new("second", noop),
            ]
        })
        .build()
        .await;

    assert!(matches!(result, Err(ChassisError::Duplicate(_))));
}
