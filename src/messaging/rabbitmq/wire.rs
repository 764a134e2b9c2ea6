// 封套與 AMQP 消息屬性之間的映射
//
// 消息ID放入 message_id 屬性，元數據放入 headers，載荷即消息本體。
// 入站消息缺失的元數據鍵以空值補齊，封套的元數據鍵恆存在。

use std::collections::HashMap;

use lapin::types::{AMQPValue, FieldTable};
use lapin::BasicProperties;

use crate::messaging::envelope::{Envelope, METADATA_ENTITY_ID, METADATA_SOURCE};

/// 封套轉為 AMQP 消息屬性
pub(crate) fn to_properties(envelope: &Envelope) -> BasicProperties {
    let mut headers = FieldTable::default();
    for (key, value) in envelope.metadata() {
        headers.insert(
            key.as_str().into(),
            AMQPValue::LongString(value.as_str().into()),
        );
    }

    BasicProperties::default()
        .with_message_id(envelope.message_id().into())
        .with_content_type("application/json".into())
        .with_delivery_mode(2) // 持久化模式
        .with_headers(headers)
}

/// 由入站消息的屬性與本體還原封套
pub(crate) fn decode_envelope(properties: &BasicProperties, data: &[u8]) -> Envelope {
    let message_id = properties
        .message_id()
        .as_ref()
        .map(|id| id.as_str().to_string())
        .unwrap_or_default();

    let mut metadata: HashMap<String, String> = HashMap::new();
    if let Some(headers) = properties.headers() {
        for (key, value) in headers.inner() {
            if let AMQPValue::LongString(value) = value {
                metadata.insert(
                    key.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).to_string(),
                );
            }
        }
    }

    for key in [METADATA_ENTITY_ID, METADATA_SOURCE] {
        metadata.entry(key.to_string()).or_default();
    }

    Envelope::from_parts(message_id, metadata, data.to_vec())
}
