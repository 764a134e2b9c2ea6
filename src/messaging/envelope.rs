use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// 元數據鍵：所屬實體ID
pub const METADATA_ENTITY_ID: &str = "entityId";
/// 元數據鍵：來源服務名稱
pub const METADATA_SOURCE: &str = "source";

/// 封套建構錯誤
#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Payload encoding error: {0}")]
    Encoding(String),
}

/// 將字符串錯誤轉換為封套錯誤
impl From<String> for EnvelopeError {
    fn from(error: String) -> Self {
        EnvelopeError::Encoding(error)
    }
}

/// 將 &str 錯誤轉換為封套錯誤
impl From<&str> for EnvelopeError {
    fn from(error: &str) -> Self {
        EnvelopeError::Encoding(error.to_string())
    }
}

/// 消息載荷特徵
///
/// 可發布的命令與事件都實現此特徵，由載荷自身提供序列化方式與所屬實體ID。
/// 預設以 JSON 編碼，實作者可覆寫 `to_bytes` 更換編碼方式。
pub trait MessagePayload: Serialize + Send + Sync {
    /// 所屬實體ID
    fn entity_id(&self) -> i64;

    /// 序列化為位元組
    fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// 訊息封套
///
/// 所有經由匯流排傳輸的消息的傳輸包裝：唯一消息ID、來源元數據與載荷位元組。
/// 建構完成後不可變。
#[derive(Clone, Debug)]
pub struct Envelope {
    message_id: String,
    metadata: HashMap<String, String>,
    payload: Vec<u8>,
}

impl Envelope {
    pub(crate) fn from_parts(
        message_id: String,
        metadata: HashMap<String, String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            message_id,
            metadata,
            payload,
        }
    }

    /// 唯一消息ID
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// 元數據
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// 載荷位元組
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// 元數據中的實體ID
    pub fn entity_id(&self) -> &str {
        self.metadata
            .get(METADATA_ENTITY_ID)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// 元數據中的來源服務名稱
    pub fn source(&self) -> &str {
        self.metadata
            .get(METADATA_SOURCE)
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// 封套建構器
///
/// 為每條外發消息產生唯一ID，並蓋上 `entityId` 與 `source` 來源元數據。
pub struct EnvelopeBuilder {
    service_name: String,
}

impl EnvelopeBuilder {
    /// 創建新的封套建構器
    pub fn new(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
        }
    }

    /// 由載荷建構封套
    ///
    /// 序列化失敗原樣傳播，不返回部分建構的封套。
    pub fn build<P: MessagePayload>(&self, payload: &P) -> Result<Envelope, EnvelopeError> {
        let bytes = payload.to_bytes()?;

        let mut metadata = HashMap::new();
        metadata.insert(
            METADATA_ENTITY_ID.to_string(),
            payload.entity_id().to_string(),
        );
        metadata.insert(METADATA_SOURCE.to_string(), self.service_name.clone());

        Ok(Envelope {
            message_id: Uuid::new_v4().to_string(),
            metadata,
            payload: bytes,
        })
    }
}
