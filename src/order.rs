use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{payload::Identifier, poll::Pollable};

/// 訂單狀態，目前支援的狀態有 pending、ready、processing、valid 與 invalid。
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Processing => "processing",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 伺服器端的訂單資料。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Order {
    /// 訂單當前狀態
    pub status: OrderStatus,
    /// 過期時間（RFC 3339 字串）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    /// 訂單涵蓋的識別項
    #[serde(default)]
    pub identifiers: Vec<Identifier>,
    /// 授權 URL 列表，順序與伺服器回傳一致
    #[serde(default)]
    pub authorizations: Vec<String>,
    /// 提交 CSR 的 URL
    pub finalize: String,
    /// 訂單完成後下載憑證的 URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    /// 訂單失敗時的問題描述
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl Order {
    /// 返回用於錯誤訊息的失敗描述。
    pub fn failure_details(&self) -> String {
        match &self.error {
            Some(error) => error.to_string(),
            None => format!("order is {}", self.status),
        }
    }
}

impl Pollable for Order {
    type Status = OrderStatus;

    fn status(&self) -> &OrderStatus {
        &self.status
    }
}
