use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::base64::Base64;

/// 載荷內容不合法。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("At least one identifier is required")]
    NoIdentifiers,
    #[error("Identifier type must be 'dns', got '{0}'")]
    UnsupportedIdentifierType(String),
    #[error("Identifier value cannot be empty")]
    EmptyIdentifier,
    #[error("CSR cannot be empty")]
    EmptyCsr,
}

/// 定義所有 ACME 請求載荷（Payload）必須實作的功能。
///
/// 該 trait 要求實作者能夠序列化，並提供轉換成 JSON 字串與 Base64 表示的功能，
/// 同時必須實作自定義的驗證邏輯。簽名前一律會先呼叫 [`PayloadT::validate`]。
pub trait PayloadT: Serialize {
    /// 將載荷轉換成 JSON 格式的字串。
    ///
    /// # 錯誤
    ///
    /// 若序列化失敗，則回傳 [`serde_json::Error`]。
    fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// 將載荷先轉換成 JSON 字串，再以 Base64 URL 進行編碼。
    fn to_base64(&self) -> Result<Base64, serde_json::Error> {
        let json_string = self.to_json_string()?;
        Ok(Base64::new(json_string.as_bytes()))
    }

    /// 驗證載荷資料是否符合預期的規範。
    fn validate(&self) -> Result<(), PayloadError>;
}

/// 表示一個識別項，用來描述證書所涵蓋的主機名稱。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub type_: String,
    pub value: String,
}

impl Identifier {
    /// 建立 `dns` 類型的識別項。
    pub fn dns(value: &str) -> Self {
        Identifier {
            type_: "dns".to_string(),
            value: value.to_string(),
        }
    }
}

/// 表示建立新訂單時所需的載荷資料。
///
/// 該載荷中包含一組識別項，代表需驗證的域名。
#[derive(Debug, Serialize)]
pub struct NewOrderPayload {
    pub identifiers: Vec<Identifier>,
}

impl NewOrderPayload {
    /// 給定一組域名，為每個域名建立一個 `"dns"` 識別項。
    pub fn new<S: AsRef<str>>(domains: &[S]) -> Self {
        let identifiers = domains
            .iter()
            .map(|domain| Identifier::dns(domain.as_ref()))
            .collect();

        NewOrderPayload { identifiers }
    }
}

impl PayloadT for NewOrderPayload {
    /// 驗證新訂單載荷資料：
    ///
    /// - 必須至少包含一個識別項。
    /// - 所有識別項的類型必須為 `"dns"` 且值不得為空。
    fn validate(&self) -> Result<(), PayloadError> {
        if self.identifiers.is_empty() {
            return Err(PayloadError::NoIdentifiers);
        }
        for identifier in &self.identifiers {
            if identifier.type_ != "dns" {
                return Err(PayloadError::UnsupportedIdentifierType(
                    identifier.type_.clone(),
                ));
            }
            if identifier.value.is_empty() {
                return Err(PayloadError::EmptyIdentifier);
            }
        }
        Ok(())
    }
}

/// 表示挑戰驗證的載荷資料，序列化結果為 `{}`。
#[derive(Debug, Serialize, Default)]
pub struct ChallengeValidationPayload {}

impl ChallengeValidationPayload {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PayloadT for ChallengeValidationPayload {
    fn validate(&self) -> Result<(), PayloadError> {
        Ok(())
    }
}

/// 表示最終化訂單時所需的載荷資料。
///
/// 該載荷主要包含 DER 編碼 CSR 的 Base64 URL 字串。
#[derive(Debug, Serialize)]
pub struct FinalizeOrderPayload {
    #[serde(rename = "csr")]
    csr_b64_str: String,
}

impl FinalizeOrderPayload {
    /// 由原始 CSR DER 位元組建立載荷。
    pub fn new(csr_der: &[u8]) -> Self {
        FinalizeOrderPayload {
            csr_b64_str: Base64::new(csr_der).base64_url(),
        }
    }
}

impl PayloadT for FinalizeOrderPayload {
    fn validate(&self) -> Result<(), PayloadError> {
        if self.csr_b64_str.is_empty() {
            return Err(PayloadError::EmptyCsr);
        }
        Ok(())
    }
}
