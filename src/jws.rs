//! 此模組提供 ACME 請求所使用的扁平化 JSON Web Signature (JWS) 結構，
//! 以及不含任何 I/O 的簽名請求建構函式。

use std::result;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    account_key::AccountKey,
    base64::Base64,
    payload::{PayloadError, PayloadT},
    protection::ProtectedHeader,
    signature::{create_signature, SignatureError},
};

/// 表示一個扁平化 JSON 序列化的 JWS 物件。
///
/// 三個欄位皆為無填充的 Base64 URL 字串。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Jws {
    #[serde(rename = "protected")]
    header: String,
    payload: String,
    signature: String,
}

/// 表示與 JWS 相關的錯誤。
#[derive(Error, Debug)]
pub enum JwsError {
    /// 當 JSON 序列化過程中發生錯誤時回傳此錯誤。
    #[error("Failed to encode JWS")]
    JsonError(#[from] serde_json::Error),
    /// 簽名失敗。
    #[error("Failed to sign request")]
    Signature(#[from] SignatureError),
    /// 載荷未通過驗證，請求不會被簽名。
    #[error("Invalid request payload")]
    InvalidPayload(#[from] PayloadError),
}

type Result<T> = result::Result<T, JwsError>;

impl Jws {
    /// 由已編碼的三個部分建立 `Jws`。
    pub fn new(header_b64: &Base64, payload_b64: &Base64, signature_b64: &Base64) -> Self {
        Jws {
            header: header_b64.base64_url(),
            payload: payload_b64.base64_url(),
            signature: signature_b64.base64_url(),
        }
    }

    /// 建立簽名請求。
    ///
    /// `payload` 為 `None` 時產生 POST-as-GET 請求，payload 欄位為空字串。
    /// 簽名輸入為 `"{protected_b64}.{payload_b64}"`。載荷會先經過驗證，
    /// 未通過時回傳 [`JwsError::InvalidPayload`]。
    ///
    /// # 參數
    ///
    /// - `url`: 請求目標，同時寫入保護頭部。
    /// - `payload`: 可選的 JSON 載荷。
    /// - `kid`: 帳戶 URL。
    /// - `nonce`: 本次請求專用的 nonce。
    /// - `key`: 帳戶金鑰。
    pub fn sign<P: PayloadT>(
        url: &str,
        payload: Option<&P>,
        kid: &str,
        nonce: &str,
        key: &AccountKey,
    ) -> Result<Self> {
        let header = ProtectedHeader::new(url, key.alg, nonce, kid).to_base64()?;
        let payload = match payload {
            Some(payload) => {
                payload.validate()?;
                payload.to_base64()?
            }
            None => Base64::new(b""),
        };
        let signature = create_signature(&header, &payload, key)?;

        Ok(Jws::new(&header, &payload, &signature))
    }

    /// 返回保護頭部的 Base64 URL 字串。
    pub fn protected(&self) -> &str {
        &self.header
    }

    /// 返回載荷的 Base64 URL 字串。
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// 返回簽章的 Base64 URL 字串。
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// 將 `Jws` 實例序列化為 JSON 格式的字串。
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
