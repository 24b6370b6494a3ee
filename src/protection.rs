use crate::{account_key::Algorithm, base64::Base64};
use serde::Serialize;

/// 表示 JWS 保護頭部的資料結構。
///
/// 帳戶已註冊，因此所有請求都以 `kid` 識別帳戶，不攜帶 `jwk`。
/// 欄位順序即序列化順序：`url`、`alg`、`nonce`、`kid`。
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProtectedHeader {
    /// 請求目標 URL
    url: String,
    /// 簽章演算法
    alg: &'static str,
    /// 用於防止重放攻擊的一次性隨機數
    nonce: String,
    /// 帳戶 URL
    kid: String,
}

impl ProtectedHeader {
    /// 建立保護頭部。
    pub fn new(
        url: impl Into<String>,
        alg: Algorithm,
        nonce: impl Into<String>,
        kid: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            alg: alg.as_str(),
            nonce: nonce.into(),
            kid: kid.into(),
        }
    }

    /// 將 [`ProtectedHeader`] 序列化後轉換為 Base64 URL 格式。
    ///
    /// # Errors
    ///
    /// 如果序列化過程中發生錯誤，將返回 [`serde_json::Error`]。
    pub fn to_base64(&self) -> Result<Base64, serde_json::Error> {
        let json_str = serde_json::to_string(self)?;
        Ok(Base64::new(json_str.as_bytes()))
    }
}
