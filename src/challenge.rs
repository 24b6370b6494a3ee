use std::fmt;

use openssl::sha::sha256;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{base64::Base64, payload::Identifier, poll::Pollable};

/// 表示 ACME 挑戰的類型。只有 DNS-01 會被處理，其餘類型保留以便辨識。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChallengeType {
    #[serde(rename = "http-01")]
    Http01,
    #[serde(rename = "dns-01")]
    Dns01,
    #[serde(rename = "tls-alpn-01")]
    TlsAlpn01,
    #[serde(other)]
    Unknown,
}

/// 表示 ACME 挑戰的狀態，用來追蹤挑戰進展。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Pending,
    Processing,
    Valid,
    Invalid,
}

impl ChallengeStatus {
    /// 返回狀態對應的字串表示。
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 授權的狀態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    Pending,
    Valid,
    Invalid,
    Deactivated,
    Expired,
    Revoked,
}

impl AuthorizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Deactivated => "deactivated",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 表示一個 ACME 驗證挑戰。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    /// 驗證挑戰的類型
    #[serde(rename = "type")]
    pub challenge_type: ChallengeType,
    /// 驗證挑戰的 URL
    pub url: String,
    /// 挑戰 token，用於生成 key authorization
    #[serde(default)]
    pub token: String,
    /// 當前挑戰狀態
    pub status: ChallengeStatus,
    /// 驗證失敗時伺服器附上的問題描述
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl Challenge {
    /// 返回清理過、可以安全嵌入的 token。
    pub fn sanitized_token(&self) -> String {
        sanitize_token(&self.token)
    }
}

/// 一個識別項的授權資料。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authorization {
    pub identifier: Identifier,
    pub status: AuthorizationStatus,
    #[serde(default)]
    pub challenges: Vec<Challenge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wildcard: Option<bool>,
}

impl Authorization {
    /// 授權對應的域名，與伺服器回傳的識別項相同。
    ///
    /// 萬用字元訂單的授權識別項本身不含 `*.`，改以 `wildcard` 欄位標示。
    pub fn domain(&self) -> &str {
        &self.identifier.value
    }

    /// 找出第一個 DNS-01 挑戰。
    pub fn find_dns01(&self) -> Option<&Challenge> {
        self.challenges
            .iter()
            .find(|c| c.challenge_type == ChallengeType::Dns01)
    }

    /// 返回第一個帶有錯誤描述的挑戰，用於診斷驗證失敗。
    pub fn failure_details(&self) -> String {
        self.challenges
            .iter()
            .find_map(|c| c.error.as_ref().map(Value::to_string))
            .unwrap_or_else(|| format!("authorization is {}", self.status))
    }
}

impl Pollable for Authorization {
    type Status = AuthorizationStatus;

    fn status(&self) -> &AuthorizationStatus {
        &self.status
    }
}

/// 將 token 中 `[A-Za-z0-9_-]` 以外的字元替換為 `_`。
pub fn sanitize_token(token: &str) -> String {
    token
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// 組合 key authorization 字串 `"{token}.{thumbprint}"`。
pub fn key_authorization(token: &str, thumbprint: &str) -> String {
    format!("{}.{}", token, thumbprint)
}

/// 根據 key authorization 計算 DNS TXT 記錄值，使用 SHA-256 與 URL-safe Base64 編碼。
///
/// `token` 應該已經過 [`sanitize_token`] 處理。
pub fn key_authorization_digest(token: &str, thumbprint: &str) -> String {
    let digest = sha256(key_authorization(token, thumbprint).as_bytes());
    Base64::new(digest).base64_url()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn authorization(challenges: Value) -> Authorization {
        serde_json::from_value(json!({
            "identifier": { "type": "dns", "value": "www.example.com" },
            "status": "pending",
            "challenges": challenges,
        }))
        .unwrap()
    }

    #[test]
    fn test_sanitize_token() {
        assert_eq!(sanitize_token("abc-DEF_123"), "abc-DEF_123");
        assert_eq!(sanitize_token("a/b+c=="), "a_b_c__");
        assert_eq!(sanitize_token("../etc"), "___etc");
        assert_eq!(sanitize_token(""), "");
    }

    #[test]
    fn test_digest_matches_manual_computation() {
        let expected = Base64::new(sha256(b"abc123.thumb")).base64_url();
        assert_eq!(key_authorization_digest("abc123", "thumb"), expected);
        assert_eq!(expected.len(), 43);
        assert!(!expected.contains('='));
    }

    #[test]
    fn test_digest_known_value() {
        // SHA-256("a.b") 的 base64url 表示
        let digest = key_authorization_digest("a", "b");
        let raw = Base64::from_url(&digest).unwrap().decode().unwrap();
        assert_eq!(raw, sha256(b"a.b").to_vec());
    }

    #[test]
    fn test_find_dns01_picks_first_match() {
        let authz = authorization(json!([
            { "type": "http-01", "url": "https://acme.test/c/1", "token": "t1", "status": "pending" },
            { "type": "dns-01", "url": "https://acme.test/c/2", "token": "t2", "status": "pending" },
            { "type": "dns-01", "url": "https://acme.test/c/3", "token": "t3", "status": "pending" },
        ]));
        let challenge = authz.find_dns01().unwrap();
        assert_eq!(challenge.url, "https://acme.test/c/2");
        assert_eq!(authz.domain(), "www.example.com");
    }

    #[test]
    fn test_wildcard_domain_is_identifier_value() {
        let authz: Authorization = serde_json::from_value(json!({
            "identifier": { "type": "dns", "value": "example.com" },
            "status": "pending",
            "wildcard": true,
            "challenges": [],
        }))
        .unwrap();
        assert_eq!(authz.domain(), "example.com");
        assert_eq!(authz.wildcard, Some(true));
    }

    #[test]
    fn test_unknown_challenge_types_are_skipped() {
        let authz = authorization(json!([
            { "type": "dns-account-01", "url": "https://acme.test/c/1", "token": "t", "status": "pending" },
            { "type": "http-01", "url": "https://acme.test/c/2", "token": "t", "status": "pending" },
        ]));
        assert_eq!(authz.challenges[0].challenge_type, ChallengeType::Unknown);
        assert!(authz.find_dns01().is_none());
    }

    #[test]
    fn test_failure_details() {
        let mut authz = authorization(json!([
            {
                "type": "dns-01", "url": "https://acme.test/c/1", "token": "t", "status": "invalid",
                "error": { "type": "urn:ietf:params:acme:error:dns", "detail": "NXDOMAIN" }
            },
        ]));
        assert!(authz.failure_details().contains("NXDOMAIN"));

        authz.challenges.clear();
        authz.status = AuthorizationStatus::Expired;
        assert_eq!(authz.failure_details(), "authorization is expired");
    }
}
