//! DNS-01 驗證所需的 TXT 記錄管理。
//!
//! [`DnsProvider`] 是協議引擎與 DNS 服務之間唯一的接口，記錄名稱的計算集中在
//! [`record_name`]，各個服務的實作只負責呼叫對應的 API。

use std::fmt;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::http::{HttpClient, HttpError, HttpRequest, RawResponse};

pub mod azure;
pub mod cloudflare;
pub mod propagation;

pub use azure::{AzureCredentials, AzureDns};
pub use cloudflare::CloudflareDns;
pub use propagation::PropagationWaiter;

/// ACME 驗證記錄的名稱前綴。
pub const ACME_CHALLENGE_RECORD: &str = "_acme-challenge";

/// DNS 服務操作錯誤。
#[derive(Debug, Error)]
pub enum DnsError {
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Zone not found: {zone}")]
    ZoneNotFound { zone: String },
    #[error("Failed to {operation} TXT record {record}: {message}")]
    Api {
        operation: &'static str,
        record: String,
        message: String,
    },
    #[error("DNS API request failed")]
    Http(#[from] HttpError),
    #[error("Unexpected DNS API response")]
    UnexpectedBody(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DnsError>;

/// 管理 DNS-01 驗證用 TXT 記錄的服務。
///
/// 兩個操作都以 `zone` 與 `domain` 推導出記錄名稱，`value` 為 key authorization 摘要。
/// `remove` 以名稱刪除記錄，記錄不存在時視為成功。
pub trait DnsProvider: fmt::Debug {
    /// 服務名稱，用於日誌。
    fn name(&self) -> &'static str;

    fn provision(&self, zone: &str, domain: &str, value: &str) -> Result<()>;

    fn remove(&self, zone: &str, domain: &str, value: &str) -> Result<()>;
}

impl<T: DnsProvider + ?Sized> DnsProvider for &T {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn provision(&self, zone: &str, domain: &str, value: &str) -> Result<()> {
        (**self).provision(zone, domain, value)
    }

    fn remove(&self, zone: &str, domain: &str, value: &str) -> Result<()> {
        (**self).remove(zone, domain, value)
    }
}

impl<T: DnsProvider + ?Sized> DnsProvider for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn provision(&self, zone: &str, domain: &str, value: &str) -> Result<()> {
        (**self).provision(zone, domain, value)
    }

    fn remove(&self, zone: &str, domain: &str, value: &str) -> Result<()> {
        (**self).remove(zone, domain, value)
    }
}

fn normalize(name: &str) -> String {
    let name = name.trim().trim_end_matches('.').to_ascii_lowercase();
    match name.strip_prefix("*.") {
        Some(base) => base.to_owned(),
        None => name,
    }
}

/// 計算驗證記錄相對於 `zone` 的名稱。
///
/// `example.com` 在 `example.com` 之下為 `_acme-challenge`，`www.example.com` 為
/// `_acme-challenge.www`。萬用字元域名以基底名稱計算。
pub fn record_name(zone: &str, domain: &str) -> String {
    let zone = normalize(zone);
    let domain = normalize(domain);

    if domain == zone {
        return ACME_CHALLENGE_RECORD.to_owned();
    }
    let label = domain
        .strip_suffix(&format!(".{}", zone))
        .unwrap_or(domain.as_str());
    format!("{}.{}", ACME_CHALLENGE_RECORD, label)
}

/// 驗證記錄的完整名稱，例如 `_acme-challenge.www.example.com`。
pub fn record_fqdn(domain: &str) -> String {
    format!("{}.{}", ACME_CHALLENGE_RECORD, normalize(domain))
}

/// DNS 服務 API 的回應，主體已解析為 JSON（失敗時為 `Value::Null`）。
#[derive(Debug)]
pub(crate) struct ApiResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

pub(crate) fn send(client: &dyn HttpClient, request: &HttpRequest) -> Result<ApiResponse> {
    let RawResponse { status, body, .. } = client.execute(request)?;
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
    Ok(ApiResponse { status, body })
}

pub(crate) fn get(url: &str) -> HttpRequest {
    HttpRequest::new(Method::GET, url)
}
