//! HTTP 傳輸層的抽象接口，讓協議引擎與實際的 HTTP 函式庫解耦。

use std::{fmt, sync::Arc, time::Duration};

use reqwest::{
    blocking::Client,
    header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Method, StatusCode,
};
use thiserror::Error;

/// 所有 ACME 請求使用的 Content-Type。
pub const JOSE_CONTENT_TYPE: &str = "application/jose+json";
/// DNS 服務 API 使用的 Content-Type。
pub const JSON_CONTENT_TYPE: &str = "application/json";

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP 層級的錯誤，例如連線失敗或讀取回應失敗。
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP request failed")]
    Request(#[from] reqwest::Error),
    #[error("Connection unavailable: {0}")]
    Unavailable(String),
}

/// 待送出的 HTTP 請求。
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        HttpRequest {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// 加入請求標頭，無效的值會被忽略。
    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// 以 Bearer token 設定 `Authorization` 標頭。
    pub fn bearer(self, token: &str) -> Self {
        self.header(AUTHORIZATION, &format!("Bearer {}", token))
    }

    /// 設定主體與 Content-Type。
    pub fn body(mut self, content_type: &str, body: Vec<u8>) -> Self {
        self = self.header(CONTENT_TYPE, content_type);
        self.body = Some(body);
        self
    }
}

/// 尚未解析的 HTTP 回應。
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// 執行單一 HTTP 請求的能力。
///
/// 實際執行使用 [`ReqwestClient`]，測試時以腳本化的替身取代。
pub trait HttpClient: Send + Sync + fmt::Debug {
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, HttpError>;
}

impl<T: HttpClient + ?Sized> HttpClient for Arc<T> {
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, HttpError> {
        (**self).execute(request)
    }
}

/// 以 `reqwest` 阻塞式客戶端實作的 [`HttpClient`]。
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self, HttpError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

impl From<Client> for ReqwestClient {
    fn from(client: Client) -> Self {
        Self { client }
    }
}

impl HttpClient for ReqwestClient {
    fn execute(&self, request: &HttpRequest) -> Result<RawResponse, HttpError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send()?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes()?.to_vec();

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
