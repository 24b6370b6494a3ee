//! 具備 nonce 衝突辨識能力的傳輸層。
//!
//! 此模組負責：只允許 HTTPS、嘗試將回應解析為 JSON、以及把回應分類為
//! 成功、可重試的 nonce 衝突或致命的協議錯誤。

use reqwest::{header::HeaderMap, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use crate::{
    http::{HttpClient, HttpError, HttpRequest, RawResponse, JOSE_CONTENT_TYPE},
    jws::JwsError,
};

/// 伺服器表示 nonce 已失效時使用的錯誤類型。
pub const BAD_NONCE: &str = "urn:ietf:params:acme:error:badNonce";
/// 伺服器回傳新 nonce 的標頭。
pub const REPLAY_NONCE: &str = "Replay-Nonce";

/// 傳輸層錯誤。
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Disallowed schema, only https is permitted: {0}")]
    InsecureUrl(String),
    #[error("Request failed")]
    Http(#[from] HttpError),
    #[error("Request failed:\nUrl: {url}\nData: {request}\nResponse Code: {status}\nResponse: {body}")]
    Status {
        url: String,
        request: String,
        status: StatusCode,
        body: String,
    },
    #[error("Gave up after {attempts} consecutive bad nonce responses from {url}: {body}")]
    NonceRetriesExhausted {
        url: String,
        attempts: usize,
        body: String,
    },
    #[error("Missing {header} header in response from {url}")]
    MissingHeader { url: String, header: &'static str },
    #[error("Unexpected response from {url}")]
    UnexpectedBody {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to build signed request")]
    Jws(#[from] JwsError),
}

type Result<T> = std::result::Result<T, TransportError>;

/// 已分類的回應。
#[derive(Debug, Clone)]
pub struct Response {
    /// 回應 URL，用於錯誤訊息。
    pub url: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// 解析後的 JSON；非 JSON 或空主體時為 `Value::Null`。
    pub body: Value,
    /// 原始主體位元組，憑證下載時使用。
    pub raw: Vec<u8>,
}

impl Response {
    /// 取得標頭值，不存在或非 ASCII 時回傳 `None`。
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// 取得必要的標頭值。
    pub fn require_header(&self, name: &'static str) -> Result<&str> {
        self.header(name).ok_or_else(|| TransportError::MissingHeader {
            url: self.url.clone(),
            header: name,
        })
    }

    /// 將 JSON 主體反序列化為指定型別。
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.body.clone()).map_err(|source| TransportError::UnexpectedBody {
            url: self.url.clone(),
            source,
        })
    }

    /// 以文字形式返回原始主體。
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.raw).into_owned()
    }

    fn describe_body(&self) -> String {
        if self.body.is_null() {
            self.text()
        } else {
            self.body.to_string()
        }
    }
}

/// 回應分類結果。
///
/// 其他所有非成功狀態碼都會以 [`TransportError::Status`] 回傳。
#[derive(Debug)]
pub enum Classified {
    /// 狀態碼為 200、201 或 204。
    Success(Response),
    /// 狀態碼為 400 且錯誤類型為 `badNonce`，可以換新 nonce 重試。
    RetryableNonceConflict(Response),
}

/// 封裝 [`HttpClient`] 的傳輸層。
#[derive(Debug)]
pub struct Transport {
    client: Box<dyn HttpClient>,
}

impl Transport {
    pub fn new(client: Box<dyn HttpClient>) -> Self {
        Self { client }
    }

    /// 送出請求並分類回應。有主體時使用 POST，否則使用 GET。
    ///
    /// 非 HTTPS 的目標會在送出前被拒絕。
    pub fn execute(&self, url: &str, body: Option<Vec<u8>>) -> Result<Classified> {
        ensure_https(url)?;

        let request = match body {
            Some(body) => HttpRequest::new(Method::POST, url).body(JOSE_CONTENT_TYPE, body),
            None => HttpRequest::new(Method::GET, url),
        };
        let raw = self.client.execute(&request)?;
        trace!(url, status = %raw.status, "received response");

        classify(&request, raw)
    }

    /// 送出不需重試的請求，nonce 衝突也視為致命錯誤。
    pub fn request(&self, url: &str, body: Option<Vec<u8>>) -> Result<Response> {
        let request_body = describe_request(body.as_deref());
        match self.execute(url, body)? {
            Classified::Success(response) => Ok(response),
            Classified::RetryableNonceConflict(response) => Err(TransportError::Status {
                url: url.to_owned(),
                request: request_body,
                status: response.status,
                body: response.describe_body(),
            }),
        }
    }
}

fn ensure_https(url: &str) -> Result<()> {
    match Url::parse(url) {
        Ok(parsed) if parsed.scheme() == "https" => Ok(()),
        _ => Err(TransportError::InsecureUrl(url.to_owned())),
    }
}

fn describe_request(body: Option<&[u8]>) -> String {
    body.map(|b| String::from_utf8_lossy(b).into_owned())
        .unwrap_or_else(|| "None".to_owned())
}

/// 分類回應：解析失敗的主體視為空結果，但仍依原始狀態碼判斷。
fn classify(request: &HttpRequest, raw: RawResponse) -> Result<Classified> {
    let body = serde_json::from_slice(&raw.body).unwrap_or(Value::Null);
    let response = Response {
        url: request.url.clone(),
        status: raw.status,
        headers: raw.headers,
        body,
        raw: raw.body,
    };

    if response.status == StatusCode::BAD_REQUEST
        && response.body.get("type").and_then(Value::as_str) == Some(BAD_NONCE)
    {
        return Ok(Classified::RetryableNonceConflict(response));
    }

    match response.status {
        StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => {
            Ok(Classified::Success(response))
        }
        status => Err(TransportError::Status {
            url: request.url.clone(),
            request: describe_request(request.body.as_deref()),
            status,
            body: response.describe_body(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::http::mock::{self, MockClient};

    fn transport_with(status: u16, body: &'static [u8]) -> Transport {
        let client = MockClient::new(move |_| mock::response(status, &[], body));
        Transport::new(Box::new(client))
    }

    #[test]
    fn test_rejects_non_https_before_sending() {
        let client = MockClient::new(|_| mock::response(200, &[], b""));
        let transport = Transport::new(Box::new(client.clone()));

        for url in ["http://acme.test/directory", "ftp://acme.test", "not a url"] {
            assert!(matches!(
                transport.request(url, None),
                Err(TransportError::InsecureUrl(_))
            ));
        }
        assert!(client.requests().is_empty());
    }

    #[test]
    fn test_success_statuses() {
        for status in [200, 201, 204] {
            let response = transport_with(status, b"{\"status\":\"valid\"}")
                .request("https://acme.test/x", None)
                .unwrap();
            assert_eq!(response.body["status"], "valid");
        }
    }

    #[test]
    fn test_non_json_body_is_empty_result() {
        let response = transport_with(200, b"-----BEGIN CERTIFICATE-----\n")
            .request("https://acme.test/cert", None)
            .unwrap();
        assert!(response.body.is_null());
        assert_eq!(response.text(), "-----BEGIN CERTIFICATE-----\n");
    }

    #[test]
    fn test_non_json_error_keeps_status() {
        let result = transport_with(500, b"<html>oops</html>").request("https://acme.test/x", None);
        match result {
            Err(TransportError::Status { status, body, .. }) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "<html>oops</html>");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_bad_nonce_is_retryable() {
        let client = MockClient::new(|_| {
            mock::json(400, &[(REPLAY_NONCE, "fresh")], json!({ "type": BAD_NONCE }))
        });
        let transport = Transport::new(Box::new(client));

        match transport.execute("https://acme.test/x", Some(b"{}".to_vec())).unwrap() {
            Classified::RetryableNonceConflict(response) => {
                assert_eq!(response.header(REPLAY_NONCE), Some("fresh"));
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_other_client_errors_are_fatal() {
        let client = MockClient::new(|_| {
            mock::json(
                400,
                &[],
                json!({ "type": "urn:ietf:params:acme:error:malformed" }),
            )
        });
        let transport = Transport::new(Box::new(client));
        assert!(matches!(
            transport.execute("https://acme.test/x", Some(b"{}".to_vec())),
            Err(TransportError::Status { .. })
        ));
    }

    #[test]
    fn test_bad_nonce_with_other_status_is_fatal() {
        let client = MockClient::new(|_| mock::json(403, &[], json!({ "type": BAD_NONCE })));
        let transport = Transport::new(Box::new(client));
        assert!(matches!(
            transport.execute("https://acme.test/x", Some(b"{}".to_vec())),
            Err(TransportError::Status { .. })
        ));
    }

    #[test]
    fn test_method_follows_body() {
        let client = MockClient::new(|_| mock::response(204, &[], b""));
        let transport = Transport::new(Box::new(client.clone()));
        transport.request("https://acme.test/a", None).unwrap();
        transport
            .request("https://acme.test/b", Some(b"{}".to_vec()))
            .unwrap();

        let requests = client.requests();
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(requests[1].method, Method::POST);
        assert_eq!(
            requests[1].headers.get(reqwest::header::CONTENT_TYPE).unwrap(),
            JOSE_CONTENT_TYPE
        );
    }
}
