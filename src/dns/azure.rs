//! Azure DNS，透過 Azure Resource Manager REST API 管理 TXT 記錄集。

use std::{
    cell::RefCell,
    fmt,
    time::{Duration, Instant},
};

use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{record_name, send, ApiResponse, DnsError, DnsProvider, Result};
use crate::http::{HttpClient, HttpRequest, JSON_CONTENT_TYPE};

/// Microsoft Entra ID 的 OAuth2 端點。
pub const LOGIN_URL: &str = "https://login.microsoftonline.com";
/// Azure Resource Manager 端點。
pub const MANAGEMENT_URL: &str = "https://management.azure.com";
const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";
const API_VERSION: &str = "2018-05-01";
/// 驗證記錄的 TTL（秒）。
pub const DEFAULT_TTL: u32 = 300;
/// token 到期前提早更新的時間。
const TOKEN_LEEWAY: Duration = Duration::from_secs(60);

/// 服務主體（service principal）的認證資料。
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureCredentials {
    pub subscription_id: String,
    pub resource_group: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("subscription_id", &self.subscription_id)
            .field("resource_group", &self.resource_group)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// 以 Azure DNS 區域管理驗證記錄。
#[derive(Debug)]
pub struct AzureDns {
    client: Box<dyn HttpClient>,
    credentials: AzureCredentials,
    login_url: String,
    management_url: String,
    token: RefCell<Option<CachedToken>>,
}

impl AzureDns {
    pub fn new(client: Box<dyn HttpClient>, credentials: AzureCredentials) -> Self {
        AzureDns {
            client,
            credentials,
            login_url: LOGIN_URL.to_owned(),
            management_url: MANAGEMENT_URL.to_owned(),
            token: RefCell::new(None),
        }
    }

    /// 設置 OAuth2 端點，預設為 [`LOGIN_URL`]。
    pub fn login_url(mut self, login_url: impl Into<String>) -> Self {
        self.login_url = login_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// 設置 Resource Manager 端點，預設為 [`MANAGEMENT_URL`]。
    pub fn management_url(mut self, management_url: impl Into<String>) -> Self {
        self.management_url = management_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// 取得 Resource Manager 的存取 token，有效期間內重複使用。
    fn access_token(&self) -> Result<String> {
        if let Some(token) = self.token.borrow().as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_url, self.credentials.tenant_id
        );
        let form = form_body(&[
            ("grant_type", "client_credentials"),
            ("client_id", &self.credentials.client_id),
            ("client_secret", &self.credentials.client_secret),
            ("scope", MANAGEMENT_SCOPE),
        ])?;
        let request = HttpRequest::new(Method::POST, url).body(
            "application/x-www-form-urlencoded",
            form.into_bytes(),
        );

        let response = send(self.client.as_ref(), &request)?;
        if !response.status.is_success() {
            return Err(DnsError::Authentication(describe_error(&response)));
        }
        let token: TokenResponse = response.json()?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        debug!(expires_in = lifetime.as_secs(), "azure access token acquired");

        *self.token.borrow_mut() = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_LEEWAY),
        });
        Ok(token.access_token)
    }

    fn record_set_url(&self, zone: &str, name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/dnsZones/{}/TXT/{}?api-version={}",
            self.management_url,
            self.credentials.subscription_id,
            self.credentials.resource_group,
            zone,
            name,
            API_VERSION
        )
    }
}

impl DnsProvider for AzureDns {
    fn name(&self) -> &'static str {
        "azure"
    }

    /// 建立或覆寫記錄集，只保留一個值。
    fn provision(&self, zone: &str, domain: &str, value: &str) -> Result<()> {
        let name = record_name(zone, domain);
        info!(record = %name, zone, value, "updating TXT record");

        let body = json!({
            "properties": {
                "TTL": DEFAULT_TTL,
                "TXTRecords": [{ "value": [value] }]
            }
        });
        let request = HttpRequest::new(Method::PUT, self.record_set_url(zone, &name))
            .bearer(&self.access_token()?)
            .body(JSON_CONTENT_TYPE, body.to_string().into_bytes());

        let response = send(self.client.as_ref(), &request)?;
        if !response.status.is_success() {
            return Err(DnsError::Api {
                operation: "update",
                record: name,
                message: describe_error(&response),
            });
        }
        Ok(())
    }

    fn remove(&self, zone: &str, domain: &str, _value: &str) -> Result<()> {
        let name = record_name(zone, domain);
        info!(record = %name, zone, "deleting TXT record");

        let request = HttpRequest::new(Method::DELETE, self.record_set_url(zone, &name))
            .bearer(&self.access_token()?);
        let response = send(self.client.as_ref(), &request)?;
        if response.status.is_success() || response.status == StatusCode::NOT_FOUND {
            return Ok(());
        }

        Err(DnsError::Api {
            operation: "delete",
            record: name,
            message: describe_error(&response),
        })
    }
}

/// 以 `application/x-www-form-urlencoded` 編碼表單欄位。
fn form_body(pairs: &[(&str, &str)]) -> Result<String> {
    let mut url = Url::parse(LOGIN_URL).map_err(|e| DnsError::Authentication(e.to_string()))?;
    url.query_pairs_mut().extend_pairs(pairs);
    Ok(url.query().unwrap_or_default().to_owned())
}

/// Azure 錯誤格式為 `{"error": {"code": ..., "message": ...}}`，OAuth 錯誤則是
/// `{"error": ..., "error_description": ...}`。
fn describe_error(response: &ApiResponse) -> String {
    let body = &response.body;
    let detail = match &body["error"] {
        Value::Object(error) => format!(
            "{}: {}",
            error.get("code").and_then(Value::as_str).unwrap_or("unknown"),
            error.get("message").and_then(Value::as_str).unwrap_or("")
        ),
        Value::String(code) => format!(
            "{}: {}",
            code,
            body["error_description"].as_str().unwrap_or("")
        ),
        _ => body.to_string(),
    };
    format!("{} ({})", detail, response.status)
}
