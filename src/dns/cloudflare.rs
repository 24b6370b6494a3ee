//! Cloudflare DNS，使用 API token 管理 TXT 記錄。

use std::{cell::RefCell, collections::HashMap};

use reqwest::{Method, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};

use super::{get, record_fqdn, send, DnsError, DnsProvider, Result};
use crate::http::{HttpClient, HttpRequest, JSON_CONTENT_TYPE};

/// Cloudflare API v4 的基底 URL。
pub const API_URL: &str = "https://api.cloudflare.com/client/v4";
/// 驗證記錄的 TTL（秒）。
pub const DEFAULT_TTL: u32 = 60;

/// 用於在 Cloudflare 上建立 DNS TXT 記錄的資料結構。
#[derive(Debug, Serialize)]
struct CloudflareDnsRecord<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    name: &'a str,
    content: String,
    ttl: u32,
}

/// Cloudflare API 的通用回應格式。
#[derive(Debug, Deserialize)]
struct CloudflareResponse<T> {
    success: bool,
    result: Option<T>,
    #[serde(default)]
    errors: Vec<CloudflareError>,
}

/// Cloudflare API 錯誤項目。
#[derive(Debug, Deserialize)]
struct CloudflareError {
    code: i64,
    message: String,
}

/// 只需要 ID 的資源（zone 或 DNS 記錄）。
#[derive(Debug, Deserialize)]
struct CloudflareItem {
    id: String,
}

/// 用於格式化 Cloudflare API 回傳的錯誤訊息。
fn format_cloudflare_errors(errors: &[CloudflareError]) -> String {
    if errors.is_empty() {
        return "request was not successful".to_owned();
    }
    errors
        .iter()
        .map(|e| format!("{}: {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

/// 以 Cloudflare 管理驗證記錄。
#[derive(Debug)]
pub struct CloudflareDns {
    client: Box<dyn HttpClient>,
    api_token: String,
    api_url: String,
    zone_ids: RefCell<HashMap<String, String>>,
}

impl CloudflareDns {
    pub fn new(client: Box<dyn HttpClient>, api_token: impl Into<String>) -> Self {
        CloudflareDns {
            client,
            api_token: api_token.into(),
            api_url: API_URL.to_owned(),
            zone_ids: RefCell::new(HashMap::new()),
        }
    }

    /// 設置 API 基底 URL，預設為 [`API_URL`]。
    pub fn api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_owned();
        self
    }

    fn call<T: DeserializeOwned>(
        &self,
        request: HttpRequest,
        operation: &'static str,
        record: &str,
    ) -> Result<Option<T>> {
        let response = send(self.client.as_ref(), &request.bearer(&self.api_token))?;
        let parsed: CloudflareResponse<T> = response.json()?;
        if !parsed.success {
            return Err(DnsError::Api {
                operation,
                record: record.to_owned(),
                message: format_cloudflare_errors(&parsed.errors),
            });
        }
        Ok(parsed.result)
    }

    /// 取得 zone ID，每個 zone 只查詢一次。
    fn zone_id(&self, zone: &str) -> Result<String> {
        if let Some(id) = self.zone_ids.borrow().get(zone) {
            return Ok(id.clone());
        }

        let url = with_query(&format!("{}/zones", self.api_url), &[("name", zone)])?;
        let zones: Vec<CloudflareItem> = self
            .call(get(&url), "look up zone for", zone)?
            .unwrap_or_default();
        let id = zones
            .into_iter()
            .next()
            .map(|z| z.id)
            .ok_or_else(|| DnsError::ZoneNotFound {
                zone: zone.to_owned(),
            })?;
        debug!(zone, zone_id = %id, "cloudflare zone resolved");

        self.zone_ids
            .borrow_mut()
            .insert(zone.to_owned(), id.clone());
        Ok(id)
    }

    /// 刪除 Cloudflare 中同名的 TXT 記錄。
    fn delete_existing_txt_records(&self, zone_id: &str, record_name: &str) -> Result<usize> {
        let url = with_query(
            &format!("{}/zones/{}/dns_records", self.api_url, zone_id),
            &[("type", "TXT"), ("name", record_name)],
        )?;
        let records: Vec<CloudflareItem> = self
            .call(get(&url), "list", record_name)?
            .unwrap_or_default();

        for record in &records {
            let delete_url = format!(
                "{}/zones/{}/dns_records/{}",
                self.api_url, zone_id, record.id
            );
            self.call::<CloudflareItem>(
                HttpRequest::new(Method::DELETE, delete_url),
                "delete",
                record_name,
            )?;
        }
        Ok(records.len())
    }
}

impl DnsProvider for CloudflareDns {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    fn provision(&self, zone: &str, domain: &str, value: &str) -> Result<()> {
        let name = record_fqdn(domain);
        info!(record = %name, zone, value, "creating TXT record");

        let zone_id = self.zone_id(zone)?;
        self.delete_existing_txt_records(&zone_id, &name)?;

        let record = CloudflareDnsRecord {
            record_type: "TXT",
            name: &name,
            content: format!("\"{}\"", value),
            ttl: DEFAULT_TTL,
        };
        let request = HttpRequest::new(
            Method::POST,
            format!("{}/zones/{}/dns_records", self.api_url, zone_id),
        )
        .body(JSON_CONTENT_TYPE, serde_json::to_vec(&record)?);
        self.call::<CloudflareItem>(request, "create", &name)?;
        Ok(())
    }

    fn remove(&self, zone: &str, domain: &str, _value: &str) -> Result<()> {
        let name = record_fqdn(domain);
        let zone_id = self.zone_id(zone)?;
        let deleted = self.delete_existing_txt_records(&zone_id, &name)?;
        info!(record = %name, deleted, "TXT records deleted");
        Ok(())
    }
}

fn with_query(base: &str, pairs: &[(&str, &str)]) -> Result<String> {
    let mut url = Url::parse(base).map_err(|e| DnsError::Api {
        operation: "build url for",
        record: base.to_owned(),
        message: e.to_string(),
    })?;
    url.query_pairs_mut().extend_pairs(pairs);
    Ok(url.into())
}
